//! In-process object service: a thread-safe store with deferred reclamation,
//! a dependency tracker, an event queue, an SFS structured codec, and the
//! threaded server runtime and HTTP/1.x parser that expose them over the
//! network.

pub mod chunked;
pub mod deps;
pub mod engine;
pub mod error;
pub mod host;
pub mod http;
pub mod queue;
pub mod server;
pub mod sfs;
pub mod store;

pub use deps::Deps;
pub use engine::Engine;
pub use error::{EngineError, HttpError, SfsError};
pub use host::{HostRuntime, NoopHostRuntime, StructuredHandle};
pub use queue::{Entry, Queue};
pub use server::Server;
pub use store::{Artifact, Store};
