//! SFS: a length-tag-prefixed structured serialization codec mirroring R's
//! SEXP type system (spec.md §4.D). `codec` drives the recursive walk over
//! `Value` trees through the pluggable `Sink`/`Source` traits in `sink` and
//! `source`.

pub mod codec;
pub mod sink;
pub mod source;
pub mod tag;
pub mod value;

pub use codec::{decode, encode};
pub use sink::{FdSink, LatchingSink, MemSink, Sink, Stats, StatsSink};
pub use source::{FdSource, MemSource, Source, SocketSource};
pub use value::{Pair, Value, ValueKind};
