//! The two protocol handlers the `obsrv-server` binary wires up to
//! `obengine::Server`; split into a library so integration tests can drive
//! them over real sockets without going through the binary's CLI.

pub mod ohsrv;
pub mod osrv;
