//! gp-rpc: request/response transport to the isolated worker
//!
//! Line-delimited JSON envelopes over one duplex byte stream. Every call is
//! correlated by id, raced against a per-method timeout, and resolved exactly
//! once by whichever of {reply, timeout, disconnect} gets there first.

pub mod connector;
pub mod error;
mod pending;
pub mod protocol;
pub mod transport;

pub use connector::{BoxedStream, Connector, StreamConnector, UnixSocketConnector, WorkerStream};
pub use error::{Result, TransportError};
pub use protocol::{methods, Request, Response, RpcErrorPayload, TimeoutPolicy, PROTOCOL_VERSION};
pub use transport::{ConnectionState, Transport};
