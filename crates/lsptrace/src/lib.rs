#![forbid(unsafe_code)]
//! Transparent interception proxy for the Language Server Protocol.
//!
//! Launched as a wrapper around a language server executable, the proxy
//! forwards the two-way byte stream between editor and server unmodified
//! while decoding the JSON-RPC framing on the side and appending one JSON
//! trace record per decoded message to a sink. Responses are paired with
//! the request they answer through a shared id map, so a response trace
//! carries the method name of its request.
//!
//! Per direction, raw chunks are teed to the forward endpoint and into a
//! [`FrameDecoder`]; decoded envelopes flow through a classifier backed by
//! the shared [`RequestMap`] and finished traces are appended
//! line-atomically by the [`TraceWriter`]. [`TraceProxy`] wires both
//! directions over the child's stdio, or over a pair of spliced Unix
//! sockets when the server announces a `{"pipeName":…}` handshake.

mod correlator;
mod decoder;
mod error;
mod message;
mod pipeline;
mod proxy;
mod sink;
mod tracer;
mod transport;

pub use correlator::RequestMap;
pub use decoder::{FrameDecoder, FrameError};
pub use error::LspTraceError;
pub use message::{MessageKind, Origin, RawMessage, Trace};
pub use pipeline::{DirectionPipeline, DynReader, DynWriter};
pub use proxy::{TraceProxy, TraceProxyBuilder};
pub use sink::TraceWriter;
pub use tracer::Tracer;
pub use transport::{
    intercept_unix_socket, poll_for_pipe_handshake, Endpoints, PipeHandshake, SocketGuard,
};
