use std::path::PathBuf;

use thiserror::Error;

/// Fatal setup and runtime errors of the proxy.
///
/// Everything here aborts the run; recoverable conditions (framing errors,
/// correlator misses) are handled inside the pipeline and never surface as
/// this type.
#[derive(Debug, Error)]
pub enum LspTraceError {
    #[error("language server `{binary}` could not be spawned: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait for language server: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
    #[error("language server stdout unavailable")]
    StdoutUnavailable,
    #[error("language server stdin unavailable")]
    StdinUnavailable,
    #[error("failed to open trace output `{path}`: {source}")]
    TraceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("language server exited before announcing a pipe name")]
    HandshakeEof,
    #[error("failed to read pipe handshake from language server: {0}")]
    HandshakeRead(#[source] std::io::Error),
    #[error("failed to forward pipe handshake to client: {0}")]
    HandshakeWrite(#[source] std::io::Error),
    #[error("failed to create proxy socket directory: {0}")]
    ProxySocketDir(#[source] std::io::Error),
    #[error("failed to listen on proxy socket `{path}`: {source}")]
    ProxySocketBind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to accept client connection on proxy socket: {0}")]
    ProxySocketAccept(#[source] std::io::Error),
    #[error("failed to connect to language server socket `{path}`: {source}")]
    ServerSocketConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
