use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::Child;
use tracing::{debug, info};

use crate::error::LspTraceError;
use crate::pipeline::{DynReader, DynWriter};

/// The four endpoints the pipelines are wired to, regardless of whether
/// the transport is the child's stdio or a pair of Unix sockets.
pub struct Endpoints {
    pub client_read: DynReader,
    pub client_write: DynWriter,
    pub server_read: DynReader,
    pub server_write: DynWriter,
}

/// One-line JSON message a server emits on stdout to announce the Unix
/// socket it listens on. Extra fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeHandshake {
    #[serde(rename = "pipeName")]
    pub pipe_name: String,
}

/// Owns the proxy socket file and its temp directory; both are removed on
/// drop.
pub struct SocketGuard {
    path: PathBuf,
    _dir: TempDir,
}

impl SocketGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Wires the child's stdio as the server endpoint and the host's stdio as
/// the client endpoint.
pub(crate) fn stdio_endpoints(child: &mut Child) -> Result<Endpoints, LspTraceError> {
    let stdout = child.stdout.take().ok_or(LspTraceError::StdoutUnavailable)?;
    let stdin = child.stdin.take().ok_or(LspTraceError::StdinUnavailable)?;
    Ok(Endpoints {
        client_read: Box::new(tokio::io::stdin()),
        client_write: Box::new(tokio::io::stdout()),
        server_read: Box::new(stdout),
        server_write: Box::new(stdin),
    })
}

/// Scans `reader` line-by-line until a `{"pipeName":…}` handshake shows up.
///
/// Non-JSON lines and JSON without a `pipeName` are startup noise and are
/// skipped silently.
pub async fn poll_for_pipe_handshake<R>(reader: R) -> Result<PathBuf, LspTraceError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(LspTraceError::HandshakeRead)?
            .ok_or(LspTraceError::HandshakeEof)?;
        match serde_json::from_str::<PipeHandshake>(&line) {
            Ok(handshake) if !handshake.pipe_name.is_empty() => {
                debug!(pipe = %handshake.pipe_name, "server announced its socket");
                return Ok(PathBuf::from(handshake.pipe_name));
            }
            _ => continue,
        }
    }
}

/// Substitutes a proxy socket for `server_path`.
///
/// Listens on a fresh socket inside a temp directory, announces that path
/// on `announce` (host stdout in production) so the client connects to the
/// proxy, accepts the one client connection, and connects to the original
/// server socket. The returned [`SocketGuard`] must outlive the splice.
pub async fn intercept_unix_socket<W>(
    server_path: &Path,
    mut announce: W,
) -> Result<(Endpoints, SocketGuard), LspTraceError>
where
    W: AsyncWrite + Unpin,
{
    let dir = tempfile::Builder::new()
        .prefix("lsptrace-sock-")
        .tempdir()
        .map_err(LspTraceError::ProxySocketDir)?;
    let file_name = server_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "lsp.sock".into());
    let proxy_path = dir.path().join(file_name);
    let listener =
        UnixListener::bind(&proxy_path).map_err(|source| LspTraceError::ProxySocketBind {
            path: proxy_path.clone(),
            source,
        })?;

    let handshake = PipeHandshake {
        pipe_name: proxy_path.to_string_lossy().into_owned(),
    };
    let mut line = serde_json::to_vec(&handshake)
        .map_err(|err| LspTraceError::HandshakeWrite(std::io::Error::other(err)))?;
    line.push(b'\n');
    announce
        .write_all(&line)
        .await
        .map_err(LspTraceError::HandshakeWrite)?;
    announce
        .flush()
        .await
        .map_err(LspTraceError::HandshakeWrite)?;

    info!(
        proxy = %proxy_path.display(),
        server = %server_path.display(),
        "waiting for client on proxy socket"
    );
    let (client_conn, _) = listener
        .accept()
        .await
        .map_err(LspTraceError::ProxySocketAccept)?;
    let server_conn =
        UnixStream::connect(server_path)
            .await
            .map_err(|source| LspTraceError::ServerSocketConnect {
                path: server_path.to_path_buf(),
                source,
            })?;
    // Exactly one connection is spliced; stop listening.
    drop(listener);

    let (client_read, client_write) = client_conn.into_split();
    let (server_read, server_write) = server_conn.into_split();
    Ok((
        Endpoints {
            client_read: Box::new(client_read),
            client_write: Box::new(client_write),
            server_read: Box::new(server_read),
            server_write: Box::new(server_write),
        },
        SocketGuard {
            path: proxy_path,
            _dir: dir,
        },
    ))
}

/// Full named-pipe interception against a spawned child: handshake read
/// from the child's stdout, proxy announcement written to host stdout.
pub(crate) async fn intercept_named_pipe(
    child: &mut Child,
) -> Result<(Endpoints, SocketGuard), LspTraceError> {
    let stdout = child.stdout.take().ok_or(LspTraceError::StdoutUnavailable)?;
    let server_path = poll_for_pipe_handshake(stdout).await?;
    intercept_unix_socket(&server_path, tokio::io::stdout()).await
}
