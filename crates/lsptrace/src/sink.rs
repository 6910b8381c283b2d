use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::LspTraceError;
use crate::message::Trace;

/// Shared, line-atomic sink for serialized trace records.
///
/// Both directional pipelines append to the same writer; the lock is held
/// for one whole record, so lines from the two directions never interleave.
#[derive(Clone)]
pub struct TraceWriter {
    inner: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl TraceWriter {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Opens (or creates) `path` for appending.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, LspTraceError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| LspTraceError::TraceOpen {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file))
    }

    /// Appends one trace as a single JSON line.
    ///
    /// A record that fails to serialize is logged and dropped; I/O failures
    /// surface to the caller.
    pub async fn write(&self, trace: &Trace) -> io::Result<()> {
        let mut line = match serde_json::to_vec(trace) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "dropping trace record that failed to serialize");
                return Ok(());
            }
        };
        line.push(b'\n');
        let mut writer = self.inner.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await
    }
}
