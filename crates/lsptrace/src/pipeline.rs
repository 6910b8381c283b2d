use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::correlator::RequestMap;
use crate::decoder::FrameDecoder;
use crate::message::{Origin, RawMessage, Trace};
use crate::sink::TraceWriter;
use crate::tracer::Tracer;

/// Type-erased endpoint reader.
pub type DynReader = Box<dyn AsyncRead + Send + Unpin>;
/// Type-erased endpoint writer.
pub type DynWriter = Box<dyn AsyncWrite + Send + Unpin>;

const READ_BUF_SIZE: usize = 16 * 1024;
const STAGE_QUEUE_DEPTH: usize = 32;

/// The stage chain for one direction of the wire.
///
/// Four tasks connected by bounded queues: input (reads the source and
/// tees each chunk to the forward endpoint and the decode queue), decoder,
/// classifier, and sink. Shutdown is driven solely by EOF on the source:
/// each stage drains its input queue, then closes its output by dropping
/// the sender.
pub struct DirectionPipeline {
    reader: DynReader,
    forward: DynWriter,
    sink: TraceWriter,
    tracer: Tracer,
}

impl DirectionPipeline {
    pub fn new(
        reader: DynReader,
        forward: DynWriter,
        sink: TraceWriter,
        requests: Arc<RequestMap>,
        from: Origin,
    ) -> Self {
        Self {
            reader,
            forward,
            sink,
            tracer: Tracer::new(from, requests),
        }
    }

    /// Spawns the stages and returns the handle that resolves when the
    /// sink stage exits, i.e. when EOF on the source has propagated
    /// end-to-end.
    pub fn start(self) -> JoinHandle<()> {
        let from = self.tracer.origin();
        let (chunk_tx, chunk_rx) = mpsc::channel(STAGE_QUEUE_DEPTH);
        let (message_tx, message_rx) = mpsc::channel(STAGE_QUEUE_DEPTH);
        let (trace_tx, trace_rx) = mpsc::channel(STAGE_QUEUE_DEPTH);
        let (go_tx, go_rx) = oneshot::channel();

        tokio::spawn(decode_stage(chunk_rx, message_tx, from));
        tokio::spawn(classify_stage(message_rx, trace_tx, self.tracer));
        let done = tokio::spawn(sink_stage(trace_rx, self.sink, from));
        tokio::spawn(input_stage(
            self.reader,
            self.forward,
            chunk_tx,
            go_rx,
            from,
        ));

        // Every downstream stage is subscribed; release the input stage.
        let _ = go_tx.send(());
        done
    }
}

/// Reads the source and tees each chunk: forward write first, so decoder
/// back-pressure can only slow further reads, never delay forwarding.
async fn input_stage(
    mut reader: DynReader,
    mut forward: DynWriter,
    chunks: mpsc::Sender<Vec<u8>>,
    go: oneshot::Receiver<()>,
    from: Origin,
) {
    let _ = go.await;
    let mut buf = vec![0u8; READ_BUF_SIZE];
    let mut decode_open = true;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                debug!(from = from.as_str(), %err, "source read failed, treating as EOF");
                break;
            }
        };
        if let Err(err) = forward.write_all(&buf[..n]).await {
            warn!(from = from.as_str(), %err, "forward write failed, tearing down direction");
            break;
        }
        if let Err(err) = forward.flush().await {
            warn!(from = from.as_str(), %err, "forward flush failed, tearing down direction");
            break;
        }
        // The chunk is copied out because `buf` is reused by the next read.
        if decode_open && chunks.send(buf[..n].to_vec()).await.is_err() {
            // The decode chain is gone; keep the forward path alive.
            decode_open = false;
        }
    }
    debug!(from = from.as_str(), "input stage done");
}

async fn decode_stage(
    mut chunks: mpsc::Receiver<Vec<u8>>,
    messages: mpsc::Sender<RawMessage>,
    from: Origin,
) {
    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = chunks.recv().await {
        decoder.extend(&chunk);
        loop {
            match decoder.decode_next() {
                Ok(Some(message)) => {
                    if messages.send(message).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(from = from.as_str(), %err, "framing error, resynchronizing");
                }
            }
        }
    }
}

async fn classify_stage(
    mut messages: mpsc::Receiver<RawMessage>,
    traces: mpsc::Sender<Trace>,
    tracer: Tracer,
) {
    while let Some(message) = messages.recv().await {
        if traces.send(tracer.trace(message)).await.is_err() {
            return;
        }
    }
}

async fn sink_stage(mut traces: mpsc::Receiver<Trace>, writer: TraceWriter, from: Origin) {
    while let Some(trace) = traces.recv().await {
        if let Err(err) = writer.write(&trace).await {
            warn!(from = from.as_str(), %err, "trace sink write failed, stopping trace output");
            return;
        }
    }
}
