use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::correlator::RequestMap;
use crate::error::LspTraceError;
use crate::message::Origin;
use crate::pipeline::DirectionPipeline;
use crate::sink::TraceWriter;
use crate::transport;

/// Builder for [`TraceProxy`].
#[derive(Debug, Clone)]
pub struct TraceProxyBuilder {
    server_cmd: PathBuf,
    server_args: Vec<String>,
    trace_output: PathBuf,
    handle_named_pipes: bool,
    env: BTreeMap<String, String>,
}

impl TraceProxyBuilder {
    pub fn new(server_cmd: impl Into<PathBuf>, trace_output: impl Into<PathBuf>) -> Self {
        Self {
            server_cmd: server_cmd.into(),
            server_args: Vec::new(),
            trace_output: trace_output.into(),
            handle_named_pipes: false,
            env: BTreeMap::new(),
        }
    }

    /// Appends one pass-through argument for the language server.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.server_args.push(arg.into());
        self
    }

    /// Appends pass-through arguments for the language server.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.server_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Selects the Unix-socket interception mode instead of stdio tracing.
    pub fn handle_named_pipes(mut self, enabled: bool) -> Self {
        self.handle_named_pipes = enabled;
        self
    }

    pub fn build(self) -> TraceProxy {
        TraceProxy {
            server_cmd: self.server_cmd,
            server_args: self.server_args,
            trace_output: self.trace_output,
            handle_named_pipes: self.handle_named_pipes,
            env: self.env,
        }
    }
}

/// The proxy: spawns the language server, splices client and server
/// byte streams unmodified, and appends a trace record per decoded
/// JSON-RPC message to the trace output.
pub struct TraceProxy {
    server_cmd: PathBuf,
    server_args: Vec<String>,
    trace_output: PathBuf,
    handle_named_pipes: bool,
    env: BTreeMap<String, String>,
}

impl TraceProxy {
    pub fn builder(
        server_cmd: impl Into<PathBuf>,
        trace_output: impl Into<PathBuf>,
    ) -> TraceProxyBuilder {
        TraceProxyBuilder::new(server_cmd, trace_output)
    }

    /// Runs the proxy until the language server exits and returns the
    /// server's exit status.
    pub async fn run(self) -> Result<ExitStatus, LspTraceError> {
        let sink = TraceWriter::from_path(&self.trace_output).await?;

        let mut command = Command::new(&self.server_cmd);
        command
            .args(&self.server_args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);
        command.stdin(if self.handle_named_pipes {
            std::process::Stdio::null()
        } else {
            std::process::Stdio::piped()
        });
        for (key, value) in &self.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| LspTraceError::Spawn {
            binary: self.server_cmd.clone(),
            source,
        })?;
        info!(
            binary = %self.server_cmd.display(),
            named_pipes = self.handle_named_pipes,
            "language server started"
        );

        let (endpoints, socket_guard) = if self.handle_named_pipes {
            let (endpoints, guard) = transport::intercept_named_pipe(&mut child).await?;
            (endpoints, Some(guard))
        } else {
            (transport::stdio_endpoints(&mut child)?, None)
        };

        let requests = Arc::new(RequestMap::new());
        let client_to_server = DirectionPipeline::new(
            endpoints.client_read,
            endpoints.server_write,
            sink.clone(),
            Arc::clone(&requests),
            Origin::Client,
        )
        .start();
        let server_to_client = DirectionPipeline::new(
            endpoints.server_read,
            endpoints.client_write,
            sink,
            requests,
            Origin::Server,
        )
        .start();

        let status = child
            .wait()
            .await
            .map_err(|source| LspTraceError::Wait { source })?;
        debug!(?status, "language server exited");

        // The server side of the wire is closed now, so this direction sees
        // EOF and drains its remaining traces. The client side may never
        // close its end; cut that direction loose.
        let _ = server_to_client.await;
        client_to_server.abort();
        drop(socket_guard);

        Ok(status)
    }
}
