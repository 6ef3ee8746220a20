//! MCP tool server session over a child process's stdio.
//!
//! [`McpSession`] owns the child and both of its streams. A background
//! reader task is the single consumer of the server's stdout and routes
//! every line: responses go to the waiting caller through a `oneshot`
//! registered under the request id, server requests are answered, and
//! notifications are logged. A writer task is the single producer on the
//! server's stdin; callers hand it whole frames over a channel, so a caller
//! that is cancelled mid-request can never leave half a frame behind.
//!
//! ```text
//!   call_tool ──frame──▶ writer task ──▶ child stdin
//!       ▲
//!       └──oneshot── pending[id] ◀── reader task ◀── child stdout
//! ```

use crate::mcp::error::{McpError, Result};
use crate::mcp::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcNotificationOut, JsonRpcRequest, JsonRpcResponse, JsonRpcResponseOut, ListToolsParams,
    ListToolsResult, METHOD_NOT_FOUND, RpcError, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::transport::{MessageKind, classify_message, encode_frame};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{OnceCell, mpsc, oneshot};
use tokio::task::JoinHandle;
use toolchat_application::{BackendError, ToolBackend};
use toolchat_domain::util::preview;
use toolchat_domain::{BackendState, ToolDescriptor, ToolError, ToolResult};
use tracing::{debug, error, info, trace, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<JsonRpcResponse>>>>>;
type SharedState = Arc<Mutex<BackendState>>;

/// How to launch and talk to the tool server.
#[derive(Debug, Clone)]
pub struct McpSessionConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Added to (or overriding) the inherited environment.
    pub env: BTreeMap<String, String>,
    pub handshake_timeout: Duration,
    pub call_timeout: Duration,
    /// How long `close()` waits for the child to exit after closing stdin.
    pub shutdown_grace: Duration,
}

impl Default for McpSessionConfig {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            args: ["-y", "@azure/mcp@latest", "server", "start"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            env: BTreeMap::new(),
            handshake_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Reader/writer tasks of a started session.
struct Channel {
    outbound: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Removes a pending entry when the waiting caller goes away for any reason.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Session with an MCP tool server.
pub struct McpSession {
    config: McpSessionConfig,
    state: SharedState,
    next_id: AtomicU64,
    pending: PendingMap,
    channel: Mutex<Option<Channel>>,
    child: tokio::sync::Mutex<Option<Child>>,
    catalog: OnceCell<Vec<ToolDescriptor>>,
    server_info: Mutex<Option<InitializeResult>>,
}

impl McpSession {
    pub fn new(config: McpSessionConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(BackendState::Unstarted)),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            channel: Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
            catalog: OnceCell::new(),
            server_info: Mutex::new(None),
        }
    }

    /// Spawn the tool server and perform the handshake.
    ///
    /// On any failure the session is left `Closed` with the child reaped.
    pub async fn start(&self) -> std::result::Result<(), BackendError> {
        self.begin_start()?;
        info!(
            "Starting tool server: {} {}",
            self.config.command,
            self.config.args.join(" ")
        );

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Linux: request kernel to send SIGTERM to child when parent dies.
        // This catches cases where Drop doesn't run (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.set_state(BackendState::Closed);
                warn!("Failed to spawn tool server '{}': {}", self.config.command, e);
                return Err(BackendError::Unavailable(format!(
                    "failed to spawn '{}': {}",
                    self.config.command, e
                )));
            }
        };

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                self.set_state(BackendState::Closed);
                return Err(BackendError::Unavailable(
                    "failed to capture tool server stdio".to_string(),
                ));
            }
        };
        *self.child.lock().await = Some(child);

        self.attach(stdout, stdin);
        self.finish_start().await
    }

    /// Perform the handshake over an already-connected byte channel.
    pub async fn start_with_io<R, W>(&self, reader: R, writer: W) -> std::result::Result<(), BackendError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.begin_start()?;
        self.attach(reader, writer);
        self.finish_start().await
    }

    /// Protocol information the server announced during the handshake.
    pub fn server_info(&self) -> Option<InitializeResult> {
        lock(&self.server_info).clone()
    }

    fn begin_start(&self) -> std::result::Result<(), BackendError> {
        let mut state = lock(&self.state);
        if *state != BackendState::Unstarted {
            return Err(BackendError::NotReady(*state));
        }
        *state = BackendState::Starting;
        Ok(())
    }

    async fn finish_start(&self) -> std::result::Result<(), BackendError> {
        let timeout = self.config.handshake_timeout;
        let outcome = match tokio::time::timeout(timeout, self.handshake()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(McpError::Timeout {
                method: "initialize".to_string(),
                timeout,
            }),
        };

        match outcome {
            Ok(()) => {
                let observed = {
                    let mut state = lock(&self.state);
                    if *state == BackendState::Starting {
                        *state = BackendState::Ready;
                        return Ok(());
                    }
                    *state
                };
                // The reader already saw the server go away.
                warn!("Tool server went away during startup (session {})", observed);
                self.close().await;
                Err(BackendError::Unavailable(format!(
                    "tool server exited during startup (session {})",
                    observed
                )))
            }
            Err(e) => {
                warn!("Tool server handshake failed: {}", e);
                self.close().await;
                Err(BackendError::Unavailable(format!("handshake failed: {}", e)))
            }
        }
    }

    fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(Self::writer_loop(writer, rx));
        let reader = tokio::spawn(Self::reader_loop(
            reader,
            Arc::clone(&self.pending),
            Arc::clone(&self.state),
            outbound.downgrade(),
        ));
        *lock(&self.channel) = Some(Channel {
            outbound,
            reader,
            writer,
        });
    }

    async fn handshake(&self) -> Result<()> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self
            .request("initialize", Some(params), self.config.handshake_timeout)
            .await?;
        let init: InitializeResult = serde_json::from_value(result)?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&init.protocol_version.as_str()) {
            return Err(McpError::UnsupportedProtocolVersion(init.protocol_version));
        }
        info!(
            "Tool server ready: {} (protocol {})",
            init.server_info
                .as_ref()
                .map(|s| format!("{} {}", s.name, s.version))
                .unwrap_or_else(|| "unnamed".to_string()),
            init.protocol_version
        );
        *lock(&self.server_info) = Some(init);

        self.send(&JsonRpcNotificationOut::new("notifications/initialized"))
    }

    /// Writer task: single producer on the server's stdin.
    async fn writer_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(frame) = rx.recv().await {
            trace!("MCP sending: {}", frame.trim_end());
            if let Err(e) = writer.write_all(frame.as_bytes()).await {
                warn!("Writer loop: write failed: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                warn!("Writer loop: flush failed: {}", e);
                break;
            }
        }
        // Closing stdin is the polite way to ask a stdio server to exit.
        let _ = writer.shutdown().await;
        debug!("Writer loop ended");
    }

    /// Reader task: single consumer of the server's stdout.
    async fn reader_loop<R>(
        reader: R,
        pending: PendingMap,
        state: SharedState,
        outbound: mpsc::WeakUnboundedSender<String>,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    debug!("Reader loop: tool server closed its output");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Reader loop: read error: {}", e);
                    break;
                }
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        "Ignoring non-UTF-8 output from tool server ({}): {}",
                        e,
                        preview(&String::from_utf8_lossy(&buf), 120)
                    );
                    continue;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            trace!("MCP received: {}", trimmed);

            let json: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        "Ignoring non-JSON output from tool server ({}): {}",
                        e,
                        preview(trimmed, 120)
                    );
                    continue;
                }
            };

            match classify_message(&json) {
                MessageKind::Response => Self::route_response(json, &pending, &state),
                MessageKind::IncomingRequest { id } => {
                    Self::answer_server_request(id, &json, &outbound)
                }
                MessageKind::Notification => Self::log_notification(json),
                MessageKind::UncorrelatedError => Self::fail_pending(json, &pending, &state),
                MessageKind::Invalid => {
                    warn!("Ignoring JSON-RPC frame without id or method: {}", preview(trimmed, 120))
                }
            }
        }

        // Reader ended: drop all senders so waiting callers see the channel close
        lock(&pending).clear();
        let mut state = lock(&state);
        if *state != BackendState::Closed {
            if *state == BackendState::Ready {
                warn!("Tool server exited unexpectedly");
            }
            *state = BackendState::Closed;
        }
    }

    fn route_response(json: Value, pending: &PendingMap, state: &SharedState) {
        let response: JsonRpcResponse = match serde_json::from_value(json) {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to parse response from tool server: {}", e);
                return;
            }
        };
        let Some(id) = response.id else {
            warn!("Response from tool server without a numeric id, ignoring");
            return;
        };

        let sender = lock(pending).remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(Ok(response));
            }
            None => {
                // Late answer to a timed-out call, or the server lost track.
                warn!("Response for unknown request id {} (channel desync), discarding", id);
                let mut state = lock(state);
                if *state == BackendState::Ready {
                    *state = BackendState::Degraded;
                }
            }
        }
    }

    /// An error the server could not attribute to a request. Any pending
    /// call may be the one it belongs to, so all of them fail with it.
    fn fail_pending(json: Value, pending: &PendingMap, state: &SharedState) {
        let error = json
            .get("error")
            .cloned()
            .and_then(|e| serde_json::from_value::<RpcError>(e).ok())
            .unwrap_or(RpcError {
                code: 0,
                message: String::new(),
                data: None,
            });
        let message = if error.message.is_empty() {
            "error response without a request id".to_string()
        } else {
            error.message
        };
        warn!(
            "Tool server sent an error without a request id (code {}): {} (channel desync)",
            error.code, message
        );

        {
            let mut state = lock(state);
            if *state == BackendState::Ready {
                *state = BackendState::Degraded;
            }
        }

        let waiting: Vec<_> = lock(pending).drain().collect();
        for (id, tx) in waiting {
            debug!("Failing pending request {} after uncorrelated error", id);
            let _ = tx.send(Err(McpError::RpcError {
                code: error.code,
                message: message.clone(),
            }));
        }
    }

    fn answer_server_request(
        id: Value,
        json: &Value,
        outbound: &mpsc::WeakUnboundedSender<String>,
    ) {
        let method = json.get("method").and_then(|m| m.as_str()).unwrap_or_default();
        let response = if method == "ping" {
            trace!("Answering ping from tool server");
            JsonRpcResponseOut::result(id, Value::Object(Map::new()))
        } else {
            debug!("Rejecting unsupported server request '{}'", method);
            JsonRpcResponseOut::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
        };

        let Some(tx) = outbound.upgrade() else {
            return;
        };
        match encode_frame(&response) {
            Ok(frame) => {
                let _ = tx.send(frame);
            }
            Err(e) => warn!("Failed to encode reply to server request: {}", e),
        }
    }

    fn log_notification(json: Value) {
        let notification: JsonRpcNotification = match serde_json::from_value(json) {
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to parse notification from tool server: {}", e);
                return;
            }
        };

        match notification.method.as_str() {
            "notifications/message" => {
                let params = notification.params.unwrap_or_default();
                let level = params.get("level").and_then(|l| l.as_str()).unwrap_or("info");
                let logger = params
                    .get("logger")
                    .and_then(|l| l.as_str())
                    .unwrap_or("server");
                let data = match params.get("data") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                match level {
                    "debug" => debug!(target: "toolchat::tool_server", "[{}] {}", logger, data),
                    "info" | "notice" => {
                        info!(target: "toolchat::tool_server", "[{}] {}", logger, data)
                    }
                    "warning" => warn!(target: "toolchat::tool_server", "[{}] {}", logger, data),
                    _ => error!(target: "toolchat::tool_server", "[{}] {}", logger, data),
                }
            }
            "notifications/tools/list_changed" => {
                info!("Tool server reported a changed tool list; keeping the session catalog");
            }
            other => trace!("Ignoring notification method={}", other),
        }
    }

    fn set_state(&self, state: BackendState) {
        *lock(&self.state) = state;
    }

    fn degrade(&self) {
        let mut state = lock(&self.state);
        if *state == BackendState::Ready {
            *state = BackendState::Degraded;
        }
    }

    fn ensure_ready(&self) -> std::result::Result<(), BackendError> {
        match *lock(&self.state) {
            BackendState::Ready => Ok(()),
            other => Err(BackendError::NotReady(other)),
        }
    }

    fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let frame = encode_frame(message)?;
        let channel = lock(&self.channel);
        let channel = channel.as_ref().ok_or(McpError::TransportClosed)?;
        channel
            .outbound
            .send(frame)
            .map_err(|_| McpError::TransportClosed)
    }

    /// Send a request and wait for the response with the same id.
    async fn request_raw(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        self.send(&JsonRpcRequest::new(id, method, params))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::TransportClosed),
            Err(_) => Err(McpError::Timeout {
                method: method.to_string(),
                timeout,
            }),
        }
    }

    /// Like [`request_raw`](Self::request_raw) but turns an error payload
    /// into [`McpError::RpcError`].
    async fn request(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        let response = self.request_raw(method, params, timeout).await?;
        if let Some(error) = response.error {
            return Err(McpError::RpcError {
                code: error.code,
                message: error.message,
            });
        }
        response
            .result
            .ok_or_else(|| McpError::UnexpectedResponse(format!("'{}' response has no result", method)))
    }

    async fn fetch_catalog(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = serde_json::to_value(ListToolsParams {
                cursor: cursor.clone(),
            })?;
            let result = self
                .request("tools/list", Some(params), self.config.call_timeout)
                .await?;
            let page: ListToolsResult = serde_json::from_value(result)?;
            tools.extend(page.tools.into_iter().map(ToolDescriptor::from));

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                Some(_) => {
                    warn!("Tool server repeated its pagination cursor, stopping");
                    break;
                }
                None => break,
            }
        }

        info!("Tool server published {} tools", tools.len());
        Ok(tools)
    }

    fn backend_error(&self, e: McpError) -> BackendError {
        if matches!(e, McpError::Timeout { .. }) {
            self.degrade();
        }
        e.into()
    }
}

#[async_trait]
impl ToolBackend for McpSession {
    fn state(&self) -> BackendState {
        *lock(&self.state)
    }

    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, BackendError> {
        self.ensure_ready()?;
        self.catalog
            .get_or_try_init(|| async {
                self.fetch_catalog().await.map_err(|e| self.backend_error(e))
            })
            .await
            .cloned()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> std::result::Result<ToolResult, BackendError> {
        self.ensure_ready()?;
        debug!("Calling tool '{}'", name);
        let started = Instant::now();

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })
        .map_err(|e| BackendError::Protocol(e.to_string()))?;

        let response = self
            .request_raw("tools/call", Some(params), self.config.call_timeout)
            .await
            .map_err(|e| self.backend_error(e))?;
        let elapsed = started.elapsed().as_millis() as u64;

        if let Some(error) = response.error {
            debug!("Tool '{}' rejected by server: {}", name, error.message);
            return Ok(
                ToolResult::failure(name, ToolError::rpc_error(error.code, error.message))
                    .with_duration(elapsed),
            );
        }

        let result: CallToolResult = response
            .result
            .ok_or_else(|| BackendError::Protocol("'tools/call' response has no result".into()))
            .and_then(|v| {
                serde_json::from_value(v).map_err(|e| BackendError::Protocol(e.to_string()))
            })?;

        let text = result.render();
        let outcome = if result.is_error {
            ToolResult::failure(name, ToolError::tool_failed(text))
        } else {
            ToolResult::success(name, text)
        };
        debug!(
            "Tool '{}' finished in {}ms (success: {})",
            name,
            elapsed,
            outcome.is_success()
        );
        Ok(outcome.with_duration(elapsed))
    }

    async fn close(&self) {
        let channel = lock(&self.channel).take();
        let child = self.child.lock().await.take();
        let was = std::mem::replace(&mut *lock(&self.state), BackendState::Closed);

        if channel.is_none() && child.is_none() {
            return;
        }
        debug!("Closing tool server session (was {})", was);

        if let Some(Channel {
            outbound,
            reader,
            writer,
        }) = channel
        {
            // Dropping the last sender ends the writer task, which closes stdin.
            drop(outbound);
            if tokio::time::timeout(self.config.shutdown_grace, writer)
                .await
                .is_err()
            {
                debug!("Writer task did not finish in time");
            }

            if let Some(mut child) = child {
                match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
                    Ok(Ok(status)) => debug!("Tool server exited: {}", status),
                    Ok(Err(e)) => warn!("Failed to wait for tool server: {}", e),
                    Err(_) => {
                        debug!("Tool server still running after grace period, killing");
                        if let Err(e) = child.kill().await {
                            warn!("Failed to kill tool server: {}", e);
                        }
                    }
                }
            }

            reader.abort();
        } else if let Some(mut child) = child {
            let _ = child.kill().await;
        }

        lock(&self.pending).clear();
        info!("Tool server session closed");
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.try_lock()
            && let Some(child) = child.as_mut()
        {
            debug!("McpSession dropping, killing tool server child process");
            let _ = child.start_kill();
        }
        if let Some(channel) = lock(&self.channel).take() {
            channel.reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type Handler = Box<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

    fn test_config() -> McpSessionConfig {
        McpSessionConfig {
            handshake_timeout: Duration::from_secs(2),
            call_timeout: Duration::from_secs(2),
            shutdown_grace: Duration::from_millis(100),
            ..McpSessionConfig::default()
        }
    }

    fn initialize_reply(id: &Value, version: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": version,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake-server", "version": "0.0.1"}
            }
        })
    }

    /// In-memory tool server: answers `initialize` itself and hands every
    /// other request to `handler`. Every frame it receives is recorded.
    fn fake_server(
        io: DuplexStream,
        version: &'static str,
        handler: Handler,
        received: Arc<Mutex<Vec<Value>>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(io);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                received.lock().unwrap().push(msg.clone());
                let is_request = msg.get("id").is_some() && msg.get("method").is_some();
                let replies = if !is_request {
                    vec![]
                } else if msg["method"] == "initialize" {
                    vec![initialize_reply(&msg["id"], version)]
                } else {
                    handler(&msg)
                };
                for reply in replies {
                    let mut frame = reply.to_string();
                    frame.push('\n');
                    if write.write_all(frame.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        })
    }

    fn client_halves(io: DuplexStream) -> (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        tokio::io::split(io)
    }

    async fn started_session(
        handler: Handler,
        config: McpSessionConfig,
    ) -> (McpSession, Arc<Mutex<Vec<Value>>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let received = Arc::new(Mutex::new(Vec::new()));
        fake_server(server, "2025-06-18", handler, Arc::clone(&received));
        let session = McpSession::new(config);
        let (read, write) = client_halves(client);
        session.start_with_io(read, write).await.unwrap();
        (session, received)
    }

    fn echo_handler() -> Handler {
        Box::new(|msg| {
            if msg["method"] != "tools/call" {
                return vec![];
            }
            let text = msg["params"]["arguments"]["text"].as_str().unwrap_or_default();
            vec![json!({
                "jsonrpc": "2.0",
                "id": msg["id"],
                "result": {"content": [{"type": "text", "text": text}], "isError": false}
            })]
        })
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn handshake_sends_initialized_notification() {
        let (session, received) = started_session(echo_handler(), test_config()).await;

        assert_eq!(session.state(), BackendState::Ready);
        assert_eq!(session.server_info().unwrap().protocol_version, "2025-06-18");

        // The notification is written right after the initialize response.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let frames = received.lock().unwrap().clone();
        assert_eq!(frames[0]["method"], "initialize");
        assert_eq!(frames[0]["params"]["capabilities"], json!({}));
        assert_eq!(frames[1]["method"], "notifications/initialized");
        assert!(frames[1].get("id").is_none());
    }

    #[tokio::test]
    async fn call_tool_returns_echoed_text() {
        let (session, _) = started_session(echo_handler(), test_config()).await;

        let result = session
            .call_tool("echo", args(json!({"text": "hi"})))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.output(), Some("hi"));
        assert!(result.duration_ms.is_some());
    }

    #[tokio::test]
    async fn list_tools_follows_cursor_and_caches() {
        let pages = Arc::new(AtomicUsize::new(0));
        let pages_bg = Arc::clone(&pages);
        let handler: Handler = Box::new(move |msg| {
            if msg["method"] != "tools/list" {
                return vec![];
            }
            pages_bg.fetch_add(1, Ordering::SeqCst);
            let result = if msg["params"]["cursor"].is_null() {
                json!({
                    "tools": [{"name": "echo", "description": "echoes input",
                               "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}}],
                    "nextCursor": "2"
                })
            } else {
                json!({"tools": [{"name": "time", "inputSchema": {"type": "object"}}]})
            };
            vec![json!({"jsonrpc": "2.0", "id": msg["id"], "result": result})]
        });
        let (session, _) = started_session(handler, test_config()).await;

        let first = session.list_tools().await.unwrap();
        let second = session.list_tools().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["echo", "time"]
        );
        assert!(first[1].description.is_none());
        assert_eq!(pages.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn tool_reported_error_is_a_tool_error() {
        let handler: Handler = Box::new(|msg| {
            vec![json!({
                "jsonrpc": "2.0",
                "id": msg["id"],
                "result": {"content": [{"type": "text", "text": "subscription not found"}], "isError": true}
            })]
        });
        let (session, _) = started_session(handler, test_config()).await;

        let result = session.call_tool("azmcp_group_list", Map::new()).await.unwrap();

        assert!(!result.is_success());
        let error = result.error().unwrap();
        assert_eq!(error.code, "TOOL_FAILED");
        assert_eq!(error.message, "subscription not found");
        assert_eq!(session.state(), BackendState::Ready);
    }

    #[tokio::test]
    async fn rpc_error_is_a_tool_error() {
        let handler: Handler = Box::new(|msg| {
            vec![json!({
                "jsonrpc": "2.0",
                "id": msg["id"],
                "error": {"code": -32602, "message": "Unknown tool: nope"}
            })]
        });
        let (session, _) = started_session(handler, test_config()).await;

        let result = session.call_tool("nope", Map::new()).await.unwrap();

        assert_eq!(
            result.content_for_model(),
            "Error: [RPC_ERROR] Unknown tool: nope (code -32602)"
        );
    }

    #[tokio::test]
    async fn call_timeout_degrades_session() {
        let config = McpSessionConfig {
            call_timeout: Duration::from_millis(50),
            ..test_config()
        };
        let (session, _) = started_session(Box::new(|_| vec![]), config).await;

        let err = session.call_tool("slow", Map::new()).await.unwrap_err();

        assert!(matches!(err, BackendError::Timeout { ref method, .. } if method == "tools/call"));
        assert_eq!(session.state(), BackendState::Degraded);
        assert!(lock(&session.pending).is_empty());

        let err = session.call_tool("echo", Map::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::NotReady(BackendState::Degraded)));
    }

    #[tokio::test]
    async fn interleaved_traffic_does_not_confuse_correlation() {
        let handler: Handler = Box::new(|msg| {
            if msg["method"] != "tools/call" {
                return vec![];
            }
            vec![
                json!({"jsonrpc": "2.0", "method": "notifications/message",
                       "params": {"level": "info", "logger": "azmcp", "data": "working"}}),
                json!({"jsonrpc": "2.0", "id": "srv-1", "method": "ping"}),
                json!({"jsonrpc": "2.0", "id": "srv-2", "method": "sampling/createMessage"}),
                json!({"jsonrpc": "2.0", "id": msg["id"],
                       "result": {"content": [{"type": "text", "text": "done"}]}}),
            ]
        });
        let (session, received) = started_session(handler, test_config()).await;

        let result = session.call_tool("work", Map::new()).await.unwrap();
        assert_eq!(result.output(), Some("done"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let frames = received.lock().unwrap().clone();
        let ping_reply = frames.iter().find(|f| f["id"] == "srv-1").unwrap();
        assert_eq!(ping_reply["result"], json!({}));
        let rejected = frames.iter().find(|f| f["id"] == "srv-2").unwrap();
        assert_eq!(rejected["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn non_utf8_output_is_skipped() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                let reply = match msg["method"].as_str() {
                    Some("initialize") => initialize_reply(&msg["id"], "2025-06-18"),
                    Some("tools/call") => {
                        write.write_all(b"\xff\xfe stray log\n").await.unwrap();
                        json!({"jsonrpc": "2.0", "id": msg["id"],
                               "result": {"content": [{"type": "text", "text": "after noise"}]}})
                    }
                    _ => continue,
                };
                let mut frame = reply.to_string();
                frame.push('\n');
                write.write_all(frame.as_bytes()).await.unwrap();
            }
        });
        let session = McpSession::new(test_config());
        let (read, write) = client_halves(client);
        session.start_with_io(read, write).await.unwrap();

        let result = session.call_tool("work", Map::new()).await.unwrap();

        assert_eq!(result.output(), Some("after noise"));
        assert_eq!(session.state(), BackendState::Ready);
    }

    #[tokio::test]
    async fn uncorrelated_error_fails_pending_call_promptly() {
        let handler: Handler = Box::new(|_| {
            vec![json!({"jsonrpc": "2.0", "id": null,
                        "error": {"code": -32700, "message": "Parse error"}})]
        });
        let config = McpSessionConfig {
            call_timeout: Duration::from_secs(5),
            ..test_config()
        };
        let (session, _) = started_session(handler, config).await;
        let started = Instant::now();

        let err = session.call_tool("echo", Map::new()).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(err, BackendError::Protocol(ref m) if m.contains("-32700")));
        assert_eq!(session.state(), BackendState::Degraded);
        assert!(lock(&session.pending).is_empty());
    }

    #[tokio::test]
    async fn server_exit_right_after_handshake_leaves_session_closed() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            if let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                let mut frame = initialize_reply(&msg["id"], "2025-06-18").to_string();
                frame.push('\n');
                let _ = write.write_all(frame.as_bytes()).await;
            }
            // Both halves drop here, so the client sees end of stream.
        });
        let session = McpSession::new(test_config());
        let (read, write) = client_halves(client);

        let outcome = session.start_with_io(read, write).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(session.state(), BackendState::Closed);
        if let Err(e) = outcome {
            assert!(e.is_unavailable());
        }
        assert!(matches!(
            session.call_tool("echo", Map::new()).await,
            Err(BackendError::NotReady(BackendState::Closed))
        ));
    }

    #[tokio::test]
    async fn response_with_unknown_id_is_discarded() {
        let handler: Handler = Box::new(|msg| {
            vec![
                json!({"jsonrpc": "2.0", "id": 9999, "result": {"content": []}}),
                json!({"jsonrpc": "2.0", "id": msg["id"],
                       "result": {"content": [{"type": "text", "text": "mine"}]}}),
            ]
        });
        let (session, _) = started_session(handler, test_config()).await;

        let result = session.call_tool("echo", Map::new()).await.unwrap();

        assert_eq!(result.output(), Some("mine"));
        assert_eq!(session.state(), BackendState::Degraded);
    }

    #[tokio::test]
    async fn unsupported_protocol_version_fails_start() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        fake_server(
            server,
            "1999-01-01",
            Box::new(|_| vec![]),
            Arc::new(Mutex::new(Vec::new())),
        );
        let session = McpSession::new(test_config());
        let (read, write) = client_halves(client);

        let err = session.start_with_io(read, write).await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(err.to_string().contains("1999-01-01"));
        assert_eq!(session.state(), BackendState::Closed);
    }

    #[tokio::test]
    async fn silent_server_times_out_handshake() {
        let (client, _server) = tokio::io::duplex(64 * 1024);
        let session = McpSession::new(McpSessionConfig {
            handshake_timeout: Duration::from_millis(50),
            ..test_config()
        });
        let (read, write) = client_halves(client);

        let err = session.start_with_io(read, write).await.unwrap_err();

        assert!(err.is_unavailable());
        assert_eq!(session.state(), BackendState::Closed);
    }

    #[tokio::test]
    async fn spawn_failure_is_unavailable() {
        let session = McpSession::new(McpSessionConfig {
            command: "toolchat-no-such-server-binary".to_string(),
            args: vec![],
            ..test_config()
        });

        let err = session.start().await.unwrap_err();

        assert!(err.is_unavailable());
        assert_eq!(session.state(), BackendState::Closed);
        assert!(matches!(
            session.list_tools().await,
            Err(BackendError::NotReady(BackendState::Closed))
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (session, _) = started_session(echo_handler(), test_config()).await;

        session.close().await;
        session.close().await;

        assert_eq!(session.state(), BackendState::Closed);
        assert!(matches!(
            session.call_tool("echo", Map::new()).await,
            Err(BackendError::NotReady(BackendState::Closed))
        ));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (session, _) = started_session(echo_handler(), test_config()).await;
        let (client, _server) = tokio::io::duplex(1024);
        let (read, write) = client_halves(client);

        let err = session.start_with_io(read, write).await.unwrap_err();

        assert!(matches!(err, BackendError::NotReady(BackendState::Ready)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_handshake_reaps_child() {
        // `cat` echoes frames back, so the handshake can never succeed.
        let session = McpSession::new(McpSessionConfig {
            command: "cat".to_string(),
            args: vec![],
            handshake_timeout: Duration::from_millis(100),
            ..test_config()
        });

        let err = session.start().await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(session.child.lock().await.is_none());
        assert_eq!(session.state(), BackendState::Closed);
    }
}
