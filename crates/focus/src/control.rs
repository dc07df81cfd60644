//! Cross-process control socket
//!
//! A running engine listens on `<runtime>/focus/focus.sock`. Each connection
//! carries one JSON request; the client half-closes its side and reads the
//! JSON response to EOF.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::engine::EngineHandle;
use crate::error::{FocusError, FocusResult};
use crate::session::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlRequest {
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_minutes: Option<u32>,
    },
    Pause,
    Stop,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

impl ControlResponse {
    fn from_result(result: FocusResult<Snapshot>) -> Self {
        match result {
            Ok(snapshot) => Self {
                ok: true,
                error: None,
                snapshot: Some(snapshot),
            },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
                snapshot: None,
            },
        }
    }
}

/// Serves control requests for one engine. Removes its socket file on drop.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    handle: EngineHandle,
}

impl ControlServer {
    pub fn bind(path: &Path, handle: EngineHandle) -> FocusResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                return Err(FocusError::Rejected(
                    "a focus session is already running".to_string(),
                ));
            }
            debug!(socket = %path.display(), "Removing stale socket");
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        info!(socket = %path.display(), "Control socket listening");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            handle,
        })
    }

    /// Accept connections until the engine tears down
    pub async fn serve(self) {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("Control socket accept failed: {}", e);
                    continue;
                }
            };

            let handle = self.handle.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handle).await {
                    warn!("Control connection failed: {}", e);
                }
            });
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn handle_connection(mut stream: UnixStream, handle: EngineHandle) -> FocusResult<()> {
    let mut request_bytes = Vec::new();
    stream.read_to_end(&mut request_bytes).await?;

    let response = match serde_json::from_slice::<ControlRequest>(&request_bytes) {
        Ok(request) => {
            debug!(?request, "Control request");
            ControlResponse::from_result(execute(request, &handle).await)
        }
        Err(e) => ControlResponse {
            ok: false,
            error: Some(format!("malformed request: {}", e)),
            snapshot: None,
        },
    };

    let response_bytes = serde_json::to_vec(&response)?;
    stream.write_all(&response_bytes).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn execute(request: ControlRequest, handle: &EngineHandle) -> FocusResult<Snapshot> {
    match request {
        ControlRequest::Start { duration_minutes } => {
            let duration = duration_minutes.map(|m| Duration::from_secs(u64::from(m) * 60));
            handle.start(duration).await
        }
        ControlRequest::Pause => handle.pause().await,
        ControlRequest::Stop => handle.stop().await,
        ControlRequest::Status => Ok(handle.snapshot()),
    }
}

/// Client for a running engine's control socket
pub struct ControlClient {
    socket_path: PathBuf,
}

impl ControlClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Whether an engine is accepting connections
    pub async fn is_listening(&self) -> bool {
        UnixStream::connect(&self.socket_path).await.is_ok()
    }

    async fn send_request(&self, request: ControlRequest) -> Result<ControlResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .context("No focus session is running")?;

        let request_bytes = serde_json::to_vec(&request)?;
        stream.write_all(&request_bytes).await?;
        stream.shutdown().await?;

        let mut response_bytes = Vec::new();
        stream.read_to_end(&mut response_bytes).await?;

        serde_json::from_slice(&response_bytes).context("Failed to parse focus response")
    }

    async fn request(&self, request: ControlRequest) -> Result<Snapshot> {
        let response = self.send_request(request).await?;
        match response.snapshot {
            Some(snapshot) if response.ok => Ok(snapshot),
            _ => Err(FocusError::Rejected(
                response.error.unwrap_or_else(|| "no snapshot returned".to_string()),
            )
            .into()),
        }
    }

    pub async fn start(&self, duration_minutes: Option<u32>) -> Result<Snapshot> {
        self.request(ControlRequest::Start { duration_minutes }).await
    }

    pub async fn pause(&self) -> Result<Snapshot> {
        self.request(ControlRequest::Pause).await
    }

    pub async fn stop(&self) -> Result<Snapshot> {
        self.request(ControlRequest::Stop).await
    }

    pub async fn status(&self) -> Result<Snapshot> {
        self.request(ControlRequest::Status).await
    }
}
