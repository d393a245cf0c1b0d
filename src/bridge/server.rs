//! WebSocket Server relaying local PTY sessions to display surfaces
//!
//! Every accepted connection is one surface. After token authentication the
//! surface drives its session with Relay Protocol commands and receives the
//! session's output and exit.

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::protocol::{RelayCommand, RelayEvent};
use super::token::validate_token;
use crate::config::SurfaceOptions;
use crate::local::{RegistryError, SessionEvent, SessionEvents, SessionHandle, SurfaceId};
use crate::state::AppContext;

/// Time a surface has to present the token
const AUTH_TIMEOUT: Duration = Duration::from_secs(5);
/// Consider a surface dead if a single send takes longer than this
const SEND_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a closing connection waits for queued frames to flush
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to bind WebSocket server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Authentication failed: {0}")]
    Auth(&'static str),
}

/// WebSocket Bridge server
pub struct WsBridge {
    listener: TcpListener,
    ctx: Arc<AppContext>,
}

impl WsBridge {
    /// Bind the relay endpoint to the configured listen address
    pub async fn bind(ctx: Arc<AppContext>) -> Result<Self, BridgeError> {
        let addr = ctx.config().listen.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// URL a surface connects to
    pub fn url(&self) -> Result<String, BridgeError> {
        Ok(format!("ws://{}", self.local_addr()?))
    }

    /// Accept surfaces until the host shutdown token is cancelled
    pub async fn serve(self) {
        let shutdown = self.ctx.shutdown_token();
        if let Ok(addr) = self.listener.local_addr() {
            info!("WebSocket bridge listening on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            warn!("Connection from {} closed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }

        info!("WebSocket bridge stopped");
    }
}

/// Handle a single WebSocket connection (one surface)
async fn handle_connection(stream: TcpStream, ctx: Arc<AppContext>) -> Result<(), BridgeError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if ctx.config().require_token {
        authenticate(&mut ws_receiver, ctx.token()).await?;
        debug!("WebSocket token authentication successful");
    }

    let surface = ctx.open_surface();

    // Task: frame sender - every outgoing message goes through here
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RelayEvent>();
    let sender_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let msg = match event.encode() {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Failed to encode event for {}: {}", surface, e);
                    continue;
                }
            };
            match tokio::time::timeout(SEND_TIMEOUT, ws_sender.send(msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("WebSocket send failed for {}: {}", surface, e);
                    break;
                }
                Err(_) => {
                    warn!("WebSocket send timeout for {}, client unresponsive", surface);
                    break;
                }
            }
        }
        let _ = ws_sender.close().await;
        debug!("Frame sender stopped for {}", surface);
    });

    let mut conn = SurfaceConnection {
        surface,
        options: ctx.default_options().clone(),
        cols: None,
        rows: None,
        ctx: ctx.clone(),
        out_tx,
    };

    let shutdown = ctx.shutdown_token();
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Host shutting down, closing {}", surface);
                break;
            }
            next = ws_receiver.next() => next,
        };

        let msg = match next {
            Some(Ok(Message::Close(_))) | None => {
                debug!("{} closed by client", surface);
                break;
            }
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!("WebSocket receive error for {}: {}", surface, e);
                break;
            }
        };

        match RelayCommand::decode(msg) {
            Ok(Some(RelayCommand::Teardown)) => {
                debug!("{} requested teardown", surface);
                break;
            }
            Ok(Some(command)) => conn.handle(command).await,
            Ok(None) => {}
            Err(e) => warn!("Ignoring message from {}: {}", surface, e),
        }
    }

    ctx.close_surface(surface).await;
    drop(conn);

    // Sender drains once every forwarder has let go of its channel
    if tokio::time::timeout(FLUSH_TIMEOUT, sender_task).await.is_err() {
        debug!("Frame sender for {} did not finish in time", surface);
    }
    info!("WebSocket bridge terminated for {}", surface);
    Ok(())
}

/// Authenticate: expect first message to contain token
async fn authenticate(
    ws_receiver: &mut SplitStream<WebSocketStream<TcpStream>>,
    expected: &str,
) -> Result<(), BridgeError> {
    let auth_result = tokio::time::timeout(AUTH_TIMEOUT, ws_receiver.next()).await;

    let token = match auth_result {
        Ok(Some(Ok(Message::Text(token)))) => token,
        Ok(Some(Ok(Message::Binary(data)))) => String::from_utf8_lossy(&data).into_owned(),
        Ok(Some(Ok(_))) => {
            error!("WebSocket authentication failed: unexpected message type");
            return Err(BridgeError::Auth("unexpected message"));
        }
        Ok(Some(Err(e))) => {
            error!("WebSocket error during authentication: {}", e);
            return Err(BridgeError::Handshake(e));
        }
        Ok(None) => {
            error!("WebSocket closed before authentication");
            return Err(BridgeError::Auth("connection closed"));
        }
        Err(_) => {
            error!("WebSocket authentication timeout");
            return Err(BridgeError::Auth("timeout"));
        }
    };

    if validate_token(&token, expected) {
        Ok(())
    } else {
        error!("WebSocket token authentication failed: invalid token");
        Err(BridgeError::Auth("invalid token"))
    }
}

/// Per-surface state of an authenticated connection
struct SurfaceConnection {
    surface: SurfaceId,
    options: SurfaceOptions,
    cols: Option<u16>,
    rows: Option<u16>,
    ctx: Arc<AppContext>,
    out_tx: mpsc::UnboundedSender<RelayEvent>,
}

impl SurfaceConnection {
    async fn handle(&mut self, command: RelayCommand) {
        let registry = self.ctx.registry();
        match command {
            RelayCommand::Open { argv, cols, rows } => {
                if !argv.is_empty() {
                    self.options = SurfaceOptions::from_args(&argv);
                }
                self.cols = cols;
                self.rows = rows;
                self.send(RelayEvent::Theme(self.options.theme()));
                self.start_session().await;
            }
            RelayCommand::Input { data } => registry.write(self.surface, &data).await,
            RelayCommand::Resize { cols, rows } => {
                self.cols = Some(cols);
                self.rows = Some(rows);
                registry.resize(self.surface, cols, rows).await;
            }
            RelayCommand::Kill => self.destroy_session().await,
            RelayCommand::Restart => {
                info!("Restarting session of {}", self.surface);
                self.destroy_session().await;
                self.start_session().await;
            }
            // Title reported by the terminal (OSC 0/2); echoed as-is and
            // never folded into the `--title` suffix
            RelayCommand::SetTitle { title } => {
                debug!("{} title set to {:?}", self.surface, title);
                self.send(RelayEvent::Title { title });
            }
            RelayCommand::GetTheme => self.send(RelayEvent::Theme(self.options.theme())),
            // Handled by the connection loop
            RelayCommand::Teardown => {}
        }
    }

    async fn start_session(&self) {
        let spec = self.ctx.launch_spec(self.cols, self.rows);
        match self
            .ctx
            .registry()
            .create(self.surface, spec, self.options.priming())
            .await
        {
            Ok((session, events)) => {
                spawn_forwarder(
                    self.ctx.clone(),
                    self.surface,
                    session,
                    events,
                    self.out_tx.clone(),
                );
            }
            Err(e) => warn!("Not starting session: {}", e),
        }
    }

    async fn destroy_session(&self) {
        match self.ctx.registry().destroy(self.surface).await {
            Ok(()) => {}
            Err(RegistryError::NotFound(_)) => debug!("{} has no session to kill", self.surface),
            Err(e) => warn!("Failed to kill session of {}: {}", self.surface, e),
        }
    }

    fn send(&self, event: RelayEvent) {
        if self.out_tx.send(event).is_err() {
            debug!("Frame channel closed for {}", self.surface);
        }
    }
}

/// Task: forward session output and exit to the surface, then evict the
/// exited session so the surface may open another
fn spawn_forwarder(
    ctx: Arc<AppContext>,
    surface: SurfaceId,
    session: SessionHandle,
    mut events: SessionEvents,
    out_tx: mpsc::UnboundedSender<RelayEvent>,
) {
    let session_id = session.id().to_string();
    // The registry owns the session; holding it here would keep it alive
    drop(session);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Data(chunk) => {
                    if out_tx.send(RelayEvent::Data(chunk)).is_err() {
                        debug!("Frame channel closed");
                        break;
                    }
                }
                SessionEvent::Exit(code) => {
                    info!("Session {} of {} exited with code {}", session_id, surface, code);
                    let _ = out_tx.send(RelayEvent::Exit { code });
                    ctx.registry().evict_exited(surface, &session_id).await;
                    break;
                }
            }
        }
        debug!("Session -> WS forwarder stopped for {}", session_id);
    });
}
