//! tokio-tungstenite WebSocket relay server.
//!
//! Accepts browser connections on `/relay/{audio|signal}/{identity}`,
//! registers each one in its channel's registry, relays audio frames to
//! other peers and routes call signals through the session table.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::application::ports::PeerLink;
use crate::application::registry::ConnectionRegistry;
use crate::application::relay::AudioRelay;
use crate::application::sessions::CallSessionTable;
use crate::application::signaling::SignalRouter;
use crate::config::RelayConfig;
use crate::domain::frame::AudioFrame;
use crate::domain::identity::{Channel, LinkId, PeerIdentity, RelayPath};

use super::codec::JsonSignalCodec;
use super::link::WsLink;

type WsStream = WebSocketStream<TcpStream>;

// ---------------------------------------------------------------------------
// Relay server
// ---------------------------------------------------------------------------

/// Call-session relay: one listener serving both the audio and the
/// signaling channel.
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
    audio_links: Arc<ConnectionRegistry>,
    signal_links: Arc<ConnectionRegistry>,
    sessions: Arc<CallSessionTable>,
    relay: AudioRelay,
    router: SignalRouter,
    next_link_id: AtomicU64,
}

impl RelayServer {
    /// Validate `config` and bind the listener.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.bind_addr))?;
        let local_addr = listener.local_addr()?;

        let audio_links = Arc::new(ConnectionRegistry::new("audio"));
        let signal_links = Arc::new(ConnectionRegistry::new("signal"));
        let sessions = Arc::new(CallSessionTable::new());
        let relay = AudioRelay::new(Arc::clone(&audio_links), Arc::clone(&sessions), config.routing);
        let router = SignalRouter::new(
            Arc::clone(&signal_links),
            Arc::clone(&sessions),
            Arc::new(JsonSignalCodec),
        );

        info!(%local_addr, routing = %config.routing, "Relay listening");

        Ok(Self {
            listener,
            config,
            audio_links,
            signal_links,
            sessions,
            relay,
            router,
            next_link_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn audio_registry(&self) -> &Arc<ConnectionRegistry> {
        &self.audio_links
    }

    pub fn signal_registry(&self) -> &Arc<ConnectionRegistry> {
        &self.signal_links
    }

    pub fn sessions(&self) -> &Arc<CallSessionTable> {
        &self.sessions
    }

    /// Run the accept loop. Each connection gets its own task; a failing
    /// connection is logged and never affects the others.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        loop {
            let (stream, remote) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {e}");
                    continue;
                }
            };
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, remote).await {
                    warn!(%remote, "Connection handler error: {e:#}");
                }
            });
        }
    }

    /// Run until `shutdown` resolves, then close every connection.
    pub async fn run_until(
        self: Arc<Self>,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        tokio::select! {
            result = Arc::clone(&self).run() => result?,
            () = shutdown => info!("Shutdown requested"),
        }
        self.shutdown();
        Ok(())
    }

    /// Close every link and refuse new registrations.
    pub fn shutdown(&self) {
        self.audio_links.shutdown();
        self.signal_links.shutdown();
    }

    // -----------------------------------------------------------------------
    // Connection handling
    // -----------------------------------------------------------------------

    async fn handle_connection(
        &self,
        stream: TcpStream,
        remote: SocketAddr,
    ) -> anyhow::Result<()> {
        let mut request_path = String::new();
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                request_path = request.uri().path().to_owned();
                Ok(response)
            },
        )
        .await
        .context("WebSocket handshake failed")?;

        let path = RelayPath::parse(&request_path);
        if path.generated {
            info!(%remote, path = %request_path, identity = %path.identity, "No identity in request path, assigned fallback");
        }

        self.serve(ws, path, remote).await
    }

    async fn serve(&self, ws: WsStream, path: RelayPath, remote: SocketAddr) -> anyhow::Result<()> {
        let RelayPath {
            channel, identity, ..
        } = path;
        let link_id = LinkId(self.next_link_id.fetch_add(1, Ordering::Relaxed));
        let capacity = match channel {
            Channel::Audio => self.config.audio_queue_capacity,
            Channel::Signal => self.config.signal_queue_capacity,
        };
        let link = Arc::new(WsLink::new(link_id, channel, capacity));
        let registry = self.registry(channel);

        let (sink, stream) = ws.split();
        let writer = tokio::spawn(write_loop(
            sink,
            Arc::clone(&link),
            self.config.heartbeat_interval,
        ));

        if let Err(e) = registry.register(identity.clone(), link.clone()) {
            // The registry closed the link; the writer sends the close frame.
            let _ = writer.await;
            return Err(e.into());
        }
        info!(%identity, %channel, %remote, link = ?link_id, "Peer connected");

        let result = self.read_loop(stream, &identity, channel, &link).await;

        // Cleanup: a superseded link must not evict its replacement.
        link.close();
        let owned = registry.unregister_link(&identity, link_id);
        if owned && channel == Channel::Signal {
            self.router.disconnect(&identity);
        }
        let _ = writer.await;
        info!(%identity, %channel, link = ?link_id, "Peer disconnected");

        result
    }

    async fn read_loop(
        &self,
        mut stream: SplitStream<WsStream>,
        identity: &PeerIdentity,
        channel: Channel,
        link: &WsLink,
    ) -> anyhow::Result<()> {
        let idle_timeout = self.config.idle_timeout;
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(idle_timeout, stream.next()) => next,
                () = link.closed() => {
                    debug!(%identity, %channel, "Link closed, stopping reader");
                    return Ok(());
                }
            };

            let msg = match next {
                Err(_) => {
                    info!(%identity, %channel, ?idle_timeout, "Connection idle, closing");
                    return Ok(());
                }
                Ok(None) => return Ok(()),
                Ok(Some(result)) => result.context("WebSocket read failed")?,
            };

            match (channel, msg) {
                (Channel::Audio, Message::Binary(data)) => {
                    self.relay.on_frame(identity, &AudioFrame::from(data));
                }
                (Channel::Signal, Message::Text(text)) => {
                    self.router.route(identity, &text);
                }
                (_, Message::Close(frame)) => {
                    debug!(%identity, %channel, ?frame, "Close frame received");
                    return Ok(());
                }
                (_, Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                (channel, other) => {
                    debug!(%identity, %channel, kind = message_kind(&other), "Ignoring message not meant for this channel");
                }
            }
        }
    }

    fn registry(&self, channel: Channel) -> &Arc<ConnectionRegistry> {
        match channel {
            Channel::Audio => &self.audio_links,
            Channel::Signal => &self.signal_links,
        }
    }
}

// ---------------------------------------------------------------------------
// Writer task
// ---------------------------------------------------------------------------

/// Drain `link` into the socket, pinging every `heartbeat`. Closes the link
/// when the socket fails so the reader stops too.
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    link: Arc<WsLink>,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let msg = tokio::select! {
            next = link.next_message() => match next {
                Some(msg) => msg,
                None => break,
            },
            _ = ticker.tick() => Message::Ping(Vec::new()),
        };
        if let Err(e) = sink.send(msg).await {
            debug!(link = ?link.id(), "WebSocket write failed: {e}");
            break;
        }
    }

    link.close();
    let _ = sink.close().await;
}

fn message_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}
