use std::collections::VecDeque;
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep, timeout};

use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, error, info, warn};
use url::Url;

use super::lifecycle::{Lifecycle, LinkAction, LinkEvent};
use crate::error::IngestError;
use crate::telemetry::Telemetry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Resolves once shutdown is requested or the signal sender is gone.
pub(crate) async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// What woke the driver loop.
enum Wake {
    Shutdown,
    Frame(Option<Result<Message, WsError>>),
    Heartbeat,
    ReconnectDue,
}

/// Owns the upstream socket: connect, heartbeat, reconnect.
///
/// Text frames are forwarded to the ingestion loop through `frame_sender`.
/// Runs until shutdown is signalled or the ingestion loop goes away.
pub struct ConnectionManager {
    url: Url,
    frame_sender: mpsc::Sender<String>,
    shutdown: watch::Receiver<bool>,
    telemetry: Arc<Telemetry>,
    heartbeat_interval: Duration,
    lifecycle: Lifecycle,
    writer: Option<WsSink>,
    reader: Option<WsSource>,
    heartbeat: Option<Interval>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    dialed_before: bool,
}

impl ConnectionManager {
    pub fn new(
        url: &str,
        frame_sender: mpsc::Sender<String>,
        shutdown: watch::Receiver<bool>,
        telemetry: Arc<Telemetry>,
        heartbeat_interval: Duration,
        reconnect_delay: Duration,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            url: Url::parse(url)?,
            frame_sender,
            shutdown,
            telemetry,
            heartbeat_interval,
            lifecycle: Lifecycle::new(reconnect_delay),
            writer: None,
            reader: None,
            heartbeat: None,
            reconnect_timer: None,
            dialed_before: false,
        })
    }

    // The main loop, runs until shutdown.
    pub async fn run(mut self) {
        let mut events = VecDeque::from([LinkEvent::ConnectRequested]);

        loop {
            while let Some(event) = events.pop_front() {
                self.apply(event, &mut events).await;
            }
            if self.lifecycle.is_stopped() {
                break;
            }
            if let Some(event) = self.next_event().await {
                events.push_back(event);
            }
        }

        info!("Stream listener for {} stopped", self.url);
    }

    async fn apply(&mut self, event: LinkEvent, follow_up: &mut VecDeque<LinkEvent>) {
        match &event {
            LinkEvent::Opened => {
                info!("Connected to {}", self.url);
                self.telemetry.record_open();
            }
            LinkEvent::Closed(reason) => {
                warn!("Stream closed: {}", reason);
                self.telemetry.record_close(reason);
                self.drop_socket();
            }
            LinkEvent::Failed(reason) => {
                error!("Stream error: {}", reason);
                self.telemetry.record_error(reason);
                self.drop_socket();
            }
            LinkEvent::Shutdown => info!("Shutting down stream listener"),
            LinkEvent::ConnectRequested | LinkEvent::ReconnectDue => {}
        }

        let actions = self.lifecycle.handle(event);
        self.telemetry.set_state(self.lifecycle.state());

        for action in actions {
            match action {
                LinkAction::Dial => {
                    let outcome = self.dial().await;
                    follow_up.push_back(outcome);
                }
                LinkAction::StartHeartbeat => {
                    let mut ticker = interval_at(
                        Instant::now() + self.heartbeat_interval,
                        self.heartbeat_interval,
                    );
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.heartbeat = Some(ticker);
                }
                LinkAction::StopHeartbeat => self.heartbeat = None,
                LinkAction::ScheduleReconnect(delay) => {
                    info!("Reconnecting in {:?}", delay);
                    self.reconnect_timer = Some(Box::pin(sleep(delay)));
                }
                LinkAction::CancelReconnect => self.reconnect_timer = None,
                LinkAction::Disconnect => self.disconnect().await,
            }
        }
    }

    async fn dial(&mut self) -> LinkEvent {
        if self.dialed_before {
            self.telemetry.record_reconnect_attempt();
        }
        self.dialed_before = true;
        info!("Connecting to {}...", self.url);

        let result = tokio::select! {
            result = connect_async(self.url.as_str()) => Some(result),
            _ = shutdown_signal(&mut self.shutdown) => None,
        };

        match result {
            Some(Ok((ws_stream, _))) => {
                // 'writer' sends probes and the close frame,
                // 'reader' listens for changes.
                let (writer, reader) = ws_stream.split();
                self.writer = Some(writer);
                self.reader = Some(reader);
                LinkEvent::Opened
            }
            Some(Err(e)) => LinkEvent::Failed(format!("connection failed: {e}")),
            None => LinkEvent::Shutdown,
        }
    }

    async fn next_event(&mut self) -> Option<LinkEvent> {
        let wake = tokio::select! {
            _ = shutdown_signal(&mut self.shutdown) => Wake::Shutdown,
            frame = next_frame(&mut self.reader) => Wake::Frame(frame),
            _ = tick(&mut self.heartbeat) => Wake::Heartbeat,
            _ = wait(&mut self.reconnect_timer) => Wake::ReconnectDue,
        };

        match wake {
            Wake::Shutdown => Some(LinkEvent::Shutdown),
            Wake::Frame(frame) => self.on_frame(frame).await,
            Wake::Heartbeat => self.send_probe().await,
            Wake::ReconnectDue => {
                self.reconnect_timer = None;
                Some(LinkEvent::ReconnectDue)
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<Message, WsError>>) -> Option<LinkEvent> {
        match frame {
            Some(Ok(Message::Text(text))) => {
                self.telemetry.record_message();
                self.forward(text.to_string()).await
            }
            Some(Ok(Message::Binary(bytes))) => {
                self.telemetry.record_message();
                match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => self.forward(text).await,
                    Err(_) => {
                        debug!("Ignoring non UTF-8 binary frame");
                        None
                    }
                }
            }
            Some(Ok(Message::Ping(_))) => {
                // Pong is queued by tungstenite and flushed with the next write
                self.telemetry.record_message();
                None
            }
            Some(Ok(Message::Pong(_))) => {
                self.telemetry.record_heartbeat_ack();
                None
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = match frame {
                    Some(f) => format!("closed by peer ({}): {}", u16::from(f.code), &*f.reason),
                    None => "closed by peer".to_string(),
                };
                Some(LinkEvent::Closed(reason))
            }
            Some(Ok(_)) => None,
            Some(Err(e)) => Some(LinkEvent::Failed(format!("websocket error: {e}"))),
            None => Some(LinkEvent::Closed("stream ended unexpectedly".to_string())),
        }
    }

    async fn forward(&mut self, text: String) -> Option<LinkEvent> {
        if self.frame_sender.send(text).await.is_err() {
            // ingestion loop dropped, stop the listener
            info!("{}, stopping listener", IngestError::ChannelClosed);
            return Some(LinkEvent::Shutdown);
        }
        None
    }

    async fn send_probe(&mut self) -> Option<LinkEvent> {
        let writer = self.writer.as_mut()?;
        if let Err(e) = writer.send(Message::Ping(Default::default())).await {
            return Some(LinkEvent::Failed(format!("heartbeat failed: {e}")));
        }
        self.telemetry.record_heartbeat_sent();
        None
    }

    async fn disconnect(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = timeout(Duration::from_secs(1), writer.send(Message::Close(None))).await;
        }
        self.reader = None;
        self.heartbeat = None;
        self.reconnect_timer = None;
    }

    fn drop_socket(&mut self) {
        self.writer = None;
        self.reader = None;
    }
}

async fn next_frame(reader: &mut Option<WsSource>) -> Option<Result<Message, WsError>> {
    match reader {
        Some(reader) => reader.next().await,
        None => pending().await,
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn wait(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
