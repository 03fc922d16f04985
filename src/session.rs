//! Per-connection state machine: ping-duration handshake, publish read loop
//! with fan-out, subscriber send-coalescing, and the keep-alive ping timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex as TokioMutex, Notify};

use crate::channel::Channel;
use crate::hub::ChannelHub;
use crate::message::RelayMessage;
use crate::subscriber_list::Token;

/// Close codes used by this server.
const CLOSE_BAD_PAYLOAD: u16 = 1007;
const CLOSE_INTERNAL_ERROR: u16 = 1011;
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Subscriber,
}

struct SendState {
    sending: bool,
    pending: Option<Arc<RelayMessage>>,
}

/// Tracks the keep-alive deadline and distinguishes a silent re-arm (any
/// successful I/O resets the timer without pinging) from a true expiry
/// (nothing happened for a full interval, so a ping frame is due).
struct PingTimer {
    duration: Duration,
    deadline: StdMutex<Instant>,
    notify: Notify,
}

impl PingTimer {
    fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: StdMutex::new(Instant::now() + duration),
            notify: Notify::new(),
        }
    }

    /// Cancels the current wait silently and re-arms a fresh interval.
    fn reset(&self) {
        *self.deadline.lock().unwrap() = Instant::now() + self.duration;
        self.notify.notify_one();
    }

    fn current_deadline(&self) -> Instant {
        *self.deadline.lock().unwrap()
    }
}

/// A single WebSocket connection, once it has passed the upgrade and
/// ping-duration handshake. The read side (for publishers) and the ping
/// loop run as separate tasks; both may write through `sink`, which
/// serializes them at the transport level. The `send_state` mutex layers
/// the coalescing discipline (`SPEC_FULL.md` §4.4) on top of that.
pub struct Session {
    sink: TokioMutex<SplitSink<WebSocket, WsMessage>>,
    send_state: StdMutex<SendState>,
    ping: PingTimer,
    closed: AtomicBool,
    close_signal: Notify,
}

impl Session {
    /// Drives one connection end to end: ping-duration handshake, channel
    /// registration, role-specific loop, and teardown. Returns once the
    /// session has fully torn down (subscription removed, channel usage
    /// released).
    pub async fn run(
        socket: WebSocket,
        role: Role,
        channel_name: String,
        hub: Arc<ChannelHub>,
        ping_duration: Duration,
    ) {
        let (mut sink, stream) = socket.split();

        let hex_duration = format!("{:x}", ping_duration.as_millis());
        if let Err(err) = sink.send(WsMessage::Text(hex_duration)).await {
            if !is_peer_gone(&err) {
                tracing::warn!("send ping duration: {}", err);
            }
            return;
        }

        let channel = hub.connect(&channel_name).await;

        let session = Arc::new(Session {
            sink: TokioMutex::new(sink),
            send_state: StdMutex::new(SendState {
                sending: false,
                pending: None,
            }),
            ping: PingTimer::new(ping_duration),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });

        let token = match role {
            Role::Subscriber => Some(channel.add_subscriber(Arc::downgrade(&session)).await),
            Role::Publisher => None,
        };

        let ping_handle = tokio::spawn(Self::ping_loop(session.clone()));

        match role {
            Role::Publisher => session.clone().run_publisher(stream, channel.clone()).await,
            Role::Subscriber => session.close_signal.notified().await,
        }

        ping_handle.abort();

        if let Some(token) = token {
            channel.remove_subscriber(token).await;
        }
        hub.disconnect(&channel_name, &channel).await;
    }

    async fn run_publisher(self: Arc<Self>, mut stream: SplitStream<WebSocket>, channel: Arc<Channel>) {
        loop {
            match stream.next().await {
                None => return,
                Some(Ok(WsMessage::Close(_))) => return,
                Some(Ok(msg)) => {
                    self.ping.reset();
                    match RelayMessage::from_ws(&msg) {
                        Some(relay) if relay.payload.is_empty() => {
                            self.close_with_code(CLOSE_BAD_PAYLOAD, "bad payload").await;
                            return;
                        }
                        Some(relay) => {
                            let relay = Arc::new(relay);
                            channel
                                .for_each(|subscriber| subscriber.send_message(relay.clone()))
                                .await;
                        }
                        None => {}
                    }
                }
                Some(Err(err)) => {
                    self.classify_and_close(err, "read publish").await;
                    return;
                }
            }
        }
    }

    /// Called by a publisher's fan-out loop. Starts writing `message`
    /// immediately if this subscriber has no write in flight; otherwise
    /// overwrites the single pending slot, coalescing any message that was
    /// already queued there.
    fn send_message(self: &Arc<Self>, message: Arc<RelayMessage>) {
        let mut should_write = false;
        {
            let mut state = self.send_state.lock().unwrap();
            if state.sending {
                state.pending = Some(message.clone());
            } else {
                state.sending = true;
                should_write = true;
            }
        }
        if should_write {
            let session = self.clone();
            tokio::spawn(async move { session.write_and_drain(message).await });
        }
    }

    async fn write_and_drain(self: Arc<Self>, mut message: Arc<RelayMessage>) {
        loop {
            let write_result = {
                let mut sink = self.sink.lock().await;
                sink.send(message.to_ws()).await
            };
            if let Err(err) = write_result {
                self.classify_and_close(err, "send message").await;
                let mut state = self.send_state.lock().unwrap();
                state.sending = false;
                state.pending = None;
                return;
            }
            self.ping.reset();

            let next = {
                let mut state = self.send_state.lock().unwrap();
                match state.pending.take() {
                    Some(next) => Some(next),
                    None => {
                        state.sending = false;
                        None
                    }
                }
            };
            match next {
                Some(next) => message = next,
                None => return,
            }
        }
    }

    async fn ping_loop(self: Arc<Self>) {
        loop {
            let deadline = self.ping.current_deadline();
            tokio::select! {
                _ = tokio::time::sleep_until(deadline.into()) => {
                    let result = {
                        let mut sink = self.sink.lock().await;
                        sink.send(WsMessage::Ping(Vec::new())).await
                    };
                    match result {
                        Ok(()) => self.ping.reset(),
                        Err(err) => {
                            self.handle_ping_error(err).await;
                            return;
                        }
                    }
                }
                _ = self.ping.notify.notified() => {
                    continue;
                }
            }
        }
    }

    async fn handle_ping_error(&self, err: axum::Error) {
        if is_peer_gone(&err) {
            self.signal_close();
            return;
        }
        tracing::warn!("ping: {}", err);
        self.close_with_code(CLOSE_TRY_AGAIN_LATER, "try again later").await;
        self.signal_close();
    }

    async fn classify_and_close(&self, err: axum::Error, stage: &str) {
        if is_peer_gone(&err) {
            self.signal_close();
            return;
        }
        tracing::warn!("{}: {}", stage, err);
        self.close_with_code(CLOSE_INTERNAL_ERROR, "internal error").await;
        self.signal_close();
    }

    async fn close_with_code(&self, code: u16, reason: &'static str) {
        let frame = WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        }));
        let mut sink = self.sink.lock().await;
        if let Err(err) = sink.send(frame).await {
            if !is_peer_gone(&err) {
                tracing::warn!("close: {}", err);
            }
        }
    }

    /// Wakes a subscriber's `run` loop, which is otherwise parked on
    /// `close_signal` since subscribers never read their own socket.
    fn signal_close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_signal.notify_one();
        }
    }
}

fn is_peer_gone(err: &axum::Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("broken pipe")
        || message.contains("connection reset")
        || message.contains("not connected")
        || message.contains("eof")
        || message.contains("closed connection")
        || message.contains("going away")
}

/// Splits a request target's path into a role and bare channel name, mirroring
/// `target.substr(1, target.size() - 5)` in the reference implementation:
/// strips the leading `/` and the trailing `/pub` or `/sub`, and rejects any
/// channel name that still contains a `/`.
pub fn parse_path(path: &str) -> Option<(Role, String)> {
    let (role, suffix_len) = if path.ends_with("/sub") {
        (Role::Subscriber, 4)
    } else if path.ends_with("/pub") {
        (Role::Publisher, 4)
    } else {
        return None;
    };

    let trimmed = path.strip_prefix('/')?;
    let name_len = trimmed.len().checked_sub(suffix_len)?;
    let name = &trimmed[..name_len];

    if name.is_empty() || name.contains('/') {
        return None;
    }

    Some((role, name.to_string()))
}
