use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{websocket_url, ConnectionConfig, ConnectionEvent, ConnectionState};
use crate::packets::{Command, CommandSink};
use crate::LinkError;

/// Owns one outbound WebSocket connection to the controller.
///
/// Cloning is cheap and every clone drives the same connection. Network I/O runs on a
/// dedicated task; callers only ever enqueue outbound text and read [`ConnectionEvent`]s
/// from the receiver returned by [`ConnectionManager::new`].
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    pub config: ConnectionConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    io_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

enum LinkEnd {
    Requested,
    Dropped,
    Failed(String),
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            config,
            state: Arc::new(state),
            outbound: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(Mutex::new(None)),
            io_task: Arc::new(Mutex::new(None)),
            events,
        };
        (manager, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Connects to the configured address.
    pub fn connect_default(&self) -> Result<(), LinkError> {
        let url = self.config.connection_url();
        self.connect(&url)
    }

    /// Starts connecting to `address` on a background task and returns immediately.
    ///
    /// The outcome arrives as [`ConnectionEvent::Opened`], or as [`ConnectionEvent::Error`]
    /// with the state back at `Disconnected`. The handshake is abandoned after
    /// [`ConnectionConfig::connect_timeout`]. Nothing is retried.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`LinkError::InvalidState`] unless the state is `Disconnected` or `Closed`.
    pub fn connect(&self, address: &str) -> Result<(), LinkError> {
        let admitted = self.state.send_if_modified(|state| match state {
            ConnectionState::Disconnected | ConnectionState::Closed => {
                *state = ConnectionState::Connecting;
                true
            }
            _ => false,
        });
        if !admitted {
            return Err(LinkError::InvalidState(self.state()));
        }

        let url = websocket_url(address);
        info!("Connecting to {}", url);

        let (queue_tx, queue_rx) = mpsc::channel::<String>(self.config.max_messages.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.outbound.lock() = Some(queue_tx);
        *self.shutdown.lock() = Some(stop_tx);

        let task = tokio::spawn(run_link(
            url,
            self.config.connect_timeout(),
            queue_rx,
            stop_rx,
            self.state.clone(),
            self.events.clone(),
        ));
        *self.io_task.lock() = Some(task);
        Ok(())
    }

    /// Queues `message` for the wire without waiting on the network.
    ///
    /// Messages sent through one manager reach the wire in the order they were queued.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotConnected`] unless the state is `Connected`, and
    /// [`LinkError::QueueFull`] when `max_messages` are already waiting.
    pub fn send(&self, message: impl Into<String>) -> Result<(), LinkError> {
        if self.state() != ConnectionState::Connected {
            return Err(LinkError::NotConnected);
        }
        let outbound = self.outbound.lock();
        let queue = outbound.as_ref().ok_or(LinkError::NotConnected)?;
        queue.try_send(message.into()).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::QueueFull,
            TrySendError::Closed(_) => LinkError::NotConnected,
        })
    }

    /// Closes the connection and waits for the I/O task to finish.
    ///
    /// Messages queued before the call are still written. Safe to call repeatedly and
    /// from any task; a second caller waits until the first one has reached `Closed`.
    pub async fn close(&self) {
        let mut previous = ConnectionState::Closed;
        self.state.send_if_modified(|state| {
            previous = *state;
            match state {
                ConnectionState::Closing | ConnectionState::Closed => false,
                _ => {
                    *state = ConnectionState::Closing;
                    true
                }
            }
        });

        match previous {
            ConnectionState::Closed => return,
            ConnectionState::Closing => {
                let mut changes = self.state.subscribe();
                let _ = changes.wait_for(|state| *state == ConnectionState::Closed).await;
                return;
            }
            _ => {}
        }

        self.outbound.lock().take();
        let stop = self.shutdown.lock().take();
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        let task = self.io_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Connection task ended abnormally: {}", e);
            }
        }

        self.state.send_replace(ConnectionState::Closed);
        if matches!(previous, ConnectionState::Connected | ConnectionState::Connecting) {
            let _ = self.events.send(ConnectionEvent::Closed);
        }
        info!("Connection closed");
    }
}

impl CommandSink for ConnectionManager {
    fn submit(&self, command: &Command) -> Result<(), LinkError> {
        self.send(command.encode())
    }
}

// Moves `from` to `to` only if nobody else changed the state in the meantime.
fn transition(state: &watch::Sender<ConnectionState>, from: ConnectionState, to: ConnectionState) -> bool {
    state.send_if_modified(|current| {
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    })
}

async fn run_link(
    url: String,
    handshake_timeout: Duration,
    mut queue: mpsc::Receiver<String>,
    mut shutdown: oneshot::Receiver<()>,
    state: Arc<watch::Sender<ConnectionState>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let handshake = tokio::time::timeout(handshake_timeout, connect_async(url.as_str()));
    let outcome = tokio::select! {
        _ = &mut shutdown => {
            debug!("Connect to {} abandoned by close", url);
            return;
        }
        outcome = handshake => outcome,
    };

    let stream = match outcome {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let err = LinkError::Transport(e.to_string());
            warn!("Failed to connect to {}: {}", url, err);
            if transition(&state, ConnectionState::Connecting, ConnectionState::Disconnected) {
                let _ = events.send(ConnectionEvent::Error(err));
            }
            return;
        }
        Err(_) => {
            let err = LinkError::Transport(format!("handshake timed out after {:?}", handshake_timeout));
            warn!("Failed to connect to {}: {}", url, err);
            if transition(&state, ConnectionState::Connecting, ConnectionState::Disconnected) {
                let _ = events.send(ConnectionEvent::Error(err));
            }
            return;
        }
    };

    let (mut sink, mut source) = stream.split();

    if !transition(&state, ConnectionState::Connecting, ConnectionState::Connected) {
        // close() won the race against the handshake
        let _ = sink.close().await;
        return;
    }
    info!("Connected to {}", url);
    let _ = events.send(ConnectionEvent::Opened);

    let end = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break LinkEnd::Requested,
            outbound = queue.recv() => match outbound {
                Some(text) => {
                    debug!("Sent: {}", text);
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        break LinkEnd::Failed(e.to_string());
                    }
                }
                None => break LinkEnd::Requested,
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    debug!("Received: {}", text);
                    let _ = events.send(ConnectionEvent::Message(text));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    debug!("Received binary: {}", text);
                    let _ = events.send(ConnectionEvent::Message(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Peer closed the connection: {:?}", frame);
                    break LinkEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break LinkEnd::Failed(e.to_string()),
                None => break LinkEnd::Dropped,
            },
        }
    };

    match end {
        LinkEnd::Requested => {
            queue.close();
            while let Ok(text) = queue.try_recv() {
                debug!("Sent: {}", text);
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("Dropped queued message while closing: {}", e);
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                debug!("Close handshake did not complete: {}", e);
            }
        }
        LinkEnd::Dropped => {
            warn!("Connection to {} dropped", url);
            if transition(&state, ConnectionState::Connected, ConnectionState::Disconnected) {
                let _ = events.send(ConnectionEvent::Closed);
            }
        }
        LinkEnd::Failed(reason) => {
            error!("Connection to {} failed: {}", url, reason);
            if transition(&state, ConnectionState::Connected, ConnectionState::Disconnected) {
                let _ = events.send(ConnectionEvent::Error(LinkError::Transport(reason)));
                let _ = events.send(ConnectionEvent::Closed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_before_connect_is_rejected() {
        let (manager, _events) = ConnectionManager::new(ConnectionConfig::default());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.send("4$100"), Err(LinkError::NotConnected));
        assert_eq!(manager.submit(&Command::open_gripper()), Err(LinkError::NotConnected));
    }

    #[tokio::test]
    async fn close_without_connect_is_terminal_and_quiet() {
        let (manager, mut events) = ConnectionManager::new(ConnectionConfig::default());
        manager.close().await;
        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn connect_twice_is_an_invalid_state() {
        // accepts TCP but never answers the handshake, so the first attempt stays Connecting
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (manager, _events) = ConnectionManager::new(ConnectionConfig::new(address.clone(), 4, 5000));

        manager.connect(&address).unwrap();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(
            manager.connect(&address),
            Err(LinkError::InvalidState(ConnectionState::Connecting))
        );
        assert_eq!(manager.send("7"), Err(LinkError::NotConnected));

        manager.close().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
    }
}
