use super::channel::KernelChannel;
use super::transport::{is_disconnect, DapTransport};
use super::transport_trait::{DapReader, DapWriter};
use super::types::*;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

type ResponseSender = oneshot::Sender<Response>;
type PendingRequests = Arc<RwLock<Pending>>;

/// Requests awaiting a response; `open` turns false once the reader exits.
struct Pending {
    open: bool,
    waiters: HashMap<i32, ResponseSender>,
}

/// DAP client for the kernel-side debugger
///
/// A reader task routes responses to the waiting request by `request_seq`
/// and pushes events onto the channel returned at construction; a writer
/// task drains an outgoing queue so callers never contend on the socket.
pub struct DapClient {
    seq_counter: Arc<AtomicI32>,
    pending_requests: PendingRequests,
    write_tx: mpsc::UnboundedSender<Message>,
}

impl DapClient {
    /// Connect to a kernel debugger listening on `addr`
    pub async fn connect(addr: &str) -> Result<(Self, mpsc::UnboundedReceiver<Event>)> {
        info!("🔌 Connecting to kernel debugger at {}", addr);

        let socket = tokio::net::TcpStream::connect(addr).await.map_err(|e| {
            Error::Dap(format!("Failed to connect to kernel debugger at {}: {}", addr, e))
        })?;

        info!("   ✅ Connected to kernel debugger at {}", addr);

        let (reader, writer) = DapTransport::socket(socket).into_split();
        Ok(Self::new_with_transport(Box::new(reader), Box::new(writer)))
    }

    /// Create a new DAP client over arbitrary transport halves (for testing)
    pub fn new_with_transport(
        reader: Box<dyn DapReader>,
        writer: Box<dyn DapWriter>,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let seq_counter = Arc::new(AtomicI32::new(1));
        let pending_requests: PendingRequests = Arc::new(RwLock::new(Pending {
            open: true,
            waiters: HashMap::new(),
        }));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::message_reader(reader, pending_requests.clone(), event_tx));
        tokio::spawn(Self::message_writer(writer, write_rx));

        let client = Self {
            seq_counter,
            pending_requests,
            write_tx,
        };

        (client, event_rx)
    }

    /// Message reader task - reads messages from transport and dispatches them
    async fn message_reader(
        mut reader: Box<dyn DapReader>,
        pending_requests: PendingRequests,
        event_tx: mpsc::UnboundedSender<Event>,
    ) {
        loop {
            let msg = match reader.read_message().await {
                Ok(msg) => msg,
                Err(e) if is_disconnect(&e) => {
                    info!("📖 message_reader: Kernel debugger closed the connection");
                    break;
                }
                Err(e) => {
                    error!("📖 message_reader: Failed to read DAP message: {}", e);
                    break;
                }
            };

            match msg {
                Message::Response(resp) => {
                    debug!("Received response for seq {}", resp.request_seq);
                    let mut pending = pending_requests.write().await;
                    if let Some(sender) = pending.waiters.remove(&resp.request_seq) {
                        if sender.send(resp).is_err() {
                            warn!("Failed to send response to waiting request");
                        }
                    } else {
                        warn!("Received response for unknown request: {}", resp.request_seq);
                    }
                }
                Message::Event(event) => {
                    debug!("🎯 Kernel event '{}'", event.event);
                    if event_tx.send(event).is_err() {
                        debug!("Event receiver dropped, discarding kernel event");
                    }
                }
                Message::Request(req) => {
                    warn!(
                        "Received reverse request '{}' from kernel debugger (not supported)",
                        req.command
                    );
                }
            }
        }

        // Waiters observe the dropped senders as a closed connection
        let mut pending = pending_requests.write().await;
        pending.open = false;
        pending.waiters.clear();
    }

    /// Message writer task - writes messages to transport from a channel
    async fn message_writer(
        mut writer: Box<dyn DapWriter>,
        mut write_rx: mpsc::UnboundedReceiver<Message>,
    ) {
        debug!("📝 message_writer: Task started");
        while let Some(message) = write_rx.recv().await {
            debug!("📝 message_writer: Writing {}", message.label());
            if let Err(e) = writer.write_message(&message).await {
                error!("📝 message_writer: Failed to write DAP message: {}", e);
                break;
            }
        }
        debug!("📝 message_writer: Task exiting");
    }

    /// Send a request and wait for response
    pub async fn send_request(&self, command: &str, arguments: Option<Value>) -> Result<Response> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        debug!("✉️  send_request: Sending '{}' request (seq {})", command, seq);

        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_requests.write().await;
            if !pending.open {
                return Err(Error::Dap("Kernel debugger connection closed".to_string()));
            }
            pending.waiters.insert(seq, tx);
        }

        if self.write_tx.send(Message::Request(request)).is_err() {
            self.pending_requests.write().await.waiters.remove(&seq);
            return Err(Error::Dap("Write channel closed".to_string()));
        }

        let response = rx
            .await
            .map_err(|_| Error::Dap("Request cancelled or connection closed".to_string()))?;

        debug!(
            "✅ send_request: Received response for '{}' (seq {}), success: {}",
            command, seq, response.success
        );
        Ok(response)
    }
}

#[async_trait]
impl KernelChannel for DapClient {
    async fn request(&self, command: &str, arguments: Option<Value>) -> Result<Response> {
        self.send_request(command, arguments).await
    }
}
