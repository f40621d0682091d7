//! Editor-facing side of the proxy.
//!
//! Every editor connection gets its own kernel connection, [`Bridge`] and
//! dump store. Editor requests are handled one at a time; kernel events
//! queue up while a request is in flight and are forwarded in order.

use crate::cells::{CellSource, MarkedFile};
use crate::config::{ListenMode, ProxyConfig, SessionOptions};
use crate::dap::channel::KernelChannel;
use crate::dap::client::DapClient;
use crate::dap::transport::{is_disconnect, DapTransport, FramedWriter};
use crate::dap::transport_trait::DapReader;
use crate::dap::types::{Event, Message};
use crate::debug::bridge::Bridge;
use crate::debug::cleanup::delete_dump_files;
use crate::debug::manager::SessionManager;
use crate::debug::state::{BridgeState, SessionStatus};
use crate::debug::tracker::{LocationTracker, LoggingTracker, NoopTracker};
use crate::translate::strategy;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Clone)]
pub struct ProxyServer {
    config: ProxyConfig,
    manager: SessionManager,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            manager: SessionManager::new(),
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Serve editors until they are gone (stdio) or until interrupted (TCP).
    /// Ctrl-C ends every live session, which then cleans up after itself.
    pub async fn run(&self) -> Result<()> {
        info!(
            "🚀 Starting jupyter_dap_proxy: {}",
            serde_json::to_string(&self.config)?
        );

        match &self.config.listen {
            ListenMode::Stdio => {
                let session = self.serve_connection(DapTransport::stdio());
                tokio::pin!(session);
                tokio::select! {
                    result = &mut session => return result.map(drop),
                    _ = tokio::signal::ctrl_c() => {
                        info!("🛑 Interrupted, ending session");
                        self.manager.end_all().await;
                    }
                }
                session.await.map(drop)
            }
            ListenMode::Tcp(addr) => self.run_tcp(addr).await,
        }
    }

    async fn run_tcp(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("👂 Waiting for editors on {}", listener.local_addr()?);

        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    info!("🔗 Editor connected from {}", peer);
                    let server = self.clone();
                    sessions.spawn(async move {
                        if let Err(e) = server.serve_connection(DapTransport::socket(stream)).await {
                            error!("❌ Session for {} failed: {}", peer, e);
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("🛑 Interrupted, ending {} session(s)", self.manager.list_sessions().await.len());
                    self.manager.end_all().await;
                    break;
                }
            }
        }

        while sessions.join_next().await.is_some() {}
        Ok(())
    }

    /// Connect to the kernel and bridge one editor connection to it. Returns
    /// the dump files of the session.
    pub async fn serve_connection(&self, editor: DapTransport) -> Result<Vec<String>> {
        let (client, events) = DapClient::connect(&self.config.kernel_addr).await?;
        let cells: Arc<dyn CellSource> = Arc::new(MarkedFile::new(&self.config.cells_file));

        run_session(
            editor,
            Arc::new(client),
            events,
            cells,
            self.config.session_options(),
            &self.manager,
        )
        .await
    }
}

/// Bridge `editor` to `kernel` until either side goes away or the session
/// ends, then delete the session's dump files (unless asked to keep them).
pub async fn run_session(
    editor: DapTransport,
    kernel: Arc<dyn KernelChannel>,
    kernel_events: mpsc::UnboundedReceiver<Event>,
    cells: Arc<dyn CellSource>,
    options: SessionOptions,
    manager: &SessionManager,
) -> Result<Vec<String>> {
    let status = SessionStatus::new();
    let session_id = manager.register(status.clone()).await;
    let span = info_span!("session", id = %session_id);

    let strategy = strategy::for_mode(options.mode, cells, status.clone(), options.code_gen_offset);
    let tracker: Arc<dyn LocationTracker> = if options.trace_locations {
        Arc::new(LoggingTracker)
    } else {
        Arc::new(NoopTracker)
    };
    let mut bridge = Bridge::new(strategy, status.clone(), kernel, tracker);

    let outcome = pump(&mut bridge, editor, kernel_events, &status)
        .instrument(span.clone())
        .await;

    let files = bridge.end();
    async {
        if options.keep_dump_files {
            info!("Keeping {} dump file(s)", files.len());
        } else {
            delete_dump_files(&files).await;
        }
    }
    .instrument(span)
    .await;

    manager.remove_session(&session_id).await?;
    outcome.map(|()| files)
}

async fn pump(
    bridge: &mut Bridge,
    editor: DapTransport,
    mut kernel_events: mpsc::UnboundedReceiver<Event>,
    status: &SessionStatus,
) -> Result<()> {
    let (reader, mut writer) = editor.into_split();
    let (mut editor_messages, reader_task) = spawn_editor_reader(Box::new(reader));
    info!("🔗 Session started ({:?} mode)", bridge.mode());

    let outcome = async {
        loop {
            tokio::select! {
                incoming = editor_messages.recv() => match incoming {
                    Some(Message::Request(request)) => {
                        let response = match bridge.handle_client_request(request.clone()).await {
                            Ok(response) => response,
                            Err(e) => {
                                warn!("⚠️  {} failed: {}", request.command, e);
                                bridge.failure_response(&request, &e)
                            }
                        };
                        writer.write_message(&Message::Response(response)).await?;
                        if bridge.state() == BridgeState::Ended {
                            break;
                        }
                    }
                    Some(other) => debug!("Ignoring {} from editor", other.label()),
                    None => {
                        info!("👋 Editor disconnected");
                        break;
                    }
                },
                event = kernel_events.recv() => match event {
                    Some(event) => match bridge.handle_kernel_event(event).await {
                        Ok(event) => writer.write_message(&Message::Event(event)).await?,
                        Err(Error::SessionEnded) => break,
                        Err(e) => warn!("⚠️  Dropping kernel event: {}", e),
                    },
                    None => {
                        warn!("Kernel debugger connection closed");
                        send_terminated(bridge, &mut writer).await;
                        break;
                    }
                },
                _ = status.ended() => {
                    info!("Session ended by the proxy");
                    send_terminated(bridge, &mut writer).await;
                    break;
                }
            }
        }
        Ok::<(), Error>(())
    }
    .await;

    reader_task.abort();
    outcome
}

async fn send_terminated(bridge: &mut Bridge, writer: &mut FramedWriter) {
    let event = bridge.proxy_event("terminated", None);
    if let Err(e) = writer.write_message(&Message::Event(event)).await {
        debug!("Could not tell the editor the session terminated: {}", e);
    }
}

/// Read editor messages on their own task so a partially read frame is never
/// lost when the session loop switches to a kernel event.
fn spawn_editor_reader(mut reader: Box<dyn DapReader>) -> (mpsc::UnboundedReceiver<Message>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        loop {
            match reader.read_message().await {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(e) if is_disconnect(&e) => {
                    debug!("Editor stream closed");
                    break;
                }
                Err(e) => {
                    error!("❌ Failed to read from editor: {}", e);
                    break;
                }
            }
        }
    });
    (rx, task)
}
