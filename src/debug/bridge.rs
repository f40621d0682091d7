use super::state::{BridgeState, SessionStatus};
use super::tracker::{notify, LocationTracker};
use crate::config::DebugMode;
use crate::dap::channel::KernelChannel;
use crate::dap::types::{DebugInfoResponse, Event, Message, Request, Response};
use crate::translate::store::CellDumpRecord;
use crate::translate::strategy::{LocationStrategy, Outgoing};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sits between the editor and the kernel debugger for one debug session,
/// translating every message through the session's [`LocationStrategy`].
pub struct Bridge {
    strategy: Box<dyn LocationStrategy>,
    kernel: Arc<dyn KernelChannel>,
    tracker: Arc<dyn LocationTracker>,
    status: SessionStatus,
    /// Last `seq` used on the editor side.
    seq: i32,
}

impl Bridge {
    /// `status` must be the handle the strategy was built with.
    pub fn new(
        strategy: Box<dyn LocationStrategy>,
        status: SessionStatus,
        kernel: Arc<dyn KernelChannel>,
        tracker: Arc<dyn LocationTracker>,
    ) -> Self {
        Self {
            strategy,
            kernel,
            tracker,
            status,
            seq: 0,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.status.state()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.clone()
    }

    pub fn mode(&self) -> DebugMode {
        self.strategy.mode()
    }

    fn next_seq(&mut self) -> i32 {
        self.seq += 1;
        self.seq
    }

    /// Start translating. Asks the kernel how it names dumped files; a failure
    /// there is logged and the session continues without it.
    pub async fn activate(&mut self) -> Result<()> {
        if self.status.state() == BridgeState::Active {
            return Ok(());
        }
        self.status.activate()?;
        info!("🚀 Activating {:?} debug session", self.strategy.mode());

        match self.kernel.request("debugInfo", None).await {
            Ok(resp) if resp.success => match resp.body.map(serde_json::from_value::<DebugInfoResponse>) {
                Some(Ok(debug_info)) => {
                    debug!(
                        "Kernel dumps cells as {}*{}",
                        debug_info.tmp_file_prefix.as_deref().unwrap_or("?"),
                        debug_info.tmp_file_suffix.as_deref().unwrap_or("")
                    );
                    self.strategy.set_debug_info(debug_info);
                }
                Some(Err(e)) => warn!("⚠️  Unreadable debugInfo response: {}", e),
                None => debug!("debugInfo response has no body"),
            },
            Ok(resp) => warn!("⚠️  debugInfo rejected: {}", resp.message.unwrap_or_default()),
            Err(e) => warn!("⚠️  debugInfo failed: {}", e),
        }

        self.status.ensure_live()
    }

    /// Translate an editor request, forward it unless the strategy answered
    /// it, and translate the kernel's response back.
    ///
    /// `disconnect` and `terminate` end the session once answered.
    pub async fn handle_client_request(&mut self, request: Request) -> Result<Response> {
        self.status.ensure_live()?;
        if self.status.state() == BridgeState::Idle {
            self.activate().await?;
        }

        let incoming = Message::Request(request.clone());
        notify("on_will_receive_message", || self.tracker.on_will_receive_message(&incoming));
        debug!("➡️  {} (seq {})", request.command, request.seq);

        let ends_session = matches!(request.command.as_str(), "disconnect" | "terminate");

        let mut response = match self
            .strategy
            .translate_outgoing(request.clone(), self.kernel.as_ref())
            .await?
        {
            Outgoing::Handled(response) => response,
            Outgoing::Forward { request: forwarded, record } => self.forward(forwarded, record).await?,
        };
        self.status.ensure_live()?;

        response.seq = self.next_seq();
        response.request_seq = request.seq;
        response.command = request.command;

        let outgoing = Message::Response(response.clone());
        notify("on_did_send_message", || self.tracker.on_did_send_message(&outgoing));
        debug!("⬅️  {} (success: {})", response.command, response.success);

        if ends_session {
            self.end();
        }
        Ok(response)
    }

    async fn forward(&mut self, request: Request, record: Option<CellDumpRecord>) -> Result<Response> {
        let response = self.kernel.request(&request.command, request.arguments).await?;
        self.status.ensure_live()?;

        let mut message = Message::Response(response);
        self.strategy
            .translate_incoming(&mut message, record.as_ref(), self.kernel.as_ref())
            .await?;
        match message {
            Message::Response(response) => Ok(response),
            other => Err(Error::Internal(format!("Response translated into {}", other.label()))),
        }
    }

    /// Translate an event from the kernel for the editor.
    pub async fn handle_kernel_event(&mut self, event: Event) -> Result<Event> {
        self.status.ensure_live()?;

        let mut message = Message::Event(event);
        self.strategy
            .translate_incoming(&mut message, None, self.kernel.as_ref())
            .await?;
        self.status.ensure_live()?;

        let mut event = match message {
            Message::Event(event) => event,
            other => return Err(Error::Internal(format!("Event translated into {}", other.label()))),
        };
        event.seq = self.next_seq();

        let outgoing = Message::Event(event.clone());
        notify("on_did_send_message", || self.tracker.on_did_send_message(&outgoing));
        Ok(event)
    }

    /// Dump the cell at `index` ahead of any request referencing it.
    pub async fn dump_cell(&mut self, index: usize) -> Result<Option<CellDumpRecord>> {
        self.status.ensure_live()?;
        self.strategy.dump_cell(index, self.kernel.as_ref()).await
    }

    /// Failed response for a request this bridge could not handle.
    pub fn failure_response(&mut self, request: &Request, error: &Error) -> Response {
        let mut response = Response::failure(request, error);
        response.seq = self.next_seq();
        response
    }

    /// Editor-side event originating from the proxy itself.
    pub fn proxy_event(&mut self, event: &str, body: Option<serde_json::Value>) -> Event {
        Event {
            seq: self.next_seq(),
            event: event.to_string(),
            body,
        }
    }

    pub fn dump_files_for_deletion(&self) -> Vec<String> {
        self.strategy.dump_files_for_deletion()
    }

    /// End the session and return the files it dumped. Safe to call again.
    pub fn end(&mut self) -> Vec<String> {
        let files = self.dump_files_for_deletion();
        if self.status.end() {
            info!("🏁 Debug session ended ({} dump file(s))", files.len());
        }
        files
    }
}
