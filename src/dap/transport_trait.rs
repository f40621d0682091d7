use super::types::Message;
use crate::Result;
use async_trait::async_trait;

/// Read half of a DAP transport, split out so it can be mocked in tests
#[async_trait]
pub trait DapReader: Send {
    /// Read the next DAP protocol message from the transport
    async fn read_message(&mut self) -> Result<Message>;
}

/// Write half of a DAP transport
#[async_trait]
pub trait DapWriter: Send {
    /// Write a DAP protocol message to the transport
    async fn write_message(&mut self, msg: &Message) -> Result<()>;
}
