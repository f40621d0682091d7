use super::types::Response;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Request/response exchange with the kernel-side debugger.
///
/// Both the forwarded editor requests and the proxy's own custom requests
/// (`dumpCell`, `setPydevdSourceMap`, `debugInfo`) go through this seam, so
/// tests can substitute an in-memory kernel.
#[async_trait]
pub trait KernelChannel: Send + Sync {
    /// Send `command` and wait for the kernel's response. A response with
    /// `success: false` is returned as `Ok`; only transport failures are `Err`.
    async fn request(&self, command: &str, arguments: Option<Value>) -> Result<Response>;
}
