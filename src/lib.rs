pub mod cells;
pub mod config;
pub mod dap;
pub mod debug;
pub mod error;
pub mod proxy;
pub mod translate;

pub use config::{DebugMode, ProxyConfig};
pub use error::Error;
pub use proxy::ProxyServer;

pub type Result<T> = std::result::Result<T, Error>;

pub async fn serve(config: ProxyConfig) -> Result<()> {
    let server = ProxyServer::new(config);
    server.run().await
}
