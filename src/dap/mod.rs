pub mod channel;
pub mod client;
pub mod transport;
pub mod transport_trait;
pub mod types;

pub use channel::KernelChannel;
pub use client::DapClient;
