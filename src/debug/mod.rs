pub mod bridge;
pub mod cleanup;
pub mod manager;
pub mod state;
pub mod tracker;

pub use bridge::Bridge;
pub use manager::SessionManager;
pub use state::{BridgeState, SessionStatus};
pub use tracker::{LocationTracker, LoggingTracker, NoopTracker};
