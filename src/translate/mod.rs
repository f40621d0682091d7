pub mod coordinates;
pub mod partition;
pub mod store;
pub mod strategy;

pub use store::{CellDumpRecord, CellDumpStore};
pub use strategy::{InteractiveWindowStrategy, LocationStrategy, NotebookStrategy, Outgoing};
