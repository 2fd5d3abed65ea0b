//! Application Services
//!
//! - `UpdateDispatcher`: turns push events into store writes while the
//!   push channel is connected

mod dispatcher;

pub use dispatcher::{DispatcherStats, UpdateDispatcher};
