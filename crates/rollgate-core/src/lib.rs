pub mod cancel;
pub mod config;
pub mod dashboard;
pub mod environment;
pub mod error;
pub mod io;
pub mod paths;
pub mod pipeline;
pub mod readiness;
pub mod state;
pub mod trigger;

pub use error::{Result, RollgateError};
