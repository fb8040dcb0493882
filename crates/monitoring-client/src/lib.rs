//! Thin client for the Cloud Monitoring dashboards API.
//!
//! [`MonitoringClient`] speaks the v1 REST surface (list, get, patch,
//! create). [`MonitoringStore`] adapts it to rollgate's
//! [`DashboardStore`](rollgate_core::dashboard::DashboardStore) so the
//! reconciler never sees HTTP status codes.

pub mod client;
pub mod error;
pub mod store;
pub mod token;
pub mod types;

pub use client::MonitoringClient;
pub use error::{MonitoringError, Result};
pub use store::MonitoringStore;
