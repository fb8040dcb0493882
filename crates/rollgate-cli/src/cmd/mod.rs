pub mod apply;
pub mod config;
pub mod dashboards;
pub mod environments;
pub mod init;
pub mod ready;
pub mod status;

use rollgate_core::cancel::{CancelHandle, CancelToken};
use tokio::runtime::Runtime;
use tracing::warn;

/// Spawn a Ctrl-C watcher on `rt` and return the token it trips.
pub(crate) fn cancel_on_ctrl_c(rt: &Runtime) -> CancelToken {
    let (handle, token): (CancelHandle, CancelToken) = CancelToken::new();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling readiness polling");
            handle.cancel();
        }
    });
    token
}
