//! Operator-facing HTTP surface.
//!
//! A thin JSON layer over the scheduler and registry, plus an embedded
//! dashboard page. Everything stateful lives in the core; handlers only
//! translate between HTTP and the library API.
//!
//! | Method | Path                    | Response                       |
//! |--------|-------------------------|--------------------------------|
//! | GET    | `/`                     | embedded dashboard             |
//! | GET    | `/api/devices`          | list of devices                |
//! | GET    | `/api/devices/:id`      | device or 404                  |
//! | GET    | `/api/updates`          | list of aggregate statuses     |
//! | GET    | `/api/updates/:id`      | status or 404                  |
//! | POST   | `/api/updates/schedule` | `{"status":"scheduled"}`       |
//! | POST   | `/api/updates/cancel`   | `{"status":"cancelled"}`       |

mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::registry::DeviceRegistry;
use crate::scheduler::Scheduler;

use handlers::{
    cancel_update, dashboard, get_device, get_update, list_devices, list_updates, schedule_update,
};

/// Shared state handed to every handler.
pub struct ApiState {
    /// The scheduler backing the update endpoints.
    pub scheduler: Arc<Scheduler>,
    /// The registry backing the device endpoints.
    pub registry: Arc<dyn DeviceRegistry>,
}

/// Builds the operator router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:id", get(get_device))
        .route("/api/updates", get(list_updates))
        .route("/api/updates/:id", get(get_update))
        .route("/api/updates/schedule", post(schedule_update))
        .route("/api/updates/cancel", post(cancel_update))
        .with_state(state)
}

/// Binds `addr` and serves the router until `shutdown` resolves.
pub async fn serve(
    addr: &str,
    state: Arc<ApiState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("http: listening on {addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
