//! Topology REST Service
//!
//! Exposes stored topology history over HTTP and lets a scheduler trigger
//! update cycles.
//!
//! ## Endpoints
//!
//! - `GET /api/topology` - All topologies as a NetJSON `NetworkCollection`
//! - `GET /api/topology/:id` - Latest generation as a NetJSON `NetworkGraph`
//!   (`?generation=<id>` selects an older one)
//! - `GET /api/topology/:id/history` - Retained generations
//! - `POST /api/topology/:id/update` - Run an update cycle
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::metrics_middleware;
pub use routes::{create_router, AppState, ErrorResponse};
pub use state::{ServiceState, StoreHealth};
