//! HTTP handlers. Each one extracts its inputs, calls a service and maps the
//! result to a response; authorization lives in the gate and the services.

pub mod posts;
pub mod users;

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}
