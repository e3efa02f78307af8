pub mod dashboard_rest;
pub mod endpoints;
pub mod traits;

pub use dashboard_rest::{ApiBody, ApiClient, LogSessionHook, SessionHook};
pub use traits::DashboardApi;

#[cfg(test)]
pub use traits::MockDashboardApi;
