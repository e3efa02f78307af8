//! Dashboard session: feed wiring, shared view state and agent lookups.

pub mod directory;
pub mod session;
pub mod state;

pub use directory::AgentDirectory;
pub use session::DashboardSession;
pub use state::DashboardState;
