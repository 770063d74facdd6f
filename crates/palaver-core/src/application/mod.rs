/// Engine configuration and external services
pub mod engine;

/// Session control loop
pub mod session;

pub use engine::{Engine, EngineBuilder};
pub use session::{Session, SessionStatus, Trigger};
