//! Per-service polling loop and process-wide supervisor wiring config,
//! store, SMPP session, and sender together for each configured service.

pub mod service_loop;
pub mod supervisor;

pub use service_loop::ServiceLoop;
pub use supervisor::Supervisor;
