//! Four batch dispatch strategies (`paralelo`, `paralelo_espaciado`,
//! `secuencial_espaciado`, `secuencial_espaciado_async`) over a session
//! owned by `risksms_smpp::SessionManager`.

pub mod mode;
pub mod sender;

pub use mode::DispatchMode;
pub use sender::{Sender, SenderConfig};
