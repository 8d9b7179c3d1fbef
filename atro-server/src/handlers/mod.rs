pub mod commands;
pub mod handle_websocket;
pub mod response_feedback;
pub mod snapshot;
pub mod status;

pub use handle_websocket::websocket_handler;
pub use status::{health_handler, status_handler};
