pub mod broadcaster;
pub mod connection;
pub mod manager;
pub mod messages;

pub use broadcaster::*;
pub use connection::*;
pub use manager::*;
