//! Domain services behind the ATRO realtime hub.
//!
//! Everything here is constructed once at boot and shared as trait objects:
//! the [`store::EventStore`] persists records, the
//! [`cache::ContextCache`] carries context blobs and pub/sub between the
//! server and worker programs, the [`supervisor::Supervisor`] owns worker
//! processes, and the [`classifier::Analyzer`] turns free text into
//! insights. Mutations are announced on the [`events::EventBus`].

pub mod cache;
pub mod classifier;
pub mod error;
pub mod events;
pub mod store;
pub mod supervisor;

pub use error::{CoreError, Result};
pub use events::{EventBus, EventFrame, EventReceiver};

/// Embedded schema migrations for the PostgreSQL store.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
