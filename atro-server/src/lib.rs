//! # ATRO Server
//!
//! Realtime hub for the ATRO security dashboard.
//!
//! Dashboard clients connect over `/ws`, receive one `initial_data`
//! snapshot and then every event the core publishes: worker output turned
//! into alerts, incidents and logs, agent status changes, insights and
//! response-action updates. Clients send a small command vocabulary back
//! (start/stop agents, toggle a response action, analyze a log).

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
