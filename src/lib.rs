//! Form-filling automation service.
//!
//! A run opens a headless Chrome tab, reads the visible `input` and `button`
//! elements, asks a JSON-speaking reasoning agent which user-data value goes
//! in each field and which button submits, then types, clicks, and follows
//! any dialog those clicks open. Runs execute in the background and report
//! through an in-memory job tracker polled over HTTP.

pub mod brain;
pub mod chain;
pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod face;
pub mod filter;
pub mod hands;
pub mod jobs;
pub mod orchestrator;
pub mod prompt;
pub mod types;
pub mod user_data;

pub use error::{PilotError, Result};
