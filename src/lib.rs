// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;
pub mod ws;

// Re-export broadcast for testing
pub mod broadcast;
