//! Authenticated session tracking

pub mod store;

pub use store::{spawn_sweep_task, Principal, SessionStore, DEFAULT_SESSION_TIMEOUT};
