// Public API for integration tests and client-side sessions

pub mod api;
pub mod error;
pub mod games;
pub mod llm;
pub mod merge;
pub mod questions;
pub mod service;
pub mod session;
pub mod store;
pub mod types;
