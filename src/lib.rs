// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod config;
pub mod election;
pub mod fuse;
pub mod llm;
pub mod protocol;
pub mod questions;
pub mod scoring;
pub mod session;
pub mod state;
pub mod store;
pub mod ticker;
pub mod types;
pub mod ws;
