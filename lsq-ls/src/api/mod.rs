//! HTTP API for the lead scoring service

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{build_router, AppContext};
