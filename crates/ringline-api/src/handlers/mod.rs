//! HTTP request handlers

pub mod call_request;
pub mod health;

pub use call_request::configure as configure_call_requests;
pub use health::configure as configure_health;
