//! Data Transfer Objects (DTOs) for API requests and responses

pub mod call_request;
pub mod common;

pub use call_request::*;
pub use common::*;
