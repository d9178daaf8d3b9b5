//! Data transfer objects for the API

pub mod auth;
pub mod common;
pub mod service;
pub mod sync;

pub use common::{ApiResponse, PaginationParams};
