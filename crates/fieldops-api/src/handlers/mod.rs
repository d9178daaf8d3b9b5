//! HTTP request handlers

pub mod auth;
pub mod catalog;
pub mod dashboard;
pub mod service;
pub mod sync;

pub use auth::configure as configure_auth;
pub use catalog::configure_cities;
pub use catalog::configure_materials;
pub use dashboard::configure as configure_dashboard;
pub use service::configure as configure_services;
pub use sync::configure as configure_sync;
