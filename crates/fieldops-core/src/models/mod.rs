//! Domain models for FieldOps
//!
//! This module contains all the core domain models used throughout the application.

pub mod city;
pub mod material;
pub mod service;
pub mod sync;
pub mod user;

pub use city::City;
pub use material::{round_money, Material, ServiceMaterial};
pub use service::{PauseEvent, Service, ServiceNote, ServiceStatus};
pub use sync::SyncEntry;
pub use user::{Actor, User, UserInfo, UserRole};
