//! Business logic services for FieldOps
//!
//! This crate contains the business logic that orchestrates field service
//! jobs: the lifecycle state machine, billing calculation, catalog
//! lookups, and the offline sync queue.
//!
//! # Architecture
//!
//! Services are designed to be composable and testable:
//! - Each service owns its dependencies (repositories, cache, etc.)
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Comprehensive error handling with AppError
//!
//! # Services
//!
//! - `ServiceLifecycle` - Start/pause/resume/complete state machine with
//!   distance and material ledgers
//! - `CatalogService` - City and material lookups with Redis caching
//! - `SyncManager` - Offline mutation queue buffering and replay
//! - `billing` - Pure totals calculator shared by the lifecycle
//! - `LifecycleNotifier` - Async fan-out of lifecycle events

pub mod billing;
pub mod catalog;
pub mod lifecycle;
pub mod notifier;
pub mod sync_queue;

pub use billing::ServiceTotals;
pub use catalog::CatalogService;
pub use lifecycle::{MaterialAction, ServiceLifecycle, StartService};
pub use notifier::{LifecycleEvent, LifecycleNotifier};
pub use sync_queue::{ReplayOp, ReplayOutcome, SyncItem, SyncManager, SyncPushOutcome};

/// Business logic constants
pub mod constants {
    /// Days a synced queue entry is kept before cleanup removes it
    pub const SYNC_RETENTION_DAYS: i64 = 7;

    /// Maximum pending entries returned per sync pull or replay pass
    pub const SYNC_PENDING_LIMIT: i64 = 50;

    /// Default page size for listings
    pub const DEFAULT_PAGE_SIZE: i64 = 20;

    /// Hard cap on a single listing page
    pub const MAX_PAGE_SIZE: i64 = 100;
}
