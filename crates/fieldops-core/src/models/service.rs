//! Service (field job) model and pause/resume ledger
//!
//! A service is opened at a city, accrues distance and materials while a
//! technician works it, may be paused and resumed any number of times, and
//! is closed with a computed bill. The pause history is an append-only
//! ledger from which the accumulated distance can always be re-derived.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Service status
///
/// `Pending` is a reserved default for records created outside the normal
/// entry points; `start` always creates services directly in `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    #[default]
    Pending,
    /// Technician is actively working the job
    InProgress,
    /// Job is paused; exactly one open pause entry exists
    OnHold,
    /// Job is closed with a final bill; terminal
    Completed,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Pending => write!(f, "pending"),
            ServiceStatus::InProgress => write!(f, "in_progress"),
            ServiceStatus::OnHold => write!(f, "on_hold"),
            ServiceStatus::Completed => write!(f, "completed"),
        }
    }
}

impl ServiceStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ServiceStatus::Pending),
            "in_progress" => Some(ServiceStatus::InProgress),
            "on_hold" => Some(ServiceStatus::OnHold),
            "completed" => Some(ServiceStatus::Completed),
            _ => None,
        }
    }

    /// Check if the status forbids further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Completed)
    }
}

/// One entry in a service's pause history
///
/// An entry is *open* while `resumed_at` is unset; a service has at most
/// one open entry at any time, and only while its status is `OnHold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseEvent {
    /// When the pause was recorded
    pub paused_at: DateTime<Utc>,

    /// User who paused the service
    pub paused_by: i32,

    /// Optional free-form reason
    #[serde(default)]
    pub reason: Option<String>,

    /// Accumulated distance at the moment of pausing
    pub km_snapshot: Decimal,

    /// When the pause was closed by a resume (None while open)
    #[serde(default)]
    pub resumed_at: Option<DateTime<Utc>>,

    /// Distance logged at resume time (present only once resumed)
    #[serde(default)]
    pub additional_km: Option<Decimal>,

    /// User who resumed the service
    #[serde(default)]
    pub resumed_by: Option<i32>,
}

impl PauseEvent {
    /// Create a new open pause entry
    pub fn open(paused_by: i32, reason: Option<String>, km_snapshot: Decimal) -> Self {
        Self {
            paused_at: Utc::now(),
            paused_by,
            reason,
            km_snapshot,
            resumed_at: None,
            additional_km: None,
            resumed_by: None,
        }
    }

    /// Create a synthetic, already-closed entry
    ///
    /// Used when a resume arrives without a matching open pause: history is
    /// fabricated rather than the call being rejected, so `paused_at` and
    /// `resumed_at` carry the same timestamp.
    pub fn synthetic_resume(actor: i32, additional_km: Decimal, km_snapshot: Decimal) -> Self {
        let now = Utc::now();
        Self {
            paused_at: now,
            paused_by: actor,
            reason: Some("automatic resume".to_string()),
            km_snapshot,
            resumed_at: Some(now),
            additional_km: Some(additional_km),
            resumed_by: Some(actor),
        }
    }

    /// Check if this entry is still awaiting a resume
    pub fn is_open(&self) -> bool {
        self.resumed_at.is_none()
    }

    /// Close this entry in place with a resume
    pub fn close(&mut self, actor: i32, additional_km: Decimal) {
        self.resumed_at = Some(Utc::now());
        self.additional_km = Some(additional_km);
        self.resumed_by = Some(actor);
    }
}

/// Append-only note attached to a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceNote {
    pub text: String,
    pub author_id: i32,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

impl ServiceNote {
    pub fn new(text: impl Into<String>, author_id: i32, author_name: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author_id,
            author_name: author_name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Field service entity
///
/// Distance accounting: `base_km` is the distance reported when the job
/// was opened; `accumulated_km` is the running total across all
/// pause/resume cycles. The pause history is the source of truth: the
/// incremental counters must always agree with `derived_accumulated_km` /
/// `derived_resume_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Unique identifier
    pub id: i32,

    /// Owning technician
    pub user_id: i32,

    /// Assigned city (determines the per-km rate)
    pub city_id: i32,

    /// When the job was opened
    pub start_time: DateTime<Utc>,

    /// When the job was completed
    pub end_time: Option<DateTime<Utc>>,

    /// Current lifecycle status
    pub status: ServiceStatus,

    /// Distance reported at start
    pub base_km: Decimal,

    /// Running distance total across all pause/resume cycles
    pub accumulated_km: Decimal,

    /// Number of resume calls
    pub resume_count: i32,

    /// Append-only pause/resume ledger
    pub pause_history: Vec<PauseEvent>,

    /// Derived: materials subtotal (cached, never hand-edited)
    pub materials_value: Decimal,

    /// Derived: materials + displacement total (cached, never hand-edited)
    pub total_value: Decimal,

    /// Location coordinates at start
    pub location_lat: Option<Decimal>,
    pub location_lng: Option<Decimal>,

    /// Free-form address
    pub address: Option<String>,

    /// Append-only note history
    pub notes: Vec<ServiceNote>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Create a new service in `InProgress` with an empty ledger
    pub fn start(user_id: i32, city_id: i32, initial_km: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            city_id,
            start_time: now,
            end_time: None,
            status: ServiceStatus::InProgress,
            base_km: initial_km,
            accumulated_km: initial_km,
            resume_count: 0,
            pause_history: Vec::new(),
            materials_value: Decimal::ZERO,
            total_value: Decimal::ZERO,
            location_lat: None,
            location_lng: None,
            address: None,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The most recent open pause entry, if one exists
    pub fn open_pause(&self) -> Option<&PauseEvent> {
        self.pause_history.last().filter(|e| e.is_open())
    }

    /// Append a new open pause entry and move to `OnHold`
    ///
    /// The caller must have verified that the status permits pausing.
    pub fn record_pause(&mut self, actor: i32, reason: Option<String>) {
        self.pause_history
            .push(PauseEvent::open(actor, reason, self.accumulated_km));
        self.status = ServiceStatus::OnHold;
    }

    /// Close the ledger for a resume and move back to `InProgress`
    ///
    /// Closes the most recent open entry in place if one exists; otherwise
    /// appends a synthetic already-closed entry. A resume is never rejected
    /// for a missing open pause.
    pub fn record_resume(&mut self, actor: i32, additional_km: Decimal) {
        match self.pause_history.last_mut() {
            Some(last) if last.is_open() => last.close(actor, additional_km),
            _ => self.pause_history.push(PauseEvent::synthetic_resume(
                actor,
                additional_km,
                self.accumulated_km,
            )),
        }

        self.status = ServiceStatus::InProgress;
        self.resume_count += 1;
        self.accumulated_km += additional_km;
    }

    /// Re-derive the accumulated distance from the ledger
    ///
    /// Equals `base_km` plus the sum of `additional_km` over closed
    /// entries. Must always agree with the incrementally maintained
    /// `accumulated_km`.
    pub fn derived_accumulated_km(&self) -> Decimal {
        self.base_km
            + self
                .pause_history
                .iter()
                .filter_map(|e| e.additional_km)
                .sum::<Decimal>()
    }

    /// Re-derive the resume count from the ledger
    pub fn derived_resume_count(&self) -> i32 {
        self.pause_history
            .iter()
            .filter(|e| e.resumed_at.is_some())
            .count() as i32
    }

    /// Number of open entries in the ledger (invariant: 0 or 1)
    pub fn open_pause_count(&self) -> usize {
        self.pause_history.iter().filter(|e| e.is_open()).count()
    }
}
