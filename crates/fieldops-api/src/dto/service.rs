//! Service lifecycle DTOs

use chrono::{DateTime, Utc};
use fieldops_core::models::ServiceStatus;
use fieldops_core::traits::{ServiceFilter, ServicePatch};
use fieldops_core::AppError;
use fieldops_services::StartService;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

/// Start a new service
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartServiceRequest {
    pub city_id: i32,

    /// Distance already driven to reach the site
    pub initial_km: Option<Decimal>,

    #[validate(length(max = 255))]
    pub address: Option<String>,

    pub location_lat: Option<Decimal>,
    pub location_lng: Option<Decimal>,
}

impl StartServiceRequest {
    pub fn into_start(self) -> StartService {
        StartService {
            city_id: self.city_id,
            initial_km: self.initial_km,
            address: self.address,
            location_lat: self.location_lat,
            location_lng: self.location_lng,
        }
    }
}

/// Pause a running service
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PauseRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Resume an on-hold service
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeRequest {
    /// Distance driven while the job was on hold
    pub additional_km: Decimal,
}

/// Allow-listed service update
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateServiceRequest {
    #[validate(length(max = 255))]
    pub address: Option<String>,
    pub city_id: Option<i32>,
    pub location_lat: Option<Decimal>,
    pub location_lng: Option<Decimal>,
    pub base_km: Option<Decimal>,
}

impl UpdateServiceRequest {
    pub fn into_patch(self) -> ServicePatch {
        ServicePatch {
            address: self.address,
            city_id: self.city_id,
            location_lat: self.location_lat,
            location_lng: self.location_lng,
            base_km: self.base_km,
        }
    }
}

/// Attach a material to a service
#[derive(Debug, Clone, Deserialize)]
pub struct AddMaterialRequest {
    pub service_id: i32,
    pub material_id: i32,
    pub quantity: Decimal,
}

/// Replace a material line's quantity
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: Decimal,
}

/// Append a note to a service
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NoteRequest {
    #[validate(length(min = 1, max = 2000, message = "Note text is required"))]
    pub text: String,
}

/// Update a service's recorded location
#[derive(Debug, Clone, Deserialize)]
pub struct LocationRequest {
    pub location_lat: Decimal,
    pub location_lng: Decimal,
}

/// Query filters for the cross-job listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceFilterParams {
    pub status: Option<String>,
    pub user_id: Option<i32>,
    pub city: Option<String>,
    pub technician: Option<String>,
    pub address: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

impl ServiceFilterParams {
    /// Convert to the repository filter, rejecting unknown statuses
    pub fn to_filter(&self) -> Result<ServiceFilter, AppError> {
        let status = match self.status.as_deref() {
            Some(s) => Some(
                ServiceStatus::from_str(s)
                    .ok_or_else(|| AppError::Validation(format!("Unknown status '{}'", s)))?,
            ),
            None => None,
        };

        Ok(ServiceFilter {
            status,
            user_id: self.user_id,
            city_name: self.city.clone(),
            technician_name: self.technician.clone(),
            address: self.address.clone(),
            date_from: self.date_from,
            date_to: self.date_to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_filter_params_reject_unknown_status() {
        let params = ServiceFilterParams {
            status: Some("teleported".to_string()),
            ..Default::default()
        };
        assert!(params.to_filter().is_err());

        let params = ServiceFilterParams {
            status: Some("on_hold".to_string()),
            ..Default::default()
        };
        let filter = params.to_filter().unwrap();
        assert_eq!(filter.status, Some(ServiceStatus::OnHold));
    }

    #[test]
    fn test_update_request_maps_to_patch() {
        let req = UpdateServiceRequest {
            address: Some("Rua XV, 100".to_string()),
            city_id: None,
            location_lat: None,
            location_lng: None,
            base_km: Some(dec!(3.5)),
        };
        let patch = req.into_patch();
        assert!(!patch.is_empty());
        assert_eq!(patch.base_km, Some(dec!(3.5)));
    }
}
