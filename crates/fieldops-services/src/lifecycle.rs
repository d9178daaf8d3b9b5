//! Service lifecycle engine
//!
//! The state machine driving a field job from start through pause/resume
//! cycles to completion, with distance accounting delegated to the pause
//! ledger on the model and totals to the billing calculator. All entry
//! points take the authenticated actor and apply the same owner-or-admin
//! rule; every material or distance mutation ends with a full totals
//! recompute so the cached values never drift from the ledger.
//!
//! Writes to the job row go through the repository's locked
//! read-modify-write, so two requests mutating the same job serialize
//! instead of overwriting each other's ledger entries.

use crate::billing::{self, ServiceTotals};
use crate::notifier::{LifecycleEvent, LifecycleNotifier};
use fieldops_core::{
    models::{Actor, Service, ServiceMaterial, ServiceNote, ServiceStatus},
    traits::{
        CityRepository, MaterialRepository, Pagination, ServiceFilter, ServiceMaterialRepository,
        ServicePatch, ServiceRepository,
    },
    AppError, AppResult,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Parameters for opening a new service
#[derive(Debug, Clone)]
pub struct StartService {
    pub city_id: i32,
    pub initial_km: Option<Decimal>,
    pub address: Option<String>,
    pub location_lat: Option<Decimal>,
    pub location_lng: Option<Decimal>,
}

/// Whether `add_material` created a new line or grew an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialAction {
    Created,
    Updated,
}

/// Per-user service statistics
#[derive(Debug, Clone, Serialize)]
pub struct UserServiceStats {
    pub total_services: i64,
    pub total_km: Decimal,
}

/// Service lifecycle engine, generic over its repositories
///
/// Repositories are trait objects' generic cousins so the whole engine can
/// run against in-memory mocks in tests.
pub struct ServiceLifecycle<S, C, M, L>
where
    S: ServiceRepository,
    C: CityRepository,
    M: MaterialRepository,
    L: ServiceMaterialRepository,
{
    service_repo: Arc<S>,
    city_repo: Arc<C>,
    material_repo: Arc<M>,
    line_repo: Arc<L>,
    notifier: LifecycleNotifier,
}

impl<S, C, M, L> ServiceLifecycle<S, C, M, L>
where
    S: ServiceRepository,
    C: CityRepository,
    M: MaterialRepository,
    L: ServiceMaterialRepository,
{
    /// Create a new lifecycle engine
    pub fn new(
        service_repo: Arc<S>,
        city_repo: Arc<C>,
        material_repo: Arc<M>,
        line_repo: Arc<L>,
        notifier: LifecycleNotifier,
    ) -> Self {
        Self {
            service_repo,
            city_repo,
            material_repo,
            line_repo,
            notifier,
        }
    }

    /// Load a service or fail with not-found
    async fn load(&self, id: i32) -> AppResult<Service> {
        self.service_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(id.to_string()))
    }

    /// Owner-or-admin check, uniform across all mutating operations
    fn authorize(actor: &Actor, service: &Service) -> AppResult<()> {
        if !actor.can_access(service.user_id) {
            warn!(
                actor_id = actor.id,
                service_id = service.id,
                "access denied to service"
            );
            return Err(AppError::AccessDenied);
        }
        Ok(())
    }

    /// Reject any mutation of a completed job
    fn ensure_mutable(service: &Service) -> AppResult<()> {
        if service.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Service {} is completed and can no longer be modified",
                service.id
            )));
        }
        Ok(())
    }

    /// Recompute and persist the billing totals for a service
    ///
    /// Reads the city's current km rate at calculation time; rates are
    /// never snapshotted.
    async fn recompute_totals(&self, service: &Service) -> AppResult<ServiceTotals> {
        let city = self
            .city_repo
            .find_by_id(service.city_id)
            .await?
            .ok_or_else(|| AppError::CityNotFound(service.city_id.to_string()))?;

        let lines = self.line_repo.find_by_service(service.id).await?;
        let totals = billing::service_totals(service.accumulated_km, city.km_rate, &lines);

        self.service_repo
            .update_totals(service.id, totals.materials_value, totals.total_value)
            .await?;

        debug!(
            service_id = service.id,
            total = %totals.total_value,
            "recomputed service totals"
        );

        Ok(totals)
    }

    /// Locked read-modify-write on the job row
    ///
    /// Authorization and state checks run inside the critical section so a
    /// concurrent writer cannot invalidate them between read and write.
    async fn mutate<F>(&self, actor: &Actor, id: i32, apply: F) -> AppResult<Service>
    where
        F: Fn(&mut Service) -> AppResult<()> + Send + Sync,
    {
        let guarded = |service: &mut Service| {
            Self::authorize(actor, service)?;
            Self::ensure_mutable(service)?;
            apply(service)
        };

        self.service_repo
            .update_locked(id, &guarded)
            .await?
            .ok_or_else(|| AppError::ServiceNotFound(id.to_string()))
    }

    /// Open a new service in `in_progress` for the acting technician
    #[instrument(skip(self, actor, req), fields(actor_id = actor.id))]
    pub async fn start(&self, actor: &Actor, req: StartService) -> AppResult<Service> {
        let initial_km = req.initial_km.unwrap_or(Decimal::ZERO);
        if initial_km < Decimal::ZERO {
            return Err(AppError::Validation(
                "Initial distance cannot be negative".to_string(),
            ));
        }

        // Missing city is a validation failure, not a lookup miss: the
        // reference arrived in the request
        let city = self
            .city_repo
            .find_by_id(req.city_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("City {} does not exist", req.city_id))
            })?;

        let mut service = Service::start(actor.id, city.id, initial_km);
        service.address = req.address;
        service.location_lat = req.location_lat;
        service.location_lng = req.location_lng;

        let service = self.service_repo.create(&service).await?;

        info!(
            service_id = service.id,
            user_id = actor.id,
            city = %city.name,
            "service started"
        );

        self.notifier.emit(LifecycleEvent::Started {
            service_id: service.id,
            user_id: actor.id,
        });

        Ok(service)
    }

    /// Fetch a single service, owner or admin only
    #[instrument(skip(self, actor))]
    pub async fn get(&self, actor: &Actor, id: i32) -> AppResult<Service> {
        let service = self.load(id).await?;
        Self::authorize(actor, &service)?;
        Ok(service)
    }

    /// Pause a running service
    ///
    /// Allowed from any pre-completion status except `on_hold`: pausing an
    /// already-paused job would open a second ledger entry.
    #[instrument(skip(self, actor, reason))]
    pub async fn pause(
        &self,
        actor: &Actor,
        id: i32,
        reason: Option<String>,
    ) -> AppResult<Service> {
        let service = self
            .mutate(actor, id, |service| {
                if service.status == ServiceStatus::OnHold {
                    return Err(AppError::InvalidState(format!(
                        "Service {} is already on hold",
                        id
                    )));
                }
                service.record_pause(actor.id, reason.clone());
                Ok(())
            })
            .await?;

        info!(service_id = id, actor_id = actor.id, "service paused");

        self.notifier.emit(LifecycleEvent::OnHold {
            service_id: id,
            reason,
        });

        Ok(service)
    }

    /// Resume an on-hold service, logging the distance traveled meanwhile
    ///
    /// Closes the open pause entry in place when one exists; otherwise the
    /// ledger gains a synthetic already-closed entry. The resume itself is
    /// never rejected for a missing open pause.
    #[instrument(skip(self, actor))]
    pub async fn resume(
        &self,
        actor: &Actor,
        id: i32,
        additional_km: Decimal,
    ) -> AppResult<Service> {
        if additional_km < Decimal::ZERO {
            return Err(AppError::Validation(
                "Additional distance cannot be negative".to_string(),
            ));
        }

        let mut service = self
            .mutate(actor, id, |service| {
                if service.status != ServiceStatus::OnHold {
                    return Err(AppError::InvalidState(format!(
                        "Service {} is not on hold",
                        id
                    )));
                }
                service.record_resume(actor.id, additional_km);
                Ok(())
            })
            .await?;

        // Distance changed, so the displacement charge did too
        let totals = self.recompute_totals(&service).await?;
        service.materials_value = totals.materials_value;
        service.total_value = totals.total_value;

        info!(
            service_id = id,
            additional_km = %additional_km,
            accumulated_km = %service.accumulated_km,
            "service resumed"
        );

        self.notifier.emit(LifecycleEvent::Resumed {
            service_id: id,
            additional_km,
        });

        Ok(service)
    }

    /// Complete a service, stamping the end time and the final bill
    #[instrument(skip(self, actor))]
    pub async fn complete(&self, actor: &Actor, id: i32) -> AppResult<Service> {
        let mut service = self
            .mutate(actor, id, |service| {
                service.status = ServiceStatus::Completed;
                service.end_time = Some(Utc::now());
                Ok(())
            })
            .await?;

        let totals = self.recompute_totals(&service).await?;
        service.materials_value = totals.materials_value;
        service.total_value = totals.total_value;

        info!(
            service_id = id,
            total = %service.total_value,
            "service completed"
        );

        self.notifier.emit(LifecycleEvent::Completed {
            service_id: id,
            total_value: service.total_value,
        });

        Ok(service)
    }

    /// Delete a service and all its material lines
    ///
    /// Deletion substitutes cancellation and is allowed in any status.
    #[instrument(skip(self, actor))]
    pub async fn delete(&self, actor: &Actor, id: i32) -> AppResult<()> {
        let service = self.load(id).await?;
        Self::authorize(actor, &service)?;

        self.service_repo.delete_with_materials(id).await?;

        info!(service_id = id, actor_id = actor.id, "service deleted");

        Ok(())
    }

    /// Attach a material to a service, accumulating on an existing line
    ///
    /// A second add of the same material grows the existing line and keeps
    /// the unit price snapshotted at first insertion; the current catalog
    /// price is read only when the line is created.
    #[instrument(skip(self, actor))]
    pub async fn add_material(
        &self,
        actor: &Actor,
        service_id: i32,
        material_id: i32,
        quantity: Decimal,
    ) -> AppResult<(ServiceMaterial, MaterialAction)> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Quantity must be positive".to_string(),
            ));
        }

        let service = self.load(service_id).await?;
        Self::authorize(actor, &service)?;
        Self::ensure_mutable(&service)?;

        let (line, action) = match self
            .line_repo
            .find_by_service_and_material(service_id, material_id)
            .await?
        {
            Some(mut existing) => {
                existing.add_quantity(quantity);
                let updated = self.line_repo.update(&existing).await?;
                (updated, MaterialAction::Updated)
            }
            None => {
                let material = self
                    .material_repo
                    .find_by_id(material_id)
                    .await?
                    .ok_or_else(|| AppError::MaterialNotFound(material_id.to_string()))?;

                let line = ServiceMaterial::new(service_id, material_id, quantity, material.price);
                let created = self.line_repo.create(&line).await?;
                (created, MaterialAction::Created)
            }
        };

        self.recompute_totals(&service).await?;

        info!(
            service_id,
            material_id,
            quantity = %quantity,
            ?action,
            "material added"
        );

        self.notifier.emit(LifecycleEvent::MaterialAdded {
            service_id,
            material_id,
            quantity,
        });

        Ok((line, action))
    }

    /// Remove a material line from a service
    #[instrument(skip(self, actor))]
    pub async fn remove_material(&self, actor: &Actor, line_id: i32) -> AppResult<()> {
        let line = self
            .line_repo
            .find_by_id(line_id)
            .await?
            .ok_or_else(|| AppError::ServiceMaterialNotFound(line_id.to_string()))?;

        let service = self.load(line.service_id).await?;
        Self::authorize(actor, &service)?;
        Self::ensure_mutable(&service)?;

        self.line_repo.delete(line_id).await?;
        self.recompute_totals(&service).await?;

        info!(line_id, service_id = service.id, "material line removed");

        Ok(())
    }

    /// Replace the quantity on a material line
    ///
    /// Keeps the snapshotted unit price; only quantity and totals change.
    #[instrument(skip(self, actor))]
    pub async fn update_material_quantity(
        &self,
        actor: &Actor,
        line_id: i32,
        quantity: Decimal,
    ) -> AppResult<ServiceMaterial> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Quantity must be positive".to_string(),
            ));
        }

        let mut line = self
            .line_repo
            .find_by_id(line_id)
            .await?
            .ok_or_else(|| AppError::ServiceMaterialNotFound(line_id.to_string()))?;

        let service = self.load(line.service_id).await?;
        Self::authorize(actor, &service)?;
        Self::ensure_mutable(&service)?;

        line.set_quantity(quantity);
        let line = self.line_repo.update(&line).await?;

        self.recompute_totals(&service).await?;

        Ok(line)
    }

    /// Append a note to a service's note history
    #[instrument(skip(self, actor, text))]
    pub async fn add_note(
        &self,
        actor: &Actor,
        service_id: i32,
        text: &str,
    ) -> AppResult<Service> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Note text cannot be empty".to_string()));
        }

        self.mutate(actor, service_id, |service| {
            service
                .notes
                .push(ServiceNote::new(text, actor.id, actor.name.clone()));
            Ok(())
        })
        .await
    }

    /// Update the job's recorded location
    #[instrument(skip(self, actor))]
    pub async fn update_location(
        &self,
        actor: &Actor,
        service_id: i32,
        lat: Decimal,
        lng: Decimal,
    ) -> AppResult<Service> {
        self.mutate(actor, service_id, |service| {
            service.location_lat = Some(lat);
            service.location_lng = Some(lng);
            Ok(())
        })
        .await
    }

    /// Apply an allow-listed patch to a service
    ///
    /// Request bodies never touch the record directly; only the fields the
    /// patch names are applied, each validated first.
    #[instrument(skip(self, actor, patch))]
    pub async fn update(
        &self,
        actor: &Actor,
        service_id: i32,
        patch: ServicePatch,
    ) -> AppResult<Service> {
        if patch.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        // City existence is checked outside the lock; the reference either
        // resolves or the patch is rejected before any row is touched
        if let Some(city_id) = patch.city_id {
            self.city_repo
                .find_by_id(city_id)
                .await?
                .ok_or_else(|| AppError::Validation(format!("City {} does not exist", city_id)))?;
        }

        let mut service = self
            .mutate(actor, service_id, |service| {
                if let Some(city_id) = patch.city_id {
                    service.city_id = city_id;
                }
                if let Some(address) = patch.address.clone() {
                    service.address = Some(address);
                }
                if let Some(lat) = patch.location_lat {
                    service.location_lat = Some(lat);
                }
                if let Some(lng) = patch.location_lng {
                    service.location_lng = Some(lng);
                }
                if let Some(base_km) = patch.base_km {
                    if base_km < Decimal::ZERO {
                        return Err(AppError::Validation(
                            "Base distance cannot be negative".to_string(),
                        ));
                    }
                    // Shift the running total by the same delta so the ledger
                    // derivation still agrees with the counter
                    let delta = base_km - service.base_km;
                    service.base_km = base_km;
                    service.accumulated_km += delta;
                }
                Ok(())
            })
            .await?;

        let totals = self.recompute_totals(&service).await?;
        service.materials_value = totals.materials_value;
        service.total_value = totals.total_value;

        Ok(service)
    }

    /// Material lines attached to a service
    #[instrument(skip(self, actor))]
    pub async fn materials(&self, actor: &Actor, service_id: i32) -> AppResult<Vec<ServiceMaterial>> {
        let service = self.load(service_id).await?;
        Self::authorize(actor, &service)?;
        self.line_repo.find_by_service(service_id).await
    }

    /// Cross-job listing with filters
    ///
    /// Non-admin callers only ever see their own jobs, whatever the filter
    /// says.
    #[instrument(skip(self, actor, filter))]
    pub async fn list(
        &self,
        actor: &Actor,
        mut filter: ServiceFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<Service>, i64)> {
        if !actor.role.is_admin() {
            filter.user_id = Some(actor.id);
        }

        self.service_repo
            .list_filtered(&filter, pagination.limit(), pagination.offset())
            .await
    }

    /// The acting technician's own services, optionally by status
    #[instrument(skip(self, actor))]
    pub async fn my_services(
        &self,
        actor: &Actor,
        status: Option<ServiceStatus>,
        pagination: &Pagination,
    ) -> AppResult<(Vec<Service>, i64)> {
        self.service_repo
            .find_by_user(actor.id, status, pagination.limit(), pagination.offset())
            .await
    }

    /// The acting technician's services changed since an instant
    ///
    /// Snapshot feed for offline clients catching up after a gap.
    #[instrument(skip(self, actor))]
    pub async fn updated_since(
        &self,
        actor: &Actor,
        since: chrono::DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<Service>> {
        self.service_repo
            .find_updated_since(actor.id, since, limit)
            .await
    }

    /// Aggregate statistics for the acting technician
    #[instrument(skip(self, actor))]
    pub async fn my_stats(&self, actor: &Actor) -> AppResult<UserServiceStats> {
        let (_, total) = self
            .service_repo
            .find_by_user(actor.id, None, 1, 0)
            .await?;
        let total_km = self.service_repo.total_km_for_user(actor.id).await?;

        Ok(UserServiceStats {
            total_services: total,
            total_km,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory repository doubles shared by the service-layer tests

    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use fieldops_core::models::{City, Material};
    use fieldops_core::traits::Repository;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct MockServiceRepo {
        pub services: Mutex<HashMap<i32, Service>>,
        pub lines: Arc<Mutex<HashMap<i32, ServiceMaterial>>>,
        next_id: Mutex<i32>,
    }

    impl MockServiceRepo {
        pub fn with_lines(lines: Arc<Mutex<HashMap<i32, ServiceMaterial>>>) -> Self {
            Self {
                lines,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Repository<Service, i32> for MockServiceRepo {
        async fn find_by_id(&self, id: i32) -> AppResult<Option<Service>> {
            Ok(self.services.lock().get(&id).cloned())
        }

        async fn find_all(&self, limit: i64, offset: i64) -> AppResult<Vec<Service>> {
            let all: Vec<_> = self.services.lock().values().cloned().collect();
            Ok(all
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.services.lock().len() as i64)
        }

        async fn create(&self, entity: &Service) -> AppResult<Service> {
            let mut next = self.next_id.lock();
            *next += 1;
            let mut created = entity.clone();
            created.id = *next;
            self.services.lock().insert(created.id, created.clone());
            Ok(created)
        }

        async fn update(&self, entity: &Service) -> AppResult<Service> {
            let mut updated = entity.clone();
            updated.updated_at = Utc::now();
            self.services.lock().insert(updated.id, updated.clone());
            Ok(updated)
        }

        async fn delete(&self, id: i32) -> AppResult<bool> {
            Ok(self.services.lock().remove(&id).is_some())
        }
    }

    #[async_trait]
    impl ServiceRepository for MockServiceRepo {
        async fn list_filtered(
            &self,
            filter: &ServiceFilter,
            limit: i64,
            _offset: i64,
        ) -> AppResult<(Vec<Service>, i64)> {
            let matching: Vec<_> = self
                .services
                .lock()
                .values()
                .filter(|s| filter.user_id.map_or(true, |u| s.user_id == u))
                .filter(|s| filter.status.map_or(true, |st| s.status == st))
                .cloned()
                .collect();
            let total = matching.len() as i64;
            Ok((matching.into_iter().take(limit as usize).collect(), total))
        }

        async fn find_by_user(
            &self,
            user_id: i32,
            status: Option<ServiceStatus>,
            limit: i64,
            _offset: i64,
        ) -> AppResult<(Vec<Service>, i64)> {
            let matching: Vec<_> = self
                .services
                .lock()
                .values()
                .filter(|s| s.user_id == user_id)
                .filter(|s| status.map_or(true, |st| s.status == st))
                .cloned()
                .collect();
            let total = matching.len() as i64;
            Ok((matching.into_iter().take(limit as usize).collect(), total))
        }

        async fn update_locked(
            &self,
            id: i32,
            apply: &(dyn for<'a> Fn(&'a mut Service) -> Result<(), AppError> + Send + Sync),
        ) -> AppResult<Option<Service>> {
            let mut services = self.services.lock();
            let Some(service) = services.get_mut(&id) else {
                return Ok(None);
            };
            apply(service)?;
            service.updated_at = Utc::now();
            Ok(Some(service.clone()))
        }

        async fn update_totals(
            &self,
            id: i32,
            materials_value: Decimal,
            total_value: Decimal,
        ) -> AppResult<()> {
            let mut services = self.services.lock();
            let service = services
                .get_mut(&id)
                .ok_or_else(|| AppError::ServiceNotFound(id.to_string()))?;
            service.materials_value = materials_value;
            service.total_value = total_value;
            Ok(())
        }

        async fn delete_with_materials(&self, id: i32) -> AppResult<bool> {
            self.lines.lock().retain(|_, l| l.service_id != id);
            Ok(self.services.lock().remove(&id).is_some())
        }

        async fn total_km_for_user(&self, user_id: i32) -> AppResult<Decimal> {
            Ok(self
                .services
                .lock()
                .values()
                .filter(|s| s.user_id == user_id)
                .map(|s| s.accumulated_km)
                .sum())
        }

        async fn find_updated_since(
            &self,
            user_id: i32,
            since: chrono::DateTime<Utc>,
            limit: i64,
        ) -> AppResult<Vec<Service>> {
            let mut matching: Vec<_> = self
                .services
                .lock()
                .values()
                .filter(|s| s.user_id == user_id && s.updated_at >= since)
                .cloned()
                .collect();
            matching.sort_by_key(|s| s.updated_at);
            matching.truncate(limit as usize);
            Ok(matching)
        }
    }

    #[derive(Default)]
    pub struct MockCityRepo {
        pub cities: Mutex<HashMap<i32, City>>,
    }

    impl MockCityRepo {
        pub fn with(cities: Vec<City>) -> Self {
            Self {
                cities: Mutex::new(cities.into_iter().map(|c| (c.id, c)).collect()),
            }
        }
    }

    #[async_trait]
    impl Repository<City, i32> for MockCityRepo {
        async fn find_by_id(&self, id: i32) -> AppResult<Option<City>> {
            Ok(self.cities.lock().get(&id).cloned())
        }

        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<City>> {
            Ok(self.cities.lock().values().cloned().collect())
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.cities.lock().len() as i64)
        }

        async fn create(&self, entity: &City) -> AppResult<City> {
            self.cities.lock().insert(entity.id, entity.clone());
            Ok(entity.clone())
        }

        async fn update(&self, entity: &City) -> AppResult<City> {
            self.cities.lock().insert(entity.id, entity.clone());
            Ok(entity.clone())
        }

        async fn delete(&self, id: i32) -> AppResult<bool> {
            Ok(self.cities.lock().remove(&id).is_some())
        }
    }

    #[async_trait]
    impl CityRepository for MockCityRepo {
        async fn find_by_name(&self, name: &str) -> AppResult<Option<City>> {
            Ok(self
                .cities
                .lock()
                .values()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .cloned())
        }
    }

    #[derive(Default)]
    pub struct MockMaterialRepo {
        pub materials: Mutex<HashMap<i32, Material>>,
    }

    impl MockMaterialRepo {
        pub fn with(materials: Vec<Material>) -> Self {
            Self {
                materials: Mutex::new(materials.into_iter().map(|m| (m.id, m)).collect()),
            }
        }
    }

    #[async_trait]
    impl Repository<Material, i32> for MockMaterialRepo {
        async fn find_by_id(&self, id: i32) -> AppResult<Option<Material>> {
            Ok(self.materials.lock().get(&id).cloned())
        }

        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<Material>> {
            Ok(self.materials.lock().values().cloned().collect())
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.materials.lock().len() as i64)
        }

        async fn create(&self, entity: &Material) -> AppResult<Material> {
            self.materials.lock().insert(entity.id, entity.clone());
            Ok(entity.clone())
        }

        async fn update(&self, entity: &Material) -> AppResult<Material> {
            self.materials.lock().insert(entity.id, entity.clone());
            Ok(entity.clone())
        }

        async fn delete(&self, id: i32) -> AppResult<bool> {
            Ok(self.materials.lock().remove(&id).is_some())
        }
    }

    #[async_trait]
    impl MaterialRepository for MockMaterialRepo {
        async fn find_active(&self, _limit: i64, _offset: i64) -> AppResult<Vec<Material>> {
            Ok(self
                .materials
                .lock()
                .values()
                .filter(|m| m.is_active)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    pub struct MockLineRepo {
        pub lines: Arc<Mutex<HashMap<i32, ServiceMaterial>>>,
        next_id: Mutex<i32>,
    }

    impl MockLineRepo {
        pub fn with_lines(lines: Arc<Mutex<HashMap<i32, ServiceMaterial>>>) -> Self {
            Self {
                lines,
                next_id: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Repository<ServiceMaterial, i32> for MockLineRepo {
        async fn find_by_id(&self, id: i32) -> AppResult<Option<ServiceMaterial>> {
            Ok(self.lines.lock().get(&id).cloned())
        }

        async fn find_all(&self, _limit: i64, _offset: i64) -> AppResult<Vec<ServiceMaterial>> {
            Ok(self.lines.lock().values().cloned().collect())
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.lines.lock().len() as i64)
        }

        async fn create(&self, entity: &ServiceMaterial) -> AppResult<ServiceMaterial> {
            let mut next = self.next_id.lock();
            *next += 1;
            let mut created = entity.clone();
            created.id = *next;
            self.lines.lock().insert(created.id, created.clone());
            Ok(created)
        }

        async fn update(&self, entity: &ServiceMaterial) -> AppResult<ServiceMaterial> {
            self.lines.lock().insert(entity.id, entity.clone());
            Ok(entity.clone())
        }

        async fn delete(&self, id: i32) -> AppResult<bool> {
            Ok(self.lines.lock().remove(&id).is_some())
        }
    }

    #[async_trait]
    impl ServiceMaterialRepository for MockLineRepo {
        async fn find_by_service_and_material(
            &self,
            service_id: i32,
            material_id: i32,
        ) -> AppResult<Option<ServiceMaterial>> {
            Ok(self
                .lines
                .lock()
                .values()
                .find(|l| l.service_id == service_id && l.material_id == material_id)
                .cloned())
        }

        async fn find_by_service(&self, service_id: i32) -> AppResult<Vec<ServiceMaterial>> {
            let mut lines: Vec<_> = self
                .lines
                .lock()
                .values()
                .filter(|l| l.service_id == service_id)
                .cloned()
                .collect();
            lines.sort_by_key(|l| l.id);
            Ok(lines)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use fieldops_core::models::{City, Material, UserRole};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    type TestLifecycle =
        ServiceLifecycle<MockServiceRepo, MockCityRepo, MockMaterialRepo, MockLineRepo>;

    fn actor(id: i32, role: UserRole) -> Actor {
        Actor {
            id,
            name: format!("tech-{}", id),
            role,
            is_active: true,
        }
    }

    fn city(id: i32, km_rate: Decimal) -> City {
        City {
            id,
            name: format!("City {}", id),
            state: "PR".into(),
            km_rate,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn material(id: i32, price: Decimal) -> Material {
        Material {
            id,
            name: format!("Material {}", id),
            description: None,
            price,
            unit: "un".into(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn lifecycle_with(cities: Vec<City>, materials: Vec<Material>) -> TestLifecycle {
        let lines = Arc::new(Mutex::new(HashMap::new()));
        let (notifier, _rx) = LifecycleNotifier::channel();
        ServiceLifecycle::new(
            Arc::new(MockServiceRepo::with_lines(lines.clone())),
            Arc::new(MockCityRepo::with(cities)),
            Arc::new(MockMaterialRepo::with(materials)),
            Arc::new(MockLineRepo::with_lines(lines)),
            notifier,
        )
    }

    fn start_req(city_id: i32, km: Decimal) -> StartService {
        StartService {
            city_id,
            initial_km: Some(km),
            address: None,
            location_lat: None,
            location_lng: None,
        }
    }

    #[tokio::test]
    async fn test_start_requires_valid_city() {
        let lc = lifecycle_with(vec![], vec![]);
        let result = lc.start(&actor(1, UserRole::User), start_req(99, dec!(0))).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_start_creates_in_progress_service() {
        let lc = lifecycle_with(vec![city(10, dec!(2.50))], vec![]);
        let svc = lc
            .start(&actor(1, UserRole::User), start_req(10, dec!(5)))
            .await
            .unwrap();

        assert_eq!(svc.status, ServiceStatus::InProgress);
        assert_eq!(svc.base_km, dec!(5));
        assert_eq!(svc.accumulated_km, dec!(5));
        assert!(svc.pause_history.is_empty());
    }

    #[tokio::test]
    async fn test_pause_resume_cycle_updates_totals() {
        let lc = lifecycle_with(vec![city(10, dec!(2.50))], vec![]);
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        lc.pause(&tech, svc.id, Some("lunch".into())).await.unwrap();
        let svc = lc.resume(&tech, svc.id, dec!(10)).await.unwrap();

        assert_eq!(svc.status, ServiceStatus::InProgress);
        assert_eq!(svc.accumulated_km, dec!(10));
        assert_eq!(svc.resume_count, 1);
        assert_eq!(svc.total_value, dec!(25.00)); // 10 km × 2.50
    }

    #[tokio::test]
    async fn test_pause_while_on_hold_rejected() {
        let lc = lifecycle_with(vec![city(10, dec!(1))], vec![]);
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        lc.pause(&tech, svc.id, None).await.unwrap();

        let result = lc.pause(&tech, svc.id, None).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_resume_requires_on_hold() {
        let lc = lifecycle_with(vec![city(10, dec!(1))], vec![]);
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        let result = lc.resume(&tech, svc.id, dec!(5)).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_resume_rejects_negative_distance() {
        let lc = lifecycle_with(vec![city(10, dec!(1))], vec![]);
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        lc.pause(&tech, svc.id, None).await.unwrap();

        let result = lc.resume(&tech, svc.id, dec!(-1)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resume_without_open_pause_fabricates_entry() {
        let lc = lifecycle_with(vec![city(10, dec!(1))], vec![]);
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(2))).await.unwrap();

        // Force on_hold with an empty ledger, as a legacy record might be
        {
            let mut services = lc.service_repo.services.lock();
            services.get_mut(&svc.id).unwrap().status = ServiceStatus::OnHold;
        }

        let svc = lc.resume(&tech, svc.id, dec!(3)).await.unwrap();

        assert_eq!(svc.pause_history.len(), 1);
        let entry = &svc.pause_history[0];
        assert_eq!(entry.paused_at, entry.resumed_at.unwrap());
        assert_eq!(svc.accumulated_km, dec!(5));
    }

    #[tokio::test]
    async fn test_add_material_twice_accumulates_with_snapshot_price() {
        let lc = lifecycle_with(
            vec![city(10, dec!(2.50))],
            vec![material(5, dec!(12.50))],
        );
        let tech = actor(1, UserRole::User);
        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();

        let (line, action) = lc.add_material(&tech, svc.id, 5, dec!(2)).await.unwrap();
        assert_eq!(action, MaterialAction::Created);
        assert_eq!(line.total_price, dec!(25.00));

        // Catalog price change between adds must not affect the line
        {
            let mut materials = lc.material_repo.materials.lock();
            materials.get_mut(&5).unwrap().price = dec!(99.99);
        }

        let (line, action) = lc.add_material(&tech, svc.id, 5, dec!(1.5)).await.unwrap();
        assert_eq!(action, MaterialAction::Updated);
        assert_eq!(line.quantity, dec!(3.5));
        assert_eq!(line.unit_price, dec!(12.50));
        assert_eq!(line.total_price, dec!(43.75));

        // Still exactly one line for the pair
        let lines = lc.materials(&tech, svc.id).await.unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn test_billing_scenario_end_to_end() {
        // km_rate 2.50; material qty 2 × 12.50; resume +10 km; complete
        let lc = lifecycle_with(
            vec![city(10, dec!(2.50))],
            vec![material(5, dec!(12.50))],
        );
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        lc.add_material(&tech, svc.id, 5, dec!(2)).await.unwrap();
        lc.pause(&tech, svc.id, None).await.unwrap();
        lc.resume(&tech, svc.id, dec!(10)).await.unwrap();
        let svc = lc.complete(&tech, svc.id).await.unwrap();

        assert_eq!(svc.status, ServiceStatus::Completed);
        assert!(svc.end_time.is_some());
        assert_eq!(svc.materials_value, dec!(25.00));
        assert_eq!(svc.total_value, dec!(50.00));
    }

    #[tokio::test]
    async fn test_cached_totals_match_recomputation() {
        let lc = lifecycle_with(
            vec![city(10, dec!(1.75))],
            vec![material(5, dec!(3.33)), material(6, dec!(0.99))],
        );
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(4))).await.unwrap();
        lc.add_material(&tech, svc.id, 5, dec!(1.5)).await.unwrap();
        lc.add_material(&tech, svc.id, 6, dec!(4)).await.unwrap();
        lc.pause(&tech, svc.id, None).await.unwrap();
        lc.resume(&tech, svc.id, dec!(2.5)).await.unwrap();

        let svc = lc.get(&tech, svc.id).await.unwrap();
        let lines = lc.materials(&tech, svc.id).await.unwrap();
        let from_scratch = billing::service_totals(svc.accumulated_km, dec!(1.75), &lines);

        assert_eq!(svc.materials_value, from_scratch.materials_value);
        assert_eq!(svc.total_value, from_scratch.total_value);
    }

    #[tokio::test]
    async fn test_completed_service_rejects_mutation() {
        let lc = lifecycle_with(
            vec![city(10, dec!(1))],
            vec![material(5, dec!(1.00))],
        );
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        lc.complete(&tech, svc.id).await.unwrap();

        assert!(matches!(
            lc.pause(&tech, svc.id, None).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            lc.add_material(&tech, svc.id, 5, dec!(1)).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            lc.complete(&tech, svc.id).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_authorization_owner_or_admin_only() {
        let lc = lifecycle_with(vec![city(10, dec!(1))], vec![]);
        let owner = actor(1, UserRole::User);
        let stranger = actor(2, UserRole::User);
        let admin = actor(3, UserRole::Admin);

        let svc = lc.start(&owner, start_req(10, dec!(0))).await.unwrap();

        assert!(matches!(
            lc.pause(&stranger, svc.id, None).await,
            Err(AppError::AccessDenied)
        ));
        assert!(lc.pause(&admin, svc.id, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_material_lines() {
        let lc = lifecycle_with(
            vec![city(10, dec!(1))],
            vec![material(5, dec!(2.00))],
        );
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        lc.add_material(&tech, svc.id, 5, dec!(3)).await.unwrap();

        lc.delete(&tech, svc.id).await.unwrap();

        assert!(lc.line_repo.lines.lock().is_empty());
        assert!(matches!(
            lc.get(&tech, svc.id).await,
            Err(AppError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_patch_adjusts_base_km() {
        let lc = lifecycle_with(vec![city(10, dec!(2))], vec![]);
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(5))).await.unwrap();
        lc.pause(&tech, svc.id, None).await.unwrap();
        lc.resume(&tech, svc.id, dec!(3)).await.unwrap();

        let patch = ServicePatch {
            base_km: Some(dec!(7)),
            ..Default::default()
        };
        let svc = lc.update(&tech, svc.id, patch).await.unwrap();

        assert_eq!(svc.base_km, dec!(7));
        assert_eq!(svc.accumulated_km, dec!(10));
        assert_eq!(svc.accumulated_km, svc.derived_accumulated_km());
    }

    #[tokio::test]
    async fn test_empty_patch_rejected() {
        let lc = lifecycle_with(vec![city(10, dec!(1))], vec![]);
        let tech = actor(1, UserRole::User);
        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();

        let result = lc.update(&tech, svc.id, ServicePatch::default()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let lc = lifecycle_with(vec![city(10, dec!(2.50))], vec![]);
        let tech = actor(1, UserRole::User);

        let svc = lc.start(&tech, start_req(10, dec!(0))).await.unwrap();
        lc.pause(&tech, svc.id, None).await.unwrap();

        // A resume and a note race on the same job; each writer must see
        // the other's row, never a stale snapshot
        let (resumed, noted) = tokio::join!(
            lc.resume(&tech, svc.id, dec!(10)),
            lc.add_note(&tech, svc.id, "swapped the modem"),
        );
        resumed.unwrap();
        noted.unwrap();

        let svc = lc.get(&tech, svc.id).await.unwrap();
        assert_eq!(svc.status, ServiceStatus::InProgress);
        assert_eq!(svc.resume_count, 1);
        assert_eq!(svc.accumulated_km, dec!(10));
        assert_eq!(svc.accumulated_km, svc.derived_accumulated_km());
        assert_eq!(svc.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_list_hides_other_users_from_non_admin() {
        let lc = lifecycle_with(vec![city(10, dec!(1))], vec![]);
        let a = actor(1, UserRole::User);
        let b = actor(2, UserRole::User);
        let admin = actor(3, UserRole::Admin);

        lc.start(&a, start_req(10, dec!(0))).await.unwrap();
        lc.start(&b, start_req(10, dec!(0))).await.unwrap();

        let (mine, total) = lc
            .list(&a, ServiceFilter::default(), &Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(mine.iter().all(|s| s.user_id == a.id));

        let (_, total) = lc
            .list(&admin, ServiceFilter::default(), &Pagination::new(1, 10))
            .await
            .unwrap();
        assert_eq!(total, 2);
    }
}
