use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::conflict::{find_conflict, report, validate_duration};
use super::{Engine, EngineError};

// ── Pure state transitions ───────────────────────────────────────

/// Tag `booth_id` as owned by `application_id`. Returns whether anything changed.
pub fn link_booth(layout: &mut Layout, booth_id: &Ulid, application_id: Ulid) -> bool {
    match layout.booth_mut(booth_id) {
        Some(booth) if booth.is_occupied && booth.application_id == Some(application_id) => false,
        Some(booth) => {
            booth.is_occupied = true;
            booth.application_id = Some(application_id);
            true
        }
        None => false,
    }
}

/// Clear whichever booth is tagged with `application_id`.
pub fn unlink_application(layout: &mut Layout, application_id: &Ulid) -> bool {
    match booth_held_by(layout, application_id) {
        Some(booth_id) => clear_booth(layout, &booth_id),
        None => false,
    }
}

pub(crate) fn clear_booth(layout: &mut Layout, booth_id: &Ulid) -> bool {
    match layout.booth_mut(booth_id) {
        Some(booth) if booth.is_occupied || booth.application_id.is_some() => {
            booth.is_occupied = false;
            booth.application_id = None;
            true
        }
        _ => false,
    }
}

pub fn booth_held_by(layout: &Layout, application_id: &Ulid) -> Option<Ulid> {
    layout
        .booths
        .iter()
        .find(|b| b.application_id == Some(*application_id))
        .map(|b| b.id)
}

// ── Application lifecycle ────────────────────────────────────────

/// A booth tag as it was before the engine changed it.
struct PriorTag {
    layout_id: Ulid,
    booth_id: Ulid,
    holder: Option<Ulid>,
}

impl Engine {
    /// Creation-time gate for applications. Platform applications must name a
    /// stored booth and a free slot; the stored status is always `Pending`.
    pub async fn submit_application(
        &self,
        mut application: VendorApplication,
    ) -> Result<VendorApplication, EngineError> {
        application.status = ApplicationStatus::Pending;

        let booth_id = match application.kind {
            ApplicationKind::Platform => {
                let booth_id = application
                    .booth_id
                    .ok_or(EngineError::MissingBooth(application.id))?;
                validate_duration(application.duration_weeks)?;
                Some(booth_id)
            }
            ApplicationKind::Bazaar => None,
        };

        let _reservations = self.reservations.lock().await;
        if let Some(booth_id) = booth_id {
            if self.layout_for_booth(&booth_id).is_none() {
                return Err(EngineError::BoothNotFound(booth_id));
            }
            let existing = self.applications.find_by_booth(booth_id).await?;
            if let Some(hit) = find_conflict(booth_id, &application.span(), &existing) {
                metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::ReservationConflict {
                    booth: booth_id,
                    details: ConflictDetails::from_application(hit),
                });
            }
        }
        self.applications.insert(application.clone()).await?;
        info!("application {} submitted for booth {:?}", application.id, application.booth_id);
        Ok(application)
    }

    /// Pending → approved, then tag the booth in the active layout.
    pub async fn approve_application(&self, id: Ulid) -> Result<VendorApplication, EngineError> {
        let _reservations = self.reservations.lock().await;
        let app = self.application(id).await?;
        if app.status != ApplicationStatus::Pending {
            return Err(EngineError::InvalidTransition { id, action: "approve" });
        }

        if app.kind == ApplicationKind::Platform
            && let Some(booth_id) = app.booth_id
        {
            let others: Vec<VendorApplication> = self
                .applications
                .find_by_booth(booth_id)
                .await?
                .into_iter()
                .filter(|a| a.id != id)
                .collect();
            let conflict = report(find_conflict(booth_id, &app.span(), &others));
            if let Some(details) = conflict.details {
                metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::ReservationConflict { booth: booth_id, details });
            }
        }

        let approved = VendorApplication { status: ApplicationStatus::Approved, ..app };
        let prior = self.link_locked(&approved).await?;
        if let Err(e) = self.applications.update_status(id, ApplicationStatus::Approved).await {
            self.restore_tags(prior.into_iter().collect()).await;
            return Err(e.into());
        }
        info!("application {id} approved");
        Ok(approved)
    }

    pub async fn reject_application(&self, id: Ulid) -> Result<VendorApplication, EngineError> {
        let _reservations = self.reservations.lock().await;
        let app = self.application(id).await?;
        if app.status != ApplicationStatus::Pending {
            return Err(EngineError::InvalidTransition { id, action: "reject" });
        }
        self.applications.update_status(id, ApplicationStatus::Rejected).await?;
        info!("application {id} rejected");
        Ok(VendorApplication { status: ApplicationStatus::Rejected, ..app })
    }

    /// Withdraw a pending or approved application, freeing its booth.
    pub async fn cancel_application(&self, id: Ulid) -> Result<VendorApplication, EngineError> {
        let _reservations = self.reservations.lock().await;
        let app = self.application(id).await?;
        if !app.status.holds_slot() {
            return Err(EngineError::InvalidTransition { id, action: "cancel" });
        }
        let prior = if app.status == ApplicationStatus::Approved {
            self.unlink_locked(id).await?
        } else {
            Vec::new()
        };
        if let Err(e) = self.applications.update_status(id, ApplicationStatus::Cancelled).await {
            self.restore_tags(prior).await;
            return Err(e.into());
        }
        info!("application {id} cancelled");
        Ok(VendorApplication { status: ApplicationStatus::Cancelled, ..app })
    }

    /// Tag the booth of an approved application as occupied in the active
    /// layout. A booth missing from the active layout is logged, not raised.
    pub async fn link_occupancy(&self, application_id: Ulid) -> Result<bool, EngineError> {
        let _reservations = self.reservations.lock().await;
        let app = self.application(application_id).await?;
        if app.status != ApplicationStatus::Approved {
            return Err(EngineError::InvalidTransition { id: application_id, action: "link" });
        }
        Ok(self.link_locked(&app).await?.is_some())
    }

    /// Clear the booth tagged with `application_id` in any stored layout.
    pub async fn unlink_occupancy(&self, application_id: Ulid) -> Result<bool, EngineError> {
        let _reservations = self.reservations.lock().await;
        Ok(!self.unlink_locked(application_id).await?.is_empty())
    }

    /// Clear booth tags whose application is missing from the repository or
    /// no longer approved for that booth. Run after `Engine::new` once the
    /// repository is reachable; returns the number of booths cleared.
    pub async fn reconcile_occupancy(&self) -> Result<usize, EngineError> {
        let _reservations = self.reservations.lock().await;
        let mut cleared = 0;
        for shared in self.all_layouts() {
            let mut guard = shared.write().await;
            let tagged: Vec<(Ulid, Option<Ulid>)> = guard
                .booths
                .iter()
                .filter(|b| b.is_occupied || b.application_id.is_some())
                .map(|b| (b.id, b.application_id))
                .collect();
            for (booth_id, application_id) in tagged {
                let owner = match application_id {
                    Some(app_id) => self.applications.get(app_id).await?,
                    None => None,
                };
                let holds = owner.is_some_and(|a| {
                    a.status == ApplicationStatus::Approved && a.booth_id == Some(booth_id)
                });
                if holds {
                    continue;
                }
                warn!("booth {booth_id} tagged with unknown or inactive application {application_id:?}, clearing");
                let event = Event::OccupancyCleared { layout_id: guard.id, booth_id };
                self.persist_and_apply(&mut guard, &event).await?;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn application(&self, id: Ulid) -> Result<VendorApplication, EngineError> {
        self.applications
            .get(id)
            .await?
            .ok_or(EngineError::ApplicationNotFound(id))
    }

    /// Caller holds the reservation guard. Returns the tag the link replaced,
    /// or `None` when nothing changed.
    async fn link_locked(&self, app: &VendorApplication) -> Result<Option<PriorTag>, EngineError> {
        if app.kind != ApplicationKind::Platform {
            return Ok(None);
        }
        let Some(booth_id) = app.booth_id else {
            return Ok(None);
        };

        let active = self.active.lock().await;
        let Some(layout_id) = *active else {
            self.link_miss(app.id, booth_id);
            return Ok(None);
        };
        let mut guard = self.layout_write(&layout_id).await?;
        drop(active);

        match guard.booth(&booth_id) {
            None => {
                self.link_miss(app.id, booth_id);
                Ok(None)
            }
            Some(b) if b.is_occupied && b.application_id == Some(app.id) => Ok(None),
            Some(b) => {
                let prior = PriorTag { layout_id, booth_id, holder: b.application_id };
                let event = Event::OccupancyLinked {
                    layout_id,
                    booth_id,
                    application_id: app.id,
                };
                self.persist_and_apply(&mut guard, &event).await?;
                Ok(Some(prior))
            }
        }
    }

    fn link_miss(&self, application_id: Ulid, booth_id: Ulid) {
        warn!("application {application_id}: booth {booth_id} not in the active layout, occupancy not linked");
        metrics::counter!(observability::OCCUPANCY_LINK_MISSES_TOTAL).increment(1);
    }

    /// Caller holds the reservation guard. Returns the cleared tags.
    async fn unlink_locked(&self, application_id: Ulid) -> Result<Vec<PriorTag>, EngineError> {
        let mut cleared = Vec::new();
        for shared in self.all_layouts() {
            let mut guard = shared.write().await;
            if let Some(booth_id) = booth_held_by(&guard, &application_id) {
                let layout_id = guard.id;
                let event = Event::OccupancyCleared { layout_id, booth_id };
                self.persist_and_apply(&mut guard, &event).await?;
                cleared.push(PriorTag { layout_id, booth_id, holder: Some(application_id) });
            }
        }
        Ok(cleared)
    }

    /// Put booth tags back after the repository refused a status change.
    /// Caller holds the reservation guard.
    async fn restore_tags(&self, tags: Vec<PriorTag>) {
        for tag in tags {
            let event = match tag.holder {
                Some(application_id) => Event::OccupancyLinked {
                    layout_id: tag.layout_id,
                    booth_id: tag.booth_id,
                    application_id,
                },
                None => Event::OccupancyCleared { layout_id: tag.layout_id, booth_id: tag.booth_id },
            };
            let restored = match self.layout_write(&tag.layout_id).await {
                Ok(mut guard) => self.persist_and_apply(&mut guard, &event).await,
                Err(e) => Err(e),
            };
            if let Err(e) = restored {
                warn!("could not restore occupancy of booth {}: {e}", tag.booth_id);
            }
        }
    }
}
