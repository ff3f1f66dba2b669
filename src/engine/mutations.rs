use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{find_live_reservation, now_ms};
use super::geometry::{
    validate_booth_set, validate_footprint, validate_grid, validate_label, validate_landmarks,
    validate_name, validate_placement,
};
use super::{apply_to_layout, Engine, EngineError};

/// Turn caller booth input into placements. Ids already on `stored` keep their
/// occupancy; everything else starts unoccupied, and entries without an id get
/// a fresh one.
fn materialize_booths(inputs: Vec<BoothInput>, stored: &[BoothPlacement]) -> Vec<BoothPlacement> {
    inputs
        .into_iter()
        .map(|input| {
            let id = input.id.unwrap_or_else(Ulid::new);
            let (is_occupied, application_id) = stored
                .iter()
                .find(|b| b.id == id)
                .map(|b| (b.is_occupied, b.application_id))
                .unwrap_or((false, None));
            BoothPlacement {
                id,
                x: input.x,
                y: input.y,
                width: input.width,
                height: input.height,
                is_occupied,
                application_id,
                label: input.label,
            }
        })
        .collect()
}

fn materialize_landmarks(inputs: Vec<LandmarkInput>) -> Vec<Landmark> {
    inputs
        .into_iter()
        .map(|input| Landmark {
            id: input.id.unwrap_or_else(Ulid::new),
            kind: input.kind,
            x: input.x,
            y: input.y,
            rotation: input.rotation,
            label: input.label,
        })
        .collect()
}

impl Engine {
    /// The active layout, creating and activating the default floor when the
    /// store is empty. Concurrent callers all observe the same layout.
    pub async fn get_active_layout(&self) -> Result<Layout, EngineError> {
        let mut active = self.active.lock().await;
        if let Some(id) = *active
            && let Some(shared) = self.get_shared_layout(&id)
        {
            return Ok(shared.read().await.clone());
        }

        let mut layout = Layout::new(
            Ulid::new(),
            DEFAULT_LAYOUT_NAME.to_string(),
            DEFAULT_GRID_WIDTH,
            DEFAULT_GRID_HEIGHT,
            DEFAULT_CELL_SIZE,
        );
        layout.is_active = true;
        let layout = self.commit_new_layout(layout).await?;
        *active = Some(layout.id);
        info!("created default layout {}", layout.id);
        Ok(layout)
    }

    /// Flip the active flag from the current layout to `id` in one event.
    pub async fn set_active_layout(&self, id: Ulid) -> Result<Layout, EngineError> {
        let mut active = self.active.lock().await;
        let target = self.get_shared_layout(&id).ok_or(EngineError::LayoutNotFound(id))?;
        let previous = *active;
        if previous == Some(id) {
            return Ok(target.read().await.clone());
        }

        let event = Event::ActiveLayoutSet { id, previous };
        let prev_shared = previous.and_then(|p| self.get_shared_layout(&p));
        let layout = match prev_shared {
            Some(prev) => {
                // Two layout locks: always in id order.
                let (mut target_guard, mut prev_guard) = if previous < Some(id) {
                    let p = prev.write_owned().await;
                    (target.write_owned().await, p)
                } else {
                    let t = target.write_owned().await;
                    (t, prev.write_owned().await)
                };
                self.wal_append(&event).await?;
                apply_to_layout(&mut prev_guard, &event, &self.booth_to_layout);
                apply_to_layout(&mut target_guard, &event, &self.booth_to_layout);
                self.record(&event);
                self.notify.send(prev_guard.id, &event);
                self.notify.send(id, &event);
                target_guard.clone()
            }
            None => {
                let mut guard = target.write().await;
                self.persist_and_apply(&mut guard, &event).await?;
                guard.clone()
            }
        };
        *active = Some(id);
        info!("active layout {previous:?} -> {id}");
        Ok(layout)
    }

    /// Store a new layout. The first layout becomes active.
    pub async fn create_layout(&self, spec: LayoutSpec) -> Result<Layout, EngineError> {
        validate_name(&spec.name)?;
        validate_grid(spec.grid_width, spec.grid_height, spec.cell_size)?;
        let booths = materialize_booths(spec.booths, &[]);
        validate_booth_set(&booths, spec.grid_width, spec.grid_height)?;
        let landmarks = materialize_landmarks(spec.landmarks);
        validate_landmarks(&landmarks, spec.grid_width, spec.grid_height)?;

        // Same guard as `update_layout`, so cross-layout booth id checks
        // cannot interleave.
        let _reservations = self.reservations.lock().await;
        let mut active = self.active.lock().await;
        if self.layouts.len() >= MAX_LAYOUTS {
            return Err(EngineError::LimitExceeded("too many layouts"));
        }
        if let Some(b) = booths.iter().find(|b| self.booth_to_layout.contains_key(&b.id)) {
            return Err(EngineError::DuplicateBooth(b.id));
        }

        let mut layout = Layout::new(
            Ulid::new(),
            spec.name,
            spec.grid_width,
            spec.grid_height,
            spec.cell_size,
        );
        layout.booths = booths;
        layout.landmarks = landmarks;
        layout.is_active = active.is_none();
        let layout = self.commit_new_layout(layout).await?;
        if layout.is_active {
            *active = Some(layout.id);
        }
        info!("created layout {} ({} booths)", layout.id, layout.booths.len());
        Ok(layout)
    }

    /// Caller holds the `active` mutex.
    async fn commit_new_layout(&self, layout: Layout) -> Result<Layout, EngineError> {
        let event = Event::LayoutCreated { layout: layout.clone() };
        self.wal_append(&event).await?;
        for b in &layout.booths {
            self.booth_to_layout.insert(b.id, layout.id);
        }
        self.layouts.insert(layout.id, Arc::new(RwLock::new(layout.clone())));
        self.record(&event);
        self.notify.send(layout.id, &event);
        Ok(layout)
    }

    /// Partial edit committed as one `LayoutUpdated` event. Every check runs
    /// before the event is written; booths dropped from the list must not
    /// carry a live reservation.
    pub async fn update_layout(&self, id: Ulid, update: LayoutUpdate) -> Result<Layout, EngineError> {
        if let Some(name) = &update.name {
            validate_name(name)?;
        }

        let _reservations = self.reservations.lock().await;
        let mut guard = self.layout_write(&id).await?;
        if let Some(expected) = update.expected_version
            && expected != guard.version
        {
            return Err(EngineError::StaleVersion { expected, actual: guard.version });
        }

        let (grid_width, grid_height, cell_size) = match update.dimensions {
            Some(d) => (d.grid_width, d.grid_height, d.cell_size.unwrap_or(guard.cell_size)),
            None => (guard.grid_width, guard.grid_height, guard.cell_size),
        };
        validate_grid(grid_width, grid_height, cell_size)?;

        let booths = match update.booths {
            Some(inputs) => materialize_booths(inputs, &guard.booths),
            None => guard.booths.clone(),
        };
        validate_booth_set(&booths, grid_width, grid_height)?;
        if let Some(b) = booths
            .iter()
            .find(|b| self.layout_for_booth(&b.id).is_some_and(|owner| owner != id))
        {
            return Err(EngineError::DuplicateBooth(b.id));
        }

        let landmarks = match update.landmarks {
            Some(inputs) => materialize_landmarks(inputs),
            None => guard.landmarks.clone(),
        };
        validate_landmarks(&landmarks, grid_width, grid_height)?;

        let kept: HashSet<Ulid> = booths.iter().map(|b| b.id).collect();
        let removed: Vec<Ulid> = guard
            .booths
            .iter()
            .filter(|b| !kept.contains(&b.id))
            .map(|b| b.id)
            .collect();
        self.ensure_no_live_reservation(&removed).await?;

        let event = Event::LayoutUpdated {
            id,
            name: update.name.unwrap_or_else(|| guard.name.clone()),
            grid_width,
            grid_height,
            cell_size,
            booths,
            landmarks,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("updated layout {id} to version {}", guard.version);
        Ok(guard.clone())
    }

    pub async fn add_booth(&self, layout_id: Ulid, draft: BoothDraft) -> Result<BoothPlacement, EngineError> {
        validate_footprint(draft.width, draft.height)?;
        validate_label(&draft.label)?;

        let mut guard = self.layout_write(&layout_id).await?;
        if guard.booths.len() >= MAX_BOOTHS_PER_LAYOUT {
            return Err(EngineError::LimitExceeded("too many booths in layout"));
        }
        validate_placement(None, &draft.rect(), guard.grid_width, guard.grid_height, &guard.booths)?;

        let booth = BoothPlacement {
            id: Ulid::new(),
            x: draft.x,
            y: draft.y,
            width: draft.width,
            height: draft.height,
            is_occupied: false,
            application_id: None,
            label: draft.label,
        };
        let event = Event::BoothAdded { layout_id, booth: booth.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(booth)
    }

    pub async fn remove_booth(&self, layout_id: Ulid, booth_id: Ulid) -> Result<(), EngineError> {
        let _reservations = self.reservations.lock().await;
        let mut guard = self.layout_write(&layout_id).await?;
        if guard.booth(&booth_id).is_none() {
            return Err(EngineError::BoothNotFound(booth_id));
        }
        self.ensure_no_live_reservation(&[booth_id]).await?;

        let event = Event::BoothRemoved { layout_id, booth_id };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Drop a layout. The active layout and layouts with live reservations stay.
    pub async fn delete_layout(&self, id: Ulid) -> Result<(), EngineError> {
        let _reservations = self.reservations.lock().await;
        let active = self.active.lock().await;
        let shared = self.get_shared_layout(&id).ok_or(EngineError::LayoutNotFound(id))?;
        if *active == Some(id) {
            return Err(EngineError::LayoutActive(id));
        }
        let guard = shared.write().await;
        let booth_ids: Vec<Ulid> = guard.booths.iter().map(|b| b.id).collect();
        self.ensure_no_live_reservation(&booth_ids).await?;

        let event = Event::LayoutDeleted { id };
        self.wal_append(&event).await?;
        for booth_id in &booth_ids {
            self.booth_to_layout.remove(booth_id);
        }
        self.layouts.remove(&id);
        self.record(&event);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        drop(guard);
        drop(active);
        info!("deleted layout {id}");
        Ok(())
    }

    /// Explicit id, or the active layout's.
    pub async fn resolve_layout_id(&self, layout_id: Option<Ulid>) -> Result<Ulid, EngineError> {
        match layout_id {
            Some(id) => Ok(id),
            None => Ok(self.get_active_layout().await?.id),
        }
    }

    /// `Conflict` if any of `booth_ids` is held by an approved reservation
    /// that has not ended yet. Caller holds the reservation guard.
    async fn ensure_no_live_reservation(&self, booth_ids: &[Ulid]) -> Result<(), EngineError> {
        let now = now_ms();
        for &booth in booth_ids {
            let apps = self.applications.find_by_booth(booth).await?;
            if let Some(live) = find_live_reservation(booth, &apps, now) {
                return Err(EngineError::LiveReservation {
                    booth,
                    details: ConflictDetails::from_application(live),
                });
            }
        }
        Ok(())
    }
}
