mod availability;
mod conflict;
mod error;
mod geometry;
mod mutations;
mod occupancy;
mod queries;
mod store;

pub use availability::find_available;
pub use conflict::{find_conflict, find_live_reservation, has_conflict};
pub use error::{EngineError, ErrorKind};
pub use geometry::{rectangles_overlap, within_bounds};
pub use occupancy::{booth_held_by, link_booth, unlink_application};
pub use store::{ApplicationRepository, InMemoryApplications, RepositoryError};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::DEFAULT_COMPACT_THRESHOLD;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedLayout = Arc<RwLock<Layout>>;

/// Venue layout engine.
///
/// Lock order: `reservations` → `active` → layout locks. Nothing acquires an
/// earlier lock while holding a later one; the only path holding two layout
/// locks at once (`set_active_layout`) takes them in id order.
pub struct Engine {
    layouts: DashMap<Ulid, SharedLayout>,
    /// Id of the active layout.
    active: Mutex<Option<Ulid>>,
    /// Serializes application writes and booth-removing edits, so conflict
    /// and live-reservation checks always see a settled application list.
    reservations: Mutex<()>,
    /// Reverse lookup: booth id → layout id
    booth_to_layout: DashMap<Ulid, Ulid>,
    wal: Mutex<Wal>,
    compact_threshold: u64,
    pub notify: Arc<NotifyHub>,
    applications: Arc<dyn ApplicationRepository>,
}

/// Apply an event directly to a Layout (caller holds the lock).
fn apply_to_layout(layout: &mut Layout, event: &Event, booth_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::LayoutUpdated {
            name,
            grid_width,
            grid_height,
            cell_size,
            booths,
            landmarks,
            ..
        } => {
            for b in &layout.booths {
                booth_index.remove(&b.id);
            }
            for b in booths {
                booth_index.insert(b.id, layout.id);
            }
            layout.name = name.clone();
            layout.grid_width = *grid_width;
            layout.grid_height = *grid_height;
            layout.cell_size = *cell_size;
            layout.booths = booths.clone();
            layout.landmarks = landmarks.clone();
        }
        Event::ActiveLayoutSet { id, .. } => {
            layout.is_active = layout.id == *id;
        }
        Event::BoothAdded { booth, .. } => {
            booth_index.insert(booth.id, layout.id);
            layout.booths.push(booth.clone());
        }
        Event::BoothRemoved { booth_id, .. } => {
            layout.booths.retain(|b| b.id != *booth_id);
            booth_index.remove(booth_id);
        }
        Event::OccupancyLinked { booth_id, application_id, .. } => {
            occupancy::link_booth(layout, booth_id, *application_id);
        }
        Event::OccupancyCleared { booth_id, .. } => {
            occupancy::clear_booth(layout, booth_id);
        }
        // LayoutCreated/Deleted are handled at the DashMap level, not here
        Event::LayoutCreated { .. } | Event::LayoutDeleted { .. } => return,
    }
    layout.version += 1;
}

/// State rebuilt from an event log.
struct Folded {
    layouts: HashMap<Ulid, Layout>,
    active: Option<Ulid>,
}

fn fold_events(events: &[Event], booth_index: &DashMap<Ulid, Ulid>) -> Folded {
    let mut layouts: HashMap<Ulid, Layout> = HashMap::new();
    let mut active = None;

    for event in events {
        match event {
            Event::LayoutCreated { layout } => {
                for b in &layout.booths {
                    booth_index.insert(b.id, layout.id);
                }
                if layout.is_active {
                    active = Some(layout.id);
                }
                layouts.insert(layout.id, layout.clone());
            }
            Event::LayoutDeleted { id } => {
                if let Some(l) = layouts.remove(id) {
                    for b in &l.booths {
                        booth_index.remove(&b.id);
                    }
                }
                if active == Some(*id) {
                    active = None;
                }
            }
            Event::ActiveLayoutSet { id, previous } => {
                let touched = (*previous).filter(|p| p != id).into_iter().chain(std::iter::once(*id));
                for lid in touched {
                    if let Some(l) = layouts.get_mut(&lid) {
                        apply_to_layout(l, event, booth_index);
                    }
                }
                active = Some(*id);
            }
            other => {
                if let Some(l) = layouts.get_mut(&other.layout_id()) {
                    apply_to_layout(l, other, booth_index);
                }
            }
        }
    }

    Folded { layouts, active }
}

/// Minimal event list recreating the current state: one snapshot per layout,
/// in creation (ULID) order.
fn snapshot_events(folded: Folded) -> Vec<Event> {
    let mut layouts: Vec<Layout> = folded.layouts.into_values().collect();
    layouts.sort_by_key(|l| l.id);
    layouts
        .into_iter()
        .map(|layout| Event::LayoutCreated { layout })
        .collect()
}

/// Rewrite the log from its own contents. Runs under the WAL mutex, so no
/// append can interleave and no layout lock is needed.
fn compact_wal(wal: &mut Wal) -> io::Result<usize> {
    let events = Wal::replay(wal.path())?;
    let folded = fold_events(&events, &DashMap::new());
    let snapshot = snapshot_events(folded);
    Wal::write_compact_file(wal.path(), &snapshot)?;
    wal.swap_compact_file()?;
    Ok(snapshot.len())
}

impl Engine {
    /// Replay `wal_path` and open it for appending. Booth tags come back from
    /// the log as written; call `reconcile_occupancy` once the repository is
    /// reachable to drop tags it no longer backs.
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        applications: Arc<dyn ApplicationRepository>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;

        let booth_to_layout = DashMap::new();
        let folded = fold_events(&events, &booth_to_layout);
        info!(
            "replayed {} events: {} layouts, active {:?}",
            events.len(),
            folded.layouts.len(),
            folded.active
        );

        let layouts = DashMap::new();
        for (id, layout) in folded.layouts {
            layouts.insert(id, Arc::new(RwLock::new(layout)));
        }

        Ok(Self {
            layouts,
            active: Mutex::new(folded.active),
            reservations: Mutex::new(()),
            booth_to_layout,
            wal: Mutex::new(wal),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            notify,
            applications,
        })
    }

    pub fn with_compact_threshold(mut self, threshold: u64) -> Self {
        self.compact_threshold = threshold.max(1);
        self
    }

    /// Append to the WAL (fsync'd), compacting inline once the threshold is hit.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let mut wal = self.wal.lock().await;
        let started = std::time::Instant::now();
        wal.append(event)
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        metrics::histogram!(crate::observability::WAL_APPEND_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        if wal.appends_since_compact() >= self.compact_threshold {
            // The event is already durable; a failed compaction only delays the next one.
            match compact_wal(&mut wal) {
                Ok(n) => {
                    metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
                    debug!("compacted WAL to {n} events");
                }
                Err(e) => warn!("WAL compaction failed: {e}"),
            }
        }
        Ok(())
    }

    /// WAL-append + apply + notify in one call.
    async fn persist_and_apply(&self, layout: &mut Layout, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_layout(layout, event, &self.booth_to_layout);
        self.record(event);
        self.notify.send(layout.id, event);
        Ok(())
    }

    fn record(&self, event: &Event) {
        metrics::counter!(
            crate::observability::LAYOUT_EVENTS_TOTAL,
            "event" => crate::observability::event_label(event)
        )
        .increment(1);
    }

    pub fn get_shared_layout(&self, id: &Ulid) -> Option<SharedLayout> {
        self.layouts.get(id).map(|e| e.value().clone())
    }

    pub fn layout_for_booth(&self, booth_id: &Ulid) -> Option<Ulid> {
        self.booth_to_layout.get(booth_id).map(|e| *e.value())
    }

    /// Lookup layout, acquire write lock.
    async fn layout_write(
        &self,
        id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<Layout>, EngineError> {
        let layout = self
            .get_shared_layout(id)
            .ok_or(EngineError::LayoutNotFound(*id))?;
        Ok(layout.write_owned().await)
    }

    /// Every stored layout handle, ordered by id. DashMap refs are released
    /// before the caller awaits any lock.
    fn all_layouts(&self) -> Vec<SharedLayout> {
        let mut all: Vec<(Ulid, SharedLayout)> = self
            .layouts
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all.into_iter().map(|(_, l)| l).collect()
    }
}
