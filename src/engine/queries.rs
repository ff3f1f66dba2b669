use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::availability::find_available;
use super::conflict::{find_conflict, report, validate_duration};
use super::geometry::validate_footprint;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_layout(&self, id: Ulid) -> Result<Layout, EngineError> {
        let shared = self.get_shared_layout(&id).ok_or(EngineError::LayoutNotFound(id))?;
        let guard = shared.read().await;
        Ok(guard.clone())
    }

    /// Summaries of every stored layout, oldest first.
    pub async fn list_layouts(&self) -> Vec<LayoutSummary> {
        let mut out = Vec::new();
        for shared in self.all_layouts() {
            out.push(shared.read().await.summary());
        }
        out
    }

    /// Top-left cells of the active layout where a `width` x `height` booth fits.
    pub async fn find_available_locations(
        &self,
        width: i32,
        height: i32,
    ) -> Result<Vec<Position>, EngineError> {
        validate_footprint(width, height)?;
        let layout = self.get_active_layout().await?;
        Ok(find_available(&layout, width, height))
    }

    /// Would a reservation of `booth_id` for `duration_weeks` from `start`
    /// collide with a pending or approved application?
    pub async fn check_reservation_conflict(
        &self,
        booth_id: Ulid,
        start: Ms,
        duration_weeks: u32,
    ) -> Result<ConflictReport, EngineError> {
        validate_duration(duration_weeks)?;
        let applications = self.applications.find_by_booth(booth_id).await?;
        let candidate = Span::from_weeks(start, duration_weeks);
        let result = report(find_conflict(booth_id, &candidate, &applications));
        if result.conflict {
            metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
        }
        Ok(result)
    }
}
