use ulid::Ulid;

use crate::limits::{MAX_DURATION_WEEKS, MIN_DURATION_WEEKS};
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_duration(weeks: u32) -> Result<(), EngineError> {
    if (MIN_DURATION_WEEKS..=MAX_DURATION_WEEKS).contains(&weeks) {
        Ok(())
    } else {
        Err(EngineError::InvalidDuration(weeks))
    }
}

/// Applications that can hold `booth_id`: platform, same booth, pending or
/// approved, non-empty interval.
fn slot_holders(booth_id: Ulid, applications: &[VendorApplication]) -> impl Iterator<Item = &VendorApplication> {
    applications.iter().filter(move |a| {
        a.kind == ApplicationKind::Platform
            && a.booth_id == Some(booth_id)
            && a.status.holds_slot()
            && a.duration_weeks > 0
    })
}

/// First application whose interval overlaps `candidate` on `booth_id`.
/// Half-open: a reservation ending exactly when the candidate starts is fine.
pub fn find_conflict<'a>(
    booth_id: Ulid,
    candidate: &Span,
    applications: &'a [VendorApplication],
) -> Option<&'a VendorApplication> {
    slot_holders(booth_id, applications).find(|a| a.span().overlaps(candidate))
}

pub fn has_conflict(
    booth_id: Ulid,
    candidate_start: Ms,
    candidate_weeks: u32,
    applications: &[VendorApplication],
) -> bool {
    let candidate = Span::from_weeks(candidate_start, candidate_weeks);
    !candidate.is_empty() && find_conflict(booth_id, &candidate, applications).is_some()
}

/// First approved reservation on `booth_id` that has not ended at `now`.
pub fn find_live_reservation(
    booth_id: Ulid,
    applications: &[VendorApplication],
    now: Ms,
) -> Option<&VendorApplication> {
    slot_holders(booth_id, applications).find(|a| a.is_live(now))
}

pub(crate) fn report(conflict: Option<&VendorApplication>) -> ConflictReport {
    ConflictReport {
        conflict: conflict.is_some(),
        details: conflict.map(ConflictDetails::from_application),
    }
}
