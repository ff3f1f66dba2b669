use std::collections::HashSet;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

// ── Pure predicates ──────────────────────────────────────────────

/// Strict overlap: rectangles that only share an edge do not overlap.
pub fn rectangles_overlap(a: &Rect, b: &Rect) -> bool {
    i64::from(a.x) < b.right()
        && a.right() > i64::from(b.x)
        && i64::from(a.y) < b.bottom()
        && a.bottom() > i64::from(b.y)
}

pub fn within_bounds(rect: &Rect, grid_width: i32, grid_height: i32) -> bool {
    rect.x >= 0
        && rect.y >= 0
        && rect.right() <= i64::from(grid_width)
        && rect.bottom() <= i64::from(grid_height)
}

// ── Validation ───────────────────────────────────────────────────

fn side_ok(side: i32) -> bool {
    (MIN_BOOTH_SIDE..=MAX_BOOTH_SIDE).contains(&side)
}

pub(crate) fn validate_footprint(width: i32, height: i32) -> Result<(), EngineError> {
    if side_ok(width) && side_ok(height) {
        Ok(())
    } else {
        Err(EngineError::InvalidFootprint { width, height })
    }
}

pub(crate) fn validate_grid(width: i32, height: i32, cell_size: i32) -> Result<(), EngineError> {
    let side = 1..=MAX_GRID_SIDE;
    if side.contains(&width) && side.contains(&height) && cell_size > 0 {
        Ok(())
    } else {
        Err(EngineError::InvalidGrid { width, height, cell_size })
    }
}

pub(crate) fn validate_label(label: &Option<String>) -> Result<(), EngineError> {
    match label {
        Some(l) if l.len() > MAX_LABEL_LEN => Err(EngineError::LimitExceeded("label too long")),
        _ => Ok(()),
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("layout name too long"));
    }
    Ok(())
}

/// Check one booth against a grid and the booths already placed on it.
/// `id` is skipped in `existing` so a booth never collides with itself.
pub(crate) fn validate_placement(
    id: Option<Ulid>,
    rect: &Rect,
    grid_width: i32,
    grid_height: i32,
    existing: &[BoothPlacement],
) -> Result<(), EngineError> {
    validate_footprint(rect.width, rect.height)?;
    if !within_bounds(rect, grid_width, grid_height) {
        return Err(EngineError::OutOfBounds { booth: id, rect: *rect, grid_width, grid_height });
    }
    for other in existing {
        if Some(other.id) == id {
            continue;
        }
        if rectangles_overlap(rect, &other.rect()) {
            return Err(EngineError::Overlap { booth: id, other: other.id });
        }
    }
    Ok(())
}

/// Validate a complete booth list: footprints, labels, bounds, unique ids and
/// pairwise overlap. O(n²), fine at venue scale.
pub(crate) fn validate_booth_set(
    booths: &[BoothPlacement],
    grid_width: i32,
    grid_height: i32,
) -> Result<(), EngineError> {
    if booths.len() > MAX_BOOTHS_PER_LAYOUT {
        return Err(EngineError::LimitExceeded("too many booths in layout"));
    }
    let mut seen = HashSet::with_capacity(booths.len());
    for booth in booths {
        if !seen.insert(booth.id) {
            return Err(EngineError::DuplicateBooth(booth.id));
        }
        validate_label(&booth.label)?;
        let rect = booth.rect();
        validate_footprint(rect.width, rect.height)?;
        if !within_bounds(&rect, grid_width, grid_height) {
            return Err(EngineError::OutOfBounds {
                booth: Some(booth.id),
                rect,
                grid_width,
                grid_height,
            });
        }
    }
    for i in 0..booths.len() {
        for j in (i + 1)..booths.len() {
            if rectangles_overlap(&booths[i].rect(), &booths[j].rect()) {
                return Err(EngineError::Overlap {
                    booth: Some(booths[i].id),
                    other: booths[j].id,
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_landmarks(
    landmarks: &[Landmark],
    grid_width: i32,
    grid_height: i32,
) -> Result<(), EngineError> {
    if landmarks.len() > MAX_LANDMARKS_PER_LAYOUT {
        return Err(EngineError::LimitExceeded("too many landmarks in layout"));
    }
    for lm in landmarks {
        validate_label(&lm.label)?;
        if lm.x < 0 || lm.y < 0 || lm.x >= grid_width || lm.y >= grid_height {
            return Err(EngineError::LandmarkOutOfBounds { x: lm.x, y: lm.y });
        }
    }
    Ok(())
}
