//! Hard limits and defaults. Everything the engine accepts from callers is
//! bounded by one of these.

use crate::model::Ms;

pub const DAY_MS: Ms = 86_400_000;
pub const WEEK_MS: Ms = 7 * DAY_MS;

// ── Grid ─────────────────────────────────────────────────────────

pub const MAX_GRID_SIDE: i32 = 100;
pub const MIN_BOOTH_SIDE: i32 = 2;
pub const MAX_BOOTH_SIDE: i32 = 4;

pub const DEFAULT_LAYOUT_NAME: &str = "Main Floor";
pub const DEFAULT_GRID_WIDTH: i32 = 60;
pub const DEFAULT_GRID_HEIGHT: i32 = 20;
pub const DEFAULT_CELL_SIZE: i32 = 40;

// ── Collections ──────────────────────────────────────────────────

pub const MAX_LAYOUTS: usize = 256;
pub const MAX_BOOTHS_PER_LAYOUT: usize = 1_000;
pub const MAX_LANDMARKS_PER_LAYOUT: usize = 64;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 128;

// ── Reservations ─────────────────────────────────────────────────

pub const MIN_DURATION_WEEKS: u32 = 1;
pub const MAX_DURATION_WEEKS: u32 = 4;

// ── Server ───────────────────────────────────────────────────────

pub const MAX_LINE_LEN: usize = 1024 * 1024;
pub const WATCH_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1_000;
