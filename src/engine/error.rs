use ulid::Ulid;

use crate::model::{ConflictDetails, Rect};

/// Coarse classification callers map onto their own transport codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    // ── bad request ──
    InvalidFootprint { width: i32, height: i32 },
    InvalidGrid { width: i32, height: i32, cell_size: i32 },
    OutOfBounds { booth: Option<Ulid>, rect: Rect, grid_width: i32, grid_height: i32 },
    Overlap { booth: Option<Ulid>, other: Ulid },
    DuplicateBooth(Ulid),
    LandmarkOutOfBounds { x: i32, y: i32 },
    InvalidDuration(u32),
    MissingBooth(Ulid),
    InvalidTransition { id: Ulid, action: &'static str },
    LimitExceeded(&'static str),
    // ── not found ──
    LayoutNotFound(Ulid),
    BoothNotFound(Ulid),
    ApplicationNotFound(Ulid),
    // ── conflict ──
    LiveReservation { booth: Ulid, details: ConflictDetails },
    ReservationConflict { booth: Ulid, details: ConflictDetails },
    StaleVersion { expected: u64, actual: u64 },
    LayoutActive(Ulid),
    // ── internal ──
    Repository(String),
    WalError(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidFootprint { .. }
            | EngineError::InvalidGrid { .. }
            | EngineError::OutOfBounds { .. }
            | EngineError::Overlap { .. }
            | EngineError::DuplicateBooth(_)
            | EngineError::LandmarkOutOfBounds { .. }
            | EngineError::InvalidDuration(_)
            | EngineError::MissingBooth(_)
            | EngineError::InvalidTransition { .. }
            | EngineError::LimitExceeded(_) => ErrorKind::BadRequest,
            EngineError::LayoutNotFound(_)
            | EngineError::BoothNotFound(_)
            | EngineError::ApplicationNotFound(_) => ErrorKind::NotFound,
            EngineError::LiveReservation { .. }
            | EngineError::ReservationConflict { .. }
            | EngineError::StaleVersion { .. }
            | EngineError::LayoutActive(_) => ErrorKind::Conflict,
            EngineError::Repository(_) | EngineError::WalError(_) => ErrorKind::Internal,
        }
    }
}

fn booth_name(booth: &Option<Ulid>) -> String {
    match booth {
        Some(id) => format!("booth {id}"),
        None => "new booth".to_string(),
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidFootprint { width, height } => {
                write!(f, "booth footprint {width}x{height} outside permitted range 2..=4")
            }
            EngineError::InvalidGrid { width, height, cell_size } => write!(
                f,
                "invalid grid {width}x{height} (cell size {cell_size}): sides must be 1..=100, cell size positive"
            ),
            EngineError::OutOfBounds { booth, rect, grid_width, grid_height } => write!(
                f,
                "{} at ({}, {}) size {}x{} exceeds grid {grid_width}x{grid_height}",
                booth_name(booth),
                rect.x,
                rect.y,
                rect.width,
                rect.height
            ),
            EngineError::Overlap { booth, other } => {
                write!(f, "{} overlaps booth {other}", booth_name(booth))
            }
            EngineError::DuplicateBooth(id) => write!(f, "duplicate booth id: {id}"),
            EngineError::LandmarkOutOfBounds { x, y } => {
                write!(f, "landmark at ({x}, {y}) lies outside the grid")
            }
            EngineError::InvalidDuration(weeks) => {
                write!(f, "duration of {weeks} weeks outside permitted range 1..=4")
            }
            EngineError::MissingBooth(id) => {
                write!(f, "platform application {id} does not name a booth")
            }
            EngineError::InvalidTransition { id, action } => {
                write!(f, "cannot {action} application {id} in its current status")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::LayoutNotFound(id) => write!(f, "layout not found: {id}"),
            EngineError::BoothNotFound(id) => write!(f, "booth not found: {id}"),
            EngineError::ApplicationNotFound(id) => write!(f, "application not found: {id}"),
            EngineError::LiveReservation { booth, details } => write!(
                f,
                "booth {booth} is reserved by {} (application {}) until {}",
                details.company, details.application_id, details.end
            ),
            EngineError::ReservationConflict { booth, details } => write!(
                f,
                "booth {booth} is already {} by {} for [{}, {}) (application {})",
                details.label, details.company, details.start, details.end, details.application_id
            ),
            EngineError::StaleVersion { expected, actual } => {
                write!(f, "layout changed: expected version {expected}, found {actual}")
            }
            EngineError::LayoutActive(id) => {
                write!(f, "layout {id} is active and cannot be deleted")
            }
            EngineError::Repository(e) => write!(f, "application repository error: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
