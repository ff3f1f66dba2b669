use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::{DEFAULT_CELL_SIZE, DEFAULT_GRID_HEIGHT, DEFAULT_GRID_WIDTH, WEEK_MS};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `[start, start + weeks)`. Zero weeks yields an empty span.
    pub fn from_weeks(start: Ms, weeks: u32) -> Self {
        Self {
            start,
            end: start.saturating_add(Ms::from(weeks).saturating_mul(WEEK_MS)),
        }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

// ── Grid geometry ────────────────────────────────────────────────

/// Axis-aligned rectangle in grid cells; `(x, y)` is the top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge, widened so it cannot overflow.
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// Landmark orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {other}")),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(r: Rotation) -> u16 {
        match r {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
    Entrance,
    Exit,
    PointOfInterest,
}

/// Fixed marker on the floor. Never takes part in booth overlap checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: Ulid,
    pub kind: LandmarkKind,
    pub x: i32,
    pub y: i32,
    pub rotation: Rotation,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoothPlacement {
    pub id: Ulid,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// True iff an approved reservation currently owns this booth.
    pub is_occupied: bool,
    pub application_id: Option<Ulid>,
    pub label: Option<String>,
}

impl BoothPlacement {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub id: Ulid,
    pub name: String,
    pub grid_width: i32,
    pub grid_height: i32,
    /// Display-only; placement never looks at it.
    pub cell_size: i32,
    pub booths: Vec<BoothPlacement>,
    pub landmarks: Vec<Landmark>,
    pub is_active: bool,
    /// Bumped on every applied event.
    pub version: u64,
}

impl Layout {
    pub fn new(id: Ulid, name: String, grid_width: i32, grid_height: i32, cell_size: i32) -> Self {
        Self {
            id,
            name,
            grid_width,
            grid_height,
            cell_size,
            booths: Vec::new(),
            landmarks: Vec::new(),
            is_active: false,
            version: 0,
        }
    }

    pub fn booth(&self, id: &Ulid) -> Option<&BoothPlacement> {
        self.booths.iter().find(|b| b.id == *id)
    }

    pub fn booth_mut(&mut self, id: &Ulid) -> Option<&mut BoothPlacement> {
        self.booths.iter_mut().find(|b| b.id == *id)
    }

    pub fn summary(&self) -> LayoutSummary {
        LayoutSummary {
            id: self.id,
            name: self.name.clone(),
            grid_width: self.grid_width,
            grid_height: self.grid_height,
            booth_count: self.booths.len(),
            is_active: self.is_active,
            version: self.version,
        }
    }
}

// ── Applications (owned by an external service) ─────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationKind {
    /// Physical booth on the grid.
    Platform,
    /// Time-bound event slot, not grid based.
    Bazaar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ApplicationStatus {
    /// Pending applications block the slot too: they may still be approved.
    pub fn holds_slot(self) -> bool {
        matches!(self, ApplicationStatus::Pending | ApplicationStatus::Approved)
    }

    pub fn reservation_label(self) -> &'static str {
        match self {
            ApplicationStatus::Approved => "reserved",
            ApplicationStatus::Pending => "pending approval",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorApplication {
    pub id: Ulid,
    pub kind: ApplicationKind,
    /// Only meaningful for `Platform` applications.
    #[serde(default)]
    pub booth_id: Option<Ulid>,
    pub company: String,
    pub start: Ms,
    pub duration_weeks: u32,
    #[serde(default)]
    pub status: ApplicationStatus,
}

impl VendorApplication {
    pub fn span(&self) -> Span {
        Span::from_weeks(self.start, self.duration_weeks)
    }

    /// Approved and not yet ended.
    pub fn is_live(&self, now: Ms) -> bool {
        self.status == ApplicationStatus::Approved && self.span().end > now
    }
}

// ── Caller input ─────────────────────────────────────────────────

/// New booth for `add_booth`. The engine assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoothDraft {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub label: Option<String>,
}

impl BoothDraft {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Entry of a full booth list replacement. Entries without an id are new booths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoothInput {
    #[serde(default)]
    pub id: Option<Ulid>,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub label: Option<String>,
}

impl BoothInput {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl From<BoothDraft> for BoothInput {
    fn from(d: BoothDraft) -> Self {
        Self {
            id: None,
            x: d.x,
            y: d.y,
            width: d.width,
            height: d.height,
            label: d.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkInput {
    #[serde(default)]
    pub id: Option<Ulid>,
    pub kind: LandmarkKind,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_grid_width() -> i32 {
    DEFAULT_GRID_WIDTH
}

fn default_grid_height() -> i32 {
    DEFAULT_GRID_HEIGHT
}

fn default_cell_size() -> i32 {
    DEFAULT_CELL_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub name: String,
    #[serde(default = "default_grid_width")]
    pub grid_width: i32,
    #[serde(default = "default_grid_height")]
    pub grid_height: i32,
    #[serde(default = "default_cell_size")]
    pub cell_size: i32,
    #[serde(default)]
    pub booths: Vec<BoothInput>,
    #[serde(default)]
    pub landmarks: Vec<LandmarkInput>,
}

impl LayoutSpec {
    pub fn named(name: impl Into<String>, grid_width: i32, grid_height: i32) -> Self {
        Self {
            name: name.into(),
            grid_width,
            grid_height,
            cell_size: DEFAULT_CELL_SIZE,
            booths: Vec::new(),
            landmarks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub grid_width: i32,
    pub grid_height: i32,
    #[serde(default)]
    pub cell_size: Option<i32>,
}

/// Partial edit of a layout. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub booths: Option<Vec<BoothInput>>,
    #[serde(default)]
    pub landmarks: Option<Vec<LandmarkInput>>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    /// Optimistic concurrency: reject the edit if the stored version differs.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Layout events, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    LayoutCreated {
        layout: Layout,
    },
    /// Whole-content replacement produced by `update_layout`.
    LayoutUpdated {
        id: Ulid,
        name: String,
        grid_width: i32,
        grid_height: i32,
        cell_size: i32,
        booths: Vec<BoothPlacement>,
        landmarks: Vec<Landmark>,
    },
    LayoutDeleted {
        id: Ulid,
    },
    ActiveLayoutSet {
        id: Ulid,
        previous: Option<Ulid>,
    },
    BoothAdded {
        layout_id: Ulid,
        booth: BoothPlacement,
    },
    BoothRemoved {
        layout_id: Ulid,
        booth_id: Ulid,
    },
    OccupancyLinked {
        layout_id: Ulid,
        booth_id: Ulid,
        application_id: Ulid,
    },
    OccupancyCleared {
        layout_id: Ulid,
        booth_id: Ulid,
    },
}

impl Event {
    /// The layout whose change feed carries this event.
    pub fn layout_id(&self) -> Ulid {
        match self {
            Event::LayoutCreated { layout } => layout.id,
            Event::LayoutUpdated { id, .. }
            | Event::LayoutDeleted { id }
            | Event::ActiveLayoutSet { id, .. } => *id,
            Event::BoothAdded { layout_id, .. }
            | Event::BoothRemoved { layout_id, .. }
            | Event::OccupancyLinked { layout_id, .. }
            | Event::OccupancyCleared { layout_id, .. } => *layout_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSummary {
    pub id: Ulid,
    pub name: String,
    pub grid_width: i32,
    pub grid_height: i32,
    pub booth_count: usize,
    pub is_active: bool,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetails {
    pub application_id: Ulid,
    pub company: String,
    pub start: Ms,
    pub end: Ms,
    pub status: ApplicationStatus,
    /// `reserved` or `pending approval`.
    pub label: String,
}

impl ConflictDetails {
    pub fn from_application(app: &VendorApplication) -> Self {
        let span = app.span();
        Self {
            application_id: app.id,
            company: app.company.clone(),
            start: span.start,
            end: span.end,
            status: app.status,
            label: app.status.reservation_label().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflict: bool,
    pub details: Option<ConflictDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_from_weeks() {
        let s = Span::from_weeks(1_000, 2);
        assert_eq!(s.start, 1_000);
        assert_eq!(s.duration_ms(), 2 * WEEK_MS);
        assert!(Span::from_weeks(1_000, 0).is_empty());
    }

    #[test]
    fn rect_edges_do_not_overflow() {
        let r = Rect::new(i32::MAX, i32::MAX, i32::MAX, 4);
        assert_eq!(r.right(), 2 * i64::from(i32::MAX));
        assert_eq!(r.bottom(), i64::from(i32::MAX) + 4);
    }

    #[test]
    fn rotation_accepts_right_angles_only() {
        assert_eq!(Rotation::try_from(90), Ok(Rotation::Deg90));
        assert_eq!(Rotation::try_from(270), Ok(Rotation::Deg270));
        assert!(Rotation::try_from(45).is_err());
        assert_eq!(u16::from(Rotation::Deg180), 180);
    }

    #[test]
    fn rotation_json_is_degrees() {
        let json = serde_json::to_string(&Rotation::Deg90).unwrap();
        assert_eq!(json, "90");
        assert!(serde_json::from_str::<Rotation>("91").is_err());
    }

    #[test]
    fn application_liveness() {
        let app = VendorApplication {
            id: Ulid::new(),
            kind: ApplicationKind::Platform,
            booth_id: Some(Ulid::new()),
            company: "Acme".into(),
            start: 0,
            duration_weeks: 1,
            status: ApplicationStatus::Approved,
        };
        assert!(app.is_live(WEEK_MS - 1));
        assert!(!app.is_live(WEEK_MS)); // ended exactly now

        let pending = VendorApplication { status: ApplicationStatus::Pending, ..app };
        assert!(!pending.is_live(0));
    }

    #[test]
    fn status_labels() {
        assert_eq!(ApplicationStatus::Approved.reservation_label(), "reserved");
        assert_eq!(ApplicationStatus::Pending.reservation_label(), "pending approval");
        assert!(ApplicationStatus::Pending.holds_slot());
        assert!(!ApplicationStatus::Rejected.holds_slot());
        assert!(!ApplicationStatus::Cancelled.holds_slot());
    }

    #[test]
    fn layout_spec_defaults() {
        let spec: LayoutSpec = serde_json::from_str(r#"{"name":"Hall B"}"#).unwrap();
        assert_eq!(spec.grid_width, DEFAULT_GRID_WIDTH);
        assert_eq!(spec.grid_height, DEFAULT_GRID_HEIGHT);
        assert!(spec.booths.is_empty());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut layout = Layout::new(Ulid::new(), "Test".into(), 10, 10, 40);
        layout.booths.push(BoothPlacement {
            id: Ulid::new(),
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            is_occupied: false,
            application_id: None,
            label: Some("A1".into()),
        });
        layout.landmarks.push(Landmark {
            id: Ulid::new(),
            kind: LandmarkKind::Entrance,
            x: 5,
            y: 9,
            rotation: Rotation::Deg270,
            label: None,
        });
        let event = Event::LayoutCreated { layout };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
