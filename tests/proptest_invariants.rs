//! Property tests for the pure placement and reservation rules.

use boothgrid::engine::{find_available, find_conflict, has_conflict, rectangles_overlap, within_bounds};
use boothgrid::limits::WEEK_MS;
use boothgrid::model::*;
use proptest::prelude::*;
use ulid::Ulid;

// ── Strategies ──────────────────────────────────────────────────────────

fn rect_strategy() -> impl Strategy<Value = Rect> {
    (-20i32..=120, -20i32..=120, 1i32..=8, 1i32..=8).prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn extreme_rect_strategy() -> impl Strategy<Value = Rect> {
    (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>())
        .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn booth_at(x: i32, y: i32, w: i32, h: i32) -> BoothPlacement {
    BoothPlacement {
        id: Ulid::new(),
        x,
        y,
        width: w,
        height: h,
        is_occupied: false,
        application_id: None,
        label: None,
    }
}

/// A grid with a handful of booths placed greedily (skipping collisions).
fn layout_strategy() -> impl Strategy<Value = Layout> {
    (
        4i32..=20,
        4i32..=20,
        prop::collection::vec((0i32..20, 0i32..20, 2i32..=4, 2i32..=4), 0..8),
    )
        .prop_map(|(gw, gh, candidates)| {
            let mut layout = Layout::new(Ulid::new(), "prop".into(), gw, gh, 40);
            for (x, y, w, h) in candidates {
                let rect = Rect::new(x, y, w, h);
                if within_bounds(&rect, gw, gh)
                    && !layout.booths.iter().any(|b| rectangles_overlap(&rect, &b.rect()))
                {
                    layout.booths.push(booth_at(x, y, w, h));
                }
            }
            layout
        })
}

fn status_strategy() -> impl Strategy<Value = ApplicationStatus> {
    prop_oneof![
        Just(ApplicationStatus::Pending),
        Just(ApplicationStatus::Approved),
        Just(ApplicationStatus::Rejected),
        Just(ApplicationStatus::Cancelled),
    ]
}

// ── Geometry ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn overlap_is_symmetric(a in rect_strategy(), b in rect_strategy()) {
        prop_assert_eq!(rectangles_overlap(&a, &b), rectangles_overlap(&b, &a));
    }

    #[test]
    fn rect_overlaps_itself(a in rect_strategy()) {
        prop_assert!(rectangles_overlap(&a, &a));
    }

    #[test]
    fn touching_edges_never_overlap(a in rect_strategy(), w in 1i32..=8, h in 1i32..=8, dy in -8i32..=8) {
        let right = Rect::new(a.x + a.width, a.y + dy, w, h);
        let below = Rect::new(a.x + dy, a.y + a.height, w, h);
        prop_assert!(!rectangles_overlap(&a, &right));
        prop_assert!(!rectangles_overlap(&a, &below));
    }

    #[test]
    fn extreme_values_do_not_panic(a in extreme_rect_strategy(), b in extreme_rect_strategy(), gw in any::<i32>(), gh in any::<i32>()) {
        let _ = rectangles_overlap(&a, &b);
        let _ = within_bounds(&a, gw, gh);
    }

    #[test]
    fn in_bounds_means_inside_grid(a in rect_strategy(), gw in 1i32..=100, gh in 1i32..=100) {
        if within_bounds(&a, gw, gh) {
            prop_assert!(a.x >= 0 && a.y >= 0);
            prop_assert!(a.x + a.width <= gw && a.y + a.height <= gh);
        }
    }
}

// ── Availability ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn scanned_positions_are_placeable(layout in layout_strategy(), w in 2i32..=4, h in 2i32..=4) {
        let free = find_available(&layout, w, h);
        for p in &free {
            let candidate = Rect::new(p.x, p.y, w, h);
            prop_assert!(within_bounds(&candidate, layout.grid_width, layout.grid_height));
            for b in &layout.booths {
                prop_assert!(!rectangles_overlap(&candidate, &b.rect()));
            }
        }
    }

    #[test]
    fn scan_is_complete(layout in layout_strategy(), w in 2i32..=4, h in 2i32..=4) {
        let free = find_available(&layout, w, h);
        for y in 0..=layout.grid_height - h {
            for x in 0..=layout.grid_width - w {
                let candidate = Rect::new(x, y, w, h);
                let blocked = layout.booths.iter().any(|b| rectangles_overlap(&candidate, &b.rect()));
                prop_assert_eq!(free.contains(&Position { x, y }), !blocked);
            }
        }
    }
}

// ── Reservations ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn conflict_is_symmetric(
        s1 in 0i64..(12 * WEEK_MS),
        w1 in 1u32..=4,
        s2 in 0i64..(12 * WEEK_MS),
        w2 in 1u32..=4,
    ) {
        let booth = Ulid::new();
        let app = |start, weeks| VendorApplication {
            id: Ulid::new(),
            kind: ApplicationKind::Platform,
            booth_id: Some(booth),
            company: "Prop Foods".into(),
            start,
            duration_weeks: weeks,
            status: ApplicationStatus::Approved,
        };
        let forward = has_conflict(booth, s2, w2, &[app(s1, w1)]);
        let backward = has_conflict(booth, s1, w1, &[app(s2, w2)]);
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn only_slot_holding_statuses_conflict(status in status_strategy(), start in 0i64..WEEK_MS, weeks in 1u32..=4) {
        let booth = Ulid::new();
        let existing = [VendorApplication {
            id: Ulid::new(),
            kind: ApplicationKind::Platform,
            booth_id: Some(booth),
            company: "Prop Foods".into(),
            start,
            duration_weeks: weeks,
            status,
        }];
        let hit = find_conflict(booth, &Span::from_weeks(start, 1), &existing);
        prop_assert_eq!(hit.is_some(), status.holds_slot());
    }

    #[test]
    fn back_to_back_weeks_never_conflict(start in 0i64..(52 * WEEK_MS), w1 in 1u32..=4, w2 in 1u32..=4) {
        let booth = Ulid::new();
        let first = VendorApplication {
            id: Ulid::new(),
            kind: ApplicationKind::Platform,
            booth_id: Some(booth),
            company: "Prop Foods".into(),
            start,
            duration_weeks: w1,
            status: ApplicationStatus::Approved,
        };
        let next_start = start + i64::from(w1) * WEEK_MS;
        prop_assert!(!has_conflict(booth, next_start, w2, &[first]));
    }
}
