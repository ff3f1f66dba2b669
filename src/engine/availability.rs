use crate::model::*;

use super::geometry::rectangles_overlap;

// ── Placement scan ───────────────────────────────────────────────

/// Every top-left cell where a `width` x `height` booth fits without
/// overlapping an existing booth, in row-major order (y, then x).
///
/// Brute force over the grid: O(grid cells × booths). Grids are capped at
/// 100x100, so no spatial index is kept. A footprint larger than the grid,
/// or one with a non-positive side, yields no positions.
pub fn find_available(layout: &Layout, width: i32, height: i32) -> Vec<Position> {
    if width < 1 || height < 1 {
        return Vec::new();
    }
    let (Some(max_x), Some(max_y)) = (
        layout.grid_width.checked_sub(width),
        layout.grid_height.checked_sub(height),
    ) else {
        return Vec::new();
    };
    if max_x < 0 || max_y < 0 {
        return Vec::new();
    }

    let rects: Vec<Rect> = layout.booths.iter().map(BoothPlacement::rect).collect();
    let mut free = Vec::new();
    for y in 0..=max_y {
        for x in 0..=max_x {
            let candidate = Rect::new(x, y, width, height);
            if !rects.iter().any(|r| rectangles_overlap(&candidate, r)) {
                free.push(Position { x, y });
            }
        }
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn make_layout(width: i32, height: i32, booths: &[(i32, i32, i32, i32)]) -> Layout {
        let mut layout = Layout::new(Ulid::new(), "scan".into(), width, height, 40);
        for &(x, y, w, h) in booths {
            layout.booths.push(BoothPlacement {
                id: Ulid::new(),
                x,
                y,
                width: w,
                height: h,
                is_occupied: false,
                application_id: None,
                label: None,
            });
        }
        layout
    }

    fn contains(positions: &[Position], x: i32, y: i32) -> bool {
        positions.contains(&Position { x, y })
    }

    #[test]
    fn empty_grid_every_cell_fits() {
        let layout = make_layout(4, 3, &[]);
        let free = find_available(&layout, 2, 2);
        // x in 0..=2, y in 0..=1
        assert_eq!(free.len(), 6);
    }

    #[test]
    fn scan_around_corner_booth() {
        let layout = make_layout(10, 10, &[(0, 0, 4, 4)]);
        let free = find_available(&layout, 4, 4);
        assert!(!contains(&free, 0, 0));
        assert!(contains(&free, 4, 0));
        assert!(contains(&free, 0, 4));
        assert!(contains(&free, 4, 4));
        assert!(free.iter().all(|p| p.x + 4 <= 10 && p.y + 4 <= 10));
    }

    #[test]
    fn results_are_row_major() {
        let layout = make_layout(6, 6, &[(2, 2, 2, 2)]);
        let free = find_available(&layout, 2, 2);
        let mut sorted = free.clone();
        sorted.sort_by_key(|p| (p.y, p.x));
        assert_eq!(free, sorted);
        assert_eq!(free[0], Position { x: 0, y: 0 });
        assert_eq!(free[1], Position { x: 1, y: 0 });
    }

    #[test]
    fn footprint_larger_than_grid() {
        let layout = make_layout(3, 3, &[]);
        assert!(find_available(&layout, 4, 4).is_empty());
    }

    #[test]
    fn degenerate_footprints_yield_nothing() {
        let layout = make_layout(10, 10, &[]);
        assert!(find_available(&layout, i32::MIN, 2).is_empty());
        assert!(find_available(&layout, 2, i32::MIN).is_empty());
        assert!(find_available(&layout, -3, 2).is_empty());
        assert!(find_available(&layout, 0, 0).is_empty());

        let hostile = make_layout(i32::MIN, i32::MIN, &[]);
        assert!(find_available(&hostile, 2, 2).is_empty());
    }

    #[test]
    fn exact_fit_grid() {
        let layout = make_layout(4, 4, &[]);
        assert_eq!(find_available(&layout, 4, 4), vec![Position { x: 0, y: 0 }]);
    }

    #[test]
    fn full_grid_has_no_space() {
        let layout = make_layout(4, 4, &[(0, 0, 2, 4), (2, 0, 2, 4)]);
        assert!(find_available(&layout, 2, 2).is_empty());
    }

    #[test]
    fn touching_positions_are_offered() {
        let layout = make_layout(6, 2, &[(0, 0, 2, 2)]);
        let free = find_available(&layout, 2, 2);
        assert_eq!(
            free,
            vec![
                Position { x: 2, y: 0 },
                Position { x: 3, y: 0 },
                Position { x: 4, y: 0 },
            ]
        );
    }
}
