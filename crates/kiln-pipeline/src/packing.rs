//! Rectangle packing for texture atlases

/// Placement of one box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedRect {
    pub x: f32,
    pub y: f32,
    /// Width as placed (after rotation)
    pub width: f32,
    /// Height as placed (after rotation)
    pub height: f32,
    /// Whether the box was turned 90 degrees
    pub rotated: bool,
}

impl PackedRect {
    /// Check whether two placements overlap with positive area
    pub fn overlaps(&self, other: &PackedRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Places boxes on a strip of fixed width and unbounded height
pub trait RectPacker {
    /// Pack `(width, height)` boxes onto a strip `canvas_width` wide
    ///
    /// Returns one placement per box, in input order, or `None` when some box
    /// cannot be placed.
    fn pack(&self, boxes: &[(f32, f32)], canvas_width: f32) -> Option<Vec<PackedRect>>;
}

/// Shelf packer
///
/// Boxes are turned so they are at least as wide as tall, sorted by height
/// and laid out left to right on shelves; a box that does not fit the current
/// shelf starts a new one. A box too wide for the strip is placed upright
/// when that fits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShelfPacker;

impl RectPacker for ShelfPacker {
    fn pack(&self, boxes: &[(f32, f32)], canvas_width: f32) -> Option<Vec<PackedRect>> {
        let mut oriented = Vec::with_capacity(boxes.len());
        for &(w, h) in boxes {
            if !(w > 0.0 && h > 0.0) {
                return None;
            }
            let (long, short) = if w >= h { (w, h) } else { (h, w) };
            let placed = if long <= canvas_width {
                (long, short, h > w)
            } else if short <= canvas_width {
                (short, long, w > h)
            } else {
                return None;
            };
            oriented.push(placed);
        }

        let mut order: Vec<usize> = (0..boxes.len()).collect();
        order.sort_by(|&a, &b| oriented[b].1.total_cmp(&oriented[a].1));

        let mut placements = vec![None; boxes.len()];
        let (mut shelf_y, mut shelf_height, mut cursor_x) = (0.0f32, 0.0f32, 0.0f32);
        for i in order {
            let (width, height, rotated) = oriented[i];
            if cursor_x + width > canvas_width && cursor_x > 0.0 {
                shelf_y += shelf_height;
                shelf_height = 0.0;
                cursor_x = 0.0;
            }
            placements[i] = Some(PackedRect {
                x: cursor_x,
                y: shelf_y,
                width,
                height,
                rotated,
            });
            cursor_x += width;
            shelf_height = shelf_height.max(height);
        }
        placements.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overlap() {
        let boxes = [(100.0, 50.0), (30.0, 90.0), (256.0, 256.0), (60.0, 60.0), (200.0, 10.0)];
        let rects = ShelfPacker.pack(&boxes, 256.0).unwrap();
        assert_eq!(rects.len(), boxes.len());
        for (i, a) in rects.iter().enumerate() {
            assert!(a.x >= 0.0 && a.x + a.width <= 256.0);
            for b in &rects[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_rotation_flags() {
        let rects = ShelfPacker.pack(&[(30.0, 90.0), (90.0, 30.0)], 256.0).unwrap();
        assert!(rects[0].rotated);
        assert_eq!((rects[0].width, rects[0].height), (90.0, 30.0));
        assert!(!rects[1].rotated);
    }

    #[test]
    fn test_tall_box_kept_upright() {
        let rects = ShelfPacker.pack(&[(40.0, 300.0)], 256.0).unwrap();
        assert!(!rects[0].rotated);
        assert_eq!(rects[0].height, 300.0);
    }

    #[test]
    fn test_infeasible() {
        assert!(ShelfPacker.pack(&[(300.0, 300.0)], 256.0).is_none());
        assert!(ShelfPacker.pack(&[(0.0, 10.0)], 256.0).is_none());
    }
}
