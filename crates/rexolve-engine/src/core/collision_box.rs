use arrayvec::ArrayVec;

/// Maximum number of sub-boxes attached to a single entity.
pub const MAX_COLLISION_BOXES: usize = 4;

/// Fixed-capacity list of collision sub-boxes owned by one entity.
pub type CollisionBoxes = ArrayVec<CollisionBox, MAX_COLLISION_BOXES>;

/// Axis-aligned rectangle used for collision tests.
///
/// `(x, y)` is the bottom-left corner. Boxes attached to an entity are stored in
/// entity-local coordinates and moved into world space with [`translated`].
///
/// [`translated`]: CollisionBox::translated
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CollisionBox {
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns this box offset by the owning entity's world position.
    #[must_use]
    pub fn translated(self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }

    /// Returns `true` if the two boxes touch or overlap.
    ///
    /// Shared edges count as overlap. The test is symmetric.
    ///
    /// ```
    /// use rexolve_engine::CollisionBox;
    ///
    /// let a = CollisionBox::new(0.0, 0.0, 10.0, 10.0);
    /// let b = CollisionBox::new(5.0, 5.0, 10.0, 10.0);
    /// let c = CollisionBox::new(20.0, 0.0, 10.0, 10.0);
    /// assert!(a.overlaps(&b));
    /// assert!(!a.overlaps(&c));
    /// ```
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.x > other.x + other.width
            || self.x + self.width < other.x
            || self.y > other.y + other.height
            || self.y + self.height < other.y)
    }
}

/// Collects a static box table into an owned box list.
pub(crate) fn boxes_from(table: &[CollisionBox]) -> CollisionBoxes {
    table.iter().copied().take(MAX_COLLISION_BOXES).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_boxes() -> Vec<CollisionBox> {
        let mut boxes = vec![];
        for x in [-15.0, -5.0, 0.0, 3.5, 10.0, 25.0] {
            for y in [-10.0, 0.0, 4.0, 10.0, 30.0] {
                for (w, h) in [(1.0, 1.0), (10.0, 5.0), (30.0, 35.0)] {
                    boxes.push(CollisionBox::new(x, y, w, h));
                }
            }
        }
        boxes
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let boxes = grid_boxes();
        for a in &boxes {
            for b in &boxes {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_touching_edges_overlap() {
        let a = CollisionBox::new(0.0, 0.0, 10.0, 10.0);
        let right = CollisionBox::new(10.0, 0.0, 5.0, 5.0);
        let above = CollisionBox::new(0.0, 10.0, 5.0, 5.0);
        assert!(a.overlaps(&right));
        assert!(a.overlaps(&above));
    }

    #[test]
    fn test_separated_on_one_axis_does_not_overlap() {
        let a = CollisionBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(&CollisionBox::new(10.5, 0.0, 5.0, 5.0)));
        assert!(!a.overlaps(&CollisionBox::new(0.0, 10.5, 5.0, 5.0)));
        assert!(!a.overlaps(&CollisionBox::new(-6.0, 0.0, 5.0, 5.0)));
        assert!(!a.overlaps(&CollisionBox::new(0.0, -6.0, 5.0, 5.0)));
    }

    #[test]
    fn test_translated_moves_origin_only() {
        let b = CollisionBox::new(1.0, 2.0, 3.0, 4.0).translated(10.0, 20.0);
        assert_eq!(b, CollisionBox::new(11.0, 22.0, 3.0, 4.0));
    }
}
