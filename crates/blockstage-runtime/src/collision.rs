//! Axis-aligned collision test between two actors
//!
//! Each actor occupies the square `[x, x + size) x [y, y + size)`. Boxes
//! collide only when they overlap with positive area: touching edges or
//! corners do not count.

use blockstage_core::Pose;

/// True iff the boxes anchored at `a` and `b` strictly overlap
pub fn collides(a: &Pose, b: &Pose, size: f64) -> bool {
    let (a_left, a_right) = (a.x, a.x + size);
    let (a_top, a_bottom) = (a.y, a.y + size);
    let (b_left, b_right) = (b.x, b.x + size);
    let (b_top, b_bottom) = (b.y, b.y + size);

    a_left < b_right && a_right > b_left && a_top < b_bottom && a_bottom > b_top
}
