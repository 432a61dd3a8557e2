//! Cache-rectangle alignment and rectangle subtraction.

use smallvec::{SmallVec, smallvec};
use space::{Aabb, EuclideanSpace, Space, ToroidalSpace};

pub type RectStrips = SmallVec<[Aabb; 4]>;

/// Grows `view` outward to whole buckets plus `margin_buckets` on every side,
/// then wraps its origin into the world (toroidal) or clamps it (Euclidean).
///
/// A zero `bucket_size` returns `view` unchanged.
pub fn cache_rect_for_view(
    view: Aabb,
    bucket_size: f32,
    margin_buckets: u32,
    world_side: f32,
    wrapping: bool,
) -> Aabb {
    if view.is_empty() || bucket_size <= 0.0 {
        return view;
    }
    let margin = margin_buckets as f32 * bucket_size;
    let aligned = Aabb::new(
        (view.min_x / bucket_size).floor() * bucket_size - margin,
        (view.min_y / bucket_size).floor() * bucket_size - margin,
        (view.max_x / bucket_size).ceil() * bucket_size + margin,
        (view.max_y / bucket_size).ceil() * bucket_size + margin,
    );
    if world_side <= 0.0 {
        return aligned;
    }
    if wrapping {
        Aabb::from_origin_size(
            ToroidalSpace.normalize_coord(aligned.min_x, world_side),
            ToroidalSpace.normalize_coord(aligned.min_y, world_side),
            aligned.width().min(world_side),
            aligned.height().min(world_side),
        )
    } else {
        Aabb::new(
            EuclideanSpace.normalize_coord(aligned.min_x, world_side),
            EuclideanSpace.normalize_coord(aligned.min_y, world_side),
            EuclideanSpace.normalize_coord(aligned.max_x, world_side),
            EuclideanSpace.normalize_coord(aligned.max_y, world_side),
        )
    }
}

/// `new \ old` as at most four disjoint strips.
///
/// Top and bottom strips span the full width of `new`; left and right strips
/// only span the rows of the overlap, so corners belong to top/bottom.
pub fn diff_rects(old: Aabb, new: Aabb) -> RectStrips {
    if new.is_empty() {
        return RectStrips::new();
    }
    let Some(overlap) = old.intersection(&new) else {
        return smallvec![new];
    };

    let candidates = [
        Aabb::new(new.min_x, new.min_y, new.max_x, overlap.min_y),
        Aabb::new(new.min_x, overlap.max_y, new.max_x, new.max_y),
        Aabb::new(new.min_x, overlap.min_y, overlap.min_x, overlap.max_y),
        Aabb::new(overlap.max_x, overlap.min_y, new.max_x, overlap.max_y),
    ];
    candidates
        .into_iter()
        .filter(|strip| !strip.is_empty())
        .collect()
}

/// Shifts a previous cache rectangle by whole worlds so it lies nearest to
/// `current`, letting [`diff_rects`] see overlap across a toroidal seam.
///
/// On an axis where both rectangles span the whole world, the previous
/// extent is taken as `current`'s; a pan along that axis exposes nothing.
pub fn nearest_world_frame(previous: Aabb, current: Aabb, world_side: f32) -> Aabb {
    if previous.is_empty() || world_side <= 0.0 {
        return previous;
    }
    let spans_x = previous.width() >= world_side && current.width() >= world_side;
    let spans_y = previous.height() >= world_side && current.height() >= world_side;
    let nearest_shift = |from: f32, to: f32| {
        [-world_side, 0.0, world_side]
            .into_iter()
            .min_by(|left, right| {
                (from + left - to)
                    .abs()
                    .total_cmp(&(from + right - to).abs())
            })
            .unwrap_or(0.0)
    };
    let shifted = previous.translate(
        nearest_shift(previous.min_x, current.min_x),
        nearest_shift(previous.min_y, current.min_y),
    );
    Aabb::new(
        if spans_x { current.min_x } else { shifted.min_x },
        if spans_y { current.min_y } else { shifted.min_y },
        if spans_x { current.max_x } else { shifted.max_x },
        if spans_y { current.max_y } else { shifted.max_y },
    )
}
