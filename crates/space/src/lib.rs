//! World-space geometry shared by the bucket index and the viewport.
//!
//! A world is a `side x side` square that is either toroidal (coordinates wrap
//! at the seams) or Euclidean (coordinates clamp to the edges). Shapes are
//! half-open axis-aligned boxes.

use std::fmt;

pub const TOROIDAL_SPACE_NAME: &str = "toroidal";
pub const EUCLIDEAN_SPACE_NAME: &str = "euclidean";

/// Half-open axis-aligned box `[min, max)` in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 0.0,
        max_y: 0.0,
    };

    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_origin_size(origin_x: f32, origin_y: f32, width: f32, height: f32) -> Self {
        Self::new(origin_x, origin_y, origin_x + width, origin_y + height)
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.width() * self.height()
    }

    /// Zero-area, inverted, and non-finite boxes are all empty.
    pub fn is_empty(&self) -> bool {
        !(self.min_x < self.max_x && self.min_y < self.max_y)
            || !self.min_x.is_finite()
            || !self.min_y.is_finite()
            || !self.max_x.is_finite()
            || !self.max_y.is_finite()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }

    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        if !self.intersects(other) {
            return None;
        }
        Some(Aabb::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        !other.is_empty()
            && self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    pub fn translate(&self, delta_x: f32, delta_y: f32) -> Aabb {
        Aabb::new(
            self.min_x + delta_x,
            self.min_y + delta_y,
            self.max_x + delta_x,
            self.max_y + delta_y,
        )
    }

    /// Clamps into `[0, side)` on both axes. The result may be empty.
    pub fn clamp_to(&self, side: f32) -> Aabb {
        let side = side.max(0.0);
        Aabb::new(
            self.min_x.clamp(0.0, side),
            self.min_y.clamp(0.0, side),
            self.max_x.clamp(0.0, side),
            self.max_y.clamp(0.0, side),
        )
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "({}, {})-({}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Position of a piece produced by splitting a shape at the world seams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum WrapSlot {
    Base = 0,
    RightWrap = 1,
    BottomWrap = 2,
    CornerWrap = 3,
}

impl WrapSlot {
    pub const ALL: [WrapSlot; 4] = [
        WrapSlot::Base,
        WrapSlot::RightWrap,
        WrapSlot::BottomWrap,
        WrapSlot::CornerWrap,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<WrapSlot> {
        match index {
            0 => Some(WrapSlot::Base),
            1 => Some(WrapSlot::RightWrap),
            2 => Some(WrapSlot::BottomWrap),
            3 => Some(WrapSlot::CornerWrap),
            _ => None,
        }
    }
}

/// One in-world piece of a wrapped shape.
///
/// `rect + (offset_x, offset_y)` is where the piece sits in the unwrapped
/// coordinate frame of the shape that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrapPiece {
    pub slot: WrapSlot,
    pub rect: Aabb,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl WrapPiece {
    pub fn unwrapped_rect(&self) -> Aabb {
        self.rect.translate(self.offset_x, self.offset_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WrappedAabb {
    pieces: [Option<WrapPiece>; 4],
}

impl WrappedAabb {
    pub const fn empty() -> Self {
        Self { pieces: [None; 4] }
    }

    fn with_piece(mut self, slot: WrapSlot, rect: Aabb, offset_x: f32, offset_y: f32) -> Self {
        if !rect.is_empty() {
            self.pieces[slot.index()] = Some(WrapPiece {
                slot,
                rect,
                offset_x,
                offset_y,
            });
        }
        self
    }

    pub fn base(&self) -> Option<Aabb> {
        self.fragment(WrapSlot::Base)
    }

    pub fn fragment(&self, slot: WrapSlot) -> Option<Aabb> {
        self.pieces[slot.index()].map(|piece| piece.rect)
    }

    pub fn piece(&self, slot: WrapSlot) -> Option<WrapPiece> {
        self.pieces[slot.index()]
    }

    pub fn pieces(&self) -> impl Iterator<Item = WrapPiece> + '_ {
        self.pieces.iter().flatten().copied()
    }

    pub fn for_each_fragment(&self, mut visit: impl FnMut(WrapSlot, Aabb)) {
        for piece in self.pieces() {
            visit(piece.slot, piece.rect);
        }
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces[WrapSlot::Base.index()].is_none()
    }

    /// True when the shape crossed at least one seam.
    pub fn is_split(&self) -> bool {
        self.pieces[1..].iter().any(Option::is_some)
    }
}

pub trait Space: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn is_wrapping(&self) -> bool {
        self.name() == TOROIDAL_SPACE_NAME
    }

    /// Splits `aabb` into in-world pieces for a world of `world_side`.
    fn wrap_aabb(&self, aabb: Aabb, world_side: f32) -> WrappedAabb;

    /// Wraps (toroidal) or clamps (Euclidean) a scalar into `[0, size]`.
    fn normalize_coord(&self, value: f32, size: f32) -> f32;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToroidalSpace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EuclideanSpace;

impl Space for ToroidalSpace {
    fn name(&self) -> &'static str {
        TOROIDAL_SPACE_NAME
    }

    fn wrap_aabb(&self, aabb: Aabb, world_side: f32) -> WrappedAabb {
        if aabb.is_empty() || !world_side.is_finite() || world_side <= 0.0 {
            return WrappedAabb::empty();
        }
        let axis_x = WrappedAxis::new(aabb.min_x, aabb.max_x, world_side);
        let axis_y = WrappedAxis::new(aabb.min_y, aabb.max_y, world_side);

        let base = Aabb::new(
            axis_x.min,
            axis_y.min,
            axis_x.max.min(world_side),
            axis_y.max.min(world_side),
        );
        let right = Aabb::new(0.0, base.min_y, axis_x.max - world_side, base.max_y);
        let bottom = Aabb::new(base.min_x, 0.0, base.max_x, axis_y.max - world_side);
        let corner = Aabb::new(0.0, 0.0, right.max_x, bottom.max_y);

        let wrapped = WrappedAabb::empty().with_piece(
            WrapSlot::Base,
            base,
            axis_x.shift,
            axis_y.shift,
        );
        if wrapped.is_empty() {
            return wrapped;
        }
        wrapped
            .with_piece(
                WrapSlot::RightWrap,
                right,
                axis_x.shift + world_side,
                axis_y.shift,
            )
            .with_piece(
                WrapSlot::BottomWrap,
                bottom,
                axis_x.shift,
                axis_y.shift + world_side,
            )
            .with_piece(
                WrapSlot::CornerWrap,
                corner,
                axis_x.shift + world_side,
                axis_y.shift + world_side,
            )
    }

    fn normalize_coord(&self, value: f32, size: f32) -> f32 {
        if !size.is_finite() || size <= 0.0 {
            return value;
        }
        let wrapped = value.rem_euclid(size);
        // rem_euclid can round up to `size` for tiny negative inputs.
        if wrapped >= size { 0.0 } else { wrapped }
    }
}

impl Space for EuclideanSpace {
    fn name(&self) -> &'static str {
        EUCLIDEAN_SPACE_NAME
    }

    fn wrap_aabb(&self, aabb: Aabb, world_side: f32) -> WrappedAabb {
        if aabb.is_empty() || !world_side.is_finite() || world_side <= 0.0 {
            return WrappedAabb::empty();
        }
        WrappedAabb::empty().with_piece(WrapSlot::Base, aabb.clamp_to(world_side), 0.0, 0.0)
    }

    fn normalize_coord(&self, value: f32, size: f32) -> f32 {
        value.clamp(0.0, size.max(0.0))
    }
}

/// One axis of a shape after its origin is folded into `[0, world)`.
struct WrappedAxis {
    min: f32,
    max: f32,
    shift: f32,
}

impl WrappedAxis {
    fn new(min: f32, max: f32, world_side: f32) -> Self {
        let extent = (max - min).min(world_side);
        let mut wrapped_min = min.rem_euclid(world_side);
        if wrapped_min >= world_side {
            wrapped_min = 0.0;
        }
        Self {
            min: wrapped_min,
            max: wrapped_min + extent,
            shift: min - wrapped_min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WORLD: f32 = 256.0;

    #[test]
    fn toroidal_corner_shape_splits_into_four_pieces() {
        let wrapped = ToroidalSpace.wrap_aabb(Aabb::new(250.0, 250.0, 260.0, 260.0), WORLD);

        assert_eq!(wrapped.piece_count(), 4);
        assert_eq!(wrapped.base(), Some(Aabb::new(250.0, 250.0, 256.0, 256.0)));
        assert_eq!(
            wrapped.fragment(WrapSlot::RightWrap),
            Some(Aabb::new(0.0, 250.0, 4.0, 256.0))
        );
        assert_eq!(
            wrapped.fragment(WrapSlot::BottomWrap),
            Some(Aabb::new(250.0, 0.0, 256.0, 4.0))
        );
        assert_eq!(
            wrapped.fragment(WrapSlot::CornerWrap),
            Some(Aabb::new(0.0, 0.0, 4.0, 4.0))
        );
        let corner = wrapped.piece(WrapSlot::CornerWrap).expect("corner piece");
        assert_eq!(
            corner.unwrapped_rect(),
            Aabb::new(256.0, 256.0, 260.0, 260.0)
        );
    }

    #[test]
    fn toroidal_negative_origin_wraps_into_world() {
        let wrapped = ToroidalSpace.wrap_aabb(Aabb::new(-6.0, 10.0, 4.0, 20.0), WORLD);

        assert_eq!(wrapped.base(), Some(Aabb::new(250.0, 10.0, 256.0, 20.0)));
        assert_eq!(
            wrapped.fragment(WrapSlot::RightWrap),
            Some(Aabb::new(0.0, 10.0, 4.0, 20.0))
        );
        let base = wrapped.piece(WrapSlot::Base).expect("base piece");
        assert_eq!(base.unwrapped_rect(), Aabb::new(-6.0, 10.0, 0.0, 20.0));
    }

    #[test]
    fn euclidean_clamps_without_fragments() {
        let wrapped = EuclideanSpace.wrap_aabb(Aabb::new(250.0, -5.0, 260.0, 10.0), WORLD);

        assert_eq!(wrapped.piece_count(), 1);
        assert!(!wrapped.is_split());
        assert_eq!(wrapped.base(), Some(Aabb::new(250.0, 0.0, 256.0, 10.0)));
    }

    #[test]
    fn shapes_outside_euclidean_world_vanish() {
        let wrapped = EuclideanSpace.wrap_aabb(Aabb::new(300.0, 300.0, 310.0, 310.0), WORLD);
        assert!(wrapped.is_empty());
        assert_eq!(wrapped.piece_count(), 0);
    }

    #[test]
    fn degenerate_input_produces_nothing() {
        let inverted = Aabb::new(10.0, 10.0, 5.0, 20.0);
        assert!(ToroidalSpace.wrap_aabb(inverted, WORLD).is_empty());
        assert!(ToroidalSpace.wrap_aabb(Aabb::EMPTY, WORLD).is_empty());
        let non_finite = Aabb::new(f32::NAN, 0.0, 10.0, 10.0);
        assert!(ToroidalSpace.wrap_aabb(non_finite, WORLD).is_empty());
    }

    #[test]
    fn normalize_coord_wraps_or_clamps() {
        assert_eq!(ToroidalSpace.normalize_coord(-1.0, WORLD), 255.0);
        assert_eq!(ToroidalSpace.normalize_coord(513.0, WORLD), 1.0);
        assert_eq!(EuclideanSpace.normalize_coord(-1.0, WORLD), 0.0);
        assert_eq!(EuclideanSpace.normalize_coord(513.0, WORLD), WORLD);
        assert!(ToroidalSpace.is_wrapping());
        assert!(!EuclideanSpace.is_wrapping());
    }

    fn assert_pairwise_disjoint(wrapped: &WrappedAabb) -> Result<(), TestCaseError> {
        let pieces: Vec<WrapPiece> = wrapped.pieces().collect();
        for (index, piece) in pieces.iter().enumerate() {
            prop_assert!(Aabb::new(0.0, 0.0, WORLD, WORLD).contains(&piece.rect));
            for other in &pieces[index + 1..] {
                prop_assert!(!piece.rect.intersects(&other.rect));
            }
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn toroidal_pieces_cover_wrapped_area_once(
            x in -400i32..400,
            y in -400i32..400,
            width in 1i32..320,
            height in 1i32..320,
        ) {
            let aabb = Aabb::from_origin_size(x as f32, y as f32, width as f32, height as f32);
            let wrapped = ToroidalSpace.wrap_aabb(aabb, WORLD);

            let expected = (width as f32).min(WORLD) * (height as f32).min(WORLD);
            let covered: f32 = wrapped.pieces().map(|piece| piece.rect.area()).sum();
            prop_assert_eq!(covered, expected);
            assert_pairwise_disjoint(&wrapped)?;
            for piece in wrapped.pieces() {
                let unwrapped = piece.unwrapped_rect();
                prop_assert!(unwrapped.min_x >= aabb.min_x && unwrapped.min_y >= aabb.min_y);
            }
        }

        #[test]
        fn euclidean_pieces_cover_clamped_area(
            x in -400i32..400,
            y in -400i32..400,
            width in 1i32..320,
            height in 1i32..320,
        ) {
            let aabb = Aabb::from_origin_size(x as f32, y as f32, width as f32, height as f32);
            let wrapped = EuclideanSpace.wrap_aabb(aabb, WORLD);

            let covered: f32 = wrapped.pieces().map(|piece| piece.rect.area()).sum();
            prop_assert_eq!(covered, aabb.clamp_to(WORLD).area());
            assert_pairwise_disjoint(&wrapped)?;
        }
    }
}
