//! Fixed-size bucket grid over a square world, and the index contract the grid
//! managers write into.

use std::fmt;

use space::Aabb;

mod grid;
mod shared;

pub use grid::GridBucketIndex;
pub use shared::{BucketIndexReader, SharedBucketIndex};

/// World coordinates above 2^24 stop being exact in f32.
pub const MAX_WORLD_RESOLUTION: u32 = 24;
/// At most 2^12 buckets per side, 2^24 buckets total.
pub const MAX_GRID_RESOLUTION: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    WorldResolutionTooLarge { world_resolution: u32 },
    BucketResolutionExceedsWorld {
        bucket_resolution: u32,
        world_resolution: u32,
    },
    TooManyBuckets { grid_resolution: u32 },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::WorldResolutionTooLarge { world_resolution } => write!(
                formatter,
                "world resolution {world_resolution} exceeds maximum {MAX_WORLD_RESOLUTION}"
            ),
            LayoutError::BucketResolutionExceedsWorld {
                bucket_resolution,
                world_resolution,
            } => write!(
                formatter,
                "bucket resolution {bucket_resolution} exceeds world resolution {world_resolution}"
            ),
            LayoutError::TooManyBuckets { grid_resolution } => write!(
                formatter,
                "bucket grid resolution {grid_resolution} exceeds maximum {MAX_GRID_RESOLUTION}"
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLayout {
    world_resolution: u32,
    bucket_resolution: u32,
    grid_side: u32,
}

/// Inclusive range of bucket coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRange {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BucketRange {
    pub fn contains(&self, bucket_x: u32, bucket_y: u32) -> bool {
        (self.min_x..=self.max_x).contains(&bucket_x) && (self.min_y..=self.max_y).contains(&bucket_y)
    }

    pub fn bucket_count(&self) -> usize {
        (self.max_x - self.min_x + 1) as usize * (self.max_y - self.min_y + 1) as usize
    }
}

impl BucketLayout {
    pub fn new(world_resolution: u32, bucket_resolution: u32) -> Result<Self, LayoutError> {
        if world_resolution > MAX_WORLD_RESOLUTION {
            return Err(LayoutError::WorldResolutionTooLarge { world_resolution });
        }
        if bucket_resolution > world_resolution {
            return Err(LayoutError::BucketResolutionExceedsWorld {
                bucket_resolution,
                world_resolution,
            });
        }
        let grid_resolution = world_resolution - bucket_resolution;
        if grid_resolution > MAX_GRID_RESOLUTION {
            return Err(LayoutError::TooManyBuckets { grid_resolution });
        }
        Ok(Self {
            world_resolution,
            bucket_resolution,
            grid_side: 1 << grid_resolution,
        })
    }

    pub fn world_resolution(&self) -> u32 {
        self.world_resolution
    }

    pub fn bucket_resolution(&self) -> u32 {
        self.bucket_resolution
    }

    pub fn world_side(&self) -> u32 {
        1 << self.world_resolution
    }

    pub fn world_side_f32(&self) -> f32 {
        self.world_side() as f32
    }

    pub fn bucket_size(&self) -> u32 {
        1 << self.bucket_resolution
    }

    pub fn bucket_size_f32(&self) -> f32 {
        self.bucket_size() as f32
    }

    pub fn grid_side(&self) -> u32 {
        self.grid_side
    }

    pub fn bucket_count(&self) -> usize {
        self.grid_side as usize * self.grid_side as usize
    }

    pub fn world_rect(&self) -> Aabb {
        Aabb::new(0.0, 0.0, self.world_side_f32(), self.world_side_f32())
    }

    pub fn bucket_index(&self, bucket_x: u32, bucket_y: u32) -> u32 {
        assert!(
            bucket_x < self.grid_side && bucket_y < self.grid_side,
            "bucket ({bucket_x}, {bucket_y}) is outside the {0}x{0} grid",
            self.grid_side
        );
        bucket_y * self.grid_side + bucket_x
    }

    pub fn bucket_coord(&self, bucket_index: u32) -> (u32, u32) {
        (bucket_index % self.grid_side, bucket_index / self.grid_side)
    }

    pub fn bucket_aabb(&self, bucket_index: u32) -> Aabb {
        let (bucket_x, bucket_y) = self.bucket_coord(bucket_index);
        let size = self.bucket_size_f32();
        Aabb::from_origin_size(bucket_x as f32 * size, bucket_y as f32 * size, size, size)
    }

    /// Buckets touched by `aabb` after clamping it into the world.
    pub fn bucket_range(&self, aabb: Aabb) -> Option<BucketRange> {
        let clamped = aabb.clamp_to(self.world_side_f32());
        if clamped.is_empty() {
            return None;
        }
        let size = self.bucket_size_f32();
        let last = self.grid_side - 1;
        let to_min = |value: f32| ((value / size).floor() as u32).min(last);
        let to_max = |value: f32| (((value / size).ceil() as u32).max(1) - 1).min(last);
        Some(BucketRange {
            min_x: to_min(clamped.min_x),
            min_y: to_min(clamped.min_y),
            max_x: to_max(clamped.max_x),
            max_y: to_max(clamped.max_y),
        })
    }

    pub fn for_each_bucket(&self, aabb: Aabb, mut visit: impl FnMut(u32)) {
        let Some(range) = self.bucket_range(aabb) else {
            return;
        };
        for bucket_y in range.min_y..=range.max_y {
            for bucket_x in range.min_x..=range.max_x {
                visit(self.bucket_index(bucket_x, bucket_y));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub id: u64,
    pub aabb: Aabb,
}

impl IndexEntry {
    pub fn new(id: u64, aabb: Aabb) -> Self {
        Self { id, aabb }
    }
}

/// Spatial store of `id -> Aabb` entries addressed by bucket.
///
/// Query rectangles are in-world; callers split wrapped queries first.
pub trait BucketIndex: Send + Sync {
    fn bulk_insert(&mut self, entries: &[IndexEntry]);

    /// Unknown ids are ignored.
    fn bulk_remove(&mut self, ids: &[u64]);

    /// Unknown ids are inserted.
    fn bulk_move(&mut self, entries: &[IndexEntry]);

    /// Visits every entry intersecting `aabb` once and returns the visit count.
    fn query_range(&self, aabb: Aabb, collector: &mut dyn FnMut(IndexEntry)) -> usize;

    fn entry_aabb(&self, id: u64) -> Option<Aabb>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
