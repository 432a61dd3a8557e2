//! Incremental bucket index and viewport cache planning.
//!
//! A [`BucketGridManager`] indexes the shapes of one layer into square buckets,
//! records which buckets changed and which fragment ids were added, removed or
//! updated in each, and plans which cached buckets around the viewport must be
//! redrawn. Mutations are queued from any thread and applied by the render
//! loop on [`BucketGridManager::flush`] / [`BucketGridManager::plan`].
//!
//! [`MultiBucketGridManager`] bundles one manager per layer of a pane and turns
//! their plans into a single [`FramePlan`].

use std::fmt;

pub use bucket_index::{BucketLayout, LayoutError};
pub use space::{Aabb, EuclideanSpace, Space, ToroidalSpace, WrapSlot};

mod bridge;
mod delta;
mod dirty;
mod fragment;
mod manager;
mod multi;
mod op_queue;
pub mod rect_diff;

pub use bridge::{BridgeError, SceneBridge, SceneEvent};
pub use delta::BucketDelta;
pub use fragment::{EntryId, FragmentId, FragmentMask, MAX_ENTRY_ID};
pub use manager::{BucketGridManager, BucketPlan, FlushStats, PlannedBucket};
pub use multi::{
    FramePlan, LayerConfig, LayerDeltas, LayerKey, LayerPlan, MultiBucketGridConfig,
    MultiBucketGridManager,
};
pub use op_queue::{BucketGridQueue, QueueError, QueueOverflowPolicy};

pub const DEFAULT_WORLD_RESOLUTION: u32 = 12;
pub const DEFAULT_BUCKET_RESOLUTION: u32 = 8;
pub const DEFAULT_BUCKET_CAPACITY: usize = 64;
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketGridConfig {
    /// World side is `2^world_resolution`.
    pub world_resolution: u32,
    /// Bucket side is `2^bucket_resolution`.
    pub bucket_resolution: u32,
    /// Expected ids per bucket; sizes bucket storage on first use.
    pub bucket_capacity: usize,
    pub queue_capacity: usize,
    pub overflow: QueueOverflowPolicy,
}

impl Default for BucketGridConfig {
    fn default() -> Self {
        Self {
            world_resolution: DEFAULT_WORLD_RESOLUTION,
            bucket_resolution: DEFAULT_BUCKET_RESOLUTION,
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: QueueOverflowPolicy::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketGridError {
    Layout(LayoutError),
    InvalidQueueCapacity,
}

impl From<LayoutError> for BucketGridError {
    fn from(value: LayoutError) -> Self {
        Self::Layout(value)
    }
}

impl fmt::Display for BucketGridError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketGridError::Layout(error) => write!(formatter, "invalid bucket layout: {error}"),
            BucketGridError::InvalidQueueCapacity => {
                write!(formatter, "operation queue capacity must be greater than zero")
            }
        }
    }
}

impl std::error::Error for BucketGridError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BucketGridError::Layout(error) => Some(error),
            BucketGridError::InvalidQueueCapacity => None,
        }
    }
}
