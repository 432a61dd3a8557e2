use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bucket_index::{
    BucketIndex, BucketIndexReader, BucketLayout, BucketRange, GridBucketIndex, IndexEntry,
    SharedBucketIndex,
};
use crossbeam_channel::{Receiver, TryRecvError, TrySendError};
use smallvec::SmallVec;
use space::{Aabb, Space, WrapSlot};

use crate::delta::{BucketDelta, DeltaAccumulator, DeltaOp};
use crate::dirty::DirtyBucketSet;
use crate::fragment::{EntryId, FragmentId, FragmentMask};
use crate::op_queue::{BucketGridQueue, GridOp, QueueError, op_channel};
use crate::rect_diff::{cache_rect_for_view, diff_rects, nearest_world_frame};
use crate::{BucketGridConfig, BucketGridError};

/// A dirty bucket reported by [`BucketGridManager::plan`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedBucket {
    pub index: u32,
    /// Bucket bounds inside the world.
    pub world_rect: Aabb,
    /// Bucket bounds in the unwrapped frame of the plan's cache rectangle.
    pub cache_rect: Aabb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketPlan {
    pub cache_rect: Aabb,
    pub dirty_buckets: Vec<PlannedBucket>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub inserts: usize,
    pub removes: usize,
    pub updates: usize,
    pub dirty_rects: usize,
}

impl FlushStats {
    pub fn applied(&self) -> usize {
        self.inserts + self.removes + self.updates + self.dirty_rects
    }
}

/// Up to four clamped, non-empty fragment rectangles of one entry.
#[derive(Debug, Clone, Copy, Default)]
struct Placement {
    mask: FragmentMask,
    rects: [Option<Aabb>; 4],
}

impl Placement {
    fn fragments(&self) -> impl Iterator<Item = (WrapSlot, Aabb)> + '_ {
        WrapSlot::ALL
            .into_iter()
            .filter_map(|slot| self.rects[slot.index()].map(|rect| (slot, rect)))
    }
}

#[derive(Debug, Default)]
struct IndexBatch {
    inserts: Vec<IndexEntry>,
    moves: Vec<IndexEntry>,
    removes: Vec<u64>,
}

/// Bucketed index plus dirty and delta tracking for one layer.
///
/// Producers enqueue through [`BucketGridManager::queue`] handles; the render
/// loop owns the manager and is the only place the index is mutated.
pub struct BucketGridManager {
    space: Arc<dyn Space>,
    config: BucketGridConfig,
    layout: BucketLayout,
    index: SharedBucketIndex,
    queue: BucketGridQueue,
    receiver: Receiver<GridOp>,
    entries: HashMap<EntryId, FragmentMask>,
    /// Flush-side source of truth for fragment rectangles. The index holds a
    /// copy for readers; updates diff against this map, never the index.
    fragments: HashMap<FragmentId, Aabb>,
    dirty: DirtyBucketSet,
    deltas: DeltaAccumulator,
    last_cache_rect: Option<Aabb>,
    batch: IndexBatch,
}

impl fmt::Debug for BucketGridManager {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BucketGridManager")
            .field("space", &self.space.name())
            .field("layout", &self.layout)
            .field("entries", &self.entries.len())
            .field("fragments", &self.fragments.len())
            .field("dirty_buckets", &self.dirty.len())
            .field("pending_ops", &self.queue.pending())
            .finish()
    }
}

impl BucketGridManager {
    pub fn new(space: Arc<dyn Space>, config: BucketGridConfig) -> Result<Self, BucketGridError> {
        let layout = BucketLayout::new(config.world_resolution, config.bucket_resolution)?;
        Self::with_index(
            space,
            config,
            GridBucketIndex::new(layout, config.bucket_capacity),
        )
    }

    /// Builds a manager over a caller-supplied index implementation.
    pub fn with_index(
        space: Arc<dyn Space>,
        config: BucketGridConfig,
        index: impl BucketIndex + 'static,
    ) -> Result<Self, BucketGridError> {
        let layout = BucketLayout::new(config.world_resolution, config.bucket_resolution)?;
        if config.queue_capacity == 0 {
            return Err(BucketGridError::InvalidQueueCapacity);
        }
        let (queue, receiver) = op_channel(config.queue_capacity, config.overflow);
        Ok(Self {
            space,
            config,
            layout,
            index: SharedBucketIndex::new(index),
            queue,
            receiver,
            entries: HashMap::new(),
            fragments: HashMap::new(),
            dirty: DirtyBucketSet::new(layout.bucket_count()),
            deltas: DeltaAccumulator::default(),
            last_cache_rect: None,
            batch: IndexBatch::default(),
        })
    }

    pub fn space(&self) -> &Arc<dyn Space> {
        &self.space
    }

    pub fn config(&self) -> BucketGridConfig {
        self.config
    }

    pub fn layout(&self) -> BucketLayout {
        self.layout
    }

    /// Producer handle for other threads.
    pub fn queue(&self) -> BucketGridQueue {
        self.queue.clone()
    }

    /// Read handle usable from other threads while this manager flushes.
    pub fn index_reader(&self) -> BucketIndexReader {
        self.index.reader()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_entry(&self, entry_id: EntryId) -> bool {
        self.entries.contains_key(&entry_id)
    }

    pub fn entry_mask(&self, entry_id: EntryId) -> Option<FragmentMask> {
        self.entries.get(&entry_id).copied()
    }

    pub fn dirty_bucket_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_bucket_dirty(&self, bucket_index: u32) -> bool {
        self.dirty.contains(bucket_index)
    }

    pub fn pending_ops(&self) -> usize {
        self.queue.pending()
    }

    pub fn last_cache_rect(&self) -> Option<Aabb> {
        self.last_cache_rect
    }

    pub fn queue_insert(
        &mut self,
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    ) -> Result<(), QueueError> {
        self.enqueue(GridOp::insert(entry_id, aabb, mark_dirty)?)
    }

    pub fn queue_remove(&mut self, entry_id: EntryId) -> Result<(), QueueError> {
        self.enqueue(GridOp::remove(entry_id)?)
    }

    pub fn queue_update(
        &mut self,
        entry_id: EntryId,
        aabb: Aabb,
        mark_dirty: bool,
    ) -> Result<(), QueueError> {
        self.enqueue(GridOp::update(entry_id, aabb, mark_dirty)?)
    }

    pub fn queue_dirty_rect(&mut self, rect: Aabb) -> Result<(), QueueError> {
        self.enqueue(GridOp::DirtyRect { rect })
    }

    /// Consumer-side push. Blocking here would deadlock the only thread that
    /// drains the queue, so a full queue is flushed in place instead and
    /// neither overflow policy can lose the operation.
    fn enqueue(&mut self, op: GridOp) -> Result<(), QueueError> {
        let mut pending = op;
        loop {
            match self.queue.try_push(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    self.flush();
                    pending = returned;
                }
                Err(TrySendError::Disconnected(_)) => return Err(QueueError::Disconnected),
            }
        }
    }

    /// Applies every queued operation in FIFO order.
    pub fn flush(&mut self) -> FlushStats {
        let mut stats = FlushStats::default();
        loop {
            let op = match self.receiver.try_recv() {
                Ok(op) => op,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    unreachable!("manager owns a sender for its own queue")
                }
            };
            match op {
                GridOp::Insert {
                    entry_id,
                    aabb,
                    mark_dirty,
                } => {
                    stats.inserts += 1;
                    self.apply_insert(entry_id, aabb, mark_dirty);
                }
                GridOp::Remove { entry_id } => {
                    stats.removes += 1;
                    self.apply_remove(entry_id, true);
                }
                GridOp::Update {
                    entry_id,
                    aabb,
                    mark_dirty,
                } => {
                    stats.updates += 1;
                    self.apply_update(entry_id, aabb, mark_dirty);
                }
                GridOp::DirtyRect { rect } => {
                    stats.dirty_rects += 1;
                    self.mark_rect_dirty(rect);
                }
            }
        }
        if stats.applied() > 0 {
            log::debug!(
                "bucket grid flush: {} inserts, {} removes, {} updates, {} dirty rects, {} dirty buckets",
                stats.inserts,
                stats.removes,
                stats.updates,
                stats.dirty_rects,
                self.dirty.len()
            );
        }
        stats
    }

    /// Flushes, recomputes the cache rectangle around `view_rect`, and takes
    /// the dirty buckets inside it.
    pub fn plan(&mut self, view_rect: Aabb, margin_buckets: u32) -> BucketPlan {
        self.flush();

        let world_side = self.layout.world_side_f32();
        let wrapping = self.space.is_wrapping();
        let cache_rect = cache_rect_for_view(
            view_rect,
            self.layout.bucket_size_f32(),
            margin_buckets,
            world_side,
            wrapping,
        );

        if self.last_cache_rect != Some(cache_rect) {
            let previous = match self.last_cache_rect {
                Some(previous) if wrapping => nearest_world_frame(previous, cache_rect, world_side),
                Some(previous) => previous,
                None => Aabb::EMPTY,
            };
            for strip in diff_rects(previous, cache_rect) {
                self.mark_rect_dirty(strip);
            }
            self.last_cache_rect = Some(cache_rect);
        }

        let dirty_buckets = self.take_dirty_within(cache_rect);
        log::trace!(
            "bucket grid plan: cache {cache_rect}, {} dirty buckets, {} still pending",
            dirty_buckets.len(),
            self.dirty.len()
        );
        BucketPlan {
            cache_rect,
            dirty_buckets,
        }
    }

    /// Takes the net per-bucket changes since the previous call.
    pub fn consume_bucket_deltas(&mut self) -> Vec<BucketDelta> {
        self.deltas.consume()
    }

    /// Current world rectangle of an indexed fragment.
    pub fn entry_aabb(&self, fragment: FragmentId) -> Option<Aabb> {
        self.fragments.get(&fragment).copied()
    }

    /// Visits every fragment intersecting `aabb`, splitting the query at the
    /// world seams first. Each fragment is visited once.
    pub fn query_range(&self, aabb: Aabb, collector: &mut dyn FnMut(FragmentId, Aabb)) -> usize {
        let wrapped = self
            .space
            .wrap_aabb(aabb, self.layout.world_side_f32());
        if !wrapped.is_split() {
            return wrapped.base().map_or(0, |base| {
                self.index.query_range(base, &mut |entry| {
                    collector(FragmentId::from_raw(entry.id), entry.aabb)
                })
            });
        }
        let mut seen = HashSet::new();
        let mut count = 0;
        for piece in wrapped.pieces() {
            self.index.query_range(piece.rect, &mut |entry| {
                if seen.insert(entry.id) {
                    collector(FragmentId::from_raw(entry.id), entry.aabb);
                    count += 1;
                }
            });
        }
        count
    }

    fn place(&self, aabb: Aabb) -> Placement {
        let world_side = self.layout.world_side_f32();
        let mut placement = Placement::default();
        self.space
            .wrap_aabb(aabb, world_side)
            .for_each_fragment(|slot, rect| {
                let clamped = rect.clamp_to(world_side);
                if clamped.is_empty() {
                    return;
                }
                placement.mask |= FragmentMask::from_slot(slot);
                placement.rects[slot.index()] = Some(clamped);
            });
        placement
    }

    fn apply_insert(&mut self, entry_id: EntryId, aabb: Aabb, mark_dirty: bool) {
        if self.entries.contains_key(&entry_id) {
            self.apply_update(entry_id, aabb, mark_dirty);
            return;
        }
        let placement = self.place(aabb);
        self.entries.insert(entry_id, placement.mask);

        let layout = self.layout;
        let mut inserts = std::mem::take(&mut self.batch.inserts);
        for (slot, rect) in placement.fragments() {
            let fragment = FragmentId::new(entry_id, slot);
            self.fragments.insert(fragment, rect);
            layout.for_each_bucket(rect, |bucket_index| {
                self.deltas.record(bucket_index, fragment, DeltaOp::Add);
                if mark_dirty {
                    self.dirty.mark(bucket_index);
                }
            });
            inserts.push(IndexEntry::new(fragment.raw(), rect));
        }
        self.index.bulk_insert(&inserts);
        inserts.clear();
        self.batch.inserts = inserts;
    }

    fn apply_remove(&mut self, entry_id: EntryId, mark_dirty: bool) {
        let Some(mask) = self.entries.remove(&entry_id) else {
            return;
        };
        let layout = self.layout;
        let mut removes = std::mem::take(&mut self.batch.removes);
        for slot in mask.slots() {
            let fragment = FragmentId::new(entry_id, slot);
            let Some(rect) = self.fragments.remove(&fragment) else {
                continue;
            };
            layout.for_each_bucket(rect, |bucket_index| {
                self.deltas.record(bucket_index, fragment, DeltaOp::Remove);
                if mark_dirty {
                    self.dirty.mark(bucket_index);
                }
            });
            removes.push(fragment.raw());
        }
        self.index.bulk_remove(&removes);
        removes.clear();
        self.batch.removes = removes;
    }

    fn apply_update(&mut self, entry_id: EntryId, aabb: Aabb, mark_dirty: bool) {
        let Some(previous_mask) = self.entries.get(&entry_id).copied() else {
            self.apply_insert(entry_id, aabb, mark_dirty);
            return;
        };
        let placement = self.place(aabb);
        if placement.mask != previous_mask {
            self.apply_remove(entry_id, mark_dirty);
            self.apply_insert(entry_id, aabb, mark_dirty);
            return;
        }

        let layout = self.layout;
        let mut moves = std::mem::take(&mut self.batch.moves);
        for (slot, rect) in placement.fragments() {
            let fragment = FragmentId::new(entry_id, slot);
            let previous = self.fragments.insert(fragment, rect);
            let previous_range = previous.and_then(|previous| layout.bucket_range(previous));
            let next_range = layout.bucket_range(rect);

            if let Some(previous) = previous {
                layout.for_each_bucket(previous, |bucket_index| {
                    let op = if range_contains(next_range, layout, bucket_index) {
                        DeltaOp::Update
                    } else {
                        DeltaOp::Remove
                    };
                    self.deltas.record(bucket_index, fragment, op);
                    if mark_dirty {
                        self.dirty.mark(bucket_index);
                    }
                });
            }
            layout.for_each_bucket(rect, |bucket_index| {
                if !range_contains(previous_range, layout, bucket_index) {
                    self.deltas.record(bucket_index, fragment, DeltaOp::Add);
                }
                if mark_dirty {
                    self.dirty.mark(bucket_index);
                }
            });
            moves.push(IndexEntry::new(fragment.raw(), rect));
        }
        self.index.bulk_move(&moves);
        moves.clear();
        self.batch.moves = moves;
    }

    fn mark_rect_dirty(&mut self, rect: Aabb) {
        let layout = self.layout;
        let world_side = layout.world_side_f32();
        let dirty = &mut self.dirty;
        self.space
            .wrap_aabb(rect, world_side)
            .for_each_fragment(|_, piece| {
                layout.for_each_bucket(piece, |bucket_index| {
                    dirty.mark(bucket_index);
                });
            });
    }

    fn take_dirty_within(&mut self, cache_rect: Aabb) -> Vec<PlannedBucket> {
        let layout = self.layout;
        let regions: SmallVec<[(BucketRange, f32, f32); 4]> = self
            .space
            .wrap_aabb(cache_rect, layout.world_side_f32())
            .pieces()
            .filter_map(|piece| {
                layout
                    .bucket_range(piece.rect)
                    .map(|range| (range, piece.offset_x, piece.offset_y))
            })
            .collect();
        if regions.is_empty() {
            return Vec::new();
        }

        let region_of = |bucket_index: u32| {
            let (bucket_x, bucket_y) = layout.bucket_coord(bucket_index);
            regions
                .iter()
                .find(|(range, _, _)| range.contains(bucket_x, bucket_y))
                .map(|(_, offset_x, offset_y)| (*offset_x, *offset_y))
        };
        self.dirty
            .take_where(|bucket_index| region_of(bucket_index).is_some())
            .into_iter()
            .map(|index| {
                let world_rect = layout.bucket_aabb(index);
                let (offset_x, offset_y) = region_of(index).unwrap_or((0.0, 0.0));
                PlannedBucket {
                    index,
                    world_rect,
                    cache_rect: world_rect.translate(offset_x, offset_y),
                }
            })
            .collect()
    }
}

fn range_contains(range: Option<BucketRange>, layout: BucketLayout, bucket_index: u32) -> bool {
    let (bucket_x, bucket_y) = layout.bucket_coord(bucket_index);
    range.is_some_and(|range| range.contains(bucket_x, bucket_y))
}
