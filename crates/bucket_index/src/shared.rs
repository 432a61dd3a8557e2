use std::sync::{Arc, RwLock};

use space::Aabb;

use crate::{BucketIndex, IndexEntry};

/// Lock-wrapped index: one writer (the flushing grid manager) and any number
/// of readers on other threads.
///
/// Each bulk call takes the write lock once, so readers see the state before
/// or after a whole bulk call, never part of one.
#[derive(Clone)]
pub struct SharedBucketIndex {
    inner: Arc<RwLock<dyn BucketIndex>>,
}

/// Read-only handle onto a [`SharedBucketIndex`].
#[derive(Clone)]
pub struct BucketIndexReader {
    inner: Arc<RwLock<dyn BucketIndex>>,
}

impl SharedBucketIndex {
    pub fn new(index: impl BucketIndex + 'static) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub fn reader(&self) -> BucketIndexReader {
        BucketIndexReader {
            inner: self.inner.clone(),
        }
    }
}

impl BucketIndex for SharedBucketIndex {
    fn bulk_insert(&mut self, entries: &[IndexEntry]) {
        if entries.is_empty() {
            return;
        }
        self.inner
            .write()
            .unwrap_or_else(|_| panic!("bucket index write lock poisoned"))
            .bulk_insert(entries);
    }

    fn bulk_remove(&mut self, ids: &[u64]) {
        if ids.is_empty() {
            return;
        }
        self.inner
            .write()
            .unwrap_or_else(|_| panic!("bucket index write lock poisoned"))
            .bulk_remove(ids);
    }

    fn bulk_move(&mut self, entries: &[IndexEntry]) {
        if entries.is_empty() {
            return;
        }
        self.inner
            .write()
            .unwrap_or_else(|_| panic!("bucket index write lock poisoned"))
            .bulk_move(entries);
    }

    fn query_range(&self, aabb: Aabb, collector: &mut dyn FnMut(IndexEntry)) -> usize {
        self.reader().query_range(aabb, collector)
    }

    fn entry_aabb(&self, id: u64) -> Option<Aabb> {
        self.reader().entry_aabb(id)
    }

    fn len(&self) -> usize {
        self.reader().len()
    }
}

impl BucketIndexReader {
    pub fn query_range(&self, aabb: Aabb, collector: &mut dyn FnMut(IndexEntry)) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|_| panic!("bucket index read lock poisoned"))
            .query_range(aabb, collector)
    }

    pub fn entry_aabb(&self, id: u64) -> Option<Aabb> {
        self.inner
            .read()
            .unwrap_or_else(|_| panic!("bucket index read lock poisoned"))
            .entry_aabb(id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|_| panic!("bucket index read lock poisoned"))
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
