use std::collections::{HashMap, HashSet};

use space::Aabb;

use crate::{BucketIndex, BucketLayout, IndexEntry};

/// Uniform grid index. Buckets are allocated on first use with room for
/// `bucket_capacity` ids.
#[derive(Debug)]
pub struct GridBucketIndex {
    layout: BucketLayout,
    bucket_capacity: usize,
    buckets: HashMap<u32, Vec<u64>>,
    entries: HashMap<u64, Aabb>,
}

impl GridBucketIndex {
    pub fn new(layout: BucketLayout, bucket_capacity: usize) -> Self {
        Self {
            layout,
            bucket_capacity,
            buckets: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn layout(&self) -> BucketLayout {
        self.layout
    }

    pub fn bucket_ids(&self, bucket_index: u32) -> &[u64] {
        self.buckets
            .get(&bucket_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn link(&mut self, id: u64, aabb: Aabb) {
        let capacity = self.bucket_capacity;
        let buckets = &mut self.buckets;
        self.layout.for_each_bucket(aabb, |bucket_index| {
            buckets
                .entry(bucket_index)
                .or_insert_with(|| Vec::with_capacity(capacity))
                .push(id);
        });
    }

    fn unlink(&mut self, id: u64, aabb: Aabb) {
        let buckets = &mut self.buckets;
        self.layout.for_each_bucket(aabb, |bucket_index| {
            let Some(ids) = buckets.get_mut(&bucket_index) else {
                return;
            };
            if let Some(position) = ids.iter().position(|candidate| *candidate == id) {
                ids.swap_remove(position);
            }
            if ids.is_empty() {
                buckets.remove(&bucket_index);
            }
        });
    }
}

impl BucketIndex for GridBucketIndex {
    fn bulk_insert(&mut self, entries: &[IndexEntry]) {
        for entry in entries {
            if let Some(previous) = self.entries.insert(entry.id, entry.aabb) {
                self.unlink(entry.id, previous);
            }
            self.link(entry.id, entry.aabb);
        }
    }

    fn bulk_remove(&mut self, ids: &[u64]) {
        for id in ids {
            if let Some(previous) = self.entries.remove(id) {
                self.unlink(*id, previous);
            }
        }
    }

    fn bulk_move(&mut self, entries: &[IndexEntry]) {
        // Insert already replaces an existing entry.
        self.bulk_insert(entries);
    }

    fn query_range(&self, aabb: Aabb, collector: &mut dyn FnMut(IndexEntry)) -> usize {
        let Some(range) = self.layout.bucket_range(aabb) else {
            return 0;
        };
        let mut seen = HashSet::new();
        let mut count = 0;
        for bucket_y in range.min_y..=range.max_y {
            for bucket_x in range.min_x..=range.max_x {
                let bucket_index = self.layout.bucket_index(bucket_x, bucket_y);
                for id in self.bucket_ids(bucket_index) {
                    let Some(entry_aabb) = self.entries.get(id) else {
                        continue;
                    };
                    if !entry_aabb.intersects(&aabb) || !seen.insert(*id) {
                        continue;
                    }
                    collector(IndexEntry::new(*id, *entry_aabb));
                    count += 1;
                }
            }
        }
        count
    }

    fn entry_aabb(&self, id: u64) -> Option<Aabb> {
        self.entries.get(&id).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> GridBucketIndex {
        GridBucketIndex::new(BucketLayout::new(8, 6).expect("layout"), 4)
    }

    fn collect(index: &GridBucketIndex, aabb: Aabb) -> Vec<u64> {
        let mut ids = Vec::new();
        let count = index.query_range(aabb, &mut |entry| ids.push(entry.id));
        assert_eq!(count, ids.len());
        ids.sort_unstable();
        ids
    }

    #[test]
    fn spanning_entry_is_reported_once() {
        let mut index = index();
        index.bulk_insert(&[IndexEntry::new(7, Aabb::new(60.0, 60.0, 70.0, 70.0))]);

        assert_eq!(index.bucket_ids(0), &[7]);
        assert_eq!(index.bucket_ids(5), &[7]);
        assert_eq!(collect(&index, Aabb::new(0.0, 0.0, 256.0, 256.0)), vec![7]);
    }

    #[test]
    fn query_filters_by_intersection_not_bucket() {
        let mut index = index();
        index.bulk_insert(&[
            IndexEntry::new(1, Aabb::new(0.0, 0.0, 10.0, 10.0)),
            IndexEntry::new(2, Aabb::new(40.0, 40.0, 50.0, 50.0)),
        ]);

        assert_eq!(collect(&index, Aabb::new(0.0, 0.0, 20.0, 20.0)), vec![1]);
    }

    #[test]
    fn move_relinks_buckets() {
        let mut index = index();
        index.bulk_insert(&[IndexEntry::new(3, Aabb::new(0.0, 0.0, 10.0, 10.0))]);
        index.bulk_move(&[IndexEntry::new(3, Aabb::new(200.0, 200.0, 210.0, 210.0))]);

        assert!(index.bucket_ids(0).is_empty());
        assert_eq!(index.bucket_ids(15), &[3]);
        assert_eq!(
            index.entry_aabb(3),
            Some(Aabb::new(200.0, 200.0, 210.0, 210.0))
        );
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_ignores_unknown_ids() {
        let mut index = index();
        index.bulk_insert(&[IndexEntry::new(3, Aabb::new(0.0, 0.0, 10.0, 10.0))]);
        index.bulk_remove(&[3, 99]);

        assert!(index.is_empty());
        assert!(index.entry_aabb(3).is_none());
        assert!(collect(&index, Aabb::new(0.0, 0.0, 256.0, 256.0)).is_empty());
    }
}
