use bitvec::prelude::{BitVec, Lsb0};

/// Buckets awaiting redraw, kept in first-marked order.
#[derive(Debug)]
pub(crate) struct DirtyBucketSet {
    members: BitVec<usize, Lsb0>,
    order: Vec<u32>,
}

impl DirtyBucketSet {
    pub(crate) fn new(bucket_count: usize) -> Self {
        Self {
            members: BitVec::repeat(false, bucket_count),
            order: Vec::new(),
        }
    }

    /// Returns false when the bucket was already dirty.
    pub(crate) fn mark(&mut self, bucket_index: u32) -> bool {
        let slot = bucket_index as usize;
        assert!(
            slot < self.members.len(),
            "bucket {bucket_index} outside dirty set of {} buckets",
            self.members.len()
        );
        if self.members[slot] {
            return false;
        }
        self.members.set(slot, true);
        self.order.push(bucket_index);
        true
    }

    pub(crate) fn contains(&self, bucket_index: u32) -> bool {
        self.members
            .get(bucket_index as usize)
            .is_some_and(|bit| *bit)
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Removes and returns every dirty bucket accepted by `predicate`,
    /// preserving mark order for both the taken and the remaining buckets.
    pub(crate) fn take_where(&mut self, mut predicate: impl FnMut(u32) -> bool) -> Vec<u32> {
        let mut taken = Vec::new();
        let members = &mut self.members;
        self.order.retain(|bucket_index| {
            if !predicate(*bucket_index) {
                return true;
            }
            members.set(*bucket_index as usize, false);
            taken.push(*bucket_index);
            false
        });
        taken
    }
}
