//! Per-bucket add/remove/update bookkeeping.
//!
//! Mutations append to a per-bucket op log; nothing is resolved until
//! [`DeltaAccumulator::consume`], which folds each fragment's ops in order:
//!
//! | pending \ op | add      | remove   | update   |
//! |--------------|----------|----------|----------|
//! | none         | added    | removed  | updated  |
//! | added        | added    | none     | added    |
//! | removed      | none     | removed  | removed  |
//! | updated      | added    | removed  | updated  |
//!
//! A remove followed by an add cancels out. Geometry changes hidden that way
//! still reach the renderer through the dirty set.

use std::collections::HashMap;

use crate::fragment::FragmentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeltaOp {
    Add,
    Remove,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetDelta {
    Added,
    Removed,
    Updated,
}

impl NetDelta {
    fn apply(pending: Option<NetDelta>, op: DeltaOp) -> Option<NetDelta> {
        match (pending, op) {
            (None, DeltaOp::Add) => Some(NetDelta::Added),
            (None, DeltaOp::Remove) => Some(NetDelta::Removed),
            (None, DeltaOp::Update) => Some(NetDelta::Updated),
            (Some(NetDelta::Added), DeltaOp::Remove) => None,
            (Some(NetDelta::Added), _) => Some(NetDelta::Added),
            (Some(NetDelta::Removed), DeltaOp::Add) => None,
            (Some(NetDelta::Removed), _) => Some(NetDelta::Removed),
            (Some(NetDelta::Updated), DeltaOp::Add) => Some(NetDelta::Added),
            (Some(NetDelta::Updated), DeltaOp::Remove) => Some(NetDelta::Removed),
            (Some(NetDelta::Updated), DeltaOp::Update) => Some(NetDelta::Updated),
        }
    }
}

/// Net change of one bucket since the previous consume. Each fragment id
/// appears in at most one list; lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketDelta {
    pub bucket_index: u32,
    pub added: Vec<FragmentId>,
    pub removed: Vec<FragmentId>,
    pub updated: Vec<FragmentId>,
}

impl BucketDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

type OpLog = Vec<(FragmentId, DeltaOp)>;

#[derive(Debug, Default)]
pub(crate) struct DeltaAccumulator {
    logs: HashMap<u32, OpLog>,
    spare_logs: Vec<OpLog>,
    fold_order: Vec<FragmentId>,
    fold_state: HashMap<FragmentId, Option<NetDelta>>,
}

impl DeltaAccumulator {
    pub(crate) fn record(&mut self, bucket_index: u32, fragment: FragmentId, op: DeltaOp) {
        let spare_logs = &mut self.spare_logs;
        self.logs
            .entry(bucket_index)
            .or_insert_with(|| spare_logs.pop().unwrap_or_default())
            .push((fragment, op));
    }

    #[cfg(test)]
    pub(crate) fn pending_buckets(&self) -> usize {
        self.logs.len()
    }

    pub(crate) fn consume(&mut self) -> Vec<BucketDelta> {
        let mut bucket_indices: Vec<u32> = self.logs.keys().copied().collect();
        bucket_indices.sort_unstable();

        let mut deltas = Vec::with_capacity(bucket_indices.len());
        for bucket_index in bucket_indices {
            let Some(mut log) = self.logs.remove(&bucket_index) else {
                continue;
            };
            let delta = self.fold(bucket_index, &log);
            log.clear();
            self.spare_logs.push(log);
            if !delta.is_empty() {
                deltas.push(delta);
            }
        }
        deltas
    }

    fn fold(&mut self, bucket_index: u32, log: &OpLog) -> BucketDelta {
        self.fold_order.clear();
        self.fold_state.clear();
        for (fragment, op) in log {
            let pending = self.fold_state.entry(*fragment).or_insert_with(|| {
                self.fold_order.push(*fragment);
                None
            });
            *pending = NetDelta::apply(*pending, *op);
        }

        let mut delta = BucketDelta {
            bucket_index,
            ..BucketDelta::default()
        };
        for fragment in &self.fold_order {
            match self.fold_state.get(fragment).copied().flatten() {
                Some(NetDelta::Added) => delta.added.push(*fragment),
                Some(NetDelta::Removed) => delta.removed.push(*fragment),
                Some(NetDelta::Updated) => delta.updated.push(*fragment),
                None => {}
            }
        }
        delta.added.sort_unstable();
        delta.removed.sort_unstable();
        delta.updated.sort_unstable();
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use space::WrapSlot;

    fn fragment(entry_id: u64) -> FragmentId {
        FragmentId::new(entry_id, WrapSlot::Base)
    }

    fn consume_single(ops: &[DeltaOp]) -> Vec<BucketDelta> {
        let mut accumulator = DeltaAccumulator::default();
        for op in ops {
            accumulator.record(3, fragment(1), *op);
        }
        accumulator.consume()
    }

    #[test]
    fn add_then_remove_leaves_nothing() {
        assert!(consume_single(&[DeltaOp::Add, DeltaOp::Remove]).is_empty());
    }

    #[test]
    fn remove_then_add_cancels_out() {
        assert!(consume_single(&[DeltaOp::Remove, DeltaOp::Add]).is_empty());
        assert!(consume_single(&[DeltaOp::Update, DeltaOp::Remove, DeltaOp::Add]).is_empty());

        let deltas = consume_single(&[DeltaOp::Remove, DeltaOp::Add, DeltaOp::Update]);
        assert_eq!(deltas[0].updated, vec![fragment(1)]);
    }

    #[test]
    fn repeated_add_stays_added() {
        let deltas = consume_single(&[DeltaOp::Add, DeltaOp::Update, DeltaOp::Add]);
        assert_eq!(deltas[0].added, vec![fragment(1)]);
        assert!(deltas[0].updated.is_empty());
    }

    #[test]
    fn remove_clears_pending_update() {
        let deltas = consume_single(&[DeltaOp::Update, DeltaOp::Remove]);
        assert_eq!(deltas[0].removed, vec![fragment(1)]);
        assert!(deltas[0].updated.is_empty());
    }

    #[test]
    fn consume_resets_and_orders_buckets() {
        let mut accumulator = DeltaAccumulator::default();
        accumulator.record(9, fragment(2), DeltaOp::Add);
        accumulator.record(1, fragment(4), DeltaOp::Update);
        accumulator.record(1, fragment(3), DeltaOp::Update);
        assert_eq!(accumulator.pending_buckets(), 2);

        let deltas = accumulator.consume();
        assert_eq!(
            deltas
                .iter()
                .map(|delta| delta.bucket_index)
                .collect::<Vec<_>>(),
            vec![1, 9]
        );
        assert_eq!(deltas[0].updated, vec![fragment(3), fragment(4)]);
        assert_eq!(accumulator.pending_buckets(), 0);
        assert!(accumulator.consume().is_empty());
    }

    proptest! {
        /// Valid op sequences (add only when absent, remove/update only when
        /// present) collapse to the net effect.
        #[test]
        fn delta_matches_net_effect(
            present_before in any::<bool>(),
            choices in proptest::collection::vec(any::<bool>(), 0..12),
        ) {
            let mut present = present_before;
            let mut ops = Vec::new();
            for remove_or_add in choices {
                let op = match (present, remove_or_add) {
                    (false, _) => DeltaOp::Add,
                    (true, true) => DeltaOp::Remove,
                    (true, false) => DeltaOp::Update,
                };
                present = op != DeltaOp::Remove;
                ops.push(op);
            }

            let deltas = consume_single(&ops);
            let id = fragment(1);
            let (added, removed, updated) = deltas
                .first()
                .map(|delta| {
                    (
                        delta.added.contains(&id),
                        delta.removed.contains(&id),
                        delta.updated.contains(&id),
                    )
                })
                .unwrap_or((false, false, false));
            prop_assert!(u8::from(added) + u8::from(removed) + u8::from(updated) <= 1);

            match (present_before, present) {
                (false, false) => prop_assert!(deltas.is_empty()),
                (false, true) => prop_assert!(added),
                (true, false) => prop_assert!(removed),
                (true, true) => prop_assert!(!added && !removed),
            }
        }
    }
}
