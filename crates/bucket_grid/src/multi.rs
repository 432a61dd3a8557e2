//! One grid manager per layer of a pane, planned together each frame.

use std::collections::HashMap;
use std::sync::Arc;

use space::{Aabb, Space};
use view::{ViewTracker, Viewport};

use crate::bridge::SceneBridge;
use crate::delta::BucketDelta;
use crate::manager::{BucketGridManager, BucketPlan};
use crate::{BucketGridConfig, BucketGridError};

/// Caller-chosen identity of a layer within one pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey(pub u32);

#[derive(Debug, Clone)]
pub struct MultiBucketGridConfig {
    pub space: Arc<dyn Space>,
    /// Defaults for layers that leave fields at zero.
    pub grid: BucketGridConfig,
    pub margin_buckets: u32,
}

impl MultiBucketGridConfig {
    pub fn new(space: Arc<dyn Space>) -> Self {
        Self {
            space,
            grid: BucketGridConfig::default(),
            margin_buckets: 1,
        }
    }
}

/// Per-layer overrides; zero or `None` means "use the pane default".
#[derive(Debug, Clone, Default)]
pub struct LayerConfig {
    pub space: Option<Arc<dyn Space>>,
    pub world_resolution: u32,
    pub bucket_resolution: u32,
    pub bucket_capacity: usize,
    pub queue_capacity: usize,
}

impl LayerConfig {
    fn resolve(&self, defaults: &MultiBucketGridConfig) -> (Arc<dyn Space>, BucketGridConfig) {
        let space = self
            .space
            .clone()
            .unwrap_or_else(|| defaults.space.clone());
        let fallback = defaults.grid;
        let config = BucketGridConfig {
            world_resolution: nonzero_or(self.world_resolution, fallback.world_resolution),
            bucket_resolution: nonzero_or(self.bucket_resolution, fallback.bucket_resolution),
            bucket_capacity: nonzero_or(self.bucket_capacity, fallback.bucket_capacity),
            queue_capacity: nonzero_or(self.queue_capacity, fallback.queue_capacity),
            overflow: fallback.overflow,
        };
        (space, config)
    }
}

fn nonzero_or<T: Default + PartialEq>(value: T, fallback: T) -> T {
    if value == T::default() { fallback } else { value }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlan {
    pub key: LayerKey,
    pub plan: BucketPlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDeltas {
    pub key: LayerKey,
    pub deltas: Vec<BucketDelta>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub view_rect: Aabb,
    pub view_changed: bool,
    pub layer_plans: Vec<LayerPlan>,
    /// View-local regions to re-composite from the layer caches.
    pub composite_rects: Vec<Aabb>,
}

impl FramePlan {
    pub fn is_idle(&self) -> bool {
        self.composite_rects.is_empty()
    }

    pub fn layer_plan(&self, key: LayerKey) -> Option<&BucketPlan> {
        self.layer_plans
            .iter()
            .find(|layer_plan| layer_plan.key == key)
            .map(|layer_plan| &layer_plan.plan)
    }
}

#[derive(Debug)]
pub struct MultiBucketGridManager {
    config: MultiBucketGridConfig,
    layers: HashMap<LayerKey, BucketGridManager>,
}

impl MultiBucketGridManager {
    pub fn new(config: MultiBucketGridConfig) -> Self {
        Self {
            config,
            layers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &MultiBucketGridConfig {
        &self.config
    }

    /// Creates the manager for `key`, replacing any existing one.
    pub fn register(
        &mut self,
        key: LayerKey,
        layer_config: LayerConfig,
    ) -> Result<(), BucketGridError> {
        let (space, config) = layer_config.resolve(&self.config);
        let manager = BucketGridManager::new(space, config)?;
        if self.layers.insert(key, manager).is_some() {
            log::debug!("replaced bucket grid layer {key:?}");
        } else {
            log::debug!(
                "registered bucket grid layer {key:?}: world 2^{}, buckets 2^{}",
                config.world_resolution,
                config.bucket_resolution
            );
        }
        Ok(())
    }

    pub fn unregister(&mut self, key: LayerKey) -> Option<BucketGridManager> {
        self.layers.remove(&key)
    }

    pub fn contains(&self, key: LayerKey) -> bool {
        self.layers.contains_key(&key)
    }

    pub fn layer(&self, key: LayerKey) -> Option<&BucketGridManager> {
        self.layers.get(&key)
    }

    pub fn layer_mut(&mut self, key: LayerKey) -> Option<&mut BucketGridManager> {
        self.layers.get_mut(&key)
    }

    pub fn layer_keys(&self) -> Vec<LayerKey> {
        let mut keys: Vec<LayerKey> = self.layers.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Plans every layer in `keys` (unknown keys are skipped) and derives the
    /// composite rectangles for the pane.
    pub fn build_frame(
        &mut self,
        view_rect: Aabb,
        view_changed: bool,
        keys: &[LayerKey],
    ) -> FramePlan {
        let margin_buckets = self.config.margin_buckets;
        let mut layer_plans = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(manager) = self.layers.get_mut(key) else {
                log::trace!("build_frame skipped unknown layer {key:?}");
                continue;
            };
            layer_plans.push(LayerPlan {
                key: *key,
                plan: manager.plan(view_rect, margin_buckets),
            });
        }

        let composite_rects = if view_changed {
            let full_view = Aabb::new(0.0, 0.0, view_rect.width(), view_rect.height());
            if full_view.is_empty() {
                Vec::new()
            } else {
                vec![full_view]
            }
        } else {
            self.dirty_composite_rects(view_rect, &layer_plans)
        };

        FramePlan {
            view_rect,
            view_changed,
            layer_plans,
            composite_rects,
        }
    }

    /// [`Self::build_frame`] driven by a viewport and the caller's tracker.
    pub fn build_frame_for_viewport(
        &mut self,
        viewport: &Viewport,
        tracker: &mut ViewTracker,
        keys: &[LayerKey],
    ) -> FramePlan {
        let observation = tracker.observe(viewport);
        self.build_frame(observation.rect, observation.changed, keys)
    }

    pub fn consume_bucket_deltas(&mut self, keys: &[LayerKey]) -> Vec<LayerDeltas> {
        keys.iter()
            .filter_map(|key| {
                let deltas = self.layers.get_mut(key)?.consume_bucket_deltas();
                (!deltas.is_empty()).then_some(LayerDeltas { key: *key, deltas })
            })
            .collect()
    }

    /// Producer-side router over the currently registered layers.
    pub fn bridge(&self) -> SceneBridge {
        let mut bridge = SceneBridge::new();
        for (key, manager) in &self.layers {
            bridge.attach(*key, manager.queue());
        }
        bridge
    }

    fn dirty_composite_rects(&self, view_rect: Aabb, layer_plans: &[LayerPlan]) -> Vec<Aabb> {
        let mut rects = Vec::new();
        for layer_plan in layer_plans {
            let Some(manager) = self.layers.get(&layer_plan.key) else {
                continue;
            };
            let view_pieces = manager
                .space()
                .wrap_aabb(view_rect, manager.layout().world_side_f32());
            for bucket in &layer_plan.plan.dirty_buckets {
                for piece in view_pieces.pieces() {
                    let Some(overlap) = bucket.world_rect.intersection(&piece.rect) else {
                        continue;
                    };
                    rects.push(overlap.translate(
                        piece.offset_x - view_rect.min_x,
                        piece.offset_y - view_rect.min_y,
                    ));
                }
            }
        }
        rects.sort_by(|left, right| {
            left.min_y
                .total_cmp(&right.min_y)
                .then(left.min_x.total_cmp(&right.min_x))
                .then(left.max_y.total_cmp(&right.max_y))
                .then(left.max_x.total_cmp(&right.max_x))
        });
        rects.dedup();
        rects
    }
}
