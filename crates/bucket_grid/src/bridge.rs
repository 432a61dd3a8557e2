use std::collections::HashMap;
use std::fmt;

use space::Aabb;

use crate::fragment::EntryId;
use crate::multi::LayerKey;
use crate::op_queue::{BucketGridQueue, QueueError};

/// Drawable lifecycle event as emitted by scene code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneEvent {
    Added {
        layer: LayerKey,
        entry_id: EntryId,
        aabb: Aabb,
    },
    Removed {
        layer: LayerKey,
        entry_id: EntryId,
    },
    Moved {
        layer: LayerKey,
        entry_id: EntryId,
        aabb: Aabb,
    },
    /// Region whose pixels changed without any shape moving.
    Damaged { layer: LayerKey, rect: Aabb },
}

impl SceneEvent {
    pub fn layer(&self) -> LayerKey {
        match self {
            SceneEvent::Added { layer, .. }
            | SceneEvent::Removed { layer, .. }
            | SceneEvent::Moved { layer, .. }
            | SceneEvent::Damaged { layer, .. } => *layer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    UnknownLayer(LayerKey),
    Queue(QueueError),
}

impl From<QueueError> for BridgeError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::UnknownLayer(layer) => {
                write!(formatter, "no bucket grid registered for layer {}", layer.0)
            }
            BridgeError::Queue(error) => write!(formatter, "scene event not queued: {error}"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Routes scene events into the owning layer's operation queue.
///
/// Holds only producer handles, so it can live on the scene thread while the
/// render loop owns the managers.
#[derive(Debug, Clone, Default)]
pub struct SceneBridge {
    queues: HashMap<LayerKey, BucketGridQueue>,
}

impl SceneBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, layer: LayerKey, queue: BucketGridQueue) {
        self.queues.insert(layer, queue);
    }

    pub fn detach(&mut self, layer: LayerKey) -> bool {
        self.queues.remove(&layer).is_some()
    }

    pub fn dispatch(&self, event: SceneEvent) -> Result<(), BridgeError> {
        let layer = event.layer();
        let Some(queue) = self.queues.get(&layer) else {
            log::warn!("scene event for unknown layer {layer:?} dropped");
            return Err(BridgeError::UnknownLayer(layer));
        };
        match event {
            SceneEvent::Added { entry_id, aabb, .. } => queue.queue_insert(entry_id, aabb, true)?,
            SceneEvent::Removed { entry_id, .. } => queue.queue_remove(entry_id)?,
            SceneEvent::Moved { entry_id, aabb, .. } => queue.queue_update(entry_id, aabb, true)?,
            SceneEvent::Damaged { rect, .. } => queue.queue_dirty_rect(rect)?,
        }
        Ok(())
    }

    /// Dispatches in order, stopping at the first failure.
    pub fn dispatch_all(
        &self,
        events: impl IntoIterator<Item = SceneEvent>,
    ) -> Result<usize, BridgeError> {
        let mut dispatched = 0;
        for event in events {
            self.dispatch(event)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}
