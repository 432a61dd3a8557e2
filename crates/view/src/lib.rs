//! Visible window into world space.
//!
//! The viewport owns the camera origin and size and normalizes every origin
//! write against the world (wrap on toroidal worlds, clamp otherwise). A
//! version counter bumps on every accepted change so the render loop can tell
//! "the view moved" without comparing rectangles.

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use space::{Aabb, EuclideanSpace, Space, ToroidalSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportError {
    InvalidSize,
    InvalidWorld,
    NonFiniteValue,
}

impl fmt::Display for ViewportError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewportError::InvalidSize => write!(formatter, "viewport size must be positive"),
            ViewportError::InvalidWorld => write!(formatter, "world side must be positive"),
            ViewportError::NonFiniteValue => write!(formatter, "viewport value is not finite"),
        }
    }
}

impl std::error::Error for ViewportError {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewportState {
    origin_x: f32,
    origin_y: f32,
    width: f32,
    height: f32,
}

impl ViewportState {
    fn rect(&self) -> Aabb {
        Aabb::from_origin_size(self.origin_x, self.origin_y, self.width, self.height)
    }
}

/// Rectangle and version read under one lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSnapshot {
    pub rect: Aabb,
    pub version: u64,
}

#[derive(Debug)]
pub struct Viewport {
    world_side: f32,
    wrapping: bool,
    state: Mutex<ViewportState>,
    version: AtomicU64,
}

impl Viewport {
    pub fn new(
        width: f32,
        height: f32,
        world_side: f32,
        wrapping: bool,
    ) -> Result<Self, ViewportError> {
        if !world_side.is_finite() || world_side <= 0.0 {
            return Err(ViewportError::InvalidWorld);
        }
        check_size(width, height)?;
        Ok(Self {
            world_side,
            wrapping,
            state: Mutex::new(ViewportState {
                origin_x: 0.0,
                origin_y: 0.0,
                width,
                height,
            }),
            version: AtomicU64::new(0),
        })
    }

    pub fn world_side(&self) -> f32 {
        self.world_side
    }

    pub fn is_wrapping(&self) -> bool {
        self.wrapping
    }

    pub fn rect(&self) -> Aabb {
        self.lock_state().rect()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ViewportSnapshot {
        let state = self.lock_state();
        ViewportSnapshot {
            rect: state.rect(),
            version: self.version.load(Ordering::Acquire),
        }
    }

    /// Returns whether the normalized origin differs from the current one.
    pub fn set_origin(&self, origin_x: f32, origin_y: f32) -> Result<bool, ViewportError> {
        if !origin_x.is_finite() || !origin_y.is_finite() {
            return Err(ViewportError::NonFiniteValue);
        }
        let mut state = self.lock_state();
        let next = ViewportState {
            origin_x: self.normalize(origin_x, state.width),
            origin_y: self.normalize(origin_y, state.height),
            ..*state
        };
        Ok(self.commit(&mut state, next))
    }

    pub fn move_by(&self, delta_x: f32, delta_y: f32) -> Result<bool, ViewportError> {
        if !delta_x.is_finite() || !delta_y.is_finite() {
            return Err(ViewportError::NonFiniteValue);
        }
        let mut state = self.lock_state();
        let target_x = state.origin_x + delta_x;
        let target_y = state.origin_y + delta_y;
        if !target_x.is_finite() || !target_y.is_finite() {
            return Err(ViewportError::NonFiniteValue);
        }
        let next = ViewportState {
            origin_x: self.normalize(target_x, state.width),
            origin_y: self.normalize(target_y, state.height),
            ..*state
        };
        Ok(self.commit(&mut state, next))
    }

    /// Resizes and re-normalizes the origin, which may move on clamped worlds.
    pub fn resize(&self, width: f32, height: f32) -> Result<bool, ViewportError> {
        check_size(width, height)?;
        let mut state = self.lock_state();
        let next = ViewportState {
            origin_x: self.normalize(state.origin_x, width),
            origin_y: self.normalize(state.origin_y, height),
            width,
            height,
        };
        Ok(self.commit(&mut state, next))
    }

    fn normalize(&self, value: f32, extent: f32) -> f32 {
        if self.wrapping {
            ToroidalSpace.normalize_coord(value, self.world_side)
        } else {
            EuclideanSpace.normalize_coord(value, (self.world_side - extent).max(0.0))
        }
    }

    fn commit(&self, state: &mut ViewportState, next: ViewportState) -> bool {
        if *state == next {
            return false;
        }
        *state = next;
        self.version.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ViewportState> {
        self.state
            .lock()
            .unwrap_or_else(|_| panic!("viewport state lock poisoned"))
    }
}

fn check_size(width: f32, height: f32) -> Result<(), ViewportError> {
    if !width.is_finite() || !height.is_finite() {
        return Err(ViewportError::NonFiniteValue);
    }
    if width <= 0.0 || height <= 0.0 {
        return Err(ViewportError::InvalidSize);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewObservation {
    pub rect: Aabb,
    pub version: u64,
    pub changed: bool,
}

/// Render-loop side of the version check: remembers the last version it saw.
#[derive(Debug, Default)]
pub struct ViewTracker {
    last_version: Option<u64>,
}

impl ViewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first observation always reports a change.
    pub fn observe(&mut self, viewport: &Viewport) -> ViewObservation {
        let snapshot = viewport.snapshot();
        let changed = self
            .last_version
            .is_none_or(|last_version| last_version != snapshot.version);
        self.last_version = Some(snapshot.version);
        ViewObservation {
            rect: snapshot.rect,
            version: snapshot.version,
            changed,
        }
    }

    pub fn reset(&mut self) {
        self.last_version = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_origin_reduces_modulo_world() {
        let viewport = Viewport::new(100.0, 80.0, 256.0, true).expect("viewport");

        assert!(viewport.set_origin(300.0, -10.0).expect("set origin"));
        assert_eq!(viewport.rect(), Aabb::new(44.0, 246.0, 144.0, 326.0));
        assert_eq!(viewport.version(), 1);
    }

    #[test]
    fn clamped_origin_stays_inside_world() {
        let viewport = Viewport::new(100.0, 80.0, 256.0, false).expect("viewport");

        viewport.set_origin(300.0, -10.0).expect("set origin");
        assert_eq!(viewport.rect(), Aabb::new(156.0, 0.0, 256.0, 80.0));
    }

    #[test]
    fn viewport_larger_than_world_pins_to_origin() {
        let viewport = Viewport::new(512.0, 512.0, 256.0, false).expect("viewport");

        assert!(!viewport.move_by(40.0, 40.0).expect("move"));
        assert_eq!(viewport.rect(), Aabb::new(0.0, 0.0, 512.0, 512.0));
        assert_eq!(viewport.version(), 0);
    }

    #[test]
    fn no_op_moves_do_not_bump_version() {
        let viewport = Viewport::new(100.0, 100.0, 256.0, false).expect("viewport");

        assert!(!viewport.move_by(0.0, 0.0).expect("move"));
        assert!(!viewport.move_by(-20.0, -20.0).expect("move"));
        assert!(viewport.move_by(10.0, 0.0).expect("move"));
        assert!(!viewport.set_origin(10.0, 0.0).expect("set origin"));
        assert_eq!(viewport.version(), 1);
    }

    #[test]
    fn wrapping_full_turn_is_a_no_op() {
        let viewport = Viewport::new(64.0, 64.0, 256.0, true).expect("viewport");

        viewport.set_origin(32.0, 32.0).expect("set origin");
        assert!(!viewport.move_by(256.0, -256.0).expect("move"));
        assert_eq!(viewport.version(), 1);
    }

    #[test]
    fn resize_reclamps_origin() {
        let viewport = Viewport::new(100.0, 100.0, 256.0, false).expect("viewport");
        viewport.set_origin(150.0, 150.0).expect("set origin");

        assert!(viewport.resize(200.0, 100.0).expect("resize"));
        assert_eq!(viewport.rect(), Aabb::new(56.0, 150.0, 256.0, 250.0));
        assert_eq!(viewport.version(), 2);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(
            Viewport::new(0.0, 10.0, 256.0, true).err(),
            Some(ViewportError::InvalidSize)
        );
        assert_eq!(
            Viewport::new(10.0, 10.0, 0.0, true).err(),
            Some(ViewportError::InvalidWorld)
        );
        let viewport = Viewport::new(10.0, 10.0, 256.0, true).expect("viewport");
        assert_eq!(
            viewport.move_by(f32::NAN, 0.0),
            Err(ViewportError::NonFiniteValue)
        );
        assert_eq!(viewport.version(), 0);
    }

    #[test]
    fn tracker_reports_changes_once() {
        let viewport = Viewport::new(64.0, 64.0, 256.0, true).expect("viewport");
        let mut tracker = ViewTracker::new();

        assert!(tracker.observe(&viewport).changed);
        assert!(!tracker.observe(&viewport).changed);
        viewport.move_by(8.0, 0.0).expect("move");
        let observation = tracker.observe(&viewport);
        assert!(observation.changed);
        assert_eq!(observation.rect.min_x, 8.0);
        assert!(!tracker.observe(&viewport).changed);
    }

    #[test]
    fn concurrent_moves_each_bump_version() {
        let viewport = Viewport::new(16.0, 16.0, 1024.0, true).expect("viewport");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        viewport.move_by(1.0, 0.0).expect("move");
                    }
                });
            }
        });

        assert_eq!(viewport.version(), 100);
        assert_eq!(viewport.rect().min_x, 100.0);
    }
}
