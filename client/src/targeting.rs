//! Tile cursor used by planting, attacking and fence placement
//!
//! A targeting session starts on the player's tile and ends exactly once,
//! either confirmed with the chosen tile or cancelled. The completion
//! callback is an `FnOnce`, so it cannot fire twice for the same session.

use log::debug;
use shared::{Direction, TileKey, TILE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// The target stays within one tile of the origin, diagonals included
    Adjacent,
    /// The target may travel up to the configured max range
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOutcome {
    Confirmed(TileKey),
    Cancelled,
}

pub type TargetCallback = Box<dyn FnOnce(TargetOutcome)>;

/// Decides whether the cursor currently points at a usable tile
pub trait TargetValidator {
    fn is_valid(&self, target: TileKey) -> bool;
}

impl<F> TargetValidator for F
where
    F: Fn(TileKey) -> bool,
{
    fn is_valid(&self, target: TileKey) -> bool {
        self(target)
    }
}

/// Maps screen coordinates back into world space
pub trait CameraProjection {
    fn screen_to_world(&self, screen_x: f32, screen_y: f32) -> (f32, f32);
}

pub struct TargetingSystem {
    active: bool,
    origin: TileKey,
    target: TileKey,
    mode: TargetMode,
    /// Euclidean limit in world units for `TargetMode::Range`
    max_range: Option<f32>,
    validator: Option<Box<dyn TargetValidator>>,
    callback: Option<TargetCallback>,
    camera: Option<Box<dyn CameraProjection>>,
}

impl Default for TargetingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetingSystem {
    pub fn new() -> Self {
        Self {
            active: false,
            origin: TileKey::new(0, 0),
            target: TileKey::new(0, 0),
            mode: TargetMode::Adjacent,
            max_range: None,
            validator: None,
            callback: None,
            camera: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn target(&self) -> TileKey {
        self.target
    }

    pub fn origin(&self) -> TileKey {
        self.origin
    }

    pub fn mode(&self) -> TargetMode {
        self.mode
    }

    pub fn set_max_range(&mut self, max_range: Option<f32>) {
        self.max_range = max_range;
    }

    pub fn set_camera(&mut self, camera: Box<dyn CameraProjection>) {
        self.camera = Some(camera);
    }

    /// Installs the predicate for the current session; cleared on deactivation
    pub fn set_validator(&mut self, validator: Box<dyn TargetValidator>) {
        self.validator = Some(validator);
    }

    /// Starts a session at the tile containing `(origin_x, origin_y)`.
    ///
    /// A session that is still running is cancelled first.
    pub fn activate(
        &mut self,
        origin_x: f32,
        origin_y: f32,
        mode: TargetMode,
        callback: TargetCallback,
    ) {
        if self.active {
            self.cancel();
        }
        self.origin = TileKey::from_world(origin_x, origin_y);
        self.target = self.origin;
        self.mode = mode;
        self.callback = Some(callback);
        self.active = true;
        debug!("Targeting {:?} from {}", mode, self.origin);
    }

    /// Steps the cursor one tile, clamped to the allowed area
    pub fn move_target(&mut self, direction: Direction) {
        if !self.active {
            return;
        }
        let (dx, dy) = direction.delta();
        self.target = self.clamp(self.target.offset(dx, dy));
    }

    /// Points the cursor at the tile under the given screen position
    pub fn set_target_from_mouse(&mut self, screen_x: f32, screen_y: f32) -> bool {
        if !self.active {
            return false;
        }
        let Some(camera) = &self.camera else {
            return false;
        };
        let (world_x, world_y) = camera.screen_to_world(screen_x, screen_y);
        if !world_x.is_finite() || !world_y.is_finite() {
            return false;
        }
        self.target = self.clamp(TileKey::from_world(world_x, world_y));
        true
    }

    pub fn is_target_valid(&self) -> bool {
        match &self.validator {
            Some(validator) => validator.is_valid(self.target),
            None => true,
        }
    }

    /// Ends the session with the current target
    pub fn confirm(&mut self) -> Option<TileKey> {
        if !self.active {
            return None;
        }
        let target = self.target;
        self.finish(TargetOutcome::Confirmed(target));
        Some(target)
    }

    pub fn cancel(&mut self) {
        if self.active {
            self.finish(TargetOutcome::Cancelled);
        }
    }

    fn finish(&mut self, outcome: TargetOutcome) {
        self.active = false;
        self.validator = None;
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }

    fn clamp(&self, candidate: TileKey) -> TileKey {
        let dx = candidate.x.saturating_sub(self.origin.x);
        let dy = candidate.y.saturating_sub(self.origin.y);
        match self.mode {
            TargetMode::Adjacent => self.origin.offset(dx.clamp(-1, 1), dy.clamp(-1, 1)),
            TargetMode::Range => {
                let Some(max_range) = self.max_range else {
                    return candidate;
                };
                let distance = self.origin.distance(&candidate) * TILE_SIZE;
                if distance <= max_range {
                    return candidate;
                }
                // Pull back along the ray, truncating toward the origin so the
                // snapped tile stays inside the circle
                let scale = max_range.max(0.0) / distance;
                let cx = (dx as f32 * scale).trunc() as i32;
                let cy = (dy as f32 * scale).trunc() as i32;
                self.origin.offset(cx, cy)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FixedCamera {
        offset_x: f32,
        offset_y: f32,
    }

    impl CameraProjection for FixedCamera {
        fn screen_to_world(&self, screen_x: f32, screen_y: f32) -> (f32, f32) {
            (screen_x + self.offset_x, screen_y + self.offset_y)
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<TargetOutcome>>>, TargetCallback) {
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&outcomes);
        let callback: TargetCallback = Box::new(move |outcome| sink.borrow_mut().push(outcome));
        (outcomes, callback)
    }

    #[test]
    fn test_activate_starts_on_origin_tile() {
        let mut targeting = TargetingSystem::new();
        let (_, callback) = recorder();
        targeting.activate(130.0, 70.0, TargetMode::Adjacent, callback);
        assert!(targeting.is_active());
        assert_eq!(targeting.target(), TileKey::new(2, 1));
    }

    #[test]
    fn test_adjacent_mode_clamps_to_box() {
        let mut targeting = TargetingSystem::new();
        let (_, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Adjacent, callback);

        for _ in 0..5 {
            targeting.move_target(Direction::Right);
        }
        targeting.move_target(Direction::Up);
        assert_eq!(targeting.target(), TileKey::new(1, -1));
    }

    #[test]
    fn test_range_mode_clamps_to_circle() {
        let mut targeting = TargetingSystem::new();
        targeting.set_max_range(Some(3.0 * TILE_SIZE));
        let (_, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Range, callback);

        for _ in 0..10 {
            targeting.move_target(Direction::Down);
        }
        assert_eq!(targeting.target(), TileKey::new(0, 3));

        for _ in 0..10 {
            targeting.move_target(Direction::Right);
        }
        let target = targeting.target();
        let distance = targeting.origin().distance(&target) * TILE_SIZE;
        assert!(distance <= 3.0 * TILE_SIZE, "{} escaped the range", target);
    }

    #[test]
    fn test_mouse_targeting_needs_camera() {
        let mut targeting = TargetingSystem::new();
        assert!(!targeting.set_target_from_mouse(10.0, 10.0));

        let (_, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Adjacent, callback);
        assert!(!targeting.set_target_from_mouse(10.0, 10.0));

        targeting.set_camera(Box::new(FixedCamera {
            offset_x: 64.0,
            offset_y: 0.0,
        }));
        assert!(targeting.set_target_from_mouse(10.0, 10.0));
        assert_eq!(targeting.target(), TileKey::new(1, 0));

        // Far clicks are clamped, not rejected
        assert!(targeting.set_target_from_mouse(1000.0, 1000.0));
        assert_eq!(targeting.target(), TileKey::new(1, 1));
    }

    #[test]
    fn test_validator_defaults_to_valid_and_is_cleared() {
        let mut targeting = TargetingSystem::new();
        let (_, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Adjacent, callback);
        assert!(targeting.is_target_valid());

        targeting.set_validator(Box::new(|tile: TileKey| tile.x > 0));
        assert!(!targeting.is_target_valid());
        targeting.move_target(Direction::Right);
        assert!(targeting.is_target_valid());

        targeting.cancel();
        let (_, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Adjacent, callback);
        assert!(targeting.is_target_valid());
    }

    #[test]
    fn test_callback_fires_exactly_once() {
        let mut targeting = TargetingSystem::new();
        let (outcomes, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Adjacent, callback);
        targeting.move_target(Direction::Left);

        assert_eq!(targeting.confirm(), Some(TileKey::new(-1, 0)));
        assert_eq!(targeting.confirm(), None);
        targeting.cancel();

        assert_eq!(
            *outcomes.borrow(),
            vec![TargetOutcome::Confirmed(TileKey::new(-1, 0))]
        );
        assert!(!targeting.is_active());
    }

    #[test]
    fn test_reactivation_cancels_previous_session() {
        let mut targeting = TargetingSystem::new();
        let (first, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Adjacent, callback);
        let (second, callback) = recorder();
        targeting.activate(32.0, 32.0, TargetMode::Adjacent, callback);

        assert_eq!(*first.borrow(), vec![TargetOutcome::Cancelled]);
        assert!(second.borrow().is_empty());
        targeting.cancel();
        assert_eq!(*second.borrow(), vec![TargetOutcome::Cancelled]);
    }
}
