//! Key routing through the navigation arbiter and the targeting cursor

use crate::navigation::{DirectionalRoute, NavigationError, NavigationMode, NavigationModeArbiter};
use crate::targeting::{TargetCallback, TargetMode, TargetValidator, TargetingSystem};
use log::{debug, info};
use shared::{Direction, FenceMaterial, FencePieceType};
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Number of inventory slots the slot cursor walks over
pub const INVENTORY_SLOTS: usize = 4;

/// Logical keys, independent of the device that produced them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Confirm,
    Escape,
    Inventory,
    FenceMode,
    Attack,
    PickUp,
    Plant,
    RemoveFence,
    ClearEnclosure,
    CycleMaterial,
    Resync,
    Quit,
}

impl Key {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Key::Up => Some(Direction::Up),
            Key::Down => Some(Direction::Down),
            Key::Left => Some(Direction::Left),
            Key::Right => Some(Direction::Right),
            _ => None,
        }
    }

    /// Single-character binding used by the terminal client
    pub fn from_char(c: char) -> Option<Key> {
        let key = match c.to_ascii_lowercase() {
            'w' => Key::Up,
            's' => Key::Down,
            'a' => Key::Left,
            'd' => Key::Right,
            'e' => Key::Confirm,
            'q' => Key::Escape,
            'i' => Key::Inventory,
            'b' => Key::FenceMode,
            'f' => Key::Attack,
            'g' => Key::PickUp,
            'p' => Key::Plant,
            'x' => Key::RemoveFence,
            'c' => Key::ClearEnclosure,
            'm' => Key::CycleMaterial,
            'r' => Key::Resync,
            _ => return None,
        };
        Some(key)
    }
}

/// Produces the keys pressed since the previous poll
pub trait InputSource {
    fn poll_keys(&mut self) -> Vec<Key>;
}

/// What a tile chosen with the targeting cursor will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPurpose {
    Attack,
    PickUp,
    Plant,
    PlaceFence,
    RemoveFence,
    ClearEnclosure,
}

/// Work the controller cannot finish on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Walk(Direction),
    BeginTargeting(TargetPurpose),
    Resync,
    Quit,
    /// Feedback for the player
    Notice(String),
}

pub struct InputController {
    arbiter: NavigationModeArbiter,
    targeting: TargetingSystem,
    slot: usize,
    /// `None` lets the server infer the piece from its neighbours
    piece: Option<FencePieceType>,
    material: FenceMaterial,
}

impl InputController {
    pub fn new(stability_ticks: u32) -> Self {
        Self {
            arbiter: NavigationModeArbiter::new(stability_ticks),
            targeting: TargetingSystem::new(),
            slot: 0,
            piece: None,
            material: FenceMaterial::Wood,
        }
    }

    pub fn arbiter(&self) -> &NavigationModeArbiter {
        &self.arbiter
    }

    pub fn targeting(&self) -> &TargetingSystem {
        &self.targeting
    }

    pub fn targeting_mut(&mut self) -> &mut TargetingSystem {
        &mut self.targeting
    }

    pub fn mode(&self) -> NavigationMode {
        self.arbiter.current()
    }

    pub fn selected_slot(&self) -> usize {
        self.slot
    }

    pub fn selected_piece(&self) -> Option<FencePieceType> {
        self.piece
    }

    pub fn selected_material(&self) -> FenceMaterial {
        self.material
    }

    pub fn movement_blocked(&self) -> bool {
        self.arbiter.should_block_player_movement(&self.targeting)
    }

    /// Advances the arbiter's stability counter; once per update
    pub fn tick(&mut self) {
        self.arbiter.tick();
    }

    /// Switches mode, cancelling a targeting session its owner is leaving.
    /// A refused request leaves the session running.
    pub fn request_mode(&mut self, target: NavigationMode) -> Result<(), NavigationError> {
        if self.targeting.is_active() && target != NavigationMode::Targeting {
            if target == self.arbiter.owning_mode() {
                return Ok(());
            }
            self.arbiter.can_enter(target)?;
            self.cancel_targeting();
        }
        let entering_fence_mode = target == NavigationMode::FenceBuilding
            && self.arbiter.current() != NavigationMode::FenceBuilding;
        self.arbiter.request_mode(target)?;
        if entering_fence_mode {
            self.piece = None;
        }
        Ok(())
    }

    /// Starts an adjacent-tile targeting session at the player's position
    pub fn begin_targeting(
        &mut self,
        origin: (f32, f32),
        validator: Option<Box<dyn TargetValidator>>,
        callback: TargetCallback,
    ) -> Result<(), NavigationError> {
        self.arbiter.request_mode(NavigationMode::Targeting)?;
        self.targeting
            .activate(origin.0, origin.1, TargetMode::Adjacent, callback);
        if let Some(validator) = validator {
            self.targeting.set_validator(validator);
        }
        Ok(())
    }

    pub fn cancel_targeting(&mut self) {
        self.targeting.cancel();
        self.arbiter.end_targeting();
    }

    pub fn handle_key(&mut self, key: Key) -> Option<Intent> {
        if let Some(direction) = key.direction() {
            return self.handle_direction(direction);
        }

        let mode = self.arbiter.current();
        let targeting = self.targeting.is_active();
        match key {
            Key::Confirm if targeting => {
                if !self.targeting.is_target_valid() {
                    return Some(Intent::Notice(format!(
                        "Cannot use {}",
                        self.targeting.target()
                    )));
                }
                self.targeting.confirm();
                self.arbiter.end_targeting();
                None
            }
            Key::Confirm if mode == NavigationMode::FenceBuilding => {
                Some(Intent::BeginTargeting(TargetPurpose::PlaceFence))
            }
            Key::Escape if targeting => {
                self.cancel_targeting();
                None
            }
            Key::Escape => self.switch_mode(NavigationMode::Normal),
            Key::Inventory => self.toggle_mode(NavigationMode::Inventory),
            Key::FenceMode => self.toggle_mode(NavigationMode::FenceBuilding),
            Key::Attack | Key::PickUp | Key::Plant
                if mode == NavigationMode::Normal && !targeting =>
            {
                let purpose = match key {
                    Key::Attack => TargetPurpose::Attack,
                    Key::PickUp => TargetPurpose::PickUp,
                    _ => TargetPurpose::Plant,
                };
                Some(Intent::BeginTargeting(purpose))
            }
            Key::RemoveFence if mode == NavigationMode::FenceBuilding && !targeting => {
                Some(Intent::BeginTargeting(TargetPurpose::RemoveFence))
            }
            Key::ClearEnclosure if mode == NavigationMode::FenceBuilding && !targeting => {
                Some(Intent::BeginTargeting(TargetPurpose::ClearEnclosure))
            }
            Key::CycleMaterial if mode == NavigationMode::FenceBuilding => {
                self.material = match self.material {
                    FenceMaterial::Wood => FenceMaterial::Bamboo,
                    FenceMaterial::Bamboo => FenceMaterial::Wood,
                };
                info!("Fence material: {:?}", self.material);
                None
            }
            Key::Resync => Some(Intent::Resync),
            Key::Quit => Some(Intent::Quit),
            other => {
                debug!("{:?} ignored in {:?}", other, mode);
                None
            }
        }
    }

    fn handle_direction(&mut self, direction: Direction) -> Option<Intent> {
        match self
            .arbiter
            .route_direction(direction, self.targeting.is_active())
        {
            DirectionalRoute::Walk(direction) => {
                if self.movement_blocked() {
                    None
                } else {
                    Some(Intent::Walk(direction))
                }
            }
            DirectionalRoute::SlotCursor(direction) => {
                self.slot = match direction {
                    Direction::Left | Direction::Up => {
                        (self.slot + INVENTORY_SLOTS - 1) % INVENTORY_SLOTS
                    }
                    Direction::Right | Direction::Down => (self.slot + 1) % INVENTORY_SLOTS,
                };
                None
            }
            DirectionalRoute::CyclePiece { forward } => {
                self.piece = Some(match (self.piece, forward) {
                    (Some(piece), true) => piece.next(),
                    (Some(piece), false) => piece.previous(),
                    (None, true) => FencePieceType::ALL[0],
                    (None, false) => FencePieceType::ALL[FencePieceType::ALL.len() - 1],
                });
                None
            }
            DirectionalRoute::TargetCursor(direction) => {
                self.targeting.move_target(direction);
                None
            }
            DirectionalRoute::Ignored => None,
        }
    }

    fn toggle_mode(&mut self, mode: NavigationMode) -> Option<Intent> {
        if self.arbiter.owning_mode() == mode {
            self.switch_mode(NavigationMode::Normal)
        } else {
            self.switch_mode(mode)
        }
    }

    fn switch_mode(&mut self, mode: NavigationMode) -> Option<Intent> {
        match self.request_mode(mode) {
            Ok(()) => None,
            Err(NavigationError::Stabilizing { .. }) => None,
            Err(e) => Some(Intent::Notice(e.to_string())),
        }
    }
}

/// Reads keys from stdin lines on a helper thread; `/quit` or EOF quits
pub struct StdinInput {
    keys: Receiver<Key>,
    closed: bool,
}

impl StdinInput {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("stdin-input".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    let line = line.trim();
                    if line == "/quit" {
                        break;
                    }
                    for key in line.chars().filter_map(Key::from_char) {
                        if tx.send(key).is_err() {
                            return;
                        }
                    }
                }
                let _ = tx.send(Key::Quit);
            })?;
        Ok(Self {
            keys: rx,
            closed: false,
        })
    }
}

impl InputSource for StdinInput {
    fn poll_keys(&mut self) -> Vec<Key> {
        let mut keys = Vec::new();
        while !self.closed {
            match self.keys.try_recv() {
                Ok(key) => keys.push(key),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    keys.push(Key::Quit);
                }
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targeting::TargetOutcome;
    use shared::TileKey;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn outcome_sink() -> (Rc<RefCell<Vec<TargetOutcome>>>, TargetCallback) {
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&outcomes);
        (outcomes, Box::new(move |o| sink.borrow_mut().push(o)))
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(Key::from_char('W'), Some(Key::Up));
        assert_eq!(Key::from_char('b'), Some(Key::FenceMode));
        assert_eq!(Key::from_char('?'), None);
        assert_eq!(Key::Left.direction(), Some(Direction::Left));
        assert_eq!(Key::Plant.direction(), None);
    }

    #[test]
    fn test_walk_only_in_normal_mode() {
        let mut controller = InputController::new(1);
        assert_eq!(
            controller.handle_key(Key::Up),
            Some(Intent::Walk(Direction::Up))
        );

        controller.handle_key(Key::Inventory);
        assert_eq!(controller.mode(), NavigationMode::Inventory);
        assert_eq!(controller.handle_key(Key::Right), None);
        assert_eq!(controller.selected_slot(), 1);
        controller.handle_key(Key::Left);
        controller.handle_key(Key::Left);
        assert_eq!(controller.selected_slot(), INVENTORY_SLOTS - 1);
    }

    #[test]
    fn test_fence_mode_cycles_pieces() {
        let mut controller = InputController::new(1);
        controller.handle_key(Key::FenceMode);
        assert_eq!(controller.mode(), NavigationMode::FenceBuilding);
        assert_eq!(controller.selected_piece(), None);

        controller.handle_key(Key::Right);
        assert_eq!(controller.selected_piece(), Some(FencePieceType::TopLeft));
        controller.handle_key(Key::Left);
        assert_eq!(controller.selected_piece(), Some(FencePieceType::Left));

        controller.handle_key(Key::CycleMaterial);
        assert_eq!(controller.selected_material(), FenceMaterial::Bamboo);
    }

    #[test]
    fn test_fence_toggle_in_same_tick_is_ignored() {
        let mut controller = InputController::new(1);
        controller.handle_key(Key::FenceMode);
        assert_eq!(controller.handle_key(Key::FenceMode), None);
        assert_eq!(controller.mode(), NavigationMode::FenceBuilding);

        controller.tick();
        controller.handle_key(Key::FenceMode);
        assert_eq!(controller.mode(), NavigationMode::Normal);
    }

    #[test]
    fn test_inventory_blocks_fence_mode_with_notice() {
        let mut controller = InputController::new(1);
        controller.handle_key(Key::Inventory);
        assert!(matches!(
            controller.handle_key(Key::FenceMode),
            Some(Intent::Notice(_))
        ));
        assert_eq!(controller.mode(), NavigationMode::Inventory);
    }

    #[test]
    fn test_targeting_routes_cursor_and_confirms() {
        let mut controller = InputController::new(1);
        assert_eq!(
            controller.handle_key(Key::Plant),
            Some(Intent::BeginTargeting(TargetPurpose::Plant))
        );

        let (outcomes, callback) = outcome_sink();
        controller
            .begin_targeting((32.0, 32.0), None, callback)
            .unwrap();
        assert!(controller.movement_blocked());

        assert_eq!(controller.handle_key(Key::Down), None);
        assert_eq!(controller.handle_key(Key::Confirm), None);

        assert_eq!(
            *outcomes.borrow(),
            vec![TargetOutcome::Confirmed(TileKey::new(0, 1))]
        );
        assert_eq!(controller.mode(), NavigationMode::Normal);
        assert!(!controller.movement_blocked());
    }

    #[test]
    fn test_invalid_target_is_not_confirmed() {
        let mut controller = InputController::new(1);
        let (outcomes, callback) = outcome_sink();
        controller
            .begin_targeting((32.0, 32.0), Some(Box::new(|_: TileKey| false)), callback)
            .unwrap();

        assert!(matches!(
            controller.handle_key(Key::Confirm),
            Some(Intent::Notice(_))
        ));
        assert!(outcomes.borrow().is_empty());
        assert!(controller.targeting().is_active());
    }

    #[test]
    fn test_escape_cancels_targeting_once_and_returns_to_owner() {
        let mut controller = InputController::new(0);
        controller.handle_key(Key::FenceMode);
        assert_eq!(
            controller.handle_key(Key::Confirm),
            Some(Intent::BeginTargeting(TargetPurpose::PlaceFence))
        );
        let (outcomes, callback) = outcome_sink();
        controller
            .begin_targeting((32.0, 32.0), None, callback)
            .unwrap();

        controller.handle_key(Key::Escape);
        controller.handle_key(Key::Escape);

        assert_eq!(*outcomes.borrow(), vec![TargetOutcome::Cancelled]);
        assert_eq!(controller.mode(), NavigationMode::Normal);
    }

    #[test]
    fn test_leaving_owning_mode_cancels_targeting() {
        let mut controller = InputController::new(0);
        controller.handle_key(Key::FenceMode);
        let (outcomes, callback) = outcome_sink();
        controller
            .begin_targeting((32.0, 32.0), None, callback)
            .unwrap();

        controller.handle_key(Key::FenceMode);

        assert_eq!(*outcomes.borrow(), vec![TargetOutcome::Cancelled]);
        assert_eq!(controller.mode(), NavigationMode::Normal);
    }

    #[test]
    fn test_refused_mode_request_keeps_targeting() {
        let mut controller = InputController::new(0);
        controller.handle_key(Key::FenceMode);
        let (outcomes, callback) = outcome_sink();
        controller
            .begin_targeting((32.0, 32.0), None, callback)
            .unwrap();

        assert!(matches!(
            controller.handle_key(Key::Inventory),
            Some(Intent::Notice(_))
        ));

        assert!(outcomes.borrow().is_empty());
        assert!(controller.targeting().is_active());
        assert_eq!(controller.mode(), NavigationMode::Targeting);
        assert_eq!(controller.arbiter().owning_mode(), NavigationMode::FenceBuilding);

        controller.handle_key(Key::Escape);
        assert_eq!(*outcomes.borrow(), vec![TargetOutcome::Cancelled]);
        assert_eq!(controller.mode(), NavigationMode::FenceBuilding);
    }

    #[test]
    fn test_same_tick_fence_toggle_keeps_targeting() {
        let mut controller = InputController::new(1);
        controller.handle_key(Key::FenceMode);
        let (outcomes, callback) = outcome_sink();
        controller
            .begin_targeting((32.0, 32.0), None, callback)
            .unwrap();

        // Still inside the stability window of fence building
        assert_eq!(controller.handle_key(Key::FenceMode), None);
        assert!(outcomes.borrow().is_empty());
        assert!(controller.targeting().is_active());

        controller.tick();
        controller.handle_key(Key::FenceMode);
        assert_eq!(*outcomes.borrow(), vec![TargetOutcome::Cancelled]);
        assert_eq!(controller.mode(), NavigationMode::Normal);
    }
}
