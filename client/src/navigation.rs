//! Navigation mode arbitration
//!
//! Exactly one interpretation of directional input is active at a time.
//! `Targeting` pre-empts everything, `Inventory` and `FenceBuilding` exclude
//! each other, and `Normal` is always reachable. Entering fence building
//! starts a short stability window so that the key press that opened the mode
//! cannot also close it in the same update.

use crate::targeting::TargetingSystem;
use log::debug;
use shared::Direction;
use thiserror::Error;

/// Ticks fence building stays active before it may be left
pub const DEFAULT_STABILITY_TICKS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationMode {
    Normal,
    Inventory,
    FenceBuilding,
    Targeting,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("cannot enter {requested:?} while {active:?} is active")]
    Blocked {
        requested: NavigationMode,
        active: NavigationMode,
    },
    #[error("fence building was just entered; {remaining} tick(s) until it can be left")]
    Stabilizing { remaining: u32 },
}

/// Where a directional key press goes in the current mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionalRoute {
    /// Translate the player
    Walk(Direction),
    /// Move the inventory slot cursor
    SlotCursor(Direction),
    /// Cycle the selected fence piece type forward or backward
    CyclePiece { forward: bool },
    /// Move the targeting cursor
    TargetCursor(Direction),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct NavigationModeArbiter {
    current: NavigationMode,
    /// Mode that targeting pre-empted and returns to
    owning_mode: NavigationMode,
    /// Ticks the owning mode has been active, targeting included
    owning_ticks: u32,
    ticks_in_mode: u32,
    stability_ticks: u32,
}

impl Default for NavigationModeArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_TICKS)
    }
}

impl NavigationModeArbiter {
    pub fn new(stability_ticks: u32) -> Self {
        Self {
            current: NavigationMode::Normal,
            owning_mode: NavigationMode::Normal,
            owning_ticks: 0,
            ticks_in_mode: 0,
            stability_ticks,
        }
    }

    pub fn current(&self) -> NavigationMode {
        self.current
    }

    /// Mode that owns the active targeting session, or the current mode
    pub fn owning_mode(&self) -> NavigationMode {
        if self.current == NavigationMode::Targeting {
            self.owning_mode
        } else {
            self.current
        }
    }

    pub fn stability_ticks(&self) -> u32 {
        self.stability_ticks
    }

    pub fn set_stability_ticks(&mut self, ticks: u32) {
        self.stability_ticks = ticks;
    }

    pub fn ticks_in_mode(&self) -> u32 {
        self.ticks_in_mode
    }

    /// Advances the stability counter; call once per update
    pub fn tick(&mut self) {
        self.ticks_in_mode = self.ticks_in_mode.saturating_add(1);
        self.owning_ticks = self.owning_ticks.saturating_add(1);
    }

    /// Asks to switch to `target`.
    ///
    /// Requesting the active mode is always accepted and changes nothing.
    pub fn request_mode(&mut self, target: NavigationMode) -> Result<(), NavigationError> {
        if target == self.current {
            return Ok(());
        }
        self.arbitrate(self.current, self.ticks_in_mode, target)?;
        if target == NavigationMode::Targeting {
            self.owning_mode = self.current;
            self.owning_ticks = self.ticks_in_mode;
        }
        self.enter(target);
        Ok(())
    }

    /// Whether leaving targeting for `target` would be accepted, judged from
    /// the mode targeting pre-empted. Changes nothing.
    pub fn can_enter(&self, target: NavigationMode) -> Result<(), NavigationError> {
        let (from, ticks) = if self.current == NavigationMode::Targeting {
            (self.owning_mode, self.owning_ticks)
        } else {
            (self.current, self.ticks_in_mode)
        };
        if target == from {
            return Ok(());
        }
        self.arbitrate(from, ticks, target)
    }

    fn arbitrate(
        &self,
        from: NavigationMode,
        ticks: u32,
        target: NavigationMode,
    ) -> Result<(), NavigationError> {
        if from == NavigationMode::FenceBuilding
            && target != NavigationMode::Targeting
            && ticks < self.stability_ticks
        {
            let remaining = self.stability_ticks - ticks;
            debug!("Ignoring {:?} request, fence building stabilizing", target);
            return Err(NavigationError::Stabilizing { remaining });
        }

        match target {
            NavigationMode::Normal | NavigationMode::Targeting => Ok(()),
            NavigationMode::Inventory | NavigationMode::FenceBuilding => {
                if from == NavigationMode::Normal {
                    Ok(())
                } else {
                    Err(NavigationError::Blocked {
                        requested: target,
                        active: from,
                    })
                }
            }
        }
    }

    /// Switches without arbitration, for callers that own the source of truth
    pub fn force_mode(&mut self, target: NavigationMode) {
        if target == NavigationMode::Targeting && self.current != NavigationMode::Targeting {
            self.owning_mode = self.current;
            self.owning_ticks = self.ticks_in_mode;
        }
        self.enter(target);
    }

    /// Leaves targeting and returns to the mode it pre-empted. The owning
    /// mode keeps its tick count, so its stability window does not restart.
    pub fn end_targeting(&mut self) {
        if self.current == NavigationMode::Targeting {
            debug!("Navigation mode Targeting -> {:?}", self.owning_mode);
            self.current = self.owning_mode;
            self.ticks_in_mode = self.owning_ticks;
            self.owning_mode = NavigationMode::Normal;
            self.owning_ticks = 0;
        }
    }

    pub fn should_block_player_movement(&self, targeting: &TargetingSystem) -> bool {
        self.current != NavigationMode::Normal || targeting.is_active()
    }

    pub fn route_direction(&self, direction: Direction, targeting_active: bool) -> DirectionalRoute {
        if targeting_active || self.current == NavigationMode::Targeting {
            return DirectionalRoute::TargetCursor(direction);
        }
        match self.current {
            NavigationMode::Normal => DirectionalRoute::Walk(direction),
            NavigationMode::Inventory => DirectionalRoute::SlotCursor(direction),
            NavigationMode::FenceBuilding => match direction {
                Direction::Left => DirectionalRoute::CyclePiece { forward: false },
                Direction::Right => DirectionalRoute::CyclePiece { forward: true },
                Direction::Up | Direction::Down => DirectionalRoute::Ignored,
            },
            NavigationMode::Targeting => DirectionalRoute::TargetCursor(direction),
        }
    }

    fn enter(&mut self, mode: NavigationMode) {
        debug!("Navigation mode {:?} -> {:?}", self.current, mode);
        self.current = mode;
        self.ticks_in_mode = 0;
    }
}
