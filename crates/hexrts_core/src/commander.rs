//! Commanders: named officers that lead armies.
//!
//! A commander gates offensive orders behind a stamina pool and grants
//! a specialty bonus that scales with level. Experience is awarded when
//! engagements end; levels follow a fixed schedule so replays agree on
//! promotion ticks.

use serde::{Deserialize, Serialize};

use crate::army::ArmyId;
use crate::math::{fixed_serde, percent, Fixed};
use crate::player::PlayerId;
use crate::registry::define_id;

define_id!(
    /// Unique identifier for commanders.
    CommanderId
);

/// Maximum commander level.
pub const MAX_COMMANDER_LEVEL: u8 = 10;

/// Stamina pool ceiling.
#[must_use]
pub fn stamina_max() -> Fixed {
    Fixed::from_num(100)
}

/// Stamina regained per tick.
#[must_use]
pub fn stamina_regen() -> Fixed {
    percent(5)
}

/// Stamina cost of issuing an attack order.
#[must_use]
pub fn attack_stamina_cost() -> Fixed {
    Fixed::from_num(25)
}

/// Experience required to advance from `level` to `level + 1`.
#[must_use]
pub const fn xp_to_next_level(level: u8) -> u32 {
    level as u32 * 100
}

/// Experience awarded to the winning side's commander.
pub const XP_VICTORY: u32 = 60;

/// Experience awarded to the losing side's commander, if they survive.
pub const XP_DEFEAT: u32 = 25;

/// A commander's area of expertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Specialty {
    /// Raises led army's attack.
    Offense,
    /// Raises led army's defense.
    Defense,
    /// Raises led army's movement speed.
    Logistics,
}

/// An officer available to lead one army at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commander {
    /// Unique id, assigned on registration.
    pub id: CommanderId,
    /// Owning player.
    pub owner: PlayerId,
    /// Display name.
    pub name: String,
    /// Area of expertise.
    pub specialty: Specialty,
    /// Current level, 1-based.
    pub level: u8,
    /// Experience toward the next level.
    pub xp: u32,
    /// Current stamina.
    #[serde(with = "fixed_serde")]
    pub stamina: Fixed,
    /// Army currently led, if deployed.
    pub army: Option<ArmyId>,
}

impl Commander {
    /// Create a fresh level-1 commander awaiting registration.
    #[must_use]
    pub fn new(owner: PlayerId, name: impl Into<String>, specialty: Specialty) -> Self {
        Self {
            id: CommanderId(0),
            owner,
            name: name.into(),
            specialty,
            level: 1,
            xp: 0,
            stamina: stamina_max(),
            army: None,
        }
    }

    /// Specialty bonus magnitude: 5% per level.
    #[must_use]
    pub fn specialty_bonus(&self) -> Fixed {
        percent(5) * Fixed::from_num(i32::from(self.level))
    }

    /// Attack multiplier bonus granted to the led army.
    #[must_use]
    pub fn attack_bonus(&self) -> Fixed {
        match self.specialty {
            Specialty::Offense => self.specialty_bonus(),
            _ => Fixed::ZERO,
        }
    }

    /// Defense multiplier bonus granted to the led army.
    #[must_use]
    pub fn defense_bonus(&self) -> Fixed {
        match self.specialty {
            Specialty::Defense => self.specialty_bonus(),
            _ => Fixed::ZERO,
        }
    }

    /// Speed multiplier bonus granted to the led army.
    #[must_use]
    pub fn speed_bonus(&self) -> Fixed {
        match self.specialty {
            Specialty::Logistics => self.specialty_bonus(),
            _ => Fixed::ZERO,
        }
    }

    /// Whether the commander can pay a stamina cost right now.
    #[must_use]
    pub fn has_stamina(&self, cost: Fixed) -> bool {
        self.stamina >= cost
    }

    /// Spend stamina; returns false without mutating if insufficient.
    pub fn spend_stamina(&mut self, cost: Fixed) -> bool {
        if self.stamina < cost {
            return false;
        }
        self.stamina -= cost;
        true
    }

    /// Regenerate one tick of stamina, clamped to the pool ceiling.
    pub fn regen_stamina(&mut self) {
        self.stamina = (self.stamina + stamina_regen()).min(stamina_max());
    }

    /// Award experience, applying any level-ups the schedule allows.
    pub fn grant_xp(&mut self, amount: u32) {
        self.xp += amount;
        while self.level < MAX_COMMANDER_LEVEL {
            let needed = xp_to_next_level(self.level);
            if self.xp < needed {
                break;
            }
            self.xp -= needed;
            self.level += 1;
        }
    }
}
