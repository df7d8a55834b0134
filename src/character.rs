//! Character variants and ability charge state
//!
//! Every character is the same shape: a variant tag plus a charge counter
//! for its one special ability. The effects themselves live in the session
//! (`crate::game`), dispatched per variant; this module only tracks who a
//! character is and whether its ability can still fire.

use enum_map::Enum;
use serde::{Deserialize, Serialize};

use crate::constants;

/// The five playable character variants
///
/// Mario, Peach, and Yoshi assist their own team; Bowser and Goomba carry
/// the sabotage abilities that target an opposing team's board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterType {
    /// Star power: swaps a chosen piece straight into its home slot
    Mario,
    /// Heal: restores a charge on a teammate's character
    Peach,
    /// Guard: shields the team from sabotage for a fixed window
    Yoshi,
    /// Trouble flipper: reshuffles an opposing team's board
    Bowser,
    /// Green shell: scrambles an opposing team's correct pieces
    Goomba,
}

/// A character held by a player, primary or bonus
///
/// The charge counts remaining ability uses. It only ever goes up again
/// through a peach heal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    kind: CharacterType,
    charge: u32,
}

impl Character {
    /// Creates a character with a full initial charge
    pub fn new(kind: CharacterType) -> Self {
        Self {
            kind,
            charge: constants::characters::INITIAL_CHARGE,
        }
    }

    /// Returns the character's variant
    pub fn kind(&self) -> CharacterType {
        self.kind
    }

    /// Returns the remaining ability charges
    pub fn charge(&self) -> u32 {
        self.charge
    }

    /// Consumes one ability charge
    ///
    /// Returns `false` without changing anything if the charge is already
    /// exhausted.
    pub fn use_charge(&mut self) -> bool {
        if self.charge == 0 {
            return false;
        }
        self.charge -= 1;
        true
    }

    /// Restores one charge, up to the initial level
    ///
    /// Returns `false` if the character is already undamaged.
    pub fn heal(&mut self) -> bool {
        if self.is_undamaged() {
            return false;
        }
        self.charge += 1;
        true
    }

    /// Returns whether the character is at its full initial charge
    pub fn is_undamaged(&self) -> bool {
        self.charge >= constants::characters::INITIAL_CHARGE
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_new_character_is_undamaged() {
        let mario = Character::new(CharacterType::Mario);
        assert_eq!(mario.charge(), constants::characters::INITIAL_CHARGE);
        assert!(mario.is_undamaged());
    }

    #[test]
    fn test_use_charge_until_exhausted() {
        let mut yoshi = Character::new(CharacterType::Yoshi);
        for _ in 0..constants::characters::INITIAL_CHARGE {
            assert!(yoshi.use_charge());
        }
        assert_eq!(yoshi.charge(), 0);
        assert!(!yoshi.use_charge());
        assert_eq!(yoshi.charge(), 0);
    }

    #[test]
    fn test_heal_restores_a_used_charge() {
        let mut bowser = Character::new(CharacterType::Bowser);
        assert!(bowser.use_charge());
        assert!(bowser.heal());
        assert!(bowser.is_undamaged());
    }

    #[test]
    fn test_heal_on_undamaged_character_does_nothing() {
        let mut peach = Character::new(CharacterType::Peach);
        assert!(!peach.heal());
        assert_eq!(peach.charge(), constants::characters::INITIAL_CHARGE);
    }

    #[test]
    fn test_character_type_serializes_lowercase() {
        let json = serde_json::to_string(&CharacterType::Goomba).unwrap();
        assert_eq!(json, "\"goomba\"");
    }
}
