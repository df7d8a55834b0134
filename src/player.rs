//! Player records and move statistics
//!
//! A player is a transport client on a team: an id, a display tag, at most
//! one primary character, any bonus characters assigned to fill out a
//! short roster, and the running count of right and wrong swap moves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    character::{Character, CharacterType},
    id::Id,
};

/// A member of a team's roster
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    client_id: Id,
    gamer_tag: String,
    #[serde(default)]
    character: Option<Character>,
    #[serde(default)]
    bonus_characters: HashMap<CharacterType, Character>,
    correct_moves: u32,
    wrong_moves: u32,
}

impl Player {
    /// Creates a player with no character and zeroed move counters
    pub fn new(client_id: Id, gamer_tag: impl Into<String>) -> Self {
        Self {
            client_id,
            gamer_tag: gamer_tag.into(),
            character: None,
            bonus_characters: HashMap::new(),
            correct_moves: 0,
            wrong_moves: 0,
        }
    }

    /// Returns the player's transport identity
    pub fn client_id(&self) -> Id {
        self.client_id
    }

    /// Returns the player's display tag
    pub fn gamer_tag(&self) -> &str {
        &self.gamer_tag
    }

    /// Returns the player's primary character, if picked
    pub fn character(&self) -> Option<&Character> {
        self.character.as_ref()
    }

    /// Returns the player's bonus characters
    pub fn bonus_characters(&self) -> &HashMap<CharacterType, Character> {
        &self.bonus_characters
    }

    pub(crate) fn set_character(&mut self, character: Character) {
        self.character = Some(character);
    }

    pub(crate) fn add_bonus_character(&mut self, character: Character) {
        self.bonus_characters.insert(character.kind(), character);
    }

    /// Returns whether the player holds the given variant, primary or bonus
    pub fn holds(&self, kind: CharacterType) -> bool {
        self.character.as_ref().is_some_and(|c| c.kind() == kind)
            || self.bonus_characters.contains_key(&kind)
    }

    /// Mutable access to the charge state of the given variant
    ///
    /// Resolves the primary character first, then the bonus slot.
    pub(crate) fn character_state_mut(&mut self, kind: CharacterType) -> Option<&mut Character> {
        match &mut self.character {
            Some(character) if character.kind() == kind => Some(character),
            _ => self.bonus_characters.get_mut(&kind),
        }
    }

    /// Records a swap that moved a piece toward its home position
    pub fn right_move(&mut self) {
        self.correct_moves += 1;
    }

    /// Records a swap that disturbed a correctly placed piece
    pub fn wrong_move(&mut self) {
        self.wrong_moves += 1;
    }

    /// Count of right moves so far
    pub fn correct_moves(&self) -> u32 {
        self.correct_moves
    }

    /// Count of wrong moves so far
    pub fn wrong_moves(&self) -> u32 {
        self.wrong_moves
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_has_no_characters() {
        let player = Player::new(Id::new(), "mustache");
        assert!(player.character().is_none());
        assert!(player.bonus_characters().is_empty());
        assert_eq!(player.correct_moves(), 0);
        assert_eq!(player.wrong_moves(), 0);
    }

    #[test]
    fn test_character_state_mut_prefers_primary() {
        let mut player = Player::new(Id::new(), "mustache");
        player.set_character(Character::new(CharacterType::Mario));
        player.add_bonus_character(Character::new(CharacterType::Yoshi));

        assert_eq!(
            player
                .character_state_mut(CharacterType::Mario)
                .map(|c| c.kind()),
            Some(CharacterType::Mario)
        );
        assert_eq!(
            player
                .character_state_mut(CharacterType::Yoshi)
                .map(|c| c.kind()),
            Some(CharacterType::Yoshi)
        );
        assert!(player.character_state_mut(CharacterType::Peach).is_none());
    }

    #[test]
    fn test_holds_covers_primary_and_bonus() {
        let mut player = Player::new(Id::new(), "shellshock");
        player.set_character(Character::new(CharacterType::Goomba));
        player.add_bonus_character(Character::new(CharacterType::Bowser));

        assert!(player.holds(CharacterType::Goomba));
        assert!(player.holds(CharacterType::Bowser));
        assert!(!player.holds(CharacterType::Peach));
    }

    #[test]
    fn test_move_counters_accumulate() {
        let mut player = Player::new(Id::new(), "swapper");
        player.right_move();
        player.right_move();
        player.wrong_move();

        assert_eq!(player.correct_moves(), 2);
        assert_eq!(player.wrong_moves(), 1);
    }
}
