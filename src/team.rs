//! Team roster, character assignment, and puzzle rotation
//!
//! A team is the unit a session is built around: an ordered roster of
//! players, the table mapping each character variant to its single holder,
//! the sabotage-immunity flag, the completed-game counter, and the ordered
//! list of puzzle names the team cycles through across games.

use std::collections::VecDeque;

use enum_map::EnumMap;

use crate::{
    character::{Character, CharacterType},
    id::Id,
    player::Player,
};

/// A team of cooperating players
///
/// At most one player holds a given character variant at a time, whether
/// as their primary pick or as a bonus assignment; the holder table is the
/// authority for that rule.
#[derive(Debug, Default)]
pub struct Team {
    id: Id,
    name: String,
    players: Vec<Player>,
    characters: EnumMap<CharacterType, Option<Id>>,
    immune: bool,
    completed_games: u32,
    puzzle_rotation: VecDeque<String>,
}

impl Team {
    /// Creates an empty team
    ///
    /// The id comes from the caller's generator; the team never mints its
    /// own.
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the team's unique identifier
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the team's display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the ordered list of puzzle names the team cycles through
    pub fn set_puzzle_rotation(&mut self, names: impl IntoIterator<Item = String>) {
        self.puzzle_rotation = names.into_iter().collect();
    }

    /// Draws the next puzzle name, rotating it to the back of the list
    ///
    /// A single-entry rotation returns the same name every time; an empty
    /// rotation yields `None`.
    pub fn next_puzzle_name(&mut self) -> Option<String> {
        if self.puzzle_rotation.len() > 1 {
            let name = self.puzzle_rotation.pop_front()?;
            self.puzzle_rotation.push_back(name.clone());
            Some(name)
        } else {
            self.puzzle_rotation.front().cloned()
        }
    }

    /// Appends a player to the roster
    pub fn add_player(&mut self, player: Player) {
        self.players.push(player);
    }

    /// Removes a player and frees every character slot they held
    pub fn remove_player(&mut self, client_id: Id) -> Option<Player> {
        let position = self
            .players
            .iter()
            .position(|player| player.client_id() == client_id)?;
        for (_, holder) in self.characters.iter_mut() {
            if *holder == Some(client_id) {
                *holder = None;
            }
        }
        Some(self.players.remove(position))
    }

    /// Returns the roster in join order
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Looks up a roster member by transport identity
    pub fn player(&self, client_id: Id) -> Option<&Player> {
        self.players
            .iter()
            .find(|player| player.client_id() == client_id)
    }

    pub(crate) fn player_mut(&mut self, client_id: Id) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|player| player.client_id() == client_id)
    }

    /// Returns the id of the player holding the given variant
    pub fn character_holder(&self, kind: CharacterType) -> Option<Id> {
        self.characters[kind]
    }

    pub(crate) fn holder_player_mut(&mut self, kind: CharacterType) -> Option<&mut Player> {
        let holder = self.characters[kind]?;
        self.player_mut(holder)
    }

    /// Assigns a variant to a player as their primary character
    ///
    /// Refused if the variant already has a holder, the player is not on
    /// the roster, or the player already picked a primary.
    pub fn choose_character(&mut self, kind: CharacterType, client_id: Id) -> bool {
        if self.characters[kind].is_some() {
            return false;
        }
        let Some(player) = self.player_mut(client_id) else {
            return false;
        };
        if player.character().is_some() {
            return false;
        }
        player.set_character(Character::new(kind));
        self.characters[kind] = Some(client_id);
        true
    }

    /// Assigns a variant to a player as a bonus character
    ///
    /// Refused if the variant already has a holder anywhere on the team or
    /// the player is not on the roster.
    pub fn add_bonus_character(&mut self, kind: CharacterType, client_id: Id) -> bool {
        if self.characters[kind].is_some() {
            return false;
        }
        let Some(player) = self.player_mut(client_id) else {
            return false;
        };
        player.add_bonus_character(Character::new(kind));
        self.characters[kind] = Some(client_id);
        true
    }

    /// Variants that currently have no holder on this team
    pub fn available_characters(&self) -> Vec<CharacterType> {
        self.characters
            .iter()
            .filter(|(_, holder)| holder.is_none())
            .map(|(kind, _)| kind)
            .collect()
    }

    /// Returns whether the team is currently shielded from sabotage
    pub fn is_immune(&self) -> bool {
        self.immune
    }

    pub(crate) fn set_immune(&mut self, immune: bool) {
        self.immune = immune;
    }

    /// Number of puzzles this team has completed
    pub fn completed_games(&self) -> u32 {
        self.completed_games
    }

    /// Bumps the completed-game counter
    pub fn record_completed_game(&mut self) {
        self.completed_games += 1;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn team_with_players(count: usize) -> (Team, Vec<Id>) {
        let mut team = Team::new(Id::new(), "Fire Flowers");
        let ids: Vec<Id> = (0..count).map(|_| Id::new()).collect();
        for (index, id) in ids.iter().enumerate() {
            team.add_player(Player::new(*id, format!("player-{index}")));
        }
        (team, ids)
    }

    #[test]
    fn test_puzzle_rotation_cycles() {
        let mut team = Team::new(Id::new(), "Rotators");
        team.set_puzzle_rotation(["castle".to_string(), "pipes".to_string()]);

        assert_eq!(team.next_puzzle_name().as_deref(), Some("castle"));
        assert_eq!(team.next_puzzle_name().as_deref(), Some("pipes"));
        assert_eq!(team.next_puzzle_name().as_deref(), Some("castle"));
    }

    #[test]
    fn test_puzzle_rotation_single_entry_repeats() {
        let mut team = Team::new(Id::new(), "Loopers");
        team.set_puzzle_rotation(["castle".to_string()]);

        assert_eq!(team.next_puzzle_name().as_deref(), Some("castle"));
        assert_eq!(team.next_puzzle_name().as_deref(), Some("castle"));
    }

    #[test]
    fn test_puzzle_rotation_empty_yields_none() {
        let mut team = Team::new(Id::new(), "Nameless");
        assert_eq!(team.next_puzzle_name(), None);
    }

    #[test]
    fn test_choose_character_claims_the_slot() {
        let (mut team, ids) = team_with_players(2);

        assert!(team.choose_character(CharacterType::Mario, ids[0]));
        assert_eq!(team.character_holder(CharacterType::Mario), Some(ids[0]));
        // variant taken
        assert!(!team.choose_character(CharacterType::Mario, ids[1]));
        // player already has a primary
        assert!(!team.choose_character(CharacterType::Yoshi, ids[0]));
    }

    #[test]
    fn test_choose_character_unknown_player() {
        let (mut team, _) = team_with_players(1);
        assert!(!team.choose_character(CharacterType::Mario, Id::new()));
        assert_eq!(team.character_holder(CharacterType::Mario), None);
    }

    #[test]
    fn test_bonus_character_respects_holder_table() {
        let (mut team, ids) = team_with_players(2);
        assert!(team.choose_character(CharacterType::Bowser, ids[0]));

        assert!(!team.add_bonus_character(CharacterType::Bowser, ids[1]));
        assert!(team.add_bonus_character(CharacterType::Goomba, ids[1]));
        assert!(team.player(ids[1]).unwrap().holds(CharacterType::Goomba));
        assert_eq!(team.character_holder(CharacterType::Goomba), Some(ids[1]));
    }

    #[test]
    fn test_available_characters_shrinks_as_slots_fill() {
        let (mut team, ids) = team_with_players(1);
        assert_eq!(team.available_characters().len(), 5);

        team.choose_character(CharacterType::Peach, ids[0]);
        let available = team.available_characters();
        assert_eq!(available.len(), 4);
        assert!(!available.contains(&CharacterType::Peach));
    }

    #[test]
    fn test_remove_player_frees_character_slots() {
        let (mut team, ids) = team_with_players(2);
        team.choose_character(CharacterType::Yoshi, ids[0]);
        team.add_bonus_character(CharacterType::Goomba, ids[0]);

        let removed = team.remove_player(ids[0]).unwrap();
        assert_eq!(removed.client_id(), ids[0]);
        assert_eq!(team.character_holder(CharacterType::Yoshi), None);
        assert_eq!(team.character_holder(CharacterType::Goomba), None);
        assert!(team.player(ids[0]).is_none());
    }

    #[test]
    fn test_completed_games_counter() {
        let (mut team, _) = team_with_players(1);
        team.record_completed_game();
        team.record_completed_game();
        assert_eq!(team.completed_games(), 2);
    }
}
