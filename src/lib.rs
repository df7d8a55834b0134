//! # Trouble Flipper Game Library
//!
//! This library provides the server-side core for a real-time,
//! team-cooperative sliding-puzzle game. Each team gets a session that
//! owns a shuffled puzzle board; players concurrently select and swap
//! pieces to reassemble it while character abilities help their own team
//! or sabotage an opposing one. The session is the single source of truth
//! for board state: it enforces legality and timing rules, expires stale
//! selections, detects the win, and publishes snapshots to the team's
//! channel after every action.
//!
//! The transport, the cross-team dispatcher, and the scheduler are
//! collaborators injected at the call sites; the crate itself performs no
//! I/O.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

use serde::Serialize;

pub mod constants;

pub mod board;
pub mod character;
pub mod dispatch;
pub mod game;
pub mod id;
pub mod player;
pub mod session;
pub mod team;

/// Messages published to a team's output channel
///
/// This enum wraps the concrete update payloads so a single publisher
/// seam carries every outbound message kind.
#[derive(Debug, Serialize, Clone, derive_more::From)]
pub enum UpdateMessage {
    /// Full puzzle snapshot after a board-affecting action
    Puzzle(game::UpdatePuzzleMessage),
    /// Character availability and assignment snapshot
    Characters(game::UpdateCharacterMessage),
}

impl UpdateMessage {
    /// Converts the update message to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::{id::Id, player::Player};

    #[test]
    fn test_update_message_to_message() {
        let update = game::UpdatePuzzleMessage {
            team_id: Id::new(),
            team_name: "Fire Flowers".to_owned(),
            puzzle_name: Some("castle".to_owned()),
            correct_pieces: 0,
            puzzle: Vec::new(),
            game_won: false,
            completed_games: 0,
            players: vec![Player::new(Id::new(), "mustache")],
            session_ended: false,
        };
        let message: UpdateMessage = update.into();
        let json = message.to_message();

        assert!(json.contains("Puzzle"));
        assert!(json.contains("Fire Flowers"));
        assert!(json.contains("mustache"));
    }

    #[test]
    fn test_character_update_omits_availability_when_absent() {
        let update = game::UpdateCharacterMessage {
            team_id: Id::new(),
            team_name: "Fire Flowers".to_owned(),
            available_characters: None,
            players: Vec::new(),
        };
        let json = UpdateMessage::from(update).to_message();

        assert!(!json.contains("available_characters"));
    }
}
