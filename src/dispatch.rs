//! Cross-team sabotage routing
//!
//! Sabotage abilities land on a *different* team's board. Sessions never
//! hold references to each other; instead the invoking session hands the
//! trigger to a [`SabotageDispatcher`], which knows every live session by
//! team id and forwards the effect to the target session's entry points
//! ([`crate::game::Game::trouble_flipper`] /
//! [`crate::game::Game::green_shell`]).

use serde::Serialize;

use crate::id::Id;

/// Attribution for a sabotage effect
///
/// Carried along with a trouble flipper so the defending side can say who
/// attacked them without ever touching the attacker's session.
#[derive(Debug, Clone, Serialize)]
pub struct SabotageSource {
    /// The attacking player's transport identity
    pub player: Id,
    /// The attacking player's display tag
    pub gamer_tag: String,
    /// The attacking player's team name
    pub team_name: String,
}

/// Routes sabotage triggers to opposing sessions
pub trait SabotageDispatcher {
    /// Picks the opposing team a sabotage from `source_team` should hit
    ///
    /// Returns `None` when there is no opposing session to target, in
    /// which case the trigger is dropped (the charge stays spent).
    fn target_team(&self, source_team: Id) -> Option<Id>;

    /// Forwards a trouble flipper to the target team's session
    fn route_trouble_flipper(&self, source: SabotageSource, target_team: Id);

    /// Forwards a green shell to the target team's session
    fn route_green_shell(&self, target_team: Id);
}
