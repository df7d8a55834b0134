//! Configuration constants for the puzzle game system
//!
//! This module contains the limits and fixed durations used throughout
//! the session core: board size bounds, team capacity bounds, character
//! charge levels, and the timing rules for selections and immunity.

/// Puzzle board configuration constants
pub mod puzzle {
    /// Minimum side length of the square puzzle grid
    pub const MIN_SIDE_LENGTH: usize = 2;
    /// Maximum side length of the square puzzle grid
    pub const MAX_SIDE_LENGTH: usize = 10;
    /// Default side length when no configuration is supplied
    pub const DEFAULT_SIDE_LENGTH: usize = 5;
}

/// Team roster configuration constants
pub mod team {
    /// Minimum number of players a team can be configured for
    pub const MIN_PLAYERS_PER_TEAM: usize = 1;
    /// Maximum number of players a team can be configured for
    pub const MAX_PLAYERS_PER_TEAM: usize = 5;
    /// Default team capacity, one slot per character variant
    pub const DEFAULT_PLAYERS_PER_TEAM: usize = 5;
}

/// Character ability configuration constants
pub mod characters {
    /// Ability charges a freshly assigned character starts with
    pub const INITIAL_CHARGE: u32 = 1;
}

/// Timing rules for selections and ability windows
pub mod timing {
    use std::time::Duration;

    /// How long a piece may stay selected before it is forcibly released
    pub const SELECTION_STALE_AFTER: Duration = Duration::from_secs(10);
    /// Interval between runs of the stale-selection sweep
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
    /// How long a yoshi guard protects the team from sabotage
    pub const IMMUNITY_WINDOW: Duration = Duration::from_secs(10);
}
