//! Puzzle board state and piece bookkeeping
//!
//! This module contains the shuffled board a team reassembles: an ordered
//! sequence of pieces, each carrying the grid position it belongs in when
//! the puzzle is solved, plus the selection fields that track which player
//! is currently holding a piece. The board itself is a plain value; the
//! session wraps it in its lock and serializes all access.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use web_time::SystemTime;

use crate::id::Id;

/// Errors raised by board lookups
///
/// A failed lookup means the permutation invariant was violated or an
/// out-of-range index was supplied. It is an internal-consistency signal:
/// handlers log it and abort without mutating the board.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No piece on the board carries the requested target index
    #[error("no piece found for target index {target_index}")]
    PieceNotFound {
        /// The target index that failed to resolve
        target_index: usize,
    },
}

/// A single piece of the sliding puzzle
///
/// The `target_index` is the piece's immutable identity: the position it
/// occupies once the puzzle is solved. Its current position is implicit in
/// the board's ordering. The selection fields record which player is
/// holding the piece and since when.
#[serde_with::serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzlePiece {
    /// Grid position this piece belongs in when the puzzle is solved
    pub target_index: usize,
    /// Player currently holding the piece, if any
    #[serde(default)]
    pub selected_by: Option<Id>,
    /// When the current hold started, as epoch milliseconds on the wire
    #[serde(default)]
    #[serde_as(as = "Option<serde_with::TimestampMilliSeconds<i64>>")]
    pub selected_at: Option<SystemTime>,
}

impl PuzzlePiece {
    /// Creates an unselected piece with the given target index
    pub fn new(target_index: usize) -> Self {
        Self {
            target_index,
            selected_by: None,
            selected_at: None,
        }
    }

    /// Returns whether a player is currently holding this piece
    pub fn is_selected(&self) -> bool {
        self.selected_by.is_some()
    }

    /// Returns whether the current hold is older than `threshold` at `now`
    ///
    /// An unselected piece is never stale. A hold timestamp in the future
    /// (clock skew) counts as fresh.
    pub fn is_stale(&self, now: SystemTime, threshold: Duration) -> bool {
        self.selected_at
            .and_then(|at| now.duration_since(at).ok())
            .is_some_and(|age| age >= threshold)
    }

    /// Clears the selection owner and timestamp
    pub fn release(&mut self) {
        self.selected_by = None;
        self.selected_at = None;
    }
}

/// The ordered sequence of pieces a team reassembles
///
/// Holds exactly N² pieces whose target indices form a permutation of
/// `0..N²`. Solved means every position holds the piece that belongs
/// there; the solved flag latches and is never reset.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PuzzleBoard {
    pieces: Vec<PuzzlePiece>,
    correct_pieces: usize,
    solved: bool,
}

impl PuzzleBoard {
    /// Builds and shuffles a fresh board of `side_length`² pieces
    ///
    /// Replaces any previous contents; callers that need start-only
    /// idempotency guard before calling.
    pub fn initialize(&mut self, side_length: usize) {
        let piece_count = side_length * side_length;
        self.pieces = (0..piece_count).map(PuzzlePiece::new).collect();
        self.correct_pieces = 0;
        self.solved = false;
        self.shuffle();
    }

    /// Builds a board whose positions hold the given target indices in order
    ///
    /// The caller supplies a permutation of `0..order.len()`; this is the
    /// deterministic counterpart of [`PuzzleBoard::initialize`] used to
    /// restore or stage a known arrangement.
    pub fn with_order(order: impl IntoIterator<Item = usize>) -> Self {
        Self {
            pieces: order.into_iter().map(PuzzlePiece::new).collect(),
            correct_pieces: 0,
            solved: false,
        }
    }

    /// Applies a uniform random permutation to the piece order
    pub fn shuffle(&mut self) {
        fastrand::shuffle(&mut self.pieces);
    }

    /// Returns the number of pieces on the board
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Returns whether the board has been initialized with any pieces
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Finds the current position of the piece with the given target index
    ///
    /// # Errors
    ///
    /// Returns [`Error::PieceNotFound`] if no piece carries `target_index`.
    pub fn position_of(&self, target_index: usize) -> Result<usize, Error> {
        self.pieces
            .iter()
            .position(|piece| piece.target_index == target_index)
            .ok_or(Error::PieceNotFound { target_index })
    }

    /// Returns the piece with the given target index
    ///
    /// # Errors
    ///
    /// Returns [`Error::PieceNotFound`] if no piece carries `target_index`.
    pub fn piece(&self, target_index: usize) -> Result<&PuzzlePiece, Error> {
        self.position_of(target_index).map(|pos| &self.pieces[pos])
    }

    /// Returns a mutable reference to the piece with the given target index
    ///
    /// # Errors
    ///
    /// Returns [`Error::PieceNotFound`] if no piece carries `target_index`.
    pub fn piece_mut(&mut self, target_index: usize) -> Result<&mut PuzzlePiece, Error> {
        self.position_of(target_index)
            .map(|pos| &mut self.pieces[pos])
    }

    /// Returns the piece currently occupying the given board position
    pub fn piece_at(&self, position: usize) -> Option<&PuzzlePiece> {
        self.pieces.get(position)
    }

    /// Exchanges the positions of the pieces carrying the two target indices
    ///
    /// Swapping always releases both pieces' selections. Identical target
    /// indices leave the board untouched. Both pieces are resolved before
    /// anything is written, so a failed lookup never corrupts state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PieceNotFound`] if either target index does not
    /// resolve to a piece.
    pub fn swap(&mut self, target_a: usize, target_b: usize) -> Result<(), Error> {
        if target_a == target_b {
            return Ok(());
        }
        let position_a = self.position_of(target_a)?;
        let position_b = self.position_of(target_b)?;
        self.pieces.swap(position_a, position_b);
        self.pieces[position_a].release();
        self.pieces[position_b].release();
        Ok(())
    }

    /// Recomputes the correct-piece count and latches the solved flag
    ///
    /// Returns whether the board is solved. An empty board is never
    /// solved. Once latched, the flag stays set regardless of later
    /// mutations (the session freezes the board on solve anyway).
    pub fn check_solved(&mut self) -> bool {
        if self.pieces.is_empty() {
            return false;
        }
        self.correct_pieces = self
            .pieces
            .iter()
            .enumerate()
            .filter(|(position, piece)| piece.target_index == *position)
            .count();
        if self.correct_pieces == self.pieces.len() {
            self.solved = true;
        }
        self.solved
    }

    /// Returns the correct-piece count from the last solved check
    pub fn correct_pieces(&self) -> usize {
        self.correct_pieces
    }

    /// Returns whether the solved flag has latched
    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// Target indices of pieces currently sitting in their home position
    pub fn correct_targets(&self) -> Vec<usize> {
        self.pieces
            .iter()
            .enumerate()
            .filter(|(position, piece)| piece.target_index == *position)
            .map(|(_, piece)| piece.target_index)
            .collect()
    }

    /// Releases every hold older than `threshold` at `now`
    ///
    /// Returns whether any piece changed.
    pub fn release_stale(&mut self, now: SystemTime, threshold: Duration) -> bool {
        let mut changed = false;
        for piece in &mut self.pieces {
            if piece.is_stale(now, threshold) {
                piece.release();
                changed = true;
            }
        }
        changed
    }

    /// Clones the current piece sequence for publishing
    pub fn snapshot(&self) -> Vec<PuzzlePiece> {
        self.pieces.clone()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn id() -> Id {
        Id::new()
    }

    #[test]
    fn test_initialize_builds_a_permutation() {
        for side in 2..=5 {
            let mut board = PuzzleBoard::default();
            board.initialize(side);

            assert_eq!(board.len(), side * side);
            let targets = board
                .snapshot()
                .iter()
                .map(|piece| piece.target_index)
                .sorted()
                .collect_vec();
            assert_eq!(targets, (0..side * side).collect_vec());
        }
    }

    #[test]
    fn test_initialize_resets_previous_state() {
        let mut board = PuzzleBoard::with_order([0, 1, 2, 3]);
        board.check_solved();
        assert!(board.is_solved());

        board.initialize(3);
        assert_eq!(board.len(), 9);
        assert!(!board.is_solved());
        assert_eq!(board.correct_pieces(), 0);
    }

    #[test]
    fn test_position_of_and_piece() {
        let board = PuzzleBoard::with_order([2, 0, 3, 1]);
        assert_eq!(board.position_of(2).unwrap(), 0);
        assert_eq!(board.position_of(1).unwrap(), 3);
        assert_eq!(board.piece(3).unwrap().target_index, 3);
        assert_eq!(
            board.position_of(7),
            Err(Error::PieceNotFound { target_index: 7 })
        );
    }

    #[test]
    fn test_swap_exchanges_positions_and_releases_selections() {
        let mut board = PuzzleBoard::with_order([2, 0, 3, 1]);
        let holder = id();
        {
            let piece = board.piece_mut(2).unwrap();
            piece.selected_by = Some(holder);
            piece.selected_at = Some(SystemTime::now());
        }

        board.swap(2, 0).unwrap();

        let order = board
            .snapshot()
            .iter()
            .map(|piece| piece.target_index)
            .collect_vec();
        assert_eq!(order, vec![0, 2, 3, 1]);
        assert!(!board.piece(2).unwrap().is_selected());
        assert!(!board.piece(0).unwrap().is_selected());
        assert_eq!(board.piece(2).unwrap().selected_at, None);
    }

    #[test]
    fn test_swap_back_restores_order_but_not_selection() {
        let mut board = PuzzleBoard::with_order([2, 0, 3, 1]);
        {
            let piece = board.piece_mut(0).unwrap();
            piece.selected_by = Some(id());
            piece.selected_at = Some(SystemTime::now());
        }

        board.swap(2, 0).unwrap();
        board.swap(2, 0).unwrap();

        let order = board
            .snapshot()
            .iter()
            .map(|piece| piece.target_index)
            .collect_vec();
        assert_eq!(order, vec![2, 0, 3, 1]);
        // selection release is one-way
        assert!(!board.piece(0).unwrap().is_selected());
    }

    #[test]
    fn test_swap_same_target_is_a_no_op() {
        let mut board = PuzzleBoard::with_order([2, 0, 3, 1]);
        {
            let piece = board.piece_mut(2).unwrap();
            piece.selected_by = Some(id());
        }

        board.swap(2, 2).unwrap();

        let order = board
            .snapshot()
            .iter()
            .map(|piece| piece.target_index)
            .collect_vec();
        assert_eq!(order, vec![2, 0, 3, 1]);
        assert!(board.piece(2).unwrap().is_selected());
    }

    #[test]
    fn test_swap_unknown_target_leaves_board_unchanged() {
        let mut board = PuzzleBoard::with_order([2, 0, 3, 1]);
        let before = board.snapshot();

        assert_eq!(
            board.swap(2, 9),
            Err(Error::PieceNotFound { target_index: 9 })
        );
        assert_eq!(board.snapshot(), before);
    }

    #[test]
    fn test_check_solved_counts_and_latches() {
        let mut board = PuzzleBoard::with_order([0, 2, 1, 3]);
        assert!(!board.check_solved());
        assert_eq!(board.correct_pieces(), 2);

        board.swap(2, 1).unwrap();
        assert!(board.check_solved());
        assert_eq!(board.correct_pieces(), 4);
        assert!(board.is_solved());
    }

    #[test]
    fn test_empty_board_is_not_solved() {
        let mut board = PuzzleBoard::default();
        assert!(!board.check_solved());
    }

    #[test]
    fn test_correct_targets() {
        let board = PuzzleBoard::with_order([0, 2, 1, 3]);
        assert_eq!(board.correct_targets(), vec![0, 3]);
    }

    #[test]
    fn test_release_stale_clears_old_holds_only() {
        let now = SystemTime::now();
        let mut board = PuzzleBoard::with_order([1, 0, 2, 3]);
        {
            let piece = board.piece_mut(1).unwrap();
            piece.selected_by = Some(id());
            piece.selected_at = now.checked_sub(Duration::from_secs(11));
        }
        {
            let piece = board.piece_mut(2).unwrap();
            piece.selected_by = Some(id());
            piece.selected_at = now.checked_sub(Duration::from_secs(3));
        }

        let changed = board.release_stale(now, Duration::from_secs(10));

        assert!(changed);
        assert!(!board.piece(1).unwrap().is_selected());
        assert!(board.piece(2).unwrap().is_selected());
    }

    #[test]
    fn test_release_stale_exactly_at_threshold() {
        let now = SystemTime::now();
        let mut board = PuzzleBoard::with_order([0, 1]);
        {
            let piece = board.piece_mut(0).unwrap();
            piece.selected_by = Some(id());
            piece.selected_at = now.checked_sub(Duration::from_secs(10));
        }

        assert!(board.release_stale(now, Duration::from_secs(10)));
        assert!(!board.piece(0).unwrap().is_selected());
    }

    #[test]
    fn test_release_stale_without_holds_reports_no_change() {
        let mut board = PuzzleBoard::with_order([1, 0]);
        assert!(!board.release_stale(SystemTime::now(), Duration::from_secs(10)));
    }

    #[test]
    fn test_piece_staleness_ignores_future_timestamps() {
        let now = SystemTime::now();
        let mut piece = PuzzlePiece::new(0);
        piece.selected_by = Some(id());
        piece.selected_at = Some(now + Duration::from_secs(60));

        assert!(!piece.is_stale(now, Duration::from_secs(10)));
    }
}
