//! Per-team game session state machine
//!
//! This module contains the session that owns one team's puzzle for one
//! game: the lock-guarded board, the action handlers the transport layer
//! feeds, the character ability effects, the periodic stale-selection
//! sweep, and win detection. Handlers are invoked concurrently by the
//! embedding server's task pool; every read-modify-write on the board and
//! team goes through the session lock, and snapshots are published only
//! after the lock is released.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use garde::Validate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use web_time::SystemTime;

use crate::{
    board::PuzzleBoard,
    character::CharacterType,
    constants,
    dispatch::{SabotageDispatcher, SabotageSource},
    id::Id,
    player::Player,
    session::{ActionRoutes, Publisher},
    team::Team,
};

pub use crate::board::PuzzlePiece;

/// Configuration options for a game session
///
/// Validated bounds keep the board scannable and the roster within the
/// five-variant character pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct Options {
    /// Side length N of the N×N puzzle grid
    #[garde(range(min = crate::constants::puzzle::MIN_SIDE_LENGTH, max = crate::constants::puzzle::MAX_SIDE_LENGTH))]
    puzzle_size: usize,
    /// Roster capacity, used for bonus-character distribution
    #[garde(range(min = crate::constants::team::MIN_PLAYERS_PER_TEAM, max = crate::constants::team::MAX_PLAYERS_PER_TEAM))]
    players_per_team: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            puzzle_size: constants::puzzle::DEFAULT_SIDE_LENGTH,
            players_per_team: constants::team::DEFAULT_PLAYERS_PER_TEAM,
        }
    }
}

impl Options {
    /// Creates options with the given board size and roster capacity
    pub fn new(puzzle_size: usize, players_per_team: usize) -> Self {
        Self {
            puzzle_size,
            players_per_team,
        }
    }

    /// Side length of the puzzle grid
    pub fn puzzle_size(&self) -> usize {
        self.puzzle_size
    }

    /// Configured roster capacity
    pub fn players_per_team(&self) -> usize {
        self.players_per_team
    }
}

/// A piece as referenced by an inbound action
///
/// Clients address pieces by target index; the optional `selected_by`
/// carries the requested selection owner for select/deselect intents.
#[derive(Debug, Clone, Deserialize)]
pub struct PieceRef {
    /// Target index of the referenced piece
    pub index: usize,
    /// Requested selection owner (`None` asks to deselect)
    #[serde(default)]
    pub selected_by: Option<Id>,
}

/// Swap two pieces, attributed to the acting player for scoring
#[derive(Debug, Clone, Deserialize)]
pub struct SwapPiecesMessage {
    /// First piece of the swap
    pub piece1: PieceRef,
    /// Second piece of the swap
    pub piece2: PieceRef,
    /// Acting player, if the transport identified one
    #[serde(default)]
    pub client_id: Option<Id>,
}

/// Select or deselect a piece
#[derive(Debug, Clone, Deserialize)]
pub struct SelectPieceMessage {
    /// The piece with the requested selection state
    pub piece: PieceRef,
    /// The requesting player
    #[serde(default)]
    pub client_id: Option<Id>,
}

/// Administratively clear a stuck selection
#[derive(Debug, Clone, Deserialize)]
pub struct ResetPieceMessage {
    /// The piece to inspect
    pub piece: PieceRef,
}

/// Claim a character variant, or force-assign all unfilled slots
#[derive(Debug, Clone, Deserialize)]
pub struct PickCharacterMessage {
    /// Requesting player; `None` means force-assign everything unfilled
    #[serde(default)]
    pub client_id: Option<Id>,
    /// The requested variant
    pub character: CharacterType,
}

/// Trigger Mario's star power on a chosen piece
#[derive(Debug, Clone, Deserialize)]
pub struct StarPowerMessage {
    /// The piece to cheat into its home slot
    pub piece: PieceRef,
}

/// Trigger Peach's heal on a teammate's character
#[derive(Debug, Clone, Deserialize)]
pub struct PeachHealMessage {
    /// The variant whose holder should be healed
    pub character: CharacterType,
}

/// Inbound player actions delivered on a session's team channels
///
/// The transport layer scopes these per team, so no team identity travels
/// in the payload.
#[derive(Debug, Clone, Deserialize)]
pub enum IncomingMessage {
    /// Swap two pieces
    SwapPieces(SwapPiecesMessage),
    /// Select or deselect a piece
    SelectPiece(SelectPieceMessage),
    /// Clear a stuck selection
    ResetPiece(ResetPieceMessage),
    /// Claim a character or force-assign the leftovers
    PickCharacter(PickCharacterMessage),
    /// Mario's ability
    StarPower(StarPowerMessage),
    /// Peach's ability
    PeachHeal(PeachHealMessage),
    /// Yoshi's ability
    YoshiGuard,
    /// Bowser's sabotage, routed to an opposing team
    TroubleFlipper,
    /// Goomba's sabotage, routed to an opposing team
    GreenShell,
    /// Re-broadcast the current puzzle state
    QueryGame,
}

/// Full puzzle snapshot published to the team channel after every action
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePuzzleMessage {
    /// Owning team's id
    pub team_id: Id,
    /// Owning team's display name
    pub team_name: String,
    /// Name of the puzzle image being assembled
    pub puzzle_name: Option<String>,
    /// Pieces currently in their home position
    pub correct_pieces: usize,
    /// The full board in current order
    pub puzzle: Vec<PuzzlePiece>,
    /// Whether the puzzle has been solved
    pub game_won: bool,
    /// Puzzles the team has completed so far
    pub completed_games: u32,
    /// Roster with characters and move statistics
    pub players: Vec<Player>,
    /// Whether the enclosing tournament has ended this session
    pub session_ended: bool,
}

/// Character availability snapshot published after pick requests
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCharacterMessage {
    /// Owning team's id
    pub team_id: Id,
    /// Owning team's display name
    pub team_name: String,
    /// Variants still unclaimed; omitted when force-assigning
    pub available_characters: Option<Vec<CharacterType>>,
    /// Roster with current character assignments
    pub players: Vec<Player>,
}

/// Scheduled callbacks delivered back into the session
///
/// The external scheduler owes the session one delivery per `schedule`
/// call; the session cancels recurring work simply by not rescheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Periodic stale-selection sweep tick
    SweepSelections,
    /// One-shot expiry of a yoshi guard window
    ClearImmunity,
}

/// Observer notified exactly once when a session's puzzle is solved
pub trait GameOverListener: Send + Sync {
    /// Called on the winning session after the final snapshot is published
    fn game_over(&self, game: &Game);
}

/// State guarded by the session lock
///
/// The board and team live under one lock so immunity checks, roster
/// lookups, and board mutations inside a handler form a single critical
/// section.
struct SessionState {
    board: PuzzleBoard,
    team: Team,
    puzzle_name: Option<String>,
}

/// One team's game session
///
/// Owns the team and its board for the duration of a single puzzle.
/// Handlers take `&self` and may run concurrently; the `stopped` flag is
/// read without the lock for cheap early exit and only ever transitions
/// false to true.
pub struct Game {
    team_id: Id,
    options: Options,
    state: Mutex<SessionState>,
    stopped: AtomicBool,
    routes_removed: AtomicBool,
    game_over_listeners: Mutex<Vec<Arc<dyn GameOverListener>>>,
}

impl Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

// Construction and plain accessors
impl Game {
    /// Creates a session for the given team
    ///
    /// The board stays empty until [`Game::start`] shuffles it.
    pub fn new(team: Team, options: Options) -> Self {
        Self {
            team_id: team.id(),
            options,
            state: Mutex::new(SessionState {
                board: PuzzleBoard::default(),
                team,
                puzzle_name: None,
            }),
            stopped: AtomicBool::new(false),
            routes_removed: AtomicBool::new(false),
            game_over_listeners: Mutex::new(Vec::new()),
        }
    }

    /// The owning team's id
    pub fn team_id(&self) -> Id {
        self.team_id
    }

    /// The owning team's display name
    pub fn team_name(&self) -> String {
        self.state.lock().team.name().to_owned()
    }

    /// Name of the puzzle drawn for this game, once started
    pub fn puzzle_name(&self) -> Option<String> {
        self.state.lock().puzzle_name.clone()
    }

    /// Whether the puzzle has been solved
    pub fn is_game_over(&self) -> bool {
        self.state.lock().board.is_solved()
    }

    /// Whether the enclosing tournament has stopped this session
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Whether the team is currently shielded from sabotage
    pub fn is_immune(&self) -> bool {
        self.state.lock().team.is_immune()
    }

    /// Correct-piece count from the last solved check
    pub fn correct_pieces(&self) -> usize {
        self.state.lock().board.correct_pieces()
    }

    /// Clones the current board ordering
    pub fn puzzle_snapshot(&self) -> Vec<PuzzlePiece> {
        self.state.lock().board.snapshot()
    }

    /// Clones the current roster
    pub fn players(&self) -> Vec<Player> {
        self.state.lock().team.players().to_vec()
    }

    /// Puzzles the team has completed so far
    pub fn completed_games(&self) -> u32 {
        self.state.lock().team.completed_games()
    }

    /// Bumps the team's completed-game counter
    pub fn record_completed_game(&self) {
        self.state.lock().team.record_completed_game();
    }

    /// Adds a player to the roster
    pub fn add_player(&self, player: Player) {
        self.state.lock().team.add_player(player);
    }

    /// Removes a player from the roster, freeing their character slots
    pub fn remove_player(&self, client_id: Id) -> Option<Player> {
        self.state.lock().team.remove_player(client_id)
    }

    /// Whether every character slot that matters for this roster is filled
    pub fn characters_ready(&self) -> bool {
        let guard = self.state.lock();
        let mut available = guard.team.available_characters();
        if guard.team.players().len() == 1 {
            available.retain(|kind| *kind != CharacterType::Peach);
        }
        available.is_empty()
    }

    /// Registers a completion observer
    pub fn add_game_over_listener(&self, listener: Arc<dyn GameOverListener>) {
        self.game_over_listeners.lock().push(listener);
    }

    /// Drops all registered completion observers
    pub fn clear_game_over_listeners(&self) {
        self.game_over_listeners.lock().clear();
    }
}

// Lifecycle
impl Game {
    /// Shuffles the board and schedules the first sweep tick
    ///
    /// Draws the puzzle name from the team's rotation. Calling start on an
    /// already-started session is a logged no-op.
    pub fn start<S: FnMut(AlarmMessage, Duration)>(&self, mut schedule: S) {
        {
            let mut guard = self.state.lock();
            if !guard.board.is_empty() {
                tracing::warn!(team = %self.team_id, "session already started");
                return;
            }
            let SessionState {
                board,
                team,
                puzzle_name,
            } = &mut *guard;
            *puzzle_name = team.next_puzzle_name();
            board.initialize(self.options.puzzle_size());
        }
        schedule(AlarmMessage::SweepSelections, constants::timing::SWEEP_INTERVAL);
    }

    /// Stops the session on behalf of the enclosing tournament
    ///
    /// Sets the terminal stopped flag, tears down the inbound routes, and
    /// reports whether the board happened to be solved already. Does not
    /// mutate the board.
    pub fn stop<R: ActionRoutes>(&self, routes: &R) -> bool {
        self.stopped.store(true, Ordering::SeqCst);
        self.deregister_routes(routes);
        self.state.lock().board.check_solved()
    }

    fn deregister_routes<R: ActionRoutes>(&self, routes: &R) {
        if !self.routes_removed.swap(true, Ordering::SeqCst) {
            routes.deregister(self.team_id);
        }
    }
}

// Inbound dispatch
impl Game {
    /// Handles one inbound player action
    ///
    /// Entry point for the transport layer; safe to call from any thread.
    /// Becomes a no-op once the session is stopped.
    pub fn receive_message<P, R, D, S>(
        &self,
        message: IncomingMessage,
        publisher: &P,
        routes: &R,
        dispatcher: &D,
        schedule: S,
    ) where
        P: Publisher,
        R: ActionRoutes,
        D: SabotageDispatcher,
        S: FnMut(AlarmMessage, Duration),
    {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        match message {
            IncomingMessage::SwapPieces(message) => self.handle_swap(message, publisher, routes),
            IncomingMessage::SelectPiece(message) => {
                self.handle_select(message, publisher, routes);
            }
            IncomingMessage::ResetPiece(message) => self.handle_reset(message, publisher, routes),
            IncomingMessage::PickCharacter(message) => {
                self.handle_pick_character(message, publisher);
            }
            IncomingMessage::StarPower(message) => {
                self.handle_star_power(message, publisher, routes);
            }
            IncomingMessage::PeachHeal(message) => {
                self.handle_peach_heal(message, publisher, routes);
            }
            IncomingMessage::YoshiGuard => self.handle_yoshi_guard(publisher, routes, schedule),
            IncomingMessage::TroubleFlipper => self.handle_trouble_flipper(dispatcher),
            IncomingMessage::GreenShell => self.handle_green_shell(dispatcher),
            IncomingMessage::QueryGame => self.publish_puzzle_update(publisher, routes, false),
        }
    }

    /// Handles a scheduled callback
    ///
    /// The sweep tick reschedules itself until the session is solved or
    /// stopped; the immunity expiry fires once.
    pub fn receive_alarm<P, R, S>(
        &self,
        message: AlarmMessage,
        publisher: &P,
        routes: &R,
        mut schedule: S,
    ) where
        P: Publisher,
        R: ActionRoutes,
        S: FnMut(AlarmMessage, Duration),
    {
        match message {
            AlarmMessage::SweepSelections => {
                if self.stopped.load(Ordering::SeqCst) {
                    tracing::info!(team = %self.team_id, "selection sweep cancelled, session stopped");
                    return;
                }
                let changed = {
                    let mut guard = self.state.lock();
                    if guard.board.is_solved() {
                        tracing::info!(team = %self.team_id, "selection sweep cancelled, puzzle solved");
                        return;
                    }
                    guard.board.release_stale(
                        SystemTime::now(),
                        constants::timing::SELECTION_STALE_AFTER,
                    )
                };
                if changed {
                    self.publish_puzzle_update(publisher, routes, false);
                }
                schedule(AlarmMessage::SweepSelections, constants::timing::SWEEP_INTERVAL);
            }
            AlarmMessage::ClearImmunity => {
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                self.state.lock().team.set_immune(false);
                tracing::info!(team = %self.team_id, "yoshi guard expired");
            }
        }
    }
}

// Action handlers
impl Game {
    fn handle_swap<P: Publisher, R: ActionRoutes>(
        &self,
        message: SwapPiecesMessage,
        publisher: &P,
        routes: &R,
    ) {
        let target_a = message.piece1.index;
        let target_b = message.piece2.index;
        if target_a == target_b {
            tracing::debug!(team = %self.team_id, target_index = target_a, "ignoring swap of a piece with itself");
            return;
        }
        {
            let mut guard = self.state.lock();
            let SessionState { board, team, .. } = &mut *guard;
            match (board.position_of(target_a), board.position_of(target_b)) {
                (Ok(position_a), Ok(position_b)) => {
                    if let Some(client_id) = message.client_id {
                        score_swap(team, client_id, (position_a, target_a), (position_b, target_b));
                    }
                    if !board.is_solved() {
                        if let Err(err) = board.swap(target_a, target_b) {
                            tracing::error!(team = %self.team_id, %err, "unable to swap pieces");
                        }
                    }
                }
                (Err(err), _) | (_, Err(err)) => {
                    tracing::error!(team = %self.team_id, %err, "unable to swap pieces");
                }
            }
        }
        self.publish_puzzle_update(publisher, routes, false);
    }

    fn handle_select<P: Publisher, R: ActionRoutes>(
        &self,
        message: SelectPieceMessage,
        publisher: &P,
        routes: &R,
    ) {
        {
            let mut guard = self.state.lock();
            let SessionState { board, team, .. } = &mut *guard;
            match board.piece_mut(message.piece.index) {
                Ok(piece) => match (piece.selected_by, message.piece.selected_by) {
                    (None, Some(requested)) => {
                        if team.player(requested).is_some() {
                            piece.selected_by = Some(requested);
                            piece.selected_at = Some(SystemTime::now());
                        } else {
                            tracing::debug!(team = %self.team_id, player = %requested, "select request from unknown player ignored");
                        }
                    }
                    (Some(holder), None) => {
                        if message.client_id == Some(holder) {
                            piece.release();
                        } else {
                            tracing::debug!(team = %self.team_id, holder = %holder, "deselect request from non-holder ignored");
                        }
                    }
                    _ => {
                        tracing::debug!(team = %self.team_id, target_index = message.piece.index, "ignoring redundant selection transition");
                    }
                },
                Err(err) => {
                    tracing::error!(team = %self.team_id, %err, "unable to select piece");
                }
            }
        }
        self.publish_puzzle_update(publisher, routes, false);
    }

    fn handle_reset<P: Publisher, R: ActionRoutes>(
        &self,
        message: ResetPieceMessage,
        publisher: &P,
        routes: &R,
    ) {
        {
            let mut guard = self.state.lock();
            let SessionState { board, team, .. } = &mut *guard;
            match board.piece_mut(message.piece.index) {
                Ok(piece) => match piece.selected_by {
                    None => piece.selected_at = None,
                    Some(holder) => {
                        let off_roster = team.player(holder).is_none();
                        if off_roster
                            || piece.is_stale(
                                SystemTime::now(),
                                constants::timing::SELECTION_STALE_AFTER,
                            )
                        {
                            piece.release();
                        }
                    }
                },
                Err(err) => {
                    tracing::error!(team = %self.team_id, %err, "unable to reset piece");
                }
            }
        }
        self.publish_puzzle_update(publisher, routes, false);
    }

    fn handle_pick_character<P: Publisher>(&self, message: PickCharacterMessage, publisher: &P) {
        match message.client_id {
            None => self.publish_characters_update(publisher, true),
            Some(client_id) => {
                {
                    let mut guard = self.state.lock();
                    let SessionState { team, .. } = &mut *guard;
                    if team.character_holder(message.character).is_none()
                        && team.choose_character(message.character, client_id)
                    {
                        tracing::info!(team = %self.team_id, player = %client_id, character = ?message.character, "character picked");
                    }
                }
                self.publish_characters_update(publisher, false);
            }
        }
    }

    fn handle_star_power<P: Publisher, R: ActionRoutes>(
        &self,
        message: StarPowerMessage,
        publisher: &P,
        routes: &R,
    ) {
        {
            let mut guard = self.state.lock();
            let SessionState { board, team, .. } = &mut *guard;
            let Some(mario) = self.consume_charge(team, CharacterType::Mario) else {
                return;
            };
            tracing::debug!(team = %self.team_id, "mario used star power");
            let target = message.piece.index;
            match board.piece_at(target).map(|piece| piece.target_index) {
                None => {
                    tracing::error!(team = %self.team_id, target_index = target, "star power aimed outside the board");
                }
                Some(occupant) if occupant == target => {
                    tracing::debug!(team = %self.team_id, target_index = target, "star power piece already in place");
                }
                Some(occupant) => match board.position_of(target) {
                    Ok(position) => {
                        score_swap(team, mario, (position, target), (target, occupant));
                        if !board.is_solved() {
                            if let Err(err) = board.swap(target, occupant) {
                                tracing::error!(team = %self.team_id, %err, "unable to apply star power");
                            }
                        }
                    }
                    Err(err) => {
                        tracing::error!(team = %self.team_id, %err, "unable to apply star power");
                    }
                },
            }
        }
        self.publish_puzzle_update(publisher, routes, false);
    }

    fn handle_peach_heal<P: Publisher, R: ActionRoutes>(
        &self,
        message: PeachHealMessage,
        publisher: &P,
        routes: &R,
    ) {
        {
            let mut guard = self.state.lock();
            let SessionState { team, .. } = &mut *guard;
            let Some(target_holder) = team.character_holder(message.character) else {
                tracing::info!(team = %self.team_id, character = ?message.character, "no player to heal");
                return;
            };
            if self.consume_charge(team, CharacterType::Peach).is_none() {
                return;
            }
            match team
                .player_mut(target_holder)
                .and_then(|player| player.character_state_mut(message.character))
            {
                Some(character) => {
                    if character.heal() {
                        tracing::info!(team = %self.team_id, character = ?message.character, "peach healed a teammate");
                    } else {
                        tracing::debug!(team = %self.team_id, character = ?message.character, "heal target already undamaged");
                    }
                }
                None => {
                    tracing::error!(team = %self.team_id, character = ?message.character, "holder table out of sync with player characters");
                }
            }
        }
        self.publish_puzzle_update(publisher, routes, false);
    }

    fn handle_yoshi_guard<P, R, S>(&self, publisher: &P, routes: &R, mut schedule: S)
    where
        P: Publisher,
        R: ActionRoutes,
        S: FnMut(AlarmMessage, Duration),
    {
        {
            let mut guard = self.state.lock();
            let SessionState { team, .. } = &mut *guard;
            if self.consume_charge(team, CharacterType::Yoshi).is_none() {
                return;
            }
            team.set_immune(true);
        }
        tracing::info!(team = %self.team_id, window = ?constants::timing::IMMUNITY_WINDOW, "team is protected by yoshi guard");
        schedule(AlarmMessage::ClearImmunity, constants::timing::IMMUNITY_WINDOW);
        self.publish_puzzle_update(publisher, routes, false);
    }

    fn handle_trouble_flipper<D: SabotageDispatcher>(&self, dispatcher: &D) {
        let source = {
            let mut guard = self.state.lock();
            let SessionState { team, .. } = &mut *guard;
            let Some(bowser) = self.consume_charge(team, CharacterType::Bowser) else {
                return;
            };
            SabotageSource {
                player: bowser,
                gamer_tag: team
                    .player(bowser)
                    .map(|player| player.gamer_tag().to_owned())
                    .unwrap_or_default(),
                team_name: team.name().to_owned(),
            }
        };
        match dispatcher.target_team(self.team_id) {
            Some(target) => dispatcher.route_trouble_flipper(source, target),
            None => {
                tracing::debug!(team = %self.team_id, "no opposing team for trouble flipper");
            }
        }
    }

    fn handle_green_shell<D: SabotageDispatcher>(&self, dispatcher: &D) {
        {
            let mut guard = self.state.lock();
            let SessionState { team, .. } = &mut *guard;
            if self.consume_charge(team, CharacterType::Goomba).is_none() {
                return;
            }
        }
        match dispatcher.target_team(self.team_id) {
            Some(target) => dispatcher.route_green_shell(target),
            None => {
                tracing::debug!(team = %self.team_id, "no opposing team for green shell");
            }
        }
    }

    /// Resolves a character holder and spends one ability charge
    ///
    /// Returns the holder's id, or `None` (with a diagnostic) if the
    /// variant has no holder or the charge is exhausted.
    fn consume_charge(&self, team: &mut Team, kind: CharacterType) -> Option<Id> {
        let Some(player) = team.holder_player_mut(kind) else {
            tracing::info!(team = %self.team_id, character = ?kind, "no holder for character");
            return None;
        };
        let client_id = player.client_id();
        let Some(character) = player.character_state_mut(kind) else {
            tracing::error!(team = %self.team_id, character = ?kind, "holder table out of sync with player characters");
            return None;
        };
        if !character.use_charge() {
            tracing::info!(team = %self.team_id, character = ?kind, "ability charge exhausted");
            return None;
        }
        Some(client_id)
    }
}

// Sabotage entry points, called by the dispatcher on the target session
impl Game {
    /// Applies an opposing team's trouble flipper to this session's board
    ///
    /// Fully reshuffles the board unless the team is immune, the puzzle is
    /// already solved, or the session is stopped. The immunity check and
    /// the reshuffle happen in one critical section.
    pub fn trouble_flipper<P: Publisher, R: ActionRoutes>(
        &self,
        source: &SabotageSource,
        publisher: &P,
        routes: &R,
    ) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let flipped = {
            let mut guard = self.state.lock();
            let SessionState { board, team, .. } = &mut *guard;
            if board.is_solved() {
                false
            } else if team.is_immune() {
                tracing::info!(
                    team = %self.team_id,
                    attacker = %source.gamer_tag,
                    attacker_team = %source.team_name,
                    "yoshi guard blocked a trouble flipper"
                );
                false
            } else {
                tracing::info!(
                    team = %self.team_id,
                    attacker = %source.gamer_tag,
                    attacker_team = %source.team_name,
                    "trouble flipper reshuffled the board"
                );
                board.shuffle();
                true
            }
        };
        if flipped {
            self.publish_puzzle_update(publisher, routes, false);
        }
    }

    /// Applies an opposing team's green shell to this session's board
    ///
    /// Randomly permutes the currently-correct subset and swaps two of
    /// them. Fewer than two correct pieces leave the board untouched.
    /// Blocked by immunity, a solved puzzle, or a stopped session.
    pub fn green_shell<P: Publisher, R: ActionRoutes>(&self, publisher: &P, routes: &R) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let shelled = {
            let mut guard = self.state.lock();
            let SessionState { board, team, .. } = &mut *guard;
            if board.is_solved() {
                false
            } else if team.is_immune() {
                tracing::info!(team = %self.team_id, "yoshi guard blocked a green shell");
                false
            } else {
                let mut correct = board.correct_targets();
                fastrand::shuffle(&mut correct);
                if correct.len() >= 2 {
                    if let Err(err) = board.swap(correct[0], correct[1]) {
                        tracing::error!(team = %self.team_id, %err, "unable to apply green shell");
                    }
                } else {
                    tracing::debug!(team = %self.team_id, correct = correct.len(), "green shell found nothing to scramble");
                }
                true
            }
        };
        if shelled {
            self.publish_puzzle_update(publisher, routes, false);
        }
    }
}

// Publishing and win detection
impl Game {
    /// Publishes the current puzzle snapshot to the team channel
    ///
    /// Runs the solved check under the lock; on the false-to-true
    /// transition it tears down the inbound routes and notifies every
    /// completion observer, exactly once across all concurrent callers.
    /// Publish failures are logged and swallowed.
    pub fn publish_puzzle_update<P: Publisher, R: ActionRoutes>(
        &self,
        publisher: &P,
        routes: &R,
        session_ended: bool,
    ) {
        let (message, newly_won) = {
            let mut guard = self.state.lock();
            let was_solved = guard.board.is_solved();
            let won = guard.board.check_solved();
            let message = UpdatePuzzleMessage {
                team_id: self.team_id,
                team_name: guard.team.name().to_owned(),
                puzzle_name: guard.puzzle_name.clone(),
                correct_pieces: guard.board.correct_pieces(),
                puzzle: guard.board.snapshot(),
                game_won: won,
                completed_games: guard.team.completed_games(),
                players: guard.team.players().to_vec(),
                session_ended,
            };
            (message, won && !was_solved)
        };
        if session_ended {
            tracing::info!(team = %self.team_id, "publishing session-ended update");
        }
        if let Err(err) = publisher.publish(self.team_id, &message.into()) {
            tracing::error!(team = %self.team_id, %err, "unable to publish puzzle update");
        }
        if newly_won {
            tracing::info!(team = %self.team_id, "team solved the puzzle");
            self.deregister_routes(routes);
            let listeners = self.game_over_listeners.lock().clone();
            for listener in listeners {
                listener.game_over(self);
            }
        }
    }

    /// Recomputes availability, runs pending assignment work, and
    /// publishes the character snapshot
    ///
    /// With `force_assign` set, unfilled variants are first handed out as
    /// primaries to players without one. Either way, once every player has
    /// a primary and the roster is short of capacity, leftover variants
    /// are distributed as bonus characters. Peach is excluded from the
    /// pool for single-player rosters.
    fn publish_characters_update<P: Publisher>(&self, publisher: &P, force_assign: bool) {
        let message = {
            let mut guard = self.state.lock();
            let SessionState { team, .. } = &mut *guard;
            let mut available = team.available_characters();
            if team.players().len() == 1 {
                available.retain(|kind| *kind != CharacterType::Peach);
            }
            if force_assign && !available.is_empty() {
                tracing::debug!(team = %self.team_id, "force assigning characters");
                let roster: Vec<Id> = team.players().iter().map(Player::client_id).collect();
                for client_id in roster {
                    if available.is_empty() {
                        break;
                    }
                    let needs_primary = team
                        .player(client_id)
                        .is_some_and(|player| player.character().is_none());
                    if needs_primary {
                        let kind = available.remove(0);
                        team.choose_character(kind, client_id);
                    }
                }
            }
            self.distribute_bonus_characters(team, &mut available);
            UpdateCharacterMessage {
                team_id: self.team_id,
                team_name: team.name().to_owned(),
                available_characters: (!force_assign).then_some(available),
                players: team.players().to_vec(),
            }
        };
        if let Err(err) = publisher.publish(self.team_id, &message.into()) {
            tracing::error!(team = %self.team_id, %err, "unable to publish character update");
        }
    }

    /// Hands out leftover variants as bonus characters
    ///
    /// Runs only when every roster member already has a primary and the
    /// roster is short of the configured capacity. Distributes at most the
    /// shortfall; a sole player receives them directly, otherwise
    /// recipients are drawn uniformly at random.
    fn distribute_bonus_characters(&self, team: &mut Team, available: &mut Vec<CharacterType>) {
        let roster_size = team.players().len();
        let capacity = self.options.players_per_team();
        if roster_size == 0 || roster_size >= capacity || available.is_empty() {
            return;
        }
        if team
            .players()
            .iter()
            .any(|player| player.character().is_none())
        {
            return;
        }
        let bonus_count = (capacity - roster_size).min(available.len());
        tracing::debug!(team = %self.team_id, bonus_count, "adding bonus characters");
        for _ in 0..bonus_count {
            let kind = available.remove(0);
            let recipient = if roster_size == 1 {
                team.players()[0].client_id()
            } else {
                team.players()[fastrand::usize(..roster_size)].client_id()
            };
            team.add_bonus_character(kind, recipient);
        }
    }
}

// Test hooks for staging deterministic board states
#[cfg(test)]
impl Game {
    pub(crate) fn set_board_order(&self, order: &[usize]) {
        self.state.lock().board = PuzzleBoard::with_order(order.iter().copied());
    }

    pub(crate) fn backdate_selection(&self, target_index: usize, age: Duration) {
        let mut guard = self.state.lock();
        if let Ok(piece) = guard.board.piece_mut(target_index) {
            piece.selected_at = SystemTime::now().checked_sub(age);
        }
    }
}

/// Updates a player's move counters for a swap about to happen
///
/// Positions are the pre-swap board positions of the two pieces. Wrong:
/// a piece already sitting in its home slot is being disturbed. Right: a
/// slot receives the piece that belongs there. The four checks are
/// independent and any combination may fire.
fn score_swap(team: &mut Team, client_id: Id, a: (usize, usize), b: (usize, usize)) {
    let Some(player) = team.player_mut(client_id) else {
        return;
    };
    tracing::debug!(player = %client_id, "updating player stats");
    let (position_a, target_a) = a;
    let (position_b, target_b) = b;
    if position_a == target_a {
        player.wrong_move();
    }
    if position_b == target_b {
        player.wrong_move();
    }
    if position_a == target_b {
        player.right_move();
    }
    if position_b == target_a {
        player.right_move();
    }
}
