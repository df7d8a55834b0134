//! Transport seam between the session core and the message layer
//!
//! The session never talks to a broker directly: outbound snapshots go
//! through the [`Publisher`] trait and inbound routing is torn down through
//! [`ActionRoutes`]. Implementations might sit on top of MQTT, WebSockets,
//! or an in-process bus; the core only cares that publishing can fail and
//! that failure is survivable.

use thiserror::Error;

use crate::{UpdateMessage, id::Id};

/// A failed attempt to publish a snapshot to a team channel
///
/// The session logs these and moves on; the authoritative in-memory state
/// is unaffected and the next successful broadcast resynchronizes clients.
#[derive(Error, Debug, Clone)]
#[error("unable to publish to team channel: {0}")]
pub struct PublishError(
    /// Human-readable reason reported by the transport
    pub String,
);

/// Publishes outbound state updates onto a team-scoped channel
pub trait Publisher {
    /// Sends an update message to the given team's channel
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the transport could not deliver the
    /// message. Callers treat this as a diagnostic, never as fatal.
    fn publish(&self, team_id: Id, message: &UpdateMessage) -> Result<(), PublishError>;
}

/// Controls the inbound action routes registered for a session
///
/// When a session ends (solved or stopped) its action channels are torn
/// down so late messages stop arriving. Deregistering an already-removed
/// team must be a no-op.
pub trait ActionRoutes {
    /// Removes every inbound action route for the given team
    fn deregister(&self, team_id: Id);
}
