//! Invariant checking for simulation testing.
//!
//! Invariants are properties that must hold after every transition, whatever
//! the interleaving of user operations, server broadcasts and link failures.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! let snapshot = StoreSnapshot::capture(&store, session.active_conversation());
//! registry.check_all(&snapshot)?;
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ActiveRoomInStore, FocusedHasNoUnread, PreviewMatchesMessages, UnconfirmedAreOwn,
    UniqueMessageIds, UniqueParticipants,
};
pub use snapshot::StoreSnapshot;

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a [`StoreSnapshot`].
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &StoreSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every standard store invariant.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(ActiveRoomInStore);
        registry.add(PreviewMatchesMessages);
        registry.add(UniqueMessageIds);
        registry.add(UniqueParticipants);
        registry.add(FocusedHasNoUnread);
        registry.add(UnconfirmedAreOwn);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants. Returns every violation found.
    pub fn check_all(&self, state: &StoreSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

impl std::fmt::Debug for InvariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.invariants.iter().map(|inv| inv.name()).collect();
        f.debug_struct("InvariantRegistry").field("invariants", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use lectern_client::{Conversation, DeliveryState, Message, MessagePreview};

    use super::*;

    fn message(local_id: u64, message_id: Option<u64>, sender: u64, secs: i64) -> Message {
        Message {
            local_id,
            message_id,
            sender_participant_id: sender,
            content: format!("m{local_id}"),
            timestamp: DateTime::from_timestamp(secs, 0).unwrap_or_default(),
            delivery_state: if message_id.is_some() { DeliveryState::Sent } else { DeliveryState::Pending },
        }
    }

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        assert!(InvariantRegistry::standard().check_all(&StoreSnapshot::empty()).is_ok());
    }

    #[test]
    fn stale_preview_is_reported() {
        let mut conv = Conversation::stub(1);
        conv.messages = vec![message(1, Some(10), 9, 100), message(2, Some(11), 9, 50)];
        conv.last_message_preview = Some(MessagePreview::from(&conv.messages[1]));
        let snapshot = StoreSnapshot { conversations: vec![conv], active_room: None };

        let violations = InvariantRegistry::standard().check_all(&snapshot).expect_err("stale");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "preview_matches_messages");
    }

    #[test]
    fn pending_message_from_someone_else_is_reported() {
        let mut conv = Conversation::stub(1);
        conv.self_participant_id = Some(7);
        conv.messages = vec![message(1, None, 9, 100)];
        conv.last_message_preview = Some(MessagePreview::from(&conv.messages[0]));
        let snapshot = StoreSnapshot { conversations: vec![conv], active_room: Some(1) };

        let violations = InvariantRegistry::standard().check_all(&snapshot).expect_err("foreign");
        assert_eq!(violations[0].invariant, "unconfirmed_are_own");
    }

    #[test]
    fn unknown_active_room_is_reported() {
        let snapshot = StoreSnapshot { conversations: vec![], active_room: Some(3) };
        let violations = InvariantRegistry::standard().check_all(&snapshot).expect_err("missing");
        assert_eq!(violations[0].invariant, "active_room_in_store");
    }
}
