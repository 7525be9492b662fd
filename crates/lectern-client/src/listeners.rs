//! Event listener registry.
//!
//! Handlers register per [`EventKind`] and run once per received event, in
//! receipt order, in registration order within a kind.

use lectern_proto::{EventKind, ServerEvent};

use crate::transport::TransportEvent;

/// Handle returned by [`Listeners::on`].
pub type ListenerId = u64;

/// Event handed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification<'a> {
    /// Transport connected.
    Connect,
    /// Transport disconnected.
    Disconnect {
        /// Why the link was lost.
        reason: &'a str,
    },
    /// Server broadcast.
    Server(&'a ServerEvent),
}

impl Notification<'_> {
    /// Kind used for registration.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Disconnect { .. } => EventKind::Disconnect,
            Self::Server(event) => event.kind(),
        }
    }
}

impl<'a> Notification<'a> {
    /// Notification for a transport event. `None` for events with no
    /// listener kind.
    pub fn from_transport(event: &'a TransportEvent) -> Option<Self> {
        match event {
            TransportEvent::Connected => Some(Self::Connect),
            TransportEvent::Disconnected { reason } => Some(Self::Disconnect { reason }),
            TransportEvent::Unavailable { .. } => None,
            TransportEvent::Server(event) => Some(Self::Server(event)),
        }
    }
}

type Handler = Box<dyn FnMut(Notification<'_>) + Send>;

/// Registered handlers.
#[derive(Default)]
pub struct Listeners {
    handlers: Vec<(ListenerId, EventKind, Handler)>,
    next_id: ListenerId,
}

impl Listeners {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one kind.
    pub fn on(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(Notification<'_>) + Send + 'static,
    ) -> ListenerId {
        self.next_id += 1;
        self.handlers.push((self.next_id, kind, Box::new(handler)));
        self.next_id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, ..)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Remove every handler.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invoke every handler registered for the notification's kind.
    pub fn dispatch(&mut self, notification: Notification<'_>) {
        let kind = notification.kind();
        for (_, _, handler) in self.handlers.iter_mut().filter(|(_, k, _)| *k == kind) {
            handler(notification);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("handlers", &self.handlers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn handlers_run_per_kind_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::new();

        for tag in ["a", "b"] {
            let log = Arc::clone(&log);
            listeners.on(EventKind::ChatParticipantJoined, move |_| {
                log.lock().expect("lock").push(tag);
            });
        }
        let other = Arc::clone(&log);
        listeners.on(EventKind::Connect, move |_| other.lock().expect("lock").push("connect"));

        listeners.dispatch(Notification::Server(&ServerEvent::ChatParticipantJoined));

        assert_eq!(*log.lock().expect("lock"), vec!["a", "b"]);
    }

    #[test]
    fn off_stops_delivery() {
        let count = Arc::new(Mutex::new(0));
        let mut listeners = Listeners::new();
        let sink = Arc::clone(&count);
        let id = listeners.on(EventKind::Connect, move |_| *sink.lock().expect("lock") += 1);

        listeners.dispatch(Notification::Connect);
        assert!(listeners.off(id));
        listeners.dispatch(Notification::Connect);

        assert_eq!(*count.lock().expect("lock"), 1);
        assert!(!listeners.off(id));
    }

    #[test]
    fn unavailable_has_no_listener_kind() {
        let event = TransportEvent::Unavailable { attempts: 5 };
        assert_eq!(Notification::from_transport(&event), None);

        let event = TransportEvent::Disconnected { reason: "reset".into() };
        assert_eq!(
            Notification::from_transport(&event).map(|n| n.kind()),
            Some(EventKind::Disconnect)
        );
    }
}
