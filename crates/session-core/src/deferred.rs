//! One-shot storage for intents that arrive before a session exists.

use std::collections::HashSet;

use tracing::debug;

use crate::types::{InlineReply, Route};

/// A cell whose value can be read exactly once.
///
/// `set` overwrites any pending value; `take` returns it and empties the cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumable<T> {
    value: Option<T>,
}

impl<T> Default for Consumable<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> Consumable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, returning the value it replaced.
    pub fn set(&mut self, value: T) -> Option<T> {
        self.value.replace(value)
    }

    /// Read and clear.
    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn is_pending(&self) -> bool {
        self.value.is_some()
    }
}

/// Intents consumed by one replay, in delivery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingIntents {
    /// Rooms the session should wait on before anything navigates.
    pub rooms_to_await: Option<HashSet<String>>,
    /// Navigation target.
    pub route: Option<Route>,
    /// Reply composed from a notification.
    pub inline_reply: Option<InlineReply>,
}

/// The three deferred-intent slots.
///
/// Owned by the orchestrator's confined context, so no locking is needed.
#[derive(Debug, Default)]
pub struct DeferredIntents {
    route: Consumable<Route>,
    inline_reply: Consumable<InlineReply>,
    rooms_to_await: Consumable<HashSet<String>>,
}

impl DeferredIntents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_route(&mut self, route: Route) {
        if let Some(replaced) = self.route.set(route) {
            debug!(?replaced, "replacing pending route");
        }
    }

    pub fn store_inline_reply(&mut self, reply: InlineReply) {
        if let Some(replaced) = self.inline_reply.set(reply) {
            debug!(room_id = %replaced.room_id, "replacing pending inline reply");
        }
    }

    pub fn store_rooms_to_await(&mut self, room_ids: HashSet<String>) {
        if let Some(replaced) = self.rooms_to_await.set(room_ids) {
            debug!(count = replaced.len(), "replacing pending rooms to await");
        }
    }

    pub fn take_route(&mut self) -> Option<Route> {
        self.route.take()
    }

    pub fn take_inline_reply(&mut self) -> Option<InlineReply> {
        self.inline_reply.take()
    }

    pub fn take_rooms_to_await(&mut self) -> Option<HashSet<String>> {
        self.rooms_to_await.take()
    }

    pub fn is_empty(&self) -> bool {
        !self.route.is_pending()
            && !self.inline_reply.is_pending()
            && !self.rooms_to_await.is_pending()
    }

    /// Consume every slot.
    pub fn drain(&mut self) -> PendingIntents {
        PendingIntents {
            rooms_to_await: self.take_rooms_to_await(),
            route: self.take_route(),
            inline_reply: self.take_inline_reply(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(body: &str) -> InlineReply {
        InlineReply {
            room_id: "!abc:example.org".to_owned(),
            body: body.to_owned(),
        }
    }

    #[test]
    fn consumable_yields_value_once() {
        let mut cell = Consumable::new();
        assert_eq!(cell.set(7), None);
        assert!(cell.is_pending());
        assert_eq!(cell.take(), Some(7));
        assert_eq!(cell.take(), None);
        assert!(!cell.is_pending());
    }

    #[test]
    fn every_slot_is_consumed_exactly_once() {
        let mut intents = DeferredIntents::new();
        intents.store_route(Route::room("!abc"));
        intents.store_inline_reply(reply("hi"));
        intents.store_rooms_to_await(HashSet::from(["!abc".to_owned()]));

        assert_eq!(intents.take_route(), Some(Route::room("!abc")));
        assert_eq!(intents.take_route(), None);

        assert_eq!(intents.take_inline_reply(), Some(reply("hi")));
        assert_eq!(intents.take_inline_reply(), None);

        assert_eq!(
            intents.take_rooms_to_await(),
            Some(HashSet::from(["!abc".to_owned()]))
        );
        assert_eq!(intents.take_rooms_to_await(), None);
        assert!(intents.is_empty());
    }

    #[test]
    fn last_write_wins() {
        let mut intents = DeferredIntents::new();
        intents.store_route(Route::room("!first"));
        intents.store_route(Route::Settings);
        intents.store_inline_reply(reply("one"));
        intents.store_inline_reply(reply("two"));

        assert_eq!(intents.take_route(), Some(Route::Settings));
        assert_eq!(intents.take_inline_reply(), Some(reply("two")));
    }

    #[test]
    fn drain_empties_the_store() {
        let mut intents = DeferredIntents::new();
        intents.store_route(Route::RoomList);
        intents.store_rooms_to_await(HashSet::from(["!a".to_owned(), "!b".to_owned()]));

        let pending = intents.drain();
        assert_eq!(pending.route, Some(Route::RoomList));
        assert_eq!(pending.rooms_to_await.map(|rooms| rooms.len()), Some(2));
        assert_eq!(pending.inline_reply, None);
        assert!(intents.is_empty());
        assert_eq!(intents.drain(), PendingIntents::default());
    }
}
