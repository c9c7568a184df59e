//! Observer Registry
//!
//! Handlers are called in subscription order. Tokens are never reused, so a
//! stale token cannot remove somebody else's handler.

use std::collections::BTreeMap;
use std::fmt;

/// Handle returned by `subscribe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionToken(u64);

type Handler<E> = Box<dyn FnMut(&E) + Send>;

/// Ordered set of event handlers.
pub struct Observers<E> {
    next_token: u64,
    handlers: BTreeMap<SubscriptionToken, Handler<E>>,
}

impl<E> Observers<E> {
    /// Empty registry.
    pub fn new() -> Self {
        Self { next_token: 0, handlers: BTreeMap::new() }
    }

    /// Register a handler. It sees every event published from now on.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionToken
    where
        F: FnMut(&E) + Send + 'static,
    {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.handlers.insert(token, Box::new(handler));
        token
    }

    /// Remove a handler. Returns false if the token was unknown.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.handlers.remove(&token).is_some()
    }

    /// Deliver `event` to every handler.
    pub fn notify(&mut self, event: &E) {
        for handler in self.handlers.values_mut() {
            handler(event);
        }
    }

    /// Number of subscribed handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("handlers", &self.handlers.len()).finish()
    }
}
