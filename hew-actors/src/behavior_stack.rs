//! LIFO stack of behaviors attached to one actor.
//!
//! Entries are `(behavior, id)`. Ordinary behaviors carry an invalid
//! [`MessageId`]; handlers waiting for a reply carry the response id
//! they are waiting for and are only ever looked up by exact id.
//!
//! Removed behaviors are not dropped immediately: they move to an
//! erased buffer and stay there until [`cleanup`](BehaviorStack::cleanup),
//! which runs once the handler that removed them has returned. Every
//! mutation bumps the generation, which the dispatcher uses to decide
//! when previously skipped messages must be re-examined.

use crate::behavior::Behavior;
use crate::message_id::MessageId;

#[derive(Debug, Default)]
pub(crate) struct BehaviorStack {
    elements: Vec<(Behavior, MessageId)>,
    erased: Vec<Behavior>,
    generation: u64,
}

impl BehaviorStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub(crate) fn push(&mut self, behavior: Behavior, id: MessageId) {
        self.elements.push((behavior, id));
        self.generation += 1;
    }

    /// The top-most ordinary behavior.
    pub(crate) fn top(&self) -> Option<&Behavior> {
        self.elements
            .iter()
            .rev()
            .find(|(_, id)| !id.valid())
            .map(|(b, _)| b)
    }

    /// Whether the top entry is a response handler. Ordinary messages
    /// wait in the cache until it is gone.
    pub(crate) fn awaits_response(&self) -> bool {
        self.elements.last().is_some_and(|(_, id)| id.valid())
    }

    /// The handler registered for `response_id`, if still pending.
    pub(crate) fn sync_handler(&self, response_id: MessageId) -> Option<&Behavior> {
        let key = response_id.request_id();
        self.elements
            .iter()
            .rev()
            .find(|(_, id)| id.valid() && id.request_id() == key)
            .map(|(b, _)| b)
    }

    pub(crate) fn has_sync_handler(&self, response_id: MessageId) -> bool {
        self.sync_handler(response_id).is_some()
    }

    /// Remove the top-most ordinary behavior (`unbecome`).
    pub(crate) fn pop_async_back(&mut self) -> bool {
        let Some(pos) = self.elements.iter().rposition(|(_, id)| !id.valid()) else {
            return false;
        };
        self.erase_at(pos);
        true
    }

    /// Remove the handler waiting for `response_id`.
    pub(crate) fn erase(&mut self, response_id: MessageId) -> bool {
        let key = response_id.request_id();
        let Some(pos) = self
            .elements
            .iter()
            .rposition(|(_, id)| id.valid() && id.request_id() == key)
        else {
            return false;
        };
        self.erase_at(pos);
        true
    }

    /// Drop entries above `depth`.
    pub(crate) fn truncate(&mut self, depth: usize) {
        while self.elements.len() > depth {
            let last = self.elements.len() - 1;
            self.erase_at(last);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.truncate(0);
    }

    fn erase_at(&mut self, pos: usize) {
        let (behavior, _) = self.elements.remove(pos);
        self.erased.push(behavior);
        self.generation += 1;
    }

    /// Release erased behaviors.
    pub(crate) fn cleanup(&mut self) {
        self.erased.clear();
    }

    #[cfg(test)]
    fn erased_len(&self) -> usize {
        self.erased.len()
    }
}
