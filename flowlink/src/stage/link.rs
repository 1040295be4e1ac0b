//! Links: directed, unlink-able routing relations between stages.

use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::errors::FlowError;

/// Identity of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LinkId(Uuid);

impl LinkId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Outcome of a non-blocking intake offer.
///
/// `Full` and `Rejected` hand the item back so routing can offer it to
/// the next link.
pub enum TryAccept<T> {
    /// The target enqueued the item.
    Accepted,
    /// The target's bounded queue is at capacity.
    Full(T),
    /// The target is terminal and will never accept the item.
    Rejected(T),
}

/// The intake surface a link needs from its target stage.
///
/// Erases the target's output type so stages can be wired into a
/// topology without knowing their neighbors' identity ahead of
/// construction.
#[async_trait::async_trait]
pub trait StageInput<T>: Send + Sync {
    /// Offers an item without suspending.
    fn try_accept(&self, item: T) -> TryAccept<T>;

    /// Enqueues an item, suspending while a bounded queue is full.
    ///
    /// Hands the item back if the target is terminal.
    async fn accept(&self, item: T) -> Result<(), T>;

    /// Signals that no further items will arrive.
    fn complete(&self);

    /// Propagates an upstream fault verbatim.
    fn fault(&self, error: FlowError);
}

/// Predicate deciding whether a link accepts an item.
pub type LinkPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Options controlling a link's behavior.
#[derive(Clone)]
pub struct LinkOptions<T> {
    /// Whether the target completes/faults when the source does.
    pub propagate_completion: bool,
    /// Optional filter; items it rejects skip this link.
    pub predicate: Option<LinkPredicate<T>>,
}

impl<T> Default for LinkOptions<T> {
    fn default() -> Self {
        Self {
            propagate_completion: false,
            predicate: None,
        }
    }
}

impl<T> LinkOptions<T> {
    /// Creates link options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets completion propagation.
    #[must_use]
    pub fn with_propagate_completion(mut self, propagate: bool) -> Self {
        self.propagate_completion = propagate;
        self
    }

    /// Sets the link predicate.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }
}

impl<T> fmt::Debug for LinkOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkOptions")
            .field("propagate_completion", &self.propagate_completion)
            .field("has_predicate", &self.predicate.is_some())
            .finish()
    }
}

/// An entry in a source stage's outbound link set.
pub(crate) struct LinkEntry<T> {
    pub(crate) id: LinkId,
    pub(crate) target: Arc<dyn StageInput<T>>,
    pub(crate) propagate_completion: bool,
    pub(crate) predicate: Option<LinkPredicate<T>>,
}

impl<T> Clone for LinkEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            target: Arc::clone(&self.target),
            propagate_completion: self.propagate_completion,
            predicate: self.predicate.clone(),
        }
    }
}

/// Handle returned by linking, used to sever the link.
///
/// Dropping the handle does not unlink; call
/// [`LinkHandle::unlink`] explicitly.
pub struct LinkHandle<T> {
    id: LinkId,
    links: Weak<RwLock<Vec<LinkEntry<T>>>>,
}

impl<T> LinkHandle<T> {
    pub(crate) fn new(id: LinkId, links: &Arc<RwLock<Vec<LinkEntry<T>>>>) -> Self {
        Self {
            id,
            links: Arc::downgrade(links),
        }
    }

    /// A handle for a link that was never registered (the source was
    /// already terminal at link time).
    pub(crate) fn detached() -> Self {
        Self {
            id: LinkId::new(),
            links: Weak::new(),
        }
    }

    /// Removes the link from the source's outbound set.
    ///
    /// No new items route across this link after `unlink` returns.
    /// Items already enqueued downstream are unaffected.
    pub fn unlink(&self) {
        if let Some(links) = self.links.upgrade() {
            links.write().retain(|entry| entry.id != self.id);
        }
    }
}

impl<T> fmt::Debug for LinkHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle").field("id", &self.id).finish()
    }
}
