use std::{
    any::Any,
    cell::RefCell,
    cmp::max,
    collections::HashMap,
    mem::take,
    rc::{Rc, Weak},
};

use crate::{AsyncState, Computation, ComputationId, Status, Subscription};


const MIN_PURGE_AT: usize = 64;

thread_local! {
    static CACHE: RefCell<AsyncStateCache> = RefCell::new(AsyncStateCache::new());
}

/// Cached, single-assignment outcome of a [`Computation`].
///
/// Starts pending and is written at most once, by the completion callback the cache
/// registered on the computation or, if that callback was discarded with its runtime, by
/// the first observation session that sees the outcome.
pub struct SettleRecord<T, E>(RefCell<AsyncState<T, E>>);

impl<T, E> SettleRecord<T, E>
where
    T: Clone,
    E: Clone,
{
    fn new() -> Self {
        Self(RefCell::new(AsyncState::Pending))
    }

    /// Returns a snapshot of the recorded state.
    pub fn state(&self) -> AsyncState<T, E> {
        self.0.borrow().clone()
    }
    pub fn status(&self) -> Status {
        self.0.borrow().status()
    }
    pub fn is_settled(&self) -> bool {
        self.0.borrow().is_settled()
    }

    pub(crate) fn settle(&self, outcome: Result<T, E>) -> bool {
        let mut state = self.0.borrow_mut();
        if state.is_settled() {
            return false;
        }
        *state = outcome.into();
        true
    }
}

/// Returns the [`SettleRecord`] of `computation`, creating it on first use.
pub fn settle_record<T, E>(computation: &Computation<T, E>) -> Rc<SettleRecord<T, E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    AsyncStateCache::get_or_create(computation)
}

/// Process-wide table of settle records, keyed by computation identity.
///
/// An entry never keeps its computation alive. Entries of dropped computations are
/// removed when the table grows, or by [`purge`](Self::purge).
pub struct AsyncStateCache {
    entries: HashMap<ComputationId, CacheEntry>,
    purge_at: usize,
}

struct CacheEntry {
    computation: Weak<dyn Any>,
    record: Rc<dyn Any>,
    _subscription: Subscription,
}
impl CacheEntry {
    fn is_alive(&self) -> bool {
        self.computation.strong_count() > 0
    }
}

impl AsyncStateCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            purge_at: MIN_PURGE_AT,
        }
    }
    fn with<R>(f: impl FnOnce(&mut Self) -> R) -> R {
        CACHE.with(|c| f(&mut c.borrow_mut()))
    }

    /// Returns the record of `computation`.
    ///
    /// On the first call for a computation, a pending record is created and a single
    /// completion listener that writes it is registered on the computation. Later calls
    /// return the same record without subscribing again.
    pub fn get_or_create<T, E>(computation: &Computation<T, E>) -> Rc<SettleRecord<T, E>>
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        if let Some(record) = Self::get(computation) {
            return record;
        }
        let record = Rc::new(SettleRecord::new());
        let subscription = computation.on_settle({
            let record = record.clone();
            move |outcome| {
                record.settle(outcome);
            }
        });
        let entry = CacheEntry {
            computation: computation.downgrade(),
            record: record.clone(),
            _subscription: subscription,
        };
        log::trace!("settle record created for computation {}", computation.id());
        let purged = Self::with(|c| c.insert(computation.id(), entry));
        drop(purged);
        record
    }

    /// Returns the record of `computation` if one exists.
    pub fn get<T, E>(computation: &Computation<T, E>) -> Option<Rc<SettleRecord<T, E>>>
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        let record = Self::with(|c| Some(c.entries.get(&computation.id())?.record.clone()))?;
        record.downcast().ok()
    }

    /// Returns the number of entries, including those not purged yet.
    pub fn len() -> usize {
        Self::with(|c| c.entries.len())
    }
    pub fn is_empty() -> bool {
        Self::len() == 0
    }

    /// Removes the entries of dropped computations.
    ///
    /// Returns the number of removed entries.
    pub fn purge() -> usize {
        let purged = Self::with(|c| c.purge_dead());
        purged.len()
    }

    fn insert(&mut self, id: ComputationId, entry: CacheEntry) -> Vec<CacheEntry> {
        let mut purged = Vec::new();
        if self.entries.len() >= self.purge_at {
            purged = self.purge_dead();
            self.purge_at = max(MIN_PURGE_AT, self.entries.len() * 2);
        }
        self.entries.insert(id, entry);
        purged
    }
    fn purge_dead(&mut self) -> Vec<CacheEntry> {
        let entries = take(&mut self.entries);
        let mut purged = Vec::new();
        for (id, entry) in entries {
            if entry.is_alive() {
                self.entries.insert(id, entry);
            } else {
                purged.push(entry);
            }
        }
        if !purged.is_empty() {
            log::debug!("purged {} settle records", purged.len());
        }
        purged
    }
}
