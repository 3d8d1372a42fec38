use std::{
    any::Any,
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    future::{pending, Future},
    mem::take,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

use derive_ex::derive_ex;
use futures::channel::oneshot;
use parse_display::Display;

use crate::{
    core::{spawn_local, Task, TaskKind},
    AsyncState, Status, Subscription,
};


/// Identity of a [`Computation`].
///
/// Clones of a computation share the same id. Ids are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("#{0}")]
pub struct ComputationId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ComputationId {
    ComputationId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// An asynchronous unit of work that settles once with a value or an error.
///
/// Cloning returns a handle to the same computation. Completion callbacks never run
/// inside [`on_settle`](Self::on_settle) or the settling call itself; they are queued and
/// performed by [`Runtime::flush`](crate::core::Runtime::flush) in registration order.
#[derive_ex(Clone(bound()))]
pub struct Computation<T, E>(Rc<ComputationNode<T, E>>);

struct ComputationNode<T, E> {
    id: ComputationId,
    data: RefCell<ComputationData<T, E>>,
}

struct ComputationData<T, E> {
    outcome: Option<Result<T, E>>,
    listeners: BTreeMap<u64, Rc<Listener<T, E>>>,
    next_key: u64,
}

type Callback<T, E> = Box<dyn FnOnce(Result<T, E>)>;

struct Listener<T, E>(RefCell<Option<Callback<T, E>>>);

impl<T, E> Listener<T, E> {
    fn call(&self, outcome: Result<T, E>) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f(outcome)
        }
    }
    fn clear(&self) {
        let f = self.0.borrow_mut().take();
        drop(f);
    }
}

impl<T, E> Computation<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Creates a pending computation and the handle that settles it.
    pub fn pending() -> (Self, Settler<T, E>) {
        let this = Self(Rc::new(ComputationNode {
            id: next_id(),
            data: RefCell::new(ComputationData {
                outcome: None,
                listeners: BTreeMap::new(),
                next_key: 0,
            }),
        }));
        (this.clone(), Settler(this))
    }

    /// Creates a computation that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::settled(Ok(value))
    }

    /// Creates a computation that is already rejected with `error`.
    pub fn rejected(error: E) -> Self {
        Self::settled(Err(error))
    }

    pub fn settled(outcome: Result<T, E>) -> Self {
        let (this, settler) = Self::pending();
        settler.settle(outcome);
        this
    }

    /// Creates a computation that never settles.
    pub fn never() -> Self {
        Self::pending().0
    }

    /// Creates a computation settled by the output of `future`.
    ///
    /// The future is polled by the current thread's [`Runtime`](crate::core::Runtime).
    pub fn from_future(future: impl Future<Output = Result<T, E>> + 'static) -> Self {
        let (this, settler) = Self::pending();
        spawn_local(async move {
            settler.settle(future.await);
        });
        this
    }

    pub fn id(&self) -> ComputationId {
        self.0.id
    }

    /// Returns `true` if both handles refer to the same computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn status(&self) -> Status {
        self.state().status()
    }

    /// Returns the current settle state without subscribing.
    pub fn state(&self) -> AsyncState<T, E> {
        self.0.data.borrow().outcome.clone().into()
    }

    /// Registers `f` to be called once with the outcome.
    ///
    /// If the computation has already settled, the call is queued immediately.
    pub fn on_settle(&self, f: impl FnOnce(Result<T, E>) + 'static) -> Subscription {
        let listener = Rc::new(Listener(RefCell::new(Some(Box::new(f) as Callback<T, E>))));
        let mut d = self.0.data.borrow_mut();
        if let Some(outcome) = &d.outcome {
            schedule_listener(listener.clone(), outcome.clone());
            return Subscription::from_fn(move || listener.clear());
        }
        let key = d.next_key;
        d.next_key += 1;
        d.listeners.insert(key, listener.clone());
        drop(d);

        let node = Rc::downgrade(&self.0);
        Subscription::from_fn(move || {
            listener.clear();
            if let Some(node) = node.upgrade() {
                node.remove_listener(key);
            }
        })
    }

    /// Registers a pair of callbacks, one for success and one for failure.
    pub fn subscribe(
        &self,
        on_resolved: impl FnOnce(T) + 'static,
        on_rejected: impl FnOnce(E) + 'static,
    ) -> Subscription {
        self.on_settle(move |outcome| match outcome {
            Ok(value) => on_resolved(value),
            Err(error) => on_rejected(error),
        })
    }

    /// Returns a future that completes with the outcome.
    ///
    /// The future never completes if the runtime is dropped before the outcome is delivered.
    pub fn wait(&self) -> impl Future<Output = Result<T, E>> + 'static {
        let (sender, receiver) = oneshot::channel();
        let subscription = self.on_settle(move |outcome| {
            let _ = sender.send(outcome);
        });
        async move {
            let _subscription = subscription;
            match receiver.await {
                Ok(outcome) => outcome,
                Err(_) => pending().await,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.0.data.borrow().listeners.len()
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn Any> {
        let weak: Weak<ComputationNode<T, E>> = Rc::downgrade(&self.0);
        weak
    }

    fn settle(&self, outcome: Result<T, E>) -> bool {
        let listeners = {
            let mut d = self.0.data.borrow_mut();
            if d.outcome.is_some() {
                return false;
            }
            d.outcome = Some(outcome.clone());
            take(&mut d.listeners)
        };
        log::trace!(
            "computation {} settled, {} listeners",
            self.0.id,
            listeners.len()
        );
        for listener in listeners.into_values() {
            schedule_listener(listener, outcome.clone());
        }
        true
    }
}

impl<T, E> ComputationNode<T, E> {
    fn remove_listener(&self, key: u64) {
        let listener = self.data.borrow_mut().listeners.remove(&key);
        drop(listener);
    }
}

fn schedule_listener<T: 'static, E: 'static>(listener: Rc<Listener<T, E>>, outcome: Result<T, E>) {
    Task::new(move || listener.call(outcome)).schedule_with(TaskKind::SETTLE);
}

impl<T, E> fmt::Debug for Computation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0.data.borrow();
        let status = match &d.outcome {
            None => Status::Pending,
            Some(Ok(_)) => Status::Resolved,
            Some(Err(_)) => Status::Rejected,
        };
        f.debug_struct("Computation")
            .field("id", &self.0.id)
            .field("status", &status)
            .finish()
    }
}

/// Settles the [`Computation`] it was created with.
#[derive_ex(Clone(bound()))]
pub struct Settler<T, E>(Computation<T, E>);

impl<T, E> Settler<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Settles the computation.
    ///
    /// Returns `false` if it had already settled; the outcome is then discarded.
    pub fn settle(&self, outcome: Result<T, E>) -> bool {
        self.0.settle(outcome)
    }
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }
    pub fn is_settled(&self) -> bool {
        self.0.status() != Status::Pending
    }
    pub fn computation(&self) -> &Computation<T, E> {
        &self.0
    }
}

/// A value that may or may not be a [`Computation`].
#[derive(Clone, Debug)]
pub enum Awaitable<T, E> {
    /// A plain value, treated as an immediately resolved result.
    Value(T),
    Computation(Computation<T, E>),
}

impl<T, E> Awaitable<T, E> {
    pub fn computation(&self) -> Option<&Computation<T, E>> {
        match self {
            Awaitable::Value(_) => None,
            Awaitable::Computation(c) => Some(c),
        }
    }
    pub fn is_computation(&self) -> bool {
        self.computation().is_some()
    }

    /// Returns `true` if both refer to the same computation.
    ///
    /// Plain values have no identity and are never the same as anything.
    pub fn same_identity(&self, other: &Self) -> bool {
        match (self, other) {
            (Awaitable::Computation(a), Awaitable::Computation(b)) => Rc::ptr_eq(&a.0, &b.0),
            _ => false,
        }
    }
}

impl<T: Default, E> Default for Awaitable<T, E> {
    fn default() -> Self {
        Awaitable::Value(T::default())
    }
}

impl<T, E> From<Computation<T, E>> for Awaitable<T, E> {
    fn from(computation: Computation<T, E>) -> Self {
        Awaitable::Computation(computation)
    }
}
