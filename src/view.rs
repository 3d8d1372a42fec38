use std::{
    cell::RefCell,
    mem::replace,
    rc::{Rc, Weak},
};

use crate::{
    cache::settle_record,
    core::{Task, TaskKind},
    AsyncState, Awaitable, Cancelable, Computation, ComputationId, ErrorBoundary, Interrupted,
    Status, Subscription,
};

#[cfg(test)]
mod tests;

/// Per-view projection of a settle record, used to drive rendering.
pub type DisplayState<T, E> = AsyncState<T, E>;

/// Properties of an [`AsyncView`].
///
/// - `value`: the awaited value. A plain value is an immediately resolved result.
/// - `render`: called with `None` while waiting and with the value once resolved.
/// - `catch`: maps an error to a value to render. Without it, errors are raised to the
///   view's [`ErrorBoundary`].
/// - `waiting`: value to render while waiting instead of `None`.
pub struct AsyncViewProps<T, E, V> {
    value: Awaitable<T, E>,
    hooks: Hooks<T, E, V>,
}

struct Hooks<T, E, V> {
    render: RefCell<Box<dyn FnMut(Option<T>) -> V>>,
    catch: Option<Box<dyn Fn(E) -> T>>,
    waiting: Option<Box<dyn Fn() -> T>>,
}

impl<T, E, V> Hooks<T, E, V> {
    fn render(&self, display: DisplayState<T, E>) -> Result<V, E> {
        let payload = match display {
            AsyncState::Pending => self.waiting.as_ref().map(|waiting| waiting()),
            AsyncState::Resolved(value) => Some(value),
            AsyncState::Rejected(error) => match &self.catch {
                Some(catch) => Some(catch(error)),
                None => return Err(error),
            },
        };
        Ok((self.render.borrow_mut())(payload))
    }
}

impl<T, E, V> AsyncViewProps<T, E, V> {
    pub fn new(
        value: impl Into<Awaitable<T, E>>,
        render: impl FnMut(Option<T>) -> V + 'static,
    ) -> Self {
        Self {
            value: value.into(),
            hooks: Hooks {
                render: RefCell::new(Box::new(render)),
                catch: None,
                waiting: None,
            },
        }
    }
    pub fn value(mut self, value: impl Into<Awaitable<T, E>>) -> Self {
        self.value = value.into();
        self
    }
    pub fn render(mut self, render: impl FnMut(Option<T>) -> V + 'static) -> Self {
        self.hooks.render = RefCell::new(Box::new(render));
        self
    }
    pub fn catch(mut self, catch: impl Fn(E) -> T + 'static) -> Self {
        self.hooks.catch = Some(Box::new(catch));
        self
    }
    pub fn waiting(mut self, waiting: impl Fn() -> T + 'static) -> Self {
        self.hooks.waiting = Some(Box::new(waiting));
        self
    }
}

impl<T, E, V> Default for AsyncViewProps<T, E, V>
where
    T: Default,
    V: Default + 'static,
{
    fn default() -> Self {
        Self::new(Awaitable::default(), |_| V::default())
    }
}

/// Binds a view to one computation until the view moves on to another value or unmounts.
///
/// The session is invalidated exactly once, by [`invalidate`](Self::invalidate) or by
/// drop. After that its callback is never called.
pub struct ObservationSession<T, E> {
    id: ComputationId,
    cancelable: Cancelable<T, E>,
    _listener: Subscription,
}

impl<T, E> ObservationSession<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Starts observing `computation`.
    ///
    /// `on_settled` is called with the computation's settle record once it has settled,
    /// unless the session has been invalidated before.
    pub fn start(
        computation: &Computation<T, E>,
        on_settled: impl FnOnce(AsyncState<T, E>) + 'static,
    ) -> Self {
        let record = settle_record(computation);
        let cancelable = Cancelable::wrap(computation);
        let listener = cancelable.observable().on_settle(move |outcome| {
            let outcome = match outcome {
                Err(Interrupted::Canceled) => return,
                Err(Interrupted::Rejected(error)) => Err(error),
                Ok(value) => Ok(value),
            };
            // the cache's writer task is lost if a runtime was dropped after the settle
            record.settle(outcome);
            on_settled(record.state())
        });
        log::trace!("session started for computation {}", computation.id());
        Self {
            id: computation.id(),
            cancelable,
            _listener: listener,
        }
    }

    pub fn computation_id(&self) -> ComputationId {
        self.id
    }

    pub fn invalidate(self) {}
}
impl<T, E> Drop for ObservationSession<T, E> {
    fn drop(&mut self) {
        self.cancelable.token().cancel();
        log::trace!("session invalidated for computation {}", self.id);
    }
}

/// Renders different output depending on the state of an awaited value.
///
/// The view owns the observation of its value: dropping it (or calling
/// [`unmount`](Self::unmount)) invalidates the observation, and a new value replaces the
/// observation of the previous one.
pub struct AsyncView<T, E, V>(Rc<AsyncViewNode<T, E, V>>);

struct AsyncViewNode<T, E, V> {
    data: RefCell<AsyncViewData<T, E, V>>,
    boundary: Option<ErrorBoundary<E>>,
}

struct AsyncViewData<T, E, V> {
    value: Awaitable<T, E>,
    hooks: Rc<Hooks<T, E, V>>,
    display: DisplayState<T, E>,
    session: Option<ObservationSession<T, E>>,
    output: Option<Result<V, E>>,
    render_scheduled: bool,
}

impl<T, E, V> AsyncView<T, E, V>
where
    T: Clone + 'static,
    E: Clone + 'static,
    V: 'static,
{
    /// Mounts a view and performs its first render pass.
    ///
    /// A rejection that is not caught by `catch` is kept as the view's output.
    pub fn mount(props: AsyncViewProps<T, E, V>) -> Self {
        Self::mount_with(props, None)
    }

    /// Mounts a view whose rejections are raised to `boundary`.
    pub fn mount_in(props: AsyncViewProps<T, E, V>, boundary: &ErrorBoundary<E>) -> Self {
        Self::mount_with(props, Some(boundary.clone()))
    }

    fn mount_with(props: AsyncViewProps<T, E, V>, boundary: Option<ErrorBoundary<E>>) -> Self {
        let AsyncViewProps { value, hooks } = props;
        let node = Rc::new(AsyncViewNode {
            data: RefCell::new(AsyncViewData {
                value: value.clone(),
                hooks: Rc::new(hooks),
                display: AsyncState::Pending,
                session: None,
                output: None,
                render_scheduled: false,
            }),
            boundary,
        });
        node.observe(value);
        node.render();
        Self(node)
    }

    /// Replaces the properties and performs a render pass.
    ///
    /// The value is observed again only if its identity changed.
    pub fn update(&self, props: AsyncViewProps<T, E, V>) {
        let AsyncViewProps { value, hooks } = props;
        self.0.data.borrow_mut().hooks = Rc::new(hooks);
        self.0.set_value(value);
        self.0.render();
    }

    /// Replaces the value and performs a render pass.
    pub fn set_value(&self, value: impl Into<Awaitable<T, E>>) {
        self.0.set_value(value.into());
        self.0.render();
    }

    pub fn unmount(self) {}

    pub fn value(&self) -> Awaitable<T, E> {
        self.0.data.borrow().value.clone()
    }
    pub fn display_state(&self) -> DisplayState<T, E> {
        self.0.data.borrow().display.clone()
    }
    pub fn status(&self) -> Status {
        self.0.data.borrow().display.status()
    }

    /// Returns `true` while a computation is being observed.
    pub fn is_observing(&self) -> bool {
        self.0.data.borrow().session.is_some()
    }

    /// Takes the output of the last render pass.
    ///
    /// Returns `None` if there was no render pass since the last call, or if the error of
    /// the last render pass was raised to the boundary.
    pub fn take_output(&self) -> Option<Result<V, E>> {
        self.0.data.borrow_mut().output.take()
    }
    pub fn with_output<R>(&self, f: impl FnOnce(Option<&Result<V, E>>) -> R) -> R {
        f(self.0.data.borrow().output.as_ref())
    }

    pub fn boundary(&self) -> Option<&ErrorBoundary<E>> {
        self.0.boundary.as_ref()
    }
}

impl<T, E, V> Drop for AsyncView<T, E, V> {
    fn drop(&mut self) {
        let session = self.0.data.borrow_mut().session.take();
        drop(session);
    }
}

impl<T, E, V> AsyncViewNode<T, E, V>
where
    T: Clone + 'static,
    E: Clone + 'static,
    V: 'static,
{
    fn set_value(self: &Rc<Self>, value: Awaitable<T, E>) {
        let same = self.data.borrow().value.same_identity(&value);
        if !same {
            self.observe(value);
        }
    }

    fn observe(self: &Rc<Self>, value: Awaitable<T, E>) {
        let old = self.data.borrow_mut().session.take();
        if let Some(old) = old {
            old.invalidate();
        }
        let (display, session) = match &value {
            Awaitable::Value(value) => (AsyncState::Resolved(value.clone()), None),
            Awaitable::Computation(computation) => {
                let display = settle_record(computation).state();
                let session = if display.is_pending() {
                    let this = Rc::downgrade(self);
                    Some(ObservationSession::start(computation, move |state| {
                        Self::on_settled(&this, state)
                    }))
                } else {
                    None
                };
                (display, session)
            }
        };
        let mut d = self.data.borrow_mut();
        d.value = value;
        d.display = display;
        d.session = session;
    }

    fn on_settled(this: &Weak<Self>, state: AsyncState<T, E>) {
        if let Some(this) = this.upgrade() {
            this.data.borrow_mut().display = state;
            this.schedule_render();
        }
    }

    fn schedule_render(self: &Rc<Self>) {
        if replace(&mut self.data.borrow_mut().render_scheduled, true) {
            return;
        }
        Task::from_weak_fn(Rc::downgrade(self), |this| this.run_scheduled_render())
            .schedule_with(TaskKind::RENDER);
    }

    fn run_scheduled_render(self: &Rc<Self>) {
        if replace(&mut self.data.borrow_mut().render_scheduled, false) {
            self.render();
        }
    }

    fn render(&self) {
        let (hooks, display) = {
            let mut d = self.data.borrow_mut();
            d.render_scheduled = false;
            (d.hooks.clone(), d.display.clone())
        };
        if let Some(boundary) = &self.boundary {
            if boundary.has_caught() {
                self.data.borrow_mut().output = None;
                return;
            }
        }
        let output = hooks.render(display);
        match (output, &self.boundary) {
            (Err(error), Some(boundary)) => {
                self.data.borrow_mut().output = None;
                boundary.capture(error);
            }
            (output, _) => self.data.borrow_mut().output = Some(output),
        }
    }
}
