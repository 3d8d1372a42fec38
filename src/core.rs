use std::{
    any::Any,
    cell::RefCell,
    collections::{BTreeMap, VecDeque},
    future::{poll_fn, Future},
    mem::{replace, take},
    pin::Pin,
    rc::{Rc, Weak},
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll, Wake, Waker},
};

use derive_ex::{derive_ex, Ex};
use parse_display::Display;
use slabmap::SlabMap;


thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::new());
}

struct Globals {
    is_runtime_exists: bool,
    need_wake: bool,
    tasks: Tasks,
    wakes: WakeTable,
}
impl Globals {
    fn new() -> Self {
        Self {
            is_runtime_exists: false,
            need_wake: false,
            tasks: Tasks::default(),
            wakes: WakeTable::default(),
        }
    }
    fn with<T>(f: impl FnOnce(&mut Self) -> T) -> T {
        GLOBALS.with(|g| f(&mut g.borrow_mut()))
    }
    fn schedule_task(kind: TaskKind, task: Task) {
        Self::with(|g| {
            g.tasks.push(kind, task);
            g.wake();
        });
    }
    fn pop_task(kind: Option<TaskKind>) -> Option<Task> {
        Self::with(|g| g.tasks.pop(kind))
    }
    fn get_woken(woken: &mut Vec<Rc<LocalTask>>) -> bool {
        Self::with(|g| g.apply_wake(woken));
        !woken.is_empty()
    }

    fn apply_wake(&mut self, woken: &mut Vec<Rc<LocalTask>>) {
        let mut requests = self.wakes.requests.lock();
        for key in requests.drops.drain(..) {
            self.wakes.tasks.remove(key);
        }
        for key in requests.wakes.drain(..) {
            if let Some(task) = self.wakes.tasks.get(key) {
                woken.push(task.clone());
            }
        }
    }
    fn wait_for_ready(&mut self, cx: &Context) -> Poll<()> {
        self.need_wake = false;
        if !self.tasks.is_empty() {
            return Poll::Ready(());
        }
        let mut requests = self.wakes.requests.lock();
        if !requests.drops.is_empty() || !requests.wakes.is_empty() {
            return Poll::Ready(());
        }
        requests.waker = Some(cx.waker().clone());
        self.need_wake = true;
        Poll::Pending
    }

    fn finish_runtime(&mut self) -> (Tasks, WakeTable) {
        self.is_runtime_exists = false;
        self.need_wake = false;
        (take(&mut self.tasks), take(&mut self.wakes))
    }

    fn wake(&mut self) {
        if !self.need_wake {
            return;
        }
        self.need_wake = false;
        self.wakes.requests.lock().wake();
    }
}

/// Single-threaded cooperative runtime.
///
/// Completion callbacks of computations, re-render passes of views and local futures
/// are queued on the current thread and executed by [`flush`](Self::flush).
///
/// Only one `Runtime` can exist in the same thread at the same time.
#[derive_ex(Default)]
#[default(Self::new())]
pub struct Runtime {
    woken_buffer: Vec<Rc<LocalTask>>,
}
impl Runtime {
    pub fn new() -> Self {
        if Globals::with(|g| replace(&mut g.is_runtime_exists, true)) {
            panic!("Only one `Runtime` can exist in the same thread at the same time.");
        };
        log::debug!("runtime created");
        Self {
            woken_buffer: Vec::new(),
        }
    }

    /// Poll the local futures that have been woken.
    ///
    /// Returns `true` if any future was polled.
    pub fn poll_futures(&mut self) -> bool {
        let mut handled = false;
        let mut woken = take(&mut self.woken_buffer);
        while Globals::get_woken(&mut woken) {
            for task in woken.drain(..) {
                task.poll();
                handled = true;
            }
        }
        self.woken_buffer = woken;
        handled
    }

    /// Run the oldest scheduled task.
    ///
    /// If `kind` is `None`, the oldest task of the lowest kind is executed.
    ///
    /// Returns `true` if a task was performed.
    pub fn run_task(&mut self, kind: Option<TaskKind>) -> bool {
        if let Some(task) = Globals::pop_task(kind) {
            task.run();
            true
        } else {
            false
        }
    }

    /// Run scheduled tasks of `kind` until none is left.
    ///
    /// Returns `true` if any task was performed.
    pub fn run_tasks(&mut self, kind: Option<TaskKind>) -> bool {
        let mut handled = false;
        while self.run_task(kind) {
            handled = true;
        }
        handled
    }

    /// Repeat [`poll_futures`](Self::poll_futures) and [`run_task`](Self::run_task)
    /// until there is nothing left to do.
    pub fn flush(&mut self) {
        loop {
            if self.poll_futures() {
                continue;
            }
            if self.run_task(None) {
                continue;
            }
            break;
        }
    }

    /// Wait while there is no work to be executed by [`flush`](Self::flush).
    pub async fn wait_for_ready(&mut self) {
        poll_fn(|cx| Globals::with(|g| g.wait_for_ready(cx))).await
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let (tasks, futures) = Globals::with(|g| g.finish_runtime());
        log::debug!(
            "runtime dropped, discarding {} tasks and {} futures",
            tasks.len(),
            futures.tasks.len()
        );
        drop(tasks);
        drop(futures);
    }
}

/// Spawns a future on the current thread.
///
/// The future is polled by [`Runtime::flush`] whenever it is woken.
pub fn spawn_local(future: impl Future<Output = ()> + 'static) {
    let task = Rc::new(LocalTask {
        future: RefCell::new(Some(Box::pin(future))),
        waker: RefCell::new(None),
    });
    let raw = Globals::with(|g| g.wakes.insert(task.clone()));
    log::trace!("spawned local future #{}", raw.key);
    raw.wake_by_ref();
    *task.waker.borrow_mut() = Some(raw.into());
}

struct LocalTask {
    future: RefCell<Option<Pin<Box<dyn Future<Output = ()>>>>>,
    waker: RefCell<Option<Waker>>,
}
impl LocalTask {
    fn poll(&self) {
        let Some(waker) = self.waker.borrow().clone() else {
            return;
        };
        let mut cx = Context::from_waker(&waker);
        let mut future = self.future.borrow_mut();
        let Some(f) = future.as_mut() else {
            return;
        };
        if f.as_mut().poll(&mut cx).is_ready() {
            let done = future.take();
            drop(future);
            drop(done);
            self.waker.borrow_mut().take();
        }
    }
}

#[derive(Default)]
struct WakeTable {
    tasks: SlabMap<Rc<LocalTask>>,
    requests: WakeRequests,
}

impl WakeTable {
    fn insert(&mut self, task: Rc<LocalTask>) -> Arc<RawWake> {
        RawWake::new(&self.requests, self.tasks.insert(task))
    }
}

#[derive(Clone, Default)]
struct WakeRequests(Arc<Mutex<RawWakeRequests>>);

impl WakeRequests {
    fn lock(&self) -> MutexGuard<RawWakeRequests> {
        self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct RawWakeRequests {
    wakes: Vec<usize>,
    drops: Vec<usize>,
    waker: Option<Waker>,
}
impl RawWakeRequests {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

struct RawWake {
    requests: WakeRequests,
    key: usize,
}
impl RawWake {
    fn new(requests: &WakeRequests, key: usize) -> Arc<Self> {
        Arc::new(RawWake {
            requests: requests.clone(),
            key,
        })
    }
}

impl Wake for RawWake {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }
    fn wake_by_ref(self: &Arc<Self>) {
        let mut requests = self.requests.lock();
        requests.wakes.push(self.key);
        requests.wake();
    }
}
impl Drop for RawWake {
    fn drop(&mut self) {
        self.requests.lock().drops.push(self.key);
    }
}

/// A unit of work queued on the current thread's [`Runtime`].
pub struct Task(RawTask);

impl Task {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Task(RawTask::Box(Box::new(f)))
    }

    /// Creates a task that does nothing if `this` has been dropped by the time it runs.
    pub fn from_weak_fn<T: Any>(this: Weak<T>, f: impl Fn(Rc<T>) + Copy + 'static) -> Self {
        Task(RawTask::Weak {
            this,
            f: Box::new(move |this| {
                if let Some(this) = this.upgrade() {
                    if let Ok(this) = this.downcast() {
                        f(this)
                    }
                }
            }),
        })
    }

    pub fn schedule_with(self, kind: TaskKind) {
        Globals::schedule_task(kind, self)
    }
    pub fn schedule(self) {
        self.schedule_with(TaskKind::default());
    }
    fn run(self) {
        match self.0 {
            RawTask::Box(f) => f(),
            RawTask::Weak { this, f } => f(this),
        }
    }
}

enum RawTask {
    Box(Box<dyn FnOnce()>),
    Weak {
        this: Weak<dyn Any>,
        f: Box<dyn Fn(Weak<dyn Any>)>,
    },
}

/// kind of tasks performed by the runtime.
///
/// Tasks of a kind with a smaller `id` are performed first.
#[derive(Clone, Copy, Display, Debug, Ex)]
#[derive_ex(PartialEq, Eq, Hash, Default)]
#[display("{id}: {name}")]
#[default(Self::SETTLE)]
pub struct TaskKind {
    id: i8,
    #[eq(ignore)]
    name: &'static str,
}
impl TaskKind {
    /// Completion callbacks of computations.
    pub const SETTLE: Self = Self::new(0, "settle");

    /// Re-render passes of views.
    pub const RENDER: Self = Self::new(1, "render");

    pub const fn new(id: i8, name: &'static str) -> Self {
        Self { id, name }
    }
    pub fn id(self) -> i8 {
        self.id
    }
}

#[derive(Default)]
struct Tasks(BTreeMap<i8, VecDeque<Task>>);

impl Tasks {
    fn push(&mut self, kind: TaskKind, task: Task) {
        self.0.entry(kind.id).or_default().push_back(task);
    }
    fn pop(&mut self, kind: Option<TaskKind>) -> Option<Task> {
        if let Some(kind) = kind {
            self.0.get_mut(&kind.id)?.pop_front()
        } else {
            self.0.values_mut().find_map(|tasks| tasks.pop_front())
        }
    }
    fn is_empty(&self) -> bool {
        self.0.values().all(|tasks| tasks.is_empty())
    }
    fn len(&self) -> usize {
        self.0.values().map(|tasks| tasks.len()).sum()
    }
}
