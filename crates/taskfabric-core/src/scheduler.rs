//! Cooperative single-threaded task scheduler.
//!
//! Tasks are plain futures polled round-robin in spawn order. A task runs
//! until its next suspension point: a blocking stream operation that cannot
//! make progress, an explicit [`yield_now`], or a scope-join wait. There is
//! no preemption and no waker-based wakeup; the scheduler simply re-polls
//! every live task on each scan.
//!
//! Progress is accounted as completed token transfers plus task
//! completions. When a configurable number of consecutive scans makes no
//! progress while joined tasks are still pending, the scheduler reports the
//! most recent yield message of every live task at `error` severity and
//! aborts.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use tracing::{debug, error};

use crate::error::{fatal, Error};

/// Type-erased task body, as stored by the scheduler.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Child lifecycle mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The enclosing scope waits for this task to finish.
    Join,
    /// The task is orphaned to the root scheduler and never awaited.
    Detach,
}

/// Execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Spawned but not yet polled.
    Ready,
    /// Currently being polled.
    Running,
    /// Suspended at a yield point.
    Blocked,
    /// The closure returned. Terminal: no further transition is possible.
    Finished,
}

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of consecutive progress-free full scans tolerated before the
    /// scheduler declares a deadlock.
    pub deadlock_scan_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deadlock_scan_limit: 64,
        }
    }
}

/// Identifies the scope a task was invoked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScopeId(usize);

struct TaskSlot {
    label: String,
    mode: Mode,
    scope: ScopeId,
    state: TaskState,
    future: Option<TaskFuture>,
    last_yield: Option<String>,
}

/// The executor behind a task graph. One exists per root scope (or per
/// explicitly constructed `Runtime`).
pub(crate) struct Executor {
    config: Config,
    tasks: RefCell<Vec<TaskSlot>>,
    progress: Cell<u64>,
    next_scope: Cell<usize>,
    pending_yield: RefCell<Option<String>>,
}

impl Executor {
    pub(crate) fn new(config: Config) -> Rc<Self> {
        Rc::new(Self {
            config,
            tasks: RefCell::new(Vec::new()),
            progress: Cell::new(0),
            next_scope: Cell::new(0),
            pending_yield: RefCell::new(None),
        })
    }

    pub(crate) fn alloc_scope(&self) -> ScopeId {
        let id = self.next_scope.get();
        self.next_scope.set(id + 1);
        ScopeId(id)
    }

    /// Enqueues a task. Spawn order is preserved in the scan order.
    pub(crate) fn spawn(&self, scope: ScopeId, mode: Mode, label: String, future: TaskFuture) {
        debug!(task = %label, ?mode, "spawning task");
        self.tasks.borrow_mut().push(TaskSlot {
            label,
            mode,
            scope,
            state: TaskState::Ready,
            future: Some(future),
            last_yield: None,
        });
    }

    /// Number of unfinished join-mode children of `scope`.
    pub(crate) fn scope_pending(&self, scope: ScopeId) -> usize {
        self.tasks
            .borrow()
            .iter()
            .filter(|t| t.scope == scope && t.mode == Mode::Join && t.state != TaskState::Finished)
            .count()
    }

    fn join_tasks_finished(&self) -> bool {
        self.tasks
            .borrow()
            .iter()
            .all(|t| t.mode == Mode::Detach || t.state == TaskState::Finished)
    }

    /// Polls every live task exactly once, in spawn order. Tasks spawned
    /// during the scan are picked up before the scan ends.
    fn scan(self: &Rc<Self>) {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut idx = 0;
        loop {
            let mut future = {
                let mut tasks = self.tasks.borrow_mut();
                if idx >= tasks.len() {
                    break;
                }
                let slot = &mut tasks[idx];
                if slot.state == TaskState::Finished {
                    idx += 1;
                    continue;
                }
                slot.state = TaskState::Running;
                match slot.future.take() {
                    Some(f) => f,
                    None => {
                        idx += 1;
                        continue;
                    }
                }
            };

            // The task table must not be borrowed while user code runs:
            // the body may invoke children or drop endpoints.
            self.pending_yield.borrow_mut().take();
            let poll = future.as_mut().poll(&mut cx);
            let message = self.pending_yield.borrow_mut().take();

            {
                let mut tasks = self.tasks.borrow_mut();
                let slot = &mut tasks[idx];
                match poll {
                    Poll::Ready(()) => {
                        slot.state = TaskState::Finished;
                        self.progress.set(self.progress.get() + 1);
                        debug!(task = %slot.label, "task finished");
                    }
                    Poll::Pending => {
                        slot.state = TaskState::Blocked;
                        if let Some(m) = message {
                            slot.last_yield = Some(m);
                        }
                        slot.future = Some(future);
                    }
                }
            }
            // A finished task's future (and its endpoints) drops here,
            // outside the table borrow.
            idx += 1;
        }
    }

    /// Drives the graph until every join-mode task has finished.
    pub(crate) fn drive_root(self: &Rc<Self>) {
        let _guard = enter(self.clone());
        let mut stagnant = 0usize;
        while !self.join_tasks_finished() {
            let before = self.progress.get();
            self.scan();
            if self.join_tasks_finished() {
                break;
            }
            if self.progress.get() == before {
                stagnant += 1;
                if stagnant >= self.config.deadlock_scan_limit {
                    self.report_deadlock();
                }
            } else {
                stagnant = 0;
            }
        }
    }

    fn report_deadlock(&self) -> ! {
        let live = {
            let tasks = self.tasks.borrow();
            let live: Vec<(String, Option<String>)> = tasks
                .iter()
                .filter(|t| t.state != TaskState::Finished)
                .map(|t| (t.label.clone(), t.last_yield.clone()))
                .collect();
            live
        };
        error!(
            scans = self.config.deadlock_scan_limit,
            "scheduler made no progress; dumping {} live tasks", live.len()
        );
        for (label, last_yield) in &live {
            error!(
                task = %label,
                "last yield: {}",
                last_yield.as_deref().unwrap_or("<never yielded>")
            );
        }
        fatal(Error::Deadlock {
            scans: self.config.deadlock_scan_limit,
            live: live.len(),
        });
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<Executor>>> = const { RefCell::new(None) };
}

/// Installs `exec` as the executor for the current thread, restoring the
/// previous one when the guard drops.
fn enter(exec: Rc<Executor>) -> EnterGuard {
    let prev = CURRENT.with(|c| c.borrow_mut().replace(exec));
    EnterGuard { prev }
}

struct EnterGuard {
    prev: Option<Rc<Executor>>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| *c.borrow_mut() = self.prev.take());
    }
}

/// The executor currently driving this thread, if any.
pub(crate) fn current() -> Option<Rc<Executor>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Records a completed unit of stream I/O. No-op outside a running graph.
pub(crate) fn note_progress() {
    CURRENT.with(|c| {
        if let Some(exec) = c.borrow().as_ref() {
            exec.progress.set(exec.progress.get() + 1);
        }
    });
}

pub(crate) fn note_yield(msg: String) {
    CURRENT.with(|c| {
        if let Some(exec) = c.borrow().as_ref() {
            *exec.pending_yield.borrow_mut() = Some(msg);
        }
    });
}

/// A future that suspends exactly once, recording `msg` for diagnostics.
pub(crate) struct YieldOnce {
    msg: Option<String>,
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        match self.msg.take() {
            Some(m) => {
                note_yield(m);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

pub(crate) fn yield_once(msg: String) -> YieldOnce {
    YieldOnce { msg: Some(msg) }
}

/// Explicitly yields to the scheduler with a diagnostic message.
///
/// The message is shown in the deadlock report if this task never runs
/// again; it has no other effect. Spin loops built from non-blocking
/// stream operations must call this once per iteration to stay
/// cooperative.
pub async fn yield_now(msg: impl Into<String>) {
    yield_once(msg.into()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let cfg = Config::default();
        assert!(cfg.deadlock_scan_limit > 0);
    }

    #[test]
    fn test_spawn_order_and_states() {
        let exec = Executor::new(Config::default());
        let scope = exec.alloc_scope();
        exec.spawn(scope, Mode::Join, "a".into(), Box::pin(async {}));
        exec.spawn(scope, Mode::Join, "b".into(), Box::pin(async {
            yield_now("waiting once").await;
        }));

        assert_eq!(exec.scope_pending(scope), 2);
        exec.drive_root();
        assert_eq!(exec.scope_pending(scope), 0);

        let tasks = exec.tasks.borrow();
        assert_eq!(tasks[0].label, "a");
        assert_eq!(tasks[1].label, "b");
        assert!(tasks.iter().all(|t| t.state == TaskState::Finished));
        assert_eq!(tasks[1].last_yield.as_deref(), Some("waiting once"));
    }

    #[test]
    fn test_detached_task_does_not_block_drive() {
        let exec = Executor::new(Config::default());
        let scope = exec.alloc_scope();
        exec.spawn(
            scope,
            Mode::Detach,
            "spinner".into(),
            Box::pin(async {
                loop {
                    yield_now("spinning").await;
                }
            }),
        );
        exec.spawn(scope, Mode::Join, "finite".into(), Box::pin(async {}));
        exec.drive_root();
        assert_eq!(exec.scope_pending(scope), 0);
    }

    #[test]
    #[should_panic(expected = "deadlock")]
    fn test_stagnant_join_task_deadlocks() {
        let exec = Executor::new(Config {
            deadlock_scan_limit: 8,
        });
        let scope = exec.alloc_scope();
        exec.spawn(
            scope,
            Mode::Join,
            "stuck".into(),
            Box::pin(async {
                loop {
                    yield_now("waiting for data that never comes").await;
                }
            }),
        );
        exec.drive_root();
    }
}
