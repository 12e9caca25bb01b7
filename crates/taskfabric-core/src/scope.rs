//! Task scopes and the `invoke` wiring surface.
//!
//! A [`Scope`] collects child task invocations. The canonical shape mirrors
//! the dataflow style this runtime targets:
//!
//! ```ignore
//! task()
//!     .invoke(producer, (&a, n))
//!     .invoke(adder, (&a, &b, &c, n))
//!     .invoke(consumer, (&c, n));
//! // the scope joins its children when it goes out of scope
//! ```
//!
//! Arguments are resolved by type-directed adapters ([`ArgInto`]): a
//! `&Stream` becomes the matching endpoint, a `&MmapArray` yields one view
//! per invocation, an `Mmap` argument adapts to an `AsyncMmap` parameter by
//! spawning a detached service task, and [`Seq`] expands to an increasing
//! ordinal. Scalar and view arguments pass through by value.
//!
//! A root scope (created outside any running graph) drives the scheduler
//! when joined or dropped. A nested scope (created inside a task body) is
//! `.await`ed, suspending the enclosing task until its children finish.

use std::cell::Cell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use tracing::warn;

use crate::scheduler::{self, Config, Executor, Mode, ScopeId, TaskFuture};

/// Handle to a scheduler instance with explicit configuration.
///
/// Most graphs use the free [`task`]/[`parallel`] constructors, which fall
/// back to a default-configured scheduler at the root. Construct a
/// `Runtime` when the scheduler needs tuning (e.g. the deadlock scan
/// limit).
pub struct Runtime {
    exec: Rc<Executor>,
}

impl Runtime {
    /// Creates a runtime with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a runtime with the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self {
            exec: Executor::new(config),
        }
    }

    /// Opens a root task scope on this runtime.
    pub fn task(&self) -> Scope {
        Scope::new(self.exec.clone(), true)
    }

    /// Alias of [`Runtime::task`]; both spellings construct the same scope.
    pub fn parallel(&self) -> Scope {
        self.task()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens a task scope.
///
/// Inside a running graph this attaches to the enclosing scheduler and the
/// returned scope must be `.await`ed. Outside a graph it creates a fresh
/// default scheduler and the scope joins on [`Scope::join`] or on drop.
pub fn task() -> Scope {
    match scheduler::current() {
        Some(exec) => Scope::new(exec, false),
        None => Scope::new(Executor::new(Config::default()), true),
    }
}

/// Alias of [`task`]; conventionally used for scopes that only wire
/// children together and do no computation of their own.
pub fn parallel() -> Scope {
    task()
}

/// A scope owning a set of child task invocations.
pub struct Scope {
    exec: Rc<Executor>,
    id: ScopeId,
    root: bool,
    joined: Cell<bool>,
}

impl Scope {
    fn new(exec: Rc<Executor>, root: bool) -> Self {
        let id = exec.alloc_scope();
        Self {
            exec,
            id,
            root,
            joined: Cell::new(false),
        }
    }

    /// Invokes `f` once as a joined child.
    pub fn invoke<Params, Args, F>(self, f: F, args: Args) -> Self
    where
        F: TaskFactory<Params, Args>,
    {
        self.spawn_children(1, Mode::Join, None, &f, &args);
        self
    }

    /// Invokes `f` once as a joined child with a diagnostic label.
    pub fn invoke_named<Params, Args, F>(self, label: &str, f: F, args: Args) -> Self
    where
        F: TaskFactory<Params, Args>,
    {
        self.spawn_children(1, Mode::Join, Some(label), &f, &args);
        self
    }

    /// Invokes `f` once as a detached child. Detached children are never
    /// awaited; they are torn down when the root scope exits.
    pub fn invoke_detached<Params, Args, F>(self, f: F, args: Args) -> Self
    where
        F: TaskFactory<Params, Args>,
    {
        self.spawn_children(1, Mode::Detach, None, &f, &args);
        self
    }

    /// Invokes `f` `n` times as joined children, applying argument
    /// adapters independently per instantiation.
    pub fn invoke_n<Params, Args, F>(self, n: usize, f: F, args: Args) -> Self
    where
        F: TaskFactory<Params, Args>,
    {
        self.spawn_children(n, Mode::Join, None, &f, &args);
        self
    }

    /// Invokes `f` `n` times as detached children.
    pub fn invoke_n_detached<Params, Args, F>(self, n: usize, f: F, args: Args) -> Self
    where
        F: TaskFactory<Params, Args>,
    {
        self.spawn_children(n, Mode::Detach, None, &f, &args);
        self
    }

    fn spawn_children<Params, Args, F>(
        &self,
        n: usize,
        mode: Mode,
        label: Option<&str>,
        f: &F,
        args: &Args,
    ) where
        F: TaskFactory<Params, Args>,
    {
        let mut cx = InvokeCx {
            exec: &self.exec,
            scope: self.id,
        };
        for i in 0..n {
            let future = f.instantiate(args, &mut cx);
            let base = label
                .map(str::to_string)
                .unwrap_or_else(short_type_name::<F>);
            let label = if n > 1 { format!("{base}#{i}") } else { base };
            self.exec.spawn(self.id, mode, label, future);
        }
    }

    /// Waits for every joined child of this graph to finish.
    ///
    /// Only valid on a root scope; nested scopes suspend the enclosing
    /// task instead, via `.await`.
    pub fn join(self) {
        assert!(
            self.root,
            "nested scopes must be `.await`ed, not joined synchronously"
        );
        self.joined.set(true);
        self.exec.drive_root();
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if self.joined.get() || std::thread::panicking() {
            return;
        }
        if self.root {
            self.exec.drive_root();
        } else {
            let pending = self.exec.scope_pending(self.id);
            if pending > 0 {
                warn!(
                    pending,
                    "nested scope dropped without awaiting its children; \
                     they keep running until the root scope exits"
                );
            }
        }
    }
}

/// Future returned by awaiting a nested [`Scope`].
pub struct ScopeJoin {
    exec: Rc<Executor>,
    id: ScopeId,
}

impl Future for ScopeJoin {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let pending = self.exec.scope_pending(self.id);
        if pending == 0 {
            Poll::Ready(())
        } else {
            scheduler::note_yield(format!("scope join: {pending} children pending"));
            Poll::Pending
        }
    }
}

impl IntoFuture for Scope {
    type Output = ();
    type IntoFuture = ScopeJoin;

    fn into_future(self) -> ScopeJoin {
        self.joined.set(true);
        ScopeJoin {
            exec: self.exec.clone(),
            id: self.id,
        }
    }
}

/// Per-`invoke` adapter context handed to [`ArgInto::resolve`].
pub struct InvokeCx<'a> {
    exec: &'a Rc<Executor>,
    scope: ScopeId,
}

impl InvokeCx<'_> {
    /// Spawns a detached helper task (e.g. an async-mmap service) as part
    /// of resolving an argument.
    pub(crate) fn spawn_detached(&mut self, label: String, future: TaskFuture) {
        self.exec.spawn(self.scope, Mode::Detach, label, future);
    }
}

/// Converts an `invoke` argument into the parameter type a task function
/// expects.
///
/// The adapter is chosen by matching argument and parameter shapes:
/// identity for values, endpoint extraction for `&Stream`, positional
/// slots for `&MmapArray` and stream bundles, async adaptation for
/// `Mmap` → `AsyncMmap`, and sequence-next for [`Seq`].
pub trait ArgInto<P> {
    /// Produces the parameter value for one task instantiation.
    fn resolve(&self, cx: &mut InvokeCx<'_>) -> P;
}

impl<P: Clone> ArgInto<P> for P {
    fn resolve(&self, _cx: &mut InvokeCx<'_>) -> P {
        self.clone()
    }
}

/// Expands to an increasing integer on each invocation within the same
/// `invoke` call, giving replicated workers ordinal identities.
pub struct Seq {
    next: Cell<u64>,
}

impl Seq {
    /// Starts the sequence at zero.
    pub fn new() -> Self {
        Self { next: Cell::new(0) }
    }
}

impl Default for Seq {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! impl_seq_arg {
    ($($t:ty),* $(,)?) => {$(
        impl ArgInto<$t> for Seq {
            fn resolve(&self, _cx: &mut InvokeCx<'_>) -> $t {
                let v = self.next.get();
                self.next.set(v + 1);
                v as $t
            }
        }
    )*};
}

impl_seq_arg!(usize, u64, u32, i64, i32);

/// Instantiates a task function against a tuple of `invoke` arguments.
///
/// Implemented for every `Fn` of up to eight parameters whose arguments
/// each implement [`ArgInto`] of the corresponding parameter type.
pub trait TaskFactory<Params, Args> {
    /// Resolves the arguments and packages one task instance.
    fn instantiate(&self, args: &Args, cx: &mut InvokeCx<'_>) -> TaskFuture;
}

macro_rules! impl_task_factory {
    ($(($P:ident, $A:ident, $idx:tt)),*) => {
        impl<Func, Fut, $($P,)* $($A,)*> TaskFactory<($($P,)*), ($($A,)*)> for Func
        where
            Func: Fn($($P),*) -> Fut,
            Fut: Future<Output = ()> + 'static,
            $($A: ArgInto<$P>,)*
        {
            #[allow(unused_variables)]
            fn instantiate(&self, args: &($($A,)*), cx: &mut InvokeCx<'_>) -> TaskFuture {
                Box::pin((self)($(args.$idx.resolve(cx)),*))
            }
        }
    };
}

impl_task_factory!();
impl_task_factory!((P0, A0, 0));
impl_task_factory!((P0, A0, 0), (P1, A1, 1));
impl_task_factory!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2));
impl_task_factory!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2), (P3, A3, 3));
impl_task_factory!((P0, A0, 0), (P1, A1, 1), (P2, A2, 2), (P3, A3, 3), (P4, A4, 4));
impl_task_factory!(
    (P0, A0, 0),
    (P1, A1, 1),
    (P2, A2, 2),
    (P3, A3, 3),
    (P4, A4, 4),
    (P5, A5, 5)
);
impl_task_factory!(
    (P0, A0, 0),
    (P1, A1, 1),
    (P2, A2, 2),
    (P3, A3, 3),
    (P4, A4, 4),
    (P5, A5, 5),
    (P6, A6, 6)
);
impl_task_factory!(
    (P0, A0, 0),
    (P1, A1, 1),
    (P2, A2, 2),
    (P3, A3, 3),
    (P4, A4, 4),
    (P5, A5, 5),
    (P6, A6, 6),
    (P7, A7, 7)
);

fn short_type_name<F>() -> String {
    let full = std::any::type_name::<F>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}
