//! Per-fiber hook records.
//!
//! A component receives a [`Hooks`] context bound to its fiber. Every hook
//! call appends one record; on re-render the record at the same call index
//! of the mirror fiber seeds the new one. Records that must survive across
//! generations (state cells, refs, effect teardowns) are shared `Rc`s, so
//! carrying a record over never copies user state.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::element::{Component, Element};
use crate::fiber::{FiberId, FiberTree};
use crate::props::{EventHandler, Props, CHILDREN_KEY};
use crate::runtime::RuntimeHandle;
use crate::FiberError;

/// Mutable box whose identity is stable for the lifetime of a component.
pub struct RefObject<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for RefObject<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> RefObject<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }

    pub fn ptr_eq(&self, other: &RefObject<T>) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.cell) as *const () as usize
    }
}

impl<T: Clone> RefObject<T> {
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T: Default> Default for RefObject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for RefObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefObject").field(&*self.cell.borrow()).finish()
    }
}

/// One entry of a dependency list.
///
/// Scalars compare by value, everything else by reference identity.
#[derive(Clone, Debug, PartialEq)]
pub enum Dep {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(Rc<str>),
    Ptr(usize),
}

macro_rules! int_dep {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Dep {
            fn from(value: $ty) -> Self {
                Dep::Int(value as i64)
            }
        })*
    };
}

int_dep!(i32, i64, u32, u64, usize);

impl From<f64> for Dep {
    fn from(value: f64) -> Self {
        Dep::Float(value)
    }
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Dep::Bool(value)
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Dep::Text(Rc::from(value))
    }
}

impl From<String> for Dep {
    fn from(value: String) -> Self {
        Dep::Text(Rc::from(value))
    }
}

impl<T: ?Sized> From<&Rc<T>> for Dep {
    fn from(value: &Rc<T>) -> Self {
        Dep::Ptr(Rc::as_ptr(value) as *const () as usize)
    }
}

impl<T> From<&RefObject<T>> for Dep {
    fn from(value: &RefObject<T>) -> Self {
        Dep::Ptr(value.addr())
    }
}

impl From<&EventHandler> for Dep {
    fn from(value: &EventHandler) -> Self {
        Dep::Ptr(value.addr())
    }
}

impl<S, A> From<&Dispatch<S, A>> for Dep {
    fn from(value: &Dispatch<S, A>) -> Self {
        Dep::Ptr(Rc::as_ptr(&value.cell) as *const () as usize)
    }
}

impl<T> From<&StateSetter<T>> for Dep {
    fn from(value: &StateSetter<T>) -> Self {
        Dep::from(&value.dispatch)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Deps(Vec<Dep>);

impl Deps {
    pub fn new(deps: Vec<Dep>) -> Self {
        Self(deps)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds a present dependency list: `deps![]`, `deps![count, &handler]`.
#[macro_export]
macro_rules! deps {
    () => {
        ::core::option::Option::Some($crate::Deps::new(::std::vec::Vec::new()))
    };
    ($($dep:expr),+ $(,)?) => {
        ::core::option::Option::Some($crate::Deps::new(::std::vec![$($crate::Dep::from($dep)),+]))
    };
}

/// Whether a deps-guarded hook must recompute.
pub(crate) fn deps_changed(previous: Option<&Deps>, next: Option<&Deps>) -> bool {
    match (previous, next) {
        (Some(previous), Some(next)) => previous != next,
        _ => true,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    State,
    Effect,
    LayoutEffect,
    Ref,
    Memo,
    ImperativeHandle,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookKind::State => "state",
            HookKind::Effect => "effect",
            HookKind::LayoutEffect => "layout effect",
            HookKind::Ref => "ref",
            HookKind::Memo => "memo",
            HookKind::ImperativeHandle => "imperative handle",
        })
    }
}

pub(crate) type Teardown = Box<dyn FnOnce() + 'static>;
pub(crate) type TeardownCell = Rc<RefCell<Option<Teardown>>>;
pub(crate) type EffectSetup = Box<dyn FnOnce() -> Cleanup + 'static>;

/// Value returned by an effect setup: an optional teardown.
pub struct Cleanup(Option<Teardown>);

impl Cleanup {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(teardown)))
    }

    pub(crate) fn into_teardown(self) -> Option<Teardown> {
        self.0
    }
}

impl From<()> for Cleanup {
    fn from(_: ()) -> Self {
        Cleanup::none()
    }
}

pub(crate) struct EffectHook {
    deps: Option<Deps>,
    pending: Option<EffectSetup>,
    teardown: TeardownCell,
}

impl EffectHook {
    /// Setup scheduled by the last render, with the teardown cell it replaces.
    pub(crate) fn take_pending(&mut self) -> Option<(TeardownCell, EffectSetup)> {
        self.pending
            .take()
            .map(|setup| (Rc::clone(&self.teardown), setup))
    }

    pub(crate) fn run_teardown(&self) {
        run_teardown(&self.teardown);
    }
}

pub(crate) fn run_teardown(cell: &TeardownCell) {
    let teardown = cell.borrow_mut().take();
    if let Some(teardown) = teardown {
        teardown();
    }
}

/// Runs the previous teardown, then `setup`, keeping its teardown.
pub(crate) fn run_effect(cell: &TeardownCell, setup: EffectSetup) {
    run_teardown(cell);
    let teardown = setup().into_teardown();
    *cell.borrow_mut() = teardown;
}

pub(crate) struct MemoHook {
    deps: Option<Deps>,
    value: Rc<dyn Any>,
}

pub(crate) enum Hook {
    State(Rc<dyn Any>),
    Effect(EffectHook),
    LayoutEffect(EffectHook),
    Ref(Rc<dyn Any>),
    Memo(MemoHook),
    ImperativeHandle(EffectHook),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Hook").field(&self.kind()).finish()
    }
}

impl Hook {
    pub(crate) fn kind(&self) -> HookKind {
        match self {
            Hook::State(_) => HookKind::State,
            Hook::Effect(_) => HookKind::Effect,
            Hook::LayoutEffect(_) => HookKind::LayoutEffect,
            Hook::Ref(_) => HookKind::Ref,
            Hook::Memo(_) => HookKind::Memo,
            Hook::ImperativeHandle(_) => HookKind::ImperativeHandle,
        }
    }

    pub(crate) fn effect(&self) -> Option<&EffectHook> {
        match self {
            Hook::Effect(hook) | Hook::LayoutEffect(hook) | Hook::ImperativeHandle(hook) => {
                Some(hook)
            }
            _ => None,
        }
    }

    pub(crate) fn effect_mut(&mut self) -> Option<(HookKind, &mut EffectHook)> {
        match self {
            Hook::Effect(hook) => Some((HookKind::Effect, hook)),
            Hook::LayoutEffect(hook) => Some((HookKind::LayoutEffect, hook)),
            Hook::ImperativeHandle(hook) => Some((HookKind::ImperativeHandle, hook)),
            _ => None,
        }
    }

    fn effect_with(kind: HookKind, hook: EffectHook) -> Self {
        match kind {
            HookKind::LayoutEffect => Hook::LayoutEffect(hook),
            HookKind::ImperativeHandle => Hook::ImperativeHandle(hook),
            _ => Hook::Effect(hook),
        }
    }
}

struct ReducerCell<S, A> {
    value: RefCell<S>,
    reducer: RefCell<Rc<dyn Fn(&S, A) -> S>>,
    runtime: RuntimeHandle,
}

/// Dispatcher returned by [`Hooks::use_reducer`].
///
/// Dispatching applies the reducer immediately and requests a new render
/// cycle; dispatches are not batched.
pub struct Dispatch<S, A> {
    cell: Rc<ReducerCell<S, A>>,
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<S, A> Dispatch<S, A> {
    pub fn dispatch(&self, action: A) {
        let reducer = Rc::clone(&*self.cell.reducer.borrow());
        let next = {
            let current = self.cell.value.borrow();
            reducer(&*current, action)
        };
        *self.cell.value.borrow_mut() = next;
        self.cell.runtime.request_rerender();
    }

    pub fn ptr_eq(&self, other: &Dispatch<S, A>) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<S: Clone, A> Dispatch<S, A> {
    /// Latest value, including updates not rendered yet.
    pub fn current(&self) -> S {
        self.cell.value.borrow().clone()
    }
}

pub enum SetState<T> {
    Value(T),
    Update(Box<dyn FnOnce(&T) -> T>),
}

fn apply_set_state<T: Clone>(current: &T, action: SetState<T>) -> T {
    match action {
        SetState::Value(value) => value,
        SetState::Update(update) => update(current),
    }
}

/// Setter returned by [`Hooks::use_state`].
pub struct StateSetter<T> {
    dispatch: Dispatch<T, SetState<T>>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<T: 'static> StateSetter<T> {
    pub fn set(&self, value: T) {
        self.dispatch.dispatch(SetState::Value(value));
    }

    pub fn update(&self, update: impl FnOnce(&T) -> T + 'static) {
        self.dispatch.dispatch(SetState::Update(Box::new(update)));
    }

    pub fn ptr_eq(&self, other: &StateSetter<T>) -> bool {
        self.dispatch.ptr_eq(&other.dispatch)
    }
}

/// Context carried by a provider description and resolved through the
/// parent chain at render time.
pub struct Context<T> {
    name: &'static str,
    key: Rc<str>,
    provider: Component,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Context<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            key: Rc::clone(&self.key),
            provider: self.provider.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Context<T> {
    pub fn new(name: &'static str) -> Self {
        static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(0);
        let id = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        let provider = Component::new(name, move |_, props| {
            props
                .element(CHILDREN_KEY)
                .cloned()
                .ok_or_else(|| FiberError::render(name, "context provider has no child"))
        });
        Self {
            name,
            key: Rc::from(format!("context:{id}")),
            provider,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Description making `value` visible to every component under `child`.
    pub fn provider(&self, value: T, child: Element) -> Element {
        self.provider.element(
            Props::new()
                .with_any(&self.key, value)
                .with(CHILDREN_KEY, child),
        )
    }
}

/// Hook context handed to a component while it renders.
pub struct Hooks<'a> {
    tree: &'a FiberTree,
    fiber: FiberId,
    component: &'static str,
    previous: &'a [Hook],
    has_mirror: bool,
    records: Vec<Hook>,
    runtime: &'a RuntimeHandle,
}

impl<'a> Hooks<'a> {
    pub(crate) fn new(
        tree: &'a FiberTree,
        fiber: FiberId,
        component: &'static str,
        previous: &'a [Hook],
        has_mirror: bool,
        runtime: &'a RuntimeHandle,
    ) -> Self {
        Self {
            tree,
            fiber,
            component,
            previous,
            has_mirror,
            records: Vec::with_capacity(previous.len()),
            runtime,
        }
    }

    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Index the next hook call resolves to.
    pub fn cursor(&self) -> usize {
        self.records.len()
    }

    fn previous(&self, kind: HookKind) -> Result<Option<&'a Hook>, FiberError> {
        let previous: &'a [Hook] = self.previous;
        let index = self.records.len();
        match previous.get(index) {
            Some(hook) if hook.kind() == kind => Ok(Some(hook)),
            Some(hook) => Err(FiberError::HookMismatch {
                component: self.component,
                index,
                expected: hook.kind(),
                found: kind,
            }),
            None if self.has_mirror => Err(FiberError::HookCountChanged {
                component: self.component,
                previous: previous.len(),
                current: index + 1,
            }),
            None => Ok(None),
        }
    }

    fn type_mismatch(&self) -> FiberError {
        FiberError::HookTypeMismatch {
            component: self.component,
            index: self.records.len(),
        }
    }

    pub(crate) fn finish(self) -> Result<Vec<Hook>, FiberError> {
        if self.has_mirror && self.records.len() != self.previous.len() {
            return Err(FiberError::HookCountChanged {
                component: self.component,
                previous: self.previous.len(),
                current: self.records.len(),
            });
        }
        Ok(self.records)
    }

    pub fn use_reducer<S, A>(
        &mut self,
        reducer: impl Fn(&S, A) -> S + 'static,
        init: impl FnOnce() -> S,
    ) -> Result<(S, Dispatch<S, A>), FiberError>
    where
        S: Clone + 'static,
        A: 'static,
    {
        let cell = match self.previous(HookKind::State)? {
            Some(Hook::State(record)) => {
                let cell = Rc::clone(record)
                    .downcast::<ReducerCell<S, A>>()
                    .map_err(|_| self.type_mismatch())?;
                *cell.reducer.borrow_mut() = Rc::new(reducer);
                cell
            }
            _ => Rc::new(ReducerCell {
                value: RefCell::new(init()),
                reducer: RefCell::new(Rc::new(reducer)),
                runtime: self.runtime.clone(),
            }),
        };
        let value = cell.value.borrow().clone();
        self.records.push(Hook::State(cell.clone()));
        Ok((value, Dispatch { cell }))
    }

    pub fn use_state<T: Clone + 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Result<(T, StateSetter<T>), FiberError> {
        let (value, dispatch) = self.use_reducer(apply_set_state::<T>, init)?;
        Ok((value, StateSetter { dispatch }))
    }

    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Result<RefObject<T>, FiberError> {
        let record = match self.previous(HookKind::Ref)? {
            Some(Hook::Ref(record)) => Rc::clone(record),
            _ => Rc::new(RefObject::new(init())) as Rc<dyn Any>,
        };
        let object = record
            .downcast_ref::<RefObject<T>>()
            .cloned()
            .ok_or_else(|| self.type_mismatch())?;
        self.records.push(Hook::Ref(record));
        Ok(object)
    }

    /// Recomputes `compute` only when `deps` changed; otherwise returns the
    /// previous value with its identity intact.
    pub fn use_memo<T: 'static>(
        &mut self,
        compute: impl FnOnce() -> T,
        deps: Option<Deps>,
    ) -> Result<Rc<T>, FiberError> {
        let reused = match self.previous(HookKind::Memo)? {
            Some(Hook::Memo(memo)) if !deps_changed(memo.deps.as_ref(), deps.as_ref()) => Some(
                Rc::clone(&memo.value)
                    .downcast::<T>()
                    .map_err(|_| self.type_mismatch())?,
            ),
            _ => None,
        };
        let value = reused.unwrap_or_else(|| Rc::new(compute()));
        self.records.push(Hook::Memo(MemoHook {
            deps,
            value: value.clone(),
        }));
        Ok(value)
    }

    pub fn use_callback<F: 'static>(&mut self, callback: F, deps: Option<Deps>) -> Result<Rc<F>, FiberError> {
        self.use_memo(move || callback, deps)
    }

    fn use_effect_kind(
        &mut self,
        kind: HookKind,
        setup: Option<EffectSetup>,
        deps: Option<Deps>,
    ) -> Result<(), FiberError> {
        let previous = self.previous(kind)?.and_then(Hook::effect);
        let (teardown, due) = match previous {
            Some(hook) => (
                Rc::clone(&hook.teardown),
                deps_changed(hook.deps.as_ref(), deps.as_ref()),
            ),
            None => (TeardownCell::default(), true),
        };
        self.records.push(Hook::effect_with(
            kind,
            EffectHook {
                deps,
                pending: setup.filter(|_| due),
                teardown,
            },
        ));
        Ok(())
    }

    /// Effect run in a macrotask after the commit that produced this render.
    pub fn use_effect<C: Into<Cleanup>>(
        &mut self,
        setup: impl FnOnce() -> C + 'static,
        deps: Option<Deps>,
    ) -> Result<(), FiberError> {
        self.use_effect_kind(
            HookKind::Effect,
            Some(Box::new(move || Into::<Cleanup>::into(setup()))),
            deps,
        )
    }

    /// Effect run synchronously during commit, before any passive effect.
    pub fn use_layout_effect<C: Into<Cleanup>>(
        &mut self,
        setup: impl FnOnce() -> C + 'static,
        deps: Option<Deps>,
    ) -> Result<(), FiberError> {
        self.use_effect_kind(
            HookKind::LayoutEffect,
            Some(Box::new(move || Into::<Cleanup>::into(setup()))),
            deps,
        )
    }

    /// Exposes the value built by `create` through `target` while this
    /// component is mounted.
    pub fn use_imperative_handle<T: 'static>(
        &mut self,
        target: Option<&RefObject<Option<T>>>,
        create: impl FnOnce() -> T + 'static,
        deps: Option<Deps>,
    ) -> Result<(), FiberError> {
        let setup = target.cloned().map(|target| -> EffectSetup {
            Box::new(move || {
                target.set(Some(create()));
                Cleanup::new(move || target.set(None))
            })
        });
        self.use_effect_kind(HookKind::ImperativeHandle, setup, deps)
    }

    /// Value of the nearest enclosing provider of `context`.
    pub fn use_context<T: 'static>(&self, context: &Context<T>) -> Result<Rc<T>, FiberError> {
        let mut cursor = self.tree.get(self.fiber).and_then(|fiber| fiber.parent);
        while let Some(id) = cursor {
            let Some(fiber) = self.tree.get(id) else {
                break;
            };
            if let Some(value) = fiber.props.any::<T>(&context.key) {
                return Ok(value);
            }
            cursor = fiber.parent;
        }
        Err(FiberError::MissingContext {
            context: context.name,
            component: self.component,
        })
    }
}
