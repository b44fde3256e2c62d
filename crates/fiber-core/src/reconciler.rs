//! Resumable depth-first walk that builds the work-in-progress generation.
//!
//! Each call to [`Reconciler::work_one`] processes exactly one fiber: it
//! expands the fiber into children diffed positionally against its mirror,
//! then either descends or completes upward, splicing effect sub-chains into
//! the parent so the finished root carries a post-order effect chain.

use std::rc::Rc;

use crate::element::{Component, Element};
use crate::fiber::{EffectTag, Fiber, FiberId, FiberKind, FiberTree};
use crate::hooks::Hooks;
use crate::host::{Host, HostId};
use crate::props::{Props, TEXT_VALUE_KEY};
use crate::runtime::RuntimeHandle;
use crate::FiberError;

pub struct Reconciler {
    tree: FiberTree,
    container: HostId,
    current: Option<FiberId>,
    wip_root: Option<FiberId>,
    next_unit: Option<FiberId>,
    deletions: Vec<FiberId>,
    description: Option<Rc<[Element]>>,
}

impl Reconciler {
    pub fn new(container: HostId) -> Self {
        Self {
            tree: FiberTree::new(),
            container,
            current: None,
            wip_root: None,
            next_unit: None,
            deletions: Vec::new(),
            description: None,
        }
    }

    pub fn tree(&self) -> &FiberTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut FiberTree {
        &mut self.tree
    }

    pub fn container(&self) -> HostId {
        self.container
    }

    /// Root of the last committed generation.
    pub fn current(&self) -> Option<FiberId> {
        self.current
    }

    pub fn work_in_progress(&self) -> Option<FiberId> {
        self.wip_root
    }

    pub fn next_unit(&self) -> Option<FiberId> {
        self.next_unit
    }

    pub fn has_pending_work(&self) -> bool {
        self.next_unit.is_some() || self.wip_root.is_some()
    }

    /// Old fibers queued for removal by the cycle in progress.
    pub fn deletions(&self) -> &[FiberId] {
        &self.deletions
    }

    /// Seeds a new cycle rendering `element` under the container.
    pub fn render(&mut self, element: Element) {
        self.description = Some(Rc::from([element]));
        self.seed();
    }

    /// Seeds a new cycle from the last rendered description, discarding any
    /// cycle in flight.
    pub fn restart(&mut self) {
        if self.description.is_none() {
            log::warn!("re-render requested before anything was rendered");
            return;
        }
        self.seed();
    }

    fn seed(&mut self) {
        let Some(description) = self.description.clone() else {
            return;
        };
        if self.wip_root.is_some() {
            log::debug!("discarding in-flight cycle");
        }
        self.abandon();
        let swept = self.tree.retain_reachable(self.current);

        let mut root = Fiber::new(FiberKind::Root, Props::new(), None);
        root.host = Some(self.container);
        root.mirror = self.current;
        root.children = description;
        let id = self.tree.insert(root);
        self.wip_root = Some(id);
        self.next_unit = Some(id);
        log::debug!(
            "seeded cycle at {id:?} (mirror {:?}, {swept} fibers retired)",
            self.current
        );
    }

    fn abandon(&mut self) {
        for id in self.deletions.drain(..) {
            if let Some(fiber) = self.tree.get_mut(id) {
                fiber.effect = EffectTag::None;
            }
        }
        self.wip_root = None;
        self.next_unit = None;
    }

    /// Drops the cycle in flight; the committed generation is untouched.
    pub fn abort(&mut self) {
        self.abandon();
        self.tree.retain_reachable(self.current);
    }

    /// Performs one unit of work. Returns `false` when there was none.
    pub fn work_one(&mut self, host: &mut dyn Host, runtime: &RuntimeHandle) -> Result<bool, FiberError> {
        let Some(unit) = self.next_unit else {
            return Ok(false);
        };
        self.next_unit = self.perform_unit_of_work(unit, host, runtime)?;
        Ok(true)
    }

    fn perform_unit_of_work(
        &mut self,
        id: FiberId,
        host: &mut dyn Host,
        runtime: &RuntimeHandle,
    ) -> Result<Option<FiberId>, FiberError> {
        log::trace!("unit of work: {}", self.tree.describe(id));
        self.begin_work(id, host, runtime)?;

        if let Some(child) = self.tree.fiber(id)?.child {
            return Ok(Some(child));
        }
        let mut cursor = Some(id);
        while let Some(fiber) = cursor {
            self.complete_unit_of_work(fiber)?;
            let completed = self.tree.fiber(fiber)?;
            if completed.sibling.is_some() {
                return Ok(completed.sibling);
            }
            cursor = completed.parent;
        }
        Ok(None)
    }

    fn begin_work(&mut self, id: FiberId, host: &mut dyn Host, runtime: &RuntimeHandle) -> Result<(), FiberError> {
        let fiber = self.tree.fiber(id)?;
        let kind = fiber.kind.clone();
        let has_host = fiber.host.is_some();
        match kind {
            FiberKind::Component(component) => self.update_component(id, &component, runtime)?,
            FiberKind::Root => {}
            FiberKind::Host(tag) => {
                if !has_host {
                    let node = host.create_element(&tag);
                    self.tree.fiber_mut(id)?.host = Some(node);
                }
            }
            FiberKind::Text => {
                if !has_host {
                    let fiber = self.tree.fiber_mut(id)?;
                    let node = host.create_text(fiber.props.text(TEXT_VALUE_KEY).unwrap_or(""));
                    fiber.host = Some(node);
                }
            }
        }
        let children = Rc::clone(&self.tree.fiber(id)?.children);
        self.reconcile_children(id, &children)
    }

    fn update_component(
        &mut self,
        id: FiberId,
        component: &Component,
        runtime: &RuntimeHandle,
    ) -> Result<(), FiberError> {
        let (records, element) = {
            let fiber = self.tree.fiber(id)?;
            let props = fiber.props.clone();
            let mirror = fiber.mirror.and_then(|mirror| self.tree.get(mirror));
            let previous = mirror.map(|mirror| mirror.hooks.as_slice()).unwrap_or(&[]);
            let mut hooks = Hooks::new(
                &self.tree,
                id,
                component.name(),
                previous,
                mirror.is_some(),
                runtime,
            );
            let element = component.render(&mut hooks, &props)?;
            (hooks.finish()?, element)
        };
        let fiber = self.tree.fiber_mut(id)?;
        fiber.hooks = records;
        fiber.children = Rc::from([element]);
        Ok(())
    }

    /// Pairs `children` with the mirror's old children by position.
    fn reconcile_children(&mut self, parent: FiberId, children: &[Element]) -> Result<(), FiberError> {
        let mut old = self
            .tree
            .fiber(parent)?
            .mirror
            .and_then(|mirror| self.tree.get(mirror))
            .and_then(|mirror| mirror.child);
        let mut previous: Option<FiberId> = None;

        for element in children {
            let reusable = match old {
                Some(old_id) => self.tree.fiber(old_id)?.kind.matches(element.kind()),
                None => false,
            };
            if !reusable {
                // A kind change retires every remaining old sibling.
                self.delete_remaining(old.take())?;
            }

            let mut fiber = Fiber::new(
                FiberKind::from_element(element.kind()),
                element.props().clone(),
                Some(parent),
            );
            fiber.children = Rc::clone(element.children());
            match old {
                Some(old_id) => {
                    let old_fiber = self.tree.fiber(old_id)?;
                    fiber.mirror = Some(old_id);
                    fiber.host = old_fiber.host;
                    fiber.effect = EffectTag::Update;
                    old = old_fiber.sibling;
                }
                None => fiber.effect = EffectTag::Insert,
            }

            let id = self.tree.insert(fiber);
            match previous {
                Some(previous) => self.tree.fiber_mut(previous)?.sibling = Some(id),
                None => self.tree.fiber_mut(parent)?.child = Some(id),
            }
            previous = Some(id);
        }

        self.delete_remaining(old)
    }

    fn delete_remaining(&mut self, mut old: Option<FiberId>) -> Result<(), FiberError> {
        while let Some(id) = old {
            let fiber = self.tree.fiber_mut(id)?;
            fiber.effect = EffectTag::Delete;
            old = fiber.sibling;
            self.deletions.push(id);
        }
        Ok(())
    }

    /// Splices the finished fiber's sub-chain, then the fiber itself, onto
    /// its parent's effect chain.
    fn complete_unit_of_work(&mut self, id: FiberId) -> Result<(), FiberError> {
        let fiber = self.tree.fiber(id)?;
        let Some(parent) = fiber.parent else {
            return Ok(());
        };
        let (first, last, tagged) = (
            fiber.first_effect,
            fiber.last_effect,
            fiber.effect != EffectTag::None,
        );

        let parent_fiber = self.tree.fiber_mut(parent)?;
        if parent_fiber.first_effect.is_none() {
            parent_fiber.first_effect = first;
        }
        if let Some(last) = last {
            if let Some(tail) = parent_fiber.last_effect.replace(last) {
                self.tree.fiber_mut(tail)?.next_effect = first;
            }
        }

        if tagged {
            let parent_fiber = self.tree.fiber_mut(parent)?;
            match parent_fiber.last_effect.replace(id) {
                Some(tail) => self.tree.fiber_mut(tail)?.next_effect = Some(id),
                None => parent_fiber.first_effect = Some(id),
            }
        }
        Ok(())
    }

    /// Effect chain of the work-in-progress root, in commit order.
    pub fn effect_chain(&self) -> Vec<FiberId> {
        self.wip_root
            .map(|root| self.tree.effect_chain(root))
            .unwrap_or_default()
    }

    pub(crate) fn take_deletions(&mut self) -> Vec<FiberId> {
        std::mem::take(&mut self.deletions)
    }

    /// Hands deletions taken by a failed commit back so `abort` can unmark them.
    pub(crate) fn restore_deletions(&mut self, deletions: Vec<FiberId>) {
        self.deletions.extend(deletions);
    }

    /// Promotes the finished generation to current.
    pub(crate) fn finish_commit(&mut self) {
        self.current = self.wip_root.take();
        self.next_unit = None;
        self.deletions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::runtime::Runtime;
    use crate::{h, text};

    fn walk(reconciler: &mut Reconciler, host: &mut MemoryHost, runtime: &Runtime) -> usize {
        let handle = runtime.handle();
        let mut units = 0;
        while reconciler.work_one(host, &handle).unwrap() {
            units += 1;
        }
        units
    }

    fn labels(reconciler: &Reconciler) -> Vec<(String, EffectTag)> {
        reconciler
            .effect_chain()
            .into_iter()
            .map(|id| {
                let tree = reconciler.tree();
                (tree.describe(id), tree.get(id).unwrap().effect())
            })
            .collect()
    }

    #[test]
    fn effect_chain_is_post_order() {
        let mut host = MemoryHost::new();
        let runtime = Runtime::new();
        let container = host.create_container("root");
        let mut reconciler = Reconciler::new(container);
        reconciler.render(h("a", Props::new(), [h::<Element, _>("b", Props::new(), []), h::<Element, _>("c", Props::new(), [])]));

        assert_eq!(walk(&mut reconciler, &mut host, &runtime), 4);
        let chain: Vec<String> = labels(&reconciler).into_iter().map(|(label, _)| label).collect();
        assert_eq!(chain, ["b", "c", "a"]);
        assert!(labels(&reconciler).iter().all(|(_, tag)| *tag == EffectTag::Insert));
    }

    #[test]
    fn same_kinds_are_reused_in_place() {
        let mut host = MemoryHost::new();
        let runtime = Runtime::new();
        let container = host.create_container("root");
        let mut reconciler = Reconciler::new(container);
        let tree = || h("ul", Props::new(), [h("li", Props::new(), ["one"]), h("li", Props::new(), ["two"])]);

        reconciler.render(tree());
        walk(&mut reconciler, &mut host, &runtime);
        reconciler.finish_commit();
        let created = host.len();

        reconciler.render(tree());
        walk(&mut reconciler, &mut host, &runtime);
        assert_eq!(host.len(), created, "reuse must not create host nodes");
        assert!(reconciler.deletions().is_empty());
        assert!(labels(&reconciler).iter().all(|(_, tag)| *tag == EffectTag::Update));
    }

    #[test]
    fn kind_change_deletes_the_rest_of_the_old_row() {
        let mut host = MemoryHost::new();
        let runtime = Runtime::new();
        let container = host.create_container("root");
        let mut reconciler = Reconciler::new(container);

        reconciler.render(h("div", Props::new(), [text("a"), h::<Element, _>("p", Props::new(), []), text("c")]));
        walk(&mut reconciler, &mut host, &runtime);
        reconciler.finish_commit();

        reconciler.render(h("div", Props::new(), [h::<Element, _>("span", Props::new(), []), text("b")]));
        walk(&mut reconciler, &mut host, &runtime);
        let deleted: Vec<String> = reconciler
            .deletions()
            .iter()
            .map(|id| reconciler.tree().describe(*id))
            .collect();
        assert_eq!(deleted, ["\"a\"", "p", "\"c\""]);
        let inserted: Vec<String> = labels(&reconciler)
            .into_iter()
            .filter(|(_, tag)| *tag == EffectTag::Insert)
            .map(|(label, _)| label)
            .collect();
        assert_eq!(inserted, ["span", "\"b\""]);
    }

    #[test]
    fn restart_discards_partial_work() {
        let mut host = MemoryHost::new();
        let runtime = Runtime::new();
        let handle = runtime.handle();
        let container = host.create_container("root");
        let mut reconciler = Reconciler::new(container);
        reconciler.render(h("div", Props::new(), ["x"]));
        walk(&mut reconciler, &mut host, &runtime);
        reconciler.finish_commit();
        let current = reconciler.current();

        reconciler.render(h("span", Props::new(), ["y"]));
        assert!(reconciler.work_one(&mut host, &handle).unwrap());
        assert!(reconciler.work_one(&mut host, &handle).unwrap());
        assert_eq!(reconciler.deletions().len(), 1);

        reconciler.restart();
        assert!(reconciler.deletions().is_empty());
        assert_eq!(reconciler.current(), current);
        assert_eq!(reconciler.next_unit(), reconciler.work_in_progress());
        let root = reconciler.tree().get(current.unwrap()).unwrap();
        let div = reconciler.tree().get(root.child().unwrap()).unwrap();
        assert_eq!(div.effect(), EffectTag::None);
    }

    #[test]
    fn restart_without_description_is_ignored() {
        let mut reconciler = Reconciler::new(0);
        reconciler.restart();
        assert!(!reconciler.has_pending_work());
    }
}
