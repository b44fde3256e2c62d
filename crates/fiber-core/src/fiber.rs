//! Fiber arena.
//!
//! Fibers live in a generational [`SlotMap`] and refer to each other by
//! [`FiberId`]. `child` and `sibling` form a left-child/right-sibling tree;
//! `parent` and `mirror` are plain back-references that may outlive their
//! target, in which case lookups simply miss.

use std::fmt;
use std::rc::Rc;

use slotmap::SlotMap;

use crate::collections::map::HashSet;
use crate::element::{Component, Element, ElementKind};
use crate::hooks::Hook;
use crate::host::HostId;
use crate::props::{Props, TEXT_VALUE_KEY};
use crate::FiberError;

slotmap::new_key_type! {
    /// Handle to a fiber in a [`FiberTree`].
    pub struct FiberId;
}

#[derive(Clone, Debug)]
pub enum FiberKind {
    Root,
    Host(Rc<str>),
    Text,
    Component(Component),
}

impl FiberKind {
    pub fn from_element(kind: &ElementKind) -> Self {
        match kind {
            ElementKind::Host(tag) => FiberKind::Host(Rc::clone(tag)),
            ElementKind::Text => FiberKind::Text,
            ElementKind::Component(component) => FiberKind::Component(component.clone()),
        }
    }

    /// Whether a fiber of this kind can be reused for `element`.
    pub fn matches(&self, element: &ElementKind) -> bool {
        match (self, element) {
            (FiberKind::Host(a), ElementKind::Host(b)) => a == b,
            (FiberKind::Text, ElementKind::Text) => true,
            (FiberKind::Component(a), ElementKind::Component(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, FiberKind::Component(_))
    }
}

/// Host mutation pending for a fiber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EffectTag {
    #[default]
    None,
    Insert,
    Delete,
    Update,
}

pub struct Fiber {
    pub(crate) kind: FiberKind,
    pub(crate) props: Props,
    pub(crate) children: Rc<[Element]>,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) mirror: Option<FiberId>,
    pub(crate) host: Option<HostId>,
    pub(crate) effect: EffectTag,
    pub(crate) next_effect: Option<FiberId>,
    pub(crate) first_effect: Option<FiberId>,
    pub(crate) last_effect: Option<FiberId>,
    pub(crate) hooks: Vec<Hook>,
}

impl Fiber {
    pub(crate) fn new(kind: FiberKind, props: Props, parent: Option<FiberId>) -> Self {
        Self {
            kind,
            props,
            children: Rc::from([]),
            parent,
            child: None,
            sibling: None,
            mirror: None,
            host: None,
            effect: EffectTag::None,
            next_effect: None,
            first_effect: None,
            last_effect: None,
            hooks: Vec::new(),
        }
    }

    pub fn kind(&self) -> &FiberKind {
        &self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn parent(&self) -> Option<FiberId> {
        self.parent
    }

    pub fn child(&self) -> Option<FiberId> {
        self.child
    }

    pub fn sibling(&self) -> Option<FiberId> {
        self.sibling
    }

    pub fn mirror(&self) -> Option<FiberId> {
        self.mirror
    }

    pub fn host(&self) -> Option<HostId> {
        self.host
    }

    pub fn effect(&self) -> EffectTag {
        self.effect
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

impl fmt::Debug for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("kind", &self.kind)
            .field("host", &self.host)
            .field("effect", &self.effect)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[derive(Default)]
pub struct FiberTree {
    fibers: SlotMap<FiberId, Fiber>,
}

impl FiberTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub fn fiber(&self, id: FiberId) -> Result<&Fiber, FiberError> {
        self.fibers.get(id).ok_or(FiberError::StaleFiber(id))
    }

    pub(crate) fn fiber_mut(&mut self, id: FiberId) -> Result<&mut Fiber, FiberError> {
        self.fibers.get_mut(id).ok_or(FiberError::StaleFiber(id))
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Children of `id` in sibling order.
    pub fn children(&self, id: FiberId) -> impl Iterator<Item = FiberId> + '_ {
        let first = self.get(id).and_then(|fiber| fiber.child);
        std::iter::successors(first, move |current| {
            self.get(*current).and_then(|fiber| fiber.sibling)
        })
    }

    /// Closest strict ancestor that owns a host node.
    pub fn nearest_host_ancestor(&self, id: FiberId) -> Result<(FiberId, HostId), FiberError> {
        let mut cursor = self.fiber(id)?.parent;
        while let Some(parent) = cursor {
            let fiber = self.fiber(parent)?;
            if let Some(host) = fiber.host {
                return Ok((parent, host));
            }
            cursor = fiber.parent;
        }
        Err(FiberError::Detached(id))
    }

    /// Top-most host nodes materialized by the subtree at `id`: the node's
    /// own host node, or those of its descendants when it has none.
    pub fn host_roots(&self, id: FiberId) -> Vec<HostId> {
        let mut out = Vec::new();
        self.collect_host_roots(id, &mut out);
        out
    }

    fn collect_host_roots(&self, id: FiberId, out: &mut Vec<HostId>) {
        let Some(fiber) = self.get(id) else {
            return;
        };
        match fiber.host {
            Some(host) => out.push(host),
            None => {
                for child in self.children(id) {
                    self.collect_host_roots(child, out);
                }
            }
        }
    }

    pub fn has_deleted_ancestor(&self, id: FiberId) -> bool {
        let mut cursor = self.get(id).and_then(|fiber| fiber.parent);
        while let Some(parent) = cursor {
            match self.get(parent) {
                Some(fiber) if fiber.effect == EffectTag::Delete => return true,
                Some(fiber) => cursor = fiber.parent,
                None => return false,
            }
        }
        false
    }

    /// Subtree of `id` in post-order (children before parents).
    pub fn post_order(&self, id: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        self.collect_post_order(id, &mut out);
        out
    }

    fn collect_post_order(&self, id: FiberId, out: &mut Vec<FiberId>) {
        for child in self.children(id) {
            self.collect_post_order(child, out);
        }
        out.push(id);
    }

    /// Effect chain hanging off `root`, in commit order.
    pub fn effect_chain(&self, root: FiberId) -> Vec<FiberId> {
        let first = self.get(root).and_then(|fiber| fiber.first_effect);
        std::iter::successors(first, |current| {
            self.get(*current).and_then(|fiber| fiber.next_effect)
        })
        .collect()
    }

    /// Drops every fiber not reachable from `root` through child links.
    /// Returns the number of fibers removed.
    pub(crate) fn retain_reachable(&mut self, root: Option<FiberId>) -> usize {
        let mut live = HashSet::default();
        if let Some(root) = root {
            live.extend(self.post_order(root));
        }
        let before = self.fibers.len();
        self.fibers.retain(|id, _| live.contains(&id));
        before - self.fibers.len()
    }

    /// Label for logs: host tag, quoted text, component name or `#root`.
    pub fn describe(&self, id: FiberId) -> String {
        match self.get(id) {
            Some(fiber) => match &fiber.kind {
                FiberKind::Root => "#root".to_owned(),
                FiberKind::Host(tag) => tag.to_string(),
                FiberKind::Text => format!("{:?}", fiber.props.text(TEXT_VALUE_KEY).unwrap_or("")),
                FiberKind::Component(component) => component.name().to_owned(),
            },
            None => format!("<stale {id:?}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(tree: &mut FiberTree, tag: &str, parent: Option<FiberId>) -> FiberId {
        tree.insert(Fiber::new(FiberKind::Host(Rc::from(tag)), Props::new(), parent))
    }

    fn link(tree: &mut FiberTree, parent: FiberId, children: &[FiberId]) {
        tree.get_mut(parent).unwrap().child = children.first().copied();
        for pair in children.windows(2) {
            tree.get_mut(pair[0]).unwrap().sibling = Some(pair[1]);
        }
    }

    #[test]
    fn post_order_visits_children_first() {
        let mut tree = FiberTree::new();
        let a = host(&mut tree, "a", None);
        let b = host(&mut tree, "b", Some(a));
        let c = host(&mut tree, "c", Some(a));
        link(&mut tree, a, &[b, c]);
        assert_eq!(tree.post_order(a), vec![b, c, a]);
        assert_eq!(tree.children(a).collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    fn host_ancestor_skips_components() {
        let mut tree = FiberTree::new();
        let div = host(&mut tree, "div", None);
        tree.get_mut(div).unwrap().host = Some(7);
        let comp = tree.insert(Fiber::new(
            FiberKind::Component(Component::new("C", |_, _| Ok(crate::text("")))),
            Props::new(),
            Some(div),
        ));
        let span = host(&mut tree, "span", Some(comp));
        tree.get_mut(span).unwrap().host = Some(9);
        link(&mut tree, div, &[comp]);
        link(&mut tree, comp, &[span]);

        assert_eq!(tree.nearest_host_ancestor(span).unwrap(), (div, 7));
        assert_eq!(tree.host_roots(comp), vec![9]);
        assert!(matches!(
            tree.nearest_host_ancestor(div),
            Err(FiberError::Detached(_))
        ));
    }

    #[test]
    fn sweep_keeps_only_reachable_fibers() {
        let mut tree = FiberTree::new();
        let a = host(&mut tree, "a", None);
        let b = host(&mut tree, "b", Some(a));
        link(&mut tree, a, &[b]);
        let orphan = host(&mut tree, "orphan", None);

        assert_eq!(tree.retain_reachable(Some(a)), 1);
        assert!(tree.get(orphan).is_none());
        assert!(matches!(tree.fiber(orphan), Err(FiberError::StaleFiber(_))));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn deleted_ancestor_detection() {
        let mut tree = FiberTree::new();
        let a = host(&mut tree, "a", None);
        let b = host(&mut tree, "b", Some(a));
        let c = host(&mut tree, "c", Some(b));
        tree.get_mut(a).unwrap().effect = EffectTag::Delete;
        assert!(tree.has_deleted_ancestor(c));
        assert!(!tree.has_deleted_ancestor(a));
    }
}
