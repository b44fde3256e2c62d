//! Host tree port and an in-memory implementation.

use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::props::{Event, EventHandler};

pub type HostId = usize;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("host node {id} missing")]
    Missing { id: HostId },
    #[error("host node {child} is not a child of {parent}")]
    NotAChild { parent: HostId, child: HostId },
    #[error("host node {id} is not an element")]
    NotAnElement { id: HostId },
}

/// Concrete node tree driven by the committer.
///
/// The engine assumes the host mirrors the committed fiber tree; any error
/// returned here aborts the cycle in progress.
pub trait Host {
    fn create_element(&mut self, tag: &str) -> HostId;
    fn create_text(&mut self, value: &str) -> HostId;
    fn append_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;
    fn replace_child(&mut self, parent: HostId, new: HostId, old: HostId) -> Result<(), HostError>;
    fn set_attribute(&mut self, id: HostId, name: &str, value: &str) -> Result<(), HostError>;
    fn remove_attribute(&mut self, id: HostId, name: &str) -> Result<(), HostError>;
    fn add_event_listener(
        &mut self,
        id: HostId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError>;
    fn remove_event_listener(
        &mut self,
        id: HostId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;
}

/// Journal entry recorded by [`MemoryHost`] for every mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    CreateElement { id: HostId, tag: String },
    CreateText { id: HostId, value: String },
    AppendChild { parent: HostId, child: HostId },
    RemoveChild { parent: HostId, child: HostId },
    ReplaceChild { parent: HostId, new: HostId, old: HostId },
    SetAttribute { id: HostId, name: String, value: String },
    RemoveAttribute { id: HostId, name: String },
    AddEventListener { id: HostId, event: String },
    RemoveEventListener { id: HostId, event: String },
}

enum NodeData {
    Element {
        tag: String,
        attributes: IndexMap<String, String>,
        listeners: Vec<(String, EventHandler)>,
    },
    Text(String),
}

struct MemoryNode {
    data: NodeData,
    parent: Option<HostId>,
    children: Vec<HostId>,
}

/// Host tree kept in memory, for tests and headless runs.
///
/// Removed nodes stay addressable (detached) so callers can still inspect
/// what was torn down. They keep their storage until
/// [`MemoryHost::reclaim_detached`] frees them; a long-running host should
/// call it between cycles.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
    free: Vec<HostId>,
    containers: Vec<HostId>,
    ops: Vec<HostOp>,
    observer: Option<Rc<dyn Fn(&HostOp)>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached element to mount a root under.
    ///
    /// Containers and everything attached below them survive
    /// [`MemoryHost::reclaim_detached`].
    pub fn create_container(&mut self, tag: &str) -> HostId {
        let id = self.push_element(tag);
        self.containers.push(id);
        id
    }

    /// Called synchronously for every recorded mutation.
    pub fn set_observer(&mut self, observer: impl Fn(&HostOp) + 'static) {
        self.observer = Some(Rc::new(observer));
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: HostId) -> bool {
        self.node(id).is_some()
    }

    /// Frees every node not attached under a container and returns how many
    /// went.
    ///
    /// Freed ids are handed out again by later creations. Host nodes created
    /// by a cycle that has not committed yet are detached too, so call this
    /// only while no cycle is in flight.
    pub fn reclaim_detached(&mut self) -> usize {
        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = self.containers.clone();
        while let Some(id) = stack.pop() {
            if let Some(seen) = reachable.get_mut(id) {
                *seen = true;
            }
            stack.extend_from_slice(self.children(id));
        }
        let mut reclaimed = 0;
        for (id, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_some() && !reachable[id] {
                *slot = None;
                self.free.push(id);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            log::debug!("memory host reclaimed {reclaimed} detached nodes");
        }
        reclaimed
    }

    pub fn tag(&self, id: HostId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn text(&self, id: HostId) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Text(value) => Some(value.as_str()),
            NodeData::Element { .. } => None,
        }
    }

    pub fn attribute(&self, id: HostId, name: &str) -> Option<&str> {
        match &self.node(id)?.data {
            NodeData::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    pub fn children(&self, id: HostId) -> &[HostId] {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: HostId) -> Option<HostId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Handlers bound to `event` on `id`, in registration order.
    pub fn listeners(&self, id: HostId, event: &str) -> Vec<EventHandler> {
        match self.node(id).map(|node| &node.data) {
            Some(NodeData::Element { listeners, .. }) => listeners
                .iter()
                .filter(|(name, _)| name == event)
                .map(|(_, handler)| handler.clone())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Invokes every `kind` listener on `id`; returns how many ran.
    ///
    /// Listeners run while `self` is borrowed; callers that need the host
    /// inside a handler should collect [`MemoryHost::listeners`] first.
    pub fn dispatch_event(&self, id: HostId, kind: &str) -> usize {
        let handlers = self.listeners(id, kind);
        let event = Event::new(kind, id);
        for handler in &handlers {
            handler.call(&event);
        }
        handlers.len()
    }

    /// First attached descendant of `root` (inclusive) whose `name`
    /// attribute equals `value`.
    pub fn find(&self, root: HostId, name: &str, value: &str) -> Option<HostId> {
        if self.attribute(root, name) == Some(value) {
            return Some(root);
        }
        self.children(root)
            .iter()
            .find_map(|child| self.find(*child, name, value))
    }

    /// Serializes `id` and its subtree as HTML.
    pub fn render_html(&self, id: HostId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// Serializes the children of `id`.
    pub fn inner_html(&self, id: HostId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_html(*child, &mut out);
        }
        out
    }

    fn write_html(&self, id: HostId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(value) => out.push_str(&escape(value)),
            NodeData::Element {
                tag, attributes, ..
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    let _ = write!(out, " {name}=\"{}\"", escape(value));
                }
                out.push('>');
                for child in &node.children {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn push_element(&mut self, tag: &str) -> HostId {
        self.push(NodeData::Element {
            tag: tag.to_owned(),
            attributes: IndexMap::new(),
            listeners: Vec::new(),
        })
    }

    fn push(&mut self, data: NodeData) -> HostId {
        let node = MemoryNode {
            data,
            parent: None,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn node(&self, id: HostId) -> Option<&MemoryNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn record(&mut self, op: HostOp) {
        log::trace!("host: {op:?}");
        if let Some(observer) = &self.observer {
            observer(&op);
        }
        self.ops.push(op);
    }

    fn node_mut(&mut self, id: HostId) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    fn element_mut(
        &mut self,
        id: HostId,
    ) -> Result<(&mut IndexMap<String, String>, &mut Vec<(String, EventHandler)>), HostError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element {
                attributes,
                listeners,
                ..
            } => Ok((attributes, listeners)),
            NodeData::Text(_) => Err(HostError::NotAnElement { id }),
        }
    }

    fn detach(&mut self, child: HostId) -> Result<(), HostError> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|id| *id != child);
        }
        Ok(())
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl Host for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostId {
        let id = self.push_element(tag);
        self.record(HostOp::CreateElement {
            id,
            tag: tag.to_owned(),
        });
        id
    }

    fn create_text(&mut self, value: &str) -> HostId {
        let id = self.push(NodeData::Text(value.to_owned()));
        self.record(HostOp::CreateText {
            id,
            value: value.to_owned(),
        });
        id
    }

    fn append_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        self.element_mut(parent)?;
        self.node_mut(child)?;
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        self.record(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        if self.node_mut(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(child)?;
        self.record(HostOp::RemoveChild { parent, child });
        Ok(())
    }

    fn replace_child(&mut self, parent: HostId, new: HostId, old: HostId) -> Result<(), HostError> {
        self.node_mut(new)?;
        let position = self
            .node_mut(parent)?
            .children
            .iter()
            .position(|id| *id == old)
            .ok_or(HostError::NotAChild { parent, child: old })?;
        self.detach(new)?;
        // Detaching `new` may shift `old` when both share the parent.
        let position = self
            .node_mut(parent)?
            .children
            .iter()
            .position(|id| *id == old)
            .unwrap_or(position);
        self.node_mut(parent)?.children[position] = new;
        self.node_mut(old)?.parent = None;
        self.node_mut(new)?.parent = Some(parent);
        self.record(HostOp::ReplaceChild { parent, new, old });
        Ok(())
    }

    fn set_attribute(&mut self, id: HostId, name: &str, value: &str) -> Result<(), HostError> {
        let (attributes, _) = self.element_mut(id)?;
        attributes.insert(name.to_owned(), value.to_owned());
        self.record(HostOp::SetAttribute {
            id,
            name: name.to_owned(),
            value: value.to_owned(),
        });
        Ok(())
    }

    fn remove_attribute(&mut self, id: HostId, name: &str) -> Result<(), HostError> {
        let (attributes, _) = self.element_mut(id)?;
        attributes.shift_remove(name);
        self.record(HostOp::RemoveAttribute {
            id,
            name: name.to_owned(),
        });
        Ok(())
    }

    fn add_event_listener(
        &mut self,
        id: HostId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError> {
        let (_, listeners) = self.element_mut(id)?;
        listeners.push((event.to_owned(), handler));
        self.record(HostOp::AddEventListener {
            id,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn remove_event_listener(
        &mut self,
        id: HostId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        let (_, listeners) = self.element_mut(id)?;
        listeners.retain(|(name, bound)| !(name == event && bound.ptr_eq(handler)));
        self.record(HostOp::RemoveEventListener {
            id,
            event: event.to_owned(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn builds_and_serializes_tree() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let div = host.create_element("div");
        let text = host.create_text("a < b");
        host.set_attribute(div, "id", "main").unwrap();
        host.append_child(root, div).unwrap();
        host.append_child(div, text).unwrap();
        assert_eq!(host.inner_html(root), "<div id=\"main\">a &lt; b</div>");
        assert_eq!(host.find(root, "id", "main"), Some(div));
        assert_eq!(host.parent(text), Some(div));
    }

    #[test]
    fn replace_child_keeps_position() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let a = host.create_text("a");
        let b = host.create_text("b");
        let c = host.create_text("c");
        host.append_child(root, a).unwrap();
        host.append_child(root, b).unwrap();
        host.replace_child(root, c, a).unwrap();
        assert_eq!(host.children(root), &[c, b]);
        assert_eq!(host.parent(a), None);
    }

    #[test]
    fn removing_a_stranger_fails() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let orphan = host.create_element("p");
        assert_eq!(
            host.remove_child(root, orphan),
            Err(HostError::NotAChild {
                parent: root,
                child: orphan
            })
        );
        let text = host.create_text("t");
        assert_eq!(
            host.append_child(text, orphan),
            Err(HostError::NotAnElement { id: text })
        );
        assert_eq!(host.remove_child(root, 99), Err(HostError::Missing { id: 99 }));
    }

    #[test]
    fn listeners_are_removed_by_identity() {
        let mut host = MemoryHost::new();
        let button = host.create_element("button");
        let hits = Rc::new(Cell::new(0));
        let first = {
            let hits = Rc::clone(&hits);
            EventHandler::new(move |_| hits.set(hits.get() + 1))
        };
        let second = {
            let hits = Rc::clone(&hits);
            EventHandler::new(move |_| hits.set(hits.get() + 10))
        };
        host.add_event_listener(button, "click", first.clone()).unwrap();
        host.add_event_listener(button, "click", second).unwrap();
        assert_eq!(host.dispatch_event(button, "click"), 2);
        host.remove_event_listener(button, "click", &first).unwrap();
        assert_eq!(host.dispatch_event(button, "click"), 1);
        assert_eq!(hits.get(), 21);
    }

    #[test]
    fn reclaim_frees_detached_nodes_and_reuses_their_ids() {
        let mut host = MemoryHost::new();
        let root = host.create_container("root");
        let kept = host.create_element("p");
        let old = host.create_text("old");
        let fresh = host.create_text("fresh");
        host.append_child(root, kept).unwrap();
        host.append_child(kept, old).unwrap();
        host.replace_child(kept, fresh, old).unwrap();
        let orphan = host.create_element("div");
        let nested = host.create_text("nested");
        host.append_child(orphan, nested).unwrap();
        assert_eq!(host.len(), 6);

        assert_eq!(host.reclaim_detached(), 3);
        assert_eq!(host.len(), 3);
        assert!(!host.contains(old) && !host.contains(orphan) && !host.contains(nested));
        assert_eq!(host.inner_html(root), "<p>fresh</p>");
        assert_eq!(host.remove_child(kept, old), Err(HostError::Missing { id: old }));

        let reused = host.create_element("span");
        assert!([old, orphan, nested].contains(&reused));
        host.append_child(root, reused).unwrap();
        assert_eq!(host.inner_html(root), "<p>fresh</p><span></span>");
        assert_eq!(host.reclaim_detached(), 0);
    }

    #[test]
    fn observer_sees_every_mutation() {
        let mut host = MemoryHost::new();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        host.set_observer(move |_| seen_clone.set(seen_clone.get() + 1));
        let root = host.create_container("root");
        let p = host.create_element("p");
        host.append_child(root, p).unwrap();
        assert_eq!(seen.get(), 2);
        assert_eq!(host.take_ops().len(), 2);
        assert!(host.ops().is_empty());
    }
}
