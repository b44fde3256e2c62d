//! Replays a finished cycle against the host.
//!
//! Deletions go first, with every effect teardown in the removed subtree
//! running before its host nodes are detached. The effect chain is then
//! walked in order: structural change, attribute sync, layout effects.
//! Passive effects are handed back to the caller to run in one macrotask.

use crate::fiber::{EffectTag, FiberId, FiberKind, FiberTree};
use crate::hooks::{run_effect, HookKind};
use crate::host::{Host, HostId};
use crate::props::{listener_event, PropValue, Props, CHILDREN_KEY, REF_KEY, TEXT_VALUE_KEY};
use crate::reconciler::Reconciler;
use crate::FiberError;

pub(crate) type PassiveEffect = Box<dyn FnOnce() + 'static>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommittedEffect {
    pub fiber: FiberId,
    pub label: String,
    pub tag: EffectTag,
}

/// What one commit did, in the order it did it.
#[derive(Clone, Debug, Default)]
pub struct CommitSummary {
    entries: Vec<CommittedEffect>,
}

impl CommitSummary {
    pub fn entries(&self) -> &[CommittedEffect] {
        &self.entries
    }

    pub fn count(&self, tag: EffectTag) -> usize {
        self.entries.iter().filter(|entry| entry.tag == tag).count()
    }

    pub fn labels(&self, tag: EffectTag) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.tag == tag)
            .map(|entry| entry.label.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Committer<'t, 'h> {
    tree: &'t mut FiberTree,
    host: &'h mut dyn Host,
    summary: CommitSummary,
    passive: Vec<PassiveEffect>,
}

impl Committer<'_, '_> {
    fn record(&mut self, fiber: FiberId, tag: EffectTag) {
        let label = self.tree.describe(fiber);
        self.summary.entries.push(CommittedEffect { fiber, label, tag });
    }

    fn commit(&mut self, deletions: &[FiberId], chain: &[FiberId]) -> Result<(), FiberError> {
        for &id in deletions {
            if self.tree.has_deleted_ancestor(id) {
                continue;
            }
            self.commit_deletion(id)?;
        }
        for &id in chain {
            self.commit_work(id)?;
        }
        Ok(())
    }

    fn commit_deletion(&mut self, id: FiberId) -> Result<(), FiberError> {
        for fiber in self.tree.post_order(id) {
            self.unmount_fiber(fiber)?;
        }
        let (_, parent) = self.tree.nearest_host_ancestor(id)?;
        for node in self.tree.host_roots(id) {
            self.host.remove_child(parent, node)?;
        }
        self.record(id, EffectTag::Delete);
        Ok(())
    }

    fn unmount_fiber(&mut self, id: FiberId) -> Result<(), FiberError> {
        let fiber = self.tree.fiber(id)?;
        for hook in &fiber.hooks {
            if let Some(effect) = hook.effect() {
                effect.run_teardown();
            }
        }
        if let (FiberKind::Host(_), Some(PropValue::Ref(target))) =
            (&fiber.kind, fiber.props.get(REF_KEY))
        {
            target.set(None);
        }
        Ok(())
    }

    fn commit_work(&mut self, id: FiberId) -> Result<(), FiberError> {
        let fiber = self.tree.fiber(id)?;
        let tag = fiber.effect;
        let kind = fiber.kind.clone();
        match (tag, &kind) {
            (EffectTag::Insert, _) => self.commit_placement(id)?,
            (EffectTag::Update, FiberKind::Text) => self.commit_text_update(id)?,
            _ => {}
        }
        match kind {
            FiberKind::Host(_) => self.sync_props(id)?,
            FiberKind::Component(_) => self.commit_hooks(id)?,
            FiberKind::Root | FiberKind::Text => {}
        }
        self.record(id, tag);
        Ok(())
    }

    fn commit_placement(&mut self, id: FiberId) -> Result<(), FiberError> {
        let Some(node) = self.tree.fiber(id)?.host else {
            return Ok(());
        };
        let (_, parent) = self.tree.nearest_host_ancestor(id)?;
        self.host.append_child(parent, node)?;
        Ok(())
    }

    /// Text nodes are immutable: a changed value swaps in a fresh node.
    fn commit_text_update(&mut self, id: FiberId) -> Result<(), FiberError> {
        let fiber = self.tree.fiber(id)?;
        let value = fiber.props.text(TEXT_VALUE_KEY).unwrap_or("").to_owned();
        let previous = fiber
            .mirror
            .and_then(|mirror| self.tree.get(mirror))
            .and_then(|mirror| mirror.props.text(TEXT_VALUE_KEY));
        if previous == Some(value.as_str()) {
            return Ok(());
        }
        let old = fiber.host;
        let (_, parent) = self.tree.nearest_host_ancestor(id)?;
        let node = self.host.create_text(&value);
        match old {
            Some(old) => self.host.replace_child(parent, node, old)?,
            None => self.host.append_child(parent, node)?,
        }
        self.tree.fiber_mut(id)?.host = Some(node);
        Ok(())
    }

    fn sync_props(&mut self, id: FiberId) -> Result<(), FiberError> {
        let fiber = self.tree.fiber(id)?;
        let Some(node) = fiber.host else {
            return Ok(());
        };
        let next = fiber.props.clone();
        let previous = fiber
            .mirror
            .and_then(|mirror| self.tree.get(mirror))
            .map(|mirror| mirror.props.clone())
            .unwrap_or_default();
        update_host_props(&mut *self.host, node, &previous, &next)
    }

    fn commit_hooks(&mut self, id: FiberId) -> Result<(), FiberError> {
        let mut layout = Vec::new();
        for hook in self.tree.fiber_mut(id)?.hooks.iter_mut() {
            let Some((kind, effect)) = hook.effect_mut() else {
                continue;
            };
            let Some((cell, setup)) = effect.take_pending() else {
                continue;
            };
            match kind {
                HookKind::Effect => self.passive.push(Box::new(move || run_effect(&cell, setup))),
                _ => layout.push((cell, setup)),
            }
        }
        for (cell, setup) in layout {
            run_effect(&cell, setup);
        }
        Ok(())
    }
}

fn event_name(key: &str) -> String {
    listener_event(key).unwrap_or_else(|| key.to_ascii_lowercase())
}

fn unbind(host: &mut dyn Host, node: HostId, key: &str, value: &PropValue) -> Result<(), FiberError> {
    match value {
        PropValue::Listener(handler) => host.remove_event_listener(node, &event_name(key), handler)?,
        PropValue::Ref(target) => target.set(None),
        other => {
            if other.to_attribute().is_some() {
                host.remove_attribute(node, key)?;
            }
        }
    }
    Ok(())
}

/// Brings the attributes, listeners and refs of `node` from `previous` to
/// `next`.
pub(crate) fn update_host_props(
    host: &mut dyn Host,
    node: HostId,
    previous: &Props,
    next: &Props,
) -> Result<(), FiberError> {
    for (key, value) in previous.iter() {
        if key == CHILDREN_KEY || next.contains_key(key) {
            continue;
        }
        unbind(host, node, key, value)?;
    }

    for (key, value) in next.iter() {
        if key == CHILDREN_KEY {
            continue;
        }
        let prior = previous.get(key);
        if prior.is_some_and(|prior| prior.same(value)) {
            continue;
        }
        let serialized = value.to_attribute();
        if let Some(prior) = prior {
            // An attribute overwritten in place needs no removal.
            if serialized.is_none() || prior.to_attribute().is_none() {
                unbind(host, node, key, prior)?;
            }
        }
        match value {
            PropValue::Listener(handler) => {
                host.add_event_listener(node, &event_name(key), handler.clone())?
            }
            PropValue::Ref(target) => target.set(Some(node)),
            _ => {
                if let Some(serialized) = serialized {
                    host.set_attribute(node, key, &serialized)?;
                }
            }
        }
    }
    Ok(())
}

/// Commits the finished work-in-progress generation of `reconciler`.
///
/// On success the generation becomes current and the passive effects it
/// scheduled are returned; on failure the cycle is discarded.
pub(crate) fn commit_root(
    reconciler: &mut Reconciler,
    host: &mut dyn Host,
) -> Result<(CommitSummary, Vec<PassiveEffect>), FiberError> {
    if reconciler.work_in_progress().is_none() {
        return Ok((CommitSummary::default(), Vec::new()));
    }
    let deletions = reconciler.take_deletions();
    let chain = reconciler.effect_chain();
    let mut committer = Committer {
        tree: reconciler.tree_mut(),
        host,
        summary: CommitSummary::default(),
        passive: Vec::new(),
    };
    match committer.commit(&deletions, &chain) {
        Ok(()) => {
            let Committer {
                summary, passive, ..
            } = committer;
            reconciler.finish_commit();
            log::debug!(
                "committed {} effects ({} inserts, {} updates, {} deletions)",
                summary.len(),
                summary.count(EffectTag::Insert),
                summary.count(EffectTag::Update),
                summary.count(EffectTag::Delete)
            );
            Ok((summary, passive))
        }
        Err(err) => {
            reconciler.restore_deletions(deletions);
            reconciler.abort();
            Err(err)
        }
    }
}
