use super::{Component, ComponentId};
use std::collections::HashMap;

/// Immutable tree of components, stored as an arena.
///
/// Built once per task by [`ComponentTreeBuilder`](super::ComponentTreeBuilder);
/// every accessor is read-only.
#[derive(Debug, Clone)]
pub struct ComponentTree {
    nodes: Vec<Component>,
    parents: Vec<Option<ComponentId>>,
    root: ComponentId,
    by_ref: HashMap<u32, ComponentId>,
    by_uuid: HashMap<String, ComponentId>,
}

impl ComponentTree {
    pub(crate) fn from_parts(
        nodes: Vec<Component>,
        parents: Vec<Option<ComponentId>>,
        root: ComponentId,
    ) -> Self {
        let by_ref = nodes.iter().map(|c| (c.reference, c.id)).collect();
        let by_uuid = nodes.iter().map(|c| (c.uuid.clone(), c.id)).collect();
        Self {
            nodes,
            parents,
            root,
            by_ref,
            by_uuid,
        }
    }

    pub fn root(&self) -> &Component {
        self.get(self.root)
    }

    pub fn get(&self, id: ComponentId) -> &Component {
        &self.nodes[id.0]
    }

    pub fn get_by_ref(&self, reference: u32) -> Option<&Component> {
        self.by_ref.get(&reference).map(|id| self.get(*id))
    }

    pub fn get_by_uuid(&self, uuid: &str) -> Option<&Component> {
        self.by_uuid.get(uuid).map(|id| self.get(*id))
    }

    pub fn parent(&self, component: &Component) -> Option<&Component> {
        self.parents[component.id.0].map(|id| self.get(id))
    }

    pub fn children<'a>(&'a self, component: &'a Component) -> impl Iterator<Item = &'a Component> {
        component.children.iter().map(move |id| self.get(*id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parents before children, children in declaration order.
    pub fn pre_order(&self) -> Vec<&Component> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let component = self.get(id);
            out.push(component);
            stack.extend(component.children.iter().rev().copied());
        }
        out
    }

    /// Children before parents, children in declaration order.
    pub fn post_order(&self) -> Vec<&Component> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            let component = self.get(id);
            if expanded {
                out.push(component);
            } else {
                stack.push((id, true));
                stack.extend(component.children.iter().rev().map(|child| (*child, false)));
            }
        }
        out
    }

    pub fn files(&self) -> impl Iterator<Item = &Component> {
        self.nodes.iter().filter(|c| c.is_file())
    }
}
