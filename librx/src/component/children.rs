//! Ordered, named child containers
//!
//! A component's children are a list of named entries. Each entry is
//! either a node or a nested group of further entries, so the tree can be
//! walked and addressed by dot-separated paths without inspecting shapes.

use std::sync::Arc;

use super::Node;
use crate::store::StoreModel;

pub enum Child<M: StoreModel> {
    Node(Arc<dyn Node<M>>),
    Group(Children<M>),
}

impl<M: StoreModel> Clone for Child<M> {
    fn clone(&self) -> Self {
        match self {
            Child::Node(node) => Child::Node(Arc::clone(node)),
            Child::Group(group) => Child::Group(group.clone()),
        }
    }
}

impl<M: StoreModel> Child<M> {
    pub fn as_node(&self) -> Option<&Arc<dyn Node<M>>> {
        match self {
            Child::Node(node) => Some(node),
            Child::Group(_) => None,
        }
    }

    /// Nodes reachable without descending into another node
    pub fn nodes(&self) -> Vec<Arc<dyn Node<M>>> {
        match self {
            Child::Node(node) => vec![Arc::clone(node)],
            Child::Group(group) => group.nodes(),
        }
    }
}

pub struct Children<M: StoreModel> {
    entries: Vec<(String, Child<M>)>,
}

impl<M: StoreModel> Clone for Children<M> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<M: StoreModel> Default for Children<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: StoreModel> Children<M> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Child<M>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, child)| child)
    }

    /// Add or replace the entry `name`.
    pub fn set(&mut self, name: impl Into<String>, child: Child<M>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(entry, _)| *entry == name) {
            Some((_, existing)) => *existing = child,
            None => self.entries.push((name, child)),
        }
    }

    pub fn push_node(&mut self, name: impl Into<String>, node: Arc<dyn Node<M>>) {
        self.set(name, Child::Node(node));
    }

    pub fn push_group(&mut self, name: impl Into<String>, group: Children<M>) {
        self.set(name, Child::Group(group));
    }

    /// Place `node` at a dot-separated path, creating groups for the
    /// leading segments. A node already sitting on an intermediate segment
    /// is replaced by a group.
    pub fn insert_path(&mut self, path: &str, node: Arc<dyn Node<M>>) {
        match path.split_once('.') {
            None => self.push_node(path, node),
            Some((head, rest)) => {
                let mut group = match self.get(head) {
                    Some(Child::Group(group)) => group.clone(),
                    _ => Children::new(),
                };
                group.insert_path(rest, node);
                self.push_group(head, group);
            }
        }
    }

    /// Resolve a dot-separated path.
    ///
    /// Groups are entered by name; when a segment names a node, the next
    /// segment is looked up among that node's own children. An empty path
    /// returns the whole container as a group.
    pub fn lookup(&self, path: &str) -> Option<Child<M>> {
        if path.is_empty() {
            return Some(Child::Group(self.clone()));
        }

        let mut current = Child::Group(self.clone());
        for segment in path.split('.') {
            let next = match &current {
                Child::Group(group) => group.get(segment).cloned(),
                Child::Node(node) => node.children().get(segment).cloned(),
            };
            current = next?;
        }
        Some(current)
    }

    /// Every node in this container, flattening nested groups but not
    /// descending into nodes.
    pub fn nodes(&self) -> Vec<Arc<dyn Node<M>>> {
        self.entries
            .iter()
            .flat_map(|(_, child)| child.nodes())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
