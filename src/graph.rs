//! Dependency graph between parameters and functions.
//!
//! Nodes are keyed by [`NodeId`] and carry the names they read. A dependency name may be
//! dangling (its node was deleted); it is re-linked as soon as a node with that name
//! appears again. Each node also keeps the exact inverse edge set (`dependents`), which
//! [`DependencyGraph::assert_consistent`] checks.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::errors::CycleError;
use crate::types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub id: NodeId,
    pub name: String,
    /// Names this node reads
    pub dependencies: BTreeSet<String>,
    /// Nodes that read this node's name
    pub dependents: BTreeSet<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<NodeId, DependencyNode>,
    ids: BTreeMap<String, NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(&id)
    }

    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    fn name_of(&self, id: NodeId) -> String {
        self.nodes
            .get(&id)
            .map(|node| node.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Adds a node, or replaces the name and dependencies of an existing one.
    ///
    /// Names must be unique across nodes. No cycle check happens here; see
    /// [`check_update`](Self::check_update). Debug builds verify the edge invariant after
    /// every mutation.
    pub fn add_node<I, S>(&mut self, id: NodeId, name: impl Into<String>, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let dependencies: BTreeSet<String> = dependencies.into_iter().map(Into::into).collect();

        if let Some(old) = self.nodes.remove(&id) {
            self.unlink(id, &old.dependencies);
            self.ids.remove(&old.name);
        }
        let mut dependents: BTreeSet<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.dependencies.contains(&name))
            .map(|node| node.id)
            .collect();

        for dep in &dependencies {
            if let Some(target) = self.ids.get(dep).copied() {
                if let Some(target) = self.nodes.get_mut(&target) {
                    target.dependents.insert(id);
                }
            }
        }
        // a node reading its own name is its own dependent
        if dependencies.contains(&name) {
            dependents.insert(id);
        }

        self.ids.insert(name.clone(), id);
        self.nodes.insert(
            id,
            DependencyNode {
                id,
                name,
                dependencies,
                dependents,
            },
        );
        debug_assert_eq!(self.assert_consistent(), Ok(()));
    }

    /// Replaces the dependencies of an existing node; returns `false` if it is unknown.
    pub fn set_dependencies<I, S>(&mut self, id: NodeId, dependencies: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(name) = self.nodes.get(&id).map(|node| node.name.clone()) else {
            return false;
        };
        self.add_node(id, name, dependencies);
        true
    }

    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> bool {
        let Some(dependencies) = self.nodes.get(&id).map(|node| node.dependencies.clone()) else {
            return false;
        };
        self.add_node(id, name, dependencies);
        true
    }

    /// Removes a node. Nodes reading its name keep a dangling dependency.
    pub fn remove_node(&mut self, id: NodeId) -> Option<DependencyNode> {
        let node = self.nodes.remove(&id)?;
        self.ids.remove(&node.name);
        self.unlink(id, &node.dependencies);
        debug_assert_eq!(self.assert_consistent(), Ok(()));
        Some(node)
    }

    fn unlink(&mut self, id: NodeId, dependencies: &BTreeSet<String>) {
        for dep in dependencies {
            if let Some(target) = self.ids.get(dep).copied() {
                if let Some(target) = self.nodes.get_mut(&target) {
                    target.dependents.remove(&id);
                }
            }
        }
    }

    /// Dependencies of `id` that resolve to nodes, in name order.
    fn resolved_dependencies(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|node| {
                node.dependencies
                    .iter()
                    .filter_map(|dep| self.ids.get(dep).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Post-order three-colour DFS from `roots`; the first grey edge is reported as a cycle.
    fn walk<I>(&self, roots: I) -> Result<Vec<NodeId>, CycleError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut colour: BTreeMap<NodeId, Colour> =
            self.nodes.keys().map(|id| (*id, Colour::White)).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        for root in roots {
            if colour.get(&root) != Some(&Colour::White) {
                continue;
            }
            colour.insert(root, Colour::Grey);
            let mut pending = self.resolved_dependencies(root);
            pending.reverse();
            let mut stack = vec![(root, pending)];

            while let Some((node, pending)) = stack.last_mut() {
                match pending.pop() {
                    Some(next) => match colour.get(&next).copied().unwrap_or(Colour::Black) {
                        Colour::White => {
                            colour.insert(next, Colour::Grey);
                            let mut pending = self.resolved_dependencies(next);
                            pending.reverse();
                            stack.push((next, pending));
                        }
                        Colour::Grey => {
                            let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                            let mut path: Vec<String> =
                                stack[start..].iter().map(|(n, _)| self.name_of(*n)).collect();
                            path.push(self.name_of(next));
                            return Err(CycleError { path });
                        }
                        Colour::Black => {}
                    },
                    None => {
                        let done = *node;
                        colour.insert(done, Colour::Black);
                        order.push(done);
                        stack.pop();
                    }
                }
            }
        }
        Ok(order)
    }

    /// All nodes, every node after the nodes it depends on.
    pub fn evaluation_order(&self) -> Result<Vec<NodeId>, CycleError> {
        self.walk(self.nodes.keys().copied())
    }

    /// The first cycle found, as a path whose first name is repeated at the end.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        self.evaluation_order().err().map(|err| err.path)
    }

    /// Checks on a scratch copy that giving `id` these dependencies keeps the graph acyclic.
    pub fn check_update<I, S>(
        &self,
        id: NodeId,
        name: impl Into<String>,
        dependencies: I,
    ) -> Result<(), CycleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scratch = self.clone();
        scratch.add_node(id, name, dependencies);
        let roots = std::iter::once(id).chain(scratch.nodes.keys().copied());
        scratch.walk(roots).map(|_| ())
    }

    /// Every node that transitively reads `id`, excluding `id` itself.
    pub fn all_dependents(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.closure(id, |node| {
            self.nodes
                .get(&node)
                .map(|n| n.dependents.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Every node `id` transitively reads, excluding `id` itself.
    pub fn all_dependencies(&self, id: NodeId) -> BTreeSet<NodeId> {
        self.closure(id, |node| self.resolved_dependencies(node))
    }

    fn closure<F>(&self, id: NodeId, next: F) -> BTreeSet<NodeId>
    where
        F: Fn(NodeId) -> Vec<NodeId>,
    {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = next(id).into();
        while let Some(node) = queue.pop_front() {
            if node != id && visited.insert(node) {
                queue.extend(next(node));
            }
        }
        visited
    }

    /// Verifies that `dependents` is exactly the inverse of the resolved dependencies.
    pub fn assert_consistent(&self) -> Result<(), String> {
        for (name, id) in &self.ids {
            match self.nodes.get(id) {
                Some(node) if node.name == *name => {}
                _ => return Err(format!("name index entry '{}' is stale", name)),
            }
        }
        for node in self.nodes.values() {
            if self.ids.get(&node.name) != Some(&node.id) {
                return Err(format!("node '{}' is missing from the name index", node.name));
            }
            for target in self.resolved_dependencies(node.id) {
                let linked = self
                    .nodes
                    .get(&target)
                    .is_some_and(|t| t.dependents.contains(&node.id));
                if !linked {
                    return Err(format!(
                        "'{}' reads '{}' but is not among its dependents",
                        node.name,
                        self.name_of(target)
                    ));
                }
            }
            for dependent in &node.dependents {
                let reads = self
                    .nodes
                    .get(dependent)
                    .is_some_and(|d| d.dependencies.contains(&node.name));
                if !reads {
                    return Err(format!(
                        "'{}' lists {} as a dependent that does not read it",
                        node.name, dependent
                    ));
                }
            }
        }
        Ok(())
    }
}
