//! The migration dependency graph.
//!
//! [`MigrationGraph`] is an arena of nodes keyed by [`MigrationKey`]. Each
//! node keeps its parents (migrations it depends on) and children
//! (migrations depending on it) as maps from key to [`EdgeKind`], so replace
//! and repoint operations are plain map edits.
//!
//! Edges can be added before both endpoints exist. A provisional edge to a
//! missing node creates a placeholder that remembers which migration asked
//! for it; [`MigrationGraph::validate_consistency`] reports any placeholder
//! still present once construction is done.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::MigrationError;
use crate::migration::{Migration, MigrationKey};
use crate::state::ProjectState;

/// How an edge was validated when it was added.
///
/// A confirmed edge never touches a placeholder: an edge linked to a
/// placeholder is stored as provisional whatever kind it was added with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Both endpoints existed when the edge was added.
    Confirmed,
    /// Validation was deferred to [`MigrationGraph::validate_consistency`].
    Provisional,
}

#[derive(Debug, Default)]
struct Node {
    /// `None` for a placeholder.
    migration: Option<Arc<Migration>>,
    /// For placeholders, the migration whose dependency created it.
    origin: Option<MigrationKey>,
    parents: BTreeMap<MigrationKey, EdgeKind>,
    children: BTreeMap<MigrationKey, EdgeKind>,
}

impl Node {
    const fn is_placeholder(&self) -> bool {
        self.migration.is_none()
    }
}

/// Directed graph of migrations; an edge runs from a dependency (parent) to
/// its dependent (child).
#[derive(Debug, Default)]
pub struct MigrationGraph {
    nodes: BTreeMap<MigrationKey, Node>,
}

impl MigrationGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a migration node.
    ///
    /// A placeholder already standing in for `key` is upgraded in place and
    /// keeps its edges.
    pub fn add_node(
        &mut self,
        key: MigrationKey,
        migration: Arc<Migration>,
    ) -> Result<(), MigrationError> {
        let node = self.nodes.entry(key.clone()).or_default();
        if !node.is_placeholder() {
            return Err(MigrationError::DuplicateNode(key));
        }
        node.migration = Some(migration);
        node.origin = None;
        Ok(())
    }

    fn add_placeholder(&mut self, key: &MigrationKey, origin: &MigrationKey) {
        self.nodes.entry(key.clone()).or_insert_with(|| Node {
            origin: Some(origin.clone()),
            ..Node::default()
        });
    }

    fn link(&mut self, parent: &MigrationKey, child: &MigrationKey, kind: EdgeKind) {
        let touches_placeholder = [parent, child]
            .into_iter()
            .any(|k| self.nodes.get(k).is_some_and(Node::is_placeholder));
        let kind = if touches_placeholder {
            EdgeKind::Provisional
        } else {
            kind
        };
        if let Some(node) = self.nodes.get_mut(child) {
            node.parents.entry(parent.clone()).or_insert(kind);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.entry(child.clone()).or_insert(kind);
        }
    }

    /// Records that `child` depends on `parent`.
    ///
    /// `origin` is the migration whose declaration produced the edge. A
    /// [`EdgeKind::Confirmed`] edge requires both endpoints to exist; a
    /// [`EdgeKind::Provisional`] one creates placeholders for missing ends.
    pub fn add_dependency(
        &mut self,
        origin: &MigrationKey,
        child: MigrationKey,
        parent: MigrationKey,
        kind: EdgeKind,
    ) -> Result<(), MigrationError> {
        for end in [&child, &parent] {
            if !self.contains(end) {
                match kind {
                    EdgeKind::Confirmed => {
                        return Err(MigrationError::node_not_found(
                            end.clone(),
                            Some(origin.clone()),
                        ))
                    }
                    EdgeKind::Provisional => self.add_placeholder(end, origin),
                }
            }
        }
        self.link(&parent, &child, kind);
        Ok(())
    }

    /// Substitutes `replacement` for every node in `replaced`.
    ///
    /// Replaced nodes are removed and their edges repointed onto the
    /// replacement, except edges between two replaced nodes.
    pub fn remove_replaced_nodes(
        &mut self,
        replacement: &MigrationKey,
        replaced: &[MigrationKey],
    ) -> Result<(), MigrationError> {
        if !self.contains(replacement) {
            return Err(MigrationError::NodeNotFound {
                message: format!(
                    "Unable to find replacement node {replacement}. It was either never \
                     added to the migration graph, or has been removed."
                ),
                node: replacement.clone(),
                origin: None,
            });
        }
        let skip = |key: &MigrationKey| replaced.contains(key) || key == replacement;
        for key in replaced {
            let Some(node) = self.nodes.remove(key) else {
                continue;
            };
            for (child, kind) in node.children {
                if let Some(c) = self.nodes.get_mut(&child) {
                    c.parents.remove(key);
                }
                if !skip(&child) {
                    self.link(replacement, &child, kind);
                }
            }
            for (parent, kind) in node.parents {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.remove(key);
                }
                if !skip(&parent) {
                    self.link(&parent, replacement, kind);
                }
            }
        }
        Ok(())
    }

    /// Removes `replacement` and hands its dependents back to the replaced
    /// nodes.
    ///
    /// Children of the replacement are repointed onto the latest replaced
    /// nodes only: those that are not a parent of another replaced node.
    /// Parent edges are dropped, the replaced nodes already carry the right
    /// ancestry.
    pub fn remove_replacement_node(
        &mut self,
        replacement: &MigrationKey,
        replaced: &[MigrationKey],
    ) -> Result<(), MigrationError> {
        let node = match self.nodes.remove(replacement) {
            Some(node) if !node.is_placeholder() => node,
            _ => {
                return Err(MigrationError::NodeNotFound {
                    message: format!(
                        "Unable to remove replacement node {replacement}. It was either never \
                         added to the migration graph, or has been removed already."
                    ),
                    node: replacement.clone(),
                    origin: None,
                })
            }
        };

        let mut latest: BTreeSet<&MigrationKey> = BTreeSet::new();
        let mut ancestors: HashSet<&MigrationKey> = HashSet::new();
        for key in replaced {
            if let Some(n) = self.nodes.get(key) {
                latest.insert(key);
                ancestors.extend(n.parents.keys());
            }
        }
        let latest: Vec<MigrationKey> = latest
            .into_iter()
            .filter(|k| !ancestors.contains(k))
            .cloned()
            .collect();

        for (child, kind) in node.children {
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parents.remove(replacement);
            }
            for target in &latest {
                self.link(target, &child, kind);
            }
        }
        for parent in node.parents.keys() {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.remove(replacement);
            }
        }
        Ok(())
    }

    /// Fails with the first (in key order) dangling reference.
    pub fn validate_consistency(&self) -> Result<(), MigrationError> {
        debug_assert!(
            self.nodes.iter().all(|(_, n)| {
                !n.is_placeholder()
                    || n.parents
                        .values()
                        .chain(n.children.values())
                        .all(|kind| *kind == EdgeKind::Provisional)
            }),
            "confirmed edge attached to a placeholder"
        );
        match self.nodes.iter().find(|(_, n)| n.is_placeholder()) {
            Some((key, node)) => Err(MigrationError::node_not_found(
                key.clone(),
                node.origin.clone(),
            )),
            None => Ok(()),
        }
    }

    /// Fails with the first cycle found, listed in traversal order.
    pub fn ensure_not_cyclic(&self) -> Result<(), MigrationError> {
        let mut todo: BTreeSet<&MigrationKey> = self.nodes.keys().collect();
        while let Some(start) = todo.pop_first() {
            let mut stack = vec![start];
            while let Some(&top) = stack.last() {
                let mut descended = false;
                for child in self.nodes.get(top).into_iter().flat_map(|n| n.children.keys()) {
                    if let Some(pos) = stack.iter().position(|k| *k == child) {
                        return Err(MigrationError::CircularDependency(
                            stack[pos..].iter().map(|k| (*k).clone()).collect(),
                        ));
                    }
                    if todo.remove(child) {
                        stack.push(child);
                        descended = true;
                        break;
                    }
                }
                if !descended {
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Depth-first post-order walk over parents (`forwards`) or children.
    ///
    /// Neighbours are pushed in sorted order so the result is stable.
    fn iterative_dfs(&self, start: &MigrationKey, forwards: bool) -> Vec<MigrationKey> {
        let mut visited = Vec::new();
        let mut seen: HashSet<MigrationKey> = HashSet::new();
        let mut stack = vec![(start.clone(), false)];
        while let Some((key, processed)) = stack.pop() {
            if seen.contains(&key) {
                continue;
            }
            if processed {
                seen.insert(key.clone());
                visited.push(key);
                continue;
            }
            let next: Vec<MigrationKey> = self
                .nodes
                .get(&key)
                .map(|n| {
                    let edges = if forwards { &n.parents } else { &n.children };
                    edges.keys().cloned().collect()
                })
                .unwrap_or_default();
            stack.push((key, true));
            stack.extend(next.into_iter().map(|k| (k, false)));
        }
        visited
    }

    /// Returns the migrations to apply, in order, to reach `target`
    /// (including `target` itself).
    pub fn forwards_plan(&self, target: &MigrationKey) -> Result<Vec<MigrationKey>, MigrationError> {
        if !self.contains(target) {
            return Err(MigrationError::node_not_found(target.clone(), None));
        }
        Ok(self.iterative_dfs(target, true))
    }

    /// Returns the migrations to unapply, in order, to remove `target`
    /// (including `target` itself).
    pub fn backwards_plan(
        &self,
        target: &MigrationKey,
    ) -> Result<Vec<MigrationKey>, MigrationError> {
        if !self.contains(target) {
            return Err(MigrationError::node_not_found(target.clone(), None));
        }
        Ok(self.iterative_dfs(target, false))
    }

    /// Returns nodes with no parent in their own app, sorted.
    ///
    /// With `app_label`, only that app's nodes are considered.
    pub fn root_nodes(&self, app_label: Option<&str>) -> Vec<MigrationKey> {
        self.real_nodes()
            .filter(|(key, _)| app_label.map_or(true, |app| key.app_label == app))
            .filter(|(key, node)| node.parents.keys().all(|p| p.app_label != key.app_label))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns nodes with no child in their own app, sorted.
    ///
    /// With `app_label`, only that app's nodes are considered.
    pub fn leaf_nodes(&self, app_label: Option<&str>) -> Vec<MigrationKey> {
        self.real_nodes()
            .filter(|(key, _)| app_label.map_or(true, |app| key.app_label == app))
            .filter(|(key, node)| node.children.keys().all(|c| c.app_label != key.app_label))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Replays migrations into a [`ProjectState`].
    ///
    /// The plan is the union of each node's forwards plan, in order; with
    /// `at_end == false` the given nodes themselves are left out. `None`
    /// means every leaf of the graph.
    pub fn make_state(
        &self,
        nodes: Option<&[MigrationKey]>,
        at_end: bool,
        real_apps: &BTreeSet<String>,
    ) -> Result<ProjectState, MigrationError> {
        let leaves;
        let nodes = match nodes {
            Some(nodes) => nodes,
            None => {
                leaves = self.leaf_nodes(None);
                &leaves
            }
        };
        let mut state = ProjectState::with_real_apps(real_apps.iter().cloned());
        let mut planned: HashSet<MigrationKey> = HashSet::new();
        for node in nodes {
            for key in self.forwards_plan(node)? {
                if (at_end || !nodes.contains(&key)) && planned.insert(key.clone()) {
                    if let Some(migration) = self.node(&key) {
                        migration.mutate_state(&mut state);
                    }
                }
            }
        }
        Ok(state)
    }

    fn real_nodes(&self) -> impl Iterator<Item = (&MigrationKey, &Node)> {
        self.nodes.iter().filter(|(_, n)| !n.is_placeholder())
    }

    /// Returns `true` if `key` is a migration node (not a placeholder).
    pub fn contains(&self, key: &MigrationKey) -> bool {
        self.nodes.get(key).is_some_and(|n| !n.is_placeholder())
    }

    /// Returns the migration stored at `key`.
    pub fn node(&self, key: &MigrationKey) -> Option<&Arc<Migration>> {
        self.nodes.get(key).and_then(|n| n.migration.as_ref())
    }

    /// Returns the parents of `key`, sorted.
    pub fn parents(&self, key: &MigrationKey) -> Vec<MigrationKey> {
        self.nodes
            .get(key)
            .map(|n| n.parents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the children of `key`, sorted.
    pub fn children(&self, key: &MigrationKey) -> Vec<MigrationKey> {
        self.nodes
            .get(key)
            .map(|n| n.children.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns how the edge from `parent` to `child` was validated.
    pub fn edge_kind(&self, parent: &MigrationKey, child: &MigrationKey) -> Option<EdgeKind> {
        self.nodes
            .get(parent)
            .and_then(|n| n.children.get(child))
            .copied()
    }

    /// Returns every migration node key, sorted.
    pub fn node_keys(&self) -> Vec<MigrationKey> {
        self.real_nodes().map(|(k, _)| k.clone()).collect()
    }

    /// Returns every edge as `(parent, child)`, sorted.
    pub fn edges(&self) -> Vec<(MigrationKey, MigrationKey)> {
        self.nodes
            .iter()
            .flat_map(|(parent, n)| {
                n.children
                    .keys()
                    .map(move |child| (parent.clone(), child.clone()))
            })
            .collect()
    }

    /// Returns the number of migration nodes.
    pub fn len(&self) -> usize {
        self.real_nodes().count()
    }

    /// Returns `true` if the graph has no migration nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for MigrationGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges: usize = self.nodes.values().map(|n| n.parents.len()).sum();
        write!(f, "Graph: {} nodes, {} edges", self.len(), edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::CreateModel;
    use crate::state::FieldDef;

    fn key(app: &str, name: &str) -> MigrationKey {
        MigrationKey::new(app, name)
    }

    fn add(graph: &mut MigrationGraph, app: &str, name: &str) {
        graph
            .add_node(key(app, name), Arc::new(Migration::new(app, name)))
            .unwrap();
    }

    fn dep(graph: &mut MigrationGraph, child: (&str, &str), parent: (&str, &str)) {
        let child = MigrationKey::from(child);
        graph
            .add_dependency(&child, child.clone(), parent.into(), EdgeKind::Confirmed)
            .unwrap();
    }

    /// app_a: 0001 <- 0002 <- 0003 ; app_b: 0001 <- 0002, b.0002 needs a.0002
    fn sample() -> MigrationGraph {
        let mut g = MigrationGraph::new();
        for (app, name) in [
            ("app_a", "0001"),
            ("app_a", "0002"),
            ("app_a", "0003"),
            ("app_b", "0001"),
            ("app_b", "0002"),
        ] {
            add(&mut g, app, name);
        }
        dep(&mut g, ("app_a", "0002"), ("app_a", "0001"));
        dep(&mut g, ("app_a", "0003"), ("app_a", "0002"));
        dep(&mut g, ("app_b", "0002"), ("app_b", "0001"));
        dep(&mut g, ("app_b", "0002"), ("app_a", "0002"));
        g
    }

    #[test]
    fn test_duplicate_node() {
        let mut g = MigrationGraph::new();
        add(&mut g, "a", "0001");
        let err = g
            .add_node(key("a", "0001"), Arc::new(Migration::new("a", "0001")))
            .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateNode(k) if k == key("a", "0001")));
    }

    #[test]
    fn test_confirmed_edge_requires_nodes() {
        let mut g = MigrationGraph::new();
        add(&mut g, "a", "0002");
        let err = g
            .add_dependency(
                &key("a", "0002"),
                key("a", "0002"),
                key("a", "0001"),
                EdgeKind::Confirmed,
            )
            .unwrap_err();
        match err {
            MigrationError::NodeNotFound { node, origin, .. } => {
                assert_eq!(node, key("a", "0001"));
                assert_eq!(origin, Some(key("a", "0002")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_provisional_edge_is_validated_later() {
        let mut g = MigrationGraph::new();
        add(&mut g, "y", "0001");
        g.add_dependency(
            &key("y", "0001"),
            key("y", "0001"),
            key("z", "0005"),
            EdgeKind::Provisional,
        )
        .unwrap();
        assert!(!g.contains(&key("z", "0005")));
        assert_eq!(g.len(), 1);

        let err = g.validate_consistency().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Migration y.0001 dependencies reference nonexistent parent node ('z', '0005')"
        );

        // Adding the node later satisfies the edge.
        add(&mut g, "z", "0005");
        g.validate_consistency().unwrap();
        assert_eq!(g.parents(&key("y", "0001")), vec![key("z", "0005")]);
    }

    #[test]
    fn test_edge_kind_is_recorded() {
        let mut g = sample();
        assert_eq!(
            g.edge_kind(&key("app_a", "0001"), &key("app_a", "0002")),
            Some(EdgeKind::Confirmed)
        );
        assert_eq!(g.edge_kind(&key("app_a", "0002"), &key("app_a", "0001")), None);

        g.add_dependency(
            &key("app_b", "0002"),
            key("app_b", "0002"),
            key("app_c", "0001"),
            EdgeKind::Provisional,
        )
        .unwrap();
        add(&mut g, "app_c", "0001");
        assert_eq!(
            g.edge_kind(&key("app_c", "0001"), &key("app_b", "0002")),
            Some(EdgeKind::Provisional)
        );
    }

    #[test]
    fn test_repoint_onto_placeholder_is_provisional() {
        let mut g = MigrationGraph::new();
        for name in ["0001", "0001_squashed_0002", "0003"] {
            add(&mut g, "app", name);
        }
        add(&mut g, "other", "0001");
        // app.0002 exists only as a placeholder.
        g.add_dependency(
            &key("other", "0001"),
            key("other", "0001"),
            key("app", "0002"),
            EdgeKind::Provisional,
        )
        .unwrap();
        dep(&mut g, ("app", "0003"), ("app", "0001_squashed_0002"));

        g.remove_replacement_node(
            &key("app", "0001_squashed_0002"),
            &[key("app", "0001"), key("app", "0002")],
        )
        .unwrap();

        assert_eq!(
            g.edge_kind(&key("app", "0002"), &key("app", "0003")),
            Some(EdgeKind::Provisional)
        );
        let err = g.validate_consistency().unwrap_err();
        assert!(matches!(err, MigrationError::NodeNotFound { node, .. } if node == key("app", "0002")));
    }

    #[test]
    fn test_root_and_leaf_nodes() {
        let g = sample();
        assert_eq!(g.root_nodes(Some("app_a")), vec![key("app_a", "0001")]);
        // b.0001 is a root; b.0002 has a parent only in another app, so is a
        // root of app_b as well.
        assert_eq!(g.root_nodes(Some("app_b")), vec![key("app_b", "0001")]);
        assert_eq!(g.leaf_nodes(Some("app_a")), vec![key("app_a", "0003")]);
        assert_eq!(
            g.leaf_nodes(None),
            vec![key("app_a", "0003"), key("app_b", "0002")]
        );
        assert!(g.root_nodes(Some("missing")).is_empty());
    }

    #[test]
    fn test_root_ignores_cross_app_parents() {
        let mut g = MigrationGraph::new();
        add(&mut g, "a", "0001");
        add(&mut g, "b", "0001");
        dep(&mut g, ("b", "0001"), ("a", "0001"));
        assert_eq!(g.root_nodes(Some("b")), vec![key("b", "0001")]);
        assert_eq!(g.leaf_nodes(Some("a")), vec![key("a", "0001")]);
    }

    #[test]
    fn test_forwards_plan() {
        let g = sample();
        assert_eq!(
            g.forwards_plan(&key("app_b", "0002")).unwrap(),
            vec![
                key("app_b", "0001"),
                key("app_a", "0001"),
                key("app_a", "0002"),
                key("app_b", "0002"),
            ]
        );
    }

    #[test]
    fn test_backwards_plan() {
        let g = sample();
        assert_eq!(
            g.backwards_plan(&key("app_a", "0002")).unwrap(),
            vec![key("app_b", "0002"), key("app_a", "0003"), key("app_a", "0002")]
        );
    }

    #[test]
    fn test_plan_for_unknown_node() {
        let g = sample();
        let err = g.forwards_plan(&key("app_c", "0001")).unwrap_err();
        assert_eq!(err.to_string(), "Node ('app_c', '0001') not a valid node");
    }

    #[test]
    fn test_ensure_not_cyclic_ok() {
        sample().ensure_not_cyclic().unwrap();
    }

    #[test]
    fn test_ensure_not_cyclic_reports_cycle() {
        let mut g = MigrationGraph::new();
        for name in ["0001", "0002", "0003"] {
            add(&mut g, "app", name);
        }
        dep(&mut g, ("app", "0002"), ("app", "0001"));
        dep(&mut g, ("app", "0003"), ("app", "0002"));
        dep(&mut g, ("app", "0001"), ("app", "0003"));
        let err = g.ensure_not_cyclic().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Circular dependency: app.0001, app.0002, app.0003"
        );
    }

    #[test]
    fn test_remove_replaced_nodes() {
        let mut g = MigrationGraph::new();
        for name in ["0001", "0002", "0003"] {
            add(&mut g, "app", name);
        }
        add(&mut g, "app", "0001_squashed_0002");
        add(&mut g, "other", "0001");
        dep(&mut g, ("app", "0002"), ("app", "0001"));
        dep(&mut g, ("app", "0003"), ("app", "0002"));
        dep(&mut g, ("other", "0001"), ("app", "0001"));

        g.remove_replaced_nodes(
            &key("app", "0001_squashed_0002"),
            &[key("app", "0001"), key("app", "0002")],
        )
        .unwrap();

        assert!(!g.contains(&key("app", "0001")));
        assert!(!g.contains(&key("app", "0002")));
        assert_eq!(
            g.parents(&key("app", "0003")),
            vec![key("app", "0001_squashed_0002")]
        );
        assert_eq!(
            g.children(&key("app", "0001_squashed_0002")),
            vec![key("app", "0003"), key("other", "0001")]
        );
        assert!(g.parents(&key("app", "0001_squashed_0002")).is_empty());
    }

    #[test]
    fn test_remove_replacement_node() {
        let mut g = MigrationGraph::new();
        for name in ["0001", "0002", "0001_squashed_0002", "0003"] {
            add(&mut g, "app", name);
        }
        dep(&mut g, ("app", "0002"), ("app", "0001"));
        dep(&mut g, ("app", "0003"), ("app", "0001_squashed_0002"));

        g.remove_replacement_node(
            &key("app", "0001_squashed_0002"),
            &[key("app", "0001"), key("app", "0002")],
        )
        .unwrap();

        assert!(!g.contains(&key("app", "0001_squashed_0002")));
        // Only the latest replaced node takes over the children.
        assert_eq!(g.parents(&key("app", "0003")), vec![key("app", "0002")]);
        assert_eq!(g.children(&key("app", "0001")), vec![key("app", "0002")]);
    }

    #[test]
    fn test_remove_replacement_missing() {
        let mut g = MigrationGraph::new();
        let err = g
            .remove_replacement_node(&key("app", "0001_squashed"), &[])
            .unwrap_err();
        assert!(matches!(err, MigrationError::NodeNotFound { .. }));
        let err = g
            .remove_replaced_nodes(&key("app", "0001_squashed"), &[])
            .unwrap_err();
        assert!(matches!(err, MigrationError::NodeNotFound { .. }));
    }

    #[test]
    fn test_make_state() {
        let mut g = MigrationGraph::new();
        g.add_node(
            key("blog", "0001"),
            Arc::new(Migration::new("blog", "0001").add_operation(CreateModel::new(
                "Post",
                vec![FieldDef::new("id", "INTEGER").primary_key()],
            ))),
        )
        .unwrap();
        g.add_node(
            key("blog", "0002"),
            Arc::new(Migration::new("blog", "0002").add_operation(CreateModel::new(
                "Tag",
                vec![FieldDef::new("id", "INTEGER").primary_key()],
            ))),
        )
        .unwrap();
        dep(&mut g, ("blog", "0002"), ("blog", "0001"));
        let real_apps: BTreeSet<String> = ["auth".to_string()].into();

        let full = g.make_state(None, true, &real_apps).unwrap();
        assert_eq!(full.models.len(), 2);
        assert!(full.real_apps.contains("auth"));

        let before = g
            .make_state(Some(&[key("blog", "0002")]), false, &real_apps)
            .unwrap();
        assert!(before.model("blog", "post").is_some());
        assert!(before.model("blog", "tag").is_none());

        let empty = MigrationGraph::new()
            .make_state(None, true, &BTreeSet::new())
            .unwrap();
        assert!(empty.models.is_empty());
    }

    #[test]
    fn test_edges_and_display() {
        let g = sample();
        assert_eq!(g.edges().len(), 4);
        assert_eq!(g.edges()[0], (key("app_a", "0001"), key("app_a", "0002")));
        assert_eq!(g.to_string(), "Graph: 5 nodes, 4 edges");
    }
}
