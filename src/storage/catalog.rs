//! Metadata catalog
//!
//! A tree of namespaces whose leaves are datasets. The tree is held in an
//! arena (`Vec<Option<Node>>`) addressed by [`NodeId`]; children keep
//! insertion order. Slots of a removed subtree go to a free list and are
//! handed out again, so a `NodeId` is only meaningful while its node lives.
//!
//! On disk the catalog is a nested JSON document:
//!
//! ```text
//! {"node_name": "db", "children": [
//!     {"node_name": "stock", "children": [
//!         {"node_name": "status", "store_fmt": ["STRUCTURED", "CHAR", "PANEL"]}
//!     ]}
//! ]}
//! ```

use crate::storage::classification::Classification;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::fs;
use crate::storage::request::{validate_rel_path, PATH_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

/// Handle of a node in a [`Catalog`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    classification: Option<Classification>,
}

/// Serialized form of a catalog subtree
///
/// Namespaces carry `children`, datasets carry `store_fmt`; never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_fmt: Option<Classification>,
}

impl TreeNode {
    pub fn namespace(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            node_name: name.into(),
            children: Some(children),
            store_fmt: None,
        }
    }

    pub fn dataset(name: impl Into<String>, classification: Classification) -> Self {
        Self {
            node_name: name.into(),
            children: None,
            store_fmt: Some(classification),
        }
    }
}

/// How [`Catalog::find`] compares node names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
}

impl MatchMode {
    fn matches(self, name: &str, pattern: &str) -> bool {
        match self {
            MatchMode::Exact => name == pattern,
            MatchMode::Contains => name.contains(pattern),
        }
    }
}

/// Tree of namespaces and datasets
#[derive(Debug, Clone)]
pub struct Catalog {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
}

impl Catalog {
    /// Create a catalog holding only an empty root namespace
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Some(Node {
                name: root_name.into(),
                parent: None,
                children: Vec::new(),
                classification: None,
            })],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Rebuild a catalog from its serialized form, breadth first
    pub fn from_tree(tree: &TreeNode) -> StorageResult<Self> {
        if tree.store_fmt.is_some() || tree.children.is_none() {
            return Err(StorageError::Corruption(format!(
                "catalog root {:?} must be a namespace",
                tree.node_name
            )));
        }

        let mut catalog = Self::new(tree.node_name.clone());
        let mut queue = VecDeque::new();
        queue.push_back((tree, catalog.root));

        while let Some((node, id)) = queue.pop_front() {
            for child in node.children.iter().flatten() {
                let child_id = match (&child.children, &child.store_fmt) {
                    (Some(_), None) => catalog.add_child(id, &child.node_name, None)?,
                    (None, Some(class)) => {
                        if !class.validate() {
                            return Err(StorageError::Corruption(format!(
                                "dataset {:?} has invalid classification {}",
                                child.node_name, class
                            )));
                        }
                        catalog.add_child(id, &child.node_name, Some(class.clone()))?
                    }
                    _ => {
                        return Err(StorageError::Corruption(format!(
                            "catalog node {:?} must have exactly one of children or store_fmt",
                            child.node_name
                        )))
                    }
                };
                queue.push_back((child, child_id));
            }
        }
        Ok(catalog)
    }

    /// Serialize the subtree rooted at `id`
    pub fn to_tree(&self, id: NodeId) -> Option<TreeNode> {
        let node = self.node(id)?;
        Some(match &node.classification {
            Some(class) => TreeNode::dataset(node.name.clone(), class.clone()),
            None => TreeNode::namespace(
                node.name.clone(),
                node.children
                    .iter()
                    .filter_map(|child| self.to_tree(*child))
                    .collect(),
            ),
        })
    }

    /// Load the catalog file, or start an empty catalog if there is none
    pub fn load(path: &Path, root_name: &str) -> StorageResult<Self> {
        if !path.exists() {
            tracing::debug!("No catalog at {:?}, starting empty", path);
            return Ok(Self::new(root_name));
        }
        let tree: TreeNode = fs::read_json(path)?;
        let catalog = Self::from_tree(&tree)?;
        tracing::debug!("Loaded catalog with {} datasets", catalog.datasets().len());
        Ok(catalog)
    }

    /// Save the catalog file atomically
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        let tree = self
            .to_tree(self.root)
            .ok_or_else(|| StorageError::Corruption("catalog has no root".to_string()))?;
        fs::write_json(path, &tree)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(|n| n.as_mut())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.name(*c) == Some(name))
    }

    pub fn has_child(&self, parent: NodeId, name: &str) -> bool {
        self.child(parent, name).is_some()
    }

    pub fn classification(&self, id: NodeId) -> Option<&Classification> {
        self.node(id).and_then(|n| n.classification.as_ref())
    }

    /// Datasets are leaves; namespaces are not, even when empty
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.classification(id).is_some()
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }

    /// Add a namespace (`None`) or dataset below `parent`
    ///
    /// A sibling with the same name is replaced and its subtree released.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: &str,
        classification: Option<Classification>,
    ) -> StorageResult<NodeId> {
        if name.is_empty() || name.contains(PATH_SEPARATOR) {
            return Err(StorageError::InvalidParameter(format!(
                "invalid node name: {:?}",
                name
            )));
        }
        if self.node(parent).is_none() || self.is_leaf(parent) {
            return Err(StorageError::InvalidParameter(format!(
                "cannot add {:?} below a dataset or released node",
                name
            )));
        }

        let node = Node {
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
            classification,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };

        let replaced = self.child(parent, name);
        if let Some(old) = replaced {
            self.release(old);
        }
        if let Some(node) = self.node_mut(parent) {
            match replaced.and_then(|old| node.children.iter().position(|c| *c == old)) {
                Some(pos) => node.children[pos] = id,
                None => node.children.push(id),
            }
        }
        Ok(id)
    }

    /// Detach and release the child named `name`
    pub fn remove_child(&mut self, parent: NodeId, name: &str) -> bool {
        let Some(id) = self.child(parent, name) else {
            tracing::warn!(
                "No node {:?} below {:?}",
                name,
                self.path_of(parent).unwrap_or_default()
            );
            return false;
        };

        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|c| *c != id);
        }
        self.release(id);
        true
    }

    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(|n| n.take()) {
                self.free.push(current.0);
                stack.extend(node.children);
            }
        }
    }

    /// Find the node at a dotted path; the empty path is the root
    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(self.root);
        }
        path.split(PATH_SEPARATOR)
            .try_fold(self.root, |id, segment| self.child(id, segment))
    }

    /// Dotted path of a node, relative to the root
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = id;
        while current != self.root {
            let node = self.node(current)?;
            segments.push(node.name.as_str());
            current = node.parent?;
        }
        segments.reverse();
        let separator = PATH_SEPARATOR.to_string();
        Some(segments.join(separator.as_str()))
    }

    /// Make sure a dataset exists at `path`, creating missing namespaces
    ///
    /// Fails when a path segment is a dataset, or when the final node exists
    /// as a namespace or with another classification.
    pub fn ensure_dataset(
        &mut self,
        path: &str,
        classification: &Classification,
    ) -> StorageResult<NodeId> {
        validate_rel_path(path)?;
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let Some((leaf, namespaces)) = segments.split_last() else {
            return Err(StorageError::InvalidParameter("empty path".to_string()));
        };

        let mut parent = self.root;
        for segment in namespaces {
            parent = match self.child(parent, segment) {
                Some(id) if self.is_leaf(id) => {
                    return Err(StorageError::InvalidParameter(format!(
                        "{} is a dataset, not a namespace",
                        self.path_of(id).unwrap_or_default()
                    )))
                }
                Some(id) => id,
                None => self.add_child(parent, segment, None)?,
            };
        }

        match self.child(parent, leaf) {
            Some(id) if self.classification(id) == Some(classification) => Ok(id),
            Some(id) => Err(StorageError::InvalidParameter(format!(
                "{} already exists as {}",
                path,
                self.classification(id)
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "a namespace".to_string())
            ))),
            None => self.add_child(parent, leaf, Some(classification.clone())),
        }
    }

    /// Remove the node at `path` and any namespaces left empty above it
    pub fn remove_path(&mut self, path: &str) -> bool {
        let Some(id) = self.resolve(path).filter(|id| *id != self.root) else {
            tracing::warn!("No catalog entry for {:?}", path);
            return false;
        };
        let Some(mut parent) = self.parent(id) else {
            return false;
        };
        let name = self.name(id).unwrap_or_default().to_string();
        let removed = self.remove_child(parent, &name);

        while parent != self.root && self.children(parent).is_empty() {
            let Some(grandparent) = self.parent(parent) else {
                break;
            };
            let name = self.name(parent).unwrap_or_default().to_string();
            self.remove_child(grandparent, &name);
            parent = grandparent;
        }
        removed
    }

    /// Every dataset as `(dotted path, classification)`, depth first
    pub fn datasets(&self) -> Vec<(String, Classification)> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Some(class) = self.classification(id) {
                if let Some(path) = self.path_of(id) {
                    out.push((path, class.clone()));
                }
            }
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Paths of all nodes (namespaces and datasets) whose name matches
    pub fn find(&self, pattern: &str, mode: MatchMode) -> Vec<String> {
        let mut out = Vec::new();
        let mut queue: VecDeque<NodeId> = self.children(self.root).iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if self.name(id).is_some_and(|name| mode.matches(name, pattern)) {
                if let Some(path) = self.path_of(id) {
                    out.push(path);
                }
            }
            queue.extend(self.children(id));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_tree() -> TreeNode {
        TreeNode::namespace(
            "db",
            vec![
                TreeNode::namespace(
                    "stock",
                    vec![
                        TreeNode::dataset("status", Classification::char_panel()),
                        TreeNode::namespace(
                            "quote",
                            vec![TreeNode::dataset("close", Classification::numeric_panel())],
                        ),
                    ],
                ),
                TreeNode::dataset("calendar", Classification::char_time_series()),
                TreeNode::namespace("empty", vec![]),
            ],
        )
    }

    #[test]
    fn test_tree_round_trip() {
        let tree = sample_tree();
        let catalog = Catalog::from_tree(&tree).unwrap();
        assert_eq!(catalog.to_tree(catalog.root()).unwrap(), tree);
        assert_eq!(catalog.len(), 7);
    }

    #[test]
    fn test_serialized_format() {
        let json = serde_json::to_value(TreeNode::namespace(
            "db",
            vec![TreeNode::dataset("status", Classification::char_panel())],
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "node_name": "db",
                "children": [
                    {"node_name": "status", "store_fmt": ["STRUCTURED", "CHAR", "PANEL"]}
                ]
            })
        );
    }

    #[test]
    fn test_malformed_nodes_rejected() {
        let neither = TreeNode {
            node_name: "x".to_string(),
            children: None,
            store_fmt: None,
        };
        let both = TreeNode {
            node_name: "y".to_string(),
            children: Some(vec![]),
            store_fmt: Some(Classification::char_panel()),
        };
        for bad in [neither, both] {
            let tree = TreeNode::namespace("db", vec![bad]);
            assert!(matches!(
                Catalog::from_tree(&tree),
                Err(StorageError::Corruption(_))
            ));
        }
    }

    #[test]
    fn test_navigation() {
        let catalog = Catalog::from_tree(&sample_tree()).unwrap();
        let close = catalog.resolve("stock.quote.close").unwrap();

        assert!(catalog.is_leaf(close));
        assert_eq!(catalog.name(close), Some("close"));
        assert_eq!(catalog.path_of(close).unwrap(), "stock.quote.close");
        assert_eq!(
            catalog.classification(close),
            Some(&Classification::numeric_panel())
        );

        let quote = catalog.parent(close).unwrap();
        assert!(!catalog.is_leaf(quote));
        assert!(catalog.has_child(quote, "close"));
        assert!(catalog.resolve("stock.missing").is_none());
        assert_eq!(catalog.resolve(""), Some(catalog.root()));
        assert!(!catalog.is_leaf(catalog.resolve("empty").unwrap()));
    }

    #[test]
    fn test_add_child_replaces_sibling() {
        let mut catalog = Catalog::from_tree(&sample_tree()).unwrap();
        let root = catalog.root();
        let before = catalog.len();

        let id = catalog
            .add_child(root, "stock", Some(Classification::char_time_series()))
            .unwrap();

        // stock namespace (4 nodes) replaced by one dataset
        assert_eq!(catalog.len(), before - 3);
        assert_eq!(catalog.child(root, "stock"), Some(id));
        assert_eq!(catalog.children(root)[0], id);
        assert!(catalog.resolve("stock.quote").is_none());
    }

    #[test]
    fn test_released_slots_are_reused() {
        let mut catalog = Catalog::new("db");
        let class = Classification::char_time_series();
        for _ in 0..50 {
            catalog.ensure_dataset("tmp.a.b", &class).unwrap();
            assert!(catalog.remove_path("tmp.a.b"));
        }
        assert!(catalog.nodes.len() <= 4);
        assert_eq!(catalog.len(), 1);

        let id = catalog.ensure_dataset("x.y", &class).unwrap();
        assert_eq!(catalog.path_of(id).unwrap(), "x.y");
        assert_eq!(catalog.datasets(), vec![("x.y".to_string(), class)]);
    }

    #[test]
    fn test_add_below_dataset_rejected() {
        let mut catalog = Catalog::from_tree(&sample_tree()).unwrap();
        let status = catalog.resolve("stock.status").unwrap();
        assert!(catalog.add_child(status, "x", None).is_err());
        assert!(catalog.add_child(catalog.root(), "a.b", None).is_err());
    }

    #[test]
    fn test_remove_child() {
        let mut catalog = Catalog::from_tree(&sample_tree()).unwrap();
        let root = catalog.root();

        assert!(!catalog.remove_child(root, "missing"));
        assert!(catalog.remove_child(root, "stock"));
        assert!(!catalog.has_child(root, "stock"));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_ensure_dataset() {
        let mut catalog = Catalog::new("db");
        let class = Classification::char_panel();

        let id = catalog.ensure_dataset("stock.quote.status", &class).unwrap();
        assert_eq!(catalog.ensure_dataset("stock.quote.status", &class).unwrap(), id);
        assert_eq!(catalog.path_of(id).unwrap(), "stock.quote.status");

        // different classification
        assert!(catalog
            .ensure_dataset("stock.quote.status", &Classification::char_time_series())
            .is_err());
        // existing namespace
        assert!(catalog.ensure_dataset("stock.quote", &class).is_err());
        // dataset used as namespace
        assert!(catalog.ensure_dataset("stock.quote.status.x", &class).is_err());
    }

    #[test]
    fn test_remove_path_prunes_empty_namespaces() {
        let mut catalog = Catalog::from_tree(&sample_tree()).unwrap();

        assert!(catalog.remove_path("stock.quote.close"));
        assert!(catalog.resolve("stock.quote").is_none());
        assert!(catalog.resolve("stock.status").is_some());

        assert!(catalog.remove_path("stock.status"));
        assert!(catalog.resolve("stock").is_none());
        assert!(!catalog.remove_path("stock.status"));
        assert!(!catalog.remove_path(""));
    }

    #[test]
    fn test_datasets_and_find() {
        let catalog = Catalog::from_tree(&sample_tree()).unwrap();

        let paths: Vec<String> = catalog.datasets().into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["stock.status", "stock.quote.close", "calendar"]);

        assert_eq!(catalog.find("close", MatchMode::Exact), vec!["stock.quote.close"]);
        assert_eq!(
            catalog.find("st", MatchMode::Contains),
            vec!["stock", "stock.status"]
        );
        assert!(catalog.find("clo", MatchMode::Exact).is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let fresh = Catalog::load(&path, "db").unwrap();
        assert!(fresh.is_empty());

        let catalog = Catalog::from_tree(&sample_tree()).unwrap();
        catalog.save(&path).unwrap();

        let restored = Catalog::load(&path, "db").unwrap();
        assert_eq!(restored.to_tree(restored.root()), Some(sample_tree()));
    }
}
