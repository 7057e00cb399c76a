// src/flow/category.rs — Category tree stored as an arena
//
// Nodes are addressed by `NodeId` indices; parent/children are ids, not
// references. The tree is immutable once built and shared read-only across
// sessions behind an `Arc`.

use std::collections::HashMap;

use crate::integrations::types::CategoryEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    by_id: HashMap<String, NodeId>,
    roots: Vec<NodeId>,
}

impl CategoryTree {
    /// Build from flat records. Duplicate ids keep the first record; a
    /// record whose parent is unknown, itself, or would close a cycle
    /// becomes a root.
    pub fn from_entries(entries: &[CategoryEntry]) -> Self {
        let mut tree = CategoryTree::default();
        for entry in entries {
            if tree.by_id.contains_key(&entry.id) {
                continue;
            }
            let id = NodeId(tree.nodes.len());
            tree.by_id.insert(entry.id.clone(), id);
            tree.nodes.push(CategoryNode {
                id: entry.id.clone(),
                name: entry.name.clone(),
                parent: None,
                children: Vec::new(),
            });
        }

        for entry in entries {
            let Some(&child) = tree.by_id.get(&entry.id) else {
                continue;
            };
            if tree.nodes[child.0].parent.is_some() {
                continue;
            }
            let parent = entry
                .parent_id
                .as_ref()
                .and_then(|p| tree.by_id.get(p).copied())
                .filter(|&p| p != child && !tree.is_ancestor(child, p));
            if let Some(parent) = parent {
                tree.nodes[child.0].parent = Some(parent);
                tree.nodes[parent.0].children.push(child);
            }
        }

        tree.roots = (0..tree.nodes.len())
            .map(NodeId)
            .filter(|id| tree.nodes[id.0].parent.is_none())
            .collect();
        tree
    }

    /// Whether `ancestor` is `node` or lies on its parent chain.
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes[current.0].parent;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn lookup(&self, category_id: &str) -> Option<NodeId> {
        self.by_id.get(category_id).copied()
    }

    /// Id for an index carried in callback data.
    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        (index < self.nodes.len()).then_some(NodeId(index))
    }

    pub fn node(&self, id: NodeId) -> Option<&CategoryNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.children(id).is_empty()
    }

    /// Ids from the root down to `id`.
    pub fn path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(id.0).map(|_| id);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.nodes[current.0].parent;
        }
        path.reverse();
        path
    }

    /// "Home › Furniture › Chairs", or `None` for unknown ids.
    pub fn path_label(&self, category_id: &str) -> Option<String> {
        let id = self.lookup(category_id)?;
        let names: Vec<&str> = self
            .path(id)
            .into_iter()
            .map(|n| self.nodes[n.0].name.as_str())
            .collect();
        Some(names.join(" › "))
    }
}
