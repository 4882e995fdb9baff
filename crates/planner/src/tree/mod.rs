//! The query tree: an arena of nodes linked by parent/child edges and by a
//! separate linear chain that fixes the JOIN order.

use crate::{error::QueryError, query::ast::common::JoinKind};
use model::core::pk::PrimaryKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod description;
pub mod dump;
pub mod parse;

/// Index of a node inside its [`QueryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    /// Unique within the tree, assigned in creation order starting at 1.
    pub reference: u32,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

impl MutationKind {
    /// Name of the operation in allow-list errors.
    pub fn operation(&self) -> &'static str {
        match self {
            MutationKind::Insert => "insertion",
            MutationKind::Update => "update",
            MutationKind::Delete => "deletion",
        }
    }

    pub fn article(&self) -> &'static str {
        match self {
            MutationKind::Insert => "an insert",
            MutationKind::Update => "an update",
            MutationKind::Delete => "a delete",
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Groups the items of a top-level list.
    Container,
    Select(SelectNode),
    Field(FieldNode),
    Join(JoinNode),
    Where(WhereNode),
    Order(OrderNode),
    Limit(LimitNode),
    Insert(MutationNode),
    Update(MutationNode),
    Delete(MutationNode),
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Container => "Container",
            NodeKind::Select(_) => "Select",
            NodeKind::Field(field) => match field.role {
                FieldRole::Select => "Field",
                FieldRole::Join => "JoinField",
                FieldRole::Order { .. } => "OrderField",
                FieldRole::Key { .. } => "KeyField",
            },
            NodeKind::Join(_) => "Join",
            NodeKind::Where(_) => "Where",
            NodeKind::Order(_) => "Order",
            NodeKind::Limit(_) => "Limit",
            NodeKind::Insert(_) => "Insert",
            NodeKind::Update(_) => "Update",
            NodeKind::Delete(_) => "Delete",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectNode {
    pub table: String,
    pub alias: Option<String>,
    pub pk: PrimaryKey,
    pub fields: Vec<NodeId>,
    pub join: Option<NodeId>,
    pub members: Vec<NodeId>,
    pub collections: Vec<NodeId>,
    pub wheres: Vec<NodeId>,
    pub order: Option<NodeId>,
    pub limit: Option<NodeId>,
    pub process: BTreeMap<String, ProcessRule>,
}

impl SelectNode {
    pub fn new(table: &str, alias: Option<&str>, pk: PrimaryKey) -> Self {
        SelectNode {
            table: table.to_string(),
            alias: alias.map(String::from),
            pk,
            fields: Vec::new(),
            join: None,
            members: Vec::new(),
            collections: Vec::new(),
            wheres: Vec::new(),
            order: None,
            limit: None,
            process: BTreeMap::new(),
        }
    }

    /// The alias if one was given, the table name otherwise.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Projected into the result.
    Select,
    /// One side of a join link.
    Join,
    Order { reverse: bool },
    /// Hidden primary-key column, `index` into the owner's key fields.
    Key { index: usize },
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    /// Name or alias of the Select the column belongs to; `None` means the owner.
    pub table: Option<String>,
    pub field: String,
    /// Output name. For key markers this is the full marker column name.
    pub alias: String,
    pub role: FieldRole,
}

#[derive(Debug, Clone)]
pub struct JoinNode {
    pub kind: JoinKind,
    pub table: String,
    /// Equality links, each a pair of join field nodes.
    pub links: Vec<(NodeId, NodeId)>,
}

#[derive(Debug, Clone)]
pub struct WhereNode {
    pub condition: String,
}

#[derive(Debug, Clone)]
pub struct OrderNode {
    pub fields: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct LimitNode {
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct MutationNode {
    pub table: String,
    pub pk: PrimaryKey,
    /// Allow-list of fields the mutation may touch.
    pub fields: Vec<String>,
}

impl MutationNode {
    pub fn allows(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Post-processing applied to a materialized field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessRule {
    /// Decode a string column holding JSON.
    Json,
    /// Turn 0/1 (or "0"/"1") into a boolean.
    Boolean,
}

impl ProcessRule {
    pub fn parse(field: &str, rule: &str) -> Result<Self, QueryError> {
        match rule.to_lowercase().as_str() {
            "json" => Ok(ProcessRule::Json),
            "boolean" | "bool" => Ok(ProcessRule::Boolean),
            _ => Err(QueryError::UnknownProcessRule {
                field: field.to_string(),
                rule: rule.to_string(),
            }),
        }
    }
}

/// Which columns a SELECT projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    Full,
    /// Only the primary-key markers of every table.
    PrimaryKeys,
}

/// Column name under which a key marker is projected.
pub fn key_marker(qualified: &str, index: usize) -> String {
    format!("PK[{qualified}[{index}]]")
}

#[derive(Debug, Clone)]
pub struct QueryTree {
    nodes: Vec<Node>,
    root: NodeId,
    next_reference: u32,
    projection: Projection,
}

impl Default for QueryTree {
    fn default() -> Self {
        QueryTree {
            nodes: Vec::new(),
            root: NodeId(0),
            next_reference: 1,
            projection: Projection::Full,
        }
    }
}

impl QueryTree {
    /// Adds a node, registering it as the last child of `parent`.
    pub(crate) fn add(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let reference = self.next_reference;
        self.next_reference += 1;
        self.nodes.push(Node {
            reference,
            parent,
            children: Vec::new(),
            prev: None,
            next: None,
            kind,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn select(&self, id: NodeId) -> Option<&SelectNode> {
        match &self.node(id).kind {
            NodeKind::Select(select) => Some(select),
            _ => None,
        }
    }

    pub(crate) fn select_mut(&mut self, id: NodeId) -> Option<&mut SelectNode> {
        match &mut self.node_mut(id).kind {
            NodeKind::Select(select) => Some(select),
            _ => None,
        }
    }

    pub fn field(&self, id: NodeId) -> Option<&FieldNode> {
        match &self.node(id).kind {
            NodeKind::Field(field) => Some(field),
            _ => None,
        }
    }

    /// The mutation node at the root, with its kind.
    pub fn mutation(&self) -> Option<(MutationKind, &MutationNode)> {
        match &self.node(self.root).kind {
            NodeKind::Insert(m) => Some((MutationKind::Insert, m)),
            NodeKind::Update(m) => Some((MutationKind::Update, m)),
            NodeKind::Delete(m) => Some((MutationKind::Delete, m)),
            _ => None,
        }
    }

    /// The first node of the chain: the root Select, or the first item of a list.
    pub fn chain_head(&self) -> Option<NodeId> {
        let root = self.node(self.root);
        match root.kind {
            NodeKind::Select(_) => Some(self.root),
            NodeKind::Container => root.children.first().copied(),
            _ => None,
        }
    }

    /// The Select nodes in JOIN order.
    pub fn chain(&self) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.chain_head();
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.node(id).next;
        }
        chain
    }

    pub(crate) fn chain_tail(&self, from: NodeId) -> NodeId {
        let mut tail = from;
        while let Some(next) = self.node(tail).next {
            tail = next;
        }
        tail
    }

    /// Links the chain starting at `head` after the current tail of the
    /// chain containing `anchor`.
    pub(crate) fn append_chain(&mut self, anchor: NodeId, head: NodeId) {
        let tail = self.chain_tail(anchor);
        self.node_mut(tail).next = Some(head);
        self.node_mut(head).prev = Some(tail);
    }

    /// Name used in paths: the Select name. Containers have none.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.select(id).map(SelectNode::name)
    }

    /// The SQL alias of a Select: its name followed by its reference.
    pub fn qualified(&self, id: NodeId) -> String {
        match self.name(id) {
            Some(name) => format!("{}{}", name, self.node(id).reference),
            None => format!("node{}", self.node(id).reference),
        }
    }

    /// Names of the Selects from the root down to `id`, inclusive.
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(name) = self.name(current) {
                names.push(name);
            }
            cursor = self.node(current).parent;
        }
        names.reverse();
        names
    }

    /// Nearest Select at or above `id`.
    pub fn owning_select(&self, id: NodeId) -> Option<NodeId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.select(current).is_some() {
                return Some(current);
            }
            cursor = self.node(current).parent;
        }
        None
    }

    /// Dot-joined path of a field: enclosing Select names plus its output name.
    pub fn full_path(&self, field_id: NodeId) -> String {
        let Some(field) = self.field(field_id) else {
            return String::new();
        };
        let mut parts = self
            .owning_select(field_id)
            .map(|owner| self.path(owner))
            .unwrap_or_default();
        let name = match field.role {
            FieldRole::Key { .. } => field.field.as_str(),
            _ => field.alias.as_str(),
        };
        parts.push(name);
        parts.join(".")
    }

    /// Column name of a projected field in result rows: the full path
    /// without the root's name.
    pub fn row_key(&self, field_id: NodeId) -> String {
        let Some(field) = self.field(field_id) else {
            return String::new();
        };
        if let FieldRole::Key { .. } = field.role {
            return field.alias.clone();
        }
        let mut parts = self
            .owning_select(field_id)
            .map(|owner| self.path(owner))
            .unwrap_or_default();
        parts.push(&field.alias);
        parts[1..].join(".")
    }

    /// Finds the Select called `name`, looking at `from` itself, then
    /// walking back along the chain and up through parents.
    pub fn resolve_table(&self, from: NodeId, name: &str) -> Result<NodeId, QueryError> {
        let mut cursor = Some(from);
        while let Some(current) = cursor {
            if self.name(current) == Some(name) {
                return Ok(current);
            }
            let node = self.node(current);
            cursor = node.prev.or(node.parent);
        }
        Err(QueryError::UnknownTableReference(name.to_string()))
    }

    /// The Select a field's column lives on.
    pub fn field_table(&self, field_id: NodeId) -> Result<NodeId, QueryError> {
        let owner = self
            .owning_select(field_id)
            .ok_or_else(|| QueryError::Parse("field outside of a select".into()))?;
        match self.field(field_id).and_then(|f| f.table.as_deref()) {
            Some(table) => self.resolve_table(owner, table),
            None => Ok(owner),
        }
    }

    /// Key marker fields of a Select, in key order.
    pub fn key_markers(&self, select_id: NodeId) -> Vec<NodeId> {
        let Some(select) = self.select(select_id) else {
            return Vec::new();
        };
        let mut markers: Vec<(usize, NodeId)> = select
            .fields
            .iter()
            .filter_map(|id| match self.field(*id).map(|f| f.role) {
                Some(FieldRole::Key { index }) => Some((index, *id)),
                _ => None,
            })
            .collect();
        markers.sort();
        markers.into_iter().map(|(_, id)| id).collect()
    }

    /// The field carrying key component `index` of a Select: a projected
    /// own field named like the key field, or the marker.
    pub fn key_field(&self, select_id: NodeId, index: usize) -> Option<NodeId> {
        let select = self.select(select_id)?;
        let pk_field = select.pk.fields().get(index)?;
        let marker = select.fields.iter().copied().find(|id| {
            matches!(self.field(*id).map(|f| f.role), Some(FieldRole::Key { index: i }) if i == index)
        });
        if self.projection == Projection::PrimaryKeys {
            return marker;
        }
        let projected = select.fields.iter().copied().find(|id| {
            self.field(*id).is_some_and(|f| {
                f.role == FieldRole::Select
                    && &f.field == pk_field
                    && f.table.as_deref().is_none_or(|t| t == select.name())
            })
        });
        projected.or(marker)
    }

    /// Adds a hidden key marker for every key field of `select_id` that has
    /// no marker yet. With `only_missing`, projected key fields are skipped.
    pub(crate) fn add_key_markers(&mut self, select_id: NodeId, only_missing: bool) {
        let Some(select) = self.select(select_id) else {
            return;
        };
        let qualified = self.qualified(select_id);
        let pk_fields: Vec<String> = select.pk.fields().to_vec();
        for (index, pk_field) in pk_fields.iter().enumerate() {
            let has_marker = self.key_markers(select_id).iter().any(|id| {
                matches!(self.field(*id).map(|f| f.role), Some(FieldRole::Key { index: i }) if i == index)
            });
            if has_marker || (only_missing && self.key_field(select_id, index).is_some()) {
                continue;
            }
            let marker = self.add(
                NodeKind::Field(FieldNode {
                    table: None,
                    field: pk_field.clone(),
                    alias: key_marker(&qualified, index),
                    role: FieldRole::Key { index },
                }),
                Some(select_id),
            );
            if let Some(select) = self.select_mut(select_id) {
                select.fields.push(marker);
            }
        }
    }

    /// Attaches an extra condition to a Select.
    pub(crate) fn add_where(&mut self, select_id: NodeId, condition: &str) -> NodeId {
        let id = self.add(
            NodeKind::Where(WhereNode {
                condition: condition.to_string(),
            }),
            Some(select_id),
        );
        if let Some(select) = self.select_mut(select_id) {
            select.wheres.push(id);
        }
        id
    }

    /// Switches to primary-key-only projection, adding markers everywhere.
    pub(crate) fn project_primary_keys(&mut self) {
        for id in self.chain() {
            self.add_key_markers(id, false);
        }
        self.projection = Projection::PrimaryKeys;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(tree: &mut QueryTree, table: &str, parent: Option<NodeId>) -> NodeId {
        tree.add(
            NodeKind::Select(SelectNode::new(table, None, PrimaryKey::default())),
            parent,
        )
    }

    #[test]
    fn test_references_increase_in_creation_order() {
        let mut tree = QueryTree::default();
        let a = select(&mut tree, "a", None);
        let b = select(&mut tree, "b", Some(a));
        assert_eq!(tree.node(a).reference, 1);
        assert_eq!(tree.node(b).reference, 2);
        assert_eq!(tree.node(a).children, vec![b]);
        assert_eq!(tree.node(b).parent, Some(a));
    }

    #[test]
    fn test_separate_trees_number_independently() {
        let mut first = QueryTree::default();
        let mut second = QueryTree::default();
        select(&mut first, "a", None);
        let id = select(&mut second, "b", None);
        assert_eq!(second.node(id).reference, 1);
    }

    #[test]
    fn test_append_chain_goes_to_tail() {
        let mut tree = QueryTree::default();
        let a = select(&mut tree, "a", None);
        let b = select(&mut tree, "b", Some(a));
        let c = select(&mut tree, "c", Some(b));
        let d = select(&mut tree, "d", Some(a));
        tree.set_root(a);
        tree.append_chain(b, c);
        tree.append_chain(a, b);
        tree.append_chain(a, d);
        assert_eq!(tree.chain(), vec![a, b, c, d]);
        assert_eq!(tree.node(d).prev, Some(c));
    }

    #[test]
    fn test_path_and_qualified_name() {
        let mut tree = QueryTree::default();
        let a = select(&mut tree, "users", None);
        let b = select(&mut tree, "tools", Some(a));
        tree.set_root(a);
        assert_eq!(tree.path(b), vec!["users", "tools"]);
        assert_eq!(tree.qualified(b), "tools2");
    }

    #[test]
    fn test_clone_is_independent() {
        let mut tree = QueryTree::default();
        let a = select(&mut tree, "users", None);
        tree.set_root(a);
        let mut copy = tree.clone();
        copy.add_where(a, "age > 1");
        assert_eq!(copy.select(a).unwrap().wheres.len(), 1);
        assert!(tree.select(a).unwrap().wheres.is_empty());
    }
}
