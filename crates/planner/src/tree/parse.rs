//! Builds a [`QueryTree`] from a JSON description.

use crate::{
    error::QueryError,
    query::ast::common::JoinKind,
    tree::{
        FieldNode, FieldRole, JoinNode, LimitNode, MutationKind, MutationNode, NodeId, NodeKind,
        OrderNode, ProcessRule, QueryTree, SelectNode, WhereNode,
        description::{Description, DescriptionKind, FieldEntry, JoinEntry, TableDescription},
    },
};
use serde_json::Value;
use tracing::debug;

/// Where a Select sits, which decides what its join slot may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Head of the chain: no join allowed.
    Root,
    /// Member or collection: join as declared.
    Nested,
    /// Later item of a top-level list: cross join when none is declared.
    ListItem,
}

pub fn parse(value: &Value) -> Result<QueryTree, QueryError> {
    let description = Description::from_value(value)?;
    let mut builder = TreeBuilder::default();

    match description {
        Description::One(desc) => {
            let root = match desc.kind()? {
                DescriptionKind::Select => builder.select(&desc, None, Placement::Root)?,
                kind => builder.mutation(&desc, kind),
            };
            builder.tree.set_root(root);
        }
        Description::Many(items) => {
            let container = builder.tree.add(NodeKind::Container, None);
            builder.tree.set_root(container);
            let mut head = None;
            for (i, desc) in items.iter().enumerate() {
                if desc.kind()? != DescriptionKind::Select {
                    return Err(QueryError::Parse(format!(
                        "list item '{}' is not a select",
                        desc.table
                    )));
                }
                let placement = if i == 0 {
                    Placement::Root
                } else {
                    Placement::ListItem
                };
                let id = builder.select(desc, Some(container), placement)?;
                match head {
                    None => head = Some(id),
                    Some(head) => builder.tree.append_chain(head, id),
                }
            }
        }
    }

    debug!(nodes = builder.tree.len(), "Parsed query tree");
    Ok(builder.tree)
}

#[derive(Default)]
struct TreeBuilder {
    tree: QueryTree,
}

impl TreeBuilder {
    fn select(
        &mut self,
        desc: &TableDescription,
        parent: Option<NodeId>,
        placement: Placement,
    ) -> Result<NodeId, QueryError> {
        let fields = desc
            .select
            .clone()
            .ok_or_else(|| QueryError::Parse(format!("'{}' has nothing to select", desc.table)))?
            .into_vec();

        let id = self.tree.add(
            NodeKind::Select(SelectNode::new(
                &desc.table,
                desc.alias.as_deref(),
                desc.pk.clone(),
            )),
            parent,
        );

        let declared = match (&desc.join, &desc.left_join) {
            (Some(entry), None) => Some((JoinKind::Inner, entry)),
            (None, Some(entry)) => Some((JoinKind::Left, entry)),
            (None, None) => None,
            (Some(_), Some(_)) => {
                return Err(QueryError::Parse(format!(
                    "'{}' declares both join and leftJoin",
                    desc.table
                )));
            }
        };
        let join = match (placement, declared) {
            (Placement::Root, Some(_)) => return Err(QueryError::RootJoin(desc.table.clone())),
            (_, Some((kind, entry))) => Some(self.join(id, &desc.table, kind, entry)?),
            (Placement::ListItem, None) => Some(self.tree.add(
                NodeKind::Join(JoinNode {
                    kind: JoinKind::Cross,
                    table: desc.table.clone(),
                    links: Vec::new(),
                }),
                Some(id),
            )),
            _ => None,
        };

        let mut field_ids = Vec::new();
        for entry in fields {
            for (table, field, alias) in field_names(entry) {
                field_ids.push(self.tree.add(
                    NodeKind::Field(FieldNode {
                        table,
                        field,
                        alias,
                        role: FieldRole::Select,
                    }),
                    Some(id),
                ));
            }
        }
        if let Some(select) = self.tree.select_mut(id) {
            select.join = join;
            select.fields = field_ids;
        }
        self.tree.add_key_markers(id, true);

        let mut wheres = Vec::new();
        for condition in desc.conditions.clone().map(|c| c.into_vec()).unwrap_or_default() {
            wheres.push(
                self.tree
                    .add(NodeKind::Where(WhereNode { condition }), Some(id)),
            );
        }

        let order = match &desc.order {
            Some(order) => self.order(id, order.clone().into_vec()),
            None => None,
        };

        let limit = match desc.limit {
            Some(limit) if limit <= 0 => return Err(QueryError::InvalidLimit(limit)),
            Some(limit) => Some(self.tree.add(
                NodeKind::Limit(LimitNode {
                    limit: limit as u64,
                }),
                Some(id),
            )),
            None => None,
        };

        let mut process = std::collections::BTreeMap::new();
        for (field, rule) in &desc.process {
            process.insert(field.clone(), ProcessRule::parse(field, rule)?);
        }

        if let Some(select) = self.tree.select_mut(id) {
            select.wheres = wheres;
            select.order = order;
            select.limit = limit;
            select.process = process;
        }

        let mut members = Vec::new();
        for member in &desc.members {
            let child = self.select(member, Some(id), Placement::Nested)?;
            self.tree.append_chain(id, child);
            members.push(child);
        }
        let mut collections = Vec::new();
        for collection in &desc.collections {
            let child = self.select(collection, Some(id), Placement::Nested)?;
            self.tree.append_chain(id, child);
            collections.push(child);
        }
        if let Some(select) = self.tree.select_mut(id) {
            select.members = members;
            select.collections = collections;
        }

        Ok(id)
    }

    fn join(
        &mut self,
        select: NodeId,
        table: &str,
        kind: JoinKind,
        entry: &JoinEntry,
    ) -> Result<NodeId, QueryError> {
        let pairs = join_pairs(entry)?;
        let id = self.tree.add(
            NodeKind::Join(JoinNode {
                kind,
                table: table.to_string(),
                links: Vec::new(),
            }),
            Some(select),
        );

        let mut links = Vec::new();
        for (left, right) in pairs {
            let left = self.join_field(id, &left);
            let right = self.join_field(id, &right);
            links.push((left, right));
        }
        if let NodeKind::Join(join) = &mut self.tree.node_mut(id).kind {
            join.links = links;
        }
        Ok(id)
    }

    fn join_field(&mut self, join: NodeId, reference: &str) -> NodeId {
        let (table, field) = split_reference(reference);
        self.tree.add(
            NodeKind::Field(FieldNode {
                table,
                alias: field.clone(),
                field,
                role: FieldRole::Join,
            }),
            Some(join),
        )
    }

    fn order(&mut self, select: NodeId, entries: Vec<String>) -> Option<NodeId> {
        let terms: Vec<String> = entries
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(String::from)
            .collect();
        if terms.is_empty() {
            return None;
        }

        let id = self
            .tree
            .add(NodeKind::Order(OrderNode { fields: Vec::new() }), Some(select));
        let mut fields = Vec::new();
        for term in terms {
            let (reverse, term) = match term.strip_prefix('-') {
                Some(rest) => (true, rest.trim()),
                None => (false, term.as_str()),
            };
            let (table, field) = split_reference(term);
            fields.push(self.tree.add(
                NodeKind::Field(FieldNode {
                    table,
                    alias: field.clone(),
                    field,
                    role: FieldRole::Order { reverse },
                }),
                Some(id),
            ));
        }
        if let NodeKind::Order(order) = &mut self.tree.node_mut(id).kind {
            order.fields = fields;
        }
        Some(id)
    }

    fn mutation(&mut self, desc: &TableDescription, kind: DescriptionKind) -> NodeId {
        let fields = match kind {
            DescriptionKind::Insert => desc.insert.clone(),
            DescriptionKind::Update => desc.update.clone(),
            DescriptionKind::Delete => desc.delete.clone(),
            DescriptionKind::Select => None,
        }
        .map(|f| f.into_vec())
        .unwrap_or_default();

        let node = MutationNode {
            table: desc.table.clone(),
            pk: desc.pk.clone(),
            fields,
        };
        let kind = match kind {
            DescriptionKind::Insert => NodeKind::Insert(node),
            DescriptionKind::Update => NodeKind::Update(node),
            _ => NodeKind::Delete(node),
        };
        self.tree.add(kind, None)
    }
}

/// Splits `"table.field"`; a bare name refers to the owning table.
fn split_reference(reference: &str) -> (Option<String>, String) {
    match reference.split_once('.') {
        Some((table, field)) => (Some(table.trim().to_string()), field.trim().to_string()),
        None => (None, reference.trim().to_string()),
    }
}

/// `(table, field, alias)` triples of a select entry.
fn field_names(entry: FieldEntry) -> Vec<(Option<String>, String, String)> {
    match entry {
        FieldEntry::Name(name) => {
            let (table, field) = split_reference(&name);
            vec![(table, field.clone(), field)]
        }
        FieldEntry::Renamed(map) => map
            .into_iter()
            .map(|(name, alias)| {
                let (table, field) = split_reference(&name);
                (table, field, alias)
            })
            .collect(),
    }
}

/// Equality links of a join; a join without any is a cross join.
fn join_pairs(entry: &JoinEntry) -> Result<Vec<(String, String)>, QueryError> {
    let pairs: Vec<(String, String)> = match entry {
        JoinEntry::Pair(pair) => match pair.as_slice() {
            [left, right] => vec![(left.clone(), right.clone())],
            _ => return Err(QueryError::CrossJoin),
        },
        JoinEntry::Pairs(pairs) => pairs
            .iter()
            .map(|pair| match pair.as_slice() {
                [left, right] => Ok((left.clone(), right.clone())),
                _ => Err(QueryError::CrossJoin),
            })
            .collect::<Result<_, _>>()?,
        JoinEntry::Expression(expression) => split_conjunction(expression)
            .into_iter()
            .map(|term| match term.split_once('=') {
                Some((left, right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
                    Ok((left.trim().to_string(), right.trim().to_string()))
                }
                _ => Err(QueryError::CrossJoin),
            })
            .collect::<Result<_, _>>()?,
    };
    if pairs.is_empty() {
        return Err(QueryError::CrossJoin);
    }
    Ok(pairs)
}

/// Splits on the keyword `AND`, case-insensitively.
fn split_conjunction(expression: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut start = 0;
    let lower = expression.to_ascii_lowercase();
    let mut search = 0;
    while let Some(pos) = lower[search..].find(" and ") {
        let at = search + pos;
        terms.push(expression[start..at].trim());
        start = at + " and ".len();
        search = start;
    }
    terms.push(expression[start..].trim());
    terms.into_iter().filter(|t| !t.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_ok(value: Value) -> QueryTree {
        parse(&value).unwrap()
    }

    #[test]
    fn test_simple_select() {
        let tree = parse_ok(json!({"table": "users", "select": ["id", "name"]}));
        let root = tree.root();
        let select = tree.select(root).unwrap();
        assert_eq!(select.table, "users");
        assert_eq!(select.fields.len(), 2);
        assert_eq!(tree.qualified(root), "users1");
        assert_eq!(tree.chain(), vec![root]);
    }

    #[test]
    fn test_missing_key_gets_a_marker() {
        let tree = parse_ok(json!({"table": "todos", "select": "title"}));
        let markers = tree.key_markers(tree.root());
        assert_eq!(markers.len(), 1);
        assert_eq!(tree.row_key(markers[0]), "PK[todos1[0]]");
        assert_eq!(tree.full_path(markers[0]), "todos.id");
    }

    #[test]
    fn test_projected_key_needs_no_marker() {
        let tree = parse_ok(json!({"table": "users", "select": ["id"]}));
        assert!(tree.key_markers(tree.root()).is_empty());
    }

    #[test]
    fn test_deeper_chains() {
        let tree = parse_ok(json!({
            "table": "a", "select": [],
            "members": [
                {"table": "b", "select": [], "members": [{"table": "c", "select": []}]},
                {"table": "d", "select": [], "collections": [{"table": "e", "select": []}]}
            ]
        }));
        let names: Vec<&str> = tree
            .chain()
            .into_iter()
            .filter_map(|id| tree.name(id))
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_row_keys_drop_the_root_name() {
        let tree = parse_ok(json!({
            "table": "users", "select": ["id"],
            "members": [{"table": "tools", "select": [{"id": "toolId"}], "join": ["users.id", "tools.ownerId"]}]
        }));
        let tools = tree.select(tree.root()).unwrap().members[0];
        let field = tree.select(tools).unwrap().fields[0];
        assert_eq!(tree.row_key(field), "tools.toolId");
        assert_eq!(tree.full_path(field), "users.tools.toolId");
    }

    #[test]
    fn test_list_items_get_cross_joins() {
        let tree = parse_ok(json!([
            {"table": "users", "select": "age"},
            {"table": "projects", "select": "name"}
        ]));
        let chain = tree.chain();
        assert_eq!(chain.len(), 2);
        let join = tree.select(chain[1]).unwrap().join.unwrap();
        match &tree.node(join).kind {
            NodeKind::Join(join) => {
                assert_eq!(join.kind, JoinKind::Cross);
                assert!(join.links.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(tree.select(chain[0]).unwrap().join.is_none());
    }

    #[test]
    fn test_join_expression_string() {
        let tree = parse_ok(json!({
            "table": "users", "select": "id",
            "collections": [{"table": "comments", "select": "id", "join": "comments.userId = users.id"}]
        }));
        let comments = tree.select(tree.root()).unwrap().collections[0];
        let join = tree.select(comments).unwrap().join.unwrap();
        let NodeKind::Join(join) = &tree.node(join).kind else {
            panic!("expected a join");
        };
        assert_eq!(join.kind, JoinKind::Inner);
        assert_eq!(join.links.len(), 1);
        let (left, right) = join.links[0];
        assert_eq!(tree.field(left).unwrap().table.as_deref(), Some("comments"));
        assert_eq!(tree.field(right).unwrap().field, "id");
    }

    #[test]
    fn test_split_conjunction() {
        assert_eq!(
            split_conjunction("a.x = b.y AND a.z = b.w and c = d"),
            vec!["a.x = b.y", "a.z = b.w", "c = d"]
        );
    }

    #[test]
    fn test_cross_join_in_join_slot_is_refused() {
        for join in [json!([]), json!(["users.id"]), json!("users.id")] {
            let err = parse(&json!({
                "table": "users", "select": "id",
                "members": [{"table": "todos", "select": "id", "join": join}]
            }))
            .unwrap_err();
            assert!(matches!(err, QueryError::CrossJoin));
        }
    }

    #[test]
    fn test_root_join_is_refused() {
        let err = parse(&json!({
            "table": "users", "select": "id", "join": ["users.id", "todos.creatorId"]
        }))
        .unwrap_err();
        assert!(matches!(err, QueryError::RootJoin(_)));
    }

    #[test]
    fn test_invalid_limit() {
        let err = parse(&json!({"table": "users", "select": "id", "limit": 0})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid limit 0.");
    }

    #[test]
    fn test_order_terms() {
        let tree = parse_ok(json!({"table": "users", "select": "id", "order": "-age, name"}));
        let order = tree.select(tree.root()).unwrap().order.unwrap();
        let NodeKind::Order(order) = &tree.node(order).kind else {
            panic!("expected an order");
        };
        let roles: Vec<FieldRole> = order
            .fields
            .iter()
            .map(|id| tree.field(*id).unwrap().role)
            .collect();
        assert_eq!(
            roles,
            vec![
                FieldRole::Order { reverse: true },
                FieldRole::Order { reverse: false }
            ]
        );
    }

    #[test]
    fn test_unknown_process_rule() {
        let err = parse(&json!({"table": "users", "select": "data", "process": {"data": "xml"}}))
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownProcessRule { .. }));
    }

    #[test]
    fn test_mutations() {
        let tree = parse_ok(json!({"table": "users", "update": ["name", "age"]}));
        let (operation, node) = tree.mutation().unwrap();
        assert_eq!(operation, MutationKind::Update);
        assert!(node.allows("age"));
        assert!(tree.chain().is_empty());
    }

    #[test]
    fn test_list_of_mutations_is_refused() {
        let err = parse(&json!([{"table": "users", "insert": "name"}])).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
    }
}
