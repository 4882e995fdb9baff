use crate::tree::{FieldRole, NodeId, NodeKind, QueryTree};
use std::fmt::Write;

impl QueryTree {
    /// Human-readable rendering of the chain and the node tree.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let chain: Vec<String> = self
            .chain()
            .into_iter()
            .map(|id| format!("#{}", self.node(id).reference))
            .collect();
        let _ = writeln!(out, "Chain: {}", chain.join(" -> "));
        self.dump_node(self.root(), 0, &mut out);
        out
    }

    fn dump_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let detail = match &node.kind {
            NodeKind::Container => String::new(),
            NodeKind::Select(select) => match &select.alias {
                Some(alias) => format!(" '{}' as '{alias}'", select.table),
                None => format!(" '{}'", select.table),
            },
            NodeKind::Field(field) => {
                let mut detail = match &field.table {
                    Some(table) => format!(" '{table}.{}'", field.field),
                    None => format!(" '{}'", field.field),
                };
                if field.alias != field.field {
                    let _ = write!(detail, " as '{}'", field.alias);
                }
                if let FieldRole::Order { reverse: true } = field.role {
                    detail.push_str(" DESC");
                }
                detail
            }
            NodeKind::Join(join) => format!(" {:?} '{}'", join.kind, join.table),
            NodeKind::Where(condition) => format!(" '{}'", condition.condition),
            NodeKind::Order(_) => String::new(),
            NodeKind::Limit(limit) => format!(" {}", limit.limit),
            NodeKind::Insert(m) | NodeKind::Update(m) | NodeKind::Delete(m) => {
                format!(" '{}' [{}]", m.table, m.fields.join(", "))
            }
        };
        let _ = writeln!(
            out,
            "{}Ref. #{} {}{}",
            "  ".repeat(depth),
            node.reference,
            node.kind.label(),
            detail
        );
        for child in &node.children {
            self.dump_node(*child, depth + 1, out);
        }
    }
}
