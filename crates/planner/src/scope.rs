//! Resolution of identifiers in user-written conditions to qualified
//! column references.
//!
//! Every Select exposes a scope: one entry per projected field and key
//! marker, reachable by its output alias, by `<select>.<alias>`, or by its
//! full dotted path from the root. A condition is searched in its own
//! Select's scope first, then in each ancestor's, then in the Selects that
//! precede it in the chain.

use crate::{
    error::QueryError,
    query::ast::expr::{ConditionPart, Ident},
    tree::{FieldRole, NodeId, QueryTree},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// An identifier path such as `age` or `users.tools.name`.
    Ident(&'a str),
    /// Everything else, string literals included.
    Text(&'a str),
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Splits a condition into identifier paths and verbatim text. Quoted
/// strings are never split.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let end_of = |i: usize| chars.get(i).map(|(at, _)| *at).unwrap_or(text.len());

    let mut tokens = Vec::new();
    let mut text_start: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        let (at, c) = chars[i];
        if c == '\'' || c == '"' {
            // Skip to the closing quote; doubled quotes and backslashes escape.
            let mut j = i + 1;
            while j < chars.len() {
                let ch = chars[j].1;
                if ch == '\\' {
                    j += 2;
                    continue;
                }
                if ch == c {
                    if chars.get(j + 1).is_some_and(|(_, n)| *n == c) {
                        j += 2;
                        continue;
                    }
                    break;
                }
                j += 1;
            }
            text_start.get_or_insert(at);
            i = (j + 1).min(chars.len());
            continue;
        }

        let after_word = i > 0 && is_ident_char(chars[i - 1].1);
        if is_ident_start(c) && !after_word {
            let mut j = i + 1;
            loop {
                while j < chars.len() && is_ident_char(chars[j].1) {
                    j += 1;
                }
                let dotted = j + 1 < chars.len()
                    && chars[j].1 == '.'
                    && is_ident_start(chars[j + 1].1);
                if !dotted {
                    break;
                }
                j += 2;
            }
            if let Some(start) = text_start.take() {
                tokens.push(Token::Text(&text[start..at]));
            }
            tokens.push(Token::Ident(&text[at..end_of(j)]));
            i = j;
            continue;
        }

        text_start.get_or_insert(at);
        i += 1;
    }

    if let Some(start) = text_start {
        tokens.push(Token::Text(&text[start..]));
    }
    tokens
}

/// Dotted identifier paths mentioned in a condition, outside string literals.
pub fn vars(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if let Token::Ident(ident) = token {
            if ident.contains('.') && !found.iter().any(|f| f == ident) {
                found.push(ident.to_string());
            }
        }
    }
    found
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub alias: String,
    /// `<select>.<alias>`
    pub local: String,
    /// Dotted path from the root.
    pub path: String,
    pub column: Ident,
}

impl ScopeEntry {
    pub fn matches(&self, token: &str) -> bool {
        self.alias == token || self.local == token || self.path == token
    }
}

/// Scope entries exposed by one Select.
pub fn scope_of(tree: &QueryTree, select_id: NodeId) -> Result<Vec<ScopeEntry>, QueryError> {
    let Some(select) = tree.select(select_id) else {
        return Ok(Vec::new());
    };
    let mut entries = Vec::new();
    for field_id in &select.fields {
        let Some(field) = tree.field(*field_id) else {
            continue;
        };
        let alias = match field.role {
            FieldRole::Key { .. } => field.field.clone(),
            _ => field.alias.clone(),
        };
        let table = tree.field_table(*field_id)?;
        entries.push(ScopeEntry {
            local: format!("{}.{}", select.name(), alias),
            path: tree.full_path(*field_id),
            column: Ident::qualified(&tree.qualified(table), &field.field),
            alias,
        });
    }
    Ok(entries)
}

/// Selects searched when resolving a condition placed on `select_id`.
pub fn resolution_order(tree: &QueryTree, select_id: NodeId) -> Vec<NodeId> {
    let mut order = vec![select_id];
    let mut cursor = tree.node(select_id).parent;
    while let Some(id) = cursor {
        if tree.select(id).is_some() {
            order.push(id);
        }
        cursor = tree.node(id).parent;
    }
    let mut cursor = tree.node(select_id).prev;
    while let Some(id) = cursor {
        if !order.contains(&id) {
            order.push(id);
        }
        cursor = tree.node(id).prev;
    }
    order
}

/// Rewrites a condition, replacing every identifier found in scope with
/// its qualified column. Unknown identifiers pass through unchanged.
pub fn resolve_condition(
    tree: &QueryTree,
    select_id: NodeId,
    condition: &str,
) -> Result<Vec<ConditionPart>, QueryError> {
    let scopes = resolution_order(tree, select_id)
        .into_iter()
        .map(|id| scope_of(tree, id))
        .collect::<Result<Vec<_>, _>>()?;

    let mut parts: Vec<ConditionPart> = Vec::new();
    for token in tokenize(condition) {
        let part = match token {
            Token::Ident(ident) => scopes
                .iter()
                .find_map(|scope| scope.iter().find(|entry| entry.matches(ident)))
                .map(|entry| ConditionPart::Column(entry.column.clone()))
                .unwrap_or_else(|| ConditionPart::Text(ident.to_string())),
            Token::Text(text) => ConditionPart::Text(text.to_string()),
        };
        match (parts.last_mut(), part) {
            (Some(ConditionPart::Text(previous)), ConditionPart::Text(text)) => {
                previous.push_str(&text)
            }
            (_, part) => parts.push(part),
        }
    }
    Ok(parts)
}

/// The earliest chain Select whose accumulated scope mentions every variable.
pub fn filter_target(tree: &QueryTree, variables: &[String]) -> Result<NodeId, QueryError> {
    let chain = tree.chain();
    let mut seen: Vec<ScopeEntry> = Vec::new();
    for id in &chain {
        seen.extend(scope_of(tree, *id)?);
        if variables
            .iter()
            .all(|var| seen.iter().any(|entry| entry.matches(var)))
        {
            return Ok(*id);
        }
    }
    let missing = variables
        .iter()
        .filter(|var| !seen.iter().any(|entry| entry.matches(var)))
        .cloned()
        .collect();
    Err(QueryError::UnresolvedVariables(missing))
}
