//! Replays a [`Formula`] over flat rows.
//!
//! The formula is flattened into slots, parent before children. For every
//! row each slot's canonical key is computed into a side table, then the
//! slots are visited in order: the root slot yields top-level objects,
//! `Assign` slots fill member objects and `Push` slots append to arrays.
//! Entities live in an arena, so one key in one slot is one entity however
//! many rows repeat it.

use crate::{formula::Formula, tree::ProcessRule};
use model::{
    core::pk::{PkError, canonical_key},
    records::row::{Row, get_or_null},
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// How a slot's entities attach to the entity of its parent slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Root,
    Assign { parent: usize, name: String },
    Push { parent: usize, name: String },
}

#[derive(Debug)]
struct Slot<'f> {
    formula: &'f Formula,
    placement: Placement,
}

fn flatten<'f>(formula: &'f Formula, placement: Placement, slots: &mut Vec<Slot<'f>>) {
    let index = slots.len();
    slots.push(Slot { formula, placement });
    for (name, member) in &formula.objects {
        let placement = Placement::Assign {
            parent: index,
            name: name.clone(),
        };
        flatten(member, placement, slots);
    }
    for (name, collection) in &formula.arrays {
        let placement = Placement::Push {
            parent: index,
            name: name.clone(),
        };
        flatten(collection, placement, slots);
    }
}

/// Key of one slot in one row.
#[derive(Debug)]
struct SlotKey {
    key: String,
    /// A key component was NULL, e.g. a left join without a match.
    has_null: bool,
}

impl SlotKey {
    fn compute(formula: &Formula, row: &Row, row_index: usize) -> Result<SlotKey, PkError> {
        if formula.pk.is_empty() {
            return Ok(SlotKey {
                key: format!("#{row_index}"),
                has_null: false,
            });
        }
        let mut values = Vec::with_capacity(formula.pk.len());
        for column in &formula.pk {
            let value = row.get(column).ok_or_else(|| PkError::MissingKey {
                field: column.clone(),
            })?;
            values.push(value);
        }
        Ok(SlotKey {
            has_null: values.iter().any(|v| v.is_null()),
            key: canonical_key(values),
        })
    }
}

#[derive(Debug, Default)]
struct Entity {
    fields: Map<String, Value>,
    objects: BTreeMap<String, usize>,
    arrays: BTreeMap<String, Vec<usize>>,
}

/// Dedup state of one materialization.
#[derive(Debug)]
pub struct Replay<'f> {
    slots: Vec<Slot<'f>>,
    entities: Vec<Entity>,
    roots: Vec<usize>,
    /// Per slot: canonical key to entity.
    seen: Vec<HashMap<String, usize>>,
    /// Per slot: (parent entity, key) pairs already pushed.
    pushed: Vec<HashSet<(usize, String)>>,
    rows: usize,
}

impl<'f> Replay<'f> {
    pub fn new(formula: &'f Formula) -> Self {
        let mut slots = Vec::new();
        flatten(formula, Placement::Root, &mut slots);
        let count = slots.len();
        Replay {
            slots,
            entities: Vec::new(),
            roots: Vec::new(),
            seen: vec![HashMap::new(); count],
            pushed: vec![HashSet::new(); count],
            rows: 0,
        }
    }

    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.slots.iter().map(|slot| &slot.placement)
    }

    /// Number of distinct entities built so far.
    pub fn entities_built(&self) -> usize {
        self.entities.len()
    }

    pub fn feed(&mut self, rows: &[Row]) -> Result<(), PkError> {
        for row in rows {
            let row_index = self.rows;
            self.rows += 1;
            let keys = self
                .slots
                .iter()
                .map(|slot| SlotKey::compute(slot.formula, row, row_index))
                .collect::<Result<Vec<_>, _>>()?;
            self.feed_row(row, &keys);
        }
        Ok(())
    }

    fn feed_row(&mut self, row: &Row, keys: &[SlotKey]) {
        // Entity each slot resolved to for this row.
        let mut current: Vec<Option<usize>> = vec![None; self.slots.len()];

        for (index, key) in keys.iter().enumerate() {
            let placement = self.slots[index].placement.clone();
            match placement {
                Placement::Root => {
                    let (entity, built) = self.entity(index, row, &key.key);
                    if built {
                        self.roots.push(entity);
                    }
                    current[index] = Some(entity);
                }
                Placement::Assign { parent, name } => {
                    let Some(parent_entity) = current[parent] else {
                        continue;
                    };
                    let (entity, _) = self.entity(index, row, &key.key);
                    self.entities[parent_entity]
                        .objects
                        .entry(name)
                        .or_insert(entity);
                    current[index] = Some(entity);
                }
                Placement::Push { parent, name } => {
                    let Some(parent_entity) = current[parent] else {
                        continue;
                    };
                    if key.has_null {
                        continue;
                    }
                    let (entity, _) = self.entity(index, row, &key.key);
                    if self.pushed[index].insert((parent_entity, key.key.clone())) {
                        self.entities[parent_entity]
                            .arrays
                            .entry(name)
                            .or_default()
                            .push(entity);
                    }
                    current[index] = Some(entity);
                }
            }
        }
    }

    /// Looks up the entity of `key` in a slot, building it on first sighting.
    fn entity(&mut self, slot: usize, row: &Row, key: &str) -> (usize, bool) {
        if let Some(entity) = self.seen[slot].get(key) {
            return (*entity, false);
        }
        let entity = self.build(slot, row);
        self.seen[slot].insert(key.to_string(), entity);
        (entity, true)
    }

    fn build(&mut self, slot: usize, row: &Row) -> usize {
        let formula = self.slots[slot].formula;
        let mut fields = Map::new();
        for (name, column) in &formula.flat {
            let value = get_or_null(row, column).clone();
            let value = match formula.process.get(name) {
                Some(rule) => apply_rule(*rule, name, value),
                None => value,
            };
            fields.insert(name.clone(), value);
        }
        let arrays = formula
            .arrays
            .keys()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        self.entities.push(Entity {
            fields,
            objects: BTreeMap::new(),
            arrays,
        });
        self.entities.len() - 1
    }

    /// The top-level objects, in the order they were first seen.
    pub fn into_values(self) -> Vec<Value> {
        self.roots
            .iter()
            .map(|root| self.value_of(*root))
            .collect()
    }

    fn value_of(&self, entity: usize) -> Value {
        let entity = &self.entities[entity];
        let mut obj = entity.fields.clone();
        for (name, member) in &entity.objects {
            obj.insert(name.clone(), self.value_of(*member));
        }
        for (name, items) in &entity.arrays {
            let items = items.iter().map(|item| self.value_of(*item)).collect();
            obj.insert(name.clone(), Value::Array(items));
        }
        Value::Object(obj)
    }
}

fn apply_rule(rule: ProcessRule, field: &str, value: Value) -> Value {
    match (rule, value) {
        (ProcessRule::Json, Value::String(text)) => match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(field, error = %err, "Field does not hold valid JSON, keeping the text");
                Value::String(text)
            }
        },
        (ProcessRule::Boolean, Value::Number(n)) => {
            Value::Bool(n.as_f64().is_some_and(|n| n != 0.0))
        }
        (ProcessRule::Boolean, Value::String(text)) => match text.as_str() {
            "1" | "true" | "TRUE" => Value::Bool(true),
            "0" | "false" | "FALSE" => Value::Bool(false),
            _ => {
                warn!(field, value = %text, "Cannot read value as boolean");
                Value::String(text)
            }
        },
        (_, value) => value,
    }
}
