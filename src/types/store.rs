use std::collections::HashMap;

use serde_json::{Map, Value};

use super::field::Field;

/// Split a field key into tree segments. An empty separator keeps the key whole.
pub(crate) fn key_segments<'a>(key: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        vec![key]
    } else {
        key.split(separator).collect()
    }
}

/// Insert a value at a segment path, creating intermediate objects as needed.
/// A non-object value sitting on the path is replaced by an object.
pub(crate) fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            map.insert((*last).to_owned(), value);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry((*first).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(nested) = entry {
                insert_path(nested, rest, value);
            }
        }
    }
}

/// Build a nested tree from flat `(key, value)` pairs, later pairs winning.
pub(crate) fn build_tree<'a>(
    pairs: impl IntoIterator<Item = (&'a str, Value)>,
    separator: &str,
) -> Map<String, Value> {
    let mut tree = Map::new();
    for (key, value) in pairs {
        insert_path(&mut tree, &key_segments(key, separator), value);
    }
    tree
}

/// The engine's field registry together with its value views.
///
/// Field order is schema order. The nested value tree is kept in step with
/// every value write; when one key is a path prefix of another the tree is
/// rebuilt in field order instead, so the result matches a from-scratch
/// build.
#[derive(Debug, Clone)]
pub struct FieldStore {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    dependents: Vec<Vec<usize>>,
    tree: Map<String, Value>,
    separator: String,
    prefix_conflict: bool,
}

impl FieldStore {
    /// Build a store from already validated fields (unique keys, known
    /// dependencies).
    pub(crate) fn new(fields: Vec<Field>, separator: &str) -> Self {
        let index: HashMap<String, usize> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.key.clone(), i))
            .collect();

        let mut dependents = vec![Vec::new(); fields.len()];
        for (i, field) in fields.iter().enumerate() {
            for dep in &field.dependencies {
                if let Some(&d) = index.get(dep) {
                    if !dependents[d].contains(&i) {
                        dependents[d].push(i);
                    }
                }
            }
        }

        let prefix_conflict = !separator.is_empty()
            && fields.iter().any(|f| {
                let prefix = format!("{}{separator}", f.key);
                fields.iter().any(|other| other.key.starts_with(&prefix))
            });

        let mut store = Self {
            fields,
            index,
            dependents,
            tree: Map::new(),
            separator: separator.to_owned(),
            prefix_conflict,
        };
        store.rebuild_tree();
        store
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.index.get(key).map(|&i| &self.fields[i])
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub(crate) fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub(crate) fn at(&self, position: usize) -> &Field {
        &self.fields[position]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Positions of the fields that declare `position` as a dependency, in
    /// field order.
    pub(crate) fn dependents_of(&self, position: usize) -> &[usize] {
        &self.dependents[position]
    }

    /// Write a field value, keeping the flat and tree views in sync.
    /// Returns `false` if the key is unknown.
    pub(crate) fn write_value(&mut self, key: &str, value: Value) -> bool {
        let Some(&i) = self.index.get(key) else {
            return false;
        };
        self.fields[i].value = value;
        if self.prefix_conflict {
            self.rebuild_tree();
        } else {
            let segments = key_segments(&self.fields[i].key, &self.separator);
            insert_path(&mut self.tree, &segments, self.fields[i].value.clone());
        }
        true
    }

    /// Mutable access for non-value properties. Values go through
    /// [`FieldStore::write_value`].
    pub(crate) fn field_mut(&mut self, key: &str) -> Option<&mut Field> {
        self.index.get(key).map(|&i| &mut self.fields[i])
    }

    fn rebuild_tree(&mut self) {
        self.tree = build_tree(
            self.fields.iter().map(|f| (f.key.as_str(), f.value.clone())),
            &self.separator,
        );
    }

    /// Flat key → value map of every field.
    #[must_use]
    pub fn values(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect()
    }

    /// Nested view of [`FieldStore::values`], keys split on the separator.
    #[must_use]
    pub fn tree(&self) -> &Map<String, Value> {
        &self.tree
    }

    #[must_use]
    pub fn visible_values(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|f| f.visible)
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect()
    }

    #[must_use]
    pub fn visible_values_tree(&self) -> Map<String, Value> {
        build_tree(
            self.fields
                .iter()
                .filter(|f| f.visible)
                .map(|f| (f.key.as_str(), f.value.clone())),
            &self.separator,
        )
    }
}
