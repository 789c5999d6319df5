use serde_json::{Map, Value};

use super::field::Field;
use super::store::{insert_path, key_segments, FieldStore};

/// Call-scoped temporary variables bound by `call_method ... -> name`.
pub type TempVars = Map<String, Value>;

/// Read-only evaluation context for one expression.
///
/// Names resolve, highest priority first, to:
/// `values` (flat key → value), `f`/`fields` (per-field views), temporary
/// variables, then the nested value tree.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    store: &'a FieldStore,
    temps: &'a TempVars,
}

impl<'a> Scope<'a> {
    #[must_use]
    pub fn new(store: &'a FieldStore, temps: &'a TempVars) -> Self {
        Self { store, temps }
    }

    #[must_use]
    pub fn store(&self) -> &'a FieldStore {
        self.store
    }

    #[must_use]
    pub fn temps(&self) -> &'a TempVars {
        self.temps
    }

    /// Resolve a dotted name chain such as `app.region`, `f.region.options`
    /// or `temp_result.data`. Returns `None` if nothing answers to it.
    #[must_use]
    pub fn resolve(&self, path: &[&str]) -> Option<Value> {
        let (first, rest) = path.split_first()?;
        match *first {
            "values" => self.resolve_field(rest, Field::value_json),
            "f" | "fields" => self.resolve_field(rest, Field::view),
            name => {
                if let Some(temp) = self.temps.get(name) {
                    return traverse(temp, rest).cloned();
                }
                let root = self.store.tree().get(name)?;
                traverse(root, rest).cloned()
            }
        }
    }

    /// Field lookup behind `values.*` and `f.*`.
    ///
    /// With no segments the whole flat map is returned. Otherwise the
    /// longest run of leading segments naming a field key wins and the
    /// remaining segments index into the looked-up value. If no key
    /// matches, the segments name a group of keys and the result is the
    /// nested tree of everything under that prefix.
    fn resolve_field(&self, segments: &[&str], project: fn(&Field) -> Value) -> Option<Value> {
        let sep = self.store.separator();
        if segments.is_empty() {
            let all = self
                .store
                .iter()
                .map(|f| (f.key().to_owned(), project(f)))
                .collect();
            return Some(Value::Object(all));
        }
        for split in (1..=segments.len()).rev() {
            let key = segments[..split].join(sep);
            if let Some(field) = self.store.get(&key) {
                return traverse(&project(field), &segments[split..]).cloned();
            }
        }

        let prefix = format!("{}{sep}", segments.join(sep));
        let mut group = Map::new();
        for field in self.store.iter() {
            if let Some(tail) = field.key().strip_prefix(&prefix) {
                insert_path(&mut group, &key_segments(tail, sep), project(field));
            }
        }
        if group.is_empty() {
            None
        } else {
            Some(Value::Object(group))
        }
    }
}

/// Follow object keys from `value` along `segments`.
#[must_use]
pub fn traverse<'v>(value: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    match segments {
        [] => Some(value),
        [first, rest @ ..] => match value {
            Value::Object(map) => traverse(map.get(*first)?, rest),
            _ => None,
        },
    }
}
