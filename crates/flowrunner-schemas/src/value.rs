// Dynamic map-typed values.
//
// Step inputs/outputs/parameters and the execution variable scope are all
// free-form key/value dictionaries in the source system. We model that as
// a thin wrapper over `serde_json::Value` rather than a bespoke tagged
// enum — it is already the tagged (string/number/bool/list/map/null)
// container the spec asks for, and it is the container the rest of the
// ecosystem already speaks.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A schemaless key/value scope: step parameters, step input/output,
/// execution variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueMap(pub HashMap<String, Value>);

impl ValueMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Merge `other` into `self`, with `other`'s keys overwriting `self`'s.
    /// This is the primitive behind input composition (§4.2 step 4) and
    /// output-mapping merges (§4.2 step 7).
    pub fn merged_with(mut self, other: &ValueMap) -> Self {
        for (k, v) in other.0.iter() {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }

    /// Project a subset of keys through a rename mapping: `mapping` is
    /// `dest_key -> source_key`. Unmapped keys are dropped, matching
    /// `output_mapping`'s "mapped keys overwrite; unmapped keys are not
    /// auto-merged" semantics (§4.2 step 7).
    pub fn project(&self, mapping: &HashMap<String, String>) -> ValueMap {
        let mut out = HashMap::with_capacity(mapping.len());
        for (dest, source) in mapping {
            if let Some(v) = self.0.get(source) {
                out.insert(dest.clone(), v.clone());
            }
        }
        ValueMap(out)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }
}

impl From<HashMap<String, Value>> for ValueMap {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ValueMap> for HashMap<String, Value> {
    fn from(map: ValueMap) -> Self {
        map.0
    }
}

impl Deref for ValueMap {
    type Target = HashMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ValueMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(HashMap::from_iter(iter))
    }
}
