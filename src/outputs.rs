use serde_json::Value;

use crate::ordered_map::OrderedMap;
use crate::types::Annotation;

const SPLIT_KEYS: [&str; 3] = ["metrics", "notes", "extra"];

/// An annotation's outputs, split by value type.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SplitOutputs {
    /// Numbers and booleans.
    pub metrics: OrderedMap<Value>,
    /// Strings.
    pub notes: OrderedMap<Value>,
    /// Everything else.
    pub extra: OrderedMap<Value>,
}

/// Split raw outputs: number/boolean -> metrics, string -> notes, anything else -> extra.
pub fn split_outputs(outputs: &OrderedMap<Value>) -> SplitOutputs {
    let mut split = SplitOutputs::default();
    for (name, value) in outputs.iter() {
        let target = match value {
            Value::Number(_) | Value::Bool(_) => &mut split.metrics,
            Value::String(_) => &mut split.notes,
            _ => &mut split.extra,
        };
        target.insert(name, value.clone());
    }
    split
}

/// Outputs that already went through the split upstream only have `metrics`/`notes`/`extra`
/// keys, and at least one of them holds an object. Any other key means the outputs are raw,
/// even when one of them happens to be called `extra`.
pub fn is_presplit(outputs: &OrderedMap<Value>) -> bool {
    outputs
        .keys()
        .all(|key| SPLIT_KEYS.iter().any(|split_key| *split_key == key))
        && SPLIT_KEYS
            .iter()
            .any(|key| matches!(outputs.get(key), Some(Value::Object(_))))
}

/// The split outputs of an annotation. Pre-split outputs are taken as they are, including any
/// non-numeric values that ended up under `metrics`.
pub fn annotation_outputs(annotation: &Annotation) -> SplitOutputs {
    let outputs = &annotation.data.outputs;
    if !is_presplit(outputs) {
        return split_outputs(outputs);
    }

    let section = |key: &str| -> OrderedMap<Value> {
        match outputs.get(key) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            _ => OrderedMap::new(),
        }
    };

    SplitOutputs {
        metrics: section("metrics"),
        notes: section("notes"),
        extra: section("extra"),
    }
}
