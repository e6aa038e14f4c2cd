//! The JSON documents the fetch layer hands over: a page of traces and a page of annotations.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ordered_map::OrderedMap;
use crate::task_timer::TaskTimer;
use crate::types::{Annotation, ChildEntry, IdRef, ListEntry, TreeRef};

/// Top-level nodes of a tree: either a plain list or a keyed map like a span's own `nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContainerNodes {
    List(Vec<ListEntry>),
    Keyed(OrderedMap<ChildEntry>),
}

impl Default for ContainerNodes {
    fn default() -> Self {
        ContainerNodes::Keyed(OrderedMap::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeContainer {
    #[serde(default)]
    pub tree: Option<TreeRef>,
    #[serde(default)]
    pub nodes: ContainerNodes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootContainer {
    #[serde(default)]
    pub root: Option<IdRef>,
    #[serde(default)]
    pub trees: Vec<TreeContainer>,
}

/// One page of traces, in any of the shapes the tracing backend produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TracePayload {
    Roots {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        roots: Vec<RootContainer>,
    },
    Trees {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        trees: Vec<TreeContainer>,
    },
    Nodes {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        nodes: ContainerNodes,
    },
}

impl TracePayload {
    pub fn count(&self) -> Option<u64> {
        match self {
            TracePayload::Roots { count, .. }
            | TracePayload::Trees { count, .. }
            | TracePayload::Nodes { count, .. } => *count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPayload {
    #[serde(default)]
    pub count: u64,
    #[serde(default, deserialize_with = "deserialize_skipping_malformed")]
    pub annotations: Vec<Annotation>,
}

/// Deserialize a list record by record, dropping the records that don't fit `T`.
fn deserialize_skipping_malformed<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    let records = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(index, error = %err, "Dropping malformed record");
                None
            }
        })
        .collect();
    Ok(records)
}

pub fn parse_trace_payload(bytes: &[u8]) -> Result<TracePayload> {
    let t = TaskTimer::new("Parsing trace payload");

    let payload_str =
        std::str::from_utf8(bytes).map_err(|e| anyhow::anyhow!("Trace payload is not UTF8!: {}", e))?;
    let payload: TracePayload = serde_json::from_str(payload_str)
        .context("Trace payload has none of the roots/trees/nodes shapes")?;

    t.stop();
    Ok(payload)
}

pub fn parse_annotation_payload(bytes: &[u8]) -> Result<AnnotationPayload> {
    let t = TaskTimer::new("Parsing annotation payload");

    let payload_str = std::str::from_utf8(bytes)
        .map_err(|e| anyhow::anyhow!("Annotation payload is not UTF8!: {}", e))?;
    let payload: AnnotationPayload =
        serde_json::from_str(payload_str).context("Failed to parse annotation payload")?;

    t.stop();
    Ok(payload)
}
