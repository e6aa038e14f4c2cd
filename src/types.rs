use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ordered_map::OrderedMap;

/// Link key used for the span an annotation was computed against.
pub const INVOCATION_LINK_KEY: &str = "invocation";

/// Parse a timestamp as sent by the tracing backend.
/// RFC 3339, or an ISO 8601 date-time without offset which is taken to be UTC.
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    if let Ok(date_time) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(date_time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn timestamp_to_unix_nano(timestamp: &str) -> Option<u64> {
    let nanos = parse_timestamp(timestamp)?.timestamp_nanos_opt()?;
    u64::try_from(nanos).ok()
}

/// Treat an explicit `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<f64>,
}

impl TimeRange {
    /// Wall-clock duration between `start` and `end`, if both parse.
    pub fn duration_ms(&self) -> Option<f64> {
        let start = parse_timestamp(self.start.as_deref()?)?;
        let end = parse_timestamp(self.end.as_deref()?)?;
        let micros = (end - start).num_microseconds()?;
        Some(micros as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanStatus {
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdRef {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeRef {
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub tree_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRef {
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    pub name: Option<String>,
}

/// The per-span fields shared by raw nodes, tree nodes and annotated tree nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: TimeRange,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: SpanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub root: IdRef,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tree: TreeRef,
    #[serde(default, deserialize_with = "null_as_default")]
    pub node: NodeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<IdRef>,
}

impl SpanRecord {
    pub fn name(&self) -> &str {
        self.node.name.as_deref().unwrap_or_default()
    }

    pub fn node_id(&self) -> &str {
        self.node.id.as_deref().unwrap_or_default()
    }

    pub fn root_id(&self) -> &str {
        self.root.id.as_deref().unwrap_or_default()
    }
}

/// A span exactly as the tracing backend sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSpanNode {
    #[serde(flatten)]
    pub span: SpanRecord,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub nodes: OrderedMap<ChildEntry>,
}

/// Value of one entry in a `nodes` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChildEntry {
    /// `null`
    Missing,
    /// Repeated invocations under the same key.
    Many(Vec<ListEntry>),
    Single(Box<RawSpanNode>),
    /// Anything that is neither a node nor a list of nodes.
    Invalid(Value),
}

/// One element of a list of nodes. A bad element is kept as `Invalid` so that the rest of the
/// list still parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListEntry {
    Missing,
    Node(Box<RawSpanNode>),
    Invalid(Value),
}

impl ListEntry {
    pub fn node(&self) -> Option<&RawSpanNode> {
        match self {
            ListEntry::Node(raw) => Some(raw.as_ref()),
            ListEntry::Missing | ListEntry::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationIds {
    pub trace_id: String,
    pub span_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub span: SpanRecord,
    /// The node's own UUID.
    pub key: String,
    #[serde(rename = "invocationIds", default, skip_serializing_if = "Option::is_none")]
    pub invocation_ids: Option<InvocationIds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
    pub fn name(&self) -> &str {
        self.span.name()
    }

    pub fn children(&self) -> &[TreeNode] {
        self.children.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationLink {
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

/// One `(trace_id, span_id)` pair an annotation points at, with the link key it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRef<'a> {
    pub key: &'a str,
    pub trace_id: &'a str,
    pub span_id: &'a str,
}

impl AnnotationLink {
    fn as_link_ref<'a>(&'a self, key: &'a str) -> Option<LinkRef<'a>> {
        Some(LinkRef {
            key,
            trace_id: self.trace_id.as_deref()?,
            span_id: self.span_id.as_deref()?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct References {
    pub evaluator: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testset: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testcase: Option<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub outputs: OrderedMap<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<AnnotationLink>,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub links: OrderedMap<Option<AnnotationLink>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub references: References,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: AnnotationData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default)]
    pub created_by_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Annotation {
    /// Every complete link pair of this annotation: all `links` entries in document order, then
    /// the single `link` object, then the top-level `trace_id`/`span_id` pair.
    /// The last two are reported under the invocation key.
    pub fn link_refs(&self) -> Vec<LinkRef<'_>> {
        let mut refs: Vec<LinkRef<'_>> = self
            .links
            .iter()
            .filter_map(|(key, link)| link.as_ref()?.as_link_ref(key))
            .collect();

        if let Some(link_ref) = self
            .link
            .as_ref()
            .and_then(|link| link.as_link_ref(INVOCATION_LINK_KEY))
        {
            refs.push(link_ref);
        }

        if let (Some(trace_id), Some(span_id)) = (&self.trace_id, &self.span_id) {
            refs.push(LinkRef {
                key: INVOCATION_LINK_KEY,
                trace_id,
                span_id,
            });
        }

        refs
    }

    /// The link to the span this annotation was computed against.
    pub fn invocation_link(&self) -> Option<LinkRef<'_>> {
        self.link_refs()
            .into_iter()
            .find(|link_ref| link_ref.key == INVOCATION_LINK_KEY)
    }

    pub fn evaluator_slug(&self) -> Option<&str> {
        self.references.evaluator.as_ref()?.slug.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricContribution {
    pub value: Value,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<bool>,
    pub annotations: Vec<MetricContribution>,
}

/// evaluator slug -> metric name -> aggregate
pub type EvaluatorMetrics = BTreeMap<String, BTreeMap<String, AggregateResult>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedTreeNode {
    #[serde(flatten)]
    pub span: SpanRecord,
    pub key: String,
    #[serde(rename = "invocationIds", default, skip_serializing_if = "Option::is_none")]
    pub invocation_ids: Option<InvocationIds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<AnnotatedTreeNode>>,
    pub annotations: Vec<Annotation>,
    #[serde(rename = "aggregatedEvaluatorMetrics")]
    pub aggregated_evaluator_metrics: EvaluatorMetrics,
}

impl AnnotatedTreeNode {
    pub fn name(&self) -> &str {
        self.span.name()
    }

    pub fn children(&self) -> &[AnnotatedTreeNode] {
        self.children.as_deref().unwrap_or_default()
    }
}

/// Human readable rendering of a JSON value, used for log lines and exported attributes.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => "empty".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(a) => format!(
            "[{}]",
            a.iter().map(value_to_text).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(o) => format!(
            "{{{}}}",
            o.iter()
                .map(|(k, v)| format!("{}: {}", k, value_to_text(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
