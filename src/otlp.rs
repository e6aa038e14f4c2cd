//! Export of a reconstructed forest as an OpenTelemetry trace export request, with trace and
//! span ids in their wire format.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value as ProtoValue;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, ArrayValue, InstrumentationScope, KeyValue, KeyValueList,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::span::{Event, SpanKind};
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, Status};
use serde_json::Value;

use crate::types::{timestamp_to_unix_nano, value_to_text, SpanStatus, TreeNode};

const SCOPE_NAME: &str = "tracelens";

/// Convert a forest into one export request holding every span with usable invocation ids.
/// A node without ids is left out and its children are attached to its closest exported
/// ancestor.
pub fn forest_to_otlp(forest: &[TreeNode], service_name: &str) -> ExportTraceServiceRequest {
    let mut spans = Vec::new();
    for node in forest {
        collect_spans(node, &[], &mut spans);
    }

    let resource = Resource {
        attributes: vec![string_attribute("service.name", service_name)],
        ..Default::default()
    };
    let scope = InstrumentationScope {
        name: SCOPE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ..Default::default()
    };

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(resource),
            scope_spans: vec![ScopeSpans {
                scope: Some(scope),
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn collect_spans(node: &TreeNode, parent_span_id: &[u8], spans: &mut Vec<Span>) {
    match to_proto_span(node, parent_span_id) {
        Some(span) => {
            let span_id = span.span_id.clone();
            spans.push(span);
            for child in node.children() {
                collect_spans(child, &span_id, spans);
            }
        }
        None => {
            tracing::debug!(key = %node.key, "Span has no wire ids, not exporting it");
            for child in node.children() {
                collect_spans(child, parent_span_id, spans);
            }
        }
    }
}

fn to_proto_span(node: &TreeNode, parent_span_id: &[u8]) -> Option<Span> {
    let ids = node.invocation_ids.as_ref()?;
    let trace_id = hex::decode(&ids.trace_id).ok()?;
    let span_id = hex::decode(&ids.span_id).ok()?;

    let record = &node.span;
    let start_time_unix_nano = record
        .time
        .start
        .as_deref()
        .and_then(timestamp_to_unix_nano)
        .unwrap_or_default();
    let end_time_unix_nano = record
        .time
        .end
        .as_deref()
        .and_then(timestamp_to_unix_nano)
        .unwrap_or(start_time_unix_nano);

    let mut attributes = vec![string_attribute("tracelens.node.key", &node.key)];
    if let Some(node_type) = &record.node.node_type {
        attributes.push(string_attribute("tracelens.node.type", node_type));
    }
    if let Some(tree_id) = &record.tree.id {
        attributes.push(string_attribute("tracelens.tree.id", tree_id));
    }
    for (key, value) in [
        ("tracelens.data", &record.data),
        ("tracelens.metrics", &record.metrics),
        ("tracelens.meta", &record.meta),
        ("tracelens.refs", &record.refs),
    ] {
        if let Some(value) = value {
            attributes.push(KeyValue {
                key: key.to_string(),
                value: Some(json_to_any_value(value)),
            });
        }
    }

    let events = record
        .exception
        .iter()
        .map(|exception| Event {
            time_unix_nano: end_time_unix_nano,
            name: "exception".to_string(),
            attributes: vec![string_attribute(
                "exception.message",
                &value_to_text(exception),
            )],
            ..Default::default()
        })
        .collect();

    Some(Span {
        trace_id,
        span_id,
        parent_span_id: parent_span_id.to_vec(),
        name: node.name().to_string(),
        kind: SpanKind::Internal as i32,
        start_time_unix_nano,
        end_time_unix_nano,
        attributes,
        events,
        status: Some(to_proto_status(&record.status)),
        ..Default::default()
    })
}

fn to_proto_status(status: &SpanStatus) -> Status {
    let code = match status.code.as_deref() {
        Some("OK") | Some("STATUS_CODE_OK") => StatusCode::Ok,
        Some("ERROR") | Some("STATUS_CODE_ERROR") => StatusCode::Error,
        _ => StatusCode::Unset,
    };
    Status {
        message: status.message.clone().unwrap_or_default(),
        code: code as i32,
    }
}

fn string_attribute(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(ProtoValue::StringValue(value.to_string())),
        }),
    }
}

/// Map a JSON value onto the closest OpenTelemetry attribute value.
pub fn json_to_any_value(value: &Value) -> AnyValue {
    let value = match value {
        Value::Null => None,
        Value::Bool(b) => Some(ProtoValue::BoolValue(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(ProtoValue::IntValue(i)),
            None => n.as_f64().map(ProtoValue::DoubleValue),
        },
        Value::String(s) => Some(ProtoValue::StringValue(s.clone())),
        Value::Array(a) => Some(ProtoValue::ArrayValue(ArrayValue {
            values: a.iter().map(json_to_any_value).collect(),
        })),
        Value::Object(o) => Some(ProtoValue::KvlistValue(KeyValueList {
            values: o
                .iter()
                .map(|(k, v)| KeyValue {
                    key: k.clone(),
                    value: Some(json_to_any_value(v)),
                })
                .collect(),
        })),
    };
    AnyValue { value }
}
