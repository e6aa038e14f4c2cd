//! Conversion between the backend's UUID node ids and OpenTelemetry style trace/span ids.
//!
//! A trace id is the full 128 bits of the root UUID, so that direction is lossless. A span id only
//! has room for 64 bits: it keeps the clock-sequence bytes and the node field (the last 8 bytes
//! of the UUID). Span ids only need to be unique inside their trace.

use std::fmt;

use uuid::Uuid;

use crate::types::{Annotation, InvocationIds};

fn parse_uuid(uuid: &str) -> Option<Uuid> {
    if uuid.is_empty() {
        return None;
    }
    Uuid::try_parse(uuid).ok()
}

/// 32 lowercase hex characters, or `None` if `uuid` isn't a UUID.
pub fn uuid_to_trace_id(uuid: &str) -> Option<String> {
    let uuid = parse_uuid(uuid)?;
    Some(hex::encode(uuid.as_bytes()))
}

/// 16 lowercase hex characters made of clock_seq_hi_and_reserved, clock_seq_low and node.
pub fn uuid_to_span_id(uuid: &str) -> Option<String> {
    let uuid = parse_uuid(uuid)?;
    Some(hex::encode(&uuid.as_bytes()[8..16]))
}

/// Both ids, or `None` if either one can't be derived.
pub fn invocation_ids(root_id: &str, node_id: &str) -> Option<InvocationIds> {
    Some(InvocationIds {
        trace_id: uuid_to_trace_id(root_id)?,
        span_id: uuid_to_span_id(node_id)?,
    })
}

/// A UUID-shaped string rebuilt from an annotation's invocation link.
///
/// Only the span UUID's low 64 bits survive the round trip. The high 64 bits are filled in from
/// the low half of the trace id, so callers must not treat `value` as the span's real UUID.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReconstructedSpanUuid {
    pub value: String,
    pub lossy: bool,
}

impl ReconstructedSpanUuid {
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::try_parse(&self.value).ok()
    }
}

impl fmt::Display for ReconstructedSpanUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Rebuild `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` from the invocation link: the last 16 hex
/// characters of the trace id form the first three groups, the span id forms the last two.
pub fn span_uuid_from_annotation(annotation: &Annotation) -> Option<ReconstructedSpanUuid> {
    let link = annotation.invocation_link()?;
    let trace_id = link.trace_id;
    let span_id = link.span_id;

    let is_hex = |s: &str| s.chars().all(|c| c.is_ascii_hexdigit());
    if trace_id.len() < 16 || span_id.len() != 16 || !is_hex(trace_id) || !is_hex(span_id) {
        tracing::debug!(
            trace_id,
            span_id,
            "Invocation link is not in wire format, can't rebuild span uuid"
        );
        return None;
    }

    let tail = &trace_id[trace_id.len() - 16..];
    let value = format!(
        "{}-{}-{}-{}-{}",
        &tail[0..8],
        &tail[8..12],
        &tail[12..16],
        &span_id[0..4],
        &span_id[4..16]
    );

    Some(ReconstructedSpanUuid { value, lossy: true })
}
