use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::{json, Map, Value};
use sha2::Digest;
use uuid::Uuid;

use tracelens::id_codec::{uuid_to_span_id, uuid_to_trace_id};
use tracelens::types::{Annotation, RawSpanNode};

/// Deterministic uuid, so that test failures are reproducible.
#[allow(dead_code)]
pub fn uuid_from_seed(seed: &str) -> Uuid {
    let digest_bytes: [u8; 32] = sha2::Sha256::digest(seed).into();
    let uuid_bytes: [u8; 16] = digest_bytes[0..16].try_into().unwrap();
    Uuid::from_bytes(uuid_bytes)
}

/// Raw span JSON with the given root and node ids and no children.
#[allow(dead_code)]
pub fn span_json(root_id: Uuid, node_id: Uuid, name: &str) -> Value {
    json!({
        "time": {"start": "2024-05-01T10:00:00Z", "end": "2024-05-01T10:00:01.500Z"},
        "status": {"code": "OK"},
        "root": {"id": root_id.to_string()},
        "tree": {"id": root_id.to_string()},
        "node": {"id": node_id.to_string(), "type": "task", "name": name},
        "nodes": {}
    })
}

/// Replace the `nodes` map of a span JSON.
#[allow(dead_code)]
pub fn with_nodes(mut span: Value, nodes: Value) -> Value {
    span["nodes"] = nodes;
    span
}

#[allow(dead_code)]
pub fn raw_node(value: Value) -> RawSpanNode {
    serde_json::from_value(value).expect("test span JSON should deserialize")
}

/// A root container whose `nodes` map holds the given entries.
#[allow(dead_code)]
pub fn container(nodes: Value) -> RawSpanNode {
    raw_node(json!({ "nodes": nodes }))
}

#[allow(dead_code)]
pub fn wire_ids(root_id: Uuid, node_id: Uuid) -> (String, String) {
    (
        uuid_to_trace_id(&root_id.to_string()).unwrap(),
        uuid_to_span_id(&node_id.to_string()).unwrap(),
    )
}

/// Annotation linking to one span under the `invocation` key.
#[allow(dead_code)]
pub fn annotation_json(
    evaluator: Option<&str>,
    trace_id: &str,
    span_id: &str,
    outputs: Value,
) -> Value {
    let mut annotation = json!({
        "links": {"invocation": {"trace_id": trace_id, "span_id": span_id}},
        "data": {"outputs": outputs},
        "created_by_id": "user-1",
        "created_at": "2024-05-01T12:00:00Z"
    });
    if let Some(slug) = evaluator {
        annotation["references"] = json!({"evaluator": {"slug": slug}});
    }
    annotation
}

#[allow(dead_code)]
pub fn annotation(value: Value) -> Annotation {
    serde_json::from_value(value).expect("test annotation JSON should deserialize")
}

/// Annotation from `evaluator` with a single metric under pre-split outputs.
#[allow(dead_code)]
pub fn metric_annotation(evaluator: &str, metric: &str, value: Value, created_at: &str) -> Annotation {
    let mut metrics = Map::new();
    metrics.insert(metric.to_string(), value);
    let mut json = annotation_json(
        Some(evaluator),
        "00000000000000000000000000000001",
        "0000000000000001",
        json!({ "metrics": metrics }),
    );
    json["created_at"] = json!(created_at);
    annotation(json)
}

/// A random container with a few levels of single and fan-out children.
/// Returns the container together with the number of spans in it.
#[allow(dead_code)]
pub fn random_container(seed: u64, max_depth: usize) -> (RawSpanNode, usize) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let root_id = Uuid::from_bytes(rng.random());
    let mut count = 0;
    let nodes = random_nodes(&mut rng, root_id, max_depth, &mut count);
    (container(nodes), count)
}

#[allow(dead_code)]
fn random_nodes(rng: &mut ChaCha20Rng, root_id: Uuid, depth: usize, count: &mut usize) -> Value {
    let mut nodes = Map::new();
    if depth == 0 {
        return Value::Object(nodes);
    }
    let key_count = rng.random_range(1..4);
    for key_idx in 0..key_count {
        let key = format!("step_{key_idx}");
        let fan_out = rng.random_range(0..4) == 0;
        let entry = if fan_out {
            let length = rng.random_range(2..4);
            let list = (0..length)
                .map(|_| random_span(rng, root_id, &key, depth, count))
                .collect();
            Value::Array(list)
        } else {
            random_span(rng, root_id, &key, depth, count)
        };
        nodes.insert(key, entry);
    }
    Value::Object(nodes)
}

#[allow(dead_code)]
fn random_span(
    rng: &mut ChaCha20Rng,
    root_id: Uuid,
    name: &str,
    depth: usize,
    count: &mut usize,
) -> Value {
    *count += 1;
    let node_id = Uuid::from_bytes(rng.random());
    let children = random_nodes(rng, root_id, depth - 1, count);
    with_nodes(span_json(root_id, node_id, name), children)
}
