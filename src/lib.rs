pub mod aggregate;
pub mod config;
pub mod correlate;
pub mod id_codec;
pub mod memo;
pub mod ordered_map;
pub mod otlp;
pub mod outputs;
pub mod payload;
pub mod task_timer;
pub mod tree;
pub mod types;

pub use aggregate::{aggregate_metric, group_annotations_by_reference_id, MetricSample};
pub use config::EngineConfig;
pub use correlate::{annotation_matches, attach_annotations_to_traces};
pub use id_codec::{
    span_uuid_from_annotation, uuid_to_span_id, uuid_to_trace_id, ReconstructedSpanUuid,
};
pub use payload::{parse_annotation_payload, parse_trace_payload, AnnotationPayload, TracePayload};
pub use tree::{build_forest, transform_tree};
pub use types::{
    AggregateResult, AnnotatedTreeNode, Annotation, InvocationIds, RawSpanNode, TreeNode,
};
