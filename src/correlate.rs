//! Attaches annotations to the spans their links point at.

use std::collections::HashMap;

use crate::aggregate::group_annotations_by_reference_id_with_config;
use crate::config::EngineConfig;
use crate::task_timer::TaskTimer;
use crate::types::{AnnotatedTreeNode, Annotation, InvocationIds, TreeNode};

/// Whether any of the annotation's links points at exactly these ids.
/// Every link is considered, whatever its key.
pub fn annotation_matches(annotation: &Annotation, ids: &InvocationIds) -> bool {
    annotation
        .link_refs()
        .iter()
        .any(|link| link.trace_id == ids.trace_id && link.span_id == ids.span_id)
}

/// Annotation positions by trace id, then span id, of the pairs they link to.
struct AnnotationIndex<'a> {
    by_ids: HashMap<&'a str, HashMap<&'a str, Vec<usize>>>,
}

impl<'a> AnnotationIndex<'a> {
    fn new(annotations: &'a [Annotation]) -> Self {
        let mut by_ids: HashMap<&'a str, HashMap<&'a str, Vec<usize>>> = HashMap::new();
        for (position, annotation) in annotations.iter().enumerate() {
            for link in annotation.link_refs() {
                let positions = by_ids
                    .entry(link.trace_id)
                    .or_default()
                    .entry(link.span_id)
                    .or_default();
                // Two links of one annotation to the same span count once.
                if positions.last() != Some(&position) {
                    positions.push(position);
                }
            }
        }
        AnnotationIndex { by_ids }
    }

    /// Positions in input order.
    fn matching(&self, ids: &InvocationIds) -> &[usize] {
        self.by_ids
            .get(ids.trace_id.as_str())
            .and_then(|by_span| by_span.get(ids.span_id.as_str()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

pub fn attach_annotations_to_traces(
    traces: &[TreeNode],
    annotations: &[Annotation],
) -> Vec<AnnotatedTreeNode> {
    attach_annotations_to_traces_with_config(traces, annotations, &EngineConfig::default())
}

/// Attach every annotation to every node it links to, and aggregate each node's annotations.
/// The output forest has the same shape as `traces`.
pub fn attach_annotations_to_traces_with_config(
    traces: &[TreeNode],
    annotations: &[Annotation],
    config: &EngineConfig,
) -> Vec<AnnotatedTreeNode> {
    let t = TaskTimer::new("Attaching annotations");

    let index = AnnotationIndex::new(annotations);
    let mut attached = vec![false; annotations.len()];
    let annotated = traces
        .iter()
        .map(|node| annotate_node(node, &index, annotations, config, &mut attached))
        .collect();

    let unattached = attached.iter().filter(|was_attached| !**was_attached).count();
    if unattached > 0 {
        tracing::debug!(
            unattached,
            total = annotations.len(),
            "Some annotations don't link to any span of this page"
        );
    }
    t.stop();

    annotated
}

fn annotate_node(
    node: &TreeNode,
    index: &AnnotationIndex<'_>,
    annotations: &[Annotation],
    config: &EngineConfig,
    attached: &mut [bool],
) -> AnnotatedTreeNode {
    let positions: &[usize] = match &node.invocation_ids {
        Some(ids) => index.matching(ids),
        None => &[],
    };

    let mut node_annotations = Vec::with_capacity(positions.len());
    for &position in positions {
        attached[position] = true;
        node_annotations.push(annotations[position].clone());
    }

    let aggregated_evaluator_metrics =
        group_annotations_by_reference_id_with_config(&node_annotations, config);

    let children = node.children.as_ref().map(|children| {
        children
            .iter()
            .map(|child| annotate_node(child, index, annotations, config, attached))
            .collect()
    });

    AnnotatedTreeNode {
        span: node.span.clone(),
        key: node.key.clone(),
        invocation_ids: node.invocation_ids.clone(),
        children,
        annotations: node_annotations,
        aggregated_evaluator_metrics,
    }
}
