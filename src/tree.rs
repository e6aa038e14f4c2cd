//! Turns the backend's nested `nodes` maps into a forest of [`TreeNode`]s.
//!
//! A `nodes` entry is either one child or a list of children that ran under the same key.
//! Each entry is expanded once into `(node, name)` pairs, and everything below that point only
//! deals with a uniform list of children.

use crate::config::EngineConfig;
use crate::id_codec::invocation_ids;
use crate::ordered_map::OrderedMap;
use crate::payload::{ContainerNodes, TracePayload, TreeContainer};
use crate::task_timer::TaskTimer;
use crate::types::{ChildEntry, ListEntry, RawSpanNode, TreeNode};

/// Transform the `nodes` map of a root container (or of any raw span) with the default config.
pub fn transform_tree(container: &RawSpanNode) -> Vec<TreeNode> {
    transform_node_map(&container.nodes, &EngineConfig::default())
}

/// Transform a single raw span and everything below it.
pub fn transform_node(raw: &RawSpanNode, config: &EngineConfig) -> TreeNode {
    build_tree_node(raw, None, config)
}

/// Transform every entry of a `nodes` map, in key order, then list order within a key.
pub fn transform_node_map(nodes: &OrderedMap<ChildEntry>, config: &EngineConfig) -> Vec<TreeNode> {
    let mut tree_nodes = Vec::with_capacity(nodes.len());
    for (key, entry) in nodes.iter() {
        for (raw, name_override) in expand_entry(key, entry, config) {
            tree_nodes.push(build_tree_node(raw, name_override, config));
        }
    }
    tree_nodes
}

/// Build the forest for a whole page of traces.
pub fn build_forest(payload: &TracePayload) -> Vec<TreeNode> {
    build_forest_with_config(payload, &EngineConfig::default())
}

pub fn build_forest_with_config(payload: &TracePayload, config: &EngineConfig) -> Vec<TreeNode> {
    let t = TaskTimer::new("Building trace forest");

    let mut forest = Vec::new();
    match payload {
        TracePayload::Roots { roots, .. } => {
            for root in roots {
                for tree in &root.trees {
                    forest.extend(transform_container(tree, config));
                }
            }
        }
        TracePayload::Trees { trees, .. } => {
            for tree in trees {
                forest.extend(transform_container(tree, config));
            }
        }
        TracePayload::Nodes { nodes, .. } => {
            forest.extend(transform_container_nodes(nodes, config));
        }
    }

    tracing::debug!(
        top_level = forest.len(),
        total = count_nodes(&forest),
        "Built trace forest"
    );
    t.stop();

    forest
}

pub fn transform_container(container: &TreeContainer, config: &EngineConfig) -> Vec<TreeNode> {
    transform_container_nodes(&container.nodes, config)
}

fn transform_container_nodes(nodes: &ContainerNodes, config: &EngineConfig) -> Vec<TreeNode> {
    match nodes {
        // A bare node is its own single-node tree.
        ContainerNodes::List(list) => list_nodes("<top level>", list)
            .into_iter()
            .map(|(_, raw)| build_tree_node(raw, None, config))
            .collect(),
        ContainerNodes::Keyed(map) => transform_node_map(map, config),
    }
}

/// Resolve one `nodes` entry into the raw spans it holds, with the name each of them should get.
/// `None` keeps the span's own name.
fn expand_entry<'a>(
    key: &str,
    entry: &'a ChildEntry,
    config: &EngineConfig,
) -> Vec<(&'a RawSpanNode, Option<String>)> {
    match entry {
        ChildEntry::Single(raw) => vec![(raw.as_ref(), None)],
        ChildEntry::Many(list) => {
            let add_suffix = list.len() > 1 || config.suffix_single_fan_out;
            list_nodes(key, list)
                .into_iter()
                .map(|(index, raw)| {
                    let name = add_suffix.then(|| format!("{}[{}]", raw.span.name(), index));
                    (raw, name)
                })
                .collect()
        }
        ChildEntry::Missing => {
            tracing::debug!(key, "Skipping null child node");
            vec![]
        }
        ChildEntry::Invalid(value) => {
            tracing::warn!(key, %value, "Dropping child that is neither a node nor a list of nodes");
            vec![]
        }
    }
}

/// The usable nodes of a list with their original positions. Null and malformed elements are
/// skipped one by one.
fn list_nodes<'a>(key: &str, list: &'a [ListEntry]) -> Vec<(usize, &'a RawSpanNode)> {
    list.iter()
        .enumerate()
        .filter_map(|(index, entry)| match entry {
            ListEntry::Node(raw) => Some((index, raw.as_ref())),
            ListEntry::Missing => {
                tracing::debug!(key, index, "Skipping null entry in node list");
                None
            }
            ListEntry::Invalid(value) => {
                tracing::warn!(key, index, %value, "Dropping malformed entry in node list");
                None
            }
        })
        .collect()
}

fn build_tree_node(
    raw: &RawSpanNode,
    name_override: Option<String>,
    config: &EngineConfig,
) -> TreeNode {
    let mut span = raw.span.clone();
    if let Some(name) = name_override {
        span.node.name = Some(name);
    }

    let invocation_ids = invocation_ids(span.root_id(), span.node_id());
    if invocation_ids.is_none() {
        tracing::debug!(
            root_id = span.root_id(),
            node_id = span.node_id(),
            "Span has no usable invocation ids, it won't match any annotation"
        );
    }

    let children = if raw.nodes.is_empty() {
        None
    } else {
        Some(transform_node_map(&raw.nodes, config))
    };

    TreeNode {
        key: span.node_id().to_string(),
        span,
        invocation_ids,
        children,
    }
}

/// Number of nodes in the forest, children included.
pub fn count_nodes(forest: &[TreeNode]) -> usize {
    forest
        .iter()
        .map(|node| 1 + count_nodes(node.children()))
        .sum()
}

/// All nodes of the forest in pre-order.
pub fn flatten(forest: &[TreeNode]) -> Vec<&TreeNode> {
    let mut collected = Vec::new();
    for node in forest {
        collect_descendants(node, &mut collected);
    }
    collected
}

fn collect_descendants<'a>(node: &'a TreeNode, collected: &mut Vec<&'a TreeNode>) {
    collected.push(node);
    for child in node.children() {
        collect_descendants(child, collected);
    }
}

/// First node (pre-order) whose key is `key`.
pub fn find_by_key<'a>(forest: &'a [TreeNode], key: &str) -> Option<&'a TreeNode> {
    for node in forest {
        if node.key == key {
            return Some(node);
        }
        if let Some(found) = find_by_key(node.children(), key) {
            return Some(found);
        }
    }
    None
}
