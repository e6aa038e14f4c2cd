//! Rolls the annotations attached to a node up into one result per (evaluator, metric).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::outputs::annotation_outputs;
use crate::types::{
    parse_timestamp, AggregateResult, Annotation, EvaluatorMetrics, MetricContribution,
};

/// One metric value taken from one annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub value: Value,
    pub user: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl MetricSample {
    fn contribution(&self) -> MetricContribution {
        MetricContribution {
            value: self.value.clone(),
            user: self.user.clone(),
        }
    }
}

pub fn group_annotations_by_reference_id(annotations: &[Annotation]) -> EvaluatorMetrics {
    group_annotations_by_reference_id_with_config(annotations, &EngineConfig::default())
}

/// Group by evaluator slug, then by metric name, and aggregate each group.
/// Annotations without an evaluator slug are skipped, and so is every group that
/// [`aggregate_metric`] can't aggregate. Evaluators left without any metric are omitted.
pub fn group_annotations_by_reference_id_with_config(
    annotations: &[Annotation],
    config: &EngineConfig,
) -> EvaluatorMetrics {
    let mut samples_by_evaluator: BTreeMap<String, BTreeMap<String, Vec<MetricSample>>> =
        BTreeMap::new();

    for annotation in annotations {
        let slug = match annotation.evaluator_slug() {
            Some(slug) if !slug.is_empty() => slug,
            _ => {
                tracing::debug!(
                    annotation_id = annotation.id.as_deref(),
                    "Skipping annotation without evaluator reference"
                );
                continue;
            }
        };

        let created_at = annotation.created_at.as_deref().and_then(parse_timestamp);
        let metrics = annotation_outputs(annotation).metrics;
        let per_metric = samples_by_evaluator.entry(slug.to_string()).or_default();
        for (metric_name, value) in metrics.iter() {
            per_metric
                .entry(metric_name.to_string())
                .or_default()
                .push(MetricSample {
                    value: value.clone(),
                    user: annotation.created_by_id.clone(),
                    created_at,
                });
        }
    }

    let mut result = EvaluatorMetrics::new();
    for (slug, per_metric) in samples_by_evaluator {
        let mut aggregated = BTreeMap::new();
        for (metric_name, samples) in per_metric {
            match aggregate_metric(&samples, config) {
                Some(aggregate) => {
                    aggregated.insert(metric_name, aggregate);
                }
                None => tracing::debug!(
                    evaluator = %slug,
                    metric = %metric_name,
                    "Metric values have mixed or unsupported types, not aggregating"
                ),
            }
        }
        if !aggregated.is_empty() {
            result.insert(slug, aggregated);
        }
    }
    result
}

/// Aggregate one (evaluator, metric) group.
///
/// All numbers: `average` of the values. All booleans: `average` with true=1/false=0, and
/// `latest` set to the value of the most recently created sample (samples without a creation
/// time count as oldest, ties go to the later sample). Anything else, or no samples at all,
/// gives `None`.
pub fn aggregate_metric(samples: &[MetricSample], config: &EngineConfig) -> Option<AggregateResult> {
    if samples.is_empty() {
        return None;
    }

    let contributions = samples.iter().map(MetricSample::contribution).collect();

    if samples.iter().all(|s| s.value.is_number()) {
        let values: Vec<f64> = samples.iter().filter_map(|s| s.value.as_f64()).collect();
        return Some(AggregateResult {
            average: Some(config.round_average(mean(&values))),
            latest: None,
            annotations: contributions,
        });
    }

    if samples.iter().all(|s| s.value.is_boolean()) {
        let values: Vec<f64> = samples
            .iter()
            .map(|s| if s.value.as_bool() == Some(true) { 1.0 } else { 0.0 })
            .collect();
        let latest = samples
            .iter()
            .max_by_key(|s| s.created_at)
            .and_then(|s| s.value.as_bool());
        return Some(AggregateResult {
            average: Some(config.round_average(mean(&values))),
            latest,
            annotations: contributions,
        });
    }

    None
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
