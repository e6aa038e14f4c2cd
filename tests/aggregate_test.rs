use approx::assert_abs_diff_eq;
use serde_json::json;
use tracelens::aggregate::{aggregate_metric, group_annotations_by_reference_id, MetricSample};
use tracelens::config::EngineConfig;
use tracelens::outputs::{annotation_outputs, is_presplit, split_outputs};
use tracelens::types::{parse_timestamp, MetricContribution};

mod test_helpers;
use test_helpers::{annotation, annotation_json, metric_annotation};

#[test]
fn test_numeric_average() {
    let annotations = vec![
        metric_annotation("judge", "score", json!(1), "2024-05-01T12:00:00Z"),
        metric_annotation("judge", "score", json!(2), "2024-05-01T12:01:00Z"),
        metric_annotation("judge", "score", json!(3), "2024-05-01T12:02:00Z"),
    ];

    let grouped = group_annotations_by_reference_id(&annotations);

    let score = &grouped["judge"]["score"];
    assert_eq!(score.average, Some(2.0));
    assert_eq!(score.latest, None);
    assert_eq!(score.annotations.len(), 3);
    assert_eq!(
        score.annotations[0],
        MetricContribution {
            value: json!(1),
            user: Some("user-1".to_string()),
        }
    );
}

#[test]
fn test_boolean_average_and_latest() {
    let annotations = vec![
        metric_annotation("judge", "correct", json!(true), "2024-05-01T12:00:00Z"),
        metric_annotation("judge", "correct", json!(false), "2024-05-01T12:05:00Z"),
        metric_annotation("judge", "correct", json!(true), "2024-05-01T12:01:00Z"),
    ];

    let grouped = group_annotations_by_reference_id(&annotations);

    let correct = &grouped["judge"]["correct"];
    assert_abs_diff_eq!(correct.average.unwrap(), 0.67, epsilon = 1e-12);
    // The false one was created last.
    assert_eq!(correct.latest, Some(false));
    assert_eq!(correct.annotations.len(), 3);
}

#[test]
fn test_latest_ties_go_to_later_annotation() {
    let samples = vec![
        MetricSample {
            value: json!(true),
            user: None,
            created_at: parse_timestamp("2024-05-01T12:00:00Z"),
        },
        MetricSample {
            value: json!(false),
            user: None,
            created_at: parse_timestamp("2024-05-01T12:00:00Z"),
        },
        MetricSample {
            value: json!(true),
            user: None,
            created_at: None,
        },
    ];

    let aggregate = aggregate_metric(&samples, &EngineConfig::default()).unwrap();
    assert_eq!(aggregate.latest, Some(false));
}

#[test]
fn test_mixed_types_are_excluded() {
    let annotations = vec![
        metric_annotation("judge", "score", json!(1), "2024-05-01T12:00:00Z"),
        metric_annotation("judge", "score", json!("x"), "2024-05-01T12:01:00Z"),
        metric_annotation("judge", "length", json!(10), "2024-05-01T12:01:00Z"),
    ];

    let grouped = group_annotations_by_reference_id(&annotations);

    assert!(!grouped["judge"].contains_key("score"));
    assert_eq!(grouped["judge"]["length"].average, Some(10.0));
}

#[test]
fn test_number_and_boolean_mix_is_excluded() {
    let annotations = vec![
        metric_annotation("judge", "score", json!(1), "2024-05-01T12:00:00Z"),
        metric_annotation("judge", "score", json!(true), "2024-05-01T12:01:00Z"),
    ];

    let grouped = group_annotations_by_reference_id(&annotations);
    // Nothing left for the evaluator, so it isn't listed either.
    assert!(!grouped.contains_key("judge"));
}

#[test]
fn test_annotation_without_evaluator_is_skipped() {
    let mut no_slug = annotation_json(None, "t", "s", json!({"score": 5}));
    no_slug["references"] = json!({"evaluator": {"id": "0190c1c5-6e1a-7b3e-9f2d-4c5b6a7d8e9f"}});
    let annotations = vec![
        annotation(annotation_json(None, "t", "s", json!({"score": 5}))),
        annotation(no_slug),
        metric_annotation("judge", "score", json!(1), "2024-05-01T12:00:00Z"),
    ];

    let grouped = group_annotations_by_reference_id(&annotations);

    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped["judge"]["score"].annotations.len(), 1);
    assert_eq!(grouped["judge"]["score"].average, Some(1.0));
}

#[test]
fn test_groups_by_evaluator_then_metric() {
    let annotations = vec![
        annotation(annotation_json(
            Some("judge"),
            "t",
            "s",
            json!({"score": 0.5, "passed": true, "reason": "fine"}),
        )),
        annotation(annotation_json(
            Some("human"),
            "t",
            "s",
            json!({"score": 0.9, "comment": "nice", "tags": ["a", "b"]}),
        )),
        annotation(annotation_json(Some("judge"), "t", "s", json!({"score": 0.25}))),
    ];

    let grouped = group_annotations_by_reference_id(&annotations);

    let evaluators: Vec<_> = grouped.keys().cloned().collect();
    assert_eq!(evaluators, vec!["human", "judge"]);
    // Strings and lists are notes and extra, not metrics.
    let human_metrics: Vec<_> = grouped["human"].keys().cloned().collect();
    assert_eq!(human_metrics, vec!["score"]);
    let judge_metrics: Vec<_> = grouped["judge"].keys().cloned().collect();
    assert_eq!(judge_metrics, vec!["passed", "score"]);

    assert_eq!(grouped["judge"]["score"].average, Some(0.38));
    assert_eq!(grouped["judge"]["passed"].average, Some(1.0));
    assert_eq!(grouped["judge"]["passed"].latest, Some(true));
}

#[test]
fn test_average_decimals_are_configurable() {
    let samples: Vec<_> = [1, 1, 2]
        .iter()
        .map(|v| MetricSample {
            value: json!(v),
            user: None,
            created_at: None,
        })
        .collect();

    let two = aggregate_metric(&samples, &EngineConfig::default()).unwrap();
    assert_eq!(two.average, Some(1.33));

    let config = EngineConfig {
        average_decimals: 4,
        ..EngineConfig::default()
    };
    let four = aggregate_metric(&samples, &config).unwrap();
    assert_eq!(four.average, Some(1.3333));
}

#[test]
fn test_empty_group_gives_nothing() {
    assert!(aggregate_metric(&[], &EngineConfig::default()).is_none());
    assert!(group_annotations_by_reference_id(&[]).is_empty());
}

#[test]
fn test_split_outputs_by_value_type() {
    let annotation = annotation(annotation_json(
        Some("judge"),
        "t",
        "s",
        json!({"score": 3, "ok": false, "note": "hm", "details": {"a": 1}, "nothing": null}),
    ));

    let split = split_outputs(&annotation.data.outputs);
    let metrics: Vec<_> = split.metrics.keys().collect();
    let notes: Vec<_> = split.notes.keys().collect();
    let mut extra: Vec<_> = split.extra.keys().collect();
    extra.sort();

    assert_eq!(metrics.len(), 2);
    assert!(metrics.contains(&"score") && metrics.contains(&"ok"));
    assert_eq!(notes, vec!["note"]);
    assert_eq!(extra, vec!["details", "nothing"]);
}

#[test]
fn test_presplit_outputs_are_used_as_given() {
    let annotation = annotation(annotation_json(
        Some("judge"),
        "t",
        "s",
        json!({"metrics": {"score": 4, "label": "odd"}, "notes": {"why": "because"}}),
    ));

    let outputs = annotation_outputs(&annotation);
    assert_eq!(outputs.metrics.get("score"), Some(&json!(4)));
    assert_eq!(outputs.metrics.get("label"), Some(&json!("odd")));
    assert_eq!(outputs.notes.get("why"), Some(&json!("because")));
    assert!(outputs.extra.is_empty());
}

#[test]
fn test_raw_outputs_with_an_extra_key_are_still_split() {
    let annotation = annotation(annotation_json(
        Some("judge"),
        "t",
        "s",
        json!({"score": 3, "extra": {"reason": "long"}}),
    ));

    assert!(!is_presplit(&annotation.data.outputs));
    let outputs = annotation_outputs(&annotation);
    assert_eq!(outputs.metrics.get("score"), Some(&json!(3)));
    assert_eq!(outputs.extra.get("extra"), Some(&json!({"reason": "long"})));

    let grouped = group_annotations_by_reference_id(&[annotation]);
    assert_eq!(grouped["judge"]["score"].average, Some(3.0));
}

#[test]
fn test_huge_decimals_config_keeps_averages_finite() {
    let samples: Vec<_> = [1, 2]
        .iter()
        .map(|v| MetricSample {
            value: json!(v),
            user: None,
            created_at: None,
        })
        .collect();
    let config = EngineConfig::from_json_str(r#"{"average_decimals": 4294967295}"#).unwrap();

    let aggregate = aggregate_metric(&samples, &config).unwrap();
    assert_eq!(aggregate.average, Some(1.5));
    assert_eq!(config.round_average(1.0 / 3.0), (1.0f64 / 3.0 * 1e15).round() / 1e15);
}
