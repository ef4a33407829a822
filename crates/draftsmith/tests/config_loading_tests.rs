//! Table-driven tests for configuration loading and validation, plus a
//! file-loaded config driving a running engine.

mod common;

use std::io::Write;

use common::{article_responder, TestHarness};
use draftsmith::config::{load_config, load_config_from_str, ConfigFormat};
use draftsmith::job::JobStatus;
use draftsmith::pipeline::{ContentRequest, GenerationMode};
use draftsmith::provider::ScriptedProvider;

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{
            "version": "1.0",
            "providers": [{ "provider_id": "primary", "model_id": "large" }]
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "worker_count": 4,
            "job_timeout_secs": 600,
            "providers": [
                { "provider_id": "primary", "priority": 1, "model_id": "large" },
                { "provider_id": "backup", "priority": 2, "model_id": "small" }
            ],
            "router": {
                "max_retries": 2,
                "initial_backoff_ms": 100,
                "max_backoff_ms": 2000,
                "backoff_multiplier": 2.0,
                "call_timeout_secs": 30
            },
            "consensus": { "enabled": true, "top_k": 2, "timeout_secs": 60 },
            "pipeline": {
                "default_mode": "quick",
                "default_target_words": 1200,
                "min_target_words": 300,
                "max_target_words": 4000
            },
            "citations": { "min_authority": 40, "max_citations": 5 },
            "logging": { "level": "debug", "json": true }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "invalid_version",
        config_json: r#"{
            "version": "2.0",
            "providers": [{ "provider_id": "primary", "model_id": "large" }]
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "invalid_unknown_field",
        config_json: r#"{
            "version": "1.0",
            "providers": [{ "provider_id": "primary", "model_id": "large" }],
            "temperature": 0.7
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "invalid_no_enabled_provider",
        config_json: r#"{
            "version": "1.0",
            "providers": [{ "provider_id": "primary", "model_id": "large", "enabled": false }]
        }"#,
        should_succeed: false,
        expected_error: Some("At least one provider must be enabled"),
    },
    ConfigTestCase {
        name: "invalid_duplicate_provider",
        config_json: r#"{
            "version": "1.0",
            "providers": [
                { "provider_id": "primary", "model_id": "large" },
                { "provider_id": "primary", "model_id": "small" }
            ]
        }"#,
        should_succeed: false,
        expected_error: Some("listed more than once"),
    },
    ConfigTestCase {
        name: "invalid_consensus_top_k",
        config_json: r#"{
            "version": "1.0",
            "providers": [{ "provider_id": "primary", "model_id": "large" }],
            "consensus": { "enabled": true, "top_k": 1 }
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "invalid_target_word_order",
        config_json: r#"{
            "version": "1.0",
            "providers": [{ "provider_id": "primary", "model_id": "large" }],
            "pipeline": {
                "default_target_words": 200,
                "min_target_words": 300,
                "max_target_words": 4000
            }
        }"#,
        should_succeed: false,
        expected_error: Some("pipeline target words"),
    },
    ConfigTestCase {
        name: "invalid_backoff_window",
        config_json: r#"{
            "version": "1.0",
            "providers": [{ "provider_id": "primary", "model_id": "large" }],
            "router": { "initial_backoff_ms": 5000, "max_backoff_ms": 1000 }
        }"#,
        should_succeed: false,
        expected_error: Some("initial_backoff_ms"),
    },
    ConfigTestCase {
        name: "invalid_json",
        config_json: r#"{ "version": "1.0", "#,
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(case.config_json, ConfigFormat::Json);

        if case.should_succeed {
            assert!(
                result.is_ok(),
                "[{}] expected success, got: {:?}",
                case.name,
                result.err()
            );
        } else {
            let err = result.expect_err(&format!("[{}] expected failure", case.name));
            if let Some(expected) = case.expected_error {
                assert!(
                    err.to_string().contains(expected),
                    "[{}] expected error containing '{}', got: {}",
                    case.name,
                    expected,
                    err
                );
            }
        }
    }
}

#[test]
fn test_valid_config_field_values() {
    let full = JSON_CONFIG_TESTS
        .iter()
        .find(|c| c.name == "valid_full")
        .unwrap();
    let config = load_config_from_str(full.config_json, ConfigFormat::Json).unwrap();

    assert_eq!(config.worker_count, 4);
    assert_eq!(config.providers[1].provider_id, "backup");
    assert_eq!(config.router.max_retries, 2);
    assert!(config.consensus.enabled);
    assert_eq!(config.pipeline.default_mode, GenerationMode::Quick);
    assert_eq!(config.citations.min_authority, 40);
    assert!(config.logging.json);
}

#[tokio::test]
async fn test_yaml_file_config_drives_engine() {
    let mut file = tempfile::Builder::new()
        .suffix(".yml")
        .tempfile()
        .unwrap();
    writeln!(
        file,
        r#"
version: "1.0"
worker_count: 2
providers:
  - provider_id: primary
    priority: 1
    model_id: large
pipeline:
  default_mode: quick
"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    let harness = TestHarness::start(
        config,
        vec![ScriptedProvider::new("primary").with_responder(article_responder)],
    );

    let id = harness.submit(ContentRequest::new("Ocean tides")).await;
    let job = harness.wait(&id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.unwrap().mode, GenerationMode::Quick);
    assert_eq!(
        harness.provider("primary").purposes(),
        vec!["research_outline", "draft_generation"]
    );

    harness.shutdown().await;
}
