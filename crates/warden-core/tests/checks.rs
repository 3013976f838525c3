//! Built-in checks against a scripted target

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use warden_core::checks::{ConfigCheck, ModuleEnabled, ModuleKnownVersions};
use warden_core::{
    Assessment, AssessmentState, CheckRegistry, Outcome, PolicyDefinition, ReportingPeriod,
    TokenExpression,
};
use warden_remote::CancelSignal;
use warden_test_utils::{build_policy, target, MockTransport};

async fn assess(transport: Arc<MockTransport>, def: PolicyDefinition) -> Assessment {
    let registry = CheckRegistry::with_builtins();
    let policy = build_policy(def, &registry);
    let mut assessment = Assessment::new("www.example.com", ReportingPeriod::ending_now(24).unwrap());
    assessment
        .assess_target(
            &target("www.example.com", transport),
            &[policy],
            &registry,
            &TokenExpression,
            &CancelSignal::new(),
        )
        .await
        .unwrap();
    assert_eq!(assessment.state(), AssessmentState::Completed);
    assessment
}

fn rules(rows: Value) -> PolicyDefinition {
    PolicyDefinition::new("KnownVersions", ModuleKnownVersions::NAME).with_parameter("rules", rows)
}

#[tokio::test]
async fn known_version_match_fails_policy() {
    let transport = Arc::new(MockTransport::new().respond(
        "pm:list --status=enabled --format=json",
        json!({
            "views": {"version": "8.x-3.0-BETA1", "status": "Enabled"},
            "token": {"version": "8.x-1.9", "status": "Enabled"}
        })
        .to_string(),
    ));
    let def = rules(json!([
        {"status": "active", "module": "views", "version_constraint": "8\\.x-3\\.0-beta\\d"},
        {"status": "retired", "module": "token", "version_constraint": ""}
    ]));

    let assessment = assess(transport.clone(), def).await;

    let response = assessment.response("KnownVersions").unwrap();
    assert_eq!(response.outcome(), Outcome::Failure);
    let results = response.tokens().get("results").unwrap();
    assert_eq!(results.as_array().unwrap().len(), 1);
    assert_eq!(results[0]["module"], json!("views"));
    assert_eq!(transport.count("--uri=www.example.com"), 1);
}

#[tokio::test]
async fn known_version_without_match_passes() {
    let transport = Arc::new(MockTransport::new().respond(
        "pm:list",
        json!({"views": {"version": "8.x-3.14"}}).to_string(),
    ));
    let def = rules(json!([
        {"status": "active", "module": "views", "version_constraint": "8\\.x-3\\.0"}
    ]));

    let assessment = assess(transport, def).await;
    assert_eq!(assessment.response("KnownVersions").unwrap().outcome(), Outcome::Success);
}

#[tokio::test]
async fn known_version_dependency_rule_can_exclude_row() {
    let transport = Arc::new(MockTransport::new().respond(
        "pm:list",
        json!({"views": {"version": "8.x-3.0"}}).to_string(),
    ));
    let def = rules(json!([
        {
            "status": "active",
            "module": "views",
            "version_constraint": "",
            "dependency_rules": "target.uri == 'other.example.com'"
        }
    ]));

    let assessment = assess(transport, def).await;
    assert_eq!(assessment.response("KnownVersions").unwrap().outcome(), Outcome::Success);
}

#[tokio::test]
async fn known_version_reads_rule_table_file() {
    let mut table = tempfile::NamedTempFile::new().unwrap();
    write!(
        table,
        "status\tmodule\tversion_constraint\tdependency_rules_twig\n\
         Publish\tName\tPattern\tExpression\n\
         active\tviews\t8\\.x-3\\.0\t\n\
         retired\ttoken\t\t\n"
    )
    .unwrap();
    let transport = Arc::new(MockTransport::new().respond(
        "pm:list",
        json!({
            "views": {"version": "8.x-3.0"},
            "token": {"version": "8.x-1.9"}
        })
        .to_string(),
    ));
    let def = PolicyDefinition::new("KnownVersions", ModuleKnownVersions::NAME)
        .with_parameter("rules_url", format!("file://{}", table.path().display()));

    let assessment = assess(transport, def).await;

    let response = assessment.response("KnownVersions").unwrap();
    assert_eq!(response.outcome(), Outcome::Failure);
    let results = response.tokens().get("results").unwrap();
    assert_eq!(results.as_array().unwrap().len(), 1);
    assert_eq!(results[0]["module"], json!("views"));
}

#[tokio::test]
async fn known_version_rejects_remote_rule_table() {
    let transport = Arc::new(MockTransport::new());
    let def = PolicyDefinition::new("KnownVersions", ModuleKnownVersions::NAME)
        .with_parameter("rules_url", "https://example.com/rules.tsv");

    let assessment = assess(transport.clone(), def).await;

    let response = assessment.response("KnownVersions").unwrap();
    assert_eq!(response.outcome(), Outcome::Error);
    assert!(response.tokens().has("exception"));
    assert!(transport.commands().is_empty());
}

#[tokio::test]
async fn known_version_without_rules_is_an_error() {
    let transport = Arc::new(MockTransport::new());
    let assessment = assess(transport.clone(), rules(json!([]))).await;

    assert_eq!(assessment.response("KnownVersions").unwrap().outcome(), Outcome::Error);
    assert!(transport.commands().is_empty());
}

#[tokio::test]
async fn config_check_compares_reading() {
    let transport = Arc::new(MockTransport::new().respond(
        "config:get system.site name --format=json",
        r#"{"system.site:name": "Example"}"#,
    ));
    let def = PolicyDefinition::new("SiteName", ConfigCheck::NAME)
        .with_parameter("collection", "system.site")
        .with_parameter("key", "name")
        .with_parameter("value", "Example");

    let assessment = assess(transport, def).await;

    let response = assessment.response("SiteName").unwrap();
    assert_eq!(response.outcome(), Outcome::Success);
    assert_eq!(response.tokens().get("reading").unwrap(), &json!("Example"));
}

#[tokio::test]
async fn config_check_mismatch_fails() {
    let transport = Arc::new(MockTransport::new().respond(
        "config:get system.performance",
        r#"{"system.performance:cache.page.max_age": 0}"#,
    ));
    let def = PolicyDefinition::new("PageCache", ConfigCheck::NAME)
        .with_parameter("collection", "system.performance")
        .with_parameter("key", "cache.page.max_age")
        .with_parameter("value", 3600);

    let assessment = assess(transport, def).await;
    assert_eq!(assessment.response("PageCache").unwrap().outcome(), Outcome::Failure);
}

#[tokio::test]
async fn config_check_without_collection_errors() {
    let def = PolicyDefinition::new("Broken", ConfigCheck::NAME);
    let assessment = assess(Arc::new(MockTransport::new()), def).await;

    let response = assessment.response("Broken").unwrap();
    assert_eq!(response.outcome(), Outcome::Error);
    assert!(response.tokens().has("exception"));
}

#[tokio::test]
async fn module_enabled_reads_framed_runtime_output() {
    let transport = Arc::new(
        MockTransport::new().respond_framed("php-script -", &json!(["system", "views", "node"])),
    );
    let def = PolicyDefinition::new("Views", ModuleEnabled::NAME).with_parameter("module", "views");

    let assessment = assess(transport.clone(), def).await;

    let response = assessment.response("Views").unwrap();
    assert_eq!(response.outcome(), Outcome::Success);
    assert_eq!(response.tokens().get("enabled").unwrap(), &json!(true));
    let sent = transport.commands();
    assert!(sent[0].starts_with("echo "));
    assert!(sent[0].contains("base64 --decode | drush --root=$DRUSH_ROOT --uri=www.example.com php-script -"));
}

#[tokio::test]
async fn module_enabled_without_markers_errors() {
    let transport = Arc::new(MockTransport::new().respond("php-script", "PHP Fatal error: boom"));
    let def = PolicyDefinition::new("Views", ModuleEnabled::NAME).with_parameter("module", "views");

    let assessment = assess(transport, def).await;
    assert_eq!(assessment.response("Views").unwrap().outcome(), Outcome::Error);
}

#[tokio::test]
async fn module_enabled_without_module_is_not_applicable() {
    let transport = Arc::new(MockTransport::new());
    let def = PolicyDefinition::new("Views", ModuleEnabled::NAME);

    let assessment = assess(transport.clone(), def).await;
    assert_eq!(
        assessment.response("Views").unwrap().outcome(),
        Outcome::NotApplicable
    );
    assert!(transport.commands().is_empty());
}
