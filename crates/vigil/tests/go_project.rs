//! End-to-end runs of the go-project home screen suite against a scripted
//! site, declared both in Rust and in YAML.

#![allow(clippy::unwrap_used)]

use vigil::prelude::*;
use vigil::ErrorKind;

const BASE: &str = "http://localhost:8080";
const CREATE: &str = r#"button[data-test="create-endpoint"#;
const ENDPOINT_URL: &str = r#"[data-test="unique-endpoint-url"]"#;

fn go_project(button_delay_ms: u64, redirects: bool) -> ScriptedSite {
    let mut button = ElementScript::new("button")
        .attr("data-test", "create-endpoint-button")
        .text("Create endpoint")
        .appear_after(button_delay_ms);
    if redirects {
        button = button.on_click_navigate("/purple-sun-1234");
    }
    ScriptedSite::new()
        .page(
            "/",
            PageScript::new("Home | go-project").element(
                ElementScript::new("form")
                    .attr("action", "/endpoints")
                    .child(button),
            ),
        )
        .page(
            "/purple-sun-1234",
            PageScript::new("Endpoint | go-project").element(
                ElementScript::new("input")
                    .attr("data-test", "unique-endpoint-url")
                    .attr("readonly", ""),
            ),
        )
}

fn config() -> VigilConfig {
    VigilConfig::new()
        .with_base_url(BASE)
        .with_command_timeout_ms(500)
        .with_poll_interval_ms(10)
}

fn home_screen() -> Suite {
    Suite::describe("Home screen")
        .before_each(vec![Step::visit("/")])
        .it(
            "title is correct",
            vec![Step::title(), Step::should("eq", Some("Home | go-project")).unwrap()],
        )
        .it(
            "create button visible",
            vec![Step::locate(CREATE), Step::should("be.visible", None).unwrap()],
        )
        .it(
            "redirect on click",
            vec![
                Step::locate(CREATE),
                Step::click(),
                Step::locate(ENDPOINT_URL),
                Step::should("be.visible", None).unwrap(),
            ],
        )
}

fn run(site: ScriptedSite, suite: &Suite) -> RunReport {
    LifecycleManager::new(ScriptedFactory::new(site), config())
        .run_suite(suite)
        .unwrap()
}

#[test]
fn test_home_screen_passes() {
    let report = run(go_project(0, true), &home_screen());
    assert!(report.all_passed(), "{}", report.summary());
    assert_eq!(report.passed_count(), 3);
    assert_eq!(
        report.results[2].full_title(),
        "Home screen redirect on click"
    );
}

#[test]
fn test_button_rendering_late_still_passes() {
    let report = run(go_project(150, true), &home_screen());
    assert!(report.all_passed(), "{}", report.summary());
}

#[test]
fn test_missing_redirect_times_out() {
    let report = run(go_project(0, false), &home_screen());
    assert_eq!(report.passed_count(), 2);
    let failure = &report.results[2];
    match &failure.status {
        TestStatus::Failed {
            kind,
            step_index,
            phase,
            ..
        } => {
            assert_eq!(*kind, ErrorKind::TimedOut);
            assert_eq!(*step_index, 2);
            assert_eq!(*phase, vigil::Phase::Test);
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert!(!report.all_passed());
}

#[test]
fn test_wrong_title_reports_actual() {
    let suite = Suite::describe("Home screen").it(
        "title is correct",
        vec![
            Step::visit("/"),
            Step::title(),
            Step::should("eq", Some("Home | other-project")).unwrap(),
        ],
    );
    let report = run(go_project(0, true), &suite);
    let TestStatus::Failed {
        kind, assertion, ..
    } = &report.results[0].status
    else {
        panic!("expected failure, got {:?}", report.results[0].status);
    };
    assert_eq!(*kind, ErrorKind::AssertionFailure);
    let assertion = assertion.as_ref().unwrap();
    assert_eq!(assertion.actual, "\"Home | go-project\"");
    assert_eq!(assertion.expected.as_deref(), Some("Home | other-project"));
}

#[test]
fn test_open_prefix_can_be_rejected() {
    let suite = home_screen();
    let err = LifecycleManager::new(
        ScriptedFactory::new(go_project(0, true)),
        config().with_open_attribute_values(vigil::OpenValueMode::Reject),
    )
    .run_suite(&suite)
    .unwrap_err();
    assert!(matches!(err, VigilError::InvalidSelector { .. }));
}

#[test]
fn test_yaml_suite_end_to_end() {
    let yaml = r#"
version: "1.0"
name: Home screen
before_each:
  - type: visit
    url: /
suites:
  - name: Title
    tests:
      - name: should be correct
        steps:
          - type: title
          - type: assert
            expect: { predicate: equals, expected: "Home | go-project" }
  - name: Create button
    tests:
      - name: should redirect
        steps:
          - type: locate
            selector: 'button[data-test="create-endpoint'
          - type: act
            action: { kind: click }
          - type: url
          - type: assert
            expect: { predicate: contains, expected: /purple-sun }
"#;
    let suite = Suite::from_yaml(yaml).unwrap();
    assert_eq!(suite.test_count(), 2);

    let report = run(go_project(50, true), &suite);
    assert!(report.all_passed(), "{}", report.summary());
    assert_eq!(
        report.results[0].full_title(),
        "Home screen Title should be correct"
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.write_json(&path).unwrap();
    let loaded = RunReport::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded.passed_count(), 2);
}
