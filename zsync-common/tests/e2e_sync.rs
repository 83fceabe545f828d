//! End-to-end synchronization against the in-memory tracker.

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use zsync_common::{
    ExecutionStatus, HttpMethod, KeywordAttrs, KeywordKind, ListenerError, Phase, SyncError,
};

const PASS: i64 = 1;
const FAIL: i64 = 2;

#[test]
fn test_suite_issue_with_one_passing_test() {
    init_test_logging();
    let tracker = seeded_tracker();
    let renderer = Arc::new(StubRenderer::default());
    let mut listener = listener_with_renderer(&tracker, renderer.clone());

    let attrs = suite("Root.Login", "login.robot", &[("Issue Per", "Test Suite")]);
    listener.start_suite("Login", &attrs);
    run_test(
        &mut listener,
        "Valid Login",
        &test("Root.Login.Valid Login", &[]),
        &[("Open Browser", "PASS"), ("Submit Credentials", "PASS")],
        "PASS",
    );
    listener.end_suite("Login", &suite_end(&attrs, "PASS")).unwrap();
    assert_eq!(listener.phase(), Phase::Idle);

    let issues = tracker.issues();
    assert_eq!(issues.len(), 1);
    let issue = &issues[0];
    assert_eq!(issue.summary(), Some("Root.Login"));
    assert_eq!(issue.identity(), Some("login.robot"));

    let executions = tracker.executions_for_issue(&issue.key);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, PASS);

    let steps: Vec<String> = tracker
        .steps_for_issue(&issue.key)
        .into_iter()
        .map(|s| s.step)
        .collect();
    assert_eq!(steps, vec!["Open Browser", "Submit Credentials"]);
    let results = tracker.step_results();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.status == PASS));

    assert_eq!(listener.pending_uploads().len(), 2);
    let dir = TempDir::new().unwrap();
    let summary = listener.output_file(&dir.path().join("output.xml")).unwrap();
    assert!(summary.is_clean());
    let mut uploaded = summary.uploaded.clone();
    uploaded.sort();
    let mut expected: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
    expected.sort();
    assert_eq!(uploaded, expected);
    assert_eq!(
        renderer.rendered.lock().unwrap().as_slice(),
        ["Root.Login.Valid Login", "Root.Login.Valid Login"]
    );
    let attachments = tracker.attachments();
    assert_eq!(attachments.len(), 2);
    assert!(attachments.iter().all(|a| a.entity_type == "TESTSTEPRESULT"));
    assert!(listener.pending_uploads().is_empty());
}

#[test]
fn test_suite_steps_span_all_tests() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);

    let attrs = suite("Root.Account", "account.robot", &[("Issue Per", "Test Suite")]);
    listener.start_suite("Account", &attrs);
    run_test(
        &mut listener,
        "Register",
        &test("Root.Account.Register", &[]),
        &[("Open Browser", "PASS"), ("Fill Form", "PASS")],
        "PASS",
    );
    run_test(
        &mut listener,
        "Delete",
        &test("Root.Account.Delete", &[]),
        &[("Open Browser", "PASS"), ("Confirm Deletion", "FAIL")],
        "FAIL",
    );
    listener.end_suite("Account", &suite_end(&attrs, "FAIL")).unwrap();

    let issues = tracker.issues();
    assert_eq!(issues.len(), 1);
    let steps: Vec<String> = tracker
        .steps_for_issue(&issues[0].key)
        .into_iter()
        .map(|s| s.step)
        .collect();
    assert_eq!(steps, vec!["Open Browser", "Fill Form", "Confirm Deletion"]);

    let executions = tracker.executions_for_issue(&issues[0].key);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, FAIL);
    let mut statuses: Vec<i64> = tracker.step_results().iter().map(|r| r.status).collect();
    statuses.sort_unstable();
    assert_eq!(statuses, vec![PASS, PASS, FAIL]);
    assert_eq!(listener.pending_uploads().len(), 3);
}

#[test]
fn test_case_steps_follow_keyword_order() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);

    let attrs = suite("Root.Cart", "cart.robot", &[("Issue Per", "Test Case")]);
    listener.start_suite("Cart", &attrs);
    run_test(
        &mut listener,
        "Add Item",
        &test("Root.Cart.Add Item", &[]),
        &[
            ("Open Shop", "PASS"),
            ("Add To Cart", "PASS"),
            ("Verify Total", "FAIL"),
        ],
        "FAIL",
    );
    listener.end_suite("Cart", &suite_end(&attrs, "FAIL")).unwrap();

    let issue = tracker.issue_by_identity("cart.robot::Add Item").unwrap();
    assert_eq!(issue.summary(), Some("Root.Cart: Add Item"));
    let steps: Vec<String> = tracker
        .steps_for_issue(&issue.key)
        .into_iter()
        .map(|s| s.step)
        .collect();
    assert_eq!(steps, vec!["Open Shop", "Add To Cart", "Verify Total"]);

    let executions = tracker.executions_for_issue(&issue.key);
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, FAIL);
    let mut statuses: Vec<i64> = tracker.step_results().iter().map(|r| r.status).collect();
    statuses.sort_unstable();
    assert_eq!(statuses, vec![PASS, PASS, FAIL]);
}

#[test]
fn test_draft_tests_never_reach_the_tracker() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);

    let attrs = suite("Root.Search", "search.robot", &[("Issue Per", "Test Case")]);
    listener.start_suite("Search", &attrs);
    run_test(
        &mut listener,
        "Find Product",
        &test("Root.Search.Find Product", &[]),
        &[("Search For", "PASS")],
        "PASS",
    );
    run_test(
        &mut listener,
        "Sketchy Idea",
        &test("Root.Search.Sketchy Idea", &["Draft"]),
        &[("Search For", "FAIL")],
        "FAIL",
    );
    listener.end_suite("Search", &suite_end(&attrs, "FAIL")).unwrap();

    assert_eq!(tracker.issues().len(), 1);
    assert_eq!(tracker.executions().len(), 1);
    assert!(tracker.issue_by_identity("search.robot::Find Product").is_some());
    assert!(
        tracker
            .requests()
            .iter()
            .all(|r| !r.url.contains("Sketchy")),
        "draft test leaked into a request"
    );
}

#[test]
fn test_rerun_replaces_execution_instead_of_duplicating() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite(
        "Root.Orders",
        "orders.robot",
        &[("Issue Per", "Test Case"), ("Skip Steps", "False")],
    );

    let mut execution_ids = Vec::new();
    for _ in 0..2 {
        listener.start_suite("Orders", &attrs);
        run_test(
            &mut listener,
            "Place Order",
            &test("Root.Orders.Place Order", &[]),
            &[("Checkout", "PASS"), ("Confirm", "PASS")],
            "PASS",
        );
        listener.end_suite("Orders", &suite_end(&attrs, "PASS")).unwrap();

        let issue = tracker.issue_by_identity("orders.robot::Place Order").unwrap();
        let executions = tracker.executions_for_issue(&issue.key);
        assert_eq!(executions.len(), 1);
        execution_ids.push(executions[0].id.clone());
    }

    assert_ne!(execution_ids[0], execution_ids[1]);
    assert_eq!(tracker.count(HttpMethod::Delete, "/rest/zapi/latest/execution/"), 1);
    assert_eq!(tracker.issues().len(), 1);
    let issue = tracker.issue_by_identity("orders.robot::Place Order").unwrap();
    assert_eq!(tracker.steps_for_issue(&issue.key).len(), 2);
    assert!(
        tracker
            .step_results()
            .iter()
            .all(|r| r.execution_id == execution_ids[1])
    );
}

#[test]
fn test_rerun_with_skip_steps_keeps_execution() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite(
        "Root.Orders",
        "orders.robot",
        &[("Issue Per", "Test Case"), ("Skip Steps", "True")],
    );

    for _ in 0..2 {
        listener.start_suite("Orders", &attrs);
        run_test(
            &mut listener,
            "Place Order",
            &test("Root.Orders.Place Order", &[]),
            &[("Checkout", "PASS")],
            "PASS",
        );
        listener.end_suite("Orders", &suite_end(&attrs, "PASS")).unwrap();
    }

    let executions = tracker.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(tracker.count(HttpMethod::Delete, "/execution/"), 0);
    assert!(tracker.step_results().is_empty());
    let history = &executions[0].history;
    assert_eq!(
        &history[history.len() - 3..],
        &[PASS, ExecutionStatus::IN_PROGRESS_CODE, PASS]
    );
}

#[test]
fn test_tag_links_created_once() {
    init_test_logging();
    let tracker = seeded_tracker();
    for n in 1..=9 {
        tracker.add_issue("PROJ", json!({ "summary": format!("Linked {n}") }));
    }
    let mut listener = listener(&tracker);
    let attrs = suite("Root.Links", "links.robot", &[("Issue Per", "Test Case")]);
    let linked = test("Root.Links.Linked", &["BasedOn:PROJ-1", "Bug:PROJ-9"]);

    listener.start_suite("Links", &attrs);
    run_test(&mut listener, "Linked", &linked, &[("Check", "PASS")], "PASS");
    listener.end_suite("Links", &suite_end(&attrs, "PASS")).unwrap();

    let issue = tracker.issue_by_identity("links.robot::Linked").unwrap();
    let mut targets: Vec<String> = tracker
        .links()
        .into_iter()
        .filter(|l| l.inward == issue.key)
        .map(|l| l.outward)
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["PROJ-1", "PROJ-9"]);
    assert_eq!(tracker.count(HttpMethod::Post, "issueLink"), 2);

    tracker.clear_requests();
    listener.start_suite("Links", &attrs);
    run_test(&mut listener, "Linked", &linked, &[("Check", "PASS")], "PASS");
    listener.end_suite("Links", &suite_end(&attrs, "PASS")).unwrap();

    assert_eq!(tracker.count(HttpMethod::Post, "issueLink"), 0);
    assert_eq!(tracker.links().len(), 2);
}

#[test]
fn test_suite_rerun_replaces_execution() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite("Root.Orders", "orders.robot", &[("Issue Per", "Test Suite")]);

    let mut execution_ids = Vec::new();
    for _ in 0..2 {
        listener.start_suite("Orders", &attrs);
        run_test(
            &mut listener,
            "Place Order",
            &test("Root.Orders.Place Order", &[]),
            &[("Checkout", "PASS"), ("Confirm", "PASS")],
            "PASS",
        );
        listener.end_suite("Orders", &suite_end(&attrs, "PASS")).unwrap();

        let issue = tracker.issue_by_identity("orders.robot").unwrap();
        let executions = tracker.executions_for_issue(&issue.key);
        assert_eq!(executions.len(), 1);
        execution_ids.push(executions[0].id.clone());
    }

    assert_ne!(execution_ids[0], execution_ids[1]);
    assert_eq!(tracker.count(HttpMethod::Delete, "/rest/zapi/latest/execution/"), 1);
    assert_eq!(tracker.issues().len(), 1);
    let issue = tracker.issue_by_identity("orders.robot").unwrap();
    assert_eq!(tracker.steps_for_issue(&issue.key).len(), 2);
    let results = tracker.step_results();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.execution_id == execution_ids[1]));
}

#[test]
fn test_suite_issue_links_test_tags_once() {
    init_test_logging();
    let tracker = seeded_tracker();
    for n in 1..=9 {
        tracker.add_issue("PROJ", json!({ "summary": format!("Linked {n}") }));
    }
    let mut listener = listener(&tracker);
    let attrs = suite("Root.Links", "links.robot", &[("Issue Per", "Test Suite")]);
    let linked = test("Root.Links.Linked", &["BasedOn:PROJ-1", "Bug:PROJ-9"]);
    let also = test("Root.Links.Also", &["Bug:PROJ-9"]);

    for _ in 0..2 {
        tracker.clear_requests();
        listener.start_suite("Links", &attrs);
        run_test(&mut listener, "Linked", &linked, &[("Check", "PASS")], "PASS");
        run_test(&mut listener, "Also", &also, &[("Check", "PASS")], "PASS");
        listener.end_suite("Links", &suite_end(&attrs, "PASS")).unwrap();

        let issue = tracker.issue_by_identity("links.robot").unwrap();
        let mut targets: Vec<String> = tracker
            .links()
            .into_iter()
            .filter(|l| l.inward == issue.key)
            .map(|l| l.outward)
            .collect();
        targets.sort();
        assert_eq!(targets, vec!["PROJ-1", "PROJ-9"]);
    }
    assert_eq!(tracker.count(HttpMethod::Post, "issueLink"), 0);
    assert_eq!(tracker.links().len(), 2);
}

#[test]
fn test_missing_link_target_is_skipped() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite("Root.Links", "links.robot", &[("Issue Per", "Test Case")]);

    listener.start_suite("Links", &attrs);
    run_test(
        &mut listener,
        "Dangling",
        &test("Root.Links.Dangling", &["Bug:PROJ-404"]),
        &[("Check", "PASS")],
        "PASS",
    );
    listener.end_suite("Links", &suite_end(&attrs, "PASS")).unwrap();

    assert!(tracker.links().is_empty());
    assert_eq!(tracker.executions().len(), 1);
}

#[test]
fn test_existing_issue_keeps_summary_and_closed_issue_is_reused() {
    init_test_logging();
    let tracker = seeded_tracker();
    let curated = tracker.add_issue(
        PROJECT_KEY,
        issue_fields(
            "Curated summary",
            "Written by hand",
            "profile.robot::Edit Profile",
        ),
    );
    let closed = tracker.add_issue(
        PROJECT_KEY,
        issue_fields("Retired", "", "profile.robot::Delete Profile"),
    );
    tracker.close_issue(&closed);

    let mut listener = listener(&tracker);
    let attrs = suite("Root.Profile", "profile.robot", &[("Issue Per", "Test Case")]);
    listener.start_suite("Profile", &attrs);
    run_test(
        &mut listener,
        "Edit Profile",
        &test("Root.Profile.Edit Profile", &[]),
        &[("Edit", "PASS")],
        "PASS",
    );
    run_test(
        &mut listener,
        "Delete Profile",
        &test("Root.Profile.Delete Profile", &[]),
        &[("Delete", "PASS")],
        "PASS",
    );
    listener.end_suite("Profile", &suite_end(&attrs, "PASS")).unwrap();

    assert_eq!(tracker.issues().len(), 2);
    let issue = tracker.issue(&curated).unwrap();
    assert_eq!(issue.summary(), Some("Curated summary"));
    assert_eq!(issue.description(), Some("Written by hand"));
    assert_eq!(tracker.executions_for_issue(&curated).len(), 1);
    assert_eq!(tracker.executions_for_issue(&closed).len(), 1);
}

#[test]
fn test_unexecuted_test_gets_issue_but_no_execution() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite("Root.Skips", "skips.robot", &[("Issue Per", "Test Case")]);

    listener.start_suite("Skips", &attrs);
    run_test(
        &mut listener,
        "Not Ready",
        &test("Root.Skips.Not Ready", &[]),
        &[],
        "SKIP",
    );
    run_test(
        &mut listener,
        "Ignored Failure",
        &test("Root.Skips.Ignored Failure", &["Ignore:Root.Skips.Ignored Failure"]),
        &[("Boom", "FAIL")],
        "FAIL",
    );
    listener.end_suite("Skips", &suite_end(&attrs, "PASS")).unwrap();

    assert_eq!(tracker.issues().len(), 2);
    assert!(tracker.executions().is_empty());
    assert!(listener.pending_uploads().is_empty());
}

#[test]
fn test_data_items_become_separate_issues() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite("Root.Data", "data.robot", &[("Issue Per", "Data Item")]);

    listener.start_suite("Data", &attrs);
    let templated = test("Root.Data.Login Variants", &[]);
    listener.start_test("Login Variants", &templated).unwrap();
    let loop_attrs: KeywordAttrs = serde_json::from_value(json!({ "type": "Test For" })).unwrap();
    listener.start_keyword("FOR", &loop_attrs).unwrap();
    for (scenario, status) in [("Admin Login", "PASS"), ("Guest Login", "FAIL")] {
        let item = KeywordAttrs::new(KeywordKind::TestForItem);
        listener.start_keyword("${user}", &item).unwrap();
        listener
            .variables_mut()
            .set("Login Variants_SCENARIO_NAME", scenario);
        listener
            .end_keyword("${user}", &item.clone().with_status(status))
            .unwrap();
    }
    listener.end_keyword("FOR", &loop_attrs).unwrap();
    listener
        .end_test("Login Variants", &test_end(&templated, "FAIL"))
        .unwrap();
    listener.end_suite("Data", &suite_end(&attrs, "FAIL")).unwrap();

    let admin = tracker.issue_by_identity("data.robot::Admin Login").unwrap();
    let guest = tracker.issue_by_identity("data.robot::Guest Login").unwrap();
    assert!(tracker.issue_by_identity("data.robot::Login Variants").is_none());
    assert_eq!(tracker.executions_for_issue(&admin.key)[0].status, PASS);
    assert_eq!(tracker.executions_for_issue(&guest.key)[0].status, FAIL);
    assert!(
        listener
            .pending_uploads()
            .iter()
            .all(|u| u.longname() == "Root.Data.Login Variants")
    );
}

#[test]
fn test_data_item_without_scenario_name_is_usage_error() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite("Root.Data", "data.robot", &[("Issue Per", "Data Item")]);

    listener.start_suite("Data", &attrs);
    listener
        .start_test("Unnamed", &test("Root.Data.Unnamed", &[]))
        .unwrap();
    let loop_attrs: KeywordAttrs = serde_json::from_value(json!({ "type": "Test For" })).unwrap();
    listener.start_keyword("FOR", &loop_attrs).unwrap();
    let item = KeywordAttrs::new(KeywordKind::TestForItem);
    listener.start_keyword("${x}", &item).unwrap();
    let err = listener
        .end_keyword("${x}", &item.with_status("PASS"))
        .unwrap_err();
    assert!(matches!(err, ListenerError::Usage(_)));

    listener.end_keyword("FOR", &loop_attrs).unwrap();
    listener
        .end_test("Unnamed", &test_end(&test("Root.Data.Unnamed", &[]), "PASS"))
        .unwrap();
    listener.end_suite("Data", &suite_end(&attrs, "PASS")).unwrap();
    assert_eq!(listener.depth(), 0);
    assert!(tracker.issues().is_empty());
}

#[test]
fn test_failed_suite_does_not_leak_into_next_suite() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    tracker.fail_times(HttpMethod::Post, "/rest/zapi/latest/execution", 500, 1);

    let broken = suite("Root.Broken", "broken.robot", &[("Issue Per", "Test Case")]);
    listener.start_suite("Broken", &broken);
    run_test(
        &mut listener,
        "First",
        &test("Root.Broken.First", &[]),
        &[("Step", "PASS")],
        "PASS",
    );
    let err = listener
        .end_suite("Broken", &suite_end(&broken, "PASS"))
        .unwrap_err();
    assert!(matches!(
        err,
        ListenerError::Sync {
            source: SyncError::Remote { .. },
            ..
        }
    ));
    assert_eq!(listener.phase(), Phase::Idle);

    let healthy = suite("Root.Healthy", "healthy.robot", &[("Issue Per", "Test Case")]);
    listener.start_suite("Healthy", &healthy);
    run_test(
        &mut listener,
        "Second",
        &test("Root.Healthy.Second", &[]),
        &[("Step", "PASS")],
        "PASS",
    );
    listener
        .end_suite("Healthy", &suite_end(&healthy, "PASS"))
        .unwrap();

    let executions = tracker.executions();
    assert_eq!(executions.len(), 1);
    let second = tracker.issue_by_identity("healthy.robot::Second").unwrap();
    assert_eq!(executions[0].issue_id, second.id);
    assert_eq!(listener.pending_uploads().len(), 1);
}

#[test]
fn test_version_and_cycle_metadata() {
    init_test_logging();
    let tracker = seeded_tracker();
    let mut listener = listener(&tracker);
    let attrs = suite(
        "Root.Release",
        "release.robot",
        &[
            ("Issue Per", "Test Case"),
            ("Version", "1.0"),
            ("Testcycle", "Nightly"),
        ],
    );

    listener.start_suite("Release", &attrs);
    run_test(
        &mut listener,
        "Smoke",
        &test("Root.Release.Smoke", &[]),
        &[("Ping", "PASS")],
        "PASS",
    );
    listener.end_suite("Release", &suite_end(&attrs, "PASS")).unwrap();

    let cycles = tracker.cycles();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].name, "Nightly");
    assert_ne!(cycles[0].version_id, "-1");
    assert_eq!(tracker.executions()[0].version_id, cycles[0].version_id);
}

#[test]
fn test_no_logs_upload_skips_dispatch() {
    init_test_logging();
    let tracker = seeded_tracker();
    let renderer = Arc::new(StubRenderer::default());
    let mut listener = listener_with_renderer(&tracker, renderer.clone());
    let attrs = suite(
        "Root.Quiet",
        "quiet.robot",
        &[("Issue Per", "Test Case"), ("No Logs Upload", "True")],
    );

    listener.start_suite("Quiet", &attrs);
    run_test(
        &mut listener,
        "Silent",
        &test("Root.Quiet.Silent", &[]),
        &[("Step", "PASS")],
        "PASS",
    );
    listener.end_suite("Quiet", &suite_end(&attrs, "PASS")).unwrap();
    assert!(listener.uploads_disabled());

    let dir = TempDir::new().unwrap();
    let summary = listener.output_file(&dir.path().join("output.xml")).unwrap();
    assert_eq!(summary.attempted(), 0);
    assert!(renderer.rendered.lock().unwrap().is_empty());
    assert!(tracker.attachments().is_empty());
}
