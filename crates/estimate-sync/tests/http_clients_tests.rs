//! Harvest and Linear clients against mock HTTP servers.

use chrono::{TimeZone, Utc};
use estimate_sync::config::{HarvestConfig, LinearConfig};
use estimate_sync::{
    EstimateSource, HarvestClient, IssueAnnotator, LinearClient, SyncError, TimeEntrySource,
    Watermark,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Harvest
// =============================================================================

fn harvest_client(server: &MockServer) -> HarvestClient {
    HarvestClient::new(&HarvestConfig {
        access_token: "hv-token".to_string(),
        account_id: "12345".to_string(),
        api_url: server.uri(),
        user_agent: "estimate-sync-tests".to_string(),
    })
    .unwrap()
}

fn entry_json(id: u64, hours: f64, issue: &str) -> serde_json::Value {
    json!({
        "id": id,
        "hours": hours,
        "notes": "Reviewed PR",
        "updated_at": "2024-01-02T10:00:00Z",
        "user": { "id": 1, "name": "Kim Allen" },
        "external_reference": {
            "id": issue,
            "service": "linear.app",
            "group_id": "team-1",
            "permalink": "https://linear.app/acme/issue/WIL-12"
        }
    })
}

#[tokio::test]
async fn test_harvest_updated_since_sends_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/time_entries"))
        .and(query_param("updated_since", "2024-01-01T00:00:00Z"))
        .and(header("authorization", "Bearer hv-token"))
        .and(header("harvest-account-id", "12345"))
        .and(header("user-agent", "estimate-sync-tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "time_entries": [entry_json(1, 3.0, "WIL-12"), {
                "id": 2,
                "hours": 1.0,
                "notes": null,
                "updated_at": "2024-01-02T11:00:00Z",
                "user": { "id": 2, "name": "Sam Lee" },
                "external_reference": null
            }],
            "next_page": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let since = Watermark::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let entries = harvest_client(&server).updated_since(since).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].issue_key_for("linear.app"), Some("WIL-12"));
    assert!(entries[1].external_reference.is_none());
    assert_eq!(entries[1].notes_text(), "");
}

#[tokio::test]
async fn test_harvest_follows_pagination_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/time_entries"))
        .and(query_param("external_reference_id", "WIL-12"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "time_entries": [entry_json(1, 1.25, "WIL-12")],
            "next_page": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/time_entries"))
        .and(query_param("external_reference_id", "WIL-12"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "time_entries": [entry_json(2, 2.5, "WIL-12")],
            "next_page": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let entries = harvest_client(&server)
        .for_external_reference("WIL-12")
        .await
        .unwrap();

    let ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_harvest_non_success_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/time_entries"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .mount(&server)
        .await;

    let since = Watermark::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let err = harvest_client(&server)
        .updated_since(since)
        .await
        .unwrap_err();

    match err {
        SyncError::Api {
            service,
            status,
            message,
        } => {
            assert_eq!(service, "Harvest");
            assert_eq!(status, 401);
            assert_eq!(message, "invalid token");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Linear
// =============================================================================

fn linear_client(server: &MockServer) -> LinearClient {
    LinearClient::new(&LinearConfig {
        api_key: "lin_api_test".to_string(),
        api_url: format!("{}/graphql", server.uri()),
    })
    .unwrap()
}

#[tokio::test]
async fn test_linear_issue_snapshot() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "lin_api_test"))
        .and(body_partial_json(json!({ "variables": { "id": "WIL-12" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "issue": {
                    "estimate": 5,
                    "labels": { "nodes": [{ "id": "label-a" }, { "id": "label-b" }] }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = linear_client(&server)
        .issue_snapshot("WIL-12")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.estimate, Some(5.0));
    assert_eq!(snapshot.label_ids, vec!["label-a".to_string(), "label-b".to_string()]);
}

#[tokio::test]
async fn test_linear_graphql_errors_are_soft_for_estimates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Entity not found: Issue" }]
        })))
        .mount(&server)
        .await;

    let snapshot = linear_client(&server).issue_snapshot("WIL-404").await.unwrap();
    assert!(snapshot.is_none());
}

#[tokio::test]
async fn test_linear_null_estimate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "issue": { "estimate": null, "labels": { "nodes": [] } } }
        })))
        .mount(&server)
        .await;

    let snapshot = linear_client(&server)
        .issue_snapshot("WIL-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.usable_estimate(), None);
}

#[tokio::test]
async fn test_linear_annotate_sends_text_as_variables() {
    let server = MockServer::start().await;
    let comment = "🕒 **Time Tracked** by Kim: \"quoted\" notes\nwith newline";

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": {
                "issueId": "WIL-12",
                "body": comment,
                "labelIds": ["bug", "label-under"]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "commentCreate": { "success": true },
                "issueUpdate": { "success": true }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    linear_client(&server)
        .annotate(
            "WIL-12",
            comment,
            &["bug".to_string(), "label-under".to_string()],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_linear_partial_annotation_is_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "commentCreate": { "success": true },
                "issueUpdate": { "success": false }
            }
        })))
        .mount(&server)
        .await;

    let err = linear_client(&server)
        .annotate("WIL-12", "comment", &[])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::PartialAnnotation {
            comment_created: true,
            labels_updated: false
        }
    ));
}

#[tokio::test]
async fn test_linear_missing_mutation_result_is_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "commentCreate": { "success": true } }
        })))
        .mount(&server)
        .await;

    let err = linear_client(&server)
        .annotate("WIL-12", "comment", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::PartialAnnotation { .. }));
}

#[tokio::test]
async fn test_linear_annotate_graphql_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Argument Validation Error" }]
        })))
        .mount(&server)
        .await;

    let err = linear_client(&server)
        .annotate("WIL-12", "comment", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::GraphQl(ref m) if m == "Argument Validation Error"));
}

#[tokio::test]
async fn test_linear_http_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = linear_client(&server)
        .issue_snapshot("WIL-12")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Api { status: 500, .. }));
}
