/// Integration tests for the REST client against a mocked LeadBoost API
/// Covers the request contract, error extraction and the 401 session handling
use leadboost_client::auth::{AuthEvent, MemoryTokenStore, TokenStore};
use leadboost_client::models::{
    LeadBatchRequest, LeadId, LeadUpdate, MessageStyle, PlanTier, ProcessResponse, UpgradeResponse,
};
use leadboost_client::{ApiClient, ClientError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to build a client with a stored token pointing at the mock server
fn create_test_client(server: &MockServer) -> (ApiClient, Arc<MemoryTokenStore>) {
    let tokens = Arc::new(MemoryTokenStore::with_token("test-token"));
    let client = ApiClient::new(&server.uri(), Duration::from_secs(5), tokens.clone()).unwrap();
    (client, tokens)
}

fn lead_json(id: i64, website: &str) -> serde_json::Value {
    json!({
        "id": id,
        "website": website,
        "organization_id": 1,
        "owner_id": 1,
        "score": 0.0,
        "qualification_label": "Low Priority",
        "scrape_confidence": 0.0,
        "email_confidence": 0.0,
        "enrichment_confidence": 0.0,
        "enrichment_source": "none",
        "email_source": "none",
        "scrape_source": "none",
        "outreach_sent": false,
        "is_active": true,
        "is_verified": false,
        "created_at": "2024-06-01T09:30:00Z"
    })
}

#[tokio::test]
async fn test_submit_sends_batch_body_with_bearer_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/leads"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_json(json!({
            "urls": ["https://acme.io", "https://globex.com"],
            "message_style": "short"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            lead_json(1, "https://acme.io"),
            lead_json(2, "https://globex.com")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);
    let batch =
        LeadBatchRequest::new(["https://acme.io", "https://globex.com"], MessageStyle::Short).unwrap();

    let leads = client.submit_leads(&batch).await.unwrap();
    assert_eq!(leads.len(), 2);
    assert_eq!(leads[0].id, LeadId::Numeric(1));
    assert_eq!(leads[1].website, "https://globex.com");
}

#[tokio::test]
async fn test_list_leads_passes_paging() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/leads"))
        .and(query_param("skip", "20"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([lead_json(21, "https://a.com")])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);
    let leads = client.list_leads(20, 10).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].id, LeadId::Numeric(21));
}

#[tokio::test]
async fn test_update_sends_only_edited_fields() {
    let mock_server = MockServer::start().await;

    let mut updated = lead_json(5, "https://acme.io");
    updated["company_name"] = json!("Acme");

    Mock::given(method("PUT"))
        .and(path("/api/v2/leads/5"))
        .and(body_json(json!({"company_name": "Acme"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(updated))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);
    let mut patch = LeadUpdate::default();
    patch.company_name = Some("Acme".to_string());

    let lead = client.update_lead(&LeadId::Numeric(5), &patch).await.unwrap();
    assert_eq!(lead.company_name.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_delete_accepts_empty_and_message_bodies() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v2/leads/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v2/leads/2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Lead deleted successfully"})),
        )
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);
    let ack = client.delete_lead(&LeadId::Numeric(1)).await.unwrap();
    assert_eq!(ack.message, None);

    let ack = client.delete_lead(&LeadId::Numeric(2)).await.unwrap();
    assert_eq!(ack.message.as_deref(), Some("Lead deleted successfully"));
}

#[tokio::test]
async fn test_process_lead_returns_ack() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/leads/9/process"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Lead processing started",
            "lead_id": 9
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);
    match client.process_lead(&LeadId::Numeric(9)).await.unwrap() {
        ProcessResponse::Ack(ack) => {
            assert_eq!(ack.lead_id, Some(LeadId::Numeric(9)));
            assert_eq!(ack.message.as_deref(), Some("Lead processing started"));
        }
        ProcessResponse::Lead(_) => panic!("expected an ack"),
    }
}

#[tokio::test]
async fn test_usage_plans_upgrade_and_cancel() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plan_name": "pro",
            "max_leads_per_day": 500,
            "can_export": true,
            "can_use_ai": true,
            "current_usage": 12,
            "remaining_daily_leads": 488,
            "can_process_more_today": true
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "free", "max_leads_per_day": 10, "can_export": false, "can_use_ai": false,
             "created_at": "2024-01-01T00:00:00"},
            {"id": 2, "name": "pro", "max_leads_per_day": 500, "can_export": true, "can_use_ai": true}
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/upgrade"))
        .and(query_param("plan_name", "enterprise"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Subscription upgraded to enterprise successfully"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/cancel"))
        .and(query_param("immediate", "true"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"message": "Subscription cancelled successfully"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);

    let usage = client.get_usage().await.unwrap();
    assert_eq!(usage.tier(), Some(PlanTier::Pro));
    assert!(usage.is_consistent());

    let plans = client.list_plans().await.unwrap();
    assert_eq!(plans.len(), 2);
    assert!(plans[0].created_at.is_some());

    let upgrade = client.upgrade_plan(PlanTier::Enterprise).await.unwrap();
    assert!(matches!(upgrade, UpgradeResponse::Ack(_)));

    let ack = client.cancel_subscription(true).await.unwrap();
    assert_eq!(ack.message.as_deref(), Some("Subscription cancelled successfully"));
}

#[tokio::test]
async fn test_error_detail_is_surfaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/leads"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "detail": "Daily lead limit exceeded for your subscription plan"
        })))
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);
    let batch = LeadBatchRequest::new(["https://acme.io"], MessageStyle::Professional).unwrap();

    let err = client.submit_leads(&batch).await.unwrap_err();
    assert_eq!(
        err,
        ClientError::Status {
            status: 429,
            message: "Daily lead limit exceeded for your subscription plan".to_string()
        }
    );
}

#[tokio::test]
async fn test_unauthorized_clears_token_and_broadcasts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/usage"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, tokens) = create_test_client(&mock_server);
    let mut events = client.auth_events().subscribe();

    let err = client.get_usage().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Unauthorized: Could not validate credentials");
    assert_eq!(tokens.load(), None);
    assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionExpired);
}

#[tokio::test]
async fn test_requests_without_token_have_no_auth_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(
        &mock_server.uri(),
        Duration::from_secs(5),
        Arc::new(MemoryTokenStore::new()),
    )
    .unwrap();
    client.list_plans().await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/leads/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let (client, _) = create_test_client(&mock_server);
    let err = client.get_lead(&LeadId::Numeric(3)).await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/usage"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let client = ApiClient::new(
        &mock_server.uri(),
        Duration::from_millis(100),
        Arc::new(MemoryTokenStore::new()),
    )
    .unwrap();
    let err = client.get_usage().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "got {:?}", err);
}
