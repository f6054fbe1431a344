pub mod health;
pub mod invite;
pub mod stats;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/interview-redirect", get(invite::interview_redirect))
        .route("/api/v1/evaluations/stats", get(stats::evaluation_stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::hireflix::HireflixClient;
    use crate::models::WorkItem;
    use crate::state::Invites;
    use crate::store::memory::MemoryEvaluationStore;

    fn item(answer_id: &str) -> WorkItem {
        WorkItem {
            answer_id: answer_id.to_string(),
            interview_id: "int-1".to_string(),
            question_id: format!("q-{answer_id}"),
            question_title: Some("Tell us about yourself".to_string()),
            question_description: None,
            answer_text: Some("I have spent five years building data pipelines.".to_string()),
            candidate_email: None,
        }
    }

    fn state(hireflix: Option<HireflixClient>) -> AppState {
        let store = MemoryEvaluationStore::with_work("pos-1", vec![item("a1"), item("a2")]);
        AppState {
            store: Arc::new(store),
            invites: hireflix.map(|client| Invites {
                client: Arc::new(client),
                position_id: "pos-1".to_string(),
            }),
        }
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(build_router(state(None)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "evaluator");
    }

    #[tokio::test]
    async fn test_stats_for_position() {
        let (status, body) = get(
            build_router(state(None)),
            "/api/v1/evaluations/stats?position_id=pos-1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["total_answers"], 2);
        assert_eq!(body["pending_answers"], 2);
        assert_eq!(body["evaluated_answers"], 0);
    }

    #[tokio::test]
    async fn test_stats_rejects_blank_position() {
        let (status, body) = get(
            build_router(state(None)),
            "/api/v1/evaluations/stats?position_id=%20",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_invite_missing_parameters() {
        let (status, body) = get(
            build_router(state(None)),
            "/interview-redirect?email=a%40b.com&firstName=Ada",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing candidate information.");
    }

    #[tokio::test]
    async fn test_invite_without_hireflix_configured() {
        let (status, _) = get(
            build_router(state(None)),
            "/interview-redirect?email=a%40b.com&firstName=Ada&lastName=Lovelace",
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_invite_redirects_to_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "inviteCandidateToInterview": {
                    "__typename": "InterviewType",
                    "url": { "public": "https://app.hireflix.com/xyz" }
                }}
            })))
            .mount(&server)
            .await;

        let client = HireflixClient::with_endpoint("key", server.uri());
        let (status, body) = get(
            build_router(state(Some(client))),
            "/interview-redirect?email=a%40b.com&firstName=Ada&lastName=Lovelace",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""https://app.hireflix.com/xyz""#));
    }

    #[tokio::test]
    async fn test_invite_upstream_failure_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
            .mount(&server)
            .await;

        let client = HireflixClient::with_endpoint("key", server.uri());
        let (status, body) = get(
            build_router(state(Some(client))),
            "/interview-redirect?email=a%40b.com&firstName=Ada&lastName=Lovelace",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("Failed to create interview."));
    }
}
