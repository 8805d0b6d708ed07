use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use patient_cell::router::{health_plan_routes, patient_routes};
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn patient_lookup_by_user_returns_owned_record() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let user = TestUser::patient("ana@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    let patient_id = Uuid::new_v4().to_string();
    let plan_id = Uuid::new_v4().to_string();
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .and(query_param("is_active", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&patient_id, &user.id, "Ana Souza", &plan_id)
        ])))
        .mount(&mock_server)
        .await;

    let app = patient_routes(config.to_arc());
    let response = app
        .oneshot(get(&format!("/by-user/{}", user.id), &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], patient_id);
    assert_eq!(body["health_plan_id"], plan_id);
}

#[tokio::test]
async fn user_without_patient_record_is_not_found() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, None);

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = patient_routes(config.to_arc());
    let response = app
        .oneshot(get("/by-user/someone-else", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No patient record found for this user");
}

#[tokio::test]
async fn search_filters_by_health_plan() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, None);

    let plan_id = Uuid::new_v4().to_string();
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("health_plan_id", format!("eq.{}", plan_id)))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), "u1", "Ana", &plan_id),
            MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), "u2", "Bruno", &plan_id)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = patient_routes(config.to_arc());
    let response = app
        .oneshot(get(&format!("/?health_plan_id={}&limit=10", plan_id), &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total"], 2);
}

#[tokio::test]
async fn search_text_is_encoded_and_plan_name_is_embedded() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, None);

    let plan_id = Uuid::new_v4().to_string();
    let mut row = MockSupabaseResponses::patient_response(&Uuid::new_v4().to_string(), "u1", "Ana & Bia", &plan_id);
    row["health_plan_name"] = json!("Unimed");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("name", "ilike.*Ana & Bia*"))
        .and(query_param("phone", "ilike.*11#9*"))
        .and(query_param("select", "*,...health_plans(health_plan_name:name)"))
        .and(query_param("order", "name.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = patient_routes(config.to_arc());
    let response = app
        .oneshot(get("/?name=Ana%20%26%20Bia&phone=11%239", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["patients"][0]["name"], "Ana & Bia");
    assert_eq!(body["patients"][0]["health_plan_name"], "Unimed");
}

#[tokio::test]
async fn health_plans_list_and_missing_plan() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri());
    let token = JwtTestUtils::create_test_token(&TestUser::default(), &config.jwt_secret, None);

    let plan_id = Uuid::new_v4().to_string();
    let missing_id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path("/rest/v1/health_plans"))
        .and(query_param("id", format!("eq.{}", missing_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/health_plans"))
        .and(query_param("order", "name.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::health_plan_response(&plan_id, "Unimed")
        ])))
        .mount(&mock_server)
        .await;

    let app = health_plan_routes(config.to_arc());

    let response = app.clone().oneshot(get("/", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["health_plans"][0]["name"], "Unimed");

    let response = app
        .oneshot(get(&format!("/{}", missing_id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
