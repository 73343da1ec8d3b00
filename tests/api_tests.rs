//! Router-level tests.
//!
//! Tests that never reach the database use a lazy pool pointed at a closed
//! port. Tests marked `#[ignore]` need a migrated Postgres database in
//! `TEST_DATABASE_URL`:
//!
//! ```sh
//! TEST_DATABASE_URL=postgres://localhost/revenue_test cargo test -- --ignored
//! ```

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use http_body_util::BodyExt;
use revenue_dashboard_server::{
    config::Config,
    db,
    models::user::{CreateUserRequest, Role, User, UserStatus},
    routes,
    services::{auth_service, user_service},
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

fn test_config(database_url: &str) -> Config {
    test_config_with(database_url, &[])
}

fn test_config_with(database_url: &str, extra: &[(&str, &str)]) -> Config {
    let mut vars = vec![
        ("DATABASE_URL".to_string(), database_url.to_string()),
        ("JWT_SECRET".to_string(), SECRET.to_string()),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let config: Config = envy::from_iter(vars).unwrap();
    config.validate().unwrap();
    config
}

/// Router over a pool that can never connect.
fn offline_app() -> Router {
    let url = "postgres://postgres@127.0.0.1:1/unused";
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(500))
        .connect_lazy(url)
        .unwrap();
    routes::create_router(AppState::new(test_config(url), pool, None)).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sample_user() -> User {
    User {
        id: Uuid::new_v4(),
        email: "ana@example.com".to_string(),
        full_name: "Ana Souza".to_string(),
        password_hash: String::new(),
        role: Role::Admin,
        status: UserStatus::Active,
        last_login_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let (status, body) = send(offline_app(), get("/api/v1/revenue/summary")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_malformed_token_rejected() {
    let request = Request::builder()
        .uri("/api/v1/auth/me")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(offline_app(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_rejected() {
    let (token, _) = auth_service::issue_token(&sample_user(), "some-other-secret", 1).unwrap();
    let request = Request::builder()
        .uri("/api/v1/templates")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(offline_app(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_bearer_scheme_rejected() {
    let request = Request::builder()
        .uri("/api/v1/exports")
        .header(header::AUTHORIZATION, "Basic YWRtaW46YWRtaW4=")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(offline_app(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let (status, body) = send(offline_app(), get("/api/v1/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Route not found");
}

#[tokio::test]
async fn test_wrong_method_returns_json_405() {
    let request = Request::builder()
        .method("PUT")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(offline_app(), request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "Method not allowed");
}

#[tokio::test]
async fn test_login_rejects_invalid_email() {
    let request = post_json(
        "/api/v1/auth/login",
        json!({ "email": "not-an-email", "password": "secret123" }),
    );
    let (status, body) = send(offline_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["email"].is_array());
}

#[tokio::test]
async fn test_login_rejects_malformed_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"email\":"))
        .unwrap();
    let (status, body) = send(offline_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let (status, body) = send(offline_app(), get("/health")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "An internal error occurred");
}

// Database-backed flows

async fn database_app() -> (Router, db::DbPool) {
    database_app_with(&[]).await
}

async fn database_app_with(extra: &[(&str, &str)]) -> (Router, db::DbPool) {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = db::create_pool(&url, 5).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let config = test_config_with(&url, extra);
    let app = routes::create_router(AppState::new(config, pool.clone(), None)).unwrap();
    (app, pool)
}

async fn create_user(pool: &db::DbPool, role: Role) -> (String, String) {
    let email = format!("user-{}@example.com", Uuid::new_v4().simple());
    let password = "correct-horse".to_string();
    user_service::create_user(
        pool,
        CreateUserRequest {
            email: email.clone(),
            full_name: "Test User".to_string(),
            role,
            password: Some(password.clone()),
        },
    )
    .await
    .unwrap();
    (email, password)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app.clone(),
        post_json(
            "/api/v1/auth/login",
            json!({ "email": email, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn authorized(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
#[ignore]
async fn test_login_and_me() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Analyst).await;

    let (status, _) = send(
        app.clone(),
        post_json(
            "/api/v1/auth/login",
            json!({ "email": email, "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = login(&app, &email.to_uppercase(), &password).await;
    let (status, body) = send(app, authorized("GET", "/api/v1/auth/me", &token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], email);
    assert_eq!(body["role"], "analyst");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
#[ignore]
async fn test_viewer_cannot_export() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Viewer).await;
    let token = login(&app, &email, &password).await;

    let request = authorized(
        "POST",
        "/api/v1/exports",
        &token,
        Some(json!({ "format": "csv", "report_type": "summary" })),
    );
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Missing permission: run_exports");
}

#[tokio::test]
#[ignore]
async fn test_zoho_source_unavailable_without_config() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Viewer).await;
    let token = login(&app, &email, &password).await;

    let request = authorized("GET", "/api/v1/revenue/summary?source=zoho", &token, None);
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_summary_export_round_trip() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Manager).await;
    let token = login(&app, &email, &password).await;

    let request = authorized(
        "POST",
        "/api/v1/exports",
        &token,
        Some(json!({
            "format": "csv",
            "report_type": "summary",
            "filters": { "date_from": "2025-01-01", "date_to": "2025-12-31" }
        })),
    );
    let (status, job) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"], 100);

    let uri = format!("/api/v1/exports/{}/download", job["id"].as_str().unwrap());
    let response = app
        .oneshot(authorized("GET", &uri, &token, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("transaction_count,"));
}

#[tokio::test]
#[ignore]
async fn test_health_reports_sources() {
    let (app, _pool) = database_app().await;
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
    assert_eq!(body["zoho"], "not_configured");
}

#[tokio::test]
#[ignore]
async fn test_logout_succeeds_when_audit_write_fails() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Viewer).await;
    let token = login(&app, &email, &password).await;

    let user_id: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_one(&pool)
        .await
        .unwrap();

    // Reject audit rows for this user only, so parallel tests are unaffected.
    let suffix = user_id.simple().to_string();
    sqlx::query(&format!(
        r#"
        CREATE FUNCTION reject_audit_{suffix}() RETURNS trigger AS $$
        BEGIN
            IF NEW.user_id = '{user_id}' THEN
                RAISE EXCEPTION 'audit writes disabled';
            END IF;
            RETURN NEW;
        END
        $$ LANGUAGE plpgsql
        "#
    ))
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "CREATE TRIGGER reject_audit_{suffix} BEFORE INSERT ON audit_logs \
         FOR EACH ROW EXECUTE FUNCTION reject_audit_{suffix}()"
    ))
    .execute(&pool)
    .await
    .unwrap();

    let (status, _) = send(
        app,
        authorized("POST", "/api/v1/auth/logout", &token, None),
    )
    .await;

    sqlx::query(&format!("DROP TRIGGER reject_audit_{suffix} ON audit_logs"))
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(&format!("DROP FUNCTION reject_audit_{suffix}()"))
        .execute(&pool)
        .await
        .unwrap();

    assert_eq!(status, StatusCode::NO_CONTENT);
    let logged: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_logs WHERE user_id = $1 AND action = 'logout'",
    )
    .bind(user_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(logged, 0);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_email_conflicts() {
    let (app, pool) = database_app().await;
    let (admin_email, admin_password) = create_user(&pool, Role::Admin).await;
    let token = login(&app, &admin_email, &admin_password).await;

    let email = format!("dup-{}@example.com", Uuid::new_v4().simple());
    let body = json!({ "email": email, "full_name": "Dana Cruz", "password": "long-enough" });

    let (status, _) = send(
        app.clone(),
        authorized("POST", "/api/v1/users", &token, Some(body.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        authorized("POST", "/api/v1/users", &token, Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
#[ignore]
async fn test_default_template_is_exclusive_per_report_type() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Analyst).await;
    let token = login(&app, &email, &password).await;

    let mut ids = Vec::new();
    for _ in 0..2 {
        let request = authorized(
            "POST",
            "/api/v1/templates",
            &token,
            Some(json!({
                "name": format!("Default {}", Uuid::new_v4().simple()),
                "report_type": "timeseries",
                "granularity": "quarter",
                "is_default": true,
            })),
        );
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["id"].as_str().unwrap().to_string());
    }

    let uri = format!("/api/v1/templates/{}", ids[0]);
    let (_, first) = send(app.clone(), authorized("GET", &uri, &token, None)).await;
    assert_eq!(first["is_default"], false);

    let uri = format!("/api/v1/templates/{}", ids[1]);
    let (_, second) = send(app, authorized("GET", &uri, &token, None)).await;
    assert_eq!(second["is_default"], true);
}

#[tokio::test]
#[ignore]
async fn test_template_rejects_blank_name_and_unknown_column() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Analyst).await;
    let token = login(&app, &email, &password).await;

    let request = authorized(
        "POST",
        "/api/v1/templates",
        &token,
        Some(json!({ "name": "   ", "report_type": "summary" })),
    );
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = authorized(
        "POST",
        "/api/v1/templates",
        &token,
        Some(json!({
            "name": format!("Columns {}", Uuid::new_v4().simple()),
            "report_type": "summary",
            "columns": ["gross_revenue", "client_name"],
        })),
    );
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown column 'client_name' for a summary report");
}

#[tokio::test]
#[ignore]
async fn test_schedule_rejects_blank_name() {
    let (app, pool) = database_app().await;
    let (email, password) = create_user(&pool, Role::Manager).await;
    let token = login(&app, &email, &password).await;

    let request = authorized(
        "POST",
        "/api/v1/scheduled-reports",
        &token,
        Some(json!({
            "name": "   ",
            "template_id": Uuid::new_v4(),
            "frequency": "daily",
            "recipients": ["ops@example.com"],
        })),
    );
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "name must not be blank");
}

#[tokio::test]
#[ignore]
async fn test_export_over_row_limit_fails_job() {
    let (app, pool) = database_app_with(&[("EXPORT_MAX_ROWS", "0")]).await;
    let (email, password) = create_user(&pool, Role::Analyst).await;
    let token = login(&app, &email, &password).await;

    let company = format!("Limit Mutual {}", Uuid::new_v4().simple());
    let company_id: Uuid =
        sqlx::query_scalar("INSERT INTO insurance_companies (name) VALUES ($1) RETURNING id")
            .bind(&company)
            .fetch_one(&pool)
            .await
            .unwrap();
    sqlx::query(
        r#"
        INSERT INTO disbursements (disbursement_date, insurance_company_id, client_name, amount)
        VALUES ('2025-03-14', $1, 'Row Limit Client', 1000)
        "#,
    )
    .bind(company_id)
    .execute(&pool)
    .await
    .unwrap();

    let request = authorized(
        "POST",
        "/api/v1/exports",
        &token,
        Some(json!({
            "format": "csv",
            "report_type": "transactions",
            "filters": { "insurance_companies": [company] }
        })),
    );
    let (status, body) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("the limit is 0"));

    let (status, page) = send(app, authorized("GET", "/api/v1/exports", &token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    let job = &page["items"][0];
    assert_eq!(job["status"], "failed");
    assert!(job["error_message"].as_str().unwrap().contains("rows"));
    assert!(job["file_name"].is_null());
}
