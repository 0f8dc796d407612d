// tests/generation_tests.rs

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    routing::post,
};
use quizmaster::{
    config::Config,
    generation::{GeneratorSettings, QuestionGenerator},
    routes,
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

/// Stand-in for the chat completions service.
struct MockCompletions {
    status: StatusCode,
    body: String,
    hits: AtomicUsize,
    last_request: Mutex<Option<(Option<String>, Value)>>,
}

async fn completions(
    State(mock): State<Arc<MockCompletions>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *mock.last_request.lock().unwrap() = Some((auth, body));
    (mock.status, mock.body.clone())
}

/// Serves `body` with `status` on `/chat/completions`. Returns the base URL.
async fn spawn_mock(status: StatusCode, body: String) -> (String, Arc<MockCompletions>) {
    let mock = Arc::new(MockCompletions {
        status,
        body,
        hits: AtomicUsize::new(0),
        last_request: Mutex::new(None),
    });

    let app = Router::new()
        .route("/chat/completions", post(completions))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{}", port), mock)
}

/// Accepts connections and never answers.
async fn spawn_stalled_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://127.0.0.1:{}", port)
}

/// A completion whose message content is `document`.
fn completion(document: Value) -> String {
    json!({
        "id": "gen-test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": document.to_string() }
        }]
    })
    .to_string()
}

fn settings(base_url: &str, api_key: Option<&str>, soft: Duration, hard: Duration) -> GeneratorSettings {
    GeneratorSettings {
        api_key: api_key.map(str::to_string),
        model: "test/model".to_string(),
        endpoint: format!("{}/chat/completions", base_url),
        soft_timeout: soft,
        hard_timeout: hard,
    }
}

fn default_settings(base_url: &str) -> GeneratorSettings {
    settings(base_url, Some("test-key"), Duration::from_secs(5), Duration::from_secs(10))
}

struct TestApp {
    address: String,
    pool: SqlitePool,
    client: reqwest::Client,
    token: String,
}

async fn spawn_app(generator: GeneratorSettings) -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_generation_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        server_port: 0,
        admin_username: None,
        admin_email: None,
        admin_password: None,
        openrouter_api_key: generator.api_key.clone(),
        openrouter_model: generator.model.clone(),
        openrouter_base_url: generator.endpoint.clone(),
        openrouter_timeout_secs: generator.soft_timeout.as_secs(),
        openrouter_hard_timeout_secs: generator.hard_timeout.as_secs(),
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        generator: QuestionGenerator::new(generator),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());
    let app = routes::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let token = teacher_token(&client, &address).await;

    TestApp {
        address,
        pool,
        client,
        token,
    }
}

async fn teacher_token(client: &reqwest::Client, address: &str) -> String {
    let username = format!("t_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({
            "username": username,
            "email": format!("{}@school.test", username),
            "password": "password123",
            "role": "teacher",
        }))
        .send()
        .await
        .unwrap();

    let login: Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    login["token"].as_str().unwrap().to_string()
}

impl TestApp {
    async fn create_quiz(&self) -> i64 {
        let quiz: Value = self
            .client
            .post(format!("{}/api/teacher/quizzes", self.address))
            .bearer_auth(&self.token)
            .json(&json!({ "title": "Plant biology" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        quiz["id"].as_i64().unwrap()
    }

    async fn generate(&self, quiz_id: i64, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/teacher/quizzes/{}/generate", self.address, quiz_id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn question_count(&self, quiz_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE quiz_id = ?")
            .bind(quiz_id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

fn mcq_request() -> Value {
    json!({
        "topic": "Photosynthesis",
        "question_type": "mcq",
        "count": 3,
        "marks": 2,
        "difficulty": "easy",
    })
}

fn mixed_mcq_items() -> Value {
    json!({
        "questions": [
            {
                "question_text": "Which gas do plants absorb?",
                "options": ["Oxygen", "Carbon dioxide", "Nitrogen", "Helium"],
                "correct_option_index": 1
            },
            {
                "question_text": "Where does photosynthesis happen?",
                "options": ["Nucleus", "Chloroplast"],
                "correct_option_index": 7
            },
            {
                "question_text": "Which pigment is green?",
                "options": ["Chlorophyll"],
                "correct_option_index": 0
            }
        ]
    })
}

#[tokio::test]
async fn generate_saves_only_valid_items() {
    let (mock_url, mock) = spawn_mock(StatusCode::OK, completion(mixed_mcq_items())).await;
    let app = spawn_app(default_settings(&mock_url)).await;
    let quiz_id = app.create_quiz().await;

    let response = app.generate(quiz_id, mcq_request()).await;

    assert_eq!(response.status().as_u16(), 201);
    let report: Value = response.json().await.unwrap();
    let saved = report["saved"].as_array().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(report["discarded"], 2);
    assert_eq!(saved[0]["marks"], 2);
    assert_eq!(saved[0]["options"][1]["option_text"], "Carbon dioxide");
    assert_eq!(saved[0]["options"][1]["is_correct"], true);
    assert_eq!(app.question_count(quiz_id).await, 1);

    let (auth, body) = mock.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(body["model"], "test/model");
    assert_eq!(body["response_format"]["type"], "json_object");
    assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generate_with_nothing_valid_leaves_quiz_unchanged() {
    let document = json!({
        "questions": [
            { "question_text": "", "options": ["A", "B"], "correct_option_index": 0 },
            { "question_text": "Pick a letter", "options": "A, B", "correct_option_index": 0 },
            { "question_text": "Pick a number", "options": ["1", "2"], "correct_option_index": "B" }
        ]
    });
    let (mock_url, _mock) = spawn_mock(StatusCode::OK, completion(document)).await;
    let app = spawn_app(default_settings(&mock_url)).await;
    let quiz_id = app.create_quiz().await;

    let response = app.generate(quiz_id, mcq_request()).await;

    assert_eq!(response.status().as_u16(), 200);
    let report: Value = response.json().await.unwrap();
    assert!(report["saved"].as_array().unwrap().is_empty());
    assert_eq!(report["discarded"], 3);
    assert_eq!(app.question_count(quiz_id).await, 0);
}

#[tokio::test]
async fn true_false_items_are_normalized() {
    let document = json!({
        "questions": [
            { "question_text": "The sun is a star.", "correct_answer": true, "marks": "3" },
            { "question_text": "The moon is a planet.", "correct_answer": "False" },
            { "question_text": "Mars is red.", "correct_answer": "yes" }
        ]
    });
    let (mock_url, _mock) = spawn_mock(StatusCode::OK, completion(document)).await;
    let app = spawn_app(default_settings(&mock_url)).await;
    let quiz_id = app.create_quiz().await;

    let response = app
        .generate(
            quiz_id,
            json!({ "topic": "Space", "question_type": "true_false", "count": 3 }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["discarded"], 1);
    assert_eq!(report["saved"][0]["correct_answer"], "True");
    assert_eq!(report["saved"][0]["marks"], 3);
    assert_eq!(report["saved"][1]["correct_answer"], "False");
    assert_eq!(report["saved"][1]["marks"], 1);
}

#[tokio::test]
async fn missing_api_key_is_service_unavailable() {
    let (mock_url, mock) = spawn_mock(StatusCode::OK, completion(mixed_mcq_items())).await;
    let app = spawn_app(settings(
        &mock_url,
        None,
        Duration::from_secs(5),
        Duration::from_secs(10),
    ))
    .await;
    let quiz_id = app.create_quiz().await;

    let response = app.generate(quiz_id, mcq_request()).await;

    assert_eq!(response.status().as_u16(), 503);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("OPENROUTER_API_KEY"));
    assert_eq!(mock.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn remote_error_is_bad_gateway() {
    let (mock_url, _mock) =
        spawn_mock(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded".to_string()).await;
    let app = spawn_app(default_settings(&mock_url)).await;
    let quiz_id = app.create_quiz().await;

    let response = app.generate(quiz_id, mcq_request()).await;

    assert_eq!(response.status().as_u16(), 502);
    let body: Value = response.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("API error (500)"), "got: {}", message);
    assert!(message.contains("upstream exploded"));
    assert_eq!(app.question_count(quiz_id).await, 0);
}

#[tokio::test]
async fn content_that_is_not_json_is_bad_gateway() {
    let body = json!({
        "choices": [{ "message": { "role": "assistant", "content": "```json\nnope" } }]
    })
    .to_string();
    let (mock_url, _mock) = spawn_mock(StatusCode::OK, body).await;
    let app = spawn_app(default_settings(&mock_url)).await;
    let quiz_id = app.create_quiz().await;

    let response = app.generate(quiz_id, mcq_request()).await;

    assert_eq!(response.status().as_u16(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("unexpected response format"));
}

#[tokio::test]
async fn stalled_service_hits_the_hard_deadline() {
    let stalled = spawn_stalled_server().await;
    let app = spawn_app(settings(
        &stalled,
        Some("test-key"),
        Duration::from_secs(60),
        Duration::from_millis(200),
    ))
    .await;
    let quiz_id = app.create_quiz().await;

    let started = Instant::now();
    let response = app.generate(quiz_id, mcq_request()).await;

    assert_eq!(response.status().as_u16(), 504);
    assert!(started.elapsed() < Duration::from_secs(5));
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("AI generation exceeded"));
    assert_eq!(app.question_count(quiz_id).await, 0);
}

#[tokio::test]
async fn stalled_service_hits_the_client_timeout() {
    let stalled = spawn_stalled_server().await;
    let app = spawn_app(settings(
        &stalled,
        Some("test-key"),
        Duration::from_millis(200),
        Duration::from_secs(10),
    ))
    .await;
    let quiz_id = app.create_quiz().await;

    let started = Instant::now();
    let response = app.generate(quiz_id, mcq_request()).await;

    assert_eq!(response.status().as_u16(), 504);
    assert!(started.elapsed() < Duration::from_secs(5));
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("request timed out"));
}

#[tokio::test]
async fn preview_returns_drafts_without_saving() {
    let (mock_url, _mock) = spawn_mock(StatusCode::OK, completion(mixed_mcq_items())).await;
    let app = spawn_app(default_settings(&mock_url)).await;
    let quiz_id = app.create_quiz().await;

    let response = app
        .client
        .post(format!(
            "{}/api/teacher/quizzes/{}/generate/preview",
            app.address, quiz_id
        ))
        .bearer_auth(&app.token)
        .json(&mcq_request())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let batch: Value = response.json().await.unwrap();
    assert_eq!(batch["questions"].as_array().unwrap().len(), 1);
    assert_eq!(batch["questions"][0]["question_type"], "mcq");
    assert_eq!(batch["questions"][0]["correct_option_index"], 1);
    assert_eq!(batch["discarded"], 2);
    assert_eq!(app.question_count(quiz_id).await, 0);

    // The reviewed drafts can be saved unchanged.
    let saved = app
        .client
        .post(format!(
            "{}/api/teacher/quizzes/{}/questions/batch",
            app.address, quiz_id
        ))
        .bearer_auth(&app.token)
        .json(&json!({ "questions": batch["questions"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(saved.status().as_u16(), 201);
    assert_eq!(app.question_count(quiz_id).await, 1);
}

#[tokio::test]
async fn invalid_requests_never_reach_the_service() {
    let (mock_url, mock) = spawn_mock(StatusCode::OK, completion(mixed_mcq_items())).await;
    let app = spawn_app(default_settings(&mock_url)).await;
    let quiz_id = app.create_quiz().await;

    let blank_topic = app
        .generate(quiz_id, json!({ "topic": "   ", "question_type": "mcq" }))
        .await;
    assert_eq!(blank_topic.status().as_u16(), 400);

    let too_many = app
        .generate(quiz_id, json!({ "topic": "Cells", "question_type": "mcq", "count": 50 }))
        .await;
    assert_eq!(too_many.status().as_u16(), 400);

    // Another teacher's quiz.
    let other = teacher_token(&app.client, &app.address).await;
    let foreign = app
        .client
        .post(format!("{}/api/teacher/quizzes/{}/generate", app.address, quiz_id))
        .bearer_auth(&other)
        .json(&mcq_request())
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status().as_u16(), 403);

    assert_eq!(mock.hits.load(Ordering::SeqCst), 0);
}
