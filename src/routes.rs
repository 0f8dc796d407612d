// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, student, teacher},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, student_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Public auth routes, then one sub-router per role.
/// * Each role router runs `auth_middleware` first, then its role check.
/// * Global middleware: Trace, CORS.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let admin_routes = Router::new()
        .route("/dashboard", get(admin::dashboard))
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/question-audit", get(admin::question_audit))
        .route("/question-audit/repair", post(admin::repair_questions))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let teacher_routes = Router::new()
        .route("/dashboard", get(teacher::dashboard))
        .route("/quizzes", post(teacher::create_quiz))
        .route(
            "/quizzes/{id}",
            get(teacher::get_quiz)
                .put(teacher::update_quiz)
                .delete(teacher::delete_quiz),
        )
        .route("/quizzes/{id}/questions", post(teacher::add_question))
        .route("/quizzes/{id}/questions/batch", post(teacher::add_questions_batch))
        .route("/quizzes/{id}/generate", post(teacher::generate_questions))
        .route("/quizzes/{id}/generate/preview", post(teacher::preview_questions))
        .route("/quizzes/{id}/publish", post(teacher::publish_quiz))
        .route("/quizzes/{id}/results", get(teacher::quiz_results))
        .route("/questions/{id}", delete(teacher::delete_question))
        .layer(middleware::from_fn(teacher_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let student_routes = Router::new()
        .route("/dashboard", get(student::dashboard))
        .route("/quizzes/{id}", get(student::start_quiz))
        .route("/quizzes/{id}/submit", post(student::submit_quiz))
        .route("/results", get(student::results))
        .layer(middleware::from_fn(student_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/teacher", teacher_routes)
        .nest("/api/student", student_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
