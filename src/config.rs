// src/config.rs

use std::env;
use dotenvy::dotenv;
use url::Url;

pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub server_port: u16,
    pub admin_username: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,

    /// Missing key only disables question generation, the server still starts.
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub openrouter_base_url: String,
    /// Soft bound, handed to the HTTP client.
    pub openrouter_timeout_secs: u64,
    /// Hard wall-clock bound, enforced by the generation supervisor.
    pub openrouter_hard_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://quizmaster.db".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = parse_or("JWT_EXPIRATION", 86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let server_port = parse_or("SERVER_PORT", 3000);

        let openrouter_base_url = env::var("OPENROUTER_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_OPENROUTER_BASE_URL.to_string());
        Url::parse(&openrouter_base_url).expect("OPENROUTER_BASE_URL must be a valid URL");

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            server_port,
            admin_username: non_empty_var("ADMIN_USERNAME"),
            admin_email: non_empty_var("ADMIN_EMAIL"),
            admin_password: non_empty_var("ADMIN_PASSWORD"),
            openrouter_api_key: non_empty_var("OPENROUTER_API_KEY"),
            openrouter_model: env::var("OPENROUTER_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENROUTER_MODEL.to_string()),
            openrouter_base_url,
            openrouter_timeout_secs: parse_or("OPENROUTER_TIMEOUT_SECONDS", 25),
            openrouter_hard_timeout_secs: parse_or("OPENROUTER_HARD_TIMEOUT_SECONDS", 40),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
