// src/generation/client.rs

use std::{error::Error as _, future::Future, time::Duration};

use reqwest::Client;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::generation::{GenerationError, prompt::ChatRequest};

/// Longest slice of a remote error body surfaced to the teacher.
const ERROR_BODY_EXCERPT: usize = 500;

/// Aborts the owned task when dropped, so the supervised call never outlives its caller.
struct TaskGuard<T>(JoinHandle<T>);

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs `work` on its own task and gives up after `deadline` of wall-clock time.
///
/// The deadline does not depend on `work` cooperating: on expiry the task is
/// aborted, which drops the future together with any connection it holds.
pub async fn with_deadline<T, F>(deadline: Duration, work: F) -> Result<T, GenerationError>
where
    F: Future<Output = Result<T, GenerationError>> + Send + 'static,
    T: Send + 'static,
{
    let mut task = TaskGuard(tokio::spawn(work));

    match tokio::time::timeout(deadline, &mut task.0).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(GenerationError::Transport(format!(
            "generation task failed: {}",
            join_err
        ))),
        Err(_) => {
            tracing::warn!("Generation call exceeded hard deadline of {:?}", deadline);
            Err(GenerationError::HardTimeout(deadline))
        }
    }
}

/// Single POST to the completion endpoint, bounded by the soft `timeout`.
///
/// Returns the parsed top-level JSON body.
pub async fn post_completion(
    client: Client,
    endpoint: String,
    api_key: String,
    body: ChatRequest,
    timeout: Duration,
) -> Result<Value, GenerationError> {
    let response = client
        .post(&endpoint)
        .bearer_auth(&api_key)
        .json(&body)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(GenerationError::Remote {
            status: status.as_u16(),
            body: excerpt(&text),
        });
    }

    let raw = response.text().await.map_err(|e| classify(e, timeout))?;

    serde_json::from_str(&raw).map_err(|e| {
        GenerationError::MalformedResponse(format!("response body is not JSON: {}", e))
    })
}

fn classify(err: reqwest::Error, timeout: Duration) -> GenerationError {
    if err.is_timeout() {
        return GenerationError::SoftTimeout(timeout);
    }

    // reqwest's own message is generic; the cause chain names the real failure.
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    GenerationError::Transport(reason)
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
