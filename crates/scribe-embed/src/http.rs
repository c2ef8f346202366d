//! Shared HTTP client construction and response classification.

use std::time::Duration;

use crate::error::EmbedError;

/// Create a shared HTTP client with standard configuration.
///
/// Config: 10s connect timeout, 120s overall ceiling, rustls TLS,
/// `scribe/{version}` user-agent. Per-request deadlines are enforced by the
/// [`Embedder`](crate::Embedder).
///
/// # Errors
///
/// Returns [`EmbedError::Config`] if the TLS backend cannot be initialised.
pub(crate) fn default_client() -> Result<reqwest::Client, EmbedError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("scribe/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| EmbedError::Config(format!("HTTP client construction failed: {e}")))
}

/// Parse the `Retry-After` header value as whole seconds.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Read the body of a response, mapping non-success statuses onto the
/// retryable / permanent split.
pub(crate) async fn read_body(
    provider: &str,
    response: reqwest::Response,
) -> Result<String, EmbedError> {
    let status = response.status();
    let hint = retry_after(&response);
    let body = response.text().await?;

    if status.is_success() {
        return Ok(body);
    }

    let message = error_message(&body);
    tracing::warn!(provider, %status, "embedding API error: {message}");

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(EmbedError::Status {
            provider: provider.to_owned(),
            status: status.as_u16(),
            message,
            retry_after: hint,
        })
    } else {
        Err(EmbedError::Rejected {
            provider: provider.to_owned(),
            status: status.as_u16(),
            message,
        })
    }
}

/// Pull `error.message` (OpenAI shape) or `error` (Ollama shape) out of a
/// JSON error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        let err = v.get("error")?;
        err.get("message")
            .and_then(serde_json::Value::as_str)
            .or_else(|| err.as_str())
            .map(str::to_owned)
    });
    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.len() > 512 {
            let mut cut = 512;
            while !trimmed.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}...", &trimmed[..cut])
        } else {
            trimmed.to_owned()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_openai_shape() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
    }

    #[test]
    fn error_message_ollama_shape() {
        let body = r#"{"error":"model \"nomic\" not found"}"#;
        assert_eq!(error_message(body), "model \"nomic\" not found");
    }

    #[test]
    fn error_message_plain_text() {
        assert_eq!(error_message("  bad gateway \n"), "bad gateway");
    }

    #[test]
    fn error_message_truncates_long_bodies() {
        let body = "é".repeat(600);
        let msg = error_message(&body);
        assert!(msg.ends_with("..."));
        assert!(msg.len() <= 515);
    }

    #[test]
    fn default_client_builds() {
        assert!(default_client().is_ok());
    }
}
