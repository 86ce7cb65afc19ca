//! The engine's small REST surface: pattern name listing.
//!
//! The serve endpoint has answered with two shapes over time, a flat
//! JSON array and an object wrapping one, so both are decoded. The
//! result distinguishes "server reachable but has no patterns" from
//! "server unreachable" because the two call for different UI states.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build HTTP client")
});

pub(crate) fn shared_client() -> &'static Client {
    &SHARED_HTTP
}

/// Outcome of asking the engine for its pattern names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternListing {
    /// Sorted, non-empty list of pattern names.
    Patterns(Vec<String>),
    /// The server answered but offered nothing usable.
    Empty,
    /// The server could not be reached at all.
    Unreachable,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternNamesBody {
    Flat(Vec<String>),
    Wrapped { patterns: Vec<String> },
}

/// Client for the engine's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct EngineApi {
    base_url: String,
}

impl EngineApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches and sorts the pattern names.
    pub async fn list_patterns(&self) -> PatternListing {
        let url = format!("{}/patterns/names", self.base_url);
        let response = match shared_client()
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                info!(error = %err, "pattern listing unreachable");
                return PatternListing::Unreachable;
            }
        };
        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "pattern listing rejected");
            return PatternListing::Empty;
        }
        let mut names = match response.json::<PatternNamesBody>().await {
            Ok(PatternNamesBody::Flat(names)) => names,
            Ok(PatternNamesBody::Wrapped { patterns }) => patterns,
            Err(err) => {
                warn!(error = %err, "pattern listing malformed");
                return PatternListing::Empty;
            }
        };
        if names.is_empty() {
            return PatternListing::Empty;
        }
        names.sort();
        PatternListing::Patterns(names)
    }
}

/// Case-insensitive substring filter for the pattern picker. An empty
/// or whitespace query keeps everything.
pub fn filter_patterns<'a>(patterns: &'a [String], query: &str) -> Vec<&'a str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return patterns.iter().map(String::as_str).collect();
    }
    patterns
        .iter()
        .filter(|pattern| pattern.to_lowercase().contains(&query))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_once(status: u16, body: &'static str) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let _ = request.respond(tiny_http::Response::from_string(body).with_status_code(status));
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_flat_list_is_sorted() {
        let base = serve_once(200, r#"["summarize","analyze_claims","extract_wisdom"]"#);
        let listing = EngineApi::new(base).list_patterns().await;
        assert_eq!(
            listing,
            PatternListing::Patterns(vec![
                "analyze_claims".to_string(),
                "extract_wisdom".to_string(),
                "summarize".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_wrapped_object_shape_accepted() {
        let base = serve_once(200, r#"{"patterns":["b","a"]}"#);
        let listing = EngineApi::new(base).list_patterns().await;
        assert_eq!(
            listing,
            PatternListing::Patterns(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_empty_list_is_distinct_from_unreachable() {
        let base = serve_once(200, "[]");
        assert_eq!(EngineApi::new(base).list_patterns().await, PatternListing::Empty);
    }

    #[tokio::test]
    async fn test_error_status_yields_empty() {
        let base = serve_once(500, "oops");
        assert_eq!(EngineApi::new(base).list_patterns().await, PatternListing::Empty);
    }

    #[tokio::test]
    async fn test_malformed_body_yields_empty() {
        let base = serve_once(200, "{not json");
        assert_eq!(EngineApi::new(base).list_patterns().await, PatternListing::Empty);
    }

    #[tokio::test]
    async fn test_connection_failure_yields_unreachable() {
        let api = EngineApi::new("http://127.0.0.1:9");
        assert_eq!(api.list_patterns().await, PatternListing::Unreachable);
    }

    #[test]
    fn test_filter_patterns_case_insensitive() {
        let patterns = vec![
            "analyze_claims".to_string(),
            "create_summary".to_string(),
            "summarize".to_string(),
        ];
        assert_eq!(filter_patterns(&patterns, "SUMM"), vec!["create_summary", "summarize"]);
        assert_eq!(filter_patterns(&patterns, ""), vec![
            "analyze_claims",
            "create_summary",
            "summarize",
        ]);
        assert_eq!(filter_patterns(&patterns, "  claims "), vec!["analyze_claims"]);
        assert!(filter_patterns(&patterns, "nope").is_empty());
    }
}
