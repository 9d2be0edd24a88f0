// Remote profanity-filter adapter.
//
// Talks to an api-ninjas style profanity endpoint:
//   GET <url>?text=<text>   (header X-Api-Key)
//   -> {"original": "...", "censored": "...", "has_profanity": bool}
//
// The service only returns a boolean plus a censored copy of the text, so
// the flagged terms are recovered by lining up the original and censored
// tokens. Network errors, non-2xx responses and unparseable bodies all
// turn into an abstaining outcome; nothing is thrown past `evaluate`.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::cache::{verdict_cache, VerdictCache};
use super::keyword::normalize;
use super::rate_limiter::RateLimiter;
use super::traits::{Modality, SignalInput, SignalOutcome, SignalSource, SourceKind};
use crate::output::truncate_chars;

pub const DEFAULT_PROFANITY_API_URL: &str = "https://api.api-ninjas.com/v1/profanityfilter";

/// Category the remote verdict is reported under.
pub const PROFANITY_CATEGORY: &str = "profanity";

/// Severity when the service reports profanity ("high" confidence).
pub const FLAGGED_SEVERITY: f64 = 0.9;

/// Response body of the profanity filter.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfanityResponse {
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub censored: String,
    pub has_profanity: bool,
}

pub struct RemoteProfanitySignal {
    client: Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
    rate_limiter: RateLimiter,
    cache: Option<VerdictCache>,
}

impl RemoteProfanitySignal {
    pub const ID: &'static str = "remote_profanity";

    /// Create an adapter. `min_interval` is the spacing enforced between
    /// consecutive calls.
    pub fn new(
        api_url: &str,
        api_key: String,
        timeout: Duration,
        min_interval: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("sieve/0.1 (content-moderation)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            rate_limiter: RateLimiter::new(min_interval),
            cache: None,
        })
    }

    /// Memoize successful verdicts per normalized text.
    pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache = Some(verdict_cache(ttl, capacity));
        self
    }

    async fn query(&self, text: &str) -> Result<ProfanityResponse> {
        self.rate_limiter.acquire().await;

        let response = self
            .client
            .get(&self.api_url)
            .header("X-Api-Key", &self.api_key)
            .query(&[("text", text)])
            .send()
            .await
            .context("Profanity API request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Profanity API returned {}: {}", status, body);
        }

        response
            .json::<ProfanityResponse>()
            .await
            .context("Failed to parse profanity API response")
    }
}

/// Tokens of `original` whose counterpart in `censored` was masked.
/// Normalized, punctuation-trimmed, deduplicated in first-seen order.
pub fn flagged_terms(original: &str, censored: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for (orig, masked) in original.split_whitespace().zip(censored.split_whitespace()) {
        if !masked.contains('*') {
            continue;
        }
        let term = normalize(orig.trim_matches(|c: char| !c.is_alphanumeric()));
        if !term.is_empty() && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Convert a service response into a signal outcome.
pub fn outcome_from_response(response: &ProfanityResponse) -> SignalOutcome {
    let terms = if response.has_profanity {
        flagged_terms(&response.original, &response.censored)
    } else {
        Vec::new()
    };

    let severity = if response.has_profanity {
        FLAGGED_SEVERITY
    } else {
        0.0
    };
    let mut categories = BTreeMap::new();
    categories.insert(PROFANITY_CATEGORY.to_string(), severity);

    SignalOutcome::scored(
        RemoteProfanitySignal::ID,
        SourceKind::Remote,
        Modality::Text,
        terms,
        categories,
    )
}

#[async_trait]
impl SignalSource for RemoteProfanitySignal {
    fn id(&self) -> &str {
        Self::ID
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    fn supports(&self, modality: Modality) -> bool {
        modality == Modality::Text
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn evaluate(&self, input: SignalInput<'_>) -> SignalOutcome {
        let text = match input {
            SignalInput::Text(text) => text,
            SignalInput::Image(_) => {
                return SignalOutcome::abstain(
                    Self::ID,
                    SourceKind::Remote,
                    Modality::Image,
                    "profanity filter only accepts text",
                )
            }
        };

        let key = normalize(text);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&key).await {
                debug!(text_preview = %truncate_chars(text, 50), "Remote verdict served from cache");
                return cached;
            }
        }

        match self.query(text).await {
            Ok(response) => {
                let outcome = outcome_from_response(&response);
                debug!(
                    has_profanity = response.has_profanity,
                    flagged = outcome.matched_terms.len(),
                    text_preview = %truncate_chars(text, 50),
                    "Remote profanity check complete"
                );
                if let Some(cache) = &self.cache {
                    cache.insert(key, outcome.clone()).await;
                }
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Remote profanity check failed, abstaining");
                SignalOutcome::abstain(Self::ID, SourceKind::Remote, Modality::Text, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP/1.1 server replaying canned responses in order (the last
    /// one repeats) and keeping the head of every request it received.
    struct StubServer {
        url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start(responses: Vec<String>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = requests.clone();

            tokio::spawn(async move {
                let mut served = 0;
                while let Ok((mut socket, _)) = listener.accept().await {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    seen.lock().unwrap().push(String::from_utf8_lossy(&head).into_owned());

                    let response = &responses[served.min(responses.len() - 1)];
                    served += 1;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self {
                url: format!("http://{addr}/v1/profanityfilter"),
                requests,
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn signal_for(server: &StubServer) -> RemoteProfanitySignal {
        RemoteProfanitySignal::new(
            &server.url,
            "secret-key".to_string(),
            Duration::from_secs(2),
            Duration::from_millis(0),
        )
        .unwrap()
    }

    #[test]
    fn test_deserialize_service_response() {
        let json = r#"{"original": "damn it", "censored": "**** it", "has_profanity": true}"#;
        let resp: ProfanityResponse = serde_json::from_str(json).unwrap();
        assert!(resp.has_profanity);
        assert_eq!(resp.censored, "**** it");
    }

    #[test]
    fn test_deserialize_minimal_response() {
        let resp: ProfanityResponse = serde_json::from_str(r#"{"has_profanity": false}"#).unwrap();
        assert!(!resp.has_profanity);
        assert!(resp.original.is_empty());
    }

    #[test]
    fn test_flagged_terms_align_tokens() {
        let terms = flagged_terms("Well, Damn! that crap, damn", "Well, ****! that ****, ****");
        assert_eq!(terms, vec!["damn", "crap"]);
    }

    #[test]
    fn test_flagged_outcome_is_high_severity() {
        let resp = ProfanityResponse {
            original: "damn it".to_string(),
            censored: "**** it".to_string(),
            has_profanity: true,
        };
        let outcome = outcome_from_response(&resp);
        assert!(outcome.succeeded);
        assert_eq!(outcome.matched_terms, vec!["damn"]);
        assert_eq!(outcome.categories[PROFANITY_CATEGORY], FLAGGED_SEVERITY);
    }

    #[test]
    fn test_clean_outcome_is_zero_severity() {
        let resp = ProfanityResponse {
            original: "hello".to_string(),
            censored: "hello".to_string(),
            has_profanity: false,
        };
        let outcome = outcome_from_response(&resp);
        assert!(outcome.matched_terms.is_empty());
        assert_eq!(outcome.severity, Some(0.0));
    }

    #[tokio::test]
    async fn test_unreachable_service_abstains() {
        // Port 9 (discard) on localhost is not an HTTP server
        let signal = RemoteProfanitySignal::new(
            "http://127.0.0.1:9/v1/profanityfilter",
            "key".to_string(),
            Duration::from_millis(500),
            Duration::from_millis(0),
        )
        .unwrap();
        let outcome = signal.evaluate(SignalInput::Text("hello")).await;
        assert!(!outcome.succeeded);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_request_carries_key_header_and_text_query() {
        let server = StubServer::start(vec![http_response(
            "200 OK",
            r#"{"original": "hello", "censored": "hello", "has_profanity": false}"#,
        )])
        .await;
        let signal = signal_for(&server);

        let outcome = signal.evaluate(SignalInput::Text("hello")).await;
        assert!(outcome.succeeded);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let request = requests[0].to_lowercase();
        assert!(
            request.starts_with("get /v1/profanityfilter?text=hello "),
            "request line: {}",
            request.lines().next().unwrap_or_default()
        );
        assert!(request.contains("x-api-key: secret-key\r\n"));
    }

    #[tokio::test]
    async fn test_throttled_and_malformed_responses_abstain() {
        let server = StubServer::start(vec![
            http_response("429 Too Many Requests", r#"{"error": "slow down"}"#),
            http_response("200 OK", r#"{"original": "hello", "censored""#),
        ])
        .await;
        let signal = signal_for(&server);

        let throttled = signal.evaluate(SignalInput::Text("first")).await;
        assert!(!throttled.succeeded);
        assert!(throttled.error.as_deref().unwrap_or_default().contains("429"));

        let malformed = signal.evaluate(SignalInput::Text("second")).await;
        assert!(!malformed.succeeded);
        assert!(malformed.error.is_some());
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cached_verdict_skips_second_request() {
        let server = StubServer::start(vec![http_response(
            "200 OK",
            r#"{"original": "damn it", "censored": "**** it", "has_profanity": true}"#,
        )])
        .await;
        let signal = signal_for(&server).with_cache(Duration::from_secs(60), 16);

        let first = signal.evaluate(SignalInput::Text("damn it")).await;
        let second = signal.evaluate(SignalInput::Text("damn it")).await;

        assert_eq!(first.matched_terms, vec!["damn"]);
        assert_eq!(second.matched_terms, first.matched_terms);
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_request_is_not_cached() {
        let server = StubServer::start(vec![
            http_response("429 Too Many Requests", ""),
            http_response(
                "200 OK",
                r#"{"original": "hello", "censored": "hello", "has_profanity": false}"#,
            ),
        ])
        .await;
        let signal = signal_for(&server).with_cache(Duration::from_secs(60), 16);

        assert!(!signal.evaluate(SignalInput::Text("hello")).await.succeeded);
        assert!(signal.evaluate(SignalInput::Text("hello")).await.succeeded);
        assert_eq!(server.requests().len(), 2);
    }
}
