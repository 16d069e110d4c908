//! Paged access to the remote listing service.
//!
//! [`ListingSource`] is the seam between the pagination loop and the wire:
//! [`HttpListingSource`] speaks the form-encoded POST protocol, tests plug in
//! in-memory sources.

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use wateroflife_shared::{CatalogError, Category, CrawlConfig, RawRecord, Result};

use crate::credential::{Anonymous, CredentialProvider, EnvCredential};

/// User-Agent string for listing requests.
const USER_AGENT: &str = concat!("WaterOfLife/", env!("CARGO_PKG_VERSION"));

/// Filter fields the listing endpoint expects on every request, always empty.
const PASSTHROUGH_FIELDS: [&str; 7] = ["min", "max", "firstChar", "type", "orderby", "order", "price"];

/// One decoded page of listing results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    /// Total page count as reported by this response.
    pub total_pages: i64,
    /// Records on this page, in service order.
    pub records: Vec<RawRecord>,
}

/// Anything that can serve numbered pages of raw records for a category.
pub trait ListingSource: Send + Sync {
    /// Fetch page `page` (1-based) of `category`.
    fn fetch_page(
        &self,
        category: Category,
        page: u32,
    ) -> impl Future<Output = Result<ListingPage>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Listing client for the remote spirits endpoint.
pub struct HttpListingSource {
    client: Client,
    endpoint: String,
    credential: Arc<dyn CredentialProvider>,
    config: CrawlConfig,
}

/// Outcome of one HTTP attempt that did not produce a page.
enum Failure {
    /// 401: refresh the credential and try again once.
    Unauthorized,
    /// Worth retrying after a backoff.
    Transient(CatalogError),
    /// Retrying cannot help.
    Fatal(CatalogError),
}

impl HttpListingSource {
    /// Build a client from runtime crawl settings, reading the credential
    /// from the configured environment variable.
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CatalogError::Transport(format!("failed to build HTTP client: {e}")))?;

        let credential: Arc<dyn CredentialProvider> = match config.credential_env.trim() {
            "" => Arc::new(Anonymous),
            var => Arc::new(EnvCredential::new(var)),
        };

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            credential,
            config: config.clone(),
        })
    }

    /// Replace the credential provider.
    pub fn with_credential(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credential = provider;
        self
    }

    async fn request_once(&self, category: Category, page: u32) -> std::result::Result<ListingPage, Failure> {
        let page_field = page.to_string();
        let mut form: Vec<(&str, &str)> = vec![("page", page_field.as_str()), ("variety", category.as_str())];
        form.extend(PASSTHROUGH_FIELDS.iter().map(|field| (*field, "")));

        let mut request = self.client.post(&self.endpoint).form(&form);
        if let Some(token) = self.credential.credential() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            Failure::Transient(CatalogError::Transport(format!(
                "{category} page {page}: {e}"
            )))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Failure::Unauthorized);
        }
        if !status.is_success() {
            let err = CatalogError::Transport(format!("{category} page {page}: HTTP {status}"));
            return Err(if is_transient(status) {
                Failure::Transient(err)
            } else {
                Failure::Fatal(err)
            });
        }

        let body = response.bytes().await.map_err(|e| {
            Failure::Transient(CatalogError::Transport(format!(
                "{category} page {page}: body read failed: {e}"
            )))
        })?;

        decode_listing(&body).map_err(|e| match e {
            CatalogError::Decode { message } => {
                Failure::Fatal(CatalogError::decode(format!("{category} page {page}: {message}")))
            }
            other => Failure::Fatal(other),
        })
    }
}

impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, category: Category, page: u32) -> Result<ListingPage> {
        let mut retries = 0u32;
        let mut refreshed = false;

        loop {
            debug!(%category, page, retries, "requesting listing page");
            match self.request_once(category, page).await {
                Ok(listing) => return Ok(listing),
                Err(Failure::Unauthorized) if !refreshed => {
                    warn!(%category, page, "listing rejected credential, refreshing");
                    self.credential.refresh()?;
                    refreshed = true;
                }
                Err(Failure::Unauthorized) => {
                    return Err(CatalogError::Transport(format!(
                        "{category} page {page}: HTTP 401 Unauthorized after credential refresh"
                    )));
                }
                Err(Failure::Transient(e)) if retries < self.config.max_retries => {
                    retries += 1;
                    let delay = self.config.backoff_delay(retries);
                    warn!(
                        %category,
                        page,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient listing failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Failure::Transient(e)) | Err(Failure::Fatal(e)) => return Err(e),
            }
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ListingResponse {
    pagination: Pagination,
    spirits: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    total_pages: Value,
}

/// Decode a listing response body.
///
/// `totalPages` is accepted as a number or a numeric string.
pub fn decode_listing(body: &[u8]) -> Result<ListingPage> {
    let response: ListingResponse = serde_json::from_slice(body)
        .map_err(|e| CatalogError::decode(format!("unexpected listing shape: {e}")))?;

    let total_pages = match &response.pagination.total_pages {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        CatalogError::decode(format!(
            "pagination.totalPages is not an integer: {}",
            response.pagination.total_pages
        ))
    })?;

    let records = response
        .spirits
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            RawRecord::from_value(value)
                .ok_or_else(|| CatalogError::decode(format!("spirits[{i}] is not an object")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ListingPage {
        total_pages,
        records,
    })
}

/// Runtime settings suitable for tests against a local mock server.
#[cfg(test)]
pub(crate) fn test_config(endpoint: &str) -> CrawlConfig {
    use std::time::Duration;

    CrawlConfig {
        endpoint: endpoint.to_string(),
        credential_env: "WATEROFLIFE_TEST_TOKEN_THAT_IS_NEVER_SET".into(),
        request_timeout: Duration::from_secs(5),
        rate_limit_ms: 0,
        max_retries: 2,
        backoff_base_ms: 1,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn listing_body(total_pages: i64, names: &[&str]) -> Value {
        json!({
            "pagination": { "totalPages": total_pages },
            "spirits": names.iter().map(|n| json!({ "title": n })).collect::<Vec<_>>(),
        })
    }

    #[test]
    fn decodes_listing_shape() {
        let body = serde_json::to_vec(&listing_body(3, &["Bombay Sapphire", "Tanqueray"])).unwrap();
        let page = decode_listing(&body).unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[1].get("title"), Some(&json!("Tanqueray")));
    }

    #[test]
    fn decodes_string_page_count() {
        let body = br#"{"pagination":{"totalPages":"4"},"spirits":[]}"#;
        assert_eq!(decode_listing(body).unwrap().total_pages, 4);
    }

    #[test]
    fn rejects_wrong_shapes() {
        for body in [
            &b"<html>maintenance</html>"[..],
            br#"{"spirits":[]}"#,
            br#"{"pagination":{"totalPages":"many"},"spirits":[]}"#,
            br#"{"pagination":{"totalPages":1},"spirits":[1, 2]}"#,
        ] {
            let err = decode_listing(body).unwrap_err();
            assert!(matches!(err, CatalogError::Decode { .. }), "{err}");
        }
    }

    #[tokio::test]
    async fn blank_credential_env_sends_no_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(1, &["Plymouth"])))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.credential_env = "  ".into();
        let source = HttpListingSource::new(&config).unwrap();
        source.fetch_page(Category::Gin, 1).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn posts_form_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("page=2"))
            .and(body_string_contains("variety=gin"))
            .and(body_string_contains("firstChar="))
            .and(body_string_contains("orderby="))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(2, &["Hendrick's"])))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpListingSource::new(&test_config(&server.uri())).unwrap();
        let page = source.fetch_page(Category::Gin, 2).await.unwrap();
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let source = HttpListingSource::new(&test_config(&server.uri())).unwrap();
        let err = source.fetch_page(Category::Rum, 1).await.unwrap_err();
        assert!(matches!(err, CatalogError::Transport(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(1, &["Plantation"])))
            .mount(&server)
            .await;

        let source = HttpListingSource::new(&test_config(&server.uri())).unwrap();
        let page = source.fetch_page(Category::Rum, 1).await.unwrap();
        assert_eq!(page.records.len(), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpListingSource::new(&test_config(&server.uri())).unwrap();
        let err = source.fetch_page(Category::Vodka, 1).await.unwrap_err();
        assert!(matches!(err, CatalogError::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let source = HttpListingSource::new(&test_config(&server.uri())).unwrap();
        let err = source.fetch_page(Category::Agave, 1).await.unwrap_err();
        assert!(matches!(err, CatalogError::Decode { .. }));
    }

    struct Rotating {
        refreshes: AtomicU32,
    }

    impl CredentialProvider for Rotating {
        fn credential(&self) -> Option<String> {
            Some(format!("token-{}", self.refreshes.load(Ordering::SeqCst)))
        }

        fn refresh(&self) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn refreshes_credential_once_on_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(1, &["Cognac"])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let provider = Arc::new(Rotating {
            refreshes: AtomicU32::new(0),
        });
        let source = HttpListingSource::new(&test_config(&server.uri()))
            .unwrap()
            .with_credential(provider.clone());

        let page = source.fetch_page(Category::Brandy, 1).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_401_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let source = HttpListingSource::new(&test_config(&server.uri())).unwrap();
        let err = source.fetch_page(Category::Liqueur, 1).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
