use std::future::Future;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{DocumentApi, RemoteError, RemoteResource, RemoteUser, ResourceWrite};
use crate::sync::config::SyncSettings;

/// Page size requested when listing resources
const LIST_PAGE_SIZE: usize = 100;

/// Upper bound on pages fetched by one listing
const MAX_LIST_PAGES: u32 = 50;

/// HTTP client for the remote document API
pub struct HttpDocumentClient {
    client: Client,
    base_url: String,
    token_exchange_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenExchangeResponse {
    #[serde(default, alias = "access_token")]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, alias = "error_description")]
    error_description: Option<String>,
}

impl HttpDocumentClient {
    /// Create a new client
    pub fn new(settings: &SyncSettings) -> Result<Self, RemoteError> {
        // Normalize URL - ensure no trailing slash
        let base_url = settings.api_base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(settings.connect_timeout())
            .user_agent(settings.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url,
            token_exchange_url: settings.token_exchange_url.clone(),
        })
    }

    /// Build full URL for a path
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request and decode a JSON success body
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::debug!("Remote request failed: {} {}", status, body);
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Fetch numbered pages starting at 1 until one comes back short
async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, RemoteError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, RemoteError>>,
{
    let mut items = Vec::new();
    for page in 1..=MAX_LIST_PAGES {
        let batch = fetch(page).await?;
        let last = batch.len() < LIST_PAGE_SIZE;
        items.extend(batch);
        if last {
            return Ok(items);
        }
    }
    log::warn!(
        "Resource listing stopped after {} pages, {} resources seen",
        MAX_LIST_PAGES,
        items.len()
    );
    Ok(items)
}

#[async_trait]
impl DocumentApi for HttpDocumentClient {
    async fn create_resource(
        &self,
        token: &str,
        body: &ResourceWrite,
    ) -> Result<RemoteResource, RemoteError> {
        log::debug!("POST /resources label='{}'", body.label);
        let request = self
            .client
            .post(self.url("resources"))
            .bearer_auth(token)
            .json(body);
        self.send_json(request).await
    }

    async fn update_resource(
        &self,
        token: &str,
        id: &str,
        body: &ResourceWrite,
    ) -> Result<RemoteResource, RemoteError> {
        log::debug!("PATCH /resources/{}", id);
        let request = self
            .client
            .patch(self.url(&format!("resources/{}", id)))
            .bearer_auth(token)
            .json(body);
        self.send_json(request).await
    }

    async fn read_resource(&self, token: &str, id: &str) -> Result<RemoteResource, RemoteError> {
        log::debug!("GET /resources/{}", id);
        let request = self
            .client
            .get(self.url(&format!("resources/{}", id)))
            .bearer_auth(token);
        self.send_json(request).await
    }

    async fn list_resources(&self, token: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        let this = self;
        collect_pages(move |page| {
            log::debug!("GET /resources page={}", page);
            let request = this
                .client
                .get(this.url("resources"))
                .query(&[
                    ("per_page", LIST_PAGE_SIZE.to_string()),
                    ("page", page.to_string()),
                ])
                .bearer_auth(token);
            this.send_json(request)
        })
        .await
    }

    async fn current_user(&self, token: &str) -> Result<RemoteUser, RemoteError> {
        let request = self.client.get(self.url("user")).bearer_auth(token);
        self.send_json(request).await
    }

    async fn exchange_code(&self, code: &str) -> Result<String, RemoteError> {
        let url = self.token_exchange_url.as_deref().ok_or_else(|| {
            RemoteError::InvalidUrl("no token exchange endpoint configured".to_string())
        })?;

        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "code": code }));
        let response: TokenExchangeResponse = self.send_json(request).await?;

        if let Some(error) = response.error {
            let detail = response.error_description.unwrap_or_default();
            return Err(RemoteError::Rejected(
                format!("{} {}", error, detail).trim().to_string(),
            ));
        }

        response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RemoteError::Rejected("response contained no access token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_rejects_non_http_url() {
        let settings = SyncSettings::new("ftp://docs.example.com");
        assert!(matches!(
            HttpDocumentClient::new(&settings),
            Err(RemoteError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_url_building() {
        let client = HttpDocumentClient::new(&SyncSettings::new("https://docs.example.com/api/")).unwrap();
        assert_eq!(client.url("resources"), "https://docs.example.com/api/resources");
        assert_eq!(client.url("/resources/abc"), "https://docs.example.com/api/resources/abc");
    }

    #[test]
    fn test_token_exchange_response_shapes() {
        let camel: TokenExchangeResponse =
            serde_json::from_str(r#"{"accessToken": "t-1"}"#).unwrap();
        assert_eq!(camel.access_token.as_deref(), Some("t-1"));

        let snake: TokenExchangeResponse =
            serde_json::from_str(r#"{"access_token": "t-2", "scope": "docs"}"#).unwrap();
        assert_eq!(snake.access_token.as_deref(), Some("t-2"));

        let failed: TokenExchangeResponse =
            serde_json::from_str(r#"{"error": "bad_verification_code"}"#).unwrap();
        assert!(failed.access_token.is_none());
        assert_eq!(failed.error.as_deref(), Some("bad_verification_code"));
    }

    type Page = std::future::Ready<Result<Vec<usize>, RemoteError>>;

    fn serve_pages(total: usize, fetched: &Cell<u32>) -> impl FnMut(u32) -> Page + '_ {
        move |page| {
            fetched.set(fetched.get() + 1);
            let start = (page as usize - 1) * LIST_PAGE_SIZE;
            let end = total.min(start + LIST_PAGE_SIZE);
            std::future::ready(Ok((start..end.max(start)).collect()))
        }
    }

    #[tokio::test]
    async fn test_listing_follows_pages() {
        let fetched = Cell::new(0);
        let items = collect_pages(serve_pages(250, &fetched)).await.unwrap();

        assert_eq!(items.len(), 250);
        assert_eq!(items[249], 249);
        assert_eq!(fetched.get(), 3);
    }

    #[tokio::test]
    async fn test_listing_full_last_page_needs_one_more_request() {
        let fetched = Cell::new(0);
        let items = collect_pages(serve_pages(200, &fetched)).await.unwrap();

        assert_eq!(items.len(), 200);
        assert_eq!(fetched.get(), 3);
    }

    #[tokio::test]
    async fn test_listing_stops_on_error() {
        let result: Result<Vec<usize>, _> = collect_pages(|page| {
            std::future::ready(if page == 2 {
                Err(RemoteError::Status {
                    status: 502,
                    body: String::new(),
                })
            } else {
                Ok((0..LIST_PAGE_SIZE).collect())
            })
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Status { status: 502, .. })));
    }

    #[tokio::test]
    async fn test_exchange_without_endpoint() {
        let client = HttpDocumentClient::new(&SyncSettings::new("https://docs.example.com")).unwrap();
        assert!(matches!(
            client.exchange_code("abc").await,
            Err(RemoteError::InvalidUrl(_))
        ));
    }
}
