use crate::error::{Result, ScanError};
use reqwest::Client;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "Marketsweep/0.1 (+https://github.com/trapdoorsec/marketsweep)";

/// Raw response of a page fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub response_time: Duration,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turns a non-2xx page into `ScanError::UnexpectedStatus`.
    pub fn into_success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ScanError::UnexpectedStatus {
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// Network boundary of the pipeline. One request at a time; the timeout is a
/// property of the implementation.
pub trait PageFetcher {
    /// Fetches a page. Non-2xx responses are returned as pages, not errors.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedPage>> + Send;

    /// Fetches a binary resource, failing on non-2xx responses.
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        Self::with_options(timeout_secs, DEFAULT_USER_AGENT)
    }

    pub fn with_options(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            timeout_secs,
        })
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        debug!(url, "Fetching page");

        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let response_time = start.elapsed();

        debug!(url, status, elapsed_ms = response_time.as_millis() as u64, "Fetched page");

        Ok(FetchedPage {
            url: url.to_string(),
            status,
            body,
            response_time,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url, "Fetching resource");

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(ScanError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[tokio::test]
    async fn test_fetch_returns_body_and_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body>hello</body></html>"),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let page = fetcher.fetch(&mock_server.uri()).await.unwrap();

        assert_eq!(page.status, 200);
        assert!(page.is_success());
        assert!(page.body.contains("hello"));
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_a_page_not_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let page = fetcher
            .fetch(&format!("{}/missing", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(page.status, 404);
        assert!(!page.is_success());
        assert!(matches!(
            page.into_success(),
            Err(ScanError::UnexpectedStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_bytes_fails_on_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let bytes = fetcher
            .fetch_bytes(&format!("{}/img.jpg", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        let err = fetcher
            .fetch_bytes(&format!("{}/gone.jpg", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::UnexpectedStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_an_error() {
        let fetcher = HttpFetcher::with_timeout(2).unwrap();
        let result = fetcher.fetch("http://127.0.0.1:9/").await;
        assert!(result.is_err());
    }
}
