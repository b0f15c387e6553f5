use core::time::Duration;
use courier::{Error, Result, Source, WorkItem};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Body of a rates endpoint response, e.g.
/// `{"base":"EUR","date":"2024-05-01","rates":{"USD":1.07,...}}`.
#[derive(Debug, Deserialize)]
pub struct RatesSnapshot {
    pub base: String,
    pub date: String,
    /// Sorted by currency code, which fixes the order items are partitioned
    /// in.
    pub rates: BTreeMap<String, f64>,
}

impl RatesSnapshot {
    /// One work item per currency, ordered by currency code.
    pub fn into_items(self) -> Vec<WorkItem> {
        let Self { base, date, rates } = self;
        rates
            .into_iter()
            .map(|(code, value)| WorkItem::rate(code, base.as_str(), value, date.as_str()))
            .collect()
    }
}

/// Fetches a currency rates snapshot over HTTP once per cycle.
#[derive(Debug, Clone)]
pub struct RatesSource {
    client: reqwest::Client,
    url: String,
}

fn upstream(url: &str, e: impl core::fmt::Display) -> Error {
    Error::UpstreamFetch {
        reason: format!("GET {url}: {e}"),
    }
}

impl RatesSource {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `url` does not parse or the
    /// HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|e| Error::InvalidConfiguration {
            reason: format!("invalid rates URL `{url}`: {e}"),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfiguration {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, url })
    }

    /// Uses a preconfigured client as is.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Source for RatesSource {
    async fn fetch(&self) -> Result<Vec<WorkItem>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| upstream(&self.url, e))?;

        let snapshot: RatesSnapshot = response
            .json()
            .await
            .map_err(|e| upstream(&self.url, e))?;

        tracing::debug!(
            base = %snapshot.base,
            date = %snapshot.date,
            rates = snapshot.rates.len(),
            "Fetched rates snapshot"
        );
        Ok(snapshot.into_items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier::Payload;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    const BODY: &str = r#"{"amount":1.0,"base":"EUR","date":"2024-05-01","rates":{"USD":1.0701,"AUD":1.6439,"JPY":166.89}}"#;

    /// Serves `status` and `body` to exactly one request and returns its URL.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });

        format!("http://{addr}/latest")
    }

    fn local_source(url: String) -> RatesSource {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        RatesSource::with_client(url, client)
    }

    #[test]
    fn snapshot_items_are_sorted_by_code() {
        let snapshot: RatesSnapshot = serde_json::from_str(BODY).unwrap();
        let items = snapshot.into_items();

        let names: Vec<_> = items.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, ["AUD", "JPY", "USD"]);

        let Payload::Rate(rate) = &items[2].payload else {
            panic!("expected a rate payload");
        };
        assert_eq!(rate.base, "EUR");
        assert_eq!(rate.date, "2024-05-01");
        assert_eq!(rate.value, 1.0701);
    }

    #[test]
    fn new_keeps_the_url() {
        let source = RatesSource::new("https://example.invalid/latest", Duration::from_secs(1));
        assert_eq!(source.unwrap().url(), "https://example.invalid/latest");
    }

    #[test]
    fn malformed_url_is_invalid_configuration() {
        let err = RatesSource::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[tokio::test]
    async fn fetches_snapshot_over_http() {
        let url = serve_once("200 OK", BODY).await;
        let source = local_source(url);

        let items = source.fetch().await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].name, "AUD");
    }

    #[tokio::test]
    async fn error_status_is_an_upstream_failure() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let source = local_source(url);

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFetch { .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_an_upstream_failure() {
        let url = serve_once("200 OK", r#"{"base":"EUR"}"#).await;
        let source = local_source(url);

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFetch { .. }));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_upstream_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = local_source(format!("http://{addr}/latest"));
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFetch { .. }));
    }
}
