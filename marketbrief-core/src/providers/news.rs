//! News provider: Finnhub-style company-news endpoint.
//!
//! Requires `FINNHUB_API_KEY`. Articles normalize into [`EventRecord`]s
//! with type `"news"`; the provider's numeric article id becomes the
//! event id. Date ranges are inclusive on both ends.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::{ConfigError, Credentials};
use crate::domain::EventRecord;
use crate::fetch::{error_for_status, FetchError, FetchPolicy};

use super::{ProviderAdapter, SeriesQuery};

const BASE_URL: &str = "https://finnhub.io/api/v1/company-news";

pub const PROVIDER_NAME: &str = "finnhub";

#[derive(Debug, Deserialize)]
struct Article {
    id: i64,
    datetime: i64,
    headline: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Company news as dated events.
pub struct NewsProvider {
    client: reqwest::blocking::Client,
    policy: FetchPolicy,
    api_key: String,
}

impl NewsProvider {
    pub fn new(policy: FetchPolicy, credentials: &Credentials) -> Result<Self, ConfigError> {
        let api_key = credentials.finnhub_api_key()?.to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Ok(Self {
            client,
            policy,
            api_key,
        })
    }
}

impl ProviderAdapter for NewsProvider {
    type Record = EventRecord;

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn endpoint(&self) -> &'static str {
        "company_news"
    }

    fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    fn call_live(&self, query: &SeriesQuery) -> Result<Vec<EventRecord>, FetchError> {
        let params = [
            ("symbol", query.symbol.clone()),
            ("from", query.start.to_string()),
            ("to", query.end.to_string()),
            ("token", self.api_key.clone()),
        ];

        let response = self
            .client
            .get(BASE_URL)
            .query(&params)
            .send()
            .map_err(|e| FetchError::Network {
                provider: PROVIDER_NAME.into(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(error_for_status(PROVIDER_NAME, status.as_u16(), message));
        }

        let articles: Vec<Article> = response.json().map_err(|e| FetchError::Decode {
            provider: PROVIDER_NAME.into(),
            message: format!("company news for {}: {e}", query.symbol),
        })?;

        normalize_articles(&query.symbol, articles)
    }
}

fn normalize_articles(
    symbol: &str,
    articles: Vec<Article>,
) -> Result<Vec<EventRecord>, FetchError> {
    let mut events = Vec::with_capacity(articles.len());
    for article in articles {
        let timestamp = chrono::DateTime::from_timestamp(article.datetime, 0)
            .map(|dt| dt.naive_utc())
            .ok_or_else(|| FetchError::Decode {
                provider: PROVIDER_NAME.into(),
                message: format!("invalid article timestamp: {}", article.datetime),
            })?;

        events.push(EventRecord {
            event_id: article.id.to_string(),
            event_type: "news".to_string(),
            timestamp,
            symbol: Some(symbol.to_string()),
            details: json!({
                "headline": article.headline,
                "summary": article.summary,
                "url": article.url,
                "category": article.category,
                "publisher": article.source,
            }),
            source: PROVIDER_NAME.to_string(),
        });
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_articles_into_events() {
        let articles: Vec<Article> = serde_json::from_str(
            r#"[
                {"id": 7654321, "datetime": 1673784000,
                 "headline": "Apple announces results",
                 "category": "company", "source": "Reuters",
                 "summary": "Q1 earnings.", "url": "https://example.com/a"},
                {"id": 7654322, "datetime": 1673870400,
                 "headline": "Supply chain update"}
            ]"#,
        )
        .unwrap();

        let events = normalize_articles("AAPL", articles).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, "7654321");
        assert_eq!(events[0].event_type, "news");
        assert_eq!(events[0].symbol.as_deref(), Some("AAPL"));
        assert_eq!(events[0].source, "finnhub");
        assert_eq!(
            events[0].details["headline"],
            "Apple announces results"
        );
        assert_eq!(events[1].details["summary"], serde_json::Value::Null);
        assert_eq!(events[0].timestamp.to_string(), "2023-01-15 12:00:00");
    }

    #[test]
    fn missing_credential_is_a_config_fault() {
        let credentials = Credentials::for_tests(None, None, None);
        let policy = FetchPolicy::new(
            crate::fetch::CircuitBreaker::with_defaults(PROVIDER_NAME),
            crate::fetch::RetryPolicy::default(),
        );
        assert!(matches!(
            NewsProvider::new(policy, &credentials),
            Err(ConfigError::MissingCredential {
                provider: "finnhub",
                ..
            })
        ));
    }
}
