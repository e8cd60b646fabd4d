use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;

const BULK_CHUNK_SIZE: usize = 100;
const BULK_CHUNK_SLEEP: Duration = Duration::from_millis(50);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClobPricesError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriceQuote {
    pub buy: Option<Decimal>,
    pub sell: Option<Decimal>,
}

impl PriceQuote {
    pub fn mid(&self) -> Option<Decimal> {
        match (self.buy, self.sell) {
            (Some(b), Some(s)) => Some((b + s) / Decimal::TWO),
            (Some(b), None) => Some(b),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "BUY")]
    buy: Option<String>,
    #[serde(rename = "SELL")]
    sell: Option<String>,
}

/// Bulk CLOB midpoint-price fetcher, grounded on the teacher's
/// `reqwest::Client`-backed client shape.
pub struct ClobPricesClient {
    http: Client,
    base_url: String,
}

impl ClobPricesClient {
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self { http, base_url }
    }

    pub async fn get_prices_bulk(
        &self,
        token_ids: &[String],
    ) -> HashMap<String, PriceQuote> {
        let mut out = HashMap::with_capacity(token_ids.len());
        for chunk in token_ids.chunks(BULK_CHUNK_SIZE) {
            match self.fetch_chunk(chunk).await {
                Ok(quotes) => out.extend(quotes),
                Err(e) => tracing::warn!(error = %e, "bulk price fetch chunk failed, skipping"),
            }
            sleep(BULK_CHUNK_SLEEP).await;
        }
        out
    }

    async fn fetch_chunk(
        &self,
        token_ids: &[String],
    ) -> Result<HashMap<String, PriceQuote>, ClobPricesError> {
        let url = format!("{}/prices", self.base_url);
        let body: serde_json::Value = serde_json::json!(token_ids
            .iter()
            .map(|id| serde_json::json!({ "token_id": id }))
            .collect::<Vec<_>>());

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let raw: HashMap<String, RawQuote> = resp.json().await?;
        Ok(raw
            .into_iter()
            .map(|(token_id, q)| {
                let buy = q.buy.and_then(|s| s.parse().ok());
                let sell = q.sell.and_then(|s| s.parse().ok());
                (token_id, PriceQuote { buy, sell })
            })
            .collect())
    }
}
