use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::time::sleep;

use crate::models::{RawEvent, RawMarket};

const MAX_CONSECUTIVE_ERRORS: u32 = 5;
const PAGE_SLEEP: Duration = Duration::from_millis(50);
const BULK_CHUNK_SLEEP: Duration = Duration::from_millis(100);
const RATE_LIMIT_SLEEP: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const BULK_CHUNK_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum GammaClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited, chunk dropped")]
    RateLimited,

    #[error("aborting cycle after {0} consecutive fetch errors")]
    Aborted(u32),
}

/// Client for the Gamma API's `/events` and `/markets` endpoints, with a
/// consecutive-error counter that aborts the calling cycle rather than
/// retrying forever — the teacher's clients have no backoff at all; this
/// generalizes `ingestion/ws_listener.rs`'s escalate-then-give-up shape to
/// plain HTTP calls.
pub struct GammaClient {
    http: Client,
    base_url: String,
    consecutive_errors: AtomicU32,
}

impl GammaClient {
    pub fn new(base_url: String) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            base_url,
            consecutive_errors: AtomicU32::new(0),
        }
    }

    fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn check_abort(&self) -> Result<(), GammaClientError> {
        let n = self.consecutive_errors.load(Ordering::Relaxed);
        if n >= MAX_CONSECUTIVE_ERRORS {
            Err(GammaClientError::Aborted(n))
        } else {
            Ok(())
        }
    }

    pub async fn get_events(
        &self,
        offset: u32,
        limit: u32,
        closed: bool,
    ) -> Result<Vec<RawEvent>, GammaClientError> {
        self.check_abort()?;
        let url = format!("{}/events", self.base_url);
        let result = self
            .http
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("closed", closed.to_string()),
            ])
            .send()
            .await;
        sleep(PAGE_SLEEP).await;
        self.finish::<Vec<RawEvent>>(result).await
    }

    pub async fn get_markets(
        &self,
        offset: u32,
        limit: u32,
        closed: bool,
        order: &str,
        ascending: bool,
    ) -> Result<Vec<RawMarket>, GammaClientError> {
        self.check_abort()?;
        let url = format!("{}/markets", self.base_url);
        let result = self
            .http
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
                ("closed", closed.to_string()),
                ("order", order.to_string()),
                ("ascending", ascending.to_string()),
            ])
            .send()
            .await;
        sleep(PAGE_SLEEP).await;
        self.finish::<Vec<RawMarket>>(result).await
    }

    /// Bulk-fetch markets by id, chunked to `BULK_CHUNK_SIZE` with a sleep
    /// between chunks. Failed chunks are logged and skipped rather than
    /// aborting the whole call.
    pub async fn get_markets_bulk(&self, ids: &[String]) -> Vec<RawMarket> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BULK_CHUNK_SIZE) {
            self.check_abort().ok();
            let url = format!("{}/markets", self.base_url);
            let result = self
                .http
                .get(&url)
                .query(&chunk.iter().map(|id| ("id", id.as_str())).collect::<Vec<_>>())
                .send()
                .await;
            match self.finish::<Vec<RawMarket>>(result).await {
                Ok(markets) => out.extend(markets),
                Err(e) => tracing::warn!(error = %e, "bulk market fetch chunk failed, skipping"),
            }
            sleep(BULK_CHUNK_SLEEP).await;
        }
        out
    }

    async fn finish<T: serde::de::DeserializeOwned>(
        &self,
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, GammaClientError> {
        match result {
            Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                sleep(RATE_LIMIT_SLEEP).await;
                self.record_error();
                Err(GammaClientError::RateLimited)
            }
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json::<T>().await {
                    Ok(body) => {
                        self.record_success();
                        Ok(body)
                    }
                    Err(e) => {
                        self.record_error();
                        Err(e.into())
                    }
                },
                Err(e) => {
                    self.record_error();
                    Err(e.into())
                }
            },
            Err(e) => {
                self.record_error();
                Err(e.into())
            }
        }
    }
}
