//! Rate-limited ISS trades client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decoder::{decode_response, TradesResponse};
use crate::error::FetchError;
use crate::limiter::RateLimiter;
use crate::trade::Trade;
use crate::watermark::Watermark;

/// Rows requested per call
pub const PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// One request per second
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

/// Longest error body kept in a `FetchError::Status`
const MAX_ERROR_BODY: usize = 512;

/// New trades from one fetch, oldest first
#[derive(Debug, Default)]
pub struct FetchedTrades {
    pub trades: Vec<Trade>,
    /// Watermark after all `trades` are published; equals the input
    /// watermark when there is nothing new
    pub watermark: Watermark,
    /// Rows dropped by the decoder
    pub skipped: usize,
    /// Decoded rows at or below the input watermark
    pub stale: usize,
}

/// Source of trades for the collection cycle
#[async_trait]
pub trait TradeSource: Send {
    /// Fetch trades newer than `since` for one engine/market.
    ///
    /// Either returns every new trade of the page or an error; there are no
    /// partial results.
    async fn fetch(
        &mut self,
        engine: &str,
        market: &str,
        since: &Watermark,
        cancel: &CancellationToken,
    ) -> Result<FetchedTrades, FetchError>;
}

/// MOEX ISS REST client
pub struct IssClient {
    http: Client,
    base_url: String,
    timeout: Duration,
    limiter: RateLimiter,
}

impl IssClient {
    /// `base_url` is normally `https://iss.moex.com`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            limiter: RateLimiter::new(MIN_REQUEST_INTERVAL),
        })
    }

    /// Replace the default one-per-second limiter
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    fn trades_url(&self, engine: &str, market: &str) -> String {
        format!(
            "{}/iss/engines/{}/markets/{}/trades.json",
            self.base_url, engine, market
        )
    }

    /// Page query: newest first, and when a watermark is known only trades
    /// after it (`till=-1` makes `from` mean "after this trade"). The filter
    /// is a courtesy; dedup against the watermark still runs locally.
    fn query(since: &Watermark) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("iss.meta", "off".to_string()),
            ("iss.only", "trades".to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("reversed", "1".to_string()),
        ];
        if !since.is_empty() {
            params.push(("from", since.as_str().to_string()));
            params.push(("till", "-1".to_string()));
        }
        params
    }

    fn map_request_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            FetchError::Request(e)
        }
    }

    async fn get_page(
        &self,
        engine: &str,
        market: &str,
        since: &Watermark,
    ) -> Result<TradesResponse, FetchError> {
        let url = self.trades_url(engine, market);
        debug!(url = %url, since = %since, "GET trades");

        let resp = self
            .http
            .get(&url)
            .query(&Self::query(since))
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await.map_err(|e| self.map_request_error(e))?;
        Ok(TradesResponse::from_slice(&body)?)
    }
}

#[async_trait]
impl TradeSource for IssClient {
    async fn fetch(
        &mut self,
        engine: &str,
        market: &str,
        since: &Watermark,
        cancel: &CancellationToken,
    ) -> Result<FetchedTrades, FetchError> {
        self.limiter
            .acquire(cancel)
            .await
            .map_err(|_| FetchError::CancelledWaiting)?;

        let page = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::Cancelled),
            page = self.get_page(engine, market, since) => page?,
        };

        let decoded = decode_response(&page)?;
        let total = decoded.trades.len();
        let (trades, watermark) = since.select_new(decoded.trades);

        Ok(FetchedTrades {
            stale: total - trades.len(),
            trades,
            watermark,
            skipped: decoded.skipped,
        })
    }
}
