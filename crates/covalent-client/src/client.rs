//! Paginated transaction-history client with bounded retries

use alloy_primitives::Address;
use url::Url;

use crate::{
    config::ClientConfig,
    error::{
        Error,
        Result,
    },
    types::{
        TransactionsEnvelope,
        TransactionsPage,
    },
};

/// Client for pulling an address's transaction history, one page at a time.
///
/// Pages are served most-recent-first: item 0 of page 0 is the newest
/// transaction the API knows about. Transient failures (connection errors,
/// non-success statuses, upstream `error: true` envelopes) are retried with
/// the configured backoff; malformed envelopes are not.
#[derive(Debug)]
pub struct CovalentClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl CovalentClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(Error::Http)?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch one page of transaction history for `address`.
    pub async fn transactions_page(
        &self,
        address: Address,
        page_number: u64,
    ) -> Result<TransactionsPage> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            match self.request_page(address, page_number).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_transient() => {
                    if attempt >= retry.max_retries {
                        return Err(Error::RetriesExhausted {
                            attempts: attempt + 1,
                            last: Box::new(err),
                        });
                    }

                    let delay = retry.delay_for(attempt);
                    tracing::warn!(
                        address = %address,
                        page_number,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient request failure, backing off"
                    );
                    metrics::counter!("covalent_request_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn request_page(&self, address: Address, page_number: u64) -> Result<TransactionsPage> {
        let url = self.page_url(address, page_number)?;

        tracing::debug!(address = %address, page_number, "requesting transaction page");
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status));
        }

        let body = response.text().await?;
        let envelope: TransactionsEnvelope =
            serde_json::from_str(&body).map_err(|err| Error::MalformedEnvelope(err.to_string()))?;

        envelope.validate()
    }

    fn page_url(&self, address: Address, page_number: u64) -> Result<Url> {
        let mut url = self.config.base_url.join(&format!(
            "v1/{}/address/{address:#x}/transactions_v2/",
            self.config.chain_id
        ))?;

        // `block-signed-at-asc=false` is load-bearing: the extraction
        // watermark relies on descending page order.
        url.query_pairs_mut()
            .append_pair("quote-currency", "USD")
            .append_pair("format", "JSON")
            .append_pair("block-signed-at-asc", "false")
            .append_pair("no-logs", "false")
            .append_pair("page-number", &page_number.to_string())
            .append_pair("page-size", &self.config.page_size.to_string())
            .append_pair("key", &self.config.api_key);

        Ok(url)
    }
}
