//! Service assembly: two independent, cancellable cycles.
//!
//! Extraction and transform coordinate only through the durable store. Each
//! cycle is single-threaded (pass, then sleep) and observes cancellation
//! between passes, never mid-pass.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    extract::Extractor,
    transform::Transformer,
};

pub struct Indexer {
    extractor: Extractor,
    transformers: Vec<Transformer>,
    extract_interval: Duration,
    transform_interval: Duration,
}

impl Indexer {
    pub fn new(
        extractor: Extractor,
        transformers: Vec<Transformer>,
        extract_interval: Duration,
        transform_interval: Duration,
    ) -> Self {
        Self {
            extractor,
            transformers,
            extract_interval,
            transform_interval,
        }
    }

    /// Drive both cycles until the token is cancelled.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<()> {
        let extraction = Self::extraction_cycle(
            self.extractor,
            self.extract_interval,
            cancel_token.clone(),
        );
        let transform = Self::transform_cycle(
            self.transformers,
            self.transform_interval,
            cancel_token,
        );

        tokio::join!(extraction, transform);
        Ok(())
    }

    async fn extraction_cycle(
        extractor: Extractor,
        interval: Duration,
        cancel_token: CancellationToken,
    ) {
        loop {
            extractor.extract().await;

            tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("extraction cycle shutting down");
                    return;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn transform_cycle(
        mut transformers: Vec<Transformer>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) {
        loop {
            for transformer in &mut transformers {
                if let Err(err) = transformer.transform() {
                    metrics::counter!("indexer_transform_pass_failures_total").increment(1);
                    tracing::error!(
                        address = %transformer.address(),
                        error = %err,
                        "transform pass failed"
                    );
                    continue;
                }
                if let Err(err) = transformer.flush() {
                    tracing::error!(
                        address = %transformer.address(),
                        error = %err,
                        "aggregate flush failed"
                    );
                }
            }

            tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("transform cycle shutting down");
                    return;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    }
}
