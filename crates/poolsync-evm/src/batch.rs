//! Batched `eth_getLogs` over large block ranges.
//!
//! The range is cut into fixed-size windows which are dispatched in
//! concurrency groups; a group finishes before the next one starts and
//! requests inside a group are staggered. Every window is retried on a
//! fixed interval. A provider that refuses blocks past its last accepted
//! block clamps the window instead of failing it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use poolsync_core::config::BatchConfig;
use poolsync_core::error::SyncError;
use poolsync_core::window::{split_range, FetchWindow};
use poolsync_rpc::RetryPolicy;

use crate::client::EvmRpcClient;
use crate::log::{LogFilter, RawLog};

/// Logs of a whole range, in window order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBatch {
    pub logs: Vec<RawLog>,
    /// Highest block the batch is complete up to. Lower than the requested
    /// bound when a provider clamped a window.
    pub synced_to: u64,
}

struct WindowResult {
    logs: Vec<RawLog>,
    clamped_to: Option<u64>,
}

pub struct BatchLogFetcher {
    client: Arc<dyn EvmRpcClient>,
    config: BatchConfig,
    retry: RetryPolicy,
}

impl BatchLogFetcher {
    pub fn new(client: Arc<dyn EvmRpcClient>, config: BatchConfig) -> Self {
        let retry = if config.should_retry {
            RetryPolicy::new(config.retry_max, Duration::from_millis(config.retry_interval_ms))
        } else {
            RetryPolicy::none()
        };
        Self {
            client,
            config,
            retry,
        }
    }

    pub fn client(&self) -> &Arc<dyn EvmRpcClient> {
        &self.client
    }

    /// Fetch every log matching `filter` in `[from, to]`.
    ///
    /// `to = None` resolves to the provider's head once, at call time. The
    /// first window that exhausts its retries aborts the whole fetch with
    /// that window's last error; partial results are never returned.
    pub async fn fetch_logs(
        &self,
        filter: &LogFilter,
        from: u64,
        to: Option<u64>,
    ) -> Result<LogBatch, SyncError> {
        let to = match to {
            Some(to) => to,
            None => self.client.block_number().await?,
        };

        let windows = split_range(from, to, self.config.blocks_per_request);
        let mut logs = Vec::new();
        let mut synced_to = to;

        for (group_no, group) in windows.chunks(self.config.concurrency.max(1)).enumerate() {
            debug!(
                group = group_no,
                windows = group.len(),
                from = group[0].from,
                to = group[group.len() - 1].to,
                "fetching log group"
            );
            let requests = group
                .iter()
                .enumerate()
                .map(|(position, window)| self.fetch_window(filter, *window, position));

            for result in try_join_all(requests).await? {
                if let Some(clamp) = result.clamped_to {
                    synced_to = synced_to.min(clamp);
                }
                logs.extend(result.logs);
            }
        }

        logs.retain(|log| log.block_number_u64().is_some_and(|b| b <= synced_to));

        info!(
            address = %filter.address,
            from,
            to,
            synced_to,
            windows = windows.len(),
            logs = logs.len(),
            "log batch fetched"
        );
        Ok(LogBatch { logs, synced_to })
    }

    async fn fetch_window(
        &self,
        filter: &LogFilter,
        window: FetchWindow,
        position: usize,
    ) -> Result<WindowResult, SyncError> {
        let stagger = self.config.stagger_ms.saturating_mul(position as u64);
        if stagger > 0 {
            tokio::time::sleep(Duration::from_millis(stagger)).await;
        }

        let mut to = window.to;
        let mut clamped_to = None;
        let mut failures = 0u32;
        loop {
            let err = match self.client.get_logs(filter, window.from, to).await {
                Ok(logs) => return Ok(WindowResult { logs, clamped_to }),
                Err(e) => e,
            };
            failures += 1;
            if !err.is_retryable() {
                return Err(err);
            }

            if let Some(accepted) = err.accepted_block_hint() {
                if accepted < window.from {
                    warn!(from = window.from, accepted, "window lies past last accepted block");
                    return Ok(WindowResult {
                        logs: Vec::new(),
                        clamped_to: Some(accepted),
                    });
                }
                if accepted < to {
                    to = accepted;
                    clamped_to = Some(accepted);
                }
            }

            match self.retry.next_delay(failures) {
                Some(delay) => {
                    warn!(
                        from = window.from,
                        to,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying log window"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(from = window.from, to, attempts = failures, error = %err, "log window failed");
                    return Err(err);
                }
            }
        }
    }
}
