//! Fan-out of balance queries across provider workers

use crate::balance::BalanceResult;
use crate::config::Config;
use crate::dispatcher::{BalanceRequest, BatchDispatcher, DispatchError, DispatcherHandle};
use crate::providers::build_provider;
use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Something that accepts balance requests on behalf of one provider
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Queue a request; its result arrives on the request's receiver
    async fn submit(&self, request: BalanceRequest) -> Result<(), DispatchError>;

    /// Submit one address and wait for the result
    ///
    /// Never fails: an unavailable worker yields a failure result.
    async fn get_balance(&self, address: &str) -> BalanceResult {
        let (request, receiver) = BalanceRequest::new(address);
        if let Err(e) = self.submit(request).await {
            return BalanceResult::failed(self.name(), address, e.to_string());
        }
        receiver.await.unwrap_or_else(|_| {
            BalanceResult::failed(self.name(), address, "worker dropped the request")
        })
    }
}

#[async_trait]
impl Worker for DispatcherHandle {
    fn name(&self) -> &str {
        DispatcherHandle::name(self)
    }

    async fn submit(&self, request: BalanceRequest) -> Result<(), DispatchError> {
        DispatcherHandle::submit(self, request).await
    }
}

/// Sends each query to every worker and collects their answers
pub struct Aggregator {
    workers: Vec<Arc<dyn Worker>>,
    next: AtomicUsize,
    max_concurrent_addresses: usize,
}

impl Aggregator {
    pub fn new(workers: Vec<Arc<dyn Worker>>) -> Self {
        Self {
            workers,
            next: AtomicUsize::new(0),
            max_concurrent_addresses: 16,
        }
    }

    /// Limit how many addresses `get_balances` queries at once
    pub fn with_concurrency(mut self, max_concurrent_addresses: usize) -> Self {
        self.max_concurrent_addresses = max_concurrent_addresses.max(1);
        self
    }

    /// Start one dispatcher per enabled provider
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &Config, http: &reqwest::Client) -> Self {
        let workers: Vec<Arc<dyn Worker>> = config
            .enabled_providers()
            .map(|provider| {
                let adapter = build_provider(provider, config, http);
                let handle = BatchDispatcher::new(adapter, config.dispatcher_config(provider)).start();
                Arc::new(handle) as Arc<dyn Worker>
            })
            .collect();

        info!(workers = workers.len(), "Aggregator ready");
        Self::new(workers).with_concurrency(config.aggregator.max_concurrent_addresses)
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// One result per worker for `address`, in worker order
    pub async fn get_balance(&self, address: &str) -> Vec<BalanceResult> {
        debug!(address = %address, workers = self.workers.len(), "Fanning out balance query");
        join_all(self.workers.iter().map(|worker| worker.get_balance(address))).await
    }

    /// `get_balance` for many addresses, flattened; completion order
    pub async fn get_balances(&self, addresses: &[String]) -> Vec<BalanceResult> {
        let lookups: Vec<_> = addresses
            .iter()
            .map(|address| self.get_balance(address))
            .collect();
        stream::iter(lookups)
            .buffer_unordered(self.max_concurrent_addresses)
            .flat_map(stream::iter)
            .collect()
            .await
    }

    /// Ask a single worker, chosen round-robin
    ///
    /// Returns `None` when there are no workers.
    pub async fn get_balance_from_any(&self, address: &str) -> Option<BalanceResult> {
        if self.workers.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        Some(self.workers[index].get_balance(address).await)
    }
}
