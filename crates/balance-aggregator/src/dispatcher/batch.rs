//! Requests and the in-flight batches they travel in.

use crate::balance::{AddressBalance, BalanceResult};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// A single caller's request for one address
///
/// The sink is write-once: completing the request consumes it.
#[derive(Debug)]
pub struct BalanceRequest {
    pub address: String,
    sink: oneshot::Sender<BalanceResult>,
    attempts: u32,
}

impl BalanceRequest {
    /// Create a request and the receiver its result will arrive on
    pub fn new(address: impl Into<String>) -> (Self, oneshot::Receiver<BalanceResult>) {
        let (sink, receiver) = oneshot::channel();
        let request = Self {
            address: address.into(),
            sink,
            attempts: 0,
        };
        (request, receiver)
    }

    /// Failed provider calls this request has taken part in
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn record_failure(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// The caller stopped waiting
    pub fn is_abandoned(&self) -> bool {
        self.sink.is_closed()
    }

    pub fn complete(self, result: BalanceResult) {
        if self.sink.send(result).is_err() {
            trace!(address = %self.address, "Caller went away before its result arrived");
        }
    }

    pub fn fail(self, source: &str, reason: impl Into<String>) {
        let result = BalanceResult::failed(source, self.address.clone(), reason);
        self.complete(result);
    }
}

/// Outcome of matching a provider response against a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Requests answered from a provider record
    pub delivered: usize,
    /// Requests answered with a synthetic zero record
    pub synthetic: usize,
    /// Records for addresses nobody asked about
    pub unexpected: usize,
}

/// Requests drained together for one provider call
///
/// Each slot is emptied when its request is answered, so delivering the same
/// response twice answers nobody twice.
#[derive(Debug)]
pub struct Batch {
    source: String,
    slots: Vec<Option<BalanceRequest>>,
    by_address: HashMap<String, Vec<usize>>,
    addresses: Vec<String>,
}

impl Batch {
    pub fn new(source: impl Into<String>, requests: Vec<BalanceRequest>) -> Self {
        let mut by_address: HashMap<String, Vec<usize>> = HashMap::new();
        let mut addresses = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            let slots = by_address.entry(request.address.clone()).or_default();
            if slots.is_empty() {
                addresses.push(request.address.clone());
            }
            slots.push(index);
        }

        Self {
            source: source.into(),
            slots: requests.into_iter().map(Some).collect(),
            by_address,
            addresses,
        }
    }

    /// Distinct addresses, in the order they were first requested
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Answer every request, using zero balances for addresses the provider omitted
    pub fn deliver(&mut self, records: &[AddressBalance]) -> Reconciliation {
        let mut outcome = Reconciliation::default();

        for record in records {
            let Some(indices) = self.by_address.get(&record.address) else {
                debug!(
                    provider = %self.source,
                    address = %record.address,
                    "Ignoring record for an address that was not requested"
                );
                outcome.unexpected += 1;
                continue;
            };

            for &index in indices {
                if let Some(request) = self.slots[index].take() {
                    request.complete(BalanceResult::from_record(&self.source, record));
                    outcome.delivered += 1;
                }
            }
        }

        for slot in &mut self.slots {
            if let Some(request) = slot.take() {
                let result = BalanceResult::zero(&self.source, request.address.clone());
                request.complete(result);
                outcome.synthetic += 1;
            }
        }

        outcome
    }

    /// Take back every request that has not been answered yet
    pub fn into_unanswered(self) -> Vec<BalanceRequest> {
        self.slots.into_iter().flatten().collect()
    }

    pub fn fail_all(self, reason: &str) {
        let source = self.source.clone();
        for request in self.into_unanswered() {
            request.fail(&source, reason);
        }
    }
}
