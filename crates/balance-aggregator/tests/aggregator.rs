//! Aggregator fan-out over real dispatchers

use async_trait::async_trait;
use balance_aggregator::config::{Config, ProviderConfig, ProviderKind};
use balance_aggregator::dispatcher::{BatchDispatcher, DispatcherConfig, RetryPolicy};
use balance_aggregator::providers::{BalanceProvider, ProviderError};
use balance_aggregator::{AddressBalance, Aggregator, Worker};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Paying(f64);

#[async_trait]
impl BalanceProvider for Paying {
    fn name(&self) -> &str {
        "paying"
    }

    async fn fetch_balances(&self, addresses: &[String]) -> Result<Vec<AddressBalance>, ProviderError> {
        Ok(addresses
            .iter()
            .map(|a| AddressBalance::new(a.as_str(), self.0, 0.0))
            .collect())
    }
}

struct Broken;

#[async_trait]
impl BalanceProvider for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn fetch_balances(&self, _addresses: &[String]) -> Result<Vec<AddressBalance>, ProviderError> {
        Err(ProviderError::Status {
            provider: "broken".to_string(),
            status: 503,
        })
    }
}

fn quick_config() -> DispatcherConfig {
    DispatcherConfig {
        batch_limit: 1,
        flush_interval: Duration::from_millis(10),
        retry: RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        },
        ..DispatcherConfig::default()
    }
}

fn worker(provider: impl BalanceProvider + 'static) -> Arc<dyn Worker> {
    Arc::new(BatchDispatcher::new(Arc::new(provider), quick_config()).start())
}

#[tokio::test]
async fn test_one_result_per_worker() {
    let aggregator = Aggregator::new(vec![worker(Paying(5.0)), worker(Broken)]);

    let results = aggregator.get_balance("1A").await;

    assert_eq!(results.len(), 2);
    let paying = results.iter().find(|r| r.source == "paying").unwrap();
    assert_eq!(paying.total, 5.0);
    assert!(!paying.is_failure());

    let broken = results.iter().find(|r| r.source == "broken").unwrap();
    assert!(broken.is_failure());
    assert_eq!(broken.total, 0.0);
}

#[tokio::test]
async fn test_many_addresses() {
    let aggregator = Aggregator::new(vec![worker(Paying(1.0)), worker(Broken)]);
    let addresses: Vec<String> = (0..5).map(|i| format!("addr{i}")).collect();

    let results = aggregator.get_balances(&addresses).await;

    assert_eq!(results.len(), 10);
    assert_eq!(results.iter().filter(|r| r.is_failure()).count(), 5);
}

#[tokio::test]
async fn test_from_config_with_http_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": [{"addr": "1A", "confirmed": 900, "unconfirmed": 100}]
        })))
        .mount(&server)
        .await;

    let mut provider = ProviderConfig::new(ProviderKind::Blockonomics);
    provider.base_url = Some(server.uri());
    provider.batch_limit = Some(1);

    let mut config = Config::default();
    config.providers = vec![provider];

    let aggregator = Aggregator::from_config(&config, &reqwest::Client::new());
    assert_eq!(aggregator.worker_names(), ["blockonomics"]);

    let results = aggregator.get_balance("1A").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].total, 1000.0);
    assert_eq!(results[0].source, "blockonomics");
}
