//! The telemetry agent: samples on the poll period, fans the snapshot out to
//! delivery workers on the report period.

pub mod config;
pub mod dispatcher;
pub mod sampler;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{PublicKey, Sealer, Signer};
use crate::collector::Collector;

use config::{AgentConfig, Protocol};
use dispatcher::{Dispatcher, DEFAULT_QUEUE_CAPACITY};
use sampler::Sampler;
use transport::{RestClient, RpcClient, Transport, TransportError};

/// Builds the delivery client selected by `config.protocol`.
pub fn build_transport(config: &AgentConfig) -> Result<Arc<dyn Transport>, TransportError> {
    let signer = Signer::new(&config.key);
    if signer.is_none() {
        warn!("No signing key configured, batches are sent unsigned");
    }

    let transport: Arc<dyn Transport> = match config.protocol {
        Protocol::Http => {
            let public_key = config
                .crypto_key
                .as_deref()
                .map(PublicKey::from_file)
                .transpose()?;
            Arc::new(RestClient::new(
                &config.address,
                Sealer::new(signer, public_key),
            )?)
        }
        Protocol::Grpc => Arc::new(RpcClient::new(&config.grpc_address, signer)?),
    };
    Ok(transport)
}

/// Runs the agent until `cancel` fires.
pub async fn run(config: AgentConfig, cancel: CancellationToken) -> Result<(), TransportError> {
    let transport = build_transport(&config)?;
    info!(
        "Agent reporting to {} over {:?} every {}s (poll {}s, {} workers)",
        match config.protocol {
            Protocol::Http => &config.address,
            Protocol::Grpc => &config.grpc_address,
        },
        config.protocol,
        config.report_interval,
        config.poll_interval,
        config.rate_limit
    );

    let dispatcher = Dispatcher::start(
        transport,
        config.rate_limit,
        DEFAULT_QUEUE_CAPACITY,
        cancel.child_token(),
    );
    run_pipeline(
        Sampler::new(Collector::new()),
        dispatcher,
        config.poll_period(),
        config.report_period(),
        cancel,
    )
    .await;
    Ok(())
}

/// The control loop. Polling and reporting never overlap; delivery runs
/// concurrently in the dispatcher's workers.
pub async fn run_pipeline(
    mut sampler: Sampler,
    dispatcher: Dispatcher,
    poll_period: Duration,
    report_period: Duration,
    cancel: CancellationToken,
) {
    sampler.poll();

    let start = Instant::now();
    let mut poll = interval_at(start + poll_period, poll_period);
    let mut report = interval_at(start + report_period, report_period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = poll.tick() => sampler.poll(),
            _ = report.tick() => {
                let jobs = sampler.report();
                debug!("Report cycle enqueues {} jobs", jobs.len());
                for job in jobs {
                    if !dispatcher.enqueue(job).await {
                        break;
                    }
                }
            }
        }
    }

    info!("Agent loop stopped, abandoning queued jobs");
    dispatcher.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metric, MetricKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Sink(Mutex<Vec<Metric>>);

    #[async_trait]
    impl Transport for Sink {
        async fn send(&self, batch: &[Metric]) -> Result<(), TransportError> {
            self.0.lock().unwrap().extend_from_slice(batch);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pipeline_delivers_snapshot() {
        let sink = Arc::new(Sink::default());
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::start(sink.clone(), 2, 256, cancel.child_token());

        let handle = tokio::spawn(run_pipeline(
            Sampler::new(Collector::new()),
            dispatcher,
            Duration::from_millis(20),
            Duration::from_millis(150),
            cancel.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = sink
                    .0
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|m| m.id == sampler::RANDOM_VALUE && m.kind == MetricKind::Counter);
                if done {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        handle.await.unwrap();

        let sent = sink.0.lock().unwrap();
        let counter = sent
            .iter()
            .find(|m| m.id == sampler::RANDOM_VALUE && m.kind == MetricKind::Counter)
            .unwrap();
        assert!(counter.delta.unwrap() >= 1);
    }

    #[test]
    fn test_build_transport_rejects_missing_key_file() {
        let config = AgentConfig {
            crypto_key: Some("/nonexistent/public.pem".into()),
            ..Default::default()
        };
        assert!(build_transport(&config).is_err());
    }
}
