//! Poll-side state of the agent: the latest snapshot and the poll counter.

use rand::distributions::Open01;
use rand::Rng;
use tracing::debug;

use crate::collector::{Collector, Snapshot};
use crate::model::{Metric, MetricValue};

pub const RANDOM_VALUE: &str = "RandomValue";
pub const POLL_COUNT: &str = "PollCount";

/// One unit of delivery work: a metric reading and the poll count at
/// the time it was enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    pub value: f64,
    pub poll_count: i64,
}

impl Job {
    /// The two updates delivered for this job.
    pub fn batch(&self) -> Vec<Metric> {
        vec![
            Metric::gauge(self.name.clone(), self.value),
            Metric::counter(self.name.clone(), self.poll_count),
        ]
    }
}

/// Draws from an exponential distribution with rate 1.
fn exp_random() -> f64 {
    let u: f64 = rand::thread_rng().sample(Open01);
    -u.ln()
}

/// Owns the snapshot between polls. Only the control loop touches it, so a
/// report always reads the result of a completed poll.
pub struct Sampler {
    collector: Collector,
    snapshot: Snapshot,
    poll_count: i64,
}

impl Sampler {
    pub fn new(collector: Collector) -> Self {
        Self {
            collector,
            snapshot: Snapshot::new(),
            poll_count: 0,
        }
    }

    pub fn poll_count(&self) -> i64 {
        self.poll_count
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Refreshes the snapshot and injects the synthetic series.
    pub fn poll(&mut self) {
        let mut snapshot = self.collector.sample();
        self.poll_count += 1;
        snapshot.insert(RANDOM_VALUE.to_string(), MetricValue::Gauge(exp_random()));
        snapshot.insert(POLL_COUNT.to_string(), MetricValue::Counter(self.poll_count));
        debug!(
            "Poll #{} captured {} metrics",
            self.poll_count,
            snapshot.len()
        );
        self.snapshot = snapshot;
    }

    /// Turns the current snapshot into jobs and resets the poll counter.
    pub fn report(&mut self) -> Vec<Job> {
        let poll_count = self.poll_count;
        let jobs = self
            .snapshot
            .iter()
            .map(|(name, value)| Job {
                name: name.clone(),
                value: match value {
                    MetricValue::Gauge(v) => *v,
                    MetricValue::Counter(d) => *d as f64,
                },
                poll_count,
            })
            .collect();
        self.poll_count = 0;
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricKind;

    #[test]
    fn test_poll_injects_synthetic_series() {
        let mut sampler = Sampler::new(Collector::new());
        sampler.poll();
        sampler.poll();
        assert_eq!(sampler.poll_count(), 2);
        assert_eq!(
            sampler.snapshot().get(POLL_COUNT),
            Some(&MetricValue::Counter(2))
        );
        match sampler.snapshot().get(RANDOM_VALUE) {
            Some(MetricValue::Gauge(v)) => assert!(*v >= 0.0 && v.is_finite()),
            other => panic!("unexpected RandomValue: {:?}", other),
        }
    }

    #[test]
    fn test_report_resets_counter() {
        let mut sampler = Sampler::new(Collector::new());
        sampler.poll();
        sampler.poll();
        sampler.poll();

        let jobs = sampler.report();
        assert_eq!(jobs.len(), sampler.snapshot().len());
        assert!(jobs.iter().all(|j| j.poll_count == 3));
        assert_eq!(sampler.poll_count(), 0);

        // Snapshot survives the report; a second report carries count 0
        let again = sampler.report();
        assert_eq!(again.len(), jobs.len());
        assert!(again.iter().all(|j| j.poll_count == 0));
    }

    #[test]
    fn test_job_batch() {
        let job = Job {
            name: "Alloc".into(),
            value: 12.5,
            poll_count: 4,
        };
        let batch = job.batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, MetricKind::Gauge);
        assert_eq!(batch[0].value, Some(12.5));
        assert_eq!(batch[1].kind, MetricKind::Counter);
        assert_eq!(batch[1].delta, Some(4));
    }

    #[test]
    fn test_exp_random_is_positive() {
        for _ in 0..1000 {
            let v = exp_random();
            assert!(v > 0.0 && v.is_finite());
        }
    }
}
