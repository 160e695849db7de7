//! Bounded job queue drained by a fixed pool of delivery workers.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::sampler::Job;
use super::transport::Transport;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

pub struct Dispatcher {
    queue: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Spawns `workers` tasks sharing one queue of `capacity` jobs.
    pub fn start(
        transport: Arc<dyn Transport>,
        workers: usize,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    rx.clone(),
                    transport.clone(),
                    cancel.clone(),
                ))
            })
            .collect::<Vec<_>>();
        info!("Started {} delivery workers", workers.len());

        Self {
            queue: tx,
            workers,
            cancel,
        }
    }

    /// Enqueues one job, waiting while the queue is full.
    ///
    /// Returns `false` if the dispatcher is shutting down.
    pub async fn enqueue(&self, job: Job) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.queue.send(job) => sent.is_ok(),
        }
    }

    /// Stops the workers. Jobs still queued are abandoned.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        drop(self.queue);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!("Delivery worker panicked: {}", e);
            }
        }
    }
}

async fn worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = queue.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        match transport.send(&job.batch()).await {
            Ok(()) => debug!("worker {} delivered {}", id, job.name),
            Err(e) => error!("worker {} failed to deliver {}: {}", id, job.name, e),
        }
    }
    debug!("worker {} stopped", id);
}
