use crate::error::ConnectorError;
use rayon::ThreadPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info};

pub const DEFAULT_WORKERS: usize = 4;

/// Small blocking-work pool owned by one client instance.
///
/// Credential file reads and RSA signing run here so they never stall the
/// async runtime threads that drive the stdio loop.
pub struct WorkerPool {
    pool: ThreadPool,
    size: usize,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, ConnectorError> {
        let size = size.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|idx| format!("dv360-worker-{idx}"))
            .build()
            .map_err(|e| ConnectorError::Other(format!("failed to build worker pool: {}", e)))?;
        Ok(Self {
            pool,
            size,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Run a blocking job on the pool and await its result.
    pub async fn run<F, R>(&self, job: F) -> Result<R, ConnectorError>
    where
        F: FnOnce() -> Result<R, ConnectorError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let in_flight = Arc::clone(&self.in_flight);
        let queued = in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        if queued > self.size * 2 {
            info!(
                target: "dv360.worker_pool",
                queued,
                threads = self.size,
                "worker pool backlog growing"
            );
        } else {
            debug!(
                target: "dv360.worker_pool",
                queued,
                threads = self.size,
                "worker task queued"
            );
        }
        let start = Instant::now();
        self.pool.spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                .map_err(|payload| {
                    let reason = if let Some(msg) = payload.downcast_ref::<&str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = payload.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    ConnectorError::Other(format!("worker task panicked: {}", reason))
                })
                .and_then(|inner| inner);
            let _ = tx.send(result);
            let finished = in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
            debug!(
                target: "dv360.worker_pool",
                queue_after = finished,
                latency_ms = start.elapsed().as_millis() as u64,
                "worker task finished"
            );
        });

        rx.await
            .map_err(|err| ConnectorError::Other(format!("worker pool join error: {}", err)))?
    }

    pub fn worker_count(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_jobs_and_reports_errors() {
        let pool = WorkerPool::new(DEFAULT_WORKERS).unwrap();
        assert_eq!(pool.worker_count(), 4);

        let sum = pool.run(|| Ok((1..=10).sum::<u32>())).await.unwrap();
        assert_eq!(sum, 55);

        let err = pool
            .run::<_, ()>(|| Err(ConnectorError::Other("bad key".into())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let pool = WorkerPool::new(1).unwrap();
        let err = pool
            .run::<_, ()>(|| panic!("boom"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
