//! Background flush executors.
//!
//! Each [`FlushExecutor`] is one tokio task draining a bounded job queue.
//! Channel writers submit flush jobs (batch encoding plus the network write)
//! and get back a [`FlushTicket`], a future that resolves once the job ran.
//! Writers keep their tickets and await them at the next flush or at close,
//! which is where deferred failures surface.
//!
//! Jobs submitted to the same executor run one at a time in submission order,
//! so batches of a channel reach the server in push order.
//!
//! A full queue makes `submit` wait; that is the only backpressure applied to
//! producers.

use crate::connection_pool::ResourcePool;
use crate::error::{ClientError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// A unit of flush work.
pub type FlushJob = BoxFuture<'static, Result<()>>;

struct Task {
    job: FlushJob,
    done: oneshot::Sender<Result<()>>,
}

/// Completion handle of a submitted flush job.
#[derive(Debug)]
pub struct FlushTicket {
    receiver: oneshot::Receiver<Result<()>>,
}

impl FlushTicket {
    /// Waits for the job and returns its result.
    pub async fn wait(self) -> Result<()> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(ClientError::Internal(
                "flush executor stopped before running the job".to_string(),
            ))
        })
    }

    /// Result of the job if it already finished.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ClientError::Internal(
                "flush executor stopped before running the job".to_string(),
            ))),
        }
    }
}

/// One worker task with a bounded queue.
pub struct FlushExecutor {
    id: usize,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FlushExecutor {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(id: usize, queue_depth: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Task>(queue_depth.max(1));

        let worker = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                let result = task.job.await;
                if task.done.send(result).is_err() {
                    trace!(executor = id, "Flush ticket dropped before completion");
                }
            }
            debug!(executor = id, "Flush executor stopped");
        });

        Self {
            id,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Queues a job. Waits while the queue is full.
    pub async fn submit(&self, job: FlushJob) -> Result<FlushTicket> {
        let sender = self
            .sender
            .lock()
            .await
            .clone()
            .ok_or(ClientError::PoolClosed)?;

        let (done, receiver) = oneshot::channel();
        sender
            .send(Task { job, done })
            .await
            .map_err(|_| ClientError::PoolClosed)?;
        Ok(FlushTicket { receiver })
    }

    /// Stops accepting jobs and waits for the queued ones to finish.
    pub async fn shutdown(&self) {
        self.sender.lock().await.take();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!(executor = self.id, error = %e, "Flush executor panicked");
            }
        }
    }
}

/// Pool of flush executors handed out round-robin.
pub struct ExecutorPool {
    pool: ResourcePool<Arc<FlushExecutor>>,
}

impl ExecutorPool {
    pub fn new(size: usize, queue_depth: usize) -> Result<Self> {
        if size == 0 {
            return Err(ClientError::Config(
                "executor pool size must be greater than zero".to_string(),
            ));
        }
        let executors = (0..size)
            .map(|id| Arc::new(FlushExecutor::spawn(id, queue_depth)))
            .collect();
        debug!(size = size, queue_depth = queue_depth, "Executor pool started");
        Ok(Self {
            pool: ResourcePool::new(executors),
        })
    }

    pub fn get_next(&self) -> Result<Arc<FlushExecutor>> {
        self.pool.get_next()
    }

    pub fn size(&self) -> usize {
        self.pool.len()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Drains and stops every executor.
    pub async fn close(&self) -> Result<()> {
        for executor in self.pool.shut()? {
            executor.shutdown().await;
        }
        Ok(())
    }
}
