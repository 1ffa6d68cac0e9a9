//! Observing precondition with its own processing task

use super::{Observing, Precondition, PreconditionContext, PreconditionError};
use crate::observer::RunObserver;
use async_trait::async_trait;
use sdccc_types::DeviceChange;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Queue length above which every enqueue is logged
pub const QUEUE_WARNING_THRESHOLD: usize = 200;

enum Queued {
    Change(DeviceChange),
    Barrier(oneshot::Sender<()>),
}

/// Reacts to device changes on the processing task
#[async_trait]
pub trait ChangeProcessor: Send + Sync + 'static {
    async fn process_change(&self, change: DeviceChange) -> Result<(), PreconditionError>;
}

/// Queues device changes and hands them to a [`ChangeProcessor`] in order
///
/// The delivering side never waits for processing. If the processor fails
/// the run is invalidated and further changes are dropped.
pub struct BufferedObserver<P: ChangeProcessor> {
    name: &'static str,
    processor: Arc<P>,
    sender: mpsc::UnboundedSender<Queued>,
    queued: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
    drop_logged: AtomicBool,
}

impl<P: ChangeProcessor> BufferedObserver<P> {
    /// Create the observer and spawn its processing task
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(name: &'static str, processor: P, observer: RunObserver) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Queued>();
        let processor = Arc::new(processor);
        let queued = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicBool::new(true));

        let task_processor = processor.clone();
        let task_queued = queued.clone();
        let task_alive = alive.clone();
        tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                let change = match item {
                    Queued::Change(change) => change,
                    Queued::Barrier(ack) => {
                        let _ = ack.send(());
                        continue;
                    }
                };
                task_queued.fetch_sub(1, Ordering::SeqCst);
                if let Err(err) = task_processor.process_change(change).await {
                    task_alive.store(false, Ordering::SeqCst);
                    error!(precondition = name, error = %err, "Change processing failed");
                    observer.invalidate(format!(
                        "Processing thread for Precondition {} has caught an exception and cannot process incoming change",
                        name
                    ));
                    break;
                }
            }
            debug!(precondition = name, "Change processing stopped");
        });

        Self {
            name,
            processor,
            sender,
            queued,
            alive,
            drop_logged: AtomicBool::new(false),
        }
    }

    pub fn processor(&self) -> &Arc<P> {
        &self.processor
    }

    /// Whether the processing task still accepts changes
    pub fn is_processing(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Changes waiting for the processor
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Wait until every change observed before this call was processed
    ///
    /// Returns immediately once processing has stopped.
    pub async fn drain(&self) {
        if !self.is_processing() {
            return;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sender.send(Queued::Barrier(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl<P: ChangeProcessor> Observing for BufferedObserver<P> {
    fn observe_change(&self, change: &DeviceChange) {
        if !self.is_processing() {
            if !self.drop_logged.swap(true, Ordering::SeqCst) {
                warn!(precondition = self.name, "Processing has stopped, dropping incoming changes");
            }
            return;
        }
        let queued = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        if queued > QUEUE_WARNING_THRESHOLD {
            debug!(precondition = self.name, queued, "Change queue is growing");
        }
        if self.sender.send(Queued::Change(change.clone())).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl<P: ChangeProcessor> Precondition for BufferedObserver<P> {
    async fn verify(&self, _ctx: &PreconditionContext) -> Result<(), PreconditionError> {
        Ok(())
    }
}
