//! Event dispatcher: fans inbound events out to per-user workers.
//!
//! Each user gets a queue and a worker task. Events for one user are handled
//! strictly in arrival order; different users proceed concurrently. Workers
//! exit after sitting idle and are respawned on the next event. A respawned
//! worker waits for its predecessor to finish draining before it starts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::channels::{Channel, InboundEvent, OutgoingMessage};
use crate::error::Error;
use crate::registration::{prompts, DialogueController};

/// Events buffered per user. Past this the user is asked to wait and the
/// event is dropped; the dispatcher itself never blocks on one user.
const QUEUE_DEPTH: usize = 32;

/// How often idle sessions are pruned.
const PRUNE_INTERVAL: Duration = Duration::from_secs(600);

/// A user's queue and the signal its worker drops on exit.
struct UserQueue {
    tx: mpsc::Sender<InboundEvent>,
    finished: oneshot::Receiver<()>,
}

impl UserQueue {
    /// Whether the worker behind this queue may still handle events.
    fn is_live(&mut self) -> bool {
        !self.tx.is_closed()
            || matches!(
                self.finished.try_recv(),
                Err(oneshot::error::TryRecvError::Empty)
            )
    }
}

/// Routes channel events to the dialogue controller.
pub struct Dispatcher {
    controller: Arc<DialogueController>,
    channel: Arc<dyn Channel>,
    session_idle_timeout: Duration,
    worker_idle_timeout: Duration,
    queues: HashMap<String, UserQueue>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(controller: Arc<DialogueController>, channel: Arc<dyn Channel>) -> Self {
        Self {
            controller,
            channel,
            session_idle_timeout: Duration::from_secs(24 * 3600),
            worker_idle_timeout: Duration::from_secs(300),
            queues: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_timeout = timeout;
        self
    }

    /// Run until the channel's stream ends or Ctrl+C. Queued events are
    /// finished before returning.
    pub async fn run(mut self) -> Result<(), Error> {
        let mut events = self.channel.start().await?;

        let sessions = Arc::clone(self.controller.sessions());
        let session_idle_timeout = self.session_idle_timeout;
        let pruning_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                let removed = sessions.prune_idle(session_idle_timeout).await;
                if removed > 0 {
                    tracing::info!(removed, "Pruned idle sessions");
                }
            }
        });

        tracing::info!(channel = %self.channel.name(), "Dispatcher ready and listening");

        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                event = events.next() => {
                    match event {
                        Some(e) => e,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            self.dispatch(event);
        }

        pruning_handle.abort();

        // Closing the queues lets each worker drain what it has and exit.
        self.queues.clear();
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        self.channel.shutdown().await?;
        Ok(())
    }

    /// Hand `event` to its user's worker, starting one if needed. Never waits
    /// on a worker.
    pub fn dispatch(&mut self, event: InboundEvent) {
        while let Some(result) = self.workers.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
            }
        }

        let user_id = event.user_id.clone();
        let event = match self.queues.get(&user_id) {
            Some(queue) => match queue.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(event)) => {
                    self.reply_busy(event);
                    return;
                }
                // The worker went idle and closed its queue.
                Err(TrySendError::Closed(event)) => event,
            },
            None => event,
        };

        let predecessor = self.queues.remove(&user_id).map(|queue| queue.finished);
        self.queues.retain(|_, queue| queue.is_live());

        let queue = self.spawn_worker(&user_id, predecessor);
        if let Err(e) = queue.tx.try_send(event) {
            tracing::error!(user_id = %user_id, error = %e, "Fresh worker queue rejected event");
            return;
        }
        self.queues.insert(user_id, queue);
    }

    fn reply_busy(&self, event: InboundEvent) {
        tracing::warn!(
            user_id = %event.user_id,
            depth = QUEUE_DEPTH,
            "User queue full; event dropped"
        );
        let channel = Arc::clone(&self.channel);
        tokio::spawn(async move {
            let busy = OutgoingMessage::text(prompts::STILL_WORKING).into();
            if let Err(e) = channel.send(&event.reply_to, busy).await {
                tracing::warn!(user_id = %event.user_id, error = %e, "Failed to deliver reply");
            }
        });
    }

    /// Start a worker for `user_id`. It handles nothing until `predecessor`,
    /// the previous worker for the same user, has exited.
    fn spawn_worker(
        &mut self,
        user_id: &str,
        predecessor: Option<oneshot::Receiver<()>>,
    ) -> UserQueue {
        let (tx, mut rx) = mpsc::channel::<InboundEvent>(QUEUE_DEPTH);
        let (finished_tx, finished) = oneshot::channel::<()>();
        let controller = Arc::clone(&self.controller);
        let channel = Arc::clone(&self.channel);
        let idle = self.worker_idle_timeout;
        let user_id = user_id.to_string();

        self.workers.spawn(async move {
            let _finished = finished_tx;
            if let Some(predecessor) = predecessor {
                // Resolves with an error once the old worker drops its sender.
                let _ = predecessor.await;
            }
            tracing::debug!(user_id = %user_id, "Worker started");
            loop {
                match tokio::time::timeout(idle, rx.recv()).await {
                    Ok(Some(event)) => handle_event(&controller, channel.as_ref(), event).await,
                    Ok(None) => break,
                    Err(_) => {
                        // Refuse new events, then finish anything that slipped in.
                        rx.close();
                        while let Ok(event) = rx.try_recv() {
                            handle_event(&controller, channel.as_ref(), event).await;
                        }
                        break;
                    }
                }
            }
            tracing::debug!(user_id = %user_id, "Worker exiting");
        });

        UserQueue { tx, finished }
    }

    /// Number of live per-user queues.
    pub fn worker_count(&self) -> usize {
        self.queues.values().filter(|q| !q.tx.is_closed()).count()
    }
}

async fn handle_event(controller: &DialogueController, channel: &dyn Channel, event: InboundEvent) {
    tracing::debug!(
        user_id = %event.user_id,
        user_name = event.user_name.as_deref().unwrap_or(""),
        queued_ms = (Utc::now() - event.received_at).num_milliseconds(),
        "Handling event"
    );
    let replies = controller.handle(&event).await;
    for outgoing in replies {
        if let Err(e) = channel.send(&event.reply_to, outgoing).await {
            tracing::warn!(
                user_id = %event.user_id,
                channel = %event.channel,
                error = %e,
                "Failed to deliver reply"
            );
        }
    }
}
