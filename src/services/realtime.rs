use crate::config::RealtimeConfig;
use crate::domain::{MESSAGES_TABLE, PushEvent};
use crate::error::{AppError, Result};
use backon::{ExponentialBuilder, Retryable};
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::Counter,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

#[derive(Clone, Debug)]
struct HubMetrics {
    published_total: Counter<u64>,
    unrouted_total: Counter<u64>,
}

impl HubMetrics {
    fn new() -> Self {
        let meter = global::meter("cove-messaging");
        Self {
            published_total: meter
                .u64_counter("cove_realtime_published_total")
                .with_description("Total push events published to the hub")
                .build(),
            unrouted_total: meter
                .u64_counter("cove_realtime_unrouted_total")
                .with_description("Push events published with no live subscriber")
                .build(),
        }
    }
}

/// Session-scoped dispatcher for row-insert push events, keyed by table name.
///
/// The hub is an explicit handle passed into the session by the host, not a
/// module-level singleton. One subscription per session; `close` tears all
/// channels down on sign-out.
#[derive(Clone, Debug)]
pub struct RealtimeHub {
    channels: Arc<DashMap<String, broadcast::Sender<PushEvent>>>,
    closed: Arc<AtomicBool>,
    capacity: usize,
    metrics: HubMetrics,
}

impl RealtimeHub {
    #[must_use]
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
            capacity: config.channel_capacity,
            metrics: HubMetrics::new(),
        }
    }

    /// Delivers an insert event to the table's subscribers. Events for tables
    /// nobody listens to are counted and dropped.
    pub fn publish(&self, event: PushEvent) {
        let table = event.table.clone();
        self.metrics.published_total.add(1, &[KeyValue::new("table", table.clone())]);

        match self.channels.get(&event.table) {
            Some(tx) if tx.receiver_count() > 0 => {
                let _ = tx.send(event);
            }
            _ => {
                tracing::trace!(table = %table, "No subscriber for push event");
                self.metrics.unrouted_total.add(1, &[KeyValue::new("table", table)]);
            }
        }
    }

    /// Opens a subscription for one table.
    ///
    /// # Errors
    /// Returns `AppError::EventChannelDropped` once the hub has been closed.
    pub fn subscribe(&self, table: &str) -> Result<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::EventChannelDropped);
        }

        let rx = self
            .channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .value()
            .subscribe();

        Ok(Subscription { rx })
    }

    /// Tears the hub down at sign-out. Subscribers observe a channel drop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.channels.clear();
    }
}

/// An open push-event subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<PushEvent>,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// # Errors
    /// Returns `AppError::EventChannelDropped` when the channel lagged past
    /// this subscriber or was closed. Either way events may have been missed;
    /// the caller must fall back to the pull endpoints.
    pub async fn recv(&mut self) -> Result<PushEvent> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Push subscription lagged");
                Err(AppError::EventChannelDropped)
            }
            Err(broadcast::error::RecvError::Closed) => Err(AppError::EventChannelDropped),
        }
    }
}

/// What the listener forwards into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerSignal {
    /// A row-insert event arrived.
    Event(PushEvent),
    /// The channel dropped and was reopened; pulled snapshots must be
    /// refreshed since events may have been missed.
    Resync,
}

/// Background task bridging the push channel into the session's event queue.
///
/// On channel drop it resubscribes with exponential backoff and emits a
/// `Resync` signal; the pull endpoints remain the source of truth, so no
/// missed event is permanent.
#[derive(Debug)]
pub struct EventListener {
    task: tokio::task::JoinHandle<()>,
}

impl EventListener {
    /// Opens the messages-table subscription and starts forwarding.
    ///
    /// # Errors
    /// Returns `AppError::EventChannelDropped` if the hub is already closed.
    pub fn spawn(hub: RealtimeHub, tx: mpsc::Sender<ListenerSignal>) -> Result<Self> {
        let subscription = hub.subscribe(MESSAGES_TABLE)?;

        let task = tokio::spawn(
            async move {
                Self::run(hub, subscription, tx).await;
            }
            .instrument(tracing::info_span!("event_listener", table = MESSAGES_TABLE)),
        );

        Ok(Self { task })
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    async fn run(hub: RealtimeHub, mut subscription: Subscription, tx: mpsc::Sender<ListenerSignal>) {
        loop {
            match subscription.recv().await {
                Ok(event) => {
                    if tx.send(ListenerSignal::Event(event)).await.is_err() {
                        break;
                    }
                }
                Err(_) => {
                    let resubscribe = || async { hub.subscribe(MESSAGES_TABLE) };
                    match resubscribe.retry(ExponentialBuilder::default()).await {
                        Ok(sub) => {
                            tracing::info!("Push subscription reopened");
                            subscription = sub;
                            if tx.send(ListenerSignal::Resync).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => {
                            tracing::info!("Hub closed, stopping listener");
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}
