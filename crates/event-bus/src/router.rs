//! Message router: binds handlers to topic subscriptions and applies the
//! delivery policy (deadline, retry with backoff, dead-lettering).

use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, warn};

use crate::{
    BusError, DeadLetter, DeadLetterQueue, InMemoryBus, Message, MessageHandler, Publisher, Result,
    Subscription,
};

/// Delivery policy applied to every handler of a router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Deadline for a single handler invocation.
    pub handler_timeout: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub retry_initial_delay: Duration,
    /// Upper bound for the retry delay.
    pub retry_max_delay: Duration,
    /// Maximum number of messages handled concurrently across all routes.
    pub concurrency_limit: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
            concurrency_limit: 64,
        }
    }
}

impl RouterConfig {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.retry_initial_delay)
            .with_max_delay(self.retry_max_delay)
            .with_max_times(self.max_retries)
            .with_jitter()
    }
}

struct Route {
    name: String,
    subscribe_topic: String,
    group: String,
    publish_topic: Option<String>,
    handler: Arc<dyn MessageHandler>,
}

/// Routes messages from bus subscriptions to handlers.
pub struct Router {
    bus: InMemoryBus,
    dead_letters: DeadLetterQueue,
    config: RouterConfig,
    routes: Vec<Route>,
}

impl Router {
    /// Creates a router over the given bus.
    pub fn new(bus: InMemoryBus, dead_letters: DeadLetterQueue, config: RouterConfig) -> Self {
        Self {
            bus,
            dead_letters,
            config,
            routes: Vec::new(),
        }
    }

    /// Registers a handler.
    ///
    /// Messages produced by the handler are published to `publish_topic`
    /// once the handler succeeds. Produced messages without a correlation id
    /// inherit the one of the inbound message.
    pub fn add_handler(
        &mut self,
        name: impl Into<String>,
        subscribe_topic: impl Into<String>,
        group: impl Into<String>,
        publish_topic: Option<&str>,
        handler: Arc<dyn MessageHandler>,
    ) -> &mut Self {
        self.routes.push(Route {
            name: name.into(),
            subscribe_topic: subscribe_topic.into(),
            group: group.into(),
            publish_topic: publish_topic.map(str::to_string),
            handler,
        });
        self
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.routes.len()
    }

    /// Subscribes every route and starts consuming.
    pub async fn run(self) -> Result<RouterHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit.max(1)));
        let mut consumers = Vec::with_capacity(self.routes.len());

        for route in self.routes {
            let subscription = self
                .bus
                .subscribe(&route.subscribe_topic, &route.group)
                .await?;
            info!(
                handler = %route.name,
                topic = %route.subscribe_topic,
                group = %route.group,
                "Handler subscribed"
            );

            let worker = Worker {
                route: Arc::new(route),
                publisher: self.bus.clone(),
                dead_letters: self.dead_letters.clone(),
                config: self.config.clone(),
            };
            consumers.push(tokio::spawn(worker.consume(
                subscription,
                semaphore.clone(),
                shutdown_rx.clone(),
            )));
        }

        Ok(RouterHandle {
            shutdown: shutdown_tx,
            consumers,
        })
    }
}

/// Handle to a running router.
pub struct RouterHandle {
    shutdown: watch::Sender<bool>,
    consumers: Vec<tokio::task::JoinHandle<()>>,
}

impl RouterHandle {
    /// Stops pulling new messages and waits for in-flight handlers.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for consumer in self.consumers {
            if let Err(e) = consumer.await {
                warn!(error = %e, "Router consumer task failed");
            }
        }
        info!("Router stopped");
    }
}

#[derive(Clone)]
struct Worker {
    route: Arc<Route>,
    publisher: InMemoryBus,
    dead_letters: DeadLetterQueue,
    config: RouterConfig,
}

impl Worker {
    async fn consume(
        self,
        subscription: Subscription,
        semaphore: Arc<Semaphore>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut in_flight = JoinSet::new();

        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                message = subscription.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let worker = self.clone();
            in_flight.spawn(async move {
                worker.process(message).await;
                drop(permit);
            });

            // Reap finished tasks so the set does not grow unbounded
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}
        debug!(handler = %self.route.name, "Consumer drained");
    }

    async fn process(&self, message: Message) {
        let correlation_id = message
            .correlation_id()
            .map(|c| c.to_string())
            .unwrap_or_default();
        let trace = message.trace_context();
        let trace_id = trace.as_ref().map(|t| t.trace_id()).unwrap_or_default();
        let span = tracing::info_span!(
            "handle_message",
            handler = %self.route.name,
            topic = %self.route.subscribe_topic,
            message_id = %message.id,
            correlation_id = %correlation_id,
            trace_id = %trace_id,
        );
        if let Some(trace) = &trace {
            trace.attach(&span);
        }

        async {
            let mut backoff = self.config.backoff().build();
            let mut attempts = 0;

            loop {
                attempts += 1;
                let error = match self.attempt(message.clone()).await {
                    Ok(()) => return,
                    Err(e) => e,
                };

                if !error.is_retryable() {
                    warn!(attempts, error = %error, "Permanent handler error");
                    self.dead_letter(message, error, attempts).await;
                    return;
                }

                match backoff.next() {
                    Some(delay) => {
                        warn!(
                            attempts,
                            error = %error,
                            backoff_ms = %delay.as_millis(),
                            "Handler failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        self.dead_letter(message, error, attempts).await;
                        return;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs the handler once under the deadline and publishes its output.
    async fn attempt(&self, message: Message) -> Result<()> {
        let correlation_id = message.correlation_id();
        let handler = self.route.handler.clone();
        let started = Instant::now();

        // A separate task turns a handler panic into a JoinError
        let task = tokio::spawn(async move { handler.handle(message).await });
        let abort = task.abort_handle();
        let outcome = match tokio::time::timeout(self.config.handler_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(BusError::Panicked(join_error.to_string())),
            Err(_) => {
                abort.abort();
                Err(BusError::Timeout(self.config.handler_timeout))
            }
        };

        let status = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            "bus_handler_attempts_total",
            "handler" => self.route.name.clone(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!("bus_handler_duration_seconds", "handler" => self.route.name.clone())
            .record(started.elapsed().as_secs_f64());

        let produced = outcome?;
        if produced.is_empty() {
            return Ok(());
        }

        let Some(topic) = self.route.publish_topic.as_deref() else {
            warn!(
                count = produced.len(),
                "Handler produced messages but has no publish topic"
            );
            return Ok(());
        };

        for mut out in produced {
            if out.correlation_id().is_none()
                && let Some(correlation_id) = &correlation_id
            {
                out.set_metadata(crate::CORRELATION_ID_KEY, correlation_id.as_str());
            }
            self.publisher.publish(topic, out).await?;
        }
        Ok(())
    }

    async fn dead_letter(&self, message: Message, error: BusError, attempts: usize) {
        self.dead_letters
            .push(DeadLetter {
                message,
                topic: self.route.subscribe_topic.clone(),
                handler_name: self.route.name.clone(),
                error: error.to_string(),
                attempts,
                failed_at: Utc::now(),
            })
            .await;
    }
}
