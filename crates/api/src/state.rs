//! Shared application state and the background services behind it.

use std::sync::Arc;

use common::IdGenerator;
use domain::{ProductCatalog, PurchaseService, topics};
use event_bus::{BusError, CappedStream, DeadLetterQueue, InMemoryBus, Router, RouterHandle};
use inventory::{Ledger, ProductRepository};
use projections::{ProjectionProcessor, PurchaseStatusView};
use saga::{
    InMemoryOrderRepository, InMemoryPaymentRepository, InventoryParticipant, OrderParticipant,
    PaymentParticipant, SagaOrchestrator, register_saga,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::TokenVerifier;
use crate::config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub purchases: PurchaseService<Arc<dyn ProductCatalog>, InMemoryBus>,
    pub products: Arc<dyn ProductRepository>,
    pub statuses: PurchaseStatusView,
    pub dead_letters: DeadLetterQueue,
    pub tokens: Arc<dyn TokenVerifier>,
}

/// The running saga: message router, participants and the status
/// projection, plus the state handed to the HTTP handlers.
pub struct Services {
    pub state: Arc<AppState>,
    router: RouterHandle,
    projection: JoinHandle<()>,
    stop_projection: watch::Sender<bool>,
}

impl Services {
    /// Wires the saga over `ledger` and starts consuming.
    pub async fn start<L>(
        config: &Config,
        ledger: L,
        tokens: Arc<dyn TokenVerifier>,
    ) -> Result<Self, BusError>
    where
        L: Ledger + ProductRepository + ProductCatalog + Clone + 'static,
    {
        let bus = InMemoryBus::new();
        let results = CappedStream::new(config.result_stream_max_len);
        let dead_letters = DeadLetterQueue::new();

        let mut router = Router::new(bus.clone(), dead_letters.clone(), config.router_config());
        register_saga(
            &mut router,
            Arc::new(SagaOrchestrator::new(bus.clone(), results.clone())),
            InventoryParticipant::new(ledger.clone()),
            OrderParticipant::new(InMemoryOrderRepository::new()),
            PaymentParticipant::new(InMemoryPaymentRepository::new()),
        );
        let router = router.run().await?;

        let statuses = PurchaseStatusView::new();
        let mut processor = ProjectionProcessor::new(results, topics::PURCHASE_RESULT);
        processor.register(Box::new(statuses.clone()));
        let (stop_projection, stopped) = watch::channel(false);
        let projection = tokio::spawn(processor.run(stopped));

        let catalog: Arc<dyn ProductCatalog> = Arc::new(ledger.clone());
        let ids = Arc::new(IdGenerator::new(config.machine_id));
        let state = Arc::new(AppState {
            purchases: PurchaseService::new(catalog, bus, ids),
            products: Arc::new(ledger),
            statuses,
            dead_letters,
            tokens,
        });

        tracing::info!(machine_id = config.machine_id, "Saga services started");
        Ok(Self {
            state,
            router,
            projection,
            stop_projection,
        })
    }

    /// Drains in-flight handlers, then stops the projection.
    pub async fn shutdown(self) {
        self.router.shutdown().await;
        let _ = self.stop_projection.send(true);
        if let Err(e) = self.projection.await {
            tracing::warn!(error = %e, "Projection task failed");
        }
        tracing::info!("Saga services stopped");
    }
}
