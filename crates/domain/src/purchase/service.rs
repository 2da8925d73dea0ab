//! Purchase creation: validates and prices a cart, assigns an id and starts
//! the saga.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CorrelationId, IdGenerator, ProductId, PurchaseId, UserId};
use event_bus::{Message, Publisher, TraceContext};
use serde::{Deserialize, Serialize};

use super::handler::topics;
use super::messages::PurchaseCommand;
use super::value_objects::{Money, Order, Payment, Purchase, PurchasedItem};
use crate::DomainError;

/// Price and existence of a product, as seen when pricing a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStatus {
    pub product_id: ProductId,
    pub price: Money,
    pub exists: bool,
}

/// Read access to product prices.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns one status per requested id, in any order.
    async fn check_products(&self, ids: &[ProductId]) -> Result<Vec<ProductStatus>, DomainError>;
}

#[async_trait]
impl<C: ProductCatalog + ?Sized> ProductCatalog for Arc<C> {
    async fn check_products(&self, ids: &[ProductId]) -> Result<Vec<ProductStatus>, DomainError> {
        (**self).check_products(ids).await
    }
}

/// Request to create a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchase {
    pub items: Vec<PurchasedItem>,
    pub currency_code: String,
}

/// Result of a successful purchase creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseCreated {
    pub purchase: Purchase,
    pub correlation_id: CorrelationId,
}

/// Service that turns carts into purchases and starts their saga.
pub struct PurchaseService<C: ProductCatalog, P: Publisher> {
    catalog: C,
    publisher: P,
    ids: Arc<IdGenerator>,
}

impl<C: ProductCatalog, P: Publisher> PurchaseService<C, P> {
    /// Creates a new purchase service.
    pub fn new(catalog: C, publisher: P, ids: Arc<IdGenerator>) -> Self {
        Self {
            catalog,
            publisher,
            ids,
        }
    }

    /// Prices the cart, assigns an id and publishes the start command.
    ///
    /// The purchase is accepted once the start command is published; the
    /// outcome is reported asynchronously on the result stream.
    #[tracing::instrument(skip(self, request))]
    pub async fn create_purchase(
        &self,
        user_id: UserId,
        request: CreatePurchase,
    ) -> Result<PurchaseCreated, DomainError> {
        let purchase = self.price(user_id, request).await?;
        let correlation_id = CorrelationId::new();

        let message = Message::builder()
            .payload(&PurchaseCommand::new(&purchase))?
            .correlation_id(&correlation_id)
            .trace_context(&TraceContext::new_root())
            .build();
        self.publisher
            .publish(topics::PURCHASE_START, message)
            .await?;

        metrics::counter!("purchases_created_total").increment(1);
        tracing::info!(
            purchase_id = %purchase.id,
            correlation_id = %correlation_id,
            amount = %purchase.payment.amount,
            "Purchase created"
        );

        Ok(PurchaseCreated {
            purchase,
            correlation_id,
        })
    }

    async fn price(&self, user_id: UserId, request: CreatePurchase) -> Result<Purchase, DomainError> {
        if request.items.is_empty() {
            return Err(DomainError::EmptyCart);
        }
        if let Some(item) = request.items.iter().find(|item| item.amount <= 0) {
            return Err(DomainError::InvalidCartItemAmount {
                product_id: item.product_id,
                amount: item.amount,
            });
        }
        let currency_code = request.currency_code.trim().to_uppercase();
        if currency_code.is_empty() {
            return Err(DomainError::InvalidCurrency(request.currency_code));
        }

        let ids: Vec<ProductId> = request.items.iter().map(|item| item.product_id).collect();
        let prices: HashMap<ProductId, ProductStatus> = self
            .catalog
            .check_products(&ids)
            .await?
            .into_iter()
            .map(|status| (status.product_id, status))
            .collect();

        let mut total = Money::zero();
        for item in &request.items {
            let status = prices
                .get(&item.product_id)
                .filter(|status| status.exists)
                .ok_or(DomainError::ProductNotFound(item.product_id))?;
            total = status
                .price
                .checked_mul(item.amount)
                .and_then(|line| total.checked_add(line))
                .ok_or(DomainError::AmountOverflow)?;
        }

        Ok(Purchase {
            id: self.next_id()?,
            order: Order {
                user_id,
                items: request.items,
            },
            payment: Payment {
                currency_code,
                amount: total,
            },
        })
    }

    fn next_id(&self) -> Result<PurchaseId, DomainError> {
        Ok(self.ids.next_id()?)
    }
}
