//! Payment-triggered settlement
//!
//! The gateway calls back once per payment attempt, possibly more than
//! once and possibly concurrently. A notification moves through
//! validation, duplicate suppression and status interpretation; a PAID
//! notification with a live payment context becomes exactly one order,
//! after which stock, coupon, offer, loyalty and cart side effects run
//! independently. A failing side effect is logged and the rest still run.

use serde::Serialize;

use shared::{
    validate_notification, Cart, CartItem, LineItem, MovementReference, NewOrder, NewOrderItem,
    NotificationRecord, OfferRef, Order, OrderInsert, OrderStatus, PaymentContext,
    PaymentNotification, PaymentStatus, ProductRef, StockRecord,
};
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};
use crate::repository::Stores;
use crate::services::offers::OfferResolver;
use crate::services::payment_signature::PaymentSigner;
use crate::services::stock::StockService;

/// Where a notification ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementState {
    /// Missing fields, wrong merchant or bad signature
    Rejected,
    /// Same signature and gateway id seen before
    Duplicate,
    /// Raw notification could not be stored; nothing else was done
    NotRecorded,
    /// An order already exists for the reference
    AlreadySettled,
    /// Status other than PAID; nothing to materialize
    NotPaid,
    /// PAID but the payment context expired or never existed
    ContextMissing,
    /// PAID but the cart was empty by the time the callback arrived
    EmptyCart,
    Settled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementOutcome {
    pub success: bool,
    pub state: SettlementState,
    pub order: Option<Order>,
    pub message: String,
}

impl SettlementOutcome {
    fn new(success: bool, state: SettlementState, message: impl Into<String>) -> Self {
        Self {
            success,
            state,
            order: None,
            message: message.into(),
        }
    }

    fn with_order(mut self, order: Option<Order>) -> Self {
        self.order = order;
        self
    }
}

/// Offers whose deactivation check is due, in discovery order
#[derive(Debug, Default)]
struct TouchedOffers(Vec<OfferRef>);

impl TouchedOffers {
    fn push(&mut self, offer: OfferRef) {
        if !self.0.contains(&offer) {
            self.0.push(offer);
        }
    }
}

#[derive(Clone)]
pub struct SettlementEngine {
    stores: Stores,
    stock: StockService,
    resolver: OfferResolver,
    signer: PaymentSigner,
    merchant_id: String,
    verify_signatures: bool,
}

impl SettlementEngine {
    pub fn new(stores: &Stores, payment: &PaymentConfig) -> Self {
        Self {
            stores: stores.clone(),
            stock: StockService::new(stores),
            resolver: OfferResolver::new(stores),
            signer: PaymentSigner::from_config(payment),
            merchant_id: payment.merchant_id.clone(),
            verify_signatures: payment.verify_signatures,
        }
    }

    /// Process one gateway notification; never returns an error
    pub async fn handle_payment_notification(
        &self,
        notification: PaymentNotification,
    ) -> SettlementOutcome {
        let reference = notification.m_payment_id.clone().unwrap_or_default();

        match self.process(notification).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(payment_reference = %reference, error = %e, "Settlement failed");
                SettlementOutcome::new(false, SettlementState::Failed, format!("Settlement failed: {}", e))
            }
        }
    }

    async fn process(&self, notification: PaymentNotification) -> AppResult<SettlementOutcome> {
        let validated = match validate_notification(&notification) {
            Ok(v) => v,
            Err(missing) => {
                tracing::warn!(?missing, "Payment notification missing required fields");
                return Ok(SettlementOutcome::new(
                    false,
                    SettlementState::Rejected,
                    format!("Missing required fields: {}", missing.join(", ")),
                ));
            }
        };
        let reference = validated.payment_reference.as_str();

        if validated.merchant_id != self.merchant_id {
            tracing::warn!(
                payment_reference = %reference,
                merchant_id = %validated.merchant_id,
                "Payment notification for another merchant"
            );
            return Ok(SettlementOutcome::new(
                false,
                SettlementState::Rejected,
                "Merchant id mismatch",
            ));
        }

        if self.verify_signatures {
            let verified = validated
                .signature
                .as_deref()
                .map(|sig| self.signer.verify(&notification.signed_fields(), sig))
                .unwrap_or(false);
            if !verified {
                tracing::warn!(payment_reference = %reference, "Payment notification signature did not verify");
                return Ok(SettlementOutcome::new(
                    false,
                    SettlementState::Rejected,
                    "Invalid signature",
                ));
            }
        }

        // Duplicate delivery of a notification already processed
        if self
            .stores
            .notifications
            .is_recorded(
                validated.signature.as_deref(),
                &validated.external_id,
                &validated.status_raw,
            )
            .await?
        {
            let existing = self.stores.orders.find_order_by_number(reference).await?;
            tracing::info!(
                payment_reference = %reference,
                external_id = %validated.external_id,
                has_order = existing.is_some(),
                "Duplicate payment notification"
            );
            return Ok(SettlementOutcome::new(
                true,
                SettlementState::Duplicate,
                "Notification already processed",
            )
            .with_order(existing));
        }

        let payload = serde_json::to_value(&notification)
            .map_err(|e| AppError::Internal(format!("Failed to serialize notification: {}", e)))?;
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            payment_reference: reference.to_string(),
            external_id: validated.external_id.clone(),
            status: validated.status_raw.clone(),
            signature: validated.signature.clone(),
            payload,
            received_at: self.stores.clock.now(),
        };
        if let Err(e) = self.stores.notifications.record(record).await {
            tracing::error!(
                payment_reference = %reference,
                error = %e,
                "Failed to store payment notification, no order created"
            );
            return Ok(SettlementOutcome::new(
                true,
                SettlementState::NotRecorded,
                "Notification could not be stored",
            ));
        }

        if let Some(existing) = self.stores.orders.find_order_by_number(reference).await? {
            return Ok(SettlementOutcome::new(
                true,
                SettlementState::AlreadySettled,
                "Order already exists",
            )
            .with_order(Some(existing)));
        }

        let status = validated.status();
        if status != PaymentStatus::Paid {
            tracing::info!(
                payment_reference = %reference,
                status = status.as_str(),
                raw_status = %validated.status_raw,
                "Payment not completed, no order created"
            );
            return Ok(SettlementOutcome::new(
                true,
                SettlementState::NotPaid,
                format!("Payment status {}", status.as_str()),
            ));
        }

        let Some(context) = self.stores.contexts.get(reference).await? else {
            tracing::error!(
                payment_reference = %reference,
                external_id = %validated.external_id,
                "Payment received without checkout context, manual verification required"
            );
            return Ok(SettlementOutcome::new(
                true,
                SettlementState::ContextMissing,
                "Payment received but checkout details were not found; manual verification required",
            ));
        };

        self.materialize(reference, context).await
    }

    async fn materialize(&self, reference: &str, context: PaymentContext) -> AppResult<SettlementOutcome> {
        let user_id = context.user_id;

        let cart = self.stores.carts.get_full_cart(user_id).await?;
        if cart.is_empty() {
            tracing::warn!(payment_reference = %reference, %user_id, "Paid checkout has an empty cart, no order created");
            return Ok(SettlementOutcome::new(
                true,
                SettlementState::EmptyCart,
                "Cart is empty; manual verification required",
            ));
        }

        let order = match self
            .stores
            .orders
            .create_order(new_order(reference, &cart, &context))
            .await?
        {
            OrderInsert::Created(order) => order,
            OrderInsert::AlreadyExists(existing) => {
                tracing::info!(payment_reference = %reference, "Order created by a concurrent notification");
                return Ok(SettlementOutcome::new(
                    true,
                    SettlementState::AlreadySettled,
                    "Order already exists",
                )
                .with_order(Some(existing)));
            }
        };

        let items = cart
            .items
            .iter()
            .map(|item| NewOrderItem {
                line: item.line,
                unit_price: item.unit_price,
            })
            .collect();
        if let Err(e) = self.stores.orders.create_order_items(order.id, items).await {
            tracing::error!(order_number = %order.order_number, error = %e, "Failed to store order items");
        }

        if let Some(coupon_id) = cart.coupon_id {
            if let Err(e) = self.stores.coupons.increment_usage_count(coupon_id).await {
                tracing::error!(order_number = %order.order_number, %coupon_id, error = %e, "Failed to record coupon usage");
            }
        }

        let mut touched = TouchedOffers::default();
        for item in &cart.items {
            if let Err(e) = self.decrement_item(&order, item, &mut touched).await {
                tracing::error!(
                    order_number = %order.order_number,
                    cart_item_id = %item.id,
                    line = %item.line,
                    error = %e,
                    "Stock decrement failed for order line"
                );
            }
        }

        for offer in touched.0 {
            if let Err(e) = self.resolver.deactivate_if_exhausted(offer).await {
                tracing::error!(%offer, error = %e, "Offer deactivation check failed");
            }
        }

        match self
            .stores
            .loyalty
            .add_points_for_order(user_id, order.id, order.total_amount)
            .await
        {
            Ok(award) => tracing::info!(
                order_number = %order.order_number,
                base_points = award.base_points,
                bonus_points = award.bonus_points,
                "Loyalty points awarded"
            ),
            Err(e) => tracing::warn!(order_number = %order.order_number, error = %e, "Loyalty accrual failed"),
        }

        if let Err(e) = self.stores.carts.clear_cart(user_id).await {
            tracing::error!(order_number = %order.order_number, %user_id, error = %e, "Failed to clear cart");
        }

        if let Err(e) = self.stores.contexts.remove(reference).await {
            tracing::warn!(payment_reference = %reference, error = %e, "Failed to remove payment context");
        }

        tracing::info!(
            order_number = %order.order_number,
            %user_id,
            total = %order.total_amount,
            items = cart.items.len(),
            "Order settled"
        );

        let message = format!("Order {} created", order.order_number);
        Ok(SettlementOutcome::new(true, SettlementState::Settled, message).with_order(Some(order)))
    }

    /// Take stock for one cart line
    ///
    /// Offer lines deduct every constituent even when an earlier one fails
    /// and always queue the offer for a deactivation check.
    async fn decrement_item(
        &self,
        order: &Order,
        item: &CartItem,
        touched: &mut TouchedOffers,
    ) -> AppResult<()> {
        let reason = format!("Order {}", order.order_number);

        match item.line {
            LineItem::Product {
                product_id,
                size_id,
                quantity,
            } => {
                let owner = ProductRef::for_line(product_id, size_id);
                let record = self
                    .stock
                    .deduct_with_movement(owner, quantity, &reason, Some(MovementReference::order(order.id)))
                    .await?;
                self.after_deduct(product_id, &record, touched).await;
                Ok(())
            }
            LineItem::Deal { quantity, .. } | LineItem::Promotion { quantity, .. } => {
                let Some(offer_ref) = item.line.offer_ref() else {
                    return Ok(());
                };
                touched.push(offer_ref);

                let offer = self.resolver.load(offer_ref).await?;
                let lines = self.resolver.expand(&offer, quantity);
                let mut failed = 0;

                for line in &lines {
                    let owner = line.stock_ref();
                    match self
                        .stock
                        .deduct_with_movement(owner, line.quantity, &reason, Some(MovementReference::order(order.id)))
                        .await
                    {
                        Ok(record) => self.after_deduct(line.product_id, &record, touched).await,
                        Err(e) => {
                            failed += 1;
                            tracing::error!(
                                order_number = %order.order_number,
                                offer = %offer_ref,
                                %owner,
                                quantity = line.quantity,
                                error = %e,
                                "Offer constituent decrement failed"
                            );
                        }
                    }
                }

                if failed > 0 {
                    return Err(AppError::InsufficientStock(format!(
                        "{} of {} constituents of {} could not be deducted",
                        failed,
                        lines.len(),
                        offer_ref
                    )));
                }
                Ok(())
            }
        }
    }

    /// Flag the product and queue co-located offers once nothing is sellable
    async fn after_deduct(&self, product_id: Uuid, record: &StockRecord, touched: &mut TouchedOffers) {
        if !record.is_out_of_stock() {
            return;
        }

        if let Err(e) = self.stores.catalog.mark_product_out_of_stock(product_id).await {
            tracing::warn!(%product_id, error = %e, "Failed to mark product out of stock");
        }

        match self.resolver.find_offers_containing(record.owner).await {
            Ok(found) => found.refs().for_each(|offer| touched.push(offer)),
            Err(e) => tracing::warn!(owner = %record.owner, error = %e, "Failed to look up offers for exhausted stock"),
        }
    }
}

fn new_order(reference: &str, cart: &Cart, context: &PaymentContext) -> NewOrder {
    NewOrder {
        order_number: reference.to_string(),
        user_id: context.user_id,
        status: OrderStatus::Confirmed,
        payment_status: PaymentStatus::Paid,
        subtotal: cart.subtotal,
        discount: cart.discount_applied,
        shipping: rust_decimal::Decimal::ZERO,
        tax: rust_decimal::Decimal::ZERO,
        total_amount: cart.total_amount,
        coupon_id: cart.coupon_id,
        delivery_address: context.delivery_address.clone(),
        delivery_method: context.delivery_method.clone(),
        contact: context.contact.clone(),
    }
}
