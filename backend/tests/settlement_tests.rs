//! Checkout settlement tests
//!
//! Tests for turning gateway notifications into orders including:
//! - Idempotent handling of duplicate and concurrent deliveries
//! - Partial stock failures that still keep the order
//! - Offer deactivation after a constituent runs out
//! - Rejection of unauthenticated or malformed callbacks

mod common;

use chrono::Duration;
use proptest::prelude::*;
use uuid::Uuid;

use common::{entry, product_line, Fixture, MERCHANT_ID};
use market_server::services::{
    OfferResolver, OrderService, SettlementState, StockService,
};
use market_server::services::stock::RestockInput;
use shared::{LineItem, MovementType, OrderStatus, PaymentStatus, ProductRef};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// A paid checkout becomes one order and every side effect runs
    #[tokio::test]
    async fn test_paid_notification_settles_order() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Ethiopia Yirgacheffe", 10);
        let owner = ProductRef::Variant(size_id);
        // Deal shares the size but keeps stock after the sale
        let deal = fx.deal(vec![entry(product_id, Some(size_id), 1)]);

        let mut cart = fx.cart(user_id, vec![product_line(product_id, Some(size_id), 2)], "50.00");
        let coupon_id = Uuid::new_v4();
        cart.coupon_id = Some(coupon_id);
        fx.db.set_cart(cart);
        fx.put_context("MKT-1001", user_id).await;

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1001", "pf-1", "COMPLETE"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, SettlementState::Settled);
        let order = outcome.order.expect("order returned");
        assert_eq!(order.order_number, "MKT-1001");
        assert_eq!(order.user_id, user_id);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.total_amount, common::dec("100.00"));
        assert_eq!(order.coupon_id, Some(coupon_id));
        assert_eq!(order.delivery_method, "courier");

        assert_eq!(fx.available(owner), 8);
        assert!(fx.is_offer_active(deal));
        assert!(fx.db.product(product_id).unwrap().in_stock);

        let items = fx.db.order_items_for(order.id);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].total_price, common::dec("100.00"));

        let movements = fx.db.movements_for(owner);
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].movement_type, MovementType::Out);
        assert_eq!(movements[0].quantity, -2);
        assert_eq!(
            movements[0].reference.as_ref().map(|r| r.reference_type.as_str()),
            Some("order")
        );

        assert_eq!(fx.db.coupon_usage(coupon_id), 1);
        assert_eq!(fx.loyalty.calls(), vec![(user_id, order.id, common::dec("100.00"))]);
        assert!(fx.db.cart(user_id).unwrap().is_empty());
        assert!(fx.stores.contexts.get("MKT-1001").await.unwrap().is_none());
    }

    /// Redelivery of the same notification creates nothing new
    #[tokio::test]
    async fn test_duplicate_notification_is_idempotent() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Kenya AA", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 2)], "50.00");
        fx.put_context("MKT-1002", user_id).await;

        let engine = fx.engine();
        let notification = fx.notification("MKT-1002", "pf-2", "COMPLETE");

        let first = engine.handle_payment_notification(notification.clone()).await;
        assert_eq!(first.state, SettlementState::Settled);

        let second = engine.handle_payment_notification(notification).await;
        assert!(second.success);
        assert_eq!(second.state, SettlementState::Duplicate);
        assert_eq!(
            second.order.map(|o| o.id),
            first.order.map(|o| o.id)
        );

        assert_eq!(fx.db.order_count(), 1);
        assert_eq!(fx.db.notification_count(), 1);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 8);
        assert_eq!(fx.loyalty.calls().len(), 1);
    }

    /// A second, differently signed PAID callback for a settled reference
    /// finds the existing order
    #[tokio::test]
    async fn test_new_delivery_for_settled_reference() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Kenya AA", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 2)], "50.00");
        fx.put_context("MKT-1003", user_id).await;

        let engine = fx.engine();
        engine
            .handle_payment_notification(fx.notification("MKT-1003", "pf-3", "COMPLETE"))
            .await;
        let retry = engine
            .handle_payment_notification(fx.notification("MKT-1003", "pf-3-retry", "COMPLETE"))
            .await;

        assert!(retry.success);
        assert_eq!(retry.state, SettlementState::AlreadySettled);
        assert_eq!(fx.db.order_count(), 1);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 8);
    }

    /// Concurrent deliveries of one payment settle exactly once
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deliveries_create_one_order() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Colombia Huila", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 2)], "50.00");
        fx.put_context("MKT-1004", user_id).await;

        let engine = fx.engine();
        let notification = fx.notification("MKT-1004", "pf-4", "COMPLETE");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let notification = notification.clone();
                tokio::spawn(async move { engine.handle_payment_notification(notification).await })
            })
            .collect();

        let mut settled = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(outcome.success, "delivery failed: {}", outcome.message);
            if outcome.state == SettlementState::Settled {
                settled += 1;
            }
        }

        assert_eq!(settled, 1);
        assert_eq!(fx.db.order_count(), 1);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 8);
        assert_eq!(fx.db.movements_for(ProductRef::Variant(size_id)).len(), 1);
    }

    /// One exhausted deal constituent does not undo the order or the
    /// other lines' deductions
    #[tokio::test]
    async fn test_partial_stock_failure_keeps_order() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_a, size_a) = fx.sized_product("House Blend", 10);
        let (product_b, size_b) = fx.sized_product("Decaf", 0);
        let (product_c, size_c) = fx.sized_product("Espresso", 5);
        let deal = fx.deal(vec![
            entry(product_b, Some(size_b), 1),
            entry(product_c, Some(size_c), 1),
        ]);

        fx.cart(
            user_id,
            vec![
                product_line(product_a, Some(size_a), 2),
                LineItem::Deal {
                    deal_id: deal.id,
                    quantity: 1,
                },
            ],
            "30.00",
        );
        fx.put_context("MKT-1005", user_id).await;

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1005", "pf-5", "COMPLETE"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, SettlementState::Settled);
        assert_eq!(fx.db.order_count(), 1);
        assert_eq!(fx.available(ProductRef::Variant(size_a)), 8);
        assert_eq!(fx.available(ProductRef::Variant(size_b)), 0);
        assert_eq!(fx.available(ProductRef::Variant(size_c)), 4);
        assert!(fx.db.movements_for(ProductRef::Variant(size_b)).is_empty());
        assert!(!fx.is_offer_active(deal));
        assert!(fx.db.cart(user_id).unwrap().is_empty());
    }

    /// Order item persistence failing is logged; settlement carries on
    #[tokio::test]
    async fn test_side_effect_failures_do_not_block_settlement() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Sumatra", 10);
        let mut cart = fx.cart(user_id, vec![product_line(product_id, Some(size_id), 1)], "80.00");
        cart.coupon_id = Some(Uuid::new_v4());
        fx.db.set_cart(cart);
        fx.put_context("MKT-1006", user_id).await;

        fx.db.set_fail_order_items(true);
        fx.db.set_fail_coupons(true);
        fx.db.set_fail_movements(true);
        fx.db.set_fail_cart_clear(true);
        fx.loyalty.set_fail(true);

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1006", "pf-6", "COMPLETE"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, SettlementState::Settled);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 9);
        assert!(fx.loyalty.calls().is_empty());
        assert!(!fx.db.cart(user_id).unwrap().is_empty());
        assert!(fx.stores.contexts.get("MKT-1006").await.unwrap().is_none());
    }

    /// Selling the last unit switches off every offer containing it
    #[tokio::test]
    async fn test_last_unit_deactivates_offers() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Gesha", 2);
        let (other_product, other_size) = fx.sized_product("Filter Papers", 50);
        let deal = fx.deal(vec![
            entry(product_id, Some(size_id), 1),
            entry(other_product, Some(other_size), 1),
        ]);
        let promotion = fx.offer(shared::OfferKind::Promotion, vec![entry(product_id, Some(size_id), 1)]);

        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 2)], "120.00");
        fx.put_context("MKT-1007", user_id).await;

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1007", "pf-7", "COMPLETE"))
            .await;

        assert_eq!(outcome.state, SettlementState::Settled);
        assert_eq!(fx.sellable(ProductRef::Variant(size_id)), 0);
        assert!(!fx.db.product(product_id).unwrap().in_stock);
        assert!(!fx.is_offer_active(deal));
        assert!(!fx.is_offer_active(promotion));
    }

    /// Restocking does not switch an offer back on; reactivation is explicit
    #[tokio::test]
    async fn test_restock_does_not_reactivate_offer() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Gesha", 2);
        let owner = ProductRef::Variant(size_id);
        let deal = fx.deal(vec![entry(product_id, Some(size_id), 2)]);

        fx.cart(
            user_id,
            vec![LineItem::Deal {
                deal_id: deal.id,
                quantity: 1,
            }],
            "200.00",
        );
        fx.put_context("MKT-1008", user_id).await;
        fx.engine()
            .handle_payment_notification(fx.notification("MKT-1008", "pf-8", "COMPLETE"))
            .await;
        assert!(!fx.is_offer_active(deal));

        let resolver = OfferResolver::new(&fx.stores);
        let err = resolver.reactivate(deal).await.unwrap_err();
        assert_eq!(err.status_and_code().1, "CONFLICT");

        StockService::new(&fx.stores)
            .restock(
                owner,
                RestockInput {
                    quantity: 5,
                    cost_per_unit: common::dec("12.50"),
                    supplier_name: "Highland Importers".to_string(),
                    restock_date: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(fx.available(owner), 5);
        assert!(!fx.is_offer_active(deal));

        let reactivated = resolver.reactivate(deal).await.unwrap();
        assert!(reactivated.is_active);
        assert!(fx.is_offer_active(deal));
    }

    /// PAID with no stored checkout details is acknowledged but creates nothing
    #[tokio::test]
    async fn test_missing_context_acknowledged_without_order() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Brazil Santos", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 1)], "45.00");

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1009", "pf-9", "COMPLETE"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, SettlementState::ContextMissing);
        assert!(outcome.message.contains("manual verification"));
        assert_eq!(fx.db.order_count(), 0);
        assert_eq!(fx.db.notification_count(), 1);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 10);
    }

    /// A context older than its lifetime is treated as missing
    #[tokio::test]
    async fn test_expired_context_treated_as_missing() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Brazil Santos", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 1)], "45.00");
        fx.put_context("MKT-1010", user_id).await;

        fx.clock.advance(Duration::hours(24) + Duration::minutes(1));

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1010", "pf-10", "COMPLETE"))
            .await;

        assert_eq!(outcome.state, SettlementState::ContextMissing);
        assert_eq!(fx.db.order_count(), 0);
    }

    /// Non-paid outcomes are recorded and acknowledged, context kept
    #[tokio::test]
    async fn test_unpaid_status_creates_no_order() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Guatemala", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 1)], "45.00");
        fx.put_context("MKT-1011", user_id).await;

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1011", "pf-11", "CANCELLED"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, SettlementState::NotPaid);
        assert_eq!(fx.db.order_count(), 0);
        assert_eq!(fx.db.notification_count(), 1);
        assert!(fx.stores.contexts.get("MKT-1011").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_cart_creates_no_order() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        fx.put_context("MKT-1012", user_id).await;

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1012", "pf-12", "COMPLETE"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, SettlementState::EmptyCart);
        assert_eq!(fx.db.order_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let fx = Fixture::new();
        let mut notification = fx.notification("MKT-1013", "pf-13", "COMPLETE");
        notification.pf_payment_id = None;
        notification.payment_status = Some("   ".to_string());

        let outcome = fx.engine().handle_payment_notification(notification).await;

        assert!(!outcome.success);
        assert_eq!(outcome.state, SettlementState::Rejected);
        assert!(outcome.message.contains("pf_payment_id"));
        assert!(outcome.message.contains("payment_status"));
        assert_eq!(fx.db.notification_count(), 0);
    }

    #[tokio::test]
    async fn test_tampered_notification_rejected() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        fx.put_context("MKT-1014", user_id).await;

        let mut notification = fx.notification("MKT-1014", "pf-14", "COMPLETE");
        notification.amount_gross = Some("1.00".to_string());

        let outcome = fx.engine().handle_payment_notification(notification).await;

        assert!(!outcome.success);
        assert_eq!(outcome.state, SettlementState::Rejected);
        assert_eq!(fx.db.notification_count(), 0);
        assert_eq!(fx.db.order_count(), 0);
    }

    #[tokio::test]
    async fn test_unsigned_notification_rejected() {
        let fx = Fixture::new();
        let mut notification = fx.notification("MKT-1015", "pf-15", "COMPLETE");
        notification.signature = None;

        let outcome = fx.engine().handle_payment_notification(notification).await;
        assert_eq!(outcome.state, SettlementState::Rejected);
    }

    #[tokio::test]
    async fn test_other_merchant_rejected() {
        let fx = Fixture::new();
        let mut notification = fx.notification("MKT-1016", "pf-16", "COMPLETE");
        notification.merchant_id = Some(format!("{}9", MERCHANT_ID));

        let outcome = fx.engine().handle_payment_notification(notification).await;

        assert!(!outcome.success);
        assert_eq!(outcome.state, SettlementState::Rejected);
        assert_eq!(outcome.message, "Merchant id mismatch");
    }

    /// Without a durable record there is no way to detect a redelivery
    #[tokio::test]
    async fn test_unrecorded_notification_creates_no_order() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Rwanda", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 1)], "45.00");
        fx.put_context("MKT-1017", user_id).await;
        fx.db.set_fail_notifications(true);

        let outcome = fx
            .engine()
            .handle_payment_notification(fx.notification("MKT-1017", "pf-17", "COMPLETE"))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, SettlementState::NotRecorded);
        assert_eq!(fx.db.order_count(), 0);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 10);
    }

    /// Cancelling returns stock; offers switched off stay off
    #[tokio::test]
    async fn test_cancel_order_returns_stock() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Gesha", 3);
        let (deal_product, deal_size) = fx.sized_product("Mug", 1);
        let owner = ProductRef::Variant(size_id);
        let deal = fx.deal(vec![entry(deal_product, Some(deal_size), 1)]);

        fx.cart(
            user_id,
            vec![
                product_line(product_id, Some(size_id), 3),
                LineItem::Deal {
                    deal_id: deal.id,
                    quantity: 1,
                },
            ],
            "60.00",
        );
        fx.put_context("MKT-1018", user_id).await;
        fx.engine()
            .handle_payment_notification(fx.notification("MKT-1018", "pf-18", "COMPLETE"))
            .await;
        assert_eq!(fx.available(owner), 0);
        assert!(!fx.is_offer_active(deal));

        let orders = OrderService::new(&fx.stores);
        let cancelled = orders.cancel_order("MKT-1018", "customer request").await.unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(fx.available(owner), 3);
        assert_eq!(fx.available(ProductRef::Variant(deal_size)), 1);
        assert!(!fx.is_offer_active(deal));

        let returns: Vec<_> = fx
            .db
            .movements_for(owner)
            .into_iter()
            .filter(|m| m.movement_type == MovementType::Return)
            .collect();
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].quantity, 3);
        assert!(returns[0].reason.contains("customer request"));

        let err = orders.cancel_order("MKT-1018", "").await.unwrap_err();
        assert_eq!(err.status_and_code().1, "INVALID_STATE_TRANSITION");
        assert_eq!(fx.available(owner), 3);
    }

    /// Only what settlement actually took off the shelf comes back
    #[tokio::test]
    async fn test_cancel_after_partial_failure_returns_only_deducted() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (product_a, size_a) = fx.sized_product("House Blend", 10);
        let (product_b, size_b) = fx.sized_product("Decaf", 0);
        let (product_c, size_c) = fx.sized_product("Espresso", 5);
        let deal = fx.deal(vec![
            entry(product_b, Some(size_b), 1),
            entry(product_c, Some(size_c), 1),
        ]);

        fx.cart(
            user_id,
            vec![
                product_line(product_a, Some(size_a), 2),
                LineItem::Deal {
                    deal_id: deal.id,
                    quantity: 1,
                },
            ],
            "30.00",
        );
        fx.put_context("MKT-1019", user_id).await;
        fx.engine()
            .handle_payment_notification(fx.notification("MKT-1019", "pf-19", "COMPLETE"))
            .await;
        assert_eq!(fx.available(ProductRef::Variant(size_b)), 0);

        OrderService::new(&fx.stores)
            .cancel_order("MKT-1019", "out of decaf")
            .await
            .unwrap();

        assert_eq!(fx.available(ProductRef::Variant(size_a)), 10);
        assert_eq!(fx.available(ProductRef::Variant(size_b)), 0);
        assert_eq!(fx.available(ProductRef::Variant(size_c)), 5);
        assert!(fx.db.movements_for(ProductRef::Variant(size_b)).is_empty());
    }

    /// Editing an offer after the sale does not change what a cancel returns
    #[tokio::test]
    async fn test_cancel_after_offer_edit_returns_original_constituents() {
        let fx = Fixture::new();
        let user_id = Uuid::new_v4();
        let (mug, mug_size) = fx.sized_product("Mug", 4);
        let (filter, filter_size) = fx.sized_product("Filter Papers", 6);
        let deal = fx.deal(vec![entry(mug, Some(mug_size), 1)]);

        fx.cart(
            user_id,
            vec![LineItem::Deal {
                deal_id: deal.id,
                quantity: 2,
            }],
            "45.00",
        );
        fx.put_context("MKT-1020", user_id).await;
        fx.engine()
            .handle_payment_notification(fx.notification("MKT-1020", "pf-20", "COMPLETE"))
            .await;
        assert_eq!(fx.available(ProductRef::Variant(mug_size)), 2);

        let mut edited = fx.db.offer(deal).unwrap();
        edited.entries = vec![entry(filter, Some(filter_size), 3)];
        fx.db.insert_offer(edited);

        OrderService::new(&fx.stores)
            .cancel_order("MKT-1020", "")
            .await
            .unwrap();

        assert_eq!(fx.available(ProductRef::Variant(mug_size)), 4);
        assert_eq!(fx.available(ProductRef::Variant(filter_size)), 6);
        assert!(fx.db.movements_for(ProductRef::Variant(filter_size)).is_empty());
    }

    /// With signature checks off, PENDING and COMPLETE for one payment are
    /// distinct notifications; only a repeat of the same one is a replay
    #[tokio::test]
    async fn test_unsigned_pending_then_complete_settles() {
        let mut fx = Fixture::new();
        fx.config.payment.verify_signatures = false;
        let user_id = Uuid::new_v4();
        let (product_id, size_id) = fx.sized_product("Kenya AA", 10);
        fx.cart(user_id, vec![product_line(product_id, Some(size_id), 2)], "50.00");
        fx.put_context("MKT-1021", user_id).await;

        let unsigned = |status: &str| {
            let mut n = fx.notification("MKT-1021", "pf-21", status);
            n.signature = None;
            n
        };
        let engine = fx.engine();

        let pending = engine.handle_payment_notification(unsigned("PENDING")).await;
        assert_eq!(pending.state, SettlementState::NotPaid);
        assert_eq!(fx.db.order_count(), 0);

        let complete = engine.handle_payment_notification(unsigned("COMPLETE")).await;
        assert_eq!(complete.state, SettlementState::Settled);
        assert_eq!(fx.db.order_count(), 1);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 8);

        let replay = engine.handle_payment_notification(unsigned("COMPLETE")).await;
        assert_eq!(replay.state, SettlementState::Duplicate);
        assert_eq!(fx.available(ProductRef::Variant(size_id)), 8);
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let fx = Fixture::new();
        let err = OrderService::new(&fx.stores)
            .cancel_order("MKT-missing", "")
            .await
            .unwrap_err();
        assert_eq!(err.status_and_code().1, "NOT_FOUND");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        /// However often a notification is redelivered, stock moves once
        #[test]
        fn prop_redelivery_deducts_once(
            initial in 1i32..50,
            quantity in 1i32..10,
            deliveries in 1usize..6,
        ) {
            prop_assume!(quantity <= initial);
            tokio_test::block_on(async {
                let fx = Fixture::new();
                let user_id = Uuid::new_v4();
                let (product_id, size_id) = fx.sized_product("Blend", initial);
                fx.cart(user_id, vec![product_line(product_id, Some(size_id), quantity)], "10.00");
                fx.put_context("MKT-PROP", user_id).await;

                let engine = fx.engine();
                let notification = fx.notification("MKT-PROP", "pf-prop", "COMPLETE");
                for _ in 0..deliveries {
                    let outcome = engine.handle_payment_notification(notification.clone()).await;
                    prop_assert!(outcome.success);
                }

                prop_assert_eq!(fx.db.order_count(), 1);
                prop_assert_eq!(fx.available(ProductRef::Variant(size_id)), initial - quantity);
                Ok(())
            })?;
        }
    }
}
