//! Webhook reconciler: payment notifications into idempotent ledger credits.

use std::sync::Arc;

use super::models::{IntentStatus, PaymentEvent, PaymentReference, PaymentStatus, WebhookOutcome};
use crate::{
    db::{PaymentStore, RetryPolicy, retry::retry},
    errors::ErrorKind,
    locks::KeyedLocks,
    wallet::WalletManager,
};

/// Notification topic that carries payments
pub const PAYMENT_EVENT_TYPE: &str = "payment";

/// Webhook reconciler
///
/// Every delivery ends in a [`WebhookOutcome`]. Each event id is handled once;
/// a credit is additionally keyed by the external reference, so two
/// different event ids for the same payment still credit once.
pub struct WebhookReconciler {
    wallet: WalletManager,
    store: Arc<dyn PaymentStore>,
    locks: KeyedLocks<String>,
    retry: RetryPolicy,
}

impl WebhookReconciler {
    pub fn new(wallet: WalletManager, store: Arc<dyn PaymentStore>, retry: RetryPolicy) -> Self {
        Self {
            wallet,
            store,
            locks: KeyedLocks::new(),
            retry,
        }
    }

    /// Handle one webhook delivery
    ///
    /// # Returns
    ///
    /// * `WebhookOutcome` - `Failed` only when the ledger or store stayed
    ///   unavailable; the event is left unmarked so a redelivery retries it
    pub async fn handle(&self, event: &PaymentEvent) -> WebhookOutcome {
        let _guard = self.locks.lock(&event.id).await;
        let store = self.store.as_ref();

        match retry(&self.retry, "check webhook event", || {
            store.is_event_processed(&event.id)
        })
        .await
        {
            Ok(true) => {
                log::info!("Webhook event {} already processed", event.id);
                return WebhookOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("Webhook event {}: store unavailable: {}", event.id, e);
                return WebhookOutcome::Failed {
                    reason: "store unavailable".to_string(),
                };
            }
        }

        let outcome = self.reconcile(event).await;
        if matches!(outcome, WebhookOutcome::Failed { .. }) {
            return outcome;
        }

        // The credit is keyed by reference, so an unmarked event that is
        // redelivered cannot credit twice.
        if let Err(e) = retry(&self.retry, "mark webhook event", || {
            store.mark_event_processed(&event.id, outcome.as_str())
        })
        .await
        {
            log::warn!("Webhook event {}: failed to mark processed: {}", event.id, e);
        }
        outcome
    }

    async fn reconcile(&self, event: &PaymentEvent) -> WebhookOutcome {
        if event.event_type != PAYMENT_EVENT_TYPE {
            log::info!(
                "Webhook event {}: ignoring topic {:?}",
                event.id,
                event.event_type
            );
            return WebhookOutcome::Ignored {
                reason: format!("topic {}", event.event_type),
            };
        }
        if event.status != PaymentStatus::Approved {
            log::info!(
                "Webhook event {}: payment {:?} is {:?}, not crediting",
                event.id,
                event.external_reference,
                event.status
            );
            return WebhookOutcome::Ignored {
                reason: "payment not approved".to_string(),
            };
        }

        let reference = match event.external_reference.parse::<PaymentReference>() {
            Ok(reference) => reference,
            Err(e) => {
                log::warn!("Webhook event {}: discarded, {}", event.id, e);
                return WebhookOutcome::Discarded { reason: e };
            }
        };
        if event.amount <= 0 {
            log::warn!(
                "Webhook event {}: discarded, non-positive amount {}",
                event.id,
                event.amount
            );
            return WebhookOutcome::Discarded {
                reason: format!("invalid amount {}", event.amount),
            };
        }

        let store = self.store.as_ref();
        let intent = match retry(&self.retry, "load deposit intent", || {
            store.get_intent(&event.external_reference)
        })
        .await
        {
            Ok(intent) => intent,
            Err(e) => {
                log::error!("Webhook event {}: store unavailable: {}", event.id, e);
                return WebhookOutcome::Failed {
                    reason: "store unavailable".to_string(),
                };
            }
        };
        if let Some(intent) = &intent
            && (intent.user_id != reference.user_id || intent.amount != event.amount)
        {
            log::error!(
                "Webhook event {}: reference {} expects user {} amount {}, got user {} amount {}",
                event.id,
                event.external_reference,
                intent.user_id,
                intent.amount,
                reference.user_id,
                event.amount
            );
            return WebhookOutcome::Discarded {
                reason: "payment does not match its deposit intent".to_string(),
            };
        }

        let credited = self
            .wallet
            .credit(
                reference.user_id,
                event.amount,
                "deposit",
                Some(&event.external_reference),
            )
            .await;
        let tx = match credited {
            Ok(tx) => tx,
            Err(e) if e.kind() == ErrorKind::Transient => {
                log::error!("Webhook event {}: ledger unavailable: {}", event.id, e);
                return WebhookOutcome::Failed {
                    reason: e.client_message(),
                };
            }
            Err(e) => {
                log::warn!("Webhook event {}: discarded, {}", event.id, e);
                return WebhookOutcome::Discarded {
                    reason: e.client_message(),
                };
            }
        };

        if intent.is_some()
            && let Err(e) = store
                .set_intent_status(&event.external_reference, IntentStatus::Completed)
                .await
        {
            log::warn!(
                "Webhook event {}: failed to complete intent {}: {}",
                event.id,
                event.external_reference,
                e
            );
        }

        log::info!(
            "Webhook event {}: credited {} to user {} (tx {})",
            event.id,
            event.amount,
            reference.user_id,
            tx.id
        );
        WebhookOutcome::Credited {
            user_id: reference.user_id,
            transaction_id: tx.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::MemoryStore, payment::DepositIntent, wallet::WalletConfig};
    use chrono::Utc;

    async fn setup() -> (WebhookReconciler, Arc<MemoryStore>, WalletManager, i64) {
        let store = Arc::new(MemoryStore::new());
        let wallet = WalletManager::new(store.clone(), WalletConfig::default()).unwrap();
        let user = wallet.open_account("ana", 0).await.unwrap();
        let reconciler = WebhookReconciler::new(wallet.clone(), store.clone(), RetryPolicy::none());
        (reconciler, store, wallet, user.id)
    }

    #[tokio::test]
    async fn test_approved_payment_credits_once() {
        let (reconciler, _, wallet, user_id) = setup().await;
        let reference = format!("user_{user_id}_deposit_1");
        let event = PaymentEvent::approved_payment("evt_1", &reference, 50);

        let outcome = reconciler.handle(&event).await;
        assert!(matches!(outcome, WebhookOutcome::Credited { user_id: u, .. } if u == user_id));
        assert_eq!(reconciler.handle(&event).await, WebhookOutcome::Duplicate);
        assert_eq!(wallet.get_balance(user_id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_second_event_for_same_reference_does_not_credit_again() {
        let (reconciler, _, wallet, user_id) = setup().await;
        let reference = format!("user_{user_id}_deposit_1");
        reconciler
            .handle(&PaymentEvent::approved_payment("evt_1", &reference, 50))
            .await;
        let outcome = reconciler
            .handle(&PaymentEvent::approved_payment("evt_2", &reference, 50))
            .await;
        assert!(matches!(outcome, WebhookOutcome::Credited { .. }));
        assert_eq!(wallet.get_balance(user_id).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_pending_payment_is_ignored() {
        let (reconciler, store, wallet, user_id) = setup().await;
        let event = PaymentEvent {
            status: PaymentStatus::Pending,
            ..PaymentEvent::approved_payment("evt_1", &format!("user_{user_id}_deposit_1"), 50)
        };
        assert!(matches!(
            reconciler.handle(&event).await,
            WebhookOutcome::Ignored { .. }
        ));
        assert!(store.is_event_processed("evt_1").await.unwrap());
        assert_eq!(wallet.get_balance(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_reference_is_discarded() {
        let (reconciler, store, _, _) = setup().await;
        let cases = [
            ("a", "deposit_42"),
            ("b", "user_x_deposit_1"),
            ("c", "user_1_deposit_"),
        ];
        for (id, reference) in cases {
            let outcome = reconciler
                .handle(&PaymentEvent::approved_payment(id, reference, 50))
                .await;
            assert!(matches!(outcome, WebhookOutcome::Discarded { .. }), "{reference}");
            assert!(store.is_event_processed(id).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_unknown_user_is_discarded() {
        let (reconciler, _, _, _) = setup().await;
        let outcome = reconciler
            .handle(&PaymentEvent::approved_payment("evt_1", "user_999_deposit_1", 50))
            .await;
        assert!(matches!(outcome, WebhookOutcome::Discarded { .. }));
    }

    #[tokio::test]
    async fn test_intent_mismatch_is_discarded() {
        let (reconciler, store, wallet, user_id) = setup().await;
        let reference = format!("user_{user_id}_deposit_abc");
        store
            .save_intent(&DepositIntent {
                reference: reference.clone(),
                user_id,
                amount: 100,
                provider_id: "pref-1".to_string(),
                redirect_target: "https://pay.example".to_string(),
                status: IntentStatus::Pending,
                created_at: Utc::now(),
                expires_at: Utc::now(),
            })
            .await
            .unwrap();

        let outcome = reconciler
            .handle(&PaymentEvent::approved_payment("evt_1", &reference, 50))
            .await;
        assert!(matches!(outcome, WebhookOutcome::Discarded { .. }));
        assert_eq!(wallet.get_balance(user_id).await.unwrap(), 0);

        let outcome = reconciler
            .handle(&PaymentEvent::approved_payment("evt_2", &reference, 100))
            .await;
        assert!(matches!(outcome, WebhookOutcome::Credited { .. }));
        let intent = store.get_intent(&reference).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Completed);
    }

    #[tokio::test]
    async fn test_store_outage_leaves_event_unmarked() {
        let (reconciler, store, wallet, user_id) = setup().await;
        let event = PaymentEvent::approved_payment("evt_1", &format!("user_{user_id}_deposit_1"), 50);

        store.fail_next(1);
        assert!(matches!(
            reconciler.handle(&event).await,
            WebhookOutcome::Failed { .. }
        ));
        assert!(!store.is_event_processed("evt_1").await.unwrap());

        assert!(matches!(
            reconciler.handle(&event).await,
            WebhookOutcome::Credited { .. }
        ));
        assert_eq!(wallet.get_balance(user_id).await.unwrap(), 50);
    }
}
