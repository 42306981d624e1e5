//! Deposit intents: the outbound half of a deposit.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    config::PaymentConfig,
    errors::{PaymentError, PaymentResult},
    models::{DepositIntent, DepositReceipt, IntentStatus, PaymentReference},
    provider::{CheckoutRequest, PaymentProvider},
};
use crate::{
    db::{PaymentStore, StoreError, retry::retry},
    wallet::{Amount, UserId, WalletManager},
};

/// Opens provider checkouts and records what each one is expected to pay.
pub struct DepositService {
    wallet: WalletManager,
    store: Arc<dyn PaymentStore>,
    provider: Arc<dyn PaymentProvider>,
    config: PaymentConfig,
}

impl DepositService {
    pub fn new(
        wallet: WalletManager,
        store: Arc<dyn PaymentStore>,
        provider: Arc<dyn PaymentProvider>,
        config: PaymentConfig,
    ) -> PaymentResult<Self> {
        config.validate().map_err(PaymentError::InvalidConfig)?;
        Ok(Self {
            wallet,
            store,
            provider,
            config,
        })
    }

    /// Create a deposit intent
    ///
    /// The provider call holds no lock. The intent is recorded only once
    /// the provider has accepted the checkout.
    ///
    /// # Arguments
    ///
    /// * `user_id` - User to credit once the payment is approved
    /// * `amount` - Deposit in minor units
    ///
    /// # Returns
    ///
    /// * `PaymentResult<DepositReceipt>` - Reference and checkout URL
    pub async fn create_intent(
        &self,
        user_id: UserId,
        amount: Amount,
    ) -> PaymentResult<DepositReceipt> {
        if amount <= 0 {
            return Err(PaymentError::InvalidAmount(amount));
        }
        if amount > self.config.max_deposit_amount {
            return Err(PaymentError::AmountTooLarge {
                amount,
                max: self.config.max_deposit_amount,
            });
        }
        self.wallet.get_user(user_id).await?;

        let reference = PaymentReference::new(user_id, Uuid::new_v4().simple().to_string());
        let request = CheckoutRequest {
            reference: reference.to_string(),
            amount,
            description: "Balance deposit".to_string(),
        };
        let checkout = retry(&self.config.retry, "create checkout", || {
            self.provider.create_checkout(&request)
        })
        .await?;

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.intent_ttl)
            .map_err(|e| PaymentError::InvalidConfig(format!("intent ttl: {e}")))?;
        let intent = DepositIntent {
            reference: request.reference.clone(),
            user_id,
            amount,
            provider_id: checkout.provider_id,
            redirect_target: checkout.redirect_target.clone(),
            status: IntentStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
        };
        let saved = retry(&self.config.retry, "save intent", || {
            self.store.save_intent(&intent)
        })
        .await;
        match saved {
            // An earlier attempt landed before timing out.
            Ok(()) | Err(StoreError::DuplicateReference(_)) => {}
            Err(e) => return Err(e.into()),
        }

        log::info!(
            "Deposit intent {} for user {}: {}",
            intent.reference,
            user_id,
            amount
        );
        Ok(DepositReceipt {
            payment_reference_id: intent.reference,
            redirect_target: checkout.redirect_target,
        })
    }

    /// Look up an intent by its reference
    pub async fn intent(&self, reference: &str) -> PaymentResult<Option<DepositIntent>> {
        Ok(self.store.get_intent(reference).await?)
    }

    /// Expire pending intents past their deadline
    pub async fn expire_stale(&self) -> PaymentResult<u64> {
        let expired = self.store.expire_intents(Utc::now()).await?;
        if expired > 0 {
            log::info!("Expired {} deposit intents", expired);
        }
        Ok(expired)
    }
}
