//! Outbound payment provider client.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    config::PaymentConfig,
    errors::{PaymentError, PaymentResult},
};
use crate::wallet::Amount;

/// Checkout to open for one deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// External reference echoed back in the payment notification
    pub reference: String,
    /// Minor units
    pub amount: Amount,
    pub description: String,
}

/// Provider-side checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub provider_id: String,
    /// URL the payer is sent to
    pub redirect_target: String,
}

/// Creates checkouts with the payment provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout(&self, request: &CheckoutRequest) -> PaymentResult<Checkout>;
}

#[derive(Debug, Serialize)]
struct PreferenceItem<'a> {
    id: &'a str,
    title: &'a str,
    quantity: u32,
    unit_price: f64,
    currency_id: &'a str,
}

#[derive(Debug, Serialize)]
struct BackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct PreferenceRequest<'a> {
    items: Vec<PreferenceItem<'a>>,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    back_urls: Option<BackUrls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_return: Option<&'static str>,
    expires: bool,
    expiration_date_from: String,
    expiration_date_to: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
}

/// Checkout-preference client over HTTPS
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    config: PaymentConfig,
    access_token: String,
}

impl HttpPaymentProvider {
    /// Create a new provider client
    ///
    /// # Errors
    ///
    /// * `PaymentError::InvalidConfig` - No access token, or the HTTP client
    ///   could not be built
    pub fn new(config: PaymentConfig) -> PaymentResult<Self> {
        let access_token = config
            .access_token
            .clone()
            .ok_or_else(|| PaymentError::InvalidConfig("missing access token".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            config,
            access_token,
        })
    }

    fn preference<'a>(&'a self, request: &'a CheckoutRequest) -> PreferenceRequest<'a> {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(self.config.intent_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now);
        PreferenceRequest {
            items: vec![PreferenceItem {
                id: &request.reference,
                title: &request.description,
                quantity: 1,
                unit_price: request.amount as f64 / 100.0,
                currency_id: &self.config.currency,
            }],
            external_reference: &request.reference,
            notification_url: self.config.notification_url.as_deref(),
            back_urls: self.config.return_url.as_ref().map(|base| BackUrls {
                success: format!("{base}/success"),
                failure: format!("{base}/failure"),
                pending: format!("{base}/pending"),
            }),
            auto_return: self.config.return_url.as_ref().map(|_| "approved"),
            expires: true,
            expiration_date_from: now.to_rfc3339(),
            expiration_date_to: expires_at.to_rfc3339(),
        }
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_checkout(&self, request: &CheckoutRequest) -> PaymentResult<Checkout> {
        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.config.api_base))
            .bearer_auth(&self.access_token)
            // Same reference on retry, so the provider creates one preference.
            .header("X-Idempotency-Key", &request.reference)
            .json(&self.preference(request))
            .send()
            .await
            .map_err(|e| PaymentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PaymentError::ProviderUnavailable(format!("status {status}")));
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let preference: PreferenceResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
        Ok(Checkout {
            provider_id: preference.id,
            redirect_target: preference.init_point,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> PaymentConfig {
        PaymentConfig {
            access_token: Some("TEST-token".to_string()),
            notification_url: Some("https://truco.example/webhooks/payment".to_string()),
            return_url: Some("https://truco.example/payment".to_string()),
            ..PaymentConfig::default()
        }
    }

    #[test]
    fn test_requires_access_token() {
        assert!(matches!(
            HttpPaymentProvider::new(PaymentConfig::default()),
            Err(PaymentError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_preference_body() {
        let provider = HttpPaymentProvider::new(configured()).unwrap();
        let request = CheckoutRequest {
            reference: "user_7_deposit_abc".to_string(),
            amount: 2_550,
            description: "Deposit".to_string(),
        };
        let body = serde_json::to_value(provider.preference(&request)).unwrap();

        assert_eq!(body["external_reference"], "user_7_deposit_abc");
        assert_eq!(body["items"][0]["unit_price"], 25.5);
        assert_eq!(body["items"][0]["currency_id"], "BRL");
        assert_eq!(
            body["back_urls"]["success"],
            "https://truco.example/payment/success"
        );
        assert_eq!(body["auto_return"], "approved");
    }

    #[test]
    fn test_preference_without_return_url() {
        let provider = HttpPaymentProvider::new(PaymentConfig {
            return_url: None,
            ..configured()
        })
        .unwrap();
        let request = CheckoutRequest {
            reference: "user_7_deposit_abc".to_string(),
            amount: 100,
            description: "Deposit".to_string(),
        };
        let body = serde_json::to_value(provider.preference(&request)).unwrap();
        assert!(body.get("back_urls").is_none());
        assert!(body.get("auto_return").is_none());
    }
}
