//! Ledger configuration.

use crate::{db::retry::RetryPolicy, env::env_or};

use super::models::Amount;

/// Basis points in 1.0
pub const BPS_SCALE: i64 = 10_000;

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    /// Winner payout as a multiple of the wager, in basis points (18000 = 1.8x)
    pub payout_multiplier_bps: i64,

    /// Retry policy for transient store failures
    pub retry: RetryPolicy,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            payout_multiplier_bps: 18_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl WalletConfig {
    /// Create configuration from environment variables
    ///
    /// - `PAYOUT_MULTIPLIER_BPS`: payout multiplier in basis points (default: 18000)
    /// - `LEDGER_MAX_ATTEMPTS`: attempts per ledger write (default: 4)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            payout_multiplier_bps: env_or("PAYOUT_MULTIPLIER_BPS", defaults.payout_multiplier_bps),
            retry: RetryPolicy {
                max_attempts: env_or("LEDGER_MAX_ATTEMPTS", defaults.retry.max_attempts),
                ..defaults.retry
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.payout_multiplier_bps <= BPS_SCALE {
            return Err("Payout multiplier must be greater than 1.0 (10000 bps)".to_string());
        }
        if self.payout_multiplier_bps > 100 * BPS_SCALE {
            return Err("Payout multiplier must be at most 100.0 (1000000 bps)".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("Ledger attempts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Amount credited to a winner for `wager`, rounded down.
    pub fn payout(&self, wager: Amount) -> Option<Amount> {
        wager
            .checked_mul(self.payout_multiplier_bps)
            .map(|scaled| scaled / BPS_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_payout_is_one_point_eight() {
        let config = WalletConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payout(10), Some(18));
        assert_eq!(config.payout(7), Some(12));
        assert_eq!(config.payout(i64::MAX), None);
    }

    #[test]
    fn test_multiplier_must_exceed_one() {
        let config = WalletConfig {
            payout_multiplier_bps: BPS_SCALE,
            ..WalletConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_multiplier() {
        // SAFETY: serialized with the other env tests
        unsafe { std::env::set_var("PAYOUT_MULTIPLIER_BPS", "20000") };
        let config = WalletConfig::from_env();
        unsafe { std::env::remove_var("PAYOUT_MULTIPLIER_BPS") };
        assert_eq!(config.payout_multiplier_bps, 20_000);
        assert_eq!(config.payout(10), Some(20));
    }
}
