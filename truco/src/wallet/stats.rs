//! Per-player betting statistics derived from the ledger.

use serde::{Deserialize, Serialize};

use super::{
    config::BPS_SCALE,
    models::{Amount, Transaction, TransactionKind, TransactionStatus},
};

/// Aggregated bet results for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub total_games: u64,
    pub wins: u64,
    pub losses: u64,
    /// Wins over total games, in percent
    pub win_rate: f64,
    pub total_wagered: Amount,
    pub total_winnings: Amount,
    pub total_losses: Amount,
    pub net_profit: Amount,
}

impl PlayerStats {
    /// Summarize completed `bet_win` and `bet_loss` rows. Other kinds are ignored.
    ///
    /// Win rows only record the payout, so their wager is recovered from
    /// `payout_multiplier_bps`.
    pub fn from_transactions<'a>(
        transactions: impl IntoIterator<Item = &'a Transaction>,
        payout_multiplier_bps: i64,
    ) -> Self {
        let mut stats = Self::default();
        for tx in transactions {
            if tx.status != TransactionStatus::Completed {
                continue;
            }
            match tx.kind {
                TransactionKind::BetWin => {
                    stats.wins += 1;
                    stats.total_winnings += tx.amount;
                    stats.total_wagered += wager_from_payout(tx.amount, payout_multiplier_bps);
                }
                TransactionKind::BetLoss => {
                    stats.losses += 1;
                    stats.total_losses += tx.amount.abs();
                    stats.total_wagered += tx.amount.abs();
                }
                TransactionKind::Deposit
                | TransactionKind::Withdrawal
                | TransactionKind::BetHold
                | TransactionKind::BetRelease => {}
            }
        }
        stats.total_games = stats.wins + stats.losses;
        if stats.total_games > 0 {
            stats.win_rate = stats.wins as f64 * 100.0 / stats.total_games as f64;
        }
        stats.net_profit = stats.total_winnings - stats.total_losses;
        stats
    }
}

/// Smallest wager whose rounded-down payout equals `payout`.
fn wager_from_payout(payout: Amount, payout_multiplier_bps: i64) -> Amount {
    if payout_multiplier_bps <= 0 {
        return 0;
    }
    let scaled = i128::from(payout) * i128::from(BPS_SCALE);
    let bps = i128::from(payout_multiplier_bps);
    Amount::try_from((scaled + bps - 1) / bps).unwrap_or(Amount::MAX)
}
