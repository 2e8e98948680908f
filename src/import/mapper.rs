use super::timestamps::parse_timestamp;
use crate::models::{Outcome, ParsedTrade, PersistedTrade};

/// Map a deduplicated trade to the storage schema
pub fn to_persisted(trade: &ParsedTrade, user_id: &str, asset_type: &str) -> PersistedTrade {
    PersistedTrade {
        user_id: user_id.to_string(),
        position_id: trade.position_id.clone(),
        account_number: trade.account_number.clone(),
        asset: trade.symbol.clone(),
        asset_type: asset_type.to_string(),
        trade_type: trade.trade_type.clone(),
        size: trade.volume,
        entry_price: trade.entry_price,
        exit_price: trade.exit_price,
        stop_loss: trade.stop_loss,
        take_profit: trade.take_profit,
        costs: trade.costs,
        pnl: trade.pnl,
        time: trade.entry_time.clone(),
        duration: format_duration(&trade.entry_time, &trade.exit_time),
        outcome: Outcome::from_pnl(trade.pnl),
    }
}

/// Holding time as whole minutes below an hour, whole hours above.
/// Remainders are truncated. Unreadable or reversed timestamps give
/// `"0 minutes"`.
pub fn format_duration(entry_time: &str, exit_time: &str) -> String {
    let minutes = match (parse_timestamp(entry_time), parse_timestamp(exit_time)) {
        (Some(entry), Some(exit)) => (exit - entry).num_minutes().max(0),
        _ => 0,
    };

    if minutes < 60 {
        format!("{} minutes", minutes)
    } else {
        format!("{} hours", minutes / 60)
    }
}
