use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trade row normalized from an imported file.
///
/// Every field is always populated: columns missing from the source are
/// defaulted while parsing, so mapping to the storage schema cannot fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTrade {
    pub position_id: String,
    pub account_number: String,
    pub symbol: String,
    pub trade_type: String, // lower-cased, e.g. "buy" / "sell"

    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub costs: f64,
    pub pnl: f64,

    pub entry_time: String, // RFC 3339 when recognised, source text otherwise
    pub exit_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    /// Strictly positive P&L is a win; break-even counts as a loss.
    pub fn from_pnl(pnl: f64) -> Self {
        if pnl > 0.0 { Outcome::Win } else { Outcome::Loss }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" => Ok(Outcome::Win),
            "loss" => Ok(Outcome::Loss),
            other => Err(format!("Unknown outcome: {}", other)),
        }
    }
}

/// Storage-shaped trade submitted to the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTrade {
    pub user_id: String,
    pub position_id: String,
    pub account_number: String,
    pub asset: String,
    pub asset_type: String,
    pub trade_type: String,
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub costs: f64,
    pub pnl: f64,
    pub time: String,
    pub duration: String, // "45 minutes" / "3 hours"
    pub outcome: Outcome,
}

/// Trade as read back from the journal database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTrade {
    pub id: String,
    pub batch_id: Option<String>,
    #[serde(flatten)]
    pub trade: PersistedTrade,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeFilters {
    pub asset: Option<String>,
    pub outcome: Option<Outcome>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// One successful batch submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: String,
    pub user_id: String,
    pub submitted: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub created_at: i64,
}
