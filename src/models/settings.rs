use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with rows that carry no position id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionIdPolicy {
    /// Generate a time+random id. Re-importing such a file creates new trades.
    #[default]
    Synthesize,
    /// Fail the file when any row lacks an id.
    Require,
}

impl PositionIdPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionIdPolicy::Synthesize => "synthesize",
            PositionIdPolicy::Require => "require",
        }
    }
}

impl fmt::Display for PositionIdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionIdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "synthesize" => Ok(PositionIdPolicy::Synthesize),
            "require" => Ok(PositionIdPolicy::Require),
            other => Err(format!("Unknown position id policy: {}", other)),
        }
    }
}

pub const DEFAULT_ACCOUNT_NUMBER: &str = "default";
pub const DEFAULT_ASSET_TYPE: &str = "FX";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub id: i32,
    pub position_id_policy: PositionIdPolicy,
    pub default_account_number: String,
    pub asset_type: String, // applied to every imported trade, not inferred from the symbol
    pub created_at: i64,
    pub updated_at: i64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            id: 1,
            position_id_policy: PositionIdPolicy::default(),
            default_account_number: DEFAULT_ACCOUNT_NUMBER.to_string(),
            asset_type: DEFAULT_ASSET_TYPE.to_string(),
            created_at: 0,
            updated_at: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsInput {
    pub position_id_policy: Option<PositionIdPolicy>,
    pub default_account_number: Option<String>,
    pub asset_type: Option<String>,
}
