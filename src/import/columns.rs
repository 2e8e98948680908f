//! Row-to-trade mapping.
//!
//! Broker exports disagree on header spelling (`Position ID`, `position_id`,
//! `Position`), so every field has an ordered list of candidate headers.
//! Candidates are matched against a normalized header map (lower-case,
//! punctuation and whitespace collapsed to `_`) and the first non-empty cell
//! wins. Fields with no match get a typed default.

use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::error::ImportError;
use super::timestamps::normalize_timestamp;
use crate::models::{ImportSettings, ParsedTrade, PositionIdPolicy};

// Duplicate headers are suffixed `_1`, `_2` while reading, which is how the
// MT5 positions report's close-leg `Time` / `Price` columns become reachable.
const POSITION_ID: &[&str] = &["Position ID", "position_id", "Position", "Ticket"];
const ACCOUNT_NUMBER: &[&str] = &["Account Number", "account_number", "Account", "Login"];
const SYMBOL: &[&str] = &["Symbol", "symbol", "Asset", "Instrument"];
const TRADE_TYPE: &[&str] = &["Type", "type", "trade_type", "Side", "Direction"];
const VOLUME: &[&str] = &["Volume", "volume", "Size", "Lots", "Quantity"];
const ENTRY_PRICE: &[&str] = &["Entry Price", "entry_price", "Open Price", "Price"];
const EXIT_PRICE: &[&str] = &["Exit Price", "exit_price", "Close Price", "Price_1"];
const STOP_LOSS: &[&str] = &["Stop Loss", "stop_loss", "S / L", "SL"];
const TAKE_PROFIT: &[&str] = &["Take Profit", "take_profit", "T / P", "TP"];
const COSTS: &[&str] = &["Costs", "costs", "Commission", "Fees", "Fee"];
const PNL: &[&str] = &["Profit/Loss", "pnl", "Profit", "P&L", "PnL"];
const ENTRY_TIME: &[&str] = &["Entry Time", "entry_time", "Open Time", "Time"];
const EXIT_TIME: &[&str] = &["Exit Time", "exit_time", "Close Time", "Time_1"];

/// Row-independent inputs to the mapping
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub position_id_policy: PositionIdPolicy,
    pub default_account_number: String,
    /// Used for missing entry/exit times
    pub now: String,
}

impl ParseOptions {
    pub fn from_settings(settings: &ImportSettings, now: String) -> Self {
        Self {
            position_id_policy: settings.position_id_policy,
            default_account_number: settings.default_account_number.clone(),
            now,
        }
    }
}

pub fn normalize_header(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;

    for ch in name.trim_start_matches('\u{feff}').chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_separator = true;
        }
    }

    out
}

/// Repeated header names get `_1`, `_2`, ... in order of appearance.
pub fn dedupe_headers<I, S>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|h| {
            let h = h.as_ref().trim().trim_start_matches('\u{feff}').to_string();
            let count = seen.entry(h.clone()).or_insert(0);
            let name = if *count == 0 { h } else { format!("{}_{}", h, count) };
            *count += 1;
            name
        })
        .collect()
}

/// One input row keyed by normalized header. Empty cells are not stored, so
/// they fall through to the next candidate exactly like a missing column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowObject {
    cells: HashMap<String, String>,
}

impl RowObject {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cells = HashMap::new();
        for (key, value) in pairs {
            let key = normalize_header(key.as_ref());
            let value = value.as_ref().trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            // "Position ID" and "position_id" in one file: first column wins
            cells.entry(key).or_insert_with(|| value.to_string());
        }
        Self { cells }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells.get(&normalize_header(header)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn first(&self, candidates: &[&str]) -> Option<&str> {
        candidates.iter().find_map(|c| self.get(c))
    }

    fn text(&self, candidates: &[&str], default: &str) -> String {
        self.first(candidates).unwrap_or(default).to_string()
    }

    fn number(&self, candidates: &[&str]) -> f64 {
        self.first(candidates).and_then(parse_number).unwrap_or(0.0)
    }

    fn timestamp(&self, candidates: &[&str], now: &str) -> String {
        match self.first(candidates) {
            Some(value) => normalize_timestamp(value),
            None => now.to_string(),
        }
    }
}

fn numeric_prefix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?[\d.,]*\d").ok())
        .as_ref()
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `1,234,567` style grouping: a leading group of 1-3 digits without a
/// leading zero, then groups of exactly three.
fn is_grouped(integer: &str, separator: char) -> bool {
    let mut groups = integer.split(separator);
    let leading = groups
        .next()
        .is_some_and(|g| g.len() <= 3 && all_digits(g) && !g.starts_with('0'));
    leading && groups.all(|g| g.len() == 3 && all_digits(g))
}

/// Rewrites comma/dot separators into a plain `f64` literal. `None` when the
/// separators do not form an unambiguous number.
fn normalize_separators(number: &str) -> Option<String> {
    let digits = number.trim_start_matches(['+', '-']);
    let sign = &number[..number.len() - digits.len()];

    let last_comma = digits.rfind(',');
    let last_dot = digits.rfind('.');

    let (decimal, grouping) = match (last_comma, last_dot) {
        (None, _) => return Some(number.to_string()),
        (Some(c), Some(d)) if d > c => ('.', ','),
        (Some(_), Some(_)) => (',', '.'),
        (Some(c), None) => {
            let fraction = &digits[c + 1..];
            if digits.matches(',').count() == 1 && fraction.len() <= 2 && all_digits(fraction) {
                return Some(format!("{}{}.{}", sign, &digits[..c], fraction));
            }
            return is_grouped(digits, ',').then(|| format!("{}{}", sign, digits.replace(',', "")));
        }
    };

    let (integer, fraction) = digits.rsplit_once(decimal)?;
    if !all_digits(fraction) || !is_grouped(integer, grouping) {
        return None;
    }
    Some(format!("{}{}.{}", sign, integer.replace(grouping, ""), fraction))
}

/// Lenient numeric parse: `"1 234.50"`, `"1,234.50"`, `"1.234,50"`, `"0,5"`,
/// `"0.10 lots"`. A lone comma followed by one or two digits is a decimal
/// comma, otherwise commas must be thousands separators.
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();

    if !cleaned.contains(',') {
        if let Ok(parsed) = cleaned.parse::<f64>() {
            return parsed.is_finite().then_some(parsed);
        }
    }

    let prefix = numeric_prefix()?.find(&cleaned)?.as_str();
    let parsed = normalize_separators(prefix)?.parse::<f64>().ok()?;
    parsed.is_finite().then_some(parsed)
}

/// Synthetic position id for rows without one. Not stable across imports.
pub fn synthesize_position_id() -> String {
    let suffix = uuid::Uuid::new_v4().to_string();
    format!(
        "POS-{}-{}",
        Utc::now().timestamp_millis(),
        suffix.split('-').next().unwrap_or("0")
    )
}

/// Map one row to a trade. `row_number` is the 1-based line in the source
/// (header = 1) and only used for error messages.
pub fn map_row(row: &RowObject, row_number: usize, options: &ParseOptions) -> Result<ParsedTrade, ImportError> {
    let position_id = match (row.first(POSITION_ID), options.position_id_policy) {
        (Some(id), _) => id.to_string(),
        (None, PositionIdPolicy::Synthesize) => synthesize_position_id(),
        (None, PositionIdPolicy::Require) => {
            return Err(ImportError::InvalidRow {
                row: row_number,
                message: "missing position id".to_string(),
            });
        }
    };

    Ok(ParsedTrade {
        position_id,
        account_number: row.text(ACCOUNT_NUMBER, &options.default_account_number),
        symbol: row.text(SYMBOL, ""),
        trade_type: row.text(TRADE_TYPE, "").to_lowercase(),
        volume: row.number(VOLUME),
        entry_price: row.number(ENTRY_PRICE),
        exit_price: row.number(EXIT_PRICE),
        stop_loss: row.number(STOP_LOSS),
        take_profit: row.number(TAKE_PROFIT),
        costs: row.number(COSTS),
        pnl: row.number(PNL),
        entry_time: row.timestamp(ENTRY_TIME, &options.now),
        exit_time: row.timestamp(EXIT_TIME, &options.now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2024-06-01T00:00:00.000Z";

    fn options(policy: PositionIdPolicy) -> ParseOptions {
        ParseOptions {
            position_id_policy: policy,
            default_account_number: "default".to_string(),
            now: NOW.to_string(),
        }
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Position ID"), "position_id");
        assert_eq!(normalize_header("  position_id "), "position_id");
        assert_eq!(normalize_header("Profit/Loss"), "profit_loss");
        assert_eq!(normalize_header("S / L"), "s_l");
        assert_eq!(normalize_header("\u{feff}Entry  Time"), "entry_time");
        assert_eq!(normalize_header("ENTRY-PRICE"), "entry_price");
        assert_eq!(normalize_header(" / "), "");
    }

    #[test]
    fn test_dedupe_headers() {
        let headers = dedupe_headers(["Time", "Position", "Price", "Time", "Price", "Time"]);
        assert_eq!(headers, vec!["Time", "Position", "Price", "Time_1", "Price_1", "Time_2"]);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1.5"), Some(1.5));
        assert_eq!(parse_number("-90.354"), Some(-90.354));
        assert_eq!(parse_number("1 234.50"), Some(1234.5));
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number("0,5"), Some(0.5));
        assert_eq!(parse_number("0.10 lots"), Some(0.1));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_parse_number_thousands_separators() {
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number("1,234,567"), Some(1234567.0));
        assert_eq!(parse_number("-2,500"), Some(-2500.0));
        assert_eq!(parse_number("1,234 lots"), Some(1234.0));
        assert_eq!(parse_number("1.234,50"), Some(1234.5));
        assert_eq!(parse_number("-1,25"), Some(-1.25));
    }

    #[test]
    fn test_parse_number_rejects_ambiguous_commas() {
        assert_eq!(parse_number("1,2,3"), None);
        assert_eq!(parse_number("12,3456"), None);
        assert_eq!(parse_number("0,500"), None);
        assert_eq!(parse_number("12,34.5"), None);
    }

    #[test]
    fn test_map_row_with_readable_headers() {
        let row = RowObject::from_pairs([
            ("Position ID", "1001"),
            ("Symbol", "EURUSD"),
            ("Type", "BUY"),
            ("Volume", "0.5"),
            ("Entry Price", "1.0850"),
            ("Entry Time", "2024-03-01 10:00:00"),
            ("Exit Price", "1.0900"),
            ("Exit Time", "2024-03-01 10:45:00"),
            ("Profit/Loss", "250.00"),
        ]);

        let trade = map_row(&row, 2, &options(PositionIdPolicy::Synthesize)).unwrap();
        assert_eq!(trade.position_id, "1001");
        assert_eq!(trade.symbol, "EURUSD");
        assert_eq!(trade.trade_type, "buy");
        assert_eq!(trade.volume, 0.5);
        assert_eq!(trade.entry_price, 1.085);
        assert_eq!(trade.exit_price, 1.09);
        assert_eq!(trade.pnl, 250.0);
        assert_eq!(trade.entry_time, "2024-03-01T10:00:00.000Z");
        assert_eq!(trade.exit_time, "2024-03-01T10:45:00.000Z");
        assert_eq!(trade.account_number, "default");
        assert_eq!(trade.stop_loss, 0.0);
        assert_eq!(trade.costs, 0.0);
    }

    #[test]
    fn test_map_row_with_snake_case_headers() {
        let row = RowObject::from_pairs([
            ("position_id", "A-7"),
            ("account_number", "5501234"),
            ("symbol", "XAUUSD"),
            ("trade_type", "Sell"),
            ("stop_loss", "2050.5"),
            ("take_profit", "2010"),
            ("costs", "-3.5"),
            ("pnl", "-12"),
        ]);

        let trade = map_row(&row, 2, &options(PositionIdPolicy::Synthesize)).unwrap();
        assert_eq!(trade.position_id, "A-7");
        assert_eq!(trade.account_number, "5501234");
        assert_eq!(trade.trade_type, "sell");
        assert_eq!(trade.stop_loss, 2050.5);
        assert_eq!(trade.take_profit, 2010.0);
        assert_eq!(trade.costs, -3.5);
        assert_eq!(trade.pnl, -12.0);
    }

    #[test]
    fn test_mt5_positions_report_layout() {
        let headers = dedupe_headers([
            "Time", "Position", "Symbol", "Type", "Volume", "Price", "S / L", "T / P", "Time",
            "Price", "Commission", "Swap", "Profit",
        ]);
        let values = [
            "2024.03.01 10:00:00", "5512", "GBPUSD", "sell", "1", "1.2650", "1.2700", "1.2550",
            "2024.03.01 13:00:00", "1.2600", "-7", "0", "500",
        ];
        let row = RowObject::from_pairs(headers.iter().zip(values.iter()));

        let trade = map_row(&row, 2, &options(PositionIdPolicy::Require)).unwrap();
        assert_eq!(trade.position_id, "5512");
        assert_eq!(trade.entry_price, 1.265);
        assert_eq!(trade.exit_price, 1.26);
        assert_eq!(trade.stop_loss, 1.27);
        assert_eq!(trade.take_profit, 1.255);
        assert_eq!(trade.costs, -7.0);
        assert_eq!(trade.pnl, 500.0);
        assert_eq!(trade.entry_time, "2024-03-01T10:00:00.000Z");
        assert_eq!(trade.exit_time, "2024-03-01T13:00:00.000Z");
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let row = RowObject::from_pairs([("Position ID", "9"), ("Volume", "abc"), ("Symbol", "  ")]);

        let trade = map_row(&row, 2, &options(PositionIdPolicy::Synthesize)).unwrap();
        assert_eq!(trade.symbol, "");
        assert_eq!(trade.trade_type, "");
        assert_eq!(trade.volume, 0.0, "Unparseable numbers default to 0");
        assert_eq!(trade.entry_time, NOW);
        assert_eq!(trade.exit_time, NOW);
    }

    #[test]
    fn test_first_candidate_wins() {
        let row = RowObject::from_pairs([("Price", "1.0"), ("Entry Price", "2.0")]);
        let trade = map_row(&row, 2, &options(PositionIdPolicy::Synthesize)).unwrap();
        assert_eq!(trade.entry_price, 2.0);
    }

    #[test]
    fn test_missing_position_id_is_synthesized() {
        let row = RowObject::from_pairs([("Symbol", "EURUSD")]);
        let first = map_row(&row, 2, &options(PositionIdPolicy::Synthesize)).unwrap();
        let second = map_row(&row, 3, &options(PositionIdPolicy::Synthesize)).unwrap();

        assert!(first.position_id.starts_with("POS-"));
        assert_ne!(first.position_id, second.position_id);
    }

    #[test]
    fn test_missing_position_id_rejected_when_required() {
        let row = RowObject::from_pairs([("Symbol", "EURUSD")]);
        let err = map_row(&row, 4, &options(PositionIdPolicy::Require)).unwrap_err();
        assert_eq!(err.to_string(), "Row 4: missing position id");
    }
}
