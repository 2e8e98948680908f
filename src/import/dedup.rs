use std::collections::HashMap;

use crate::models::ParsedTrade;

/// Collapse trades sharing a `position_id`, last one wins.
///
/// The survivor keeps the slot of the id's first occurrence, so output order
/// follows first appearance while the values come from the last. Callers feed
/// files in session order, then rows in file order; reordering the files can
/// change which duplicate wins.
pub fn deduplicate<I>(trades: I) -> Vec<ParsedTrade>
where
    I: IntoIterator<Item = ParsedTrade>,
{
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ParsedTrade> = Vec::new();

    for trade in trades {
        match slots.get(&trade.position_id) {
            Some(&idx) => unique[idx] = trade,
            None => {
                slots.insert(trade.position_id.clone(), unique.len());
                unique.push(trade);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn trade(id: &str, pnl: f64) -> ParsedTrade {
        ParsedTrade {
            position_id: id.to_string(),
            account_number: "default".to_string(),
            symbol: "EURUSD".to_string(),
            trade_type: "buy".to_string(),
            volume: 1.0,
            entry_price: 1.0,
            exit_price: 1.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            costs: 0.0,
            pnl,
            entry_time: "2024-03-01T10:00:00.000Z".to_string(),
            exit_time: "2024-03-01T11:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_later_duplicate_wins() {
        let result = deduplicate(vec![trade("A", 1.0), trade("B", 2.0), trade("A", 9.0)]);

        let summary: Vec<(&str, f64)> = result.iter().map(|t| (t.position_id.as_str(), t.pnl)).collect();
        assert_eq!(summary, vec![("A", 9.0), ("B", 2.0)]);
    }

    #[test]
    fn test_output_ids_are_unique() {
        let input = vec![
            trade("A", 1.0),
            trade("B", 2.0),
            trade("A", 3.0),
            trade("C", 4.0),
            trade("B", 5.0),
            trade("A", 6.0),
        ];
        let input_len = input.len();
        let result = deduplicate(input);

        assert!(result.len() <= input_len);
        let ids: HashSet<&str> = result.iter().map(|t| t.position_id.as_str()).collect();
        assert_eq!(ids.len(), result.len());
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_input_order_decides_the_winner() {
        let forward = deduplicate(vec![trade("A", 1.0), trade("A", 2.0)]);
        let reversed = deduplicate(vec![trade("A", 2.0), trade("A", 1.0)]);
        assert_eq!(forward[0].pnl, 2.0);
        assert_eq!(reversed[0].pnl, 1.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(Vec::new()).is_empty());
    }
}
