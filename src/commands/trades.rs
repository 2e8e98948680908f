use crate::db::Database;
use crate::models::{ImportBatch, Outcome, PersistedTrade, StoredTrade, TradeFilters};

const TRADE_COLUMNS: &str = "id, user_id, position_id, account_number, asset, asset_type, trade_type, \
    size, entry_price, exit_price, stop_loss, take_profit, costs, pnl, time, duration, outcome, \
    batch_id, created_at";

/// Helper function to map a database row to a StoredTrade struct
fn map_row_to_trade(row: &rusqlite::Row) -> rusqlite::Result<StoredTrade> {
    let outcome: String = row.get(16)?;
    let outcome = outcome.parse::<Outcome>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(16, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(StoredTrade {
        id: row.get(0)?,
        trade: PersistedTrade {
            user_id: row.get(1)?,
            position_id: row.get(2)?,
            account_number: row.get(3)?,
            asset: row.get(4)?,
            asset_type: row.get(5)?,
            trade_type: row.get(6)?,
            size: row.get(7)?,
            entry_price: row.get(8)?,
            exit_price: row.get(9)?,
            stop_loss: row.get(10)?,
            take_profit: row.get(11)?,
            costs: row.get(12)?,
            pnl: row.get(13)?,
            time: row.get(14)?,
            duration: row.get(15)?,
            outcome,
        },
        batch_id: row.get(17)?,
        created_at: row.get(18)?,
    })
}

/// Stored trades for one user, newest first
pub fn get_trades(db: &Database, user_id: &str, filters: Option<TradeFilters>) -> Result<Vec<StoredTrade>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut query = format!("SELECT {} FROM trades WHERE user_id = ?", TRADE_COLUMNS);
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];

    if let Some(f) = &filters {
        if let Some(asset) = &f.asset {
            conditions.push("asset LIKE ?");
            params.push(Box::new(format!("%{}%", asset)));
        }
        if let Some(outcome) = f.outcome {
            conditions.push("outcome = ?");
            params.push(Box::new(outcome.as_str()));
        }
        if let Some(start_time) = &f.start_time {
            conditions.push("time >= ?");
            params.push(Box::new(start_time.clone()));
        }
        if let Some(end_time) = &f.end_time {
            conditions.push("time <= ?");
            params.push(Box::new(end_time.clone()));
        }
    }

    if !conditions.is_empty() {
        query.push_str(&format!(" AND {}", conditions.join(" AND ")));
    }

    query.push_str(" ORDER BY time DESC, rowid DESC");

    if let Some(f) = &filters {
        if let (Some(page), Some(limit)) = (f.page, f.limit) {
            if limit < 1 {
                return Err(format!("Limit must be positive, got {}", limit));
            }
            if page < 1 {
                return Err(format!("Page must be positive, got {}", page));
            }
            let offset = (i64::from(page) - 1)
                .checked_mul(i64::from(limit))
                .ok_or_else(|| format!("Page {} is out of range", page))?;
            query.push_str(" LIMIT ? OFFSET ?");
            params.push(Box::new(i64::from(limit)));
            params.push(Box::new(offset));
        }
    }

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query).map_err(|e| e.to_string())?;
    let trades_iter = stmt.query_map(param_refs.as_slice(), map_row_to_trade)
        .map_err(|e| e.to_string())?;

    let trades: Result<Vec<StoredTrade>, _> = trades_iter.collect();
    trades.map_err(|e| e.to_string())
}

pub fn get_import_history(db: &Database, user_id: &str) -> Result<Vec<ImportBatch>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, submitted, inserted, duplicates, created_at
             FROM import_batches WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC",
        )
        .map_err(|e| e.to_string())?;

    let batches = stmt
        .query_map([user_id], |row| {
            Ok(ImportBatch {
                id: row.get(0)?,
                user_id: row.get(1)?,
                submitted: row.get(2)?,
                inserted: row.get(3)?,
                duplicates: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .map_err(|e| e.to_string())?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    Ok(batches)
}

/// Undo an import: removes the batch and every trade it inserted.
/// Returns the number of trades removed.
pub fn delete_import_batch(db: &Database, user_id: &str, batch_id: &str) -> Result<usize, String> {
    let mut conn = db.conn.lock().map_err(|e| e.to_string())?;
    let tx = conn.transaction().map_err(|e| e.to_string())?;

    let removed = tx
        .execute(
            "DELETE FROM trades WHERE batch_id = ? AND user_id = ?",
            [batch_id, user_id],
        )
        .map_err(|e| e.to_string())?;

    let deleted = tx
        .execute(
            "DELETE FROM import_batches WHERE id = ? AND user_id = ?",
            [batch_id, user_id],
        )
        .map_err(|e| e.to_string())?;

    if deleted == 0 {
        return Err(format!("Import batch not found: {}", batch_id));
    }

    tx.commit().map_err(|e| e.to_string())?;

    log::info!("Deleted import batch {} ({} trades)", batch_id, removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::write_batch;

    fn record(position_id: &str, asset: &str, pnl: f64, time: &str) -> PersistedTrade {
        PersistedTrade {
            user_id: "user-1".to_string(),
            position_id: position_id.to_string(),
            account_number: "default".to_string(),
            asset: asset.to_string(),
            asset_type: "FX".to_string(),
            trade_type: "buy".to_string(),
            size: 1.0,
            entry_price: 1.0,
            exit_price: 1.1,
            stop_loss: 0.0,
            take_profit: 0.0,
            costs: 0.0,
            pnl,
            time: time.to_string(),
            duration: "3 hours".to_string(),
            outcome: Outcome::from_pnl(pnl),
        }
    }

    fn seeded() -> (Database, String) {
        let db = Database::in_memory().unwrap();
        let batch_id = {
            let mut conn = db.conn.lock().unwrap();
            write_batch(
                &mut conn,
                "user-1",
                &[
                    record("1", "EURUSD", 50.0, "2024-03-01T10:00:00.000Z"),
                    record("2", "GBPUSD", -20.0, "2024-03-02T10:00:00.000Z"),
                    record("3", "EURJPY", 0.0, "2024-03-03T10:00:00.000Z"),
                ],
            )
            .unwrap()
            .batch_id
            .unwrap()
        };
        (db, batch_id)
    }

    #[test]
    fn test_get_trades_newest_first() {
        let (db, batch_id) = seeded();
        let trades = get_trades(&db, "user-1", None).unwrap();

        let ids: Vec<&str> = trades.iter().map(|t| t.trade.position_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
        assert_eq!(trades[0].batch_id.as_deref(), Some(batch_id.as_str()));
        assert_eq!(trades[0].trade.outcome, Outcome::Loss);
    }

    #[test]
    fn test_get_trades_filters() {
        let (db, _) = seeded();

        let eur = get_trades(
            &db,
            "user-1",
            Some(TradeFilters {
                asset: Some("EUR".to_string()),
                ..Default::default()
            }),
        )
        .unwrap();
        assert_eq!(eur.len(), 2);

        let wins = get_trades(
            &db,
            "user-1",
            Some(TradeFilters {
                outcome: Some(Outcome::Win),
                ..Default::default()
            }),
        )
        .unwrap();
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].trade.position_id, "1");

        let window = get_trades(
            &db,
            "user-1",
            Some(TradeFilters {
                start_time: Some("2024-03-02T00:00:00.000Z".to_string()),
                end_time: Some("2024-03-02T23:59:59.000Z".to_string()),
                ..Default::default()
            }),
        )
        .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].trade.asset, "GBPUSD");

        let page_two = get_trades(
            &db,
            "user-1",
            Some(TradeFilters {
                page: Some(2),
                limit: Some(2),
                ..Default::default()
            }),
        )
        .unwrap();
        assert_eq!(page_two.len(), 1);
        assert_eq!(page_two[0].trade.position_id, "1");

        assert!(get_trades(&db, "someone-else", None).unwrap().is_empty());
    }

    #[test]
    fn test_get_trades_pagination_bounds() {
        let (db, _) = seeded();
        let paged = |page, limit| {
            get_trades(
                &db,
                "user-1",
                Some(TradeFilters {
                    page: Some(page),
                    limit: Some(limit),
                    ..Default::default()
                }),
            )
        };

        assert!(paged(3, 2_000_000_000).unwrap().is_empty());
        assert!(paged(i32::MAX, i32::MAX).unwrap().is_empty());
        assert_eq!(paged(1, i32::MAX).unwrap().len(), 3);

        assert!(paged(1, 0).unwrap_err().contains("Limit must be positive"));
        assert!(paged(1, -5).unwrap_err().contains("Limit must be positive"));
        assert!(paged(0, 2).unwrap_err().contains("Page must be positive"));
    }

    #[test]
    fn test_import_history() {
        let (db, batch_id) = seeded();
        let history = get_import_history(&db, "user-1").unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, batch_id);
        assert_eq!(history[0].submitted, 3);
        assert_eq!(history[0].inserted, 3);
        assert_eq!(history[0].duplicates, 0);
        assert!(get_import_history(&db, "someone-else").unwrap().is_empty());
    }

    #[test]
    fn test_delete_import_batch() {
        let (db, batch_id) = seeded();

        assert!(delete_import_batch(&db, "someone-else", &batch_id).is_err());
        assert_eq!(get_trades(&db, "user-1", None).unwrap().len(), 3);

        let removed = delete_import_batch(&db, "user-1", &batch_id).unwrap();
        assert_eq!(removed, 3);
        assert!(get_trades(&db, "user-1", None).unwrap().is_empty());
        assert!(get_import_history(&db, "user-1").unwrap().is_empty());

        assert!(delete_import_batch(&db, "user-1", &batch_id).is_err());
    }
}
