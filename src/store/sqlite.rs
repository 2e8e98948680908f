use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::sync::Arc;

use super::{BatchOutcome, StoreError, TradeStore};
use crate::db::Database;
use crate::models::PersistedTrade;

/// Trade store backed by the journal database
#[derive(Clone)]
pub struct SqliteTradeStore {
    db: Arc<Database>,
}

impl SqliteTradeStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn submit_batch(&self, user_id: &str, trades: &[PersistedTrade]) -> Result<BatchOutcome, StoreError> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let trades = trades.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut conn = db.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            write_batch(&mut conn, &user_id, &trades)
        })
        .await?
    }
}

fn generate_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    let segment = uuid.split('-').next().unwrap_or(&uuid);
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), segment)
}

/// Write a batch inside one transaction. Any storage error rolls back
/// the batch row together with every trade inserted so far.
pub fn write_batch(conn: &mut Connection, user_id: &str, trades: &[PersistedTrade]) -> Result<BatchOutcome, StoreError> {
    let batch_id = generate_id("BATCH");
    let now = Utc::now().timestamp();

    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO import_batches (id, user_id, submitted, created_at) VALUES (?, ?, ?, ?)",
        params![batch_id, user_id, trades.len() as i64, now],
    )?;

    let mut inserted = 0usize;
    let mut duplicates = 0usize;

    {
        let mut exists_stmt =
            tx.prepare("SELECT EXISTS(SELECT 1 FROM trades WHERE user_id = ? AND position_id = ?)")?;
        let mut insert_stmt = tx.prepare(
            "INSERT INTO trades (
                id, user_id, position_id, account_number, asset, asset_type, trade_type,
                size, entry_price, exit_price, stop_loss, take_profit, costs, pnl,
                time, duration, outcome, batch_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        for trade in trades {
            let exists: bool = exists_stmt.query_row(params![user_id, trade.position_id], |row| row.get(0))?;
            if exists {
                duplicates += 1;
                continue;
            }

            insert_stmt.execute(params![
                generate_id("TRADE"),
                user_id,
                trade.position_id,
                trade.account_number,
                trade.asset,
                trade.asset_type,
                trade.trade_type,
                trade.size,
                trade.entry_price,
                trade.exit_price,
                trade.stop_loss,
                trade.take_profit,
                trade.costs,
                trade.pnl,
                trade.time,
                trade.duration,
                trade.outcome.as_str(),
                batch_id,
                now,
            ])?;
            inserted += 1;
        }
    }

    tx.execute(
        "UPDATE import_batches SET inserted = ?, duplicates = ? WHERE id = ?",
        params![inserted as i64, duplicates as i64, batch_id],
    )?;

    tx.commit()?;

    log::info!(
        "Stored batch {} for {}: {} inserted, {} duplicates",
        batch_id,
        user_id,
        inserted,
        duplicates
    );

    Ok(BatchOutcome {
        success: true,
        count: inserted,
        duplicates,
        error: None,
        batch_id: Some(batch_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Outcome;

    fn record(position_id: &str, pnl: f64) -> PersistedTrade {
        PersistedTrade {
            user_id: "user-1".to_string(),
            position_id: position_id.to_string(),
            account_number: "5501234".to_string(),
            asset: "EURUSD".to_string(),
            asset_type: "FX".to_string(),
            trade_type: "buy".to_string(),
            size: 1.0,
            entry_price: 1.085,
            exit_price: 1.09,
            stop_loss: 0.0,
            take_profit: 0.0,
            costs: 0.0,
            pnl,
            time: "2024-03-01T10:00:00.000Z".to_string(),
            duration: "45 minutes".to_string(),
            outcome: Outcome::from_pnl(pnl),
        }
    }

    fn store() -> SqliteTradeStore {
        SqliteTradeStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn count(store: &SqliteTradeStore, sql: &str) -> i64 {
        let conn = store.database().conn.lock().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[tokio::test]
    async fn test_submit_batch_inserts_all_new_trades() {
        let store = store();
        let outcome = store
            .submit_batch("user-1", &[record("1001", 500.0), record("1002", -20.0)])
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.duplicates, 0);
        assert!(outcome.batch_id.is_some());
        assert_eq!(count(&store, "SELECT COUNT(*) FROM trades"), 2);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM trades WHERE outcome = 'loss'"), 1);
    }

    #[tokio::test]
    async fn test_duplicates_across_batches_are_counted() {
        let store = store();
        store.submit_batch("user-1", &[record("1001", 500.0)]).await.unwrap();

        let outcome = store
            .submit_batch("user-1", &[record("1001", 500.0), record("1003", 12.0)])
            .await
            .unwrap();

        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM trades"), 2);
        assert_eq!(
            count(&store, "SELECT duplicates FROM import_batches ORDER BY created_at DESC, rowid DESC LIMIT 1"),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicates_are_scoped_per_user() {
        let store = store();
        store.submit_batch("user-1", &[record("1001", 500.0)]).await.unwrap();

        let outcome = store.submit_batch("user-2", &[record("1001", 500.0)]).await.unwrap();
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.duplicates, 0);
    }

    #[tokio::test]
    async fn test_storage_error_rolls_back_the_batch() {
        let store = store();
        {
            let conn = store.database().conn.lock().unwrap();
            conn.execute("DROP TABLE trades", []).unwrap();
        }

        let result = store.submit_batch("user-1", &[record("1001", 500.0)]).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM import_batches"), 0);
    }

    #[test]
    fn test_generated_ids_have_prefix() {
        let id = generate_id("TRADE");
        assert!(id.starts_with("TRADE-"));
        assert_eq!(id.split('-').count(), 3);
    }
}
