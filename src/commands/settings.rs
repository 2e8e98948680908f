use crate::db::Database;
use crate::models::{ImportSettings, PositionIdPolicy, UpdateSettingsInput};

pub fn get_settings(db: &Database) -> Result<ImportSettings, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let settings = conn.query_row(
        "SELECT id, position_id_policy, default_account_number, asset_type, created_at, updated_at FROM settings WHERE id = 1",
        [],
        |row| {
            let policy: String = row.get(1)?;
            let policy = policy.parse::<PositionIdPolicy>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
            })?;
            Ok(ImportSettings {
                id: row.get(0)?,
                position_id_policy: policy,
                default_account_number: row.get(2)?,
                asset_type: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    ).map_err(|e| e.to_string())?;

    Ok(settings)
}

pub fn update_settings(db: &Database, settings: UpdateSettingsInput) -> Result<ImportSettings, String> {
    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;

        // Build dynamic UPDATE query
        let mut updates = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(val) = settings.position_id_policy {
            updates.push("position_id_policy = ?");
            values.push(Box::new(val.as_str()));
        }
        if let Some(val) = settings.default_account_number {
            let val = val.trim().to_string();
            if val.is_empty() {
                return Err("Default account number cannot be empty".to_string());
            }
            updates.push("default_account_number = ?");
            values.push(Box::new(val));
        }
        if let Some(val) = settings.asset_type {
            let val = val.trim().to_string();
            if val.is_empty() {
                return Err("Asset type cannot be empty".to_string());
            }
            updates.push("asset_type = ?");
            values.push(Box::new(val));
        }

        updates.push("updated_at = strftime('%s', 'now')");

        let query = format!("UPDATE settings SET {} WHERE id = 1", updates.join(", "));
        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();

        conn.execute(&query, params.as_slice()).map_err(|e| e.to_string())?;
    }

    get_settings(db)
}
