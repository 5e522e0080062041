//! Runtime-tunable key/value settings (quota limits, thresholds).

use rusqlite::params;

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = self.conn().query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match row {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Parse a numeric setting, falling back to `default` when the key is
    /// absent or malformed.
    pub fn get_setting_u32(&self, key: &str, default: u32) -> Result<u32> {
        Ok(self
            .get_setting(key)?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_and_defaults() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_setting("quota.search").unwrap(), None);
        assert_eq!(db.get_setting_u32("quota.search", 50).unwrap(), 50);

        db.set_setting("quota.search", "25").unwrap();
        assert_eq!(db.get_setting_u32("quota.search", 50).unwrap(), 25);

        db.set_setting("quota.search", "junk").unwrap();
        assert_eq!(db.get_setting_u32("quota.search", 50).unwrap(), 50);
    }
}
