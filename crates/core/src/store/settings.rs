use sqlx::SqlitePool;

/// Settings key for the persisted channel key.
pub const CHANNEL_KEY: &str = "channel_key";
/// Settings key for the persisted auto-ping flag.
pub const AUTO_PING: &str = "auto_ping_enabled";

/// Read one setting.
pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(value,)| value))
}

/// Write one setting, replacing any existing value.
pub async fn set(pool: &SqlitePool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Read a boolean setting; absent keys read as `false`.
pub async fn get_bool(pool: &SqlitePool, key: &str) -> Result<bool, sqlx::Error> {
    Ok(get(pool, key).await?.as_deref() == Some("true"))
}

/// Write a boolean setting.
pub async fn set_bool(pool: &SqlitePool, key: &str, value: bool) -> Result<(), sqlx::Error> {
    set(pool, key, if value { "true" } else { "false" }).await
}

/// Insert a described default without overwriting an existing value.
pub async fn seed(
    pool: &SqlitePool,
    key: &str,
    value: &str,
    description: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO settings (key, value, description) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO NOTHING",
    )
    .bind(key)
    .bind(value)
    .bind(description)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_pool;

    #[tokio::test]
    async fn get_absent_key() {
        let pool = test_pool().await;
        assert_eq!(get(&pool, "missing").await.unwrap(), None);
        assert!(!get_bool(&pool, "missing").await.unwrap());
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let pool = test_pool().await;
        set(&pool, CHANNEL_KEY, "ABC123").await.unwrap();
        assert_eq!(
            get(&pool, CHANNEL_KEY).await.unwrap().as_deref(),
            Some("ABC123")
        );

        set(&pool, CHANNEL_KEY, "XYZ789").await.unwrap();
        assert_eq!(
            get(&pool, CHANNEL_KEY).await.unwrap().as_deref(),
            Some("XYZ789")
        );
    }

    #[tokio::test]
    async fn bool_roundtrip() {
        let pool = test_pool().await;
        set_bool(&pool, AUTO_PING, true).await.unwrap();
        assert!(get_bool(&pool, AUTO_PING).await.unwrap());
        set_bool(&pool, AUTO_PING, false).await.unwrap();
        assert!(!get_bool(&pool, AUTO_PING).await.unwrap());
    }

    #[tokio::test]
    async fn seed_does_not_overwrite() {
        let pool = test_pool().await;
        set(&pool, "ping_interval_secs", "30").await.unwrap();
        seed(&pool, "ping_interval_secs", "60", "Ping interval seconds")
            .await
            .unwrap();
        assert_eq!(
            get(&pool, "ping_interval_secs").await.unwrap().as_deref(),
            Some("30")
        );
    }
}
