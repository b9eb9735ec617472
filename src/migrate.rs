use sqlx::SqlitePool;

/// Version written to the `meta` table. Bump on any layout change.
pub const FORMAT_VERSION: i64 = 1;

/// Create the index artifact tables.
///
/// `meta` holds `format_version`, `dims` and `model` as key/value rows.
/// `entries` holds one row per index entry; `seq` is the insertion
/// position and is what search tie-breaks on after a reload.
pub async fn create_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            seq INTEGER PRIMARY KEY,
            chunk_id TEXT NOT NULL UNIQUE,
            vector BLOB NOT NULL,
            metadata_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
