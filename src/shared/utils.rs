use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(10)
        .build(manager)
        .context("failed to build database connection pool")
}

/// Run any pending database migrations.
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get().context("failed to get connection for migrations")?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("migration error: {}", e))?;
    Ok(())
}

/// Start of the UTC day containing `dt`.
pub fn day_floor(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Last representable instant of the UTC day containing `dt`.
pub fn day_ceil(dt: DateTime<Utc>) -> DateTime<Utc> {
    day_floor(dt) + Duration::days(1) - Duration::microseconds(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_bounds_cover_whole_day() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 13, 45, 12).unwrap();
        assert_eq!(day_floor(dt), Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert!(day_ceil(dt) > Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).unwrap());
        assert!(day_ceil(dt) < Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap());
    }
}
