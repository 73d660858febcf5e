#![deny(warnings)]

//! Output sinks for the interval record stream: JSON Lines files and a SQLite
//! table.

use anyhow::{Context, Result};
use sim_core::IntervalRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Returns the default SQLite URL used for local runs.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./out/plant_sim.db"
}

/// Write records as one JSON object per line, in stream order.
pub fn write_jsonl<W: Write>(writer: W, records: &[IntervalRecord]) -> Result<usize> {
    let mut w = BufWriter::new(writer);
    for rec in records {
        serde_json::to_writer(&mut w, rec)?;
        w.write_all(b"\n")?;
    }
    w.flush()?;
    Ok(records.len())
}

/// Write records to `path`, creating parent directories as needed.
pub fn write_jsonl_file<P: AsRef<Path>>(path: P, records: &[IntervalRecord]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let n = write_jsonl(file, records)?;
    info!(path = %path.display(), records = n, "wrote record stream");
    Ok(n)
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS simulation_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        rng_seed INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS interval_records (
        run_id INTEGER NOT NULL REFERENCES simulation_runs(id),
        seq INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        order_id TEXT NOT NULL,
        line_id TEXT NOT NULL,
        equipment_id TEXT NOT NULL,
        equipment_kind TEXT NOT NULL,
        product_id TEXT NOT NULL,
        product_name TEXT NOT NULL,
        status TEXT NOT NULL,
        downtime_reason TEXT,
        good_units INTEGER NOT NULL,
        scrap_units INTEGER NOT NULL,
        target_rate INTEGER NOT NULL,
        unit_cost TEXT NOT NULL,
        unit_price TEXT NOT NULL,
        availability REAL NOT NULL,
        performance REAL NOT NULL,
        quality REAL NOT NULL,
        oee REAL NOT NULL,
        PRIMARY KEY (run_id, seq)
    )",
];

/// Open (creating if missing) the database and ensure the schema exists.
pub async fn init_db(url: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(&pool).await?;
    }
    Ok(pool)
}

/// Register a simulation run and return its id.
pub async fn create_run(pool: &SqlitePool, name: &str, rng_seed: u64) -> Result<i64> {
    // SQLite integers are signed; the seed round-trips through its bit pattern.
    let res = sqlx::query("INSERT INTO simulation_runs (name, rng_seed) VALUES (?, ?)")
        .bind(name)
        .bind(rng_seed as i64)
        .execute(pool)
        .await?;
    Ok(res.last_insert_rowid())
}

/// Insert a whole record stream for `run_id` in one transaction, keeping its
/// order in the `seq` column.
pub async fn insert_records(
    pool: &SqlitePool,
    run_id: i64,
    records: &[IntervalRecord],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;
    for (seq, r) in records.iter().enumerate() {
        let res = sqlx::query(
            "INSERT INTO interval_records (
                run_id, seq, timestamp, order_id, line_id, equipment_id, equipment_kind,
                product_id, product_name, status, downtime_reason, good_units, scrap_units,
                target_rate, unit_cost, unit_price, availability, performance, quality, oee
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(seq as i64)
        .bind(r.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string())
        .bind(r.order_id.as_str())
        .bind(r.line_id.as_str())
        .bind(r.equipment_id.as_str())
        .bind(r.equipment_kind.to_string())
        .bind(r.product_id.as_str())
        .bind(r.product_name.as_str())
        .bind(r.status.to_string())
        .bind(r.downtime_reason.as_deref())
        .bind(i64::from(r.good_units))
        .bind(i64::from(r.scrap_units))
        .bind(i64::from(r.target_rate))
        .bind(r.unit_cost.to_string())
        .bind(r.unit_price.to_string())
        .bind(r.availability)
        .bind(r.performance)
        .bind(r.quality)
        .bind(r.oee)
        .execute(&mut *tx)
        .await?;
        inserted += res.rows_affected();
    }
    tx.commit().await?;
    info!(run_id, records = inserted, "stored record stream");
    Ok(inserted)
}

/// Number of stored records for a run.
pub async fn count_records(pool: &SqlitePool, run_id: i64) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interval_records WHERE run_id = ?")
        .bind(run_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}
