//! SQLite implementation of PersistenceStore
//!
//! Tables (created idempotently at open):
//! - `pet_states` - vitals + cooldowns per wallet (UPSERT)
//! - `points_accounts` - points ledger per wallet (UPSERT)
//! - `reward_pools` / `hourly_pools` - one day row + 24 hour rows per date
//! - `participations` - UNIQUE(wallet, date, hour)
//! - `reserve_fund` - single row running balance
//! - `token_balances` - credited claim totals per wallet
//!
//! Every multi-step operation runs inside one IMMEDIATE transaction so the
//! write lock is taken up front and concurrent writers serialise.

use super::{
    FinalizeOutcome, InsertOutcome, Payout, PersistenceStore, PetState, StorageError,
};
use crate::pet::{CooldownState, PetVitals};
use crate::points::PointsAccount;
use crate::rewards::types::{
    ClaimReceipt, HourlyPool, ParticipationRecord, PoolStatus, RewardPool, HOURS_PER_DAY,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pet_states (
    wallet          TEXT PRIMARY KEY,
    food            REAL NOT NULL,
    happiness       REAL NOT NULL,
    cleanliness     REAL NOT NULL,
    energy          REAL NOT NULL,
    health          REAL NOT NULL,
    is_dead         INTEGER NOT NULL DEFAULT 0,
    cooldowns_json  TEXT NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS points_accounts (
    wallet              TEXT PRIMARY KEY,
    total               REAL NOT NULL DEFAULT 0,
    daily_earned        REAL NOT NULL DEFAULT 0,
    daily_cap           REAL NOT NULL,
    consecutive_days    INTEGER NOT NULL DEFAULT 0,
    multiplier          REAL NOT NULL DEFAULT 1,
    last_active_date    TEXT,
    updated_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS reward_pools (
    date                TEXT PRIMARY KEY,
    total_daily_volume  REAL NOT NULL,
    total_daily_rewards REAL NOT NULL,
    reserve_amount      REAL NOT NULL,
    created_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS hourly_pools (
    date                TEXT NOT NULL,
    hour                INTEGER NOT NULL,
    pool_amount         REAL NOT NULL,
    distributed_amount  REAL NOT NULL DEFAULT 0,
    participants        INTEGER NOT NULL DEFAULT 0,
    status              TEXT NOT NULL,
    PRIMARY KEY (date, hour)
);

CREATE TABLE IF NOT EXISTS participations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    wallet          TEXT NOT NULL,
    date            TEXT NOT NULL,
    hour            INTEGER NOT NULL,
    base_points     REAL NOT NULL,
    weighted_points REAL NOT NULL,
    multiplier      REAL NOT NULL,
    amount          REAL NOT NULL DEFAULT 0,
    claimed         INTEGER NOT NULL DEFAULT 0,
    claimed_at      INTEGER,
    created_at      INTEGER NOT NULL,
    UNIQUE (wallet, date, hour)
);

CREATE INDEX IF NOT EXISTS idx_participations_unclaimed ON participations(wallet, claimed);
CREATE INDEX IF NOT EXISTS idx_participations_hour ON participations(date, hour);

CREATE TABLE IF NOT EXISTS reserve_fund (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    balance REAL NOT NULL
);
INSERT OR IGNORE INTO reserve_fund (id, balance) VALUES (1, 0);

CREATE TABLE IF NOT EXISTS token_balances (
    wallet      TEXT PRIMARY KEY,
    balance     REAL NOT NULL DEFAULT 0,
    updated_at  INTEGER NOT NULL
);
"#;

/// Ordering used to keep status writes forward-only
const STATUS_RANK_SQL: &str =
    "CASE status WHEN 'pending' THEN 0 WHEN 'active' THEN 1 ELSE 2 END";

fn status_rank(status: PoolStatus) -> i64 {
    match status {
        PoolStatus::Pending => 0,
        PoolStatus::Active => 1,
        PoolStatus::Distributed => 2,
    }
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::info!("📊 SQLite journal mode: {}", mode);

        Self::init(conn)
    }

    /// In-memory database, used by tests and the headless simulator.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        log::debug!("✅ Schema applied");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn participation_from_row(row: &Row<'_>) -> rusqlite::Result<ParticipationRecord> {
    Ok(ParticipationRecord {
        id: Some(row.get("id")?),
        wallet: row.get("wallet")?,
        date: row.get("date")?,
        hour: row.get("hour")?,
        base_points: row.get("base_points")?,
        weighted_points: row.get("weighted_points")?,
        multiplier: row.get("multiplier")?,
        amount: row.get("amount")?,
        claimed: row.get::<_, i64>("claimed")? != 0,
        claimed_at: row.get("claimed_at")?,
        created_at: row.get("created_at")?,
    })
}

const PARTICIPATION_COLUMNS: &str = "id, wallet, date, hour, base_points, weighted_points, \
     multiplier, amount, claimed, claimed_at, created_at";

fn mark_claimed_in(conn: &Connection, ids: &[i64], claimed_at: i64) -> Result<usize, StorageError> {
    let mut stmt = conn.prepare(
        "UPDATE participations SET claimed = 1, claimed_at = ?1 WHERE id = ?2 AND claimed = 0",
    )?;
    let mut changed = 0;
    for id in ids {
        changed += stmt.execute(params![claimed_at, id])?;
    }
    Ok(changed)
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn get_pet_state(&self, wallet: &str) -> Result<Option<PetState>, StorageError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT food, happiness, cleanliness, energy, health, is_dead, cooldowns_json, updated_at
                 FROM pet_states WHERE wallet = ?1",
                [wallet],
                |row| {
                    Ok((
                        PetVitals::from_parts(
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get::<_, i64>(5)? != 0,
                        ),
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((vitals, cooldowns_json, updated_at)) => {
                let cooldowns: CooldownState = serde_json::from_str(&cooldowns_json)?;
                Ok(Some(PetState {
                    vitals,
                    cooldowns,
                    updated_at,
                }))
            }
        }
    }

    async fn save_pet_state(&self, wallet: &str, state: &PetState) -> Result<(), StorageError> {
        let cooldowns_json = serde_json::to_string(&state.cooldowns)?;
        let conn = self.lock()?;
        let v = &state.vitals;
        conn.execute(
            r#"
            INSERT INTO pet_states
                (wallet, food, happiness, cleanliness, energy, health, is_dead, cooldowns_json, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(wallet) DO UPDATE SET
                food = excluded.food,
                happiness = excluded.happiness,
                cleanliness = excluded.cleanliness,
                energy = excluded.energy,
                health = excluded.health,
                is_dead = excluded.is_dead,
                cooldowns_json = excluded.cooldowns_json,
                updated_at = excluded.updated_at
            "#,
            params![
                wallet,
                v.food(),
                v.happiness(),
                v.cleanliness(),
                v.energy(),
                v.health(),
                v.is_dead() as i64,
                cooldowns_json,
                state.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn get_points_account(&self, wallet: &str) -> Result<Option<PointsAccount>, StorageError> {
        let conn = self.lock()?;
        let account = conn
            .query_row(
                "SELECT total, daily_earned, daily_cap, consecutive_days, multiplier, last_active_date
                 FROM points_accounts WHERE wallet = ?1",
                [wallet],
                |row| {
                    Ok(PointsAccount {
                        total: row.get(0)?,
                        daily_earned: row.get(1)?,
                        daily_cap: row.get(2)?,
                        consecutive_days: row.get(3)?,
                        multiplier: row.get(4)?,
                        last_active_date: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    async fn save_points_account(
        &self,
        wallet: &str,
        account: &PointsAccount,
    ) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO points_accounts
                (wallet, total, daily_earned, daily_cap, consecutive_days, multiplier, last_active_date, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(wallet) DO UPDATE SET
                total = excluded.total,
                daily_earned = excluded.daily_earned,
                daily_cap = excluded.daily_cap,
                consecutive_days = excluded.consecutive_days,
                multiplier = excluded.multiplier,
                last_active_date = excluded.last_active_date,
                updated_at = excluded.updated_at
            "#,
            params![
                wallet,
                account.total,
                account.daily_earned,
                account.daily_cap,
                account.consecutive_days,
                account.multiplier,
                account.last_active_date,
                now_ts(),
            ],
        )?;
        Ok(())
    }

    async fn get_reward_pool(&self, date: NaiveDate) -> Result<Option<RewardPool>, StorageError> {
        let conn = self.lock()?;
        let header = conn
            .query_row(
                "SELECT total_daily_volume, total_daily_rewards, reserve_amount
                 FROM reward_pools WHERE date = ?1",
                [date],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?, row.get::<_, f64>(2)?)),
            )
            .optional()?;

        let Some((total_daily_volume, total_daily_rewards, reserve_amount)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT hour, pool_amount, distributed_amount, participants, status
             FROM hourly_pools WHERE date = ?1 ORDER BY hour",
        )?;
        let rows = stmt.query_map([date], |row| {
            Ok((
                row.get::<_, u8>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut hourly_pools = Vec::with_capacity(HOURS_PER_DAY as usize);
        for row in rows {
            let (hour, pool_amount, distributed_amount, participants, status) = row?;
            let status: PoolStatus = status.parse().map_err(StorageError::Corrupt)?;
            hourly_pools.push(HourlyPool {
                hour,
                pool_amount,
                distributed_amount,
                participants,
                status,
            });
        }

        Ok(Some(RewardPool {
            date,
            total_daily_volume,
            total_daily_rewards,
            reserve_amount,
            hourly_pools,
        }))
    }

    async fn save_reward_pool(&self, pool: &RewardPool) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let sql = format!(
                "UPDATE hourly_pools SET status = ?1
                 WHERE date = ?2 AND hour = ?3 AND {} < ?4",
                STATUS_RANK_SQL
            );
            let mut stmt = tx.prepare(&sql)?;
            for h in &pool.hourly_pools {
                stmt.execute(params![h.status.as_str(), pool.date, h.hour, status_rank(h.status)])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn create_reward_pool(&self, pool: &RewardPool) -> Result<bool, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO reward_pools
                (date, total_daily_volume, total_daily_rewards, reserve_amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pool.date,
                pool.total_daily_volume,
                pool.total_daily_rewards,
                pool.reserve_amount,
                now_ts(),
            ],
        )?;

        if inserted == 0 {
            // Date already exists: nothing else may change
            return Ok(false);
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO hourly_pools
                    (date, hour, pool_amount, distributed_amount, participants, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for h in &pool.hourly_pools {
                stmt.execute(params![
                    pool.date,
                    h.hour,
                    h.pool_amount,
                    h.distributed_amount,
                    h.participants,
                    h.status.as_str(),
                ])?;
            }
        }

        tx.execute(
            "UPDATE reserve_fund SET balance = balance + ?1 WHERE id = 1",
            [pool.reserve_amount],
        )?;

        tx.commit()?;
        Ok(true)
    }

    async fn increment_reserve(&self, amount: f64) -> Result<f64, StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE reserve_fund SET balance = balance + ?1 WHERE id = 1",
            [amount],
        )?;
        let balance = conn.query_row("SELECT balance FROM reserve_fund WHERE id = 1", [], |row| {
            row.get(0)
        })?;
        Ok(balance)
    }

    async fn reserve_balance(&self) -> Result<f64, StorageError> {
        let conn = self.lock()?;
        let balance = conn.query_row("SELECT balance FROM reserve_fund WHERE id = 1", [], |row| {
            row.get(0)
        })?;
        Ok(balance)
    }

    async fn insert_participation(
        &self,
        record: &ParticipationRecord,
    ) -> Result<InsertOutcome, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM hourly_pools WHERE date = ?1 AND hour = ?2",
                params![record.date, record.hour],
                |row| row.get(0),
            )
            .optional()?;

        if status.as_deref() != Some(PoolStatus::Active.as_str()) {
            return Ok(InsertOutcome::PoolNotActive);
        }

        let insert = tx.execute(
            "INSERT INTO participations
                (wallet, date, hour, base_points, weighted_points, multiplier, amount, claimed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7)",
            params![
                record.wallet,
                record.date,
                record.hour,
                record.base_points,
                record.weighted_points,
                record.multiplier,
                record.created_at,
            ],
        );

        match insert {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Ok(InsertOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE hourly_pools SET participants = participants + 1 WHERE date = ?1 AND hour = ?2",
            params![record.date, record.hour],
        )?;
        tx.commit()?;

        let mut inserted = record.clone();
        inserted.id = Some(id);
        inserted.amount = 0.0;
        inserted.claimed = false;
        inserted.claimed_at = None;
        Ok(InsertOutcome::Inserted(inserted))
    }

    async fn participations_for_hour(
        &self,
        date: NaiveDate,
        hour: u8,
    ) -> Result<Vec<ParticipationRecord>, StorageError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM participations WHERE date = ?1 AND hour = ?2 ORDER BY id",
            PARTICIPATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![date, hour], participation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn finalize_hour(
        &self,
        date: NaiveDate,
        hour: u8,
        expected_participants: u32,
        payouts: &[Payout],
        rollover: f64,
    ) -> Result<FinalizeOutcome, StorageError> {
        let distributed: f64 = payouts.iter().map(|p| p.amount).sum();

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let swapped = tx.execute(
            "UPDATE hourly_pools SET status = 'distributed', distributed_amount = ?1
             WHERE date = ?2 AND hour = ?3 AND status = 'active' AND participants = ?4",
            params![distributed, date, hour, expected_participants],
        )?;
        if swapped == 0 {
            let status: Option<String> = tx
                .query_row(
                    "SELECT status FROM hourly_pools WHERE date = ?1 AND hour = ?2",
                    params![date, hour],
                    |row| row.get(0),
                )
                .optional()?;
            return Ok(if status.as_deref() == Some(PoolStatus::Active.as_str()) {
                FinalizeOutcome::Stale
            } else {
                FinalizeOutcome::NotActive
            });
        }

        {
            let mut stmt = tx.prepare(
                "UPDATE participations SET amount = ?1 WHERE id = ?2 AND date = ?3 AND hour = ?4",
            )?;
            for payout in payouts {
                stmt.execute(params![payout.amount, payout.participation_id, date, hour])?;
            }
        }

        let next_hour = hour + 1;
        if next_hour < HOURS_PER_DAY {
            if rollover > 0.0 {
                tx.execute(
                    "UPDATE hourly_pools SET pool_amount = pool_amount + ?1
                     WHERE date = ?2 AND hour = ?3 AND status != 'distributed'",
                    params![rollover, date, next_hour],
                )?;
            }
            tx.execute(
                "UPDATE hourly_pools SET status = 'active'
                 WHERE date = ?1 AND hour = ?2 AND status = 'pending'",
                params![date, next_hour],
            )?;
        }

        tx.commit()?;
        Ok(FinalizeOutcome::Finalized)
    }

    async fn active_hours_before(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<(NaiveDate, u8)>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, hour FROM hourly_pools
             WHERE status = 'active' AND date < ?1 ORDER BY date, hour",
        )?;
        let rows = stmt
            .query_map([date], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn get_unclaimed_rewards(
        &self,
        wallet: &str,
    ) -> Result<Vec<ParticipationRecord>, StorageError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM participations
             WHERE wallet = ?1 AND claimed = 0 AND amount > 0 ORDER BY id",
            PARTICIPATION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map([wallet], participation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    async fn mark_claimed(&self, ids: &[i64], claimed_at: i64) -> Result<usize, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = mark_claimed_in(&tx, ids, claimed_at)?;
        tx.commit()?;
        Ok(changed)
    }

    async fn claim_rewards(
        &self,
        wallet: &str,
        claimed_at: i64,
    ) -> Result<Option<ClaimReceipt>, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows: Vec<(i64, f64)> = {
            let mut stmt = tx.prepare(
                "SELECT id, amount FROM participations
                 WHERE wallet = ?1 AND claimed = 0 AND amount > 0",
            )?;
            let rows = stmt
                .query_map([wallet], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let amount: f64 = rows.iter().map(|(_, amount)| amount).sum();
        if rows.is_empty() || amount <= 0.0 {
            return Ok(None);
        }

        let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        let changed = mark_claimed_in(&tx, &ids, claimed_at)?;
        if changed != ids.len() {
            // Cannot happen under the write lock; bail out rather than credit a partial set
            return Err(StorageError::Corrupt(format!(
                "claim for {} marked {} of {} rows",
                wallet,
                changed,
                ids.len()
            )));
        }

        tx.execute(
            "INSERT INTO token_balances (wallet, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(wallet) DO UPDATE SET
                balance = balance + excluded.balance,
                updated_at = excluded.updated_at",
            params![wallet, amount, claimed_at],
        )?;

        let new_balance: f64 = tx.query_row(
            "SELECT balance FROM token_balances WHERE wallet = ?1",
            [wallet],
            |row| row.get(0),
        )?;

        tx.commit()?;

        Ok(Some(ClaimReceipt {
            wallet: wallet.to_string(),
            amount,
            records: ids.len(),
            new_balance,
            claimed_at,
        }))
    }

    async fn token_balance(&self, wallet: &str) -> Result<f64, StorageError> {
        let conn = self.lock()?;
        let balance = conn
            .query_row(
                "SELECT balance FROM token_balances WHERE wallet = ?1",
                [wallet],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0.0))
    }
}
