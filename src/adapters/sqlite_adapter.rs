//! SQLite adapter for price history, trades, and portfolio snapshots.

use crate::domain::error::RsTraderError;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::position::{ExitFields, Position, PositionStatus};
use crate::domain::price::PricePoint;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceHistoryPort;
use crate::ports::trade_port::TradeStorePort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS assets (
        id TEXT PRIMARY KEY,
        name TEXT
    );
    CREATE TABLE IF NOT EXISTS price_history (
        asset_id TEXT NOT NULL,
        date TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        PRIMARY KEY (asset_id, date)
    );
    CREATE TABLE IF NOT EXISTS trades (
        trade_id INTEGER PRIMARY KEY AUTOINCREMENT,
        asset_id TEXT NOT NULL,
        entry_date TEXT NOT NULL,
        entry_price REAL NOT NULL,
        units REAL,
        position_type TEXT NOT NULL DEFAULT 'LONG',
        status TEXT NOT NULL,
        exit_date TEXT,
        exit_price REAL,
        profit_loss REAL
    );
    CREATE TABLE IF NOT EXISTS portfolio (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        cash REAL NOT NULL,
        positions_value REAL NOT NULL,
        equity REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

/// A `trades` row before validation.
struct TradeRow {
    trade_id: i64,
    asset_id: String,
    entry_date: String,
    entry_price: f64,
    units: Option<f64>,
    status: String,
    exit_date: Option<String>,
    exit_price: Option<f64>,
    profit_loss: Option<f64>,
}

fn query_error(e: rusqlite::Error) -> RsTraderError {
    RsTraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn write_error(e: rusqlite::Error) -> RsTraderError {
    RsTraderError::PersistenceFailure {
        reason: e.to_string(),
    }
}

fn parse_date(value: &str, what: &str) -> Result<NaiveDate, RsTraderError> {
    // timestamps may carry a time part; the date prefix is what matters
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, DATE_FORMAT).map_err(|e| RsTraderError::DataIntegrity {
        reason: format!("invalid {what} '{value}': {e}"),
    })
}

impl TradeRow {
    fn into_position(self) -> Result<Position, RsTraderError> {
        let status = PositionStatus::parse(&self.status).ok_or_else(|| RsTraderError::DataIntegrity {
            reason: format!("trade {} has unknown status '{}'", self.trade_id, self.status),
        })?;
        let units = self.units.ok_or_else(|| RsTraderError::DataIntegrity {
            reason: format!("trade {} for {} has no units", self.trade_id, self.asset_id),
        })?;
        let exit_date = self
            .exit_date
            .as_deref()
            .map(|d| parse_date(d, "exit_date"))
            .transpose()?;

        Ok(Position {
            trade_id: Some(self.trade_id),
            entry_date: parse_date(&self.entry_date, "entry_date")?,
            asset_id: self.asset_id,
            entry_price: self.entry_price,
            units,
            status,
            exit_price: self.exit_price,
            exit_date,
            realized_pnl: self.profit_loss,
        })
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RsTraderError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| RsTraderError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| RsTraderError::Database {
                reason: e.to_string(),
            })?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, RsTraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| RsTraderError::Database {
                reason: e.to_string(),
            })?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, RsTraderError> {
        self.pool.get().map_err(|e: r2d2::Error| RsTraderError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), RsTraderError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_error)
    }

    pub fn insert_asset(&self, id: &str, name: Option<&str>) -> Result<(), RsTraderError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO assets (id, name) VALUES (?1, ?2)",
                params![id, name],
            )
            .map_err(write_error)?;
        Ok(())
    }

    pub fn insert_prices(&self, bars: &[PricePoint]) -> Result<(), RsTraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(write_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO price_history (asset_id, date, open, high, low, close)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    bar.asset_id,
                    bar.date.format(DATE_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close
                ],
            )
            .map_err(write_error)?;
        }

        tx.commit().map_err(write_error)
    }

    fn query_trades(&self, status: PositionStatus) -> Result<Vec<Position>, RsTraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT trade_id, asset_id, entry_date, entry_price, units, status,
                        exit_date, exit_price, profit_loss
                 FROM trades
                 WHERE status = ?1
                 ORDER BY trade_id ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![status.as_str()], |row| {
                Ok(TradeRow {
                    trade_id: row.get(0)?,
                    asset_id: row.get(1)?,
                    entry_date: row.get(2)?,
                    entry_price: row.get(3)?,
                    units: row.get(4)?,
                    status: row.get(5)?,
                    exit_date: row.get(6)?,
                    exit_price: row.get(7)?,
                    profit_loss: row.get(8)?,
                })
            })
            .map_err(query_error)?;

        let mut positions = Vec::new();
        for row in rows {
            positions.push(row.map_err(query_error)?.into_position()?);
        }
        Ok(positions)
    }

    pub fn portfolio_snapshots(&self) -> Result<Vec<PortfolioSnapshot>, RsTraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT date, cash, positions_value, equity FROM portfolio ORDER BY id ASC")
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(query_error)?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (date, cash, positions_value, equity) = row.map_err(query_error)?;
            snapshots.push(PortfolioSnapshot {
                date: parse_date(&date, "portfolio date")?,
                cash,
                positions_value,
                equity,
            });
        }
        Ok(snapshots)
    }
}

impl PriceHistoryPort for SqliteAdapter {
    fn get_price_history(&self, asset_id: &str) -> Result<Vec<PricePoint>, RsTraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close
                 FROM price_history
                 WHERE asset_id = ?1
                 ORDER BY date ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![asset_id], |row| {
                let date_str: String = row.get(0)?;
                let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        date_str.len(),
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(PricePoint {
                    asset_id: asset_id.to_string(),
                    date,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                })
            })
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_error)?);
        }
        Ok(bars)
    }

    fn get_asset_universe(&self) -> Result<Vec<String>, RsTraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id FROM assets
                 UNION
                 SELECT DISTINCT asset_id FROM price_history
                 ORDER BY 1",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_error)?;

        let mut assets = Vec::new();
        for row in rows {
            assets.push(row.map_err(query_error)?);
        }
        Ok(assets)
    }

    fn asset_name(&self, asset_id: &str) -> Result<Option<String>, RsTraderError> {
        let conn = self.conn()?;
        let name: Option<Option<String>> = conn
            .query_row(
                "SELECT name FROM assets WHERE id = ?1",
                params![asset_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)?;
        Ok(name.flatten())
    }
}

impl TradeStorePort for SqliteAdapter {
    fn get_open_positions(&self) -> Result<Vec<Position>, RsTraderError> {
        self.query_trades(PositionStatus::Open)
    }

    fn get_closed_positions(&self) -> Result<Vec<Position>, RsTraderError> {
        self.query_trades(PositionStatus::Closed)
    }

    fn append_trade_record(&self, position: &Position) -> Result<i64, RsTraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trades (asset_id, entry_date, entry_price, units, position_type, status)
             VALUES (?1, ?2, ?3, ?4, 'LONG', ?5)",
            params![
                position.asset_id,
                position.entry_date.format(DATE_FORMAT).to_string(),
                position.entry_price,
                position.units,
                position.status.as_str()
            ],
        )
        .map_err(write_error)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_trade_record(&self, trade_id: i64, exit: &ExitFields) -> Result<(), RsTraderError> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE trades
                 SET exit_date = ?1, exit_price = ?2, profit_loss = ?3, status = 'CLOSED'
                 WHERE trade_id = ?4",
                params![
                    exit.exit_date.format(DATE_FORMAT).to_string(),
                    exit.exit_price,
                    exit.realized_pnl,
                    trade_id
                ],
            )
            .map_err(write_error)?;
        if updated == 0 {
            return Err(RsTraderError::PersistenceFailure {
                reason: format!("no trade with id {trade_id}"),
            });
        }
        Ok(())
    }

    fn append_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), RsTraderError> {
        self.conn()?
            .execute(
                "INSERT INTO portfolio (date, cash, positions_value, equity) VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot.date.format(DATE_FORMAT).to_string(),
                    snapshot.cash,
                    snapshot.positions_value,
                    snapshot.equity
                ],
            )
            .map_err(write_error)?;
        Ok(())
    }
}
