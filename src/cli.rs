//! CLI definition and dispatch.
//!
//! Each command validates its configuration, wires adapters to ports and
//! runs one domain pipeline. Results go to stdout, diagnostics to tracing.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_notifier::LogNotifier;
use crate::adapters::top_list_file::TopListFile;
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{backtest_dates, validate_backtest_config, validate_config};
use crate::domain::error::RsTraderError;
use crate::domain::live::{run_daily_cycle, DailyReport, LiveConfig, LivePorts};
use crate::domain::metrics::Metrics;
use crate::domain::price::normalize_history;
use crate::domain::ranking::{rank_assets, RankingResult, MIN_RANK_HISTORY};
use crate::domain::rotation::MAX_POSITIONS;
use crate::domain::signals::{SignalReport, SignalSeries};
use crate::domain::trend::DirectionalParams;
use crate::domain::universe::{load_universe, resolve_assets};
use crate::ports::config_port::ConfigPort;
use crate::ports::notify_port::NotifierPort;
use crate::ports::price_port::PriceHistoryPort;

const DEFAULT_TOP_LIST: &str = "top_assets.txt";

#[derive(Parser, Debug)]
#[command(name = "rstrader", about = "Relative-strength crypto rotation trader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank the universe as of the latest bar
    Rank {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the daily rotation cycle
    Cycle {
        #[arg(short, long)]
        config: PathBuf,
        /// Cycle date (YYYY-MM-DD); defaults to the latest bar
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Replay the rotation strategy over the configured window
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the latest signals per asset
    Signals {
        #[arg(short, long)]
        config: PathBuf,
        /// Asset id; repeat for several, omit for the whole universe
        #[arg(long)]
        asset: Vec<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Rank { config } => run_rank(&config),
        Command::Cycle { config, date } => run_cycle(&config, date),
        Command::Backtest { config } => run_backtest_command(&config),
        Command::Signals { config, asset } => run_signals(&config, &asset),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &RsTraderError) -> ExitCode {
    tracing::error!("{err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    tracing::info!("loading config from {}", path.display());
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

pub fn build_live_config(config: &dyn ConfigPort) -> LiveConfig {
    LiveConfig {
        initial_cash: config.get_double("portfolio", "initial_cash", 1000.0),
        max_positions: config
            .get_int("portfolio", "max_positions", MAX_POSITIONS as i64)
            .max(1) as usize,
        min_history: config
            .get_int("portfolio", "min_history", MIN_RANK_HISTORY as i64)
            .max(2) as usize,
        params: DirectionalParams::default(),
    }
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, RsTraderError> {
    let (start_date, end_date) = backtest_dates(config)?;
    let live = build_live_config(config);
    Ok(BacktestConfig {
        start_date,
        end_date,
        initial_cash: live.initial_cash,
        max_positions: live.max_positions,
        min_history: live.min_history,
        benchmark: config
            .get_string("backtest", "benchmark")
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty()),
        params: live.params,
    })
}

pub fn top_list_path(config: &dyn ConfigPort) -> PathBuf {
    PathBuf::from(config.get_string_or("portfolio", "top_list_path", DEFAULT_TOP_LIST))
}

/// Price source selected by `[data] source`.
pub fn open_price_source(config: &dyn ConfigPort) -> Result<Box<dyn PriceHistoryPort>, RsTraderError> {
    let source = config.get_string_or("data", "source", "sqlite");
    match source.trim() {
        "csv" => {
            let dir = config.get_string_or("data", "csv_dir", "data");
            tracing::debug!(dir = %dir, "reading prices from csv");
            Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))))
        }
        "sqlite" => open_sqlite_prices(config),
        other => Err(RsTraderError::ConfigInvalid {
            section: "data".to_string(),
            key: "source".to_string(),
            reason: format!("unknown data source '{other}'"),
        }),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite_prices(config: &dyn ConfigPort) -> Result<Box<dyn PriceHistoryPort>, RsTraderError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    Ok(Box::new(SqliteAdapter::from_config(config)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite_prices(_config: &dyn ConfigPort) -> Result<Box<dyn PriceHistoryPort>, RsTraderError> {
    Err(RsTraderError::ConfigInvalid {
        section: "data".to_string(),
        key: "source".to_string(),
        reason: "built without the sqlite feature".to_string(),
    })
}

/// Telegram when built with it and configured, otherwise the log.
pub fn build_notifier(config: &dyn ConfigPort) -> Box<dyn NotifierPort> {
    #[cfg(feature = "telegram")]
    {
        use crate::adapters::telegram_notifier::TelegramNotifier;
        match TelegramNotifier::from_config(config) {
            Ok(Some(notifier)) => return Box::new(notifier),
            Ok(None) => tracing::info!("telegram not configured, notifications go to the log"),
            Err(e) => tracing::warn!("telegram unavailable, notifications go to the log: {e}"),
        }
    }
    #[cfg(not(feature = "telegram"))]
    let _ = config;
    Box::new(LogNotifier)
}

fn universe_list(config: &dyn ConfigPort, prices: &dyn PriceHistoryPort) -> Result<Vec<String>, RsTraderError> {
    let assets = resolve_assets(prices, config.get_string("universe", "assets").as_deref())?;
    if assets.is_empty() {
        return Err(RsTraderError::NoData {
            asset: "universe".to_string(),
        });
    }
    Ok(assets)
}

/// Rank the configured universe as of its latest bar.
pub fn rank_universe(config: &dyn ConfigPort) -> Result<RankingResult, RsTraderError> {
    validate_config(config)?;
    let live = build_live_config(config);
    let prices = open_price_source(config)?;
    let assets = universe_list(config, prices.as_ref())?;
    let data = load_universe(prices.as_ref(), &assets)?;
    let as_of = data.latest_date().ok_or_else(|| RsTraderError::NoData {
        asset: "all".to_string(),
    })?;
    Ok(rank_assets(&data.histories, as_of, live.min_history))
}

pub fn render_ranking(result: &RankingResult, top: usize) -> String {
    let mut out = format!("Relative strength ranking as of {}\n", result.as_of);
    out.push_str(&format!("{:>4}  {:<20} {:>5}\n", "#", "Asset", "Score"));
    for (i, entry) in result.ranking.iter().enumerate() {
        let marker = if i < top { "*" } else { " " };
        out.push_str(&format!(
            "{:>3}{marker}  {:<20} {:>5}\n",
            i + 1,
            entry.asset_id,
            entry.score
        ));
    }
    if !result.excluded.is_empty() {
        let names: Vec<&str> = result.excluded.iter().map(|(a, _)| a.as_str()).collect();
        out.push_str(&format!("Excluded (insufficient history): {}\n", names.join(", ")));
    }
    out
}

fn run_rank(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match rank_universe(&config) {
        Ok(result) => {
            print!("{}", render_ranking(&result, build_live_config(&config).max_positions));
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Run the daily cycle against the configured stores.
#[cfg(feature = "sqlite")]
pub fn daily_cycle(config: &dyn ConfigPort, date: Option<NaiveDate>) -> Result<DailyReport, RsTraderError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    validate_config(config)?;
    let live = build_live_config(config);
    let prices = open_price_source(config)?;
    let trades = SqliteAdapter::from_config(config)?;
    let top_list = TopListFile::new(top_list_path(config));
    let notifier = build_notifier(config);
    let assets = universe_list(config, prices.as_ref())?;

    let ports = LivePorts {
        prices: prices.as_ref(),
        trades: &trades,
        top_list: &top_list,
        notifier: notifier.as_ref(),
    };
    run_daily_cycle(&ports, &assets, &live, date)
}

#[cfg(not(feature = "sqlite"))]
pub fn daily_cycle(config: &dyn ConfigPort, _date: Option<NaiveDate>) -> Result<DailyReport, RsTraderError> {
    validate_config(config)?;
    Err(RsTraderError::ConfigInvalid {
        section: "sqlite".to_string(),
        key: "path".to_string(),
        reason: "the trade store needs the sqlite feature".to_string(),
    })
}

pub fn render_daily_report(report: &DailyReport) -> String {
    let outcome = &report.outcome;
    let mut out = format!("Daily cycle {}\n", report.date);
    out.push_str(&format!("Top assets: {}\n", report.top_assets.join(", ")));
    match &report.change {
        Some(change) => out.push_str(&format!("{}\n", change.summary())),
        None => out.push_str("First run, no previous top list\n"),
    }
    for closed in &outcome.closes {
        out.push_str(&format!(
            "CLOSE {} at {:.8} ({}), P&L {:.2}\n",
            closed.position.asset_id,
            closed.position.exit_price.unwrap_or(0.0),
            closed.reason,
            closed.position.realized_pnl.unwrap_or(0.0)
        ));
    }
    for opened in &outcome.opens {
        out.push_str(&format!(
            "OPEN  {} at {:.8}, {:.8} units\n",
            opened.asset_id, opened.entry_price, opened.units
        ));
    }
    for held in &outcome.holds {
        out.push_str(&format!("HOLD  {held}\n"));
    }
    for skipped in &outcome.skipped {
        out.push_str(&format!("SKIP  {} ({:?})\n", skipped.asset_id, skipped.reason));
    }
    out.push_str(&format!(
        "Cash {:.2}, positions {:.2}, equity {:.2}\n",
        outcome.snapshot.cash, outcome.snapshot.positions_value, outcome.snapshot.equity
    ));
    out
}

fn run_cycle(config_path: &Path, date: Option<NaiveDate>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match daily_cycle(&config, date) {
        Ok(report) => {
            print!("{}", render_daily_report(&report));
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

#[derive(Debug)]
pub struct BacktestReport {
    pub result: BacktestResult,
    pub metrics: Metrics,
    pub benchmark: Option<Metrics>,
}

pub fn backtest(config: &dyn ConfigPort) -> Result<BacktestReport, RsTraderError> {
    validate_backtest_config(config)?;
    let bt_config = build_backtest_config(config)?;
    let prices = open_price_source(config)?;
    let assets = universe_list(config, prices.as_ref())?;
    let data = load_universe(prices.as_ref(), &assets)?;

    tracing::info!(
        assets = data.histories.len(),
        start = %bt_config.start_date,
        end = %bt_config.end_date,
        "running backtest"
    );
    let result = run_backtest(&data.histories, &bt_config)?;
    let metrics = Metrics::compute(bt_config.initial_cash, &result.equity_curve, &result.closed_trades);
    let benchmark = (!result.benchmark_curve.is_empty())
        .then(|| Metrics::compute(bt_config.initial_cash, &result.benchmark_curve, &[]));

    Ok(BacktestReport {
        result,
        metrics,
        benchmark,
    })
}

pub fn render_backtest(report: &BacktestReport) -> String {
    let m = &report.metrics;
    let mut out = String::from("Backtest results\n");
    out.push_str(&format!("  Final equity:       {:.2}\n", report.result.final_equity));
    out.push_str(&format!("  Total return:       {:.2}%\n", m.total_return * 100.0));
    out.push_str(&format!("  Annualized return:  {:.2}%\n", m.annualized_return * 100.0));
    out.push_str(&format!("  Sharpe ratio:       {:.2}\n", m.sharpe_ratio));
    out.push_str(&format!(
        "  Max drawdown:       {:.2}% ({} days)\n",
        m.max_drawdown * 100.0,
        m.max_drawdown_duration
    ));
    out.push_str(&format!(
        "  Trades:             {} ({} won, {} lost)\n",
        m.total_trades, m.trades_won, m.trades_lost
    ));
    out.push_str(&format!("  Win rate:           {:.2}%\n", m.win_rate * 100.0));
    out.push_str(&format!("  Profit factor:      {:.2}\n", m.profit_factor));
    out.push_str(&format!("  Avg win / loss:     {:.2} / {:.2}\n", m.avg_win, m.avg_loss));
    out.push_str(&format!("  Avg holding days:   {:.1}\n", m.avg_holding_days));
    out.push_str(&format!("  Open positions:     {}\n", report.result.open_positions.len()));
    if let Some(b) = &report.benchmark {
        out.push_str(&format!(
            "  Benchmark return:   {:.2}% (max drawdown {:.2}%)\n",
            b.total_return * 100.0,
            b.max_drawdown * 100.0
        ));
    }
    out
}

fn run_backtest_command(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match backtest(&config) {
        Ok(report) => {
            print!("{}", render_backtest(&report));
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Latest signal report per asset; assets without usable data are skipped.
pub fn signal_reports(config: &dyn ConfigPort, requested: &[String]) -> Result<Vec<SignalReport>, RsTraderError> {
    validate_config(config)?;
    let live = build_live_config(config);
    let prices = open_price_source(config)?;
    let assets = if requested.is_empty() {
        universe_list(config, prices.as_ref())?
    } else {
        requested.to_vec()
    };

    let mut reports = Vec::new();
    for asset in &assets {
        let snapshot = prices
            .get_price_history(asset)
            .map(normalize_history)
            .and_then(|bars| SignalSeries::compute(asset, &bars, &live.params).latest());
        match snapshot {
            Ok(snapshot) => {
                let name = prices.asset_name(asset).unwrap_or_else(|e| {
                    tracing::debug!(asset = %asset, "name lookup failed: {e}");
                    None
                });
                reports.push(SignalReport::from_snapshot(&snapshot, name));
            }
            Err(e) if e.is_asset_skip() => tracing::warn!(asset = %asset, "no signal: {e}"),
            Err(e) => return Err(e),
        }
    }
    Ok(reports)
}

fn run_signals(config_path: &Path, assets: &[String]) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match signal_reports(&config, assets) {
        Ok(reports) => {
            for report in &reports {
                println!("{}\n", report.render());
            }
            if reports.is_empty() {
                tracing::warn!("no asset had enough data for a signal");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Backtest settings are checked only when a `[backtest]` window is given.
pub fn validate(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    let has_window = config.get_string("backtest", "start_date").is_some()
        || config.get_string("backtest", "end_date").is_some();
    if has_window {
        validate_backtest_config(config)
    } else {
        validate_config(config)
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match validate(&config) {
        Ok(()) => {
            println!("Configuration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
