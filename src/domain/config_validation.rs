//! Configuration validation.
//!
//! Every command validates its configuration before touching any data.

use crate::domain::error::RsTraderError;
use crate::domain::universe::parse_assets;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

/// Checks shared by every command: data source and portfolio settings.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    validate_data_source(config)?;
    validate_initial_cash(config)?;
    validate_max_positions(config)?;
    validate_min_history(config)?;
    validate_universe(config)?;
    Ok(())
}

/// [`validate_config`] plus the backtest window.
pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    validate_config(config)?;
    let (start, end) = backtest_dates(config)?;
    if start > end {
        return Err(invalid("backtest", "start_date", "start_date must not be after end_date"));
    }
    Ok(())
}

pub fn backtest_dates(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate), RsTraderError> {
    let start = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;
    Ok((start, end))
}

fn invalid(section: &str, key: &str, reason: &str) -> RsTraderError {
    RsTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_data_source(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    let source = config.get_string_or("data", "source", "sqlite");
    match source.trim() {
        "sqlite" => match config.get_string("sqlite", "path") {
            Some(p) if !p.trim().is_empty() => {
                if config.get_int("sqlite", "pool_size", 4) < 1 {
                    return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
                }
                Ok(())
            }
            _ => Err(RsTraderError::ConfigMissing {
                section: "sqlite".to_string(),
                key: "path".to_string(),
            }),
        },
        "csv" => match config.get_string("data", "csv_dir") {
            Some(d) if !d.trim().is_empty() => Ok(()),
            _ => Err(RsTraderError::ConfigMissing {
                section: "data".to_string(),
                key: "csv_dir".to_string(),
            }),
        },
        other => Err(RsTraderError::ConfigInvalid {
            section: "data".to_string(),
            key: "source".to_string(),
            reason: format!("unknown data source '{other}', expected sqlite or csv"),
        }),
    }
}

fn validate_initial_cash(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    let value = config.get_double("portfolio", "initial_cash", 1000.0);
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid("portfolio", "initial_cash", "initial_cash must be positive"));
    }
    Ok(())
}

fn validate_max_positions(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    if config.get_int("portfolio", "max_positions", 3) < 1 {
        return Err(invalid("portfolio", "max_positions", "max_positions must be at least 1"));
    }
    Ok(())
}

fn validate_min_history(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    if config.get_int("portfolio", "min_history", 14) < 2 {
        return Err(invalid("portfolio", "min_history", "min_history must be at least 2"));
    }
    Ok(())
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), RsTraderError> {
    match config.get_string("universe", "assets") {
        Some(list) if !list.trim().is_empty() => parse_assets(&list)
            .map(|_| ())
            .map_err(|e| invalid("universe", "assets", &e.to_string())),
        _ => Ok(()),
    }
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, RsTraderError> {
    match value {
        None => Err(RsTraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                &format!("invalid {field} format, expected YYYY-MM-DD"),
            )
        }),
    }
}
