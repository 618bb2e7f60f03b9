//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::retrying_data_port::RetryingDataPort;
use crate::adapters::synthetic_adapter::SyntheticAdapter;
use crate::domain::agents::{
    AgentParams, PortfolioParams, RiskParams, SentimentParams, TechnicalParams, standard_pipeline,
};
use crate::domain::backtest::{BacktestConfig, BacktestResult, run_backtest as run_engine};
use crate::domain::config_validation::{
    parse_date, validate_agent_config, validate_all, validate_data_config,
};
use crate::domain::error::FundsimError;
use crate::domain::indicator::{IndicatorType, RsiSmoothing, snapshot};
use crate::domain::pipeline::PipelineConfig;
use crate::domain::retry::RetryPolicy;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "fundsim", about = "Multi-agent trading backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        /// First simulated date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last simulated date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        cash: Option<f64>,
        /// Write the trade log as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print each stage's signal and rationale per recorded day
        #[arg(long)]
        show_reasoning: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols the configured data source can serve
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print indicator values for one date
    Indicators {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        symbol: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            symbol,
            start,
            end,
            cash,
            output,
            show_reasoning,
        } => {
            let overrides = Overrides {
                symbol,
                start,
                end,
                cash,
            };
            run_backtest(&config, &overrides, output.as_deref(), show_reasoning)
        }
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Indicators {
            config,
            date,
            symbol,
        } => run_indicators(&config, date, symbol.as_deref()),
    }
}

/// Command-line values that replace their `[backtest]` counterparts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Overrides {
    pub symbol: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub cash: Option<f64>,
}

impl Overrides {
    pub fn apply(&self, adapter: &mut FileConfigAdapter) {
        if let Some(symbol) = &self.symbol {
            adapter.set("backtest", "symbol", symbol.as_str());
        }
        if let Some(start) = self.start {
            adapter.set("backtest", "start_date", start.to_string());
        }
        if let Some(end) = self.end {
            adapter.set("backtest", "end_date", end.to_string());
        }
        if let Some(cash) = self.cash {
            adapter.set("backtest", "starting_cash", cash.to_string());
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| report_error(&e))
}

fn report_error(e: &FundsimError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

fn runtime() -> Result<tokio::runtime::Runtime, FundsimError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn run_backtest(
    config_path: &Path,
    overrides: &Overrides,
    output: Option<&Path>,
    show_reasoning: bool,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let mut adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    overrides.apply(&mut adapter);

    match execute_backtest(&adapter, output, show_reasoning) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn execute_backtest(
    adapter: &FileConfigAdapter,
    output: Option<&Path>,
    show_reasoning: bool,
) -> Result<(), FundsimError> {
    validate_all(adapter)?;

    let bt_config = build_backtest_config(adapter)?;
    let params = build_agent_params(adapter)?;
    let pipeline = standard_pipeline(build_pipeline_config(adapter), &params, None);
    let data_port = build_data_port(adapter)?;

    eprintln!(
        "Backtesting {} from {} to {} with {:.2} starting cash",
        bt_config.symbol, bt_config.start_date, bt_config.end_date, bt_config.starting_cash
    );

    let result = runtime()?.block_on(run_engine(data_port.as_ref(), bt_config, &pipeline))?;

    print_trade_table(&result);
    if show_reasoning {
        print_reasoning(&result);
    }
    print_summary(&result);

    let output_path = output
        .map(|p| p.display().to_string())
        .or_else(|| adapter.get_string("report", "trades_output"));
    if let Some(path) = output_path {
        CsvReportAdapter::new().write(&result, &path)?;
        eprintln!("\nTrade log written to: {}", path);
    }
    Ok(())
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, FundsimError> {
    let symbol = adapter
        .get_string("backtest", "symbol")
        .ok_or_else(|| FundsimError::ConfigMissing {
            section: "backtest".into(),
            key: "symbol".into(),
        })?;
    let start_date = parse_date(
        adapter.get_string("backtest", "start_date").as_deref(),
        "start_date",
    )?;
    let end_date = parse_date(
        adapter.get_string("backtest", "end_date").as_deref(),
        "end_date",
    )?;

    let defaults = BacktestConfig::new(symbol.trim(), start_date, end_date);
    Ok(BacktestConfig {
        starting_cash: adapter.get_double("backtest", "starting_cash", defaults.starting_cash),
        lookback_days: adapter.get_int("backtest", "lookback_days", defaults.lookback_days),
        record_holds: adapter.get_bool("backtest", "record_holds", defaults.record_holds),
        max_gap_days: adapter.get_int("backtest", "max_gap_days", defaults.max_gap_days),
        ..defaults
    })
}

pub fn build_pipeline_config(adapter: &dyn ConfigPort) -> PipelineConfig {
    let defaults = PipelineConfig::default();
    let timeout_ms = adapter.get_int(
        "pipeline",
        "stage_timeout_ms",
        defaults.stage_timeout.as_millis() as i64,
    );
    let attempts = adapter.get_int("pipeline", "stage_attempts", 1);
    let backoff_ms = adapter.get_int("pipeline", "stage_backoff_ms", 0);

    PipelineConfig {
        stage_timeout: Duration::from_millis(timeout_ms.max(1) as u64),
        stage_retry: RetryPolicy::new(
            attempts.clamp(1, u32::MAX as i64) as u32,
            Duration::from_millis(backoff_ms.max(0) as u64),
        ),
        parallel_analysts: adapter.get_bool("pipeline", "parallel_analysts", defaults.parallel_analysts),
        hold_on_degraded: adapter.get_bool("pipeline", "hold_on_degraded", defaults.hold_on_degraded),
    }
}

fn usize_at(adapter: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    adapter.get_int(section, key, default as i64).max(0) as usize
}

pub fn build_agent_params(adapter: &dyn ConfigPort) -> Result<AgentParams, FundsimError> {
    let t = TechnicalParams::default();
    let rsi_smoothing = match adapter.get_string("technical", "rsi_smoothing") {
        Some(s) => s
            .parse::<RsiSmoothing>()
            .map_err(|reason| FundsimError::ConfigInvalid {
                section: "technical".into(),
                key: "rsi_smoothing".into(),
                reason,
            })?,
        None => t.rsi_smoothing,
    };
    let bollinger_mult = adapter.get_double(
        "technical",
        "bollinger_mult",
        t.bollinger_mult_x100 as f64 / 100.0,
    );

    let technical = TechnicalParams {
        macd_fast: usize_at(adapter, "technical", "macd_fast", t.macd_fast),
        macd_slow: usize_at(adapter, "technical", "macd_slow", t.macd_slow),
        macd_signal: usize_at(adapter, "technical", "macd_signal", t.macd_signal),
        rsi_period: usize_at(adapter, "technical", "rsi_period", t.rsi_period),
        rsi_smoothing,
        rsi_oversold: adapter.get_double("technical", "rsi_oversold", t.rsi_oversold),
        rsi_overbought: adapter.get_double("technical", "rsi_overbought", t.rsi_overbought),
        bollinger_period: usize_at(adapter, "technical", "bollinger_period", t.bollinger_period),
        bollinger_mult_x100: (bollinger_mult * 100.0).round().max(0.0) as u32,
        obv_slope_window: usize_at(adapter, "technical", "obv_slope_window", t.obv_slope_window),
    };

    let s = SentimentParams::default();
    let sentiment = SentimentParams {
        window: usize_at(adapter, "sentiment", "window", s.window),
    };

    let r = RiskParams::default();
    let risk = RiskParams {
        max_position_pct: adapter.get_double("risk", "max_position_pct", r.max_position_pct),
        volatility_window: usize_at(adapter, "risk", "volatility_window", r.volatility_window),
        high_volatility: adapter.get_double("risk", "high_volatility", r.high_volatility),
        low_volatility: adapter.get_double("risk", "low_volatility", r.low_volatility),
    };

    let p = PortfolioParams::default();
    let portfolio = PortfolioParams {
        buy_threshold: adapter.get_double("portfolio", "buy_threshold", p.buy_threshold),
        sell_threshold: adapter.get_double("portfolio", "sell_threshold", p.sell_threshold),
    };

    Ok(AgentParams {
        technical,
        sentiment,
        risk,
        portfolio,
    })
}

/// Data port for `[data] source`, wrapped in the configured retry policy.
pub fn build_data_port(adapter: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FundsimError> {
    let attempts = adapter.get_int("data", "retry_attempts", 3);
    let backoff_ms = adapter.get_int("data", "retry_backoff_ms", 500);
    let policy = RetryPolicy::new(
        attempts.clamp(1, u32::MAX as i64) as u32,
        Duration::from_millis(backoff_ms.max(0) as u64),
    );

    let source = adapter
        .get_string("data", "source")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "csv".to_string());

    match source.as_str() {
        "csv" => {
            let dir = adapter
                .get_string("data", "csv_dir")
                .unwrap_or_else(|| "data".to_string());
            Ok(Box::new(RetryingDataPort::new(CsvAdapter::new(dir), policy)))
        }
        "synthetic" => {
            let seed = adapter.get_int("data", "seed", 42) as u64;
            Ok(Box::new(RetryingDataPort::new(SyntheticAdapter::new(seed), policy)))
        }
        other => Err(FundsimError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unknown source '{}', expected csv or synthetic", other),
        }),
    }
}

/// Indicators shown by the `indicators` command.
pub fn indicator_set(params: &TechnicalParams) -> Vec<IndicatorType> {
    vec![
        IndicatorType::Ema(params.macd_fast),
        IndicatorType::Ema(params.macd_slow),
        IndicatorType::Macd {
            fast: params.macd_fast,
            slow: params.macd_slow,
            signal: params.macd_signal,
        },
        IndicatorType::Rsi {
            period: params.rsi_period,
            smoothing: params.rsi_smoothing,
        },
        IndicatorType::Bollinger {
            period: params.bollinger_period,
            stddev_mult_x100: params.bollinger_mult_x100,
        },
        IndicatorType::Obv,
    ]
}

fn print_trade_table(result: &BacktestResult) {
    println!(
        "{:<10}  {:<6}  {:<6}  {:>14}  {:>14}  {:>14}  {:>14}  {:>14}",
        "Date", "Ticker", "Action", "Quantity", "Price", "Cash", "Position", "Total Value"
    );
    println!("{}", "-".repeat(110));
    for r in &result.records {
        println!(
            "{:<10}  {:<6}  {:<6}  {:>14.6}  {:>14.2}  {:>14.2}  {:>14.6}  {:>14.2}",
            r.date.to_string(),
            r.symbol,
            r.action.to_string().to_uppercase(),
            r.quantity,
            r.price,
            r.cash_after,
            r.quantity_after,
            r.equity_after
        );
        if let Some(warning) = &r.warning {
            println!("{:<10}  note: {}", "", warning);
        }
    }
}

fn fmt_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

fn print_reasoning(result: &BacktestResult) {
    eprintln!("\n=== Agent Reasoning ===");
    for record in &result.records {
        eprintln!("{} {}", record.date, record.action);
        for signal in &record.signals {
            let flag = if signal.degraded { " (degraded)" } else { "" };
            eprintln!(
                "  {:<18} score {:+.2} conf {:.2}{}: {}",
                signal.stage.to_string(),
                signal.score,
                signal.confidence,
                flag,
                signal.rationale
            );
        }
    }
}

fn print_summary(result: &BacktestResult) {
    let stats = &result.statistics;
    eprintln!("\n=== Summary ===");
    eprintln!("Initial Cash:     {:.2}", stats.initial_cash);
    eprintln!("Final Equity:     {:.2}", stats.final_equity);
    eprintln!("Total Return:     {:.2}%", stats.total_return_pct);
    eprintln!("Annual. Return:   {:.2}%", stats.annualized_return_pct);
    eprintln!("Sharpe Ratio:     {}", fmt_ratio(stats.sharpe_ratio));
    eprintln!("Sortino Ratio:    {}", fmt_ratio(stats.sortino_ratio));
    eprintln!("Max Drawdown:     -{:.2}%", stats.max_drawdown_pct);
    eprintln!("Total Trades:     {} ({} buys, {} sells)", stats.total_trades, stats.buys, stats.sells);
    eprintln!(
        "Win Rate:         {}",
        stats
            .win_rate
            .map_or_else(|| "n/a".to_string(), |w| format!("{:.1}%", w * 100.0))
    );
    eprintln!("Realized PnL:     {:.2}", stats.realized_pnl);
    eprintln!("Unrealized PnL:   {:.2}", result.final_portfolio.unrealized_pnl());
    eprintln!("Clamped Fills:    {}", stats.clamped_executions);
    eprintln!("Degraded Days:    {}", result.degraded_days.len());
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let checked = validate_all(&adapter)
        .and_then(|()| build_backtest_config(&adapter))
        .and_then(|bt| build_agent_params(&adapter).map(|params| (bt, params)));
    let (bt_config, params) = match checked {
        Ok(v) => v,
        Err(e) => return report_error(&e),
    };

    let pipeline = standard_pipeline(build_pipeline_config(&adapter), &params, None);
    let layout: Vec<String> = pipeline
        .layout()
        .iter()
        .map(|group| {
            let names: Vec<String> = group.iter().map(|id| id.to_string()).collect();
            format!("[{}]", names.join(", "))
        })
        .collect();

    eprintln!("\nBacktest:");
    eprintln!("  symbol: {}", bt_config.symbol);
    eprintln!("  range:  {} to {}", bt_config.start_date, bt_config.end_date);
    eprintln!("  cash:   {:.2}", bt_config.starting_cash);
    eprintln!("\nPipeline:");
    eprintln!("  {}", layout.join(" -> "));
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let listed = validate_data_config(&adapter)
        .and_then(|()| build_data_port(&adapter))
        .and_then(|port| runtime()?.block_on(port.list_symbols()));

    match listed {
        Ok(symbols) if symbols.is_empty() => {
            eprintln!("No symbols found");
            ExitCode::SUCCESS
        }
        Ok(symbols) => {
            for symbol in &symbols {
                println!("{}", symbol);
            }
            eprintln!("{} symbols found", symbols.len());
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn run_indicators(config_path: &Path, date: NaiveDate, symbol: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match print_indicators(&adapter, date, symbol) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

fn print_indicators(
    adapter: &FileConfigAdapter,
    date: NaiveDate,
    symbol: Option<&str>,
) -> Result<(), FundsimError> {
    validate_data_config(adapter)?;
    validate_agent_config(adapter)?;

    let symbol = symbol
        .map(str::to_string)
        .or_else(|| adapter.get_string("backtest", "symbol"))
        .ok_or_else(|| FundsimError::ConfigMissing {
            section: "backtest".into(),
            key: "symbol".into(),
        })?;
    let params = build_agent_params(adapter)?;
    let lookback = adapter.get_int("backtest", "lookback_days", 60).max(0);
    let data_port = build_data_port(adapter)?;

    let start = date - chrono::Duration::days(lookback);
    let series = runtime()?.block_on(data_port.fetch_series(&symbol, start, date))?;
    let bars = series.through(date);

    println!("{} as of {} ({} bars)", symbol, date, bars.len());
    for indicator in indicator_set(&params.technical) {
        match snapshot(bars, &indicator).and_then(|s| s.value) {
            Some(value) => println!("  {:<20} {}", indicator.to_string(), value),
            None => println!("  {:<20} n/a (not enough bars)", indicator.to_string()),
        }
    }
    Ok(())
}
