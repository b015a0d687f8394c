//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, read_signals};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestResult, BacktestSession};
use crate::domain::config::SimulationConfig;
use crate::domain::config_validation::{
    backtest_dates, build_simulation_config, parse_codes, validate_simulation_config,
};
use crate::domain::error::AlphaMintError;
use crate::domain::event::Direction;
use crate::domain::feed::{MarketFeed, SymbolSeries};
use crate::domain::execution::ExecutionRouter;
use crate::domain::market::Market;
use crate::domain::metrics::Metrics;
use crate::domain::strategy::{ScriptedSignal, ScriptedStrategy};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;
use crate::telemetry::DEFAULT_LEVEL;

pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "alphamint", about = "Event-driven equity backtest kernel")]
pub struct Cli {
    /// Log filter, overriding `[logging] level` (RUST_LOG still wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over scripted signals
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Signal file (date,symbol,signal[,strength]); overrides `[backtest] signals`
        #[arg(short, long)]
        signals: Option<PathBuf>,
        /// Report directory; overrides `[backtest] output_dir`
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated symbols; overrides `[backtest] codes`
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
    /// Price the costs of a hypothetical trade
    Quote {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        quantity: i64,
        #[arg(long, value_enum)]
        side: Side,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => Direction::Buy,
            Side::Sell => Direction::Sell,
        }
    }
}

impl Cli {
    pub fn config_path(&self) -> &Path {
        match &self.command {
            Command::Backtest { config, .. }
            | Command::Validate { config }
            | Command::Info { config, .. }
            | Command::Quote { config, .. } => config,
        }
    }

    /// `--log-level`, else `[logging] level` from the config file, else `info`.
    pub fn log_level(&self) -> String {
        if let Some(level) = &self.log_level {
            return level.clone();
        }
        FileConfigAdapter::from_file(self.config_path())
            .map(|c| c.get_string_or("logging", "level", DEFAULT_LEVEL))
            .unwrap_or_else(|_| DEFAULT_LEVEL.to_string())
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            signals,
            output,
            code,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, signals.as_deref(), code.as_deref())
            } else {
                run_backtest(&config, signals.as_deref(), output.as_deref(), code.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
        Command::Quote {
            config,
            symbol,
            price,
            quantity,
            side,
        } => run_quote(&config, &symbol, price, quantity, side.into()),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, AlphaMintError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// `--code` if given, else `[backtest] codes`.
pub fn resolve_codes(code_override: Option<&str>, config: &dyn ConfigPort) -> Vec<String> {
    match code_override {
        Some(codes) => parse_codes(codes),
        None => parse_codes(&config.get_string("backtest", "codes").unwrap_or_default()),
    }
}

fn resolve_path(
    cli_value: Option<&Path>,
    config: &dyn ConfigPort,
    key: &str,
) -> Option<PathBuf> {
    cli_value
        .map(Path::to_path_buf)
        .or_else(|| config.get_string("backtest", key).map(PathBuf::from))
        .filter(|p| !p.as_os_str().is_empty())
}

fn load_signals(path: Option<&Path>) -> Result<Vec<ScriptedSignal>, AlphaMintError> {
    match path {
        Some(path) => {
            eprintln!("Loading signals from {}", path.display());
            read_signals(path)
        }
        None => {
            tracing::warn!("no signal file configured, running without strategy signals");
            Ok(Vec::new())
        }
    }
}

/// Loads one series per code. Codes without data are skipped with a warning; having no
/// data at all is an error.
pub fn load_market_data(
    data_port: &dyn DataPort,
    codes: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Vec<SymbolSeries>, AlphaMintError> {
    let mut series = Vec::with_capacity(codes.len());
    for code in codes {
        match data_port.fetch_bars(code, start_date, end_date) {
            Ok(bars) if bars.is_empty() => {
                eprintln!("warning: skipping {code} (no bars between {start_date} and {end_date})");
            }
            Ok(bars) => series.push(SymbolSeries::new(code, bars)),
            Err(e) => eprintln!("warning: skipping {code} ({e})"),
        }
    }
    if series.is_empty() {
        return Err(AlphaMintError::Data {
            reason: "no valid codes with data to backtest".to_string(),
        });
    }
    Ok(series)
}

/// Runs a complete backtest over `series` with the scripted `signals`.
pub fn run_backtest_pipeline(
    sim: &SimulationConfig,
    series: &[SymbolSeries],
    signals: Vec<ScriptedSignal>,
) -> Result<BacktestResult, AlphaMintError> {
    let feed = MarketFeed::new(series);
    let mut session = BacktestSession::new(sim, ScriptedStrategy::new(signals));
    let result = session.run(&feed)?;
    let unused = session.strategy().strategy().remaining();
    if unused > 0 {
        tracing::warn!(unused, "signals never matched a bar");
    }
    Ok(result)
}

pub fn run_backtest(
    config_path: &Path,
    signals_path: Option<&Path>,
    output_path: Option<&Path>,
    code_override: Option<&str>,
) -> Result<(), AlphaMintError> {
    // Stage 1: load and validate config
    let adapter = load_config(config_path)?;
    let sim = build_simulation_config(&adapter)?;
    let (start_date, end_date) = backtest_dates(&adapter)?;
    let risk_free_rate = adapter.get_double("backtest", "risk_free_rate", 0.0);

    // Stage 2: resolve universe, signals and output
    let codes = resolve_codes(code_override, &adapter);
    if codes.is_empty() {
        return Err(AlphaMintError::ConfigMissing {
            section: "backtest".to_string(),
            key: "codes".to_string(),
        });
    }
    let signals = load_signals(resolve_path(signals_path, &adapter, "signals").as_deref())?;
    let output_dir = resolve_path(output_path, &adapter, "output_dir");

    // Stage 3: load bars
    let data_dir = adapter.get_string_or("backtest", "data_dir", DEFAULT_DATA_DIR);
    let data_port = CsvAdapter::new(PathBuf::from(&data_dir));
    let series = load_market_data(&data_port, &codes, start_date, end_date)?;

    eprintln!(
        "Running backtest: {} codes, {} to {}, {} signals",
        series.len(),
        start_date,
        end_date,
        signals.len()
    );

    // Stage 4: simulate and summarise
    let result = run_backtest_pipeline(&sim, &series, signals)?;
    let metrics = Metrics::compute(&result, risk_free_rate);
    print_summary(&result, &metrics);

    // Stage 5: report
    match output_dir {
        Some(dir) => {
            CsvReportAdapter::new().write(&result, &dir)?;
            eprintln!("\nReport written to: {}", dir.display());
        }
        None => eprintln!("\nNo output directory configured, report not written"),
    }
    Ok(())
}

pub fn print_summary(result: &BacktestResult, metrics: &Metrics) {
    eprintln!("\n=== Results ===");
    eprintln!("Initial Cash:     {:.2}", result.initial_cash);
    eprintln!("Final Cash:       {:.2}", result.final_cash);
    eprintln!("Final Equity:     {:.2}", metrics.final_equity);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", metrics.total_trades);
    eprintln!("Closing Trades:   {}", metrics.closing_trades);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Risk Exits:       {}", metrics.risk_exits);
    eprintln!("Total Costs:      {:.2}", metrics.total_costs);

    if !metrics.per_symbol.is_empty() {
        eprintln!("\n=== Per-Symbol Summary ===");
        for (symbol, stats) in &metrics.per_symbol {
            let sign = if stats.realized_pnl >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades ({} closing), {}{:.2} realized",
                symbol, stats.trades, stats.closing_trades, sign, stats.realized_pnl
            );
        }
    }

    let open: Vec<_> = result
        .positions
        .iter()
        .filter(|(_, pos)| !pos.is_flat())
        .collect();
    if !open.is_empty() {
        eprintln!("\n=== Open Positions ===");
        for (symbol, pos) in open {
            eprintln!(
                "  {}:  {} @ {:.4} (last {:.4})",
                symbol,
                pos.total_quantity(),
                pos.average_cost(),
                result.latest_prices.get(symbol).copied().unwrap_or(0.0)
            );
        }
    }
}

pub fn run_dry_run(
    config_path: &Path,
    signals_path: Option<&Path>,
    code_override: Option<&str>,
) -> Result<(), AlphaMintError> {
    let adapter = load_config(config_path)?;
    let sim = build_simulation_config(&adapter)?;
    let (start_date, end_date) = backtest_dates(&adapter)?;
    eprintln!("Config validated successfully");

    let codes = resolve_codes(code_override, &adapter);
    eprintln!("\nUniverse:");
    for code in &codes {
        eprintln!("  {} ({})", code, Market::classify(code));
    }
    eprintln!("  period: {start_date} to {end_date}");
    eprintln!(
        "  data_dir: {}",
        adapter.get_string_or("backtest", "data_dir", DEFAULT_DATA_DIR)
    );

    let signals = load_signals(resolve_path(signals_path, &adapter, "signals").as_deref())?;
    eprintln!("\nSignals: {}", signals.len());

    let p = &sim.portfolio;
    eprintln!("\nPortfolio:");
    eprintln!("  initial_cash: {:.2}", p.initial_cash);
    eprintln!("  allow_short: {}", p.allow_short);
    eprintln!(
        "  sizing: buy {:.2}, sell {:.2}, cap {:.2}",
        p.sizing.buy_fraction, p.sizing.sell_fraction, p.sizing.max_single_position
    );
    eprintln!(
        "  risk: stop {:.2}, trailing {:.2}, take-profit {:.2}",
        p.risk.stop_loss, p.risk.trailing_stop, p.risk.take_profit
    );
    eprintln!("\nDry run complete, no backtest executed");
    Ok(())
}

pub fn run_validate(config_path: &Path) -> Result<(), AlphaMintError> {
    let adapter = load_config(config_path)?;
    validate_simulation_config(&adapter)?;
    eprintln!("Config is valid");
    Ok(())
}

pub fn run_info(config_path: &Path, code: Option<&str>) -> Result<(), AlphaMintError> {
    let adapter = load_config(config_path)?;
    let data_dir = adapter.get_string_or("backtest", "data_dir", DEFAULT_DATA_DIR);
    let data_port = CsvAdapter::new(PathBuf::from(&data_dir));

    let codes = match code {
        Some(c) => parse_codes(c),
        None => data_port.list_symbols()?,
    };
    if codes.is_empty() {
        eprintln!("No symbols found in {data_dir}");
        return Ok(());
    }

    println!("{:<10} {:<13} {:<12} {:<12} {:>6}", "symbol", "market", "first", "last", "bars");
    for code in &codes {
        match data_port.get_data_range(code)? {
            Some((first, last, count)) => println!(
                "{:<10} {:<13} {:<12} {:<12} {:>6}",
                code,
                Market::classify(code).to_string(),
                first.to_string(),
                last.to_string(),
                count
            ),
            None => println!("{code:<10} no data"),
        }
    }
    Ok(())
}

pub fn run_quote(
    config_path: &Path,
    symbol: &str,
    price: f64,
    quantity: i64,
    direction: Direction,
) -> Result<(), AlphaMintError> {
    if price <= 0.0 || !price.is_finite() {
        return Err(AlphaMintError::Data {
            reason: format!("price must be positive, got {price}"),
        });
    }
    if quantity <= 0 {
        return Err(AlphaMintError::Data {
            reason: format!("quantity must be positive, got {quantity}"),
        });
    }

    let adapter = load_config(config_path)?;
    let sim = build_simulation_config(&adapter)?;
    let router = ExecutionRouter::new(&sim);
    let quote = router.quote(symbol, direction, price, quantity);
    let market = quote.market;

    println!("symbol:      {symbol} ({market}, quoted in {})", market.quote_currency());
    println!("side:        {direction}");
    println!("quantity:    {quantity}");
    println!("price:       {:.4} ({:.4} quoted)", quote.price, quote.quoted_price);
    println!("value:       {:.2}", quote.value);
    println!("commission:  {:.2}", quote.costs.commission);
    println!("tax:         {:.2}", quote.costs.tax);
    println!("fees:        {:.2}", quote.costs.transfer_fee);
    println!("fx cost:     {:.2}", quote.costs.fx_cost);
    println!("total cost:  {:.2}", quote.total_cost());
    println!("settlement:  {:.2}", quote.settlement_amount());
    if market == Market::Domestic
        && direction == Direction::Buy
        && quantity % sim.domestic.lot_size != 0
    {
        eprintln!(
            "warning: {quantity} is not a multiple of the {} share lot, the buy would be rejected",
            sim.domestic.lot_size
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backtest_arguments() {
        let cli = Cli::try_parse_from([
            "alphamint",
            "backtest",
            "--config",
            "sim.ini",
            "--signals",
            "signals.csv",
            "--code",
            "600036,00700",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.config_path(), Path::new("sim.ini"));
        match cli.command {
            Command::Backtest {
                signals,
                code,
                dry_run,
                output,
                ..
            } => {
                assert_eq!(signals, Some(PathBuf::from("signals.csv")));
                assert_eq!(code.as_deref(), Some("600036,00700"));
                assert!(dry_run);
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_quote_side() {
        let cli = Cli::try_parse_from([
            "alphamint", "quote", "-c", "sim.ini", "--symbol", "00700", "--price", "300",
            "--quantity", "100", "--side", "sell",
        ])
        .unwrap();
        match cli.command {
            Command::Quote { side, quantity, .. } => {
                assert_eq!(Direction::from(side), Direction::Sell);
                assert_eq!(quantity, 100);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn explicit_log_level_wins() {
        let cli = Cli::try_parse_from([
            "alphamint",
            "validate",
            "--config",
            "/nonexistent.ini",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), "debug");
    }

    #[test]
    fn unreadable_config_falls_back_to_info() {
        let cli = Cli::try_parse_from(["alphamint", "validate", "--config", "/nonexistent.ini"])
            .unwrap();
        assert_eq!(cli.log_level(), DEFAULT_LEVEL);
    }

    #[test]
    fn code_override_beats_config() {
        let config =
            FileConfigAdapter::from_string("[backtest]\ncodes = 600036, 000001\n").unwrap();
        assert_eq!(resolve_codes(None, &config), vec!["600036", "000001"]);
        assert_eq!(resolve_codes(Some("00700"), &config), vec!["00700"]);
    }
}
