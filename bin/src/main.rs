//! CLI for the fd-backtest factor model.
//!
//! This binary lists the available factors, prints the exposure table of a
//! single window, and runs the full rolling backtest over a directory of
//! per-ticker CSV files.

use chrono::{Days, NaiveDate};
use clap::{Parser, Subcommand};
use fd_backtest::{
    BacktestConfig, BacktestError, Backtester, ConstituentTable, CsvDirectorySource, ExposureTable,
    FactorRegistry, FetchRequest, LinearFactorModel, PerformanceEvaluator, PerformanceSummary,
    PriceFrame, PriceSource, RebalanceFrequency, Result, ReturnSeries, UniverseSource,
    benchmarks::{equal_weight_returns, market_cap_weight_returns},
    compute_exposures, factor_attribution,
    prices::parse_date,
    turnover,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser)]
#[command(name = "fd-backtest")]
#[command(about = "Linear factor model estimation and rolling portfolio backtests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered factors in allocation order
    Factors,
    /// Print the exposure table of one trailing window
    Exposures {
        /// Directory of <TICKER>.csv files
        #[arg(long)]
        data_dir: PathBuf,
        /// Last day of the window (YYYY-MM-DD)
        #[arg(long)]
        as_of: String,
        /// Window length in calendar days
        #[arg(long, default_value_t = 252)]
        window: u64,
        /// Symbol excluded from the table
        #[arg(long)]
        benchmark: Option<String>,
    },
    /// Run the rolling backtest and report performance
    Run {
        /// Directory of <TICKER>.csv files
        #[arg(long)]
        data_dir: PathBuf,
        /// JSON backtest config
        #[arg(long)]
        config: Option<PathBuf>,
        /// Constituent CSV restricting the universe
        #[arg(long)]
        universe: Option<PathBuf>,
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
        /// Rebalance frequency code (D, W, M, Q, Y)
        #[arg(long)]
        rebalance: Option<RebalanceFrequency>,
        /// Window length in calendar days
        #[arg(long)]
        window: Option<u64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fd_backtest=info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Factors => {
            list_factors(&FactorRegistry::with_defaults());
            Ok(())
        }
        Commands::Exposures {
            data_dir,
            as_of,
            window,
            benchmark,
        } => show_exposures(data_dir, &as_of, window, benchmark),
        Commands::Run {
            data_dir,
            config,
            universe,
            start,
            end,
            rebalance,
            window,
        } => run_backtest(RunArgs {
            data_dir,
            config,
            universe,
            start,
            end,
            rebalance,
            window,
        }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// List all registered factors.
fn list_factors(registry: &FactorRegistry) {
    println!("Available Factors ({} total)\n", registry.len());
    for info in registry.all_info() {
        println!("  {} - {}", info.name, info.description);
        println!(
            "      columns: {}, min observations: {}",
            info.required_columns.join(", "),
            info.min_observations
        );
    }
}

/// Compute and print the exposures of the window ending at `as_of`.
fn show_exposures(
    data_dir: PathBuf,
    as_of: &str,
    window: u64,
    benchmark: Option<String>,
) -> Result<()> {
    let benchmark = benchmark.or(BacktestConfig::default().benchmark);
    let end = parse_date(as_of)?;
    let start = end
        .checked_sub_days(Days::new(window))
        .unwrap_or(NaiveDate::MIN);

    let source = CsvDirectorySource::new(data_dir);
    let prices = source.fetch(&FetchRequest::new(source.available_tickers()?, start, end))?;
    let exposures = compute_exposures(&prices, benchmark.as_deref())?;

    println!("Exposures for {start} to {end}\n");
    print_exposures(&exposures);
    Ok(())
}

fn print_exposures(exposures: &ExposureTable) {
    print!("{:<8}", "Symbol");
    for factor in exposures.factors() {
        print!(" {factor:>10}");
    }
    println!();

    for (asset, row) in exposures.iter() {
        print!("{asset:<8}");
        for value in row {
            match value {
                Some(value) => print!(" {value:>10.4}"),
                None => print!(" {:>10}", "-"),
            }
        }
        println!();
    }

    let coverage = exposures.coverage();
    println!(
        "\nCoverage: {}/{} assets ({:.1}%)",
        coverage.retained(),
        coverage.evaluated,
        coverage.ratio() * 100.0
    );
    for (asset, missing) in &coverage.dropped {
        println!("  dropped {asset}: undefined {}", missing.join(", "));
    }
}

struct RunArgs {
    data_dir: PathBuf,
    config: Option<PathBuf>,
    universe: Option<PathBuf>,
    start: Option<String>,
    end: Option<String>,
    rebalance: Option<RebalanceFrequency>,
    window: Option<u64>,
}

/// Load the data, run the backtest, and print the report.
fn run_backtest(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BacktestConfig::from_path(path)?,
        None => BacktestConfig::default(),
    };
    if let Some(rebalance) = args.rebalance {
        config.rebalance_frequency = rebalance;
    }
    if let Some(window) = args.window {
        config.window_days = window;
    }

    let source = CsvDirectorySource::new(&args.data_dir);
    let mut tickers = match &args.universe {
        Some(path) => ConstituentTable::new(path).load_universe()?.tickers,
        None => source.available_tickers()?,
    };
    if let Some(benchmark) = &config.benchmark
        && !tickers.contains(benchmark)
    {
        tickers.push(benchmark.clone());
    }

    let start = args.start.as_deref().map(parse_date).transpose()?;
    let end = args.end.as_deref().map(parse_date).transpose()?;
    let request = FetchRequest::new(
        tickers,
        start.unwrap_or(NaiveDate::MIN),
        end.unwrap_or(NaiveDate::MAX),
    );
    let prices = source.fetch(&request)?;
    if prices.is_empty() {
        return Err(BacktestError::EmptySeries(format!(
            "no price data in {}",
            args.data_dir.display()
        )));
    }

    let result = Backtester::new(config.clone()).run(&prices, &LinearFactorModel::default())?;
    if result.is_empty() {
        return Err(BacktestError::EmptySeries(
            "backtest produced no portfolio returns".to_string(),
        ));
    }

    let benchmark_name = config.benchmark.as_deref();
    let returns = prices.returns_table(benchmark_name)?;
    let benchmark = benchmark_returns(&prices, benchmark_name)?
        .unwrap_or_else(|| equal_weight_returns(&returns));

    let on_backtest_dates = |series: ReturnSeries| -> ReturnSeries {
        series
            .iter()
            .filter(|(date, _)| result.returns.contains(*date))
            .collect()
    };
    let equal_weight = on_backtest_dates(equal_weight_returns(&returns));
    let market_cap = on_backtest_dates(market_cap_weight_returns(&prices, benchmark_name)?);

    let evaluate = |series: &ReturnSeries| -> Result<PerformanceSummary> {
        Ok(PerformanceEvaluator::aligned(series, &benchmark, config.risk_free_rate)?.summary())
    };

    print_summary("Factor Model Portfolio Performance", &evaluate(&result.returns)?);
    println!("Portfolio Turnover: {:.2}%\n", turnover(&result.weights) * 100.0);
    print_summary("Equal-Weight Portfolio Performance", &evaluate(&equal_weight)?);
    print_summary("Market-Cap-Weight Portfolio Performance", &evaluate(&market_cap)?);

    if let Some(snapshot) = result.last_snapshot() {
        let attribution =
            factor_attribution(&snapshot.factor_returns, &snapshot.exposures, &result.returns);
        println!("Factor Attribution (window ending {}):", snapshot.date);
        match attribution.fractions() {
            Some(fractions) => {
                for (name, fraction) in fractions {
                    println!("  {name:<18} {:>9.2}%", fraction * 100.0);
                }
            }
            None => println!("  portfolio returns sum to zero, attribution undefined"),
        }
    }

    if result.truncated {
        println!("\nBacktest stopped early; results cover the completed rebalances only.");
    }
    Ok(())
}

/// Daily returns of the benchmark symbol, if one is configured and present.
fn benchmark_returns(prices: &PriceFrame, benchmark: Option<&str>) -> Result<Option<ReturnSeries>> {
    let Some(symbol) = benchmark else {
        return Ok(None);
    };
    let series = prices
        .select_symbols(&[symbol.to_string()])?
        .returns_table(None)?
        .asset(symbol);
    if series.is_empty() {
        tracing::warn!(benchmark = symbol, "no benchmark data, comparing against equal weight");
        return Ok(None);
    }
    Ok(Some(series))
}

fn print_summary(title: &str, summary: &PerformanceSummary) {
    println!("{title}:");
    println!("{summary}");
}
