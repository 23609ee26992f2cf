use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::Local;
use chrono::NaiveDate;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use folio_rs::market::csv::CsvPriceSource;
use folio_rs::market::InMemoryTickerDirectory;
use folio_rs::market::PriceSource;
use folio_rs::market::TickerDirectory;
use folio_rs::market::TickerListing;
use folio_rs::quant::portfolio::AnalysisContext;
use folio_rs::quant::portfolio::PortfolioEngine;
use folio_rs::quant::portfolio::PortfolioEngineConfig;
use prettytable::row;
use prettytable::Table;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Watchlist analytics: minimum-variance portfolios, risk and savings goals")]
#[command(version)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Args)]
struct Window {
  /// Directory holding one `<SYMBOL>.csv` (date,close) per ticker
  #[arg(short, long)]
  data_dir: PathBuf,

  /// Start date (YYYY-MM-DD), inclusive
  #[arg(short, long, value_parser = parse_date)]
  start: NaiveDate,

  /// End date (YYYY-MM-DD), exclusive; defaults to today
  #[arg(short, long, value_parser = parse_date)]
  end: Option<NaiveDate>,

  /// Read closes from Yahoo Finance instead of the data directory
  #[cfg(feature = "yahoo")]
  #[arg(long)]
  yahoo: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Minimum-variance weights, risk and benchmark comparison
  Optimize {
    #[command(flatten)]
    window: Window,

    /// Comma separated tickers
    #[arg(short, long, value_delimiter = ',', required = true)]
    tickers: Vec<String>,

    /// Benchmark symbol
    #[arg(short, long, default_value = "^GSPC")]
    benchmark: String,

    /// Cumulative rows to print from the end of the comparison
    #[arg(long, default_value = "10")]
    tail: usize,
  },

  /// Projected value of dollar allocations against a goal
  Goal {
    #[command(flatten)]
    window: Window,

    /// Extra comma separated tickers to load; allocated tickers are always loaded
    #[arg(short, long, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Allocation as TICKER=AMOUNT, repeatable
    #[arg(short, long = "alloc", value_parser = parse_allocation, required = true)]
    allocations: Vec<(String, f64)>,

    /// Target portfolio value
    #[arg(short, long)]
    goal: f64,
  },

  /// Watchlist card and pricing figures for one ticker
  Details {
    #[command(flatten)]
    window: Window,

    /// Ticker symbol
    #[arg(short, long)]
    ticker: String,
  },

  /// Search a `symbol,name` listings file
  Search {
    /// Listings file
    #[arg(short, long)]
    listings: PathBuf,

    /// Text to look for in "SYMBOL - Name"
    query: String,
  },
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date {s:?}: {e}"))
}

fn parse_allocation(s: &str) -> std::result::Result<(String, f64), String> {
  let (ticker, amount) = s
    .split_once('=')
    .ok_or_else(|| format!("expected TICKER=AMOUNT, got {s:?}"))?;
  let amount = amount
    .trim()
    .parse::<f64>()
    .map_err(|e| format!("invalid amount in {s:?}: {e}"))?;
  Ok((ticker.trim().to_string(), amount))
}

fn price_source(window: &Window) -> Result<Box<dyn PriceSource>> {
  #[cfg(feature = "yahoo")]
  if window.yahoo {
    return Ok(Box::new(folio_rs::market::yahoo::YahooPriceSource::new()?));
  }
  Ok(Box::new(CsvPriceSource::new(&window.data_dir)))
}

fn end_date(window: &Window) -> NaiveDate {
  window.end.unwrap_or_else(|| Local::now().date_naive())
}

fn read_listings(path: &Path) -> Result<Vec<TickerListing>> {
  let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
  let mut listings = Vec::new();
  for line in BufReader::new(file).lines() {
    let line = line?;
    if let Some((symbol, name)) = line.split_once(',') {
      listings.push(TickerListing {
        symbol: symbol.trim().to_string(),
        name: name.trim().to_string(),
      });
    }
  }
  Ok(listings)
}

fn optimize(window: &Window, tickers: &[String], benchmark: String, tail: usize) -> Result<()> {
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    benchmark,
    ..PortfolioEngineConfig::default()
  });
  let ctx = AnalysisContext::new(tickers.iter().cloned(), window.start, end_date(window))?;
  let source = price_source(window)?;
  let report = engine.compute_optimal_portfolio(&source.as_ref(), &ctx)?;

  if report.alignment.is_reduced() {
    println!(
      "Note: {} ticker(s) without data {:?}, {} date(s) dropped by alignment",
      report.alignment.missing_tickers.len(),
      report.alignment.missing_tickers,
      report.alignment.dropped_rows
    );
  }

  let mut table = Table::new();
  table.add_row(row!["Ticker", "Optimal weight", "Risk (ann. %)"]);
  for (ticker, weight) in report.weights.iter() {
    let risk = report.risk.ticker(ticker).unwrap_or(f64::NAN);
    table.add_row(row![ticker, format!("{:.4}", weight), format!("{:.2}", risk)]);
  }
  table.add_row(row!["Portfolio", "1.0000", format!("{:.2}", report.risk.portfolio)]);
  table.add_row(row![
    engine.config().benchmark,
    "-",
    format!("{:.2}", report.risk.benchmark)
  ]);
  table.printstd();

  let mut composition = Table::new();
  composition.add_row(row!["Ticker", "Composition by latest price (%)"]);
  for (ticker, pct) in &report.composition.entries {
    composition.add_row(row![ticker, format!("{:.2}", pct)]);
  }
  composition.printstd();

  let mut cumulative = Table::new();
  cumulative.add_row(row!["Date", "Portfolio", "Benchmark"]);
  let fmt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.4}", v));
  let skip = report.cumulative.len().saturating_sub(tail);
  for point in &report.cumulative[skip..] {
    cumulative.add_row(row![point.date, fmt(point.portfolio), fmt(point.benchmark)]);
  }
  cumulative.printstd();

  Ok(())
}

fn goal(
  window: &Window,
  tickers: &[String],
  allocations: &[(String, f64)],
  goal: f64,
) -> Result<()> {
  let engine = PortfolioEngine::default();
  let allocations: BTreeMap<String, f64> = allocations.iter().cloned().collect();
  let selection = tickers.iter().chain(allocations.keys()).cloned();
  let ctx = AnalysisContext::new(selection, window.start, end_date(window))?;
  let source = price_source(window)?;

  let series = engine.load_return_series(&source.as_ref(), &ctx)?;
  let projection = engine.compute_goal_projection(&allocations, &series, goal)?;

  println!("Total investment: {:.2}", projection.total_invested);
  match projection.reached_date {
    Some(date) => println!("Goal {:.2} reached on {}", goal, date),
    None => println!("Goal {:.2} is not reached in this window", goal),
  }
  if let Some((date, value)) = projection.series.last() {
    println!("Value on {}: {:.2}", date, value);
  }

  Ok(())
}

fn details(window: &Window, ticker: &str) -> Result<()> {
  let engine = PortfolioEngine::default();
  let today = Local::now().date_naive();
  let ctx = AnalysisContext::single_as_of(ticker, window.start, end_date(window), today)?;
  let source = price_source(window)?;
  let (snapshot, summary) = engine.ticker_details(&source.as_ref(), &ctx)?;

  let mut table = Table::new();
  table.add_row(row!["50-Day Average", snapshot.fifty_day_average]);
  table.add_row(row!["1 Year Low", snapshot.year_low]);
  table.add_row(row!["1 Year High", snapshot.year_high]);
  table.add_row(row!["Annual Return (%)", format!("{:.2}", summary.annual_return)]);
  table.add_row(row!["Standard Deviation (%)", format!("{:.2}", summary.volatility)]);
  table.add_row(row!["Risk Adjusted Return", format!("{:.2}", summary.risk_adjusted)]);
  table.printstd();

  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  match cli.command {
    Commands::Optimize {
      window,
      tickers,
      benchmark,
      tail,
    } => optimize(&window, &tickers, benchmark, tail),
    Commands::Goal {
      window,
      tickers,
      allocations,
      goal: target,
    } => goal(&window, &tickers, &allocations, target),
    Commands::Details { window, ticker } => details(&window, &ticker),
    Commands::Search { listings, query } => {
      let directory = InMemoryTickerDirectory::new(read_listings(&listings)?);
      for listing in directory.search(&query) {
        println!("{}", listing.label());
      }
      Ok(())
    }
  }
}
