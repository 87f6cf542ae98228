//! File-backed price and universe sources.

mod common;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use common::{scratch_dir, synthetic_prices};
use fd_backtest::{
    ConstituentTable, CsvDirectorySource, FetchRequest, PriceSource, UniverseSource,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_store_then_fetch_window() {
    let dir = scratch_dir("store");
    let prices = synthetic_prices(&["AAPL", "SPY"], 40, 1);
    let source = CsvDirectorySource::new(&dir);
    source.store("AAPL", &prices).unwrap();
    source.store("SPY", &prices).unwrap();

    assert_eq!(source.available_tickers().unwrap(), vec!["AAPL", "SPY"]);

    let request = FetchRequest::new(["AAPL", "SPY"], date(2022, 1, 10), date(2022, 1, 21));
    let fetched = source.fetch(&request).unwrap();

    assert_eq!(fetched.symbols().unwrap(), vec!["AAPL", "SPY"]);
    assert_eq!(
        fetched.date_range().unwrap(),
        Some((date(2022, 1, 10), date(2022, 1, 21)))
    );
    // two weeks of weekdays per symbol
    assert_eq!(fetched.height(), 20);
}

#[test]
fn test_missing_and_malformed_files_are_skipped() {
    let dir = scratch_dir("skip");
    std::fs::write(
        dir.join("GOOD.csv"),
        "timestamp,open,close,volume\n2023-03-01 00:00:00,10,10.5,100\n2023-03-02 00:00:00,10.5,11,120\n",
    )
    .unwrap();
    std::fs::write(dir.join("BAD.csv"), "when,price\nyesterday,ten\n").unwrap();

    let source = CsvDirectorySource::new(&dir);
    let request = FetchRequest::new(["GOOD", "BAD", "MISSING"], date(2023, 1, 1), date(2023, 12, 31));
    let fetched = source.fetch(&request).unwrap();

    assert_eq!(fetched.symbols().unwrap(), vec!["GOOD"]);
    assert_eq!(fetched.height(), 2);
}

#[test]
fn test_limit_and_timespan() {
    let dir = scratch_dir("limit");
    let source = CsvDirectorySource::new(&dir);
    source
        .store("AAPL", &synthetic_prices(&["AAPL"], 30, 2))
        .unwrap();

    let mut request = FetchRequest::new(["AAPL"], date(2022, 1, 1), date(2022, 12, 31));
    request.limit = 7;
    assert_eq!(source.fetch(&request).unwrap().height(), 7);

    request.timespan = "minute".to_string();
    assert!(source.fetch(&request).is_err());
}

#[test]
fn test_constituent_weights_are_renormalized() {
    let dir = scratch_dir("universe");
    let path = dir.join("constituents.csv");
    std::fs::write(
        &path,
        "Company,Symbol,Weight\nApple,AAPL,6.00%\nMicrosoft,MSFT,3.00%\nBroken,XXX,n/a\nNvidia,NVDA,1.00%\n",
    )
    .unwrap();

    let universe = ConstituentTable::new(&path).load_universe().unwrap();

    assert_eq!(universe.tickers, vec!["AAPL", "MSFT", "NVDA"]);
    assert_relative_eq!(universe.weights["AAPL"], 0.6, epsilon = 1e-12);
    assert_relative_eq!(universe.weights["MSFT"], 0.3, epsilon = 1e-12);
    assert_relative_eq!(universe.weights.values().sum::<f64>(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_constituent_custom_columns() {
    let dir = scratch_dir("columns");
    let path = dir.join("index.csv");
    std::fs::write(&path, "ticker,pct\nAAA,50%\nBBB,50%\n").unwrap();

    let missing = ConstituentTable::new(&path).load_universe();
    assert!(missing.is_err());

    let universe = ConstituentTable::new(&path)
        .with_columns("ticker", "pct")
        .load_universe()
        .unwrap();
    assert_eq!(universe.tickers.len(), 2);
    assert_relative_eq!(universe.weights["BBB"], 0.5, epsilon = 1e-12);
}
