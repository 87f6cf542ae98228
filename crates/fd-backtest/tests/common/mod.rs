//! Synthetic price data shared by the integration tests.

#![allow(dead_code, unreachable_pub)]

use chrono::{Datelike, NaiveDate};
use fd_backtest::PriceFrame;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// The first `count` weekdays from `start` on.
pub fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| d.weekday().num_days_from_monday() < 5)
        .take(count)
        .collect()
}

/// Random-walk closes for each symbol over `days` weekdays from 2022-01-03.
pub fn synthetic_prices(symbols: &[&str], days: usize, seed: u64) -> PriceFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let dates = business_days(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(), days);

    let mut rows = Vec::with_capacity(symbols.len() * days);
    for symbol in symbols {
        let mut close: f64 = rng.gen_range(20.0..500.0);
        let volume: f64 = rng.gen_range(1e5..1e7);
        for date in &dates {
            rows.push((symbol.to_string(), *date, close, volume));
            close *= 1.0 + rng.gen_range(-0.03..0.03);
        }
    }
    PriceFrame::from_rows(rows).unwrap()
}

/// Constant closes for each symbol over `days` weekdays.
pub fn flat_prices(symbols: &[&str], days: usize) -> PriceFrame {
    let dates = business_days(NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(), days);
    let rows = symbols
        .iter()
        .flat_map(|symbol| dates.iter().map(move |date| (*symbol, *date, 50.0, 1000.0)));
    PriceFrame::from_rows(rows).unwrap()
}

/// A scratch directory unique to this process and `name`.
pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("fd-backtest-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
