//! # Quant
//!
//! $$
//! \sigma_{\text{ann}} = \sigma_d \sqrt{252}
//! $$
//!
use chrono::NaiveDate;
use impl_new_derive::ImplNew;

pub mod portfolio;

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// One daily close reported by a price provider.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
  /// Trading day.
  pub date: NaiveDate,
  /// Close price.
  pub close: f64,
}

/// Round to two decimals, the precision every displayed percentage uses.
pub fn round2(x: f64) -> f64 {
  (x * 100.0).round() / 100.0
}

/// Annualized standard deviation in percent: `sigma_d * sqrt(trading_days) * 100`.
pub fn annualize_std(daily_std: f64, trading_days: f64) -> f64 {
  daily_std * trading_days.sqrt() * 100.0
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round2_keeps_two_decimals() {
    assert_eq!(round2(12.3456), 12.35);
    assert_eq!(round2(-0.004), -0.0);
    assert_eq!(round2(7.0), 7.0);
  }

  #[test]
  fn annualize_std_scales_by_root_trading_days() {
    let daily = 0.01;
    let expected = 0.01 * 252.0_f64.sqrt() * 100.0;
    assert!((annualize_std(daily, TRADING_DAYS) - expected).abs() < 1e-12);
  }
}
