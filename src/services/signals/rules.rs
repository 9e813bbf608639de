//! Rule-based signal evaluation for a single feature row.

use crate::types::{Action, FeatureRow, Signal};

const NEAR_EMA_THRESHOLD: f64 = 0.01;
const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

const LONG_ENTRY_FACTOR: f64 = 1.01;
const LONG_STOP_FACTOR: f64 = 0.985;
const SHORT_ENTRY_FACTOR: f64 = 0.99;
const SHORT_STOP_FACTOR: f64 = 1.015;

/// NaN and infinities count as missing.
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn satisfies(value: Option<f64>, check: impl Fn(f64) -> bool) -> bool {
    value.map_or(false, check)
}

/// Evaluate the strategy rules on one row.
///
/// Long requires price above a nearby EMA7 with positive MACD momentum,
/// RSI below 70 and above-average volume. Short requires price below EMA7
/// with negative MACD momentum and RSI above 30. Long wins when both could
/// apply, which cannot happen since they need opposite sides of EMA7.
pub fn evaluate_signal(row: &FeatureRow) -> Signal {
    let (price, ema7) = match (finite(Some(row.price)), finite(row.ema7)) {
        (Some(price), Some(ema7)) if ema7 != 0.0 => (price, ema7),
        _ => return Signal::wait(),
    };

    let macd_hist = finite(row.macd_hist);
    let macd_line = finite(row.macd_line);
    let rsi6 = finite(row.rsi6);
    let volume = finite(Some(row.volume));
    let ma5_volume = finite(row.ma5_volume);

    let near_ema = (price - ema7) / ema7 < NEAR_EMA_THRESHOLD;
    let macd_long_ok = satisfies(macd_hist, |v| v > 0.0) || satisfies(macd_line, |v| v > 0.0);
    let macd_short_ok = satisfies(macd_hist, |v| v < 0.0) || satisfies(macd_line, |v| v < 0.0);
    let volume_ok = matches!((volume, ma5_volume), (Some(v), Some(ma)) if v > ma);
    let rsi_long_ok = satisfies(rsi6, |v| v < RSI_OVERBOUGHT);
    let rsi_short_ok = satisfies(rsi6, |v| v > RSI_OVERSOLD);

    let is_long = price > ema7 && macd_long_ok && rsi_long_ok && volume_ok && near_ema;
    let is_short = price < ema7 && macd_short_ok && rsi_short_ok;

    if is_long {
        let entry = ema7 * LONG_ENTRY_FACTOR;
        let stop_loss = ema7 * LONG_STOP_FACTOR;
        let target = finite(row.nearest_resistance);
        let rr_ratio = target
            .filter(|&t| entry > stop_loss && t > entry)
            .map(|t| (t - entry) / (entry - stop_loss));

        return Signal {
            action: Action::Long,
            entry: Some(entry),
            stop_loss: Some(stop_loss),
            target,
            rr_ratio,
        };
    }

    if is_short {
        let entry = ema7 * SHORT_ENTRY_FACTOR;
        let stop_loss = ema7 * SHORT_STOP_FACTOR;
        let target = finite(row.nearest_support);
        let rr_ratio = target
            .filter(|&t| stop_loss > entry && entry > t)
            .map(|t| (entry - t) / (stop_loss - entry));

        return Signal {
            action: Action::Short,
            entry: Some(entry),
            stop_loss: Some(stop_loss),
            target,
            rr_ratio,
        };
    }

    Signal::wait()
}
