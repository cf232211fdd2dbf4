//! Moving averages and MACD.
//!
//! All series are aligned with their input: element `i` is the value at
//! input index `i`, `None` until enough history exists.

/// Simple moving average over `window` values.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    values
        .iter()
        .enumerate()
        .scan(0.0_f64, move |sum, (i, &v)| {
            *sum += v;
            if i >= window {
                *sum -= values[i - window];
            }

            let out = if i + 1 >= window {
                Some(*sum / window as f64)
            } else {
                None
            };

            Some(out)
        })
        .collect()
}

/// Exponential moving average with smoothing factor `2 / (window + 1)`.
///
/// Seeded with the simple average of the first `window` values, so the first
/// defined element is at index `window - 1`.
pub fn ema(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let alpha = 2.0 / (window as f64 + 1.0);
    let seed = values[..window].iter().sum::<f64>() / window as f64;
    out[window - 1] = Some(seed);

    let mut prev = seed;
    for (i, &v) in values.iter().enumerate().skip(window) {
        prev = alpha * v + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }

    out
}

/// EMA over a series whose leading elements may be undefined.
///
/// The EMA starts at the first defined element. A gap after that point
/// leaves the remainder undefined.
pub fn ema_defined(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];

    let Some(start) = series.iter().position(Option::is_some) else {
        return out;
    };

    let defined: Vec<f64> = series[start..].iter().map_while(|v| *v).collect();
    for (offset, value) in ema(&defined, window).into_iter().enumerate() {
        out[start + offset] = value;
    }

    out
}

/// MACD components, aligned with the closing-price input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    /// EMA(12) − EMA(26)
    pub dif: Vec<Option<f64>>,
    /// EMA(9) of DIF (the "MACD" line on Taiwanese sites)
    pub signal: Vec<Option<f64>>,
    /// (DIF − signal) × 2
    pub osc: Vec<Option<f64>>,
}

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Standard 12/26/9 MACD.
pub fn macd(closes: &[f64]) -> MacdSeries {
    let fast = ema(closes, MACD_FAST);
    let slow = ema(closes, MACD_SLOW);

    let dif: Vec<Option<f64>> = fast
        .iter()
        .zip(slow.iter())
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let signal = ema_defined(&dif, MACD_SIGNAL);

    let osc = dif
        .iter()
        .zip(signal.iter())
        .map(|(d, s)| Some(((*d)? - (*s)?) * 2.0))
        .collect();

    MacdSeries { dif, signal, osc }
}
