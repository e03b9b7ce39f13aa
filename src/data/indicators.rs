//! Pure indicator functions over ordered bar windows.
//!
//! Every function takes the full available window (oldest first) and
//! returns `None` while the input is shorter than the warm-up length.
//! Correctness is defined by these batch formulas; the buffer recomputes
//! from the tail window instead of keeping running accumulators.

use super::bar_buffer::Bar;

/// Simple moving average of the last `n` values.
pub fn sma(values: &[f64], n: usize) -> Option<f64> {
    if n == 0 || values.len() < n {
        return None;
    }
    let tail = &values[values.len() - n..];
    Some(tail.iter().sum::<f64>() / n as f64)
}

/// Exponential moving average, seeded with the SMA of the first `n`
/// values and then smoothed with alpha = 2 / (n + 1) over the rest.
pub fn ema(values: &[f64], n: usize) -> Option<f64> {
    if n == 0 || values.len() < n {
        return None;
    }
    let alpha = 2.0 / (n as f64 + 1.0);
    let mut acc = values[..n].iter().sum::<f64>() / n as f64;
    for v in &values[n..] {
        acc = alpha * v + (1.0 - alpha) * acc;
    }
    Some(acc)
}

/// Relative Strength Index with Wilder smoothing of gains and losses.
pub fn rsi(closes: &[f64], n: usize) -> Option<f64> {
    if n == 0 || closes.len() < n + 1 {
        return None;
    }
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = deltas[..n].iter().filter(|d| **d > 0.0).sum::<f64>() / n as f64;
    let mut avg_loss = deltas[..n].iter().filter(|d| **d < 0.0).map(|d| -d).sum::<f64>() / n as f64;

    for d in &deltas[n..] {
        let gain = if *d > 0.0 { *d } else { 0.0 };
        let loss = if *d < 0.0 { -d } else { 0.0 };
        avg_gain = (avg_gain * (n as f64 - 1.0) + gain) / n as f64;
        avg_loss = (avg_loss * (n as f64 - 1.0) + loss) / n as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    let hl = bar.high - bar.low;
    let hc = (bar.high - prev_close).abs();
    let lc = (bar.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Average True Range with Wilder smoothing.
pub fn atr(bars: &[Bar], n: usize) -> Option<f64> {
    if n == 0 || bars.len() < n + 1 {
        return None;
    }
    let trs: Vec<f64> = bars
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();

    let mut acc = trs[..n].iter().sum::<f64>() / n as f64;
    for tr in &trs[n..] {
        acc = (acc * (n as f64 - 1.0) + tr) / n as f64;
    }
    Some(acc)
}

/// Sample standard deviation of the simple returns over the last `n`
/// periods (needs `n + 1` closes).
pub fn volatility(closes: &[f64], n: usize) -> Option<f64> {
    if n < 2 || closes.len() < n + 1 {
        return None;
    }
    let tail = &closes[closes.len() - n - 1..];
    let returns: Vec<f64> = tail
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    stddev(&returns)
}

/// Rate of change: `close_t / close_{t-n} - 1`.
pub fn roc(closes: &[f64], n: usize) -> Option<f64> {
    if n == 0 || closes.len() < n + 1 {
        return None;
    }
    let last = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - n];
    if base == 0.0 {
        return None;
    }
    Some(last / base - 1.0)
}

/// Donchian channel: (highest high, lowest low) over the last `n` bars.
pub fn donchian(bars: &[Bar], n: usize) -> Option<(f64, f64)> {
    if n == 0 || bars.len() < n {
        return None;
    }
    let tail = &bars[bars.len() - n..];
    let upper = tail.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let lower = tail.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some((upper, lower))
}

/// Bollinger bands: `(upper, middle, lower)` = SMA(n) +/- k * stddev(n).
pub fn bollinger(closes: &[f64], n: usize, k: f64) -> Option<(f64, f64, f64)> {
    if n < 2 || closes.len() < n {
        return None;
    }
    let middle = sma(closes, n)?;
    let sd = stddev(&closes[closes.len() - n..])?;
    Some((middle + k * sd, middle, middle - k * sd))
}

/// Sample standard deviation (n - 1 denominator) of a slice.
pub fn stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((ss / (values.len() as f64 - 1.0)).sqrt())
}

/// Median of a slice. Used by the breakout strategy for its ATR
/// contraction baseline.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
