use serde::Serialize;

use calq_core::{CalcError, CalcResult};

/// Descriptive statistics of a data set. Variance is the population
/// variance (divides by `n`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub mean: f64,
    pub variance: f64,
    pub standard_deviation: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub median: f64,
}

pub fn summarize(data: &[f64]) -> CalcResult<Summary> {
    if data.is_empty() {
        return Err(CalcError::Evaluation("no data to summarize".into()));
    }
    if let Some(bad) = data.iter().find(|v| !v.is_finite()) {
        return Err(CalcError::Evaluation(format!("data value {bad} is not finite")));
    }

    let (mean, variance) = moments(data);
    if !mean.is_finite() || !variance.is_finite() {
        return Err(CalcError::Evaluation(
            "statistics overflow the floating point range".into(),
        ));
    }

    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        sorted[mid - 1] / 2.0 + sorted[mid] / 2.0
    } else {
        sorted[mid]
    };

    Ok(Summary {
        mean,
        variance,
        standard_deviation: variance.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        count: data.len(),
        median,
    })
}

/// Mean and population variance by Welford's update, run on values scaled
/// by a power of two so intermediate sums stay in range. Power-of-two
/// scaling is exact, so small data gives the same bits as the plain sums.
fn moments(data: &[f64]) -> (f64, f64) {
    let largest = data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let scale = if largest > 0.0 {
        2f64.powi(largest.log2().floor() as i32)
    } else {
        1.0
    };
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (k, v) in data.iter().enumerate() {
        let x = v / scale;
        let delta = x - mean;
        mean += delta / (k + 1) as f64;
        m2 += delta * (x - mean);
    }
    let variance = m2 / data.len() as f64;
    (mean * scale, variance * scale * scale)
}
