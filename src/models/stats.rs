use serde::Serialize;

/// Readings further than this many standard deviations from the mean are anomalous
pub const SIGMA_BAND: f64 = 2.0;

/// Min, max and mean of a window's power output
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl PowerStats {
    /// `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &value in values {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }

        Some(Self {
            count: values.len(),
            min,
            max,
            mean: sum / values.len() as f64,
        })
    }
}

/// Sample standard deviation (`n - 1` denominator); undefined below two values.
pub fn sample_std_dev(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Outlier {
    /// Position in the input slice
    pub index: usize,
    pub value: f64,
    /// `value - mean`
    pub deviation: f64,
}

/// Values strictly outside `mean ± 2σ`.
///
/// Returns nothing when σ is undefined or zero.
pub fn two_sigma_outliers(values: &[f64]) -> Vec<Outlier> {
    let Some(stats) = PowerStats::from_values(values) else {
        return Vec::new();
    };
    let sigma = match sample_std_dev(values, stats.mean) {
        Some(sigma) if sigma > 0.0 && sigma.is_finite() => sigma,
        _ => return Vec::new(),
    };

    let upper = stats.mean + SIGMA_BAND * sigma;
    let lower = stats.mean - SIGMA_BAND * sigma;

    values
        .iter()
        .enumerate()
        .filter(|(_, &value)| value > upper || value < lower)
        .map(|(index, &value)| Outlier {
            index,
            value,
            deviation: value - stats.mean,
        })
        .collect()
}
