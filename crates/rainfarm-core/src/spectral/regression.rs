//! Ordinary least squares on paired samples.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub points: usize,
}

/// Fit `y = slope * x + intercept`.
///
/// Returns `None` with fewer than two points or when all `x` are equal.
pub fn least_squares(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let (sxy, sxx) = x[..n]
        .iter()
        .zip(&y[..n])
        .fold((0.0, 0.0), |(sxy, sxx), (xi, yi)| {
            let dx = xi - mean_x;
            (sxy + dx * (yi - mean_y), sxx + dx * dx)
        });
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
        points: n,
    })
}

/// Fit a power law `y = c * x^slope` in log-log space.
///
/// Every sample must be strictly positive.
pub fn power_law(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.iter().chain(y).any(|&v| v <= 0.0 || !v.is_finite()) {
        return None;
    }
    let lx: Vec<f64> = x.iter().map(|v| v.ln()).collect();
    let ly: Vec<f64> = y.iter().map(|v| v.ln()).collect();
    least_squares(&lx, &ly)
}
