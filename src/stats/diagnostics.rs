//! # Diagnostics
//!
//! $$
//! 2\kappa\theta-\sigma^2\ge 0,\qquad
//! \mathrm{RMSE}=\sqrt{\tfrac1n\textstyle\sum_i(a_i-s_i)^2},\qquad
//! \mathrm{MAE}=\tfrac1n\textstyle\sum_i|a_i-s_i|
//! $$
//!
use crate::error::ensure_input;
use crate::error::CirError;
use crate::error::Result;
use crate::params::CirParams;
use crate::stochastic::monte_carlo::MonteCarloEnsemble;

/// Feller condition. Returns `(is_stable, 2·kappa·theta − sigma²)`; the boundary counts as stable.
pub fn feller(params: &CirParams) -> (bool, f64) {
  let margin = params.feller_margin();
  (margin >= 0.0, margin)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitMetrics {
  pub rmse: f64,
  pub mae: f64,
}

fn check_lengths(actual: usize, other: usize) -> Result<()> {
  if actual != other {
    return Err(CirError::DimensionMismatch {
      expected: actual,
      found: other,
    });
  }
  ensure_input!(actual > 0, "fit metrics need at least one observation");
  Ok(())
}

/// Root-mean-squared and mean-absolute error of `simulated` against `actual`.
pub fn fit_metrics(actual: &[f64], simulated: &[f64]) -> Result<FitMetrics> {
  check_lengths(actual.len(), simulated.len())?;
  let n = actual.len() as f64;

  let (sq, abs) = actual
    .iter()
    .zip(simulated.iter())
    .fold((0.0, 0.0), |(sq, abs), (a, s)| {
      let d = a - s;
      (sq + d * d, abs + d.abs())
    });

  Ok(FitMetrics {
    rmse: (sq / n).sqrt(),
    mae: abs / n,
  })
}

/// Fraction of `actual[t]` inside the ensemble envelope `[lower_t, upper_t]`.
pub fn envelope_coverage(actual: &[f64], ensemble: &MonteCarloEnsemble) -> Result<f64> {
  check_lengths(ensemble.summary.len(), actual.len())?;

  let inside = actual
    .iter()
    .zip(ensemble.summary.iter())
    .filter(|(a, row)| row.lower <= **a && **a <= row.upper)
    .count();

  Ok(inside as f64 / actual.len() as f64)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;
  use crate::stochastic::monte_carlo::monte_carlo;

  #[test]
  fn feller_boundary_is_stable() {
    assert_eq!(feller(&CirParams::new(1.0, 0.5, 1.0)), (true, 0.0));
    let (ok, margin) = feller(&CirParams::new(2.0, 20.0, 1.0));
    assert!(ok);
    assert_eq!(margin, 79.0);
    let (ok, margin) = feller(&CirParams::new(0.5, 0.02, 1.5));
    assert!(!ok);
    assert!(margin < 0.0);
  }

  #[test]
  fn identical_series_have_zero_error() {
    let x = [0.03, 0.031, 0.0, 2.5];
    assert_eq!(fit_metrics(&x, &x).unwrap(), FitMetrics { rmse: 0.0, mae: 0.0 });
  }

  #[test]
  fn metrics_match_hand_computation() {
    let m = fit_metrics(&[1.0, 2.0, 3.0, 4.0], &[2.0, 2.0, 1.0, 4.0]).unwrap();
    assert_relative_eq!(m.mae, 0.75, epsilon = 1e-15);
    assert_relative_eq!(m.rmse, (5.0_f64 / 4.0).sqrt(), epsilon = 1e-15);
    assert!(m.rmse >= m.mae);
  }

  #[test]
  fn mismatched_or_empty_inputs_are_errors() {
    assert_eq!(
      fit_metrics(&[1.0, 2.0], &[1.0]).unwrap_err(),
      CirError::DimensionMismatch {
        expected: 2,
        found: 1
      }
    );
    assert!(matches!(
      fit_metrics(&[], &[]),
      Err(CirError::InvalidInput(_))
    ));
  }

  #[test]
  fn coverage_counts_points_inside_band() {
    let mc = monte_carlo(CirParams::new(1.0, 10.0, 0.5), 0.01, 4, 10.0, 50, 8).unwrap();
    let means: Vec<f64> = mc.means().to_vec();
    assert_eq!(envelope_coverage(&means, &mc).unwrap(), 1.0);

    let mut off = means.clone();
    off[3] = 1e6;
    off[4] = -1e6;
    assert_relative_eq!(envelope_coverage(&off, &mc).unwrap(), 0.6, epsilon = 1e-15);

    assert!(matches!(
      envelope_coverage(&means[..3], &mc),
      Err(CirError::DimensionMismatch { .. })
    ));
  }
}
