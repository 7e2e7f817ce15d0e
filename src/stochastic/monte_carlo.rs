//! # Monte Carlo Ensemble
//!
//! $$
//! \bar r_t=\frac1M\sum_{j=1}^{M} r^{(j)}_t,\quad
//! s_t^2=\frac{1}{M-1}\sum_{j=1}^{M}\left(r^{(j)}_t-\bar r_t\right)^2,\quad
//! [\bar r_t-1.96\,s_t,\ \bar r_t+1.96\,s_t]
//! $$
//!
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::ensure_input;
use crate::error::Result;
use crate::params::CirParams;
use crate::stochastic::cir::SimulatedPath;
use crate::stochastic::cir::CIR;
use crate::traits::ProcessExt;

/// Normal quantile of the symmetric 95% envelope.
pub const ENVELOPE_Z: f64 = 1.96;

/// Cross-sectional statistics of the ensemble at one time step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SummaryRow {
  pub mean: f64,
  /// Sample standard deviation (divisor `M - 1`; zero for a single path).
  pub sd: f64,
  pub lower: f64,
  pub upper: f64,
}

#[derive(Clone, Debug)]
pub struct MonteCarloEnsemble {
  pub params: CirParams,
  pub dt: f64,
  pub n: usize,
  pub r0: f64,
  pub master_seed: u64,
  /// Paths in run order; path `j` was seeded with `derive_seed(master_seed, j)`.
  pub paths: Vec<SimulatedPath>,
  /// One row per time step `t = 0..=n`.
  pub summary: Vec<SummaryRow>,
}

impl MonteCarloEnsemble {
  pub fn m(&self) -> usize {
    self.paths.len()
  }

  /// `M x (n + 1)` matrix, one path per row.
  pub fn path_matrix(&self) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((self.paths.len(), self.n + 1));
    for (mut row, path) in out.axis_iter_mut(Axis(0)).zip(self.paths.iter()) {
      row.assign(&path.values);
    }
    out
  }

  /// Values of every path at the horizon.
  pub fn terminal_values(&self) -> Array1<f64> {
    self.paths.iter().map(|p| p.values[self.n]).collect()
  }

  pub fn means(&self) -> Array1<f64> {
    self.summary.iter().map(|row| row.mean).collect()
  }
}

fn summarize(matrix: &Array2<f64>) -> Vec<SummaryRow> {
  let m = matrix.nrows();
  let ddof = if m > 1 { 1.0 } else { 0.0 };
  let sds = matrix.var_axis(Axis(0), ddof).mapv(f64::sqrt);

  matrix
    .axis_iter(Axis(1))
    .zip(sds.iter())
    .map(|(column, &sd): (ArrayView1<f64>, &f64)| {
      let mean = column.iter().mean();
      SummaryRow {
        mean,
        sd,
        lower: mean - ENVELOPE_Z * sd,
        upper: mean + ENVELOPE_Z * sd,
      }
    })
    .collect()
}

/// Simulate `m` independent paths in parallel and summarize them per time step.
pub fn monte_carlo(
  params: CirParams,
  dt: f64,
  n: usize,
  r0: f64,
  m: usize,
  master_seed: u64,
) -> Result<MonteCarloEnsemble> {
  ensure_input!(m >= 1, "path count must be >= 1");
  let cir = CIR::new(params, dt, n, r0)?;

  debug!(m, n, dt, master_seed, "simulating CIR ensemble");
  let paths = cir.sample_par(m, master_seed);

  let mut ensemble = MonteCarloEnsemble {
    params,
    dt,
    n,
    r0,
    master_seed,
    paths,
    summary: Vec::new(),
  };
  ensemble.summary = summarize(&ensemble.path_matrix());

  Ok(ensemble)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use tracing_test::traced_test;

  use super::*;
  use crate::error::CirError;
  use crate::stochastic::cir::simulate;
  use crate::traits::derive_seed;

  #[test]
  fn first_row_is_degenerate_at_r0() {
    let mc = monte_carlo(CirParams::new(1.0, 10.0, 0.5), 1.0 / 252.0, 504, 10.0, 40, 2024).unwrap();
    assert_eq!(mc.summary.len(), 505);
    assert_eq!(
      mc.summary[0],
      SummaryRow {
        mean: 10.0,
        sd: 0.0,
        lower: 10.0,
        upper: 10.0
      }
    );
  }

  #[test]
  fn first_row_exact_for_any_r0_and_m() {
    for (r0, m) in [(0.1, 3), (0.037, 17), (5.3, 1)] {
      let mc = monte_carlo(CirParams::new(0.7, 0.05, 0.1), 0.01, 5, r0, m, 1).unwrap();
      assert_eq!(mc.summary[0].mean, r0);
      assert_eq!(mc.summary[0].sd, 0.0);
    }
  }

  #[test]
  fn single_path_has_zero_spread() {
    let mc = monte_carlo(CirParams::new(1.0, 10.0, 0.5), 0.01, 50, 10.0, 1, 3).unwrap();
    assert!(mc.summary.iter().all(|row| row.sd == 0.0 && row.lower == row.upper));
    assert_eq!(mc.means(), mc.paths[0].values);
  }

  #[test]
  fn runs_use_derived_seeds_and_match_simulate() {
    let p = CirParams::new(1.0, 10.0, 0.5);
    let mc = monte_carlo(p, 0.01, 30, 10.0, 8, 77).unwrap();
    for (j, path) in mc.paths.iter().enumerate() {
      assert_eq!(path.seed, derive_seed(77, j));
      assert_eq!(path.values, simulate(p, 0.01, 30, 10.0, path.seed).unwrap().values);
    }
  }

  #[test]
  fn ensemble_is_reproducible_from_master_seed() {
    let p = CirParams::new(2.0, 20.0, 1.0);
    let a = monte_carlo(p, 0.01, 100, 20.0, 25, 5).unwrap();
    let b = monte_carlo(p, 0.01, 100, 20.0, 25, 5).unwrap();
    assert_eq!(a.path_matrix(), b.path_matrix());
    assert_eq!(a.summary, b.summary);
  }

  #[test]
  fn summary_matches_column_statistics() {
    let mc = monte_carlo(CirParams::new(2.0, 20.0, 1.0), 0.1, 20, 15.0, 30, 11).unwrap();
    let matrix = mc.path_matrix();
    for t in [1, 10, 20] {
      let col: Vec<f64> = matrix.column(t).to_vec();
      let mean = col.iter().sum::<f64>() / 30.0;
      let var = col.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 29.0;
      let row = mc.summary[t];
      assert_relative_eq!(row.mean, mean, max_relative = 1e-12);
      assert_relative_eq!(row.sd, var.sqrt(), max_relative = 1e-9);
      assert_relative_eq!(row.upper - row.mean, ENVELOPE_Z * row.sd, max_relative = 1e-12);
      assert!(row.lower <= row.mean && row.mean <= row.upper);
    }
    assert_eq!(mc.terminal_values().len(), 30);
  }

  #[test]
  fn mean_reverts_towards_theta() {
    let mc = monte_carlo(CirParams::new(2.0, 20.0, 1.0), 0.05, 200, 10.0, 200, 9).unwrap();
    let last = mc.summary[200];
    assert!((last.mean - 20.0).abs() < 1.0, "terminal mean {}", last.mean);
  }

  #[test]
  fn rejects_empty_ensemble_and_bad_params() {
    let p = CirParams::new(1.0, 10.0, 0.5);
    assert!(matches!(
      monte_carlo(p, 0.01, 10, 10.0, 0, 1),
      Err(CirError::InvalidInput(_))
    ));
    assert!(monte_carlo(CirParams::new(1.0, -10.0, 0.5), 0.01, 10, 10.0, 5, 1).is_err());
  }

  #[test]
  #[traced_test]
  fn logs_ensemble_size() {
    monte_carlo(CirParams::new(1.0, 10.0, 0.5), 0.01, 10, 10.0, 4, 1).unwrap();
    assert!(logs_contain("simulating CIR ensemble"));
  }
}
