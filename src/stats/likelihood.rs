//! # Euler Quasi-Likelihood
//!
//! $$
//! -\ell(\kappa,\theta,\sigma)=\sum_{i=1}^{n}\left[\tfrac12\ln(2\pi v_i)+\frac{(r_i-r_{i-1}-\mu_i)^2}{2v_i}\right],
//! \quad \mu_i=\kappa(\theta-r_{i-1})\Delta t,\quad v_i=\sigma^2 r_{i-1}^{+}\Delta t+\varepsilon
//! $$
//!
use std::f64::consts::PI;

use crate::params::CirParams;
use crate::series::ObservationSeries;
use crate::traits::ObjectiveExt;

/// Variance floor added to every conditional variance.
pub const VARIANCE_EPS: f64 = 1e-8;
/// Objective value returned in place of a non-finite negative log-likelihood.
pub const PENALTY: f64 = 1e10;

/// Gaussian (Euler) transition likelihood of a CIR process over an observation series.
///
/// Positivity of the parameters is not enforced here; the variance floor and the penalty clamp
/// keep every evaluation finite.
#[derive(Clone, Copy, Debug)]
pub struct CirLikelihood<'a> {
  series: &'a ObservationSeries,
}

impl<'a> CirLikelihood<'a> {
  pub fn new(series: &'a ObservationSeries) -> Self {
    Self { series }
  }

  /// Unclamped sum of per-step terms. May be non-finite.
  pub fn raw_nll(&self, params: &CirParams) -> f64 {
    let dt = self.series.dt();
    self
      .series
      .transitions()
      .map(|(prev, curr)| {
        let (resid, var) = step_moments(params, prev, curr, dt);
        0.5 * (2.0 * PI * var).ln() + resid * resid / (2.0 * var)
      })
      .sum()
  }

  /// Negative log-likelihood, clamped to [`PENALTY`] when non-finite.
  pub fn nll(&self, params: &CirParams) -> f64 {
    let value = self.raw_nll(params);
    if value.is_finite() {
      value
    } else {
      PENALTY
    }
  }

  /// Analytic gradient with respect to `(kappa, theta, sigma)`.
  pub fn nll_gradient(&self, params: &CirParams) -> [f64; 3] {
    let dt = self.series.dt();
    let mut grad = [0.0; 3];

    for (prev, curr) in self.series.transitions() {
      let (resid, var) = step_moments(params, prev, curr, dt);
      // d/dmu and d/dv of the per-step term
      let d_mu = -resid / var;
      let d_var = 0.5 / var - resid * resid / (2.0 * var * var);

      grad[0] += d_mu * (params.theta - prev) * dt;
      grad[1] += d_mu * params.kappa * dt;
      grad[2] += d_var * 2.0 * params.sigma * prev.max(0.0) * dt;
    }

    grad.map(|g| if g.is_finite() { g } else { 0.0 })
  }
}

fn step_moments(params: &CirParams, prev: f64, curr: f64, dt: f64) -> (f64, f64) {
  let mu = params.kappa * (params.theta - prev) * dt;
  let var = params.sigma.powi(2) * prev.max(0.0) * dt + VARIANCE_EPS;
  (curr - prev - mu, var)
}

impl ObjectiveExt for CirLikelihood<'_> {
  fn dim(&self) -> usize {
    3
  }

  fn value(&self, x: &[f64]) -> f64 {
    self.nll(&CirParams::new(x[0], x[1], x[2]))
  }

  fn raw_value(&self, x: &[f64]) -> f64 {
    self.raw_nll(&CirParams::new(x[0], x[1], x[2]))
  }

  fn gradient(&self, x: &[f64]) -> Vec<f64> {
    self.nll_gradient(&CirParams::new(x[0], x[1], x[2])).to_vec()
  }
}

/// Negative log-likelihood of `series` under `params`.
pub fn negative_log_likelihood(series: &ObservationSeries, params: &CirParams) -> f64 {
  CirLikelihood::new(series).nll(params)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  fn series() -> ObservationSeries {
    ObservationSeries::new(vec![0.05, 0.052, 0.049, 0.051, 0.0, 0.003, 0.047], 1.0 / 12.0)
      .unwrap()
  }

  #[test]
  fn matches_hand_computed_single_step() {
    let s = ObservationSeries::new(vec![1.0, 1.5], 0.5).unwrap();
    let p = CirParams::new(2.0, 3.0, 0.4);
    let mu: f64 = 2.0 * (3.0 - 1.0) * 0.5;
    let v = 0.16 * 1.0 * 0.5 + VARIANCE_EPS;
    let expected = 0.5 * (2.0 * PI * v).ln() + (0.5 - mu).powi(2) / (2.0 * v);
    assert_relative_eq!(negative_log_likelihood(&s, &p), expected, max_relative = 1e-12);
  }

  #[test]
  fn zero_observation_uses_variance_floor() {
    let s = ObservationSeries::new(vec![0.0, 0.0], 1.0).unwrap();
    let p = CirParams::new(1.0, 0.0, 1.0);
    let expected = 0.5 * (2.0 * PI * VARIANCE_EPS).ln();
    assert_relative_eq!(negative_log_likelihood(&s, &p), expected, max_relative = 1e-12);
  }

  #[test]
  fn non_finite_values_are_clamped_to_penalty() {
    let s = series();
    let p = CirParams::new(1e300, 1e300, 1.0);
    let lik = CirLikelihood::new(&s);
    assert!(!lik.raw_nll(&p).is_finite());
    assert_eq!(lik.nll(&p), PENALTY);
    assert!(!lik.raw_value(&p.to_array()).is_finite());
    assert_eq!(lik.value(&p.to_array()), PENALTY);
  }

  #[test]
  fn edge_of_domain_parameters_stay_finite() {
    let s = series();
    let lik = CirLikelihood::new(&s);
    for p in [
      CirParams::new(VARIANCE_EPS, VARIANCE_EPS, VARIANCE_EPS),
      CirParams::new(0.0, 0.0, 0.0),
      CirParams::new(-1.0, 0.05, -0.2),
    ] {
      assert!(lik.nll(&p).is_finite());
      assert!(lik.nll_gradient(&p).iter().all(|g| g.is_finite()));
    }
  }

  #[test]
  fn analytic_gradient_matches_finite_differences() {
    let s = series();
    let lik = CirLikelihood::new(&s);
    let x = [0.8, 0.045, 0.09];
    let analytic = lik.gradient(&x);

    for i in 0..3 {
      let h = 1e-7 * x[i];
      let mut up = x;
      let mut down = x;
      up[i] += h;
      down[i] -= h;
      let numeric = (lik.value(&up) - lik.value(&down)) / (2.0 * h);
      assert_relative_eq!(analytic[i], numeric, max_relative = 1e-4, epsilon = 1e-6);
    }
  }

  #[test]
  fn hessian_is_symmetric() {
    let s = series();
    let h = CirLikelihood::new(&s).hessian(&[0.8, 0.045, 0.09]);
    for i in 0..3 {
      for j in 0..3 {
        assert_eq!(h[(i, j)], h[(j, i)]);
      }
    }
  }
}
