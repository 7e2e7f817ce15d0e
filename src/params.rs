//! # CIR Parameters
//!
//! $$
//! dr_t=\kappa(\theta-r_t)\,dt+\sigma\sqrt{r_t}\,dW_t,\qquad 2\kappa\theta\ge\sigma^2
//! $$
//!
use impl_new_derive::ImplNew;

use crate::error::ensure_input;
use crate::error::Result;

/// Cox-Ingersoll-Ross parameter set.
///
/// Construction through [`CirParams::new`] does not validate, so the likelihood can be probed
/// at edge-of-domain points. Anything that simulates calls [`CirParams::validate`] first.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct CirParams {
  /// Mean-reversion speed.
  pub kappa: f64,
  /// Long-run level.
  pub theta: f64,
  /// Volatility of the square-root diffusion.
  pub sigma: f64,
}

impl CirParams {
  /// Validated constructor.
  pub fn try_new(kappa: f64, theta: f64, sigma: f64) -> Result<Self> {
    let params = Self::new(kappa, theta, sigma);
    params.validate()?;
    Ok(params)
  }

  pub fn validate(&self) -> Result<()> {
    for (name, value) in self.named() {
      ensure_input!(
        value.is_finite() && value > 0.0,
        "{name} must be finite and > 0, got {value}"
      );
    }
    Ok(())
  }

  /// Feller margin `2 kappa theta - sigma^2`.
  pub fn feller_margin(&self) -> f64 {
    2.0 * self.kappa * self.theta - self.sigma.powi(2)
  }

  /// Stationary mean and variance of the continuous-time process.
  pub fn stationary_moments(&self) -> (f64, f64) {
    (
      self.theta,
      self.theta * self.sigma.powi(2) / (2.0 * self.kappa),
    )
  }

  pub fn to_array(self) -> [f64; 3] {
    [self.kappa, self.theta, self.sigma]
  }

  pub(crate) fn named(&self) -> [(&'static str, f64); 3] {
    [
      ("kappa", self.kappa),
      ("theta", self.theta),
      ("sigma", self.sigma),
    ]
  }
}

impl From<[f64; 3]> for CirParams {
  fn from(x: [f64; 3]) -> Self {
    CirParams::new(x[0], x[1], x[2])
  }
}

impl From<CirParams> for Vec<f64> {
  fn from(params: CirParams) -> Self {
    params.to_array().to_vec()
  }
}
