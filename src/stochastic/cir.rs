//! # Cox-Ingersoll-Ross Euler Scheme
//!
//! $$
//! r_i=\max\!\left(0,\ r_{i-1}+\kappa(\theta-r_{i-1})\Delta t+\sigma\sqrt{r_{i-1}^{+}}\sqrt{\Delta t}\,Z_i\right)
//! $$
//!
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;

use crate::error::ensure_input;
use crate::error::Result;
use crate::params::CirParams;
use crate::traits::ProcessExt;

/// Restartable stream of standard-normal draws `Z_1, Z_2, ...` addressed by seed.
///
/// Every call to [`NormalStream::draws`] starts a fresh generator, so draw `i` depends on
/// `(seed, i)` only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalStream {
  pub seed: u64,
}

impl NormalStream {
  pub fn new(seed: u64) -> Self {
    Self { seed }
  }

  pub fn draws(&self, n: usize) -> impl Iterator<Item = f64> {
    let mut rng = StdRng::seed_from_u64(self.seed);
    (0..n).map(move |_| rng.sample::<f64, _>(StandardNormal))
  }
}

/// One simulated trajectory together with the inputs that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedPath {
  /// `r_0, ..., r_n`.
  pub values: Array1<f64>,
  pub seed: u64,
  pub params: CirParams,
  pub dt: f64,
}

impl SimulatedPath {
  /// Number of steps `n`.
  pub fn steps(&self) -> usize {
    self.values.len() - 1
  }

  pub fn times(&self) -> Array1<f64> {
    Array1::from_iter((0..self.values.len()).map(|i| i as f64 * self.dt))
  }
}

/// Euler–Maruyama discretization of the CIR process with absorption at zero.
///
/// Fields are private: every `CIR` in existence passed the domain checks in [`CIR::new`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CIR {
  params: CirParams,
  dt: f64,
  n: usize,
  r0: f64,
}

impl CIR {
  pub fn new(params: CirParams, dt: f64, n: usize, r0: f64) -> Result<Self> {
    params.validate()?;
    ensure_input!(
      dt.is_finite() && dt > 0.0,
      "dt must be finite and > 0, got {dt}"
    );
    ensure_input!(n >= 1, "step count must be >= 1");
    ensure_input!(
      r0.is_finite() && r0 >= 0.0,
      "r0 must be finite and >= 0, got {r0}"
    );

    Ok(Self { params, dt, n, r0 })
  }

  pub fn params(&self) -> CirParams {
    self.params
  }

  pub fn dt(&self) -> f64 {
    self.dt
  }

  pub fn n(&self) -> usize {
    self.n
  }

  pub fn r0(&self) -> f64 {
    self.r0
  }

  /// Fold the recursion over the first `n` items of `draws`.
  ///
  /// A shorter draw sequence yields a shorter path.
  pub fn path_from_draws(&self, draws: impl IntoIterator<Item = f64>) -> Array1<f64> {
    let CirParams {
      kappa,
      theta,
      sigma,
    } = self.params;
    let dt = self.dt;
    let sqrt_dt = dt.sqrt();

    let steps = draws.into_iter().take(self.n).scan(self.r0, |r, z| {
      let prev = *r;
      let next = prev + kappa * (theta - prev) * dt + sigma * prev.max(0.0).sqrt() * sqrt_dt * z;
      *r = next.max(0.0);
      Some(*r)
    });

    std::iter::once(self.r0).chain(steps).collect()
  }
}

impl ProcessExt for CIR {
  type Output = SimulatedPath;

  fn sample(&self, seed: u64) -> SimulatedPath {
    SimulatedPath {
      values: self.path_from_draws(NormalStream::new(seed).draws(self.n)),
      seed,
      params: self.params,
      dt: self.dt,
    }
  }
}

/// Simulate one path of `n` steps from `r0`. Deterministic in all arguments.
pub fn simulate(params: CirParams, dt: f64, n: usize, r0: f64, seed: u64) -> Result<SimulatedPath> {
  Ok(CIR::new(params, dt, n, r0)?.sample(seed))
}
