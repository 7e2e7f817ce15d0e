//! # Traits
//!
//! $$
//! \text{Trait contracts: }f:\mathbb{R}^d\to\mathbb{R},\quad \mathcal{P}:\text{seed}\to\text{sample path}
//! $$
//!
use nalgebra::DMatrix;
use rayon::prelude::*;

/// Derive the seed of run `index` from a master seed.
///
/// Multiplication by an odd constant is a bijection on `u64`, so distinct indices never share a
/// seed within one ensemble.
pub fn derive_seed(master_seed: u64, index: usize) -> u64 {
  master_seed.wrapping_add(0xD134_2543_DE82_EF95_u64.wrapping_mul((index as u64).wrapping_add(1)))
}

/// Scalar objective over a flat parameter vector.
///
/// This is the seam between a likelihood and the optimizer driving it: any quasi-Newton
/// backend only needs `value` and `gradient`.
pub trait ObjectiveExt {
  /// Number of free parameters.
  fn dim(&self) -> usize;

  fn value(&self, x: &[f64]) -> f64;

  /// Unclamped objective. A non-finite result marks `x` as outside the admissible region.
  fn raw_value(&self, x: &[f64]) -> f64 {
    self.value(x)
  }

  /// Central-difference gradient. Override when an analytic gradient exists.
  fn gradient(&self, x: &[f64]) -> Vec<f64> {
    (0..x.len())
      .map(|i| {
        let h = fd_step(x[i]);
        let mut x_plus = x.to_vec();
        let mut x_minus = x.to_vec();
        x_plus[i] += h;
        x_minus[i] -= h;
        (self.value(&x_plus) - self.value(&x_minus)) / (2.0 * h)
      })
      .collect()
  }

  /// Symmetrized central-difference Hessian built from [`ObjectiveExt::gradient`].
  fn hessian(&self, x: &[f64]) -> DMatrix<f64> {
    let d = x.len();
    let mut hess = DMatrix::<f64>::zeros(d, d);

    for i in 0..d {
      let h = fd_step(x[i]);
      let mut x_plus = x.to_vec();
      let mut x_minus = x.to_vec();
      x_plus[i] += h;
      x_minus[i] -= h;
      let g_plus = self.gradient(&x_plus);
      let g_minus = self.gradient(&x_minus);
      for j in 0..d {
        hess[(i, j)] = (g_plus[j] - g_minus[j]) / (2.0 * h);
      }
    }

    (&hess + hess.transpose()) * 0.5
  }
}

fn fd_step(x: f64) -> f64 {
  1e-5 * x.abs().max(1.0)
}

/// A seeded sampler. `sample` must be a pure function of `self` and `seed`.
pub trait ProcessExt: Send + Sync {
  type Output: Send;

  fn sample(&self, seed: u64) -> Self::Output;

  /// `m` independent samples, seeded with [`derive_seed`] and returned in run order.
  fn sample_par(&self, m: usize, master_seed: u64) -> Vec<Self::Output> {
    (0..m)
      .into_par_iter()
      .map(|i| self.sample(derive_seed(master_seed, i)))
      .collect()
  }
}
