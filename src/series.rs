//! # Observation Series
//!
//! $$
//! \{r_{t_i}\}_{i=0}^{n},\quad t_i=i\,\Delta t,\quad r_{t_i}\ge 0
//! $$
//!
use ndarray::Array1;

use crate::error::ensure_input;
use crate::error::Result;

/// Time-ordered, equally spaced observations of a non-negative process.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationSeries {
  values: Array1<f64>,
  dt: f64,
}

impl ObservationSeries {
  pub fn new(values: impl Into<Array1<f64>>, dt: f64) -> Result<Self> {
    let values = values.into();
    ensure_input!(
      dt.is_finite() && dt > 0.0,
      "dt must be finite and > 0, got {dt}"
    );
    ensure_input!(
      values.len() >= 2,
      "series needs at least 2 observations, got {}",
      values.len()
    );
    if let Some((i, v)) = values
      .iter()
      .enumerate()
      .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
      return Err(crate::error::CirError::InvalidInput(format!(
        "observation {i} must be finite and >= 0, got {v}"
      )));
    }

    Ok(Self { values, dt })
  }

  pub fn values(&self) -> &Array1<f64> {
    &self.values
  }

  pub fn dt(&self) -> f64 {
    self.dt
  }

  /// Number of observations (`n + 1` for `n` transitions).
  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Consecutive `(r[i-1], r[i])` pairs.
  pub fn transitions(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
    self
      .values
      .iter()
      .zip(self.values.iter().skip(1))
      .map(|(&prev, &curr)| (prev, curr))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CirError;

  #[test]
  fn accepts_valid_series() {
    let s = ObservationSeries::new(vec![1.0, 0.0, 2.5], 0.5).unwrap();
    assert_eq!(s.len(), 3);
    assert_eq!(s.dt(), 0.5);
    let pairs: Vec<_> = s.transitions().collect();
    assert_eq!(pairs, vec![(1.0, 0.0), (0.0, 2.5)]);
  }

  #[test]
  fn rejects_bad_step_size() {
    for dt in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      assert!(matches!(
        ObservationSeries::new(vec![1.0, 2.0], dt),
        Err(CirError::InvalidInput(_))
      ));
    }
  }

  #[test]
  fn rejects_short_series() {
    assert!(ObservationSeries::new(vec![1.0], 1.0).is_err());
    assert!(ObservationSeries::new(Vec::<f64>::new(), 1.0).is_err());
  }

  #[test]
  fn rejects_negative_and_non_finite_values() {
    let err = ObservationSeries::new(vec![1.0, -0.1, 2.0], 1.0).unwrap_err();
    assert!(err.to_string().contains("observation 1"));
    assert!(ObservationSeries::new(vec![1.0, f64::NAN], 1.0).is_err());
    assert!(ObservationSeries::new(vec![f64::INFINITY, 1.0], 1.0).is_err());
  }
}
