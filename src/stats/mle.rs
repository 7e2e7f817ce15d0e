//! # Mle
//!
//! $$
//! (\hat\kappa,\hat\theta,\hat\sigma)=\arg\min_{\kappa,\theta,\sigma>\varepsilon}\ -\ell(\kappa,\theta,\sigma),
//! \qquad x=\varepsilon+\log(1+e^{u})
//! $$
//!
//! Box constraints are enforced by optimizing L-BFGS in the unconstrained `u` space.
//!
use std::cell::RefCell;
use std::fmt;

use argmin::core::ArgminError;
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use argmin_math::ArgminL2Norm;
use nalgebra::DMatrix;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::ensure_input;
use crate::error::CirError;
use crate::error::Result;
use crate::params::CirParams;
use crate::series::ObservationSeries;
use crate::stats::likelihood::CirLikelihood;
use crate::stats::likelihood::VARIANCE_EPS;
use crate::traits::ObjectiveExt;

/// Optimizer configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct MleOptions {
  /// Iteration budget of the quasi-Newton search.
  pub max_iters: u64,
  /// L-BFGS history size.
  pub lbfgs_memory: usize,
  /// Gradient-norm tolerance, in unconstrained coordinates with the objective scaled so the
  /// initial gradient has unit size.
  pub tol_grad: f64,
  /// Cost-change tolerance on the same scaled objective.
  pub tol_cost: f64,
  /// Lower bound applied to every parameter.
  pub lower_bound: f64,
  /// A parameter closer than this to `lower_bound` is reported as pinned.
  pub bound_tolerance: f64,
  /// Relative tolerance on the smallest Hessian eigenvalue for standard errors.
  pub pd_tolerance: f64,
  /// First-order bound conditions must hold within this fraction of `max(1, |f|)` for a solver
  /// stop to count as convergence.
  pub stationarity_tolerance: f64,
}

impl Default for MleOptions {
  fn default() -> Self {
    Self {
      max_iters: 500,
      lbfgs_memory: 7,
      tol_grad: 1e-6,
      tol_cost: 1e-12,
      lower_bound: VARIANCE_EPS,
      bound_tolerance: 1e-6,
      pd_tolerance: 1e-12,
      stationarity_tolerance: 1e-4,
    }
  }
}

impl MleOptions {
  pub fn with_max_iters(mut self, max_iters: u64) -> Self {
    self.max_iters = max_iters;
    self
  }

  pub fn with_lbfgs_memory(mut self, memory: usize) -> Self {
    self.lbfgs_memory = memory;
    self
  }

  pub fn with_tolerances(mut self, tol_grad: f64, tol_cost: f64) -> Self {
    self.tol_grad = tol_grad;
    self.tol_cost = tol_cost;
    self
  }

  fn validate(&self) -> Result<()> {
    ensure_input!(self.max_iters > 0, "max_iters must be > 0");
    ensure_input!(self.lbfgs_memory > 0, "lbfgs_memory must be > 0");
    for (name, value) in [
      ("tol_grad", self.tol_grad),
      ("tol_cost", self.tol_cost),
      ("bound_tolerance", self.bound_tolerance),
      ("pd_tolerance", self.pd_tolerance),
      ("stationarity_tolerance", self.stationarity_tolerance),
    ] {
      ensure_input!(
        value.is_finite() && value >= 0.0,
        "{name} must be finite and >= 0, got {value}"
      );
    }
    ensure_input!(
      self.lower_bound.is_finite() && self.lower_bound >= 0.0,
      "lower_bound must be finite and >= 0, got {}",
      self.lower_bound
    );
    Ok(())
  }
}

/// How the search ended.
#[derive(Clone, Debug, PartialEq)]
pub enum ConvergenceStatus {
  /// Solver convergence at an interior point.
  Converged,
  /// Iteration budget exhausted; the estimate is the best point seen.
  MaxItersReached,
  /// Line-search or solver failure, or a parameter pinned at the lower bound.
  Failed { reason: String },
}

impl ConvergenceStatus {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Converged)
  }
}

impl fmt::Display for ConvergenceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Converged => write!(f, "converged"),
      Self::MaxItersReached => write!(f, "iteration budget exhausted"),
      Self::Failed { reason } => write!(f, "failed: {reason}"),
    }
  }
}

/// Asymptotic standard errors from the inverse observed information.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StandardErrors {
  pub kappa: f64,
  pub theta: f64,
  pub sigma: f64,
}

#[derive(Clone, Debug)]
pub struct EstimationResult {
  pub params: CirParams,
  /// Negative log-likelihood at `params`.
  pub nll: f64,
  pub status: ConvergenceStatus,
  /// `None` when the curvature at the optimum is not positive definite.
  pub standard_errors: Option<StandardErrors>,
  pub iterations: u64,
  pub cost_evaluations: u64,
}

impl EstimationResult {
  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }
}

/// Outcome of a bounded minimization in the natural parameter space.
#[derive(Clone, Debug)]
pub struct BoundedMinimum {
  pub x: Vec<f64>,
  pub value: f64,
  pub status: ConvergenceStatus,
  /// Iterations of solver runs that terminated normally. A run aborted by an inadmissible trial
  /// point contributes none; its evaluations still show up in `cost_evaluations`.
  pub iterations: u64,
  pub cost_evaluations: u64,
  /// Solver runs started after the first one.
  pub restarts: usize,
}

const MAX_RESTARTS: usize = 3;
// sigmoid(u) below this puts a coordinate on the flat tail of softplus
const SATURATION: f64 = 1e-4;

// ln(1 + e^u), guarded against overflow
fn softplus(u: f64) -> f64 {
  if u > 20.0 {
    u
  } else {
    u.exp().ln_1p()
  }
}

fn softplus_inv(y: f64) -> f64 {
  if y > 20.0 {
    y
  } else {
    y.exp_m1().ln()
  }
}

fn sigmoid(u: f64) -> f64 {
  1.0 / (1.0 + (-u).exp())
}

fn to_natural(lower: f64, u: &[f64]) -> Vec<f64> {
  u.iter().map(|&ui| lower + softplus(ui)).collect()
}

/// Largest violation of the first-order conditions of `min f(x)` subject to `x >= lower`.
///
/// A positive gradient component is weighted by the distance to the bound, since a coordinate
/// resting on the bound may keep it.
fn stationarity_violation(x: &[f64], grad: &[f64], lower: f64) -> f64 {
  x.iter()
    .zip(grad.iter())
    .map(|(&xi, &gi)| {
      if !gi.is_finite() {
        f64::INFINITY
      } else if gi > 0.0 {
        gi * (xi - lower).min(1.0)
      } else {
        -gi
      }
    })
    .fold(0.0, f64::max)
}

/// Admissible evaluations seen so far, in unconstrained coordinates.
#[derive(Default)]
struct Evaluations {
  count: u64,
  best: Option<(Vec<f64>, f64)>,
  best_unsaturated: Option<(Vec<f64>, f64)>,
}

impl Evaluations {
  fn record(&mut self, u: &[f64], value: f64) {
    if self.best.as_ref().map_or(true, |(_, v)| value < *v) {
      self.best = Some((u.to_vec(), value));
    }
    let unsaturated = u.iter().all(|&ui| sigmoid(ui) >= SATURATION);
    if unsaturated && self.best_unsaturated.as_ref().map_or(true, |(_, v)| value < *v) {
      self.best_unsaturated = Some((u.to_vec(), value));
    }
  }
}

/// Argmin view of an [`ObjectiveExt`] in unconstrained coordinates.
///
/// Trial points where the unclamped objective is non-finite are rejected with an error instead
/// of being scored with a penalty.
struct BoundedProblem<'a, O: ObjectiveExt> {
  objective: &'a O,
  lower: f64,
  /// Multiplies cost and gradient so the first search direction has unit size.
  scale: f64,
  evals: &'a RefCell<Evaluations>,
}

impl<O: ObjectiveExt> CostFunction for BoundedProblem<'_, O> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, u: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let x = to_natural(self.lower, u);
    let value = self.objective.raw_value(&x);

    let mut evals = self.evals.borrow_mut();
    evals.count += 1;
    if !value.is_finite() {
      return Err(
        ArgminError::ConditionViolated {
          text: format!("objective is {value} at {x:?}"),
        }
        .into(),
      );
    }
    evals.record(u, value);

    Ok(value * self.scale)
  }
}

impl<O: ObjectiveExt> Gradient for BoundedProblem<'_, O> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, u: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let x = to_natural(self.lower, u);
    let grad = self.objective.gradient(&x);
    Ok(
      grad
        .iter()
        .zip(u.iter())
        .map(|(g, &ui)| g * sigmoid(ui) * self.scale)
        .collect(),
    )
  }
}

// 1 / max(1, |grad_u|_inf) at `u`
fn gradient_scale<O: ObjectiveExt>(objective: &O, lower: f64, u: &[f64]) -> f64 {
  let x = to_natural(lower, u);
  let norm = objective
    .gradient(&x)
    .iter()
    .zip(u.iter())
    .map(|(g, &ui)| (g * sigmoid(ui)).abs())
    .fold(0.0, f64::max);

  if norm.is_finite() && norm > 1.0 {
    1.0 / norm
  } else {
    1.0
  }
}

type LineSearch = MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64>;
type Lbfgs = LBFGS<LineSearch, Vec<f64>, Vec<f64>, f64>;

fn build_lbfgs(opts: &MleOptions) -> std::result::Result<Lbfgs, argmin::core::Error> {
  let linesearch: LineSearch = MoreThuenteLineSearch::new().with_c(1e-4, 0.9)?;
  LBFGS::new(linesearch, opts.lbfgs_memory)
    .with_tolerance_grad(opts.tol_grad)?
    .with_tolerance_cost(opts.tol_cost)
}

enum Outcome {
  Stationary,
  Budget,
  Failed(String),
}

struct Attempt {
  u: Vec<f64>,
  iterations: u64,
  outcome: Outcome,
}

fn run_lbfgs<O: ObjectiveExt>(
  problem: BoundedProblem<'_, O>,
  u0: Vec<f64>,
  max_iters: u64,
  opts: &MleOptions,
) -> Result<Attempt> {
  let solver = build_lbfgs(opts)
    .map_err(|e| CirError::InvalidInput(format!("optimizer configuration: {e}")))?;
  let fallback = u0.clone();

  let run = Executor::new(problem, solver)
    .configure(|state| state.param(u0).max_iters(max_iters))
    .run();

  let attempt = match run {
    Ok(res) => {
      let state = res.state();
      let outcome = match state.get_termination_status() {
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
        | TerminationStatus::Terminated(TerminationReason::TargetCostReached) => Outcome::Stationary,
        TerminationStatus::Terminated(TerminationReason::MaxItersReached) => Outcome::Budget,
        TerminationStatus::Terminated(other) => Outcome::Failed(format!("{other:?}")),
        TerminationStatus::NotTerminated => {
          Outcome::Failed("solver stopped without a termination reason".into())
        }
      };
      Attempt {
        u: state.get_best_param().cloned().unwrap_or(fallback),
        iterations: state.get_iter(),
        outcome,
      }
    }
    Err(e) => {
      debug!(error = %e, "solver run aborted");
      Attempt {
        u: fallback,
        iterations: 0,
        outcome: Outcome::Failed(e.to_string()),
      }
    }
  };

  Ok(attempt)
}

/// Minimize `objective` over `(lower, inf)^d` with L-BFGS and a More-Thuente line search.
///
/// The search runs in softplus coordinates. A solver stop is reported as
/// [`ConvergenceStatus::Converged`] only if the first-order bound conditions hold in the natural
/// coordinates; otherwise the search restarts from the best unsaturated point while iterations
/// remain. Solver errors are not propagated: the best admissible point is returned with
/// [`ConvergenceStatus::Failed`].
pub fn minimize_bounded<O: ObjectiveExt>(
  objective: &O,
  x0: &[f64],
  opts: &MleOptions,
) -> Result<BoundedMinimum> {
  opts.validate()?;
  ensure_input!(
    x0.len() == objective.dim(),
    "initial point has {} coordinates, objective expects {}",
    x0.len(),
    objective.dim()
  );
  let lower = opts.lower_bound;
  for (i, &xi) in x0.iter().enumerate() {
    ensure_input!(
      xi.is_finite() && xi > lower,
      "initial coordinate {i} must be finite and > {lower:e}, got {xi}"
    );
  }
  let value0 = objective.raw_value(x0);
  if !value0.is_finite() {
    return Err(CirError::NumericalInstability(format!(
      "objective is {value0} at the initial point {x0:?}"
    )));
  }

  let evals = RefCell::new(Evaluations::default());
  let u0: Vec<f64> = x0.iter().map(|&xi| softplus_inv(xi - lower)).collect();
  let mut start = u0.clone();
  let mut iterations = 0u64;
  let mut restarts = 0usize;

  let (u, status) = loop {
    let problem = BoundedProblem {
      objective,
      lower,
      scale: gradient_scale(objective, lower, &start),
      evals: &evals,
    };
    let attempt = run_lbfgs(
      problem,
      start.clone(),
      opts.max_iters.saturating_sub(iterations),
      opts,
    )?;
    iterations += attempt.iterations;

    match attempt.outcome {
      Outcome::Stationary => {
        let x = to_natural(lower, &attempt.u);
        let violation = stationarity_violation(&x, &objective.gradient(&x), lower);
        if violation <= opts.stationarity_tolerance * objective.value(&x).abs().max(1.0) {
          break (attempt.u, ConvergenceStatus::Converged);
        }
        debug!(violation, restarts, "solver stopped at a point that is not bound-optimal");

        if iterations >= opts.max_iters {
          break (attempt.u, ConvergenceStatus::MaxItersReached);
        }
        if restarts == MAX_RESTARTS {
          break (
            attempt.u,
            ConvergenceStatus::Failed {
              reason: format!(
                "no bound-optimal point after {MAX_RESTARTS} restarts, violation {violation:e}"
              ),
            },
          );
        }
        restarts += 1;
        start = match evals.borrow().best_unsaturated.as_ref() {
          Some((u, _)) => u.clone(),
          None => u0.clone(),
        };
      }
      Outcome::Budget => break (attempt.u, ConvergenceStatus::MaxItersReached),
      Outcome::Failed(reason) => break (attempt.u, ConvergenceStatus::Failed { reason }),
    }
  };

  // without a verified optimum, report the best admissible point of all runs
  let u = match (&status, evals.borrow().best.as_ref()) {
    (ConvergenceStatus::Converged, _) | (_, None) => u,
    (_, Some((best, _))) => best.clone(),
  };
  let x = to_natural(lower, &u);
  let value = objective.value(&x);
  let cost_evaluations = evals.borrow().count;

  debug!(
    value,
    grad_norm = objective.gradient(&x).l2_norm(),
    iterations,
    restarts,
    %status,
    "bounded minimization finished"
  );

  Ok(BoundedMinimum {
    x,
    value,
    status,
    iterations,
    cost_evaluations,
    restarts,
  })
}

/// `sqrt(diag(H^-1))`, or `None` unless `H` is positive definite within `pd_tolerance`.
pub fn standard_errors(hessian: &DMatrix<f64>, pd_tolerance: f64) -> Option<StandardErrors> {
  if hessian.nrows() != 3 || hessian.ncols() != 3 || hessian.iter().any(|h| !h.is_finite()) {
    return None;
  }

  let eigen = hessian.clone().symmetric_eigen();
  let max_abs = eigen.eigenvalues.amax();
  let min = eigen.eigenvalues.min();
  if !(min > pd_tolerance * max_abs.max(1.0)) {
    return None;
  }

  let cov = hessian.clone().cholesky()?.inverse();
  let se = [cov[(0, 0)], cov[(1, 1)], cov[(2, 2)]];
  if se.iter().any(|v| !v.is_finite() || *v <= 0.0) {
    return None;
  }

  Some(StandardErrors {
    kappa: se[0].sqrt(),
    theta: se[1].sqrt(),
    sigma: se[2].sqrt(),
  })
}

/// Regression starting point: OLS of `r[i] - r[i-1]` on `r[i-1]`, mapped to `(kappa, theta, sigma)`.
///
/// Degenerate regressions (constant series, non-mean-reverting slope) fall back to
/// `kappa = 1`, `theta = mean(r)`.
pub fn initial_guess(series: &ObservationSeries) -> CirParams {
  const FLOOR: f64 = 1e-4;
  let dt = series.dt();
  let n = (series.len() - 1) as f64;

  let (sum_x, sum_y) = series
    .transitions()
    .fold((0.0, 0.0), |(sx, sy), (prev, curr)| (sx + prev, sy + (curr - prev)));
  let (mean_x, mean_y) = (sum_x / n, sum_y / n);

  let (sxx, sxy) = series
    .transitions()
    .fold((0.0, 0.0), |(sxx, sxy), (prev, curr)| {
      let dx = prev - mean_x;
      (sxx + dx * dx, sxy + dx * (curr - prev - mean_y))
    });

  let level = series.values().mean().unwrap_or(FLOOR).max(FLOOR);
  let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
  let intercept = mean_y - slope * mean_x;

  let (kappa, theta) = if slope < 0.0 && slope.is_finite() {
    let theta = -intercept / slope;
    (
      -slope / dt,
      if theta.is_finite() && theta > 0.0 {
        theta
      } else {
        level
      },
    )
  } else {
    (1.0, level)
  };

  let resid_var = series
    .transitions()
    .map(|(prev, curr)| (curr - prev - intercept - slope * prev).powi(2))
    .sum::<f64>()
    / n;
  let sigma = (resid_var / (mean_x.max(FLOOR) * dt)).sqrt();

  CirParams::new(
    kappa.max(FLOOR),
    theta.max(FLOOR),
    if sigma.is_finite() { sigma.max(FLOOR) } else { FLOOR },
  )
}

/// Quasi-MLE of the CIR parameters of `series`.
pub fn estimate_series(
  series: &ObservationSeries,
  initial_guess: CirParams,
  opts: &MleOptions,
) -> Result<EstimationResult> {
  initial_guess.validate()?;
  let likelihood = CirLikelihood::new(series);

  let nll0 = likelihood.raw_nll(&initial_guess);
  if !nll0.is_finite() {
    return Err(CirError::NumericalInstability(format!(
      "negative log-likelihood is {nll0} at the initial guess {initial_guess:?}"
    )));
  }

  info!(
    observations = series.len(),
    dt = series.dt(),
    nll0,
    "estimating CIR parameters"
  );

  let min = minimize_bounded(&likelihood, &initial_guess.to_array(), opts)?;
  let params = CirParams::new(min.x[0], min.x[1], min.x[2]);

  let mut status = min.status;
  for (name, value) in params.named() {
    if value - opts.lower_bound <= opts.bound_tolerance {
      warn!(parameter = name, value, "estimate pinned at the lower bound");
      if status.is_success() {
        status = ConvergenceStatus::Failed {
          reason: format!("{name} is at the lower bound {:e}", opts.lower_bound),
        };
      }
    }
  }

  let standard_errors = standard_errors(&likelihood.hessian(&min.x), opts.pd_tolerance);
  if standard_errors.is_none() {
    warn!("curvature at the optimum is not positive definite, standard errors unavailable");
  }

  if status.is_success() {
    info!(
      %status,
      nll = min.value,
      ?params,
      iterations = min.iterations,
      "estimation finished"
    );
  } else {
    warn!(
      %status,
      nll = min.value,
      ?params,
      iterations = min.iterations,
      restarts = min.restarts,
      "estimation did not converge"
    );
  }

  Ok(EstimationResult {
    params,
    nll: min.value,
    status,
    standard_errors,
    iterations: min.iterations,
    cost_evaluations: min.cost_evaluations,
  })
}

/// Estimate with custom optimizer options.
pub fn estimate_with(
  series: &[f64],
  dt: f64,
  initial_guess: CirParams,
  opts: &MleOptions,
) -> Result<EstimationResult> {
  let series = ObservationSeries::new(series.to_vec(), dt)?;
  estimate_series(&series, initial_guess, opts)
}

/// Estimate `(kappa, theta, sigma)` from observations sampled every `dt`.
pub fn estimate(series: &[f64], dt: f64, initial_guess: CirParams) -> Result<EstimationResult> {
  estimate_with(series, dt, initial_guess, &MleOptions::default())
}
