//! # cir-rs
//!
//! $$
//! dr_t=\kappa(\theta-r_t)\,dt+\sigma\sqrt{r_t}\,dW_t
//! $$
//!
//! Estimation, simulation and Monte Carlo validation of the Cox-Ingersoll-Ross short-rate model.
//!
//! ## Modules
//!
//! | Module          | Description                                                                          |
//! |-----------------|--------------------------------------------------------------------------------------|
//! | [`params`]      | The `(kappa, theta, sigma)` parameter set and its domain checks.                     |
//! | [`series`]      | Validated observation series sampled on a uniform grid.                               |
//! | [`stats`]       | Euler quasi-likelihood, bounded L-BFGS estimation and fit diagnostics.               |
//! | [`stochastic`]  | Euler–Maruyama path simulation and the parallel Monte Carlo ensemble.                |
//! | [`traits`]      | Objective and seeded-sampler contracts shared by the estimator and the simulator.    |
//! | [`error`]       | The crate error type.                                                                |
//!
//! ## Parallelism
//!
//! [`monte_carlo`] simulates its paths on the `rayon` pool. Every run is seeded from the master
//! seed and its index, so results do not depend on the number of threads.
//!
pub mod error;
pub mod params;
pub mod series;
pub mod stats;
pub mod stochastic;
pub mod traits;

pub use error::CirError;
pub use error::Result;
pub use params::CirParams;
pub use series::ObservationSeries;
pub use stats::diagnostics::envelope_coverage;
pub use stats::diagnostics::feller;
pub use stats::diagnostics::fit_metrics;
pub use stats::diagnostics::FitMetrics;
pub use stats::likelihood::negative_log_likelihood;
pub use stats::mle::estimate;
pub use stats::mle::estimate_with;
pub use stats::mle::initial_guess;
pub use stats::mle::ConvergenceStatus;
pub use stats::mle::EstimationResult;
pub use stats::mle::MleOptions;
pub use stats::mle::StandardErrors;
pub use stochastic::cir::simulate;
pub use stochastic::cir::SimulatedPath;
pub use stochastic::cir::CIR;
pub use stochastic::monte_carlo::monte_carlo;
pub use stochastic::monte_carlo::MonteCarloEnsemble;
pub use stochastic::monte_carlo::SummaryRow;
