//! # Stochastic
//!
//! $$
//! r^{(j)}_{i}=F\!\left(r^{(j)}_{i-1},Z^{(j)}_i\right),\qquad j=1,\dots,M
//! $$
//!
pub mod cir;
pub mod monte_carlo;
