//! # Stats
//!
//! $$
//! \hat\vartheta=\arg\min_\vartheta\ -\sum_{i}\ln p_{\Delta t}(r_i\mid r_{i-1};\vartheta)
//! $$
//!
pub mod diagnostics;
pub mod likelihood;
pub mod mle;
