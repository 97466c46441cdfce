//! Stochastic field synthesis from spectral slopes.

pub mod realization;
pub mod template;

pub use realization::{gaussian_field, lognormal, member_rng, realize};
pub use template::AmplitudeTemplate;
