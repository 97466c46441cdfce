//! Phase-randomized metagaussian fields and the log-normal transform.

use ndarray::Array3;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::template::AmplitudeTemplate;
use crate::constants::LOGNORMAL_ALPHA;
use crate::error::Result;
use crate::fft::Fft3;

/// RNG of ensemble member `member_id`.
pub fn member_rng(base_seed: u64, member_id: u32) -> StdRng {
    StdRng::seed_from_u64(base_seed.wrapping_add(u64::from(member_id)))
}

/// Zero-mean, unit-variance Gaussian field with the template's spectrum.
///
/// White noise is transformed, reduced to its phases and rescaled by the
/// template, so the power spectrum equals the squared template exactly.
pub fn gaussian_field<R: Rng + ?Sized>(
    template: &AmplitudeTemplate,
    rng: &mut R,
    fft: &mut Fft3,
) -> Result<Array3<f64>> {
    let mut spectrum =
        Array3::from_shape_simple_fn(template.shape(), || {
            Complex64::new(rng.sample::<f64, _>(StandardNormal), 0.0)
        });
    fft.forward(&mut spectrum)?;

    ndarray::Zip::from(&mut spectrum)
        .and(&template.view())
        .for_each(|c, &a| {
            let m = c.norm();
            let phase = if m > 0.0 { *c / m } else { Complex64::new(1.0, 0.0) };
            *c = phase * a;
        });

    fft.inverse(&mut spectrum)?;
    Ok(spectrum.mapv(|c| c.re))
}

/// `exp(alpha * g)` in place.
pub fn lognormal(mut g: Array3<f64>, alpha: f64) -> Array3<f64> {
    g.mapv_inplace(|v| (alpha * v).exp());
    g
}

/// Positive stochastic field `exp(g)` for one member.
pub fn realize<R: Rng + ?Sized>(
    template: &AmplitudeTemplate,
    rng: &mut R,
    fft: &mut Fft3,
) -> Result<Array3<f64>> {
    Ok(lognormal(gaussian_field(template, rng, fft)?, LOGNORMAL_ALPHA))
}
