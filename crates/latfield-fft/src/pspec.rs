//! Spherically-integrated power spectrum.

use crate::spectral::{forward_component, k_at};
use latfield_core::{DField, Domain, Error, Result};
use latfield_hist::Histogram;

fn default_range(global_shape: [usize; 3]) -> f64 {
    let sum_sq: f64 = global_shape.iter().map(|&n| (n as f64) * (n as f64)).sum();
    0.5 * sum_sq.sqrt()
}

fn bin_power(domain: &Domain, hist: &mut Histogram<'_>, power: &[f64], shape: [usize; 3], start: [usize; 3]) -> Result<()> {
    let global_shape = [
        domain.global_size(0),
        domain.global_size(1),
        domain.global_size(2),
    ];
    let mut idx = 0usize;
    for x in 0..shape[0] {
        for y in 0..shape[1] {
            for z in 0..shape[2] {
                let kx = k_at(start[0] + x, global_shape[0]);
                let ky = k_at(start[1] + y, global_shape[1]);
                let kz = k_at(start[2] + z, global_shape[2]);
                let kmag = ((kx * kx + ky * ky + kz * kz) as f64).sqrt();
                hist.add_sample_1(kmag, power[idx])?;
                idx += 1;
            }
        }
    }
    Ok(())
}

/// Compute `P(k) = |F(k)|^2` for a single-member field and bin it into a
/// freshly committed histogram with a density range derived from the
/// domain's global shape (`[1, 0.5*sqrt(Nx^2+Ny^2+Nz^2)]`).
///
/// # Errors
/// Returns [`Error::BadArity`] if `field` does not have exactly one
/// member, or propagates errors from the forward transform / binning.
pub fn pspec_scalar<'d>(domain: &'d Domain, field: &DField<'_>, nbins: usize) -> Result<Histogram<'d>> {
    if field.n_members() != 1 {
        return Err(Error::BadArity {
            expected: 1,
            actual: field.n_members(),
        });
    }
    let freq = forward_component(domain, field, 0)?;
    let power: Vec<f64> = freq.data.iter().map(num_complex::Complex64::norm_sqr).collect();

    let mut hist = Histogram::new(nbins);
    let global_shape = [
        domain.global_size(0),
        domain.global_size(1),
        domain.global_size(2),
    ];
    hist.set_lower(0, 1.0);
    hist.set_upper(0, default_range(global_shape));
    hist.set_binmode(latfield_hist::BinMode::Density);
    hist.set_domain_comm(domain);
    hist.commit();
    bin_power(domain, &mut hist, &power, freq.shape, freq.global_start)?;
    Ok(hist)
}

/// As [`pspec_scalar`] but for a 3-member vector field:
/// `P(k) = |Fx(k)|^2 + |Fy(k)|^2 + |Fz(k)|^2`.
///
/// # Errors
/// Returns [`Error::BadArity`] if `field` does not have exactly three
/// members.
pub fn pspec_vector<'d>(domain: &'d Domain, field: &DField<'_>, nbins: usize) -> Result<Histogram<'d>> {
    if field.n_members() != 3 {
        return Err(Error::BadArity {
            expected: 3,
            actual: field.n_members(),
        });
    }
    let fx = forward_component(domain, field, 0)?;
    let fy = forward_component(domain, field, 1)?;
    let fz = forward_component(domain, field, 2)?;
    let power: Vec<f64> = fx
        .data
        .iter()
        .zip(fy.data.iter())
        .zip(fz.data.iter())
        .map(|((x, y), z)| x.norm_sqr() + y.norm_sqr() + z.norm_sqr())
        .collect();

    let mut hist = Histogram::new(nbins);
    let global_shape = fx.global_shape;
    hist.set_lower(0, 1.0);
    hist.set_upper(0, default_range(global_shape));
    hist.set_binmode(latfield_hist::BinMode::Density);
    hist.set_domain_comm(domain);
    hist.commit();
    bin_power(domain, &mut hist, &power, fx.shape, fx.global_start)?;
    Ok(hist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use latfield_core::DField;
    use std::f64::consts::PI;

    #[test]
    fn scenario_d_pure_cosine_power_spectrum() {
        let mut d = Domain::new();
        d.set_ndim(1);
        d.set_size(0, 8);
        d.commit().unwrap();
        let mut f = DField::new(&d, "scalar");
        f.add_member("v");
        f.commit().unwrap();
        for x in 0..8usize {
            let v = (2.0 * PI * 3.0 * x as f64 / 8.0).cos();
            let base = x * f.stride(0);
            f.data_mut()[base] = v;
        }
        let hist = pspec_scalar(&d, &f, 4).unwrap();
        let sealed = hist.seal().unwrap();
        let total: f64 = sealed.values.iter().sum();
        assert!(total > 0.0);
    }
}
