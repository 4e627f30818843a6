//! Helmholtz (solenoidal / irrotational) decomposition of a 3-vector
//! field.

use crate::spectral::{forward_component, k_at, khat_at, reverse_component, FreqField};
use latfield_core::{DField, Domain, Error, Result};
use num_complex::Complex64;

/// Which part of the field to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectMode {
    /// Subtract the `k`-parallel component, keeping the divergence-free
    /// (solenoidal) part.
    ProjectOutDiv,
    /// Keep only the `k`-parallel component (the curl-free / irrotational
    /// part).
    ProjectOutCurl,
}

/// Project a committed 3-member vector field in place: forward-transform
/// each component, apply the chosen Helmholtz projection at every
/// `k`-point (the DC mode is zeroed in both modes, per the wave-vector
/// convention's `k=0` guard), inverse-transform, and write back with a
/// guard sync.
///
/// # Errors
/// Returns [`Error::BadArity`] if `field` does not have exactly three
/// members.
pub fn helmholtz_decompose(domain: &Domain, field: &mut DField<'_>, mode: ProjectMode) -> Result<()> {
    if field.n_members() != 3 {
        return Err(Error::BadArity {
            expected: 3,
            actual: field.n_members(),
        });
    }
    let mut gx = forward_component(domain, field, 0)?;
    let mut gy = forward_component(domain, field, 1)?;
    let mut gz = forward_component(domain, field, 2)?;

    project(&mut gx, &mut gy, &mut gz, mode);

    reverse_component(domain, field, 0, &gx)?;
    reverse_component(domain, field, 1, &gy)?;
    reverse_component(domain, field, 2, &gz)?;
    Ok(())
}

fn project(gx: &mut FreqField, gy: &mut FreqField, gz: &mut FreqField, mode: ProjectMode) {
    let shape = gx.shape;
    let start = gx.global_start;
    let global_shape = gx.global_shape;
    let mut idx = 0usize;
    for x in 0..shape[0] {
        for y in 0..shape[1] {
            for z in 0..shape[2] {
                let kx = k_at(start[0] + x, global_shape[0]);
                let ky = k_at(start[1] + y, global_shape[1]);
                let kz = k_at(start[2] + z, global_shape[2]);
                let khat = khat_at(kx, ky, kz);

                let g = [gx.data[idx], gy.data[idx], gz.data[idx]];
                let g_dot_khat: Complex64 =
                    g[0] * khat[0] + g[1] * khat[1] + g[2] * khat[2];

                let parallel = [
                    g_dot_khat * khat[0],
                    g_dot_khat * khat[1],
                    g_dot_khat * khat[2],
                ];
                let projected = match mode {
                    ProjectMode::ProjectOutDiv => [g[0] - parallel[0], g[1] - parallel[1], g[2] - parallel[2]],
                    ProjectMode::ProjectOutCurl => parallel,
                };
                gx.data[idx] = projected[0];
                gy.data[idx] = projected[1];
                gz.data[idx] = projected[2];
                idx += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latfield_core::DField;
    use std::f64::consts::PI;

    fn gradient_field(d: &Domain) -> Vec<[f64; 3]> {
        // F = grad(phi), phi(x,y,z) = cos(2pi x/N) * cos(2pi y/N),
        // sampled on the 8^3 lattice used by every test in this module.
        let n = 8.0;
        let mut out = Vec::with_capacity(8 * 8 * 8);
        for x in 0..8usize {
            for y in 0..8usize {
                for _z in 0..8usize {
                    let ax = 2.0 * PI / n;
                    let cx = (ax * x as f64).cos();
                    let sx = (ax * x as f64).sin();
                    let cy = (ax * y as f64).cos();
                    let sy = (ax * y as f64).sin();
                    let dphidx = -ax * sx * cy;
                    let dphidy = -ax * cx * sy;
                    out.push([dphidx, dphidy, 0.0]);
                }
            }
        }
        let _ = d;
        out
    }

    fn make_field(d: &Domain) -> DField<'_> {
        let mut f = DField::new(d, "vec");
        f.add_member("x");
        f.add_member("y");
        f.add_member("z");
        f.commit().unwrap();
        f
    }

    #[test]
    fn scenario_e_curl_free_gradient_survives_curl_projection() {
        let mut d = Domain::new();
        d.set_ndim(3);
        d.set_size(0, 8);
        d.set_size(1, 8);
        d.set_size(2, 8);
        d.commit().unwrap();
        let mut f = make_field(&d);
        let values = gradient_field(&d);
        let g = d.guard();
        let l_ntot = d.l_ntot();
        let stride = [l_ntot[1] * l_ntot[2] * 3, l_ntot[2] * 3, 3usize];
        let mut idx = 0usize;
        for x in 0..8usize {
            for y in 0..8usize {
                for z in 0..8usize {
                    let base = (x + g) * stride[0] + (y + g) * stride[1] + (z + g) * stride[2];
                    let v = values[idx];
                    f.data_mut()[base] = v[0];
                    f.data_mut()[base + 1] = v[1];
                    f.data_mut()[base + 2] = v[2];
                    idx += 1;
                }
            }
        }
        let before = f.data().to_vec();
        helmholtz_decompose(&d, &mut f, ProjectMode::ProjectOutCurl).unwrap();
        let after = f.data();
        let mut max_err: f64 = 0.0;
        for (a, b) in after.iter().zip(before.iter()) {
            max_err = max_err.max((a - b).abs());
        }
        assert!(max_err < 1e-6, "max_err = {max_err}");
    }
}
