//! Forward/reverse distributed spectral pipelines and the wave-vector
//! convention shared by the power-spectrum and Helmholtz operators.

use crate::engine::{fft3, Direction};
use latfield_core::{DField, Domain, Error, Result};
use num_complex::Complex64;
use tracing::debug;

/// A frequency-space buffer local to this rank, laid out the same way as
/// the rank's interior block: `shape` matches [`Domain::l_nint`], and
/// `global_start` records where that block sits in the global lattice so
/// callers can recover the signed wave-vector per index.
#[derive(Debug, Clone)]
pub struct FreqField {
    /// Local shape, matching the owning Domain's interior extent.
    pub shape: [usize; 3],
    /// Global start offset of this local block.
    pub global_start: [usize; 3],
    /// Global extent of the whole lattice (needed for the wave-vector
    /// convention and forward normalization).
    pub global_shape: [usize; 3],
    /// Flattened row-major complex data, `prod(shape)` elements.
    pub data: Vec<Complex64>,
}

/// Signed frequency for axis index `i` (already including the global
/// start offset) on an axis of length `n`.
#[must_use]
pub fn k_at(i: usize, n: usize) -> i64 {
    let i = i as i64;
    let n = n as i64;
    // Even N: positive frequencies are i < N/2. Odd N: positive
    // frequencies are i <= (N-1)/2, i.e. i < (N+1)/2.
    let half_exclusive = if n % 2 == 0 { n / 2 } else { (n + 1) / 2 };
    if i < half_exclusive {
        i
    } else {
        i - n
    }
}

/// Unit wave-vector at lattice coordinate `(kx, ky, kz)`; zero at the
/// origin (guarded by `|k| > 1e-12`).
#[must_use]
pub fn khat_at(kx: i64, ky: i64, kz: i64) -> [f64; 3] {
    let k = [kx as f64, ky as f64, kz as f64];
    let norm = (k[0] * k[0] + k[1] * k[1] + k[2] * k[2]).sqrt();
    if norm > 1e-12 {
        [k[0] / norm, k[1] / norm, k[2] / norm]
    } else {
        [0.0, 0.0, 0.0]
    }
}

/// Extract the interior of `field`'s single component (member index 0),
/// gather it across the process group if necessary, and run the forward
/// 3-D transform with normalization folded in (divide by the global zone
/// count before transforming).
///
/// # Errors
/// Returns [`Error::NotCommitted`] if the field is not committed, or
/// [`Error::PeerFailure`] if a distributed gather fails.
pub fn forward_component(domain: &Domain, field: &DField<'_>, component: usize) -> Result<FreqField> {
    if !field.is_committed() {
        return Err(Error::NotCommitted);
    }
    let l_nint = domain.l_nint();
    let nc = field.n_members().max(1);
    let g = domain.guard();
    let l_ntot = domain.l_ntot();
    let stride = [
        l_ntot[1] * l_ntot[2] * nc,
        l_ntot[2] * nc,
        nc,
    ];

    let n_total = domain.num_global_zones().max(1) as f64;
    let mut local_real = vec![0.0f64; l_nint[0] * l_nint[1] * l_nint[2]];
    let mut idx = 0usize;
    for x in 0..l_nint[0] {
        for y in 0..l_nint[1] {
            for z in 0..l_nint[2] {
                let base = (x + g) * stride[0] + (y + g) * stride[1] + (z + g) * stride[2] + component;
                local_real[idx] = field.data()[base] / n_total;
                idx += 1;
            }
        }
    }

    let global_real = domain.gather_global_interior(&local_real)?;
    let global_shape = [
        domain.global_size(0),
        domain.global_size(1),
        domain.global_size(2),
    ];
    debug!(?global_shape, "gathered global lattice for forward transform");
    let mut data: Vec<Complex64> = global_real.into_iter().map(|v| Complex64::new(v, 0.0)).collect();
    fft3(&mut data, global_shape, Direction::Forward);

    let local_shape = l_nint;
    let start = [
        domain.global_start(0),
        domain.global_start(1),
        domain.global_start(2),
    ];
    let slab = extract_slab(&data, global_shape, start, local_shape);
    Ok(FreqField {
        shape: local_shape,
        global_start: start,
        global_shape,
        data: slab,
    })
}

fn extract_slab(
    global: &[Complex64],
    global_shape: [usize; 3],
    start: [usize; 3],
    shape: [usize; 3],
) -> Vec<Complex64> {
    let [gy, gz] = [global_shape[1], global_shape[2]];
    let mut out = Vec::with_capacity(shape[0] * shape[1] * shape[2]);
    for x in 0..shape[0] {
        for y in 0..shape[1] {
            for z in 0..shape[2] {
                let gi = (start[0] + x) * gy * gz + (start[1] + y) * gz + (start[2] + z);
                out.push(global[gi]);
            }
        }
    }
    out
}

/// Inverse transform a [`FreqField`] (reassembled globally, since the
/// 3-D transform is not separable across ranks without a real pencil
/// transpose) and write the real part back into `field`'s component,
/// followed by a guard sync.
///
/// # Errors
/// Returns [`Error::NotCommitted`] if the field is not committed.
pub fn reverse_component(
    domain: &Domain,
    field: &mut DField<'_>,
    component: usize,
    freq: &FreqField,
) -> Result<()> {
    if !field.is_committed() {
        return Err(Error::NotCommitted);
    }
    let global_data = domain.gather_global_interior(&flatten_complex_real(&freq.data))?;
    // Reassemble the complex global array by gathering real/imag parts
    // separately through the same collective path the forward pass uses.
    let global_imag = domain.gather_global_interior(&flatten_complex_imag(&freq.data))?;
    let mut data: Vec<Complex64> = global_data
        .into_iter()
        .zip(global_imag)
        .map(|(re, im)| Complex64::new(re, im))
        .collect();
    fft3(&mut data, freq.global_shape, Direction::Inverse);

    let l_nint = domain.l_nint();
    let start = [
        domain.global_start(0),
        domain.global_start(1),
        domain.global_start(2),
    ];
    let slab = extract_slab(&data, freq.global_shape, start, l_nint);

    let i0 = [0usize, 0, 0];
    let i1 = l_nint;
    let nc = field.n_members().max(1);
    let mut extracted = vec![0.0f64; l_nint[0] * l_nint[1] * l_nint[2] * nc];
    field.extract(i0, i1, &mut extracted)?;
    let mut idx = 0usize;
    for v in slab {
        extracted[idx * nc + component] = v.re;
        idx += 1;
    }
    field.replace(i0, i1, &extracted)?;
    field.sync_guard()?;
    Ok(())
}

fn flatten_complex_real(data: &[Complex64]) -> Vec<f64> {
    data.iter().map(|c| c.re).collect()
}

fn flatten_complex_imag(data: &[Complex64]) -> Vec<f64> {
    data.iter().map(|c| c.im).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k_at_even_axis_places_nyquist_in_middle() {
        assert_eq!(k_at(0, 8), 0);
        assert_eq!(k_at(3, 8), 3);
        assert_eq!(k_at(4, 8), -4);
        assert_eq!(k_at(7, 8), -1);
    }

    #[test]
    fn k_at_odd_axis() {
        assert_eq!(k_at(0, 7), 0);
        assert_eq!(k_at(3, 7), 3);
        assert_eq!(k_at(4, 7), -3);
    }

    #[test]
    fn khat_is_zero_at_origin() {
        assert_eq!(khat_at(0, 0, 0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn khat_is_unit_elsewhere() {
        let k = khat_at(3, 4, 0);
        let norm = (k[0] * k[0] + k[1] * k[1] + k[2] * k[2]).sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
    }
}
