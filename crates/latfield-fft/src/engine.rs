//! 1-D and separable 3-D complex transform engine.
//!
//! Dispatches to an iterative radix-2 Cooley-Tukey butterfly when the axis
//! length is a power of two, and to a direct O(N^2) summation otherwise
//! (domains are not required to have power-of-two extents). Neither
//! direction applies a `1/N` scale; normalization is folded into the
//! forward spectral pipeline instead (see [`crate::spectral`]).

use num_complex::Complex64;
use std::f64::consts::PI;

/// Forward or inverse transform direction. Only the sign of the complex
/// exponent differs between the two; no scaling is applied by this
/// engine in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `X_k = sum_n x_n * exp(-2pi i k n / N)`
    Forward,
    /// `x_n = sum_k X_k * exp(+2pi i k n / N)` (unnormalized)
    Inverse,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Forward => -1.0,
            Direction::Inverse => 1.0,
        }
    }
}

/// In-place 1-D transform of `buf`.
pub fn fft_1d(buf: &mut [Complex64], dir: Direction) {
    let n = buf.len();
    if n <= 1 {
        return;
    }
    if n.is_power_of_two() {
        radix2(buf, dir);
    } else {
        direct_dft_inplace(buf, dir);
    }
}

fn bit_reverse_permute(buf: &mut [Complex64]) {
    let n = buf.len();
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = (i as u32).reverse_bits() >> (32 - bits);
        let j = j as usize;
        if j > i {
            buf.swap(i, j);
        }
    }
}

fn radix2(buf: &mut [Complex64], dir: Direction) {
    let n = buf.len();
    bit_reverse_permute(buf);
    let sign = dir.sign();
    let mut len = 2usize;
    while len <= n {
        let half = len / 2;
        let angle = sign * 2.0 * PI / len as f64;
        let wlen = Complex64::new(angle.cos(), angle.sin());
        let mut start = 0usize;
        while start < n {
            let mut w = Complex64::new(1.0, 0.0);
            for k in 0..half {
                let u = buf[start + k];
                let v = buf[start + k + half] * w;
                buf[start + k] = u + v;
                buf[start + k + half] = u - v;
                w *= wlen;
            }
            start += len;
        }
        len <<= 1;
    }
}

/// O(N^2) DFT for axis lengths that are not a power of two.
fn direct_dft_inplace(buf: &mut [Complex64], dir: Direction) {
    let n = buf.len();
    let sign = dir.sign();
    let mut out = vec![Complex64::new(0.0, 0.0); n];
    for (k, slot) in out.iter_mut().enumerate() {
        let mut acc = Complex64::new(0.0, 0.0);
        for (m, &x) in buf.iter().enumerate() {
            let angle = sign * 2.0 * PI * (k * m) as f64 / n as f64;
            acc += x * Complex64::new(angle.cos(), angle.sin());
        }
        *slot = acc;
    }
    buf.copy_from_slice(&out);
}

/// Separable 3-D transform over a row-major `[nx, ny, nz]` complex
/// buffer: one pass of 1-D transforms along each axis in turn.
pub fn fft3(buf: &mut [Complex64], shape: [usize; 3], dir: Direction) {
    let [nx, ny, nz] = shape;
    debug_assert_eq!(buf.len(), nx * ny * nz);

    // Axis z (fastest-varying): contiguous runs of length nz.
    for block in buf.chunks_mut(nz) {
        fft_1d(block, dir);
    }

    // Axis y: stride nz, ny consecutive elements per (x, z) pencil.
    let mut scratch = vec![Complex64::new(0.0, 0.0); ny];
    for x in 0..nx {
        for z in 0..nz {
            for (y, slot) in scratch.iter_mut().enumerate() {
                *slot = buf[x * ny * nz + y * nz + z];
            }
            fft_1d(&mut scratch, dir);
            for (y, &val) in scratch.iter().enumerate() {
                buf[x * ny * nz + y * nz + z] = val;
            }
        }
    }

    // Axis x: stride ny*nz, nx consecutive elements per (y, z) pencil.
    let mut scratch = vec![Complex64::new(0.0, 0.0); nx];
    for y in 0..ny {
        for z in 0..nz {
            for (x, slot) in scratch.iter_mut().enumerate() {
                *slot = buf[x * ny * nz + y * nz + z];
            }
            fft_1d(&mut scratch, dir);
            for (x, &val) in scratch.iter().enumerate() {
                buf[x * ny * nz + y * nz + z] = val;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Complex64, b: Complex64, tol: f64) -> bool {
        (a - b).norm() < tol
    }

    #[test]
    fn radix2_matches_direct_dft() {
        let input: Vec<Complex64> = (0..8)
            .map(|i| Complex64::new(i as f64, 0.0))
            .collect();
        let mut a = input.clone();
        let mut b = input;
        fft_1d(&mut a, Direction::Forward);
        direct_dft_inplace(&mut b, Direction::Forward);
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(approx_eq(*x, *y, 1e-9));
        }
    }

    #[test]
    fn round_trip_power_of_two() {
        let n = 8;
        let input: Vec<Complex64> = (0..n).map(|i| Complex64::new((i * 3) as f64, 0.0)).collect();
        let mut buf = input.clone();
        fft_1d(&mut buf, Direction::Forward);
        fft_1d(&mut buf, Direction::Inverse);
        for (x, y) in buf.iter().zip(input.iter()) {
            assert!(approx_eq(*x, Complex64::new(y.re * n as f64, 0.0), 1e-6));
        }
    }

    #[test]
    fn round_trip_non_power_of_two() {
        let n = 6;
        let input: Vec<Complex64> = (0..n).map(|i| Complex64::new((i + 1) as f64, 0.0)).collect();
        let mut buf = input.clone();
        direct_dft_inplace(&mut buf, Direction::Forward);
        direct_dft_inplace(&mut buf, Direction::Inverse);
        for (x, y) in buf.iter().zip(input.iter()) {
            assert!(approx_eq(*x, Complex64::new(y.re * n as f64, 0.0), 1e-6));
        }
    }

    #[test]
    fn fft3_round_trip() {
        let shape = [2usize, 2, 2];
        let input: Vec<Complex64> = (0..8).map(|i| Complex64::new(i as f64, 0.0)).collect();
        let mut buf = input.clone();
        fft3(&mut buf, shape, Direction::Forward);
        fft3(&mut buf, shape, Direction::Inverse);
        let ntot = 8.0;
        for (x, y) in buf.iter().zip(input.iter()) {
            assert!(approx_eq(*x, Complex64::new(y.re * ntot, 0.0), 1e-6));
        }
    }
}
