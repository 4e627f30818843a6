//! Cross-module spectral round-trip checks.

use latfield_core::{DField, Domain};
use latfield_fft::{forward_component, reverse_component};

#[test]
fn forward_then_reverse_reproduces_field() {
    let mut d = Domain::new();
    d.set_ndim(1);
    d.set_size(0, 8);
    d.commit().unwrap();
    let mut f = DField::new(&d, "scalar");
    f.add_member("v");
    f.commit().unwrap();
    for x in 0..8usize {
        let base = x * f.stride(0);
        f.data_mut()[base] = (x as f64) * (x as f64) - 2.0 * x as f64 + 1.0;
    }
    let before = f.data().to_vec();

    let freq = forward_component(&d, &f, 0).unwrap();
    reverse_component(&d, &mut f, 0, &freq).unwrap();

    for (a, b) in f.data().iter().zip(before.iter()) {
        assert!((a - b).abs() < 1e-8, "{a} vs {b}");
    }
}

#[test]
fn forward_then_reverse_3d() {
    let mut d = Domain::new();
    d.set_ndim(3);
    d.set_size(0, 4);
    d.set_size(1, 4);
    d.set_size(2, 4);
    d.commit().unwrap();
    let mut f = DField::new(&d, "scalar");
    f.add_member("v");
    f.commit().unwrap();
    let g = d.guard();
    let l_ntot = d.l_ntot();
    let stride = [l_ntot[1] * l_ntot[2], l_ntot[2], 1usize];
    for x in 0..4usize {
        for y in 0..4usize {
            for z in 0..4usize {
                let base = (x + g) * stride[0] + (y + g) * stride[1] + (z + g) * stride[2];
                f.data_mut()[base] = (x + 2 * y + 3 * z) as f64;
            }
        }
    }
    let before = f.data().to_vec();
    let freq = forward_component(&d, &f, 0).unwrap();
    reverse_component(&d, &mut f, 0, &freq).unwrap();
    for (a, b) in f.data().iter().zip(before.iter()) {
        assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }
}
