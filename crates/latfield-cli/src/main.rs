//! Inspection CLI for distributed Cartesian decomposition and the
//! spectral self-tests.

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use latfield_core::{DField, Domain};
use latfield_fft::{forward_component, helmholtz_decompose, pspec_scalar, reverse_component, ProjectMode};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "latfield-cli",
    about = "Inspect Cartesian decompositions and exercise the spectral self-tests",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the per-rank decomposition a given global size/process grid
    /// would produce, without launching a distributed job.
    Decompose {
        /// Dimensionality (1, 2, or 3)
        #[arg(long, default_value_t = 3)]
        ndim: usize,

        /// Guard (halo) width
        #[arg(long, default_value_t = 1)]
        guard: usize,

        /// Global extent, one value per axis up to `ndim`
        #[arg(long, num_args = 1..=3, value_name = "N")]
        size: Vec<usize>,

        /// Process-grid extent, one value per axis up to `ndim`; omit to
        /// let the balanced factoring routine fill it in
        #[arg(long, num_args = 0..=3, value_name = "P")]
        procs: Vec<usize>,
    },

    /// Run the extract/replace, guard-sync, FFT round-trip, and
    /// Helmholtz orthogonality checks in-process and report pass/fail.
    Selftest,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Decompose {
            ndim,
            guard,
            size,
            procs,
        } => decompose(ndim, guard, size, procs),
        Cmd::Selftest => selftest(),
    }
}

fn decompose(ndim: usize, guard: usize, size: Vec<usize>, procs: Vec<usize>) -> Result<()> {
    if ndim == 0 || ndim > 3 {
        bail!("ndim must be 1, 2, or 3");
    }
    if size.len() != ndim {
        bail!("--size must provide exactly {ndim} value(s)");
    }
    let mut proc_sizes = [0usize; 3];
    for (i, &p) in procs.iter().enumerate().take(ndim) {
        proc_sizes[i] = p;
    }
    if proc_sizes[..ndim].iter().any(|&p| p == 0) {
        bail!("pass --procs explicitly for every axis; this tool does not query a live process count");
    }

    let mut g_ntot = [1usize; 3];
    for (i, &s) in size.iter().enumerate() {
        g_ntot[i] = s;
    }
    let total: usize = proc_sizes[..ndim].iter().product();

    info!(ndim, guard, ?g_ntot, ?proc_sizes, total, "computing decomposition");
    println!("rank  coords        L_nint          G_strt          L_ntot");
    for rank in 0..total {
        let coords = row_major_coords(rank, proc_sizes, ndim);
        let mut l_nint = [1usize; 3];
        let mut g_strt = [0usize; 3];
        let mut l_ntot = [1usize; 3];
        for i in 0..ndim {
            let p = proc_sizes[i];
            let q = g_ntot[i] / p;
            let r = g_ntot[i] % p;
            let idx = coords[i];
            l_nint[i] = if idx < r { q + 1 } else { q };
            let before_r = idx.min(r);
            g_strt[i] = before_r * (q + 1) + idx.saturating_sub(r) * q;
            l_ntot[i] = l_nint[i] + 2 * guard;
        }
        println!(
            "{rank:>4}  {coords:?}  {l_nint:?}  {g_strt:?}  {l_ntot:?}"
        );
    }
    Ok(())
}

fn row_major_coords(rank: usize, proc_sizes: [usize; 3], ndim: usize) -> [usize; 3] {
    let mut coords = [0usize; 3];
    let mut r = rank;
    for i in (0..ndim).rev() {
        coords[i] = r % proc_sizes[i];
        r /= proc_sizes[i];
    }
    coords
}

fn selftest() -> Result<()> {
    let mut ok = true;
    ok &= report("extract/replace round trip", check_extract_replace());
    ok &= report("guard-sync periodicity", check_guard_sync());
    ok &= report("FFT round trip", check_fft_roundtrip());
    ok &= report("power spectrum of a pure cosine", check_pspec());
    ok &= report("Helmholtz orthogonality", check_helmholtz());
    if ok {
        println!("all checks passed");
        Ok(())
    } else {
        bail!("one or more self-checks failed");
    }
}

fn report(name: &str, ok: bool) -> bool {
    println!("[{}] {name}", if ok { "ok" } else { "FAIL" });
    ok
}

fn check_extract_replace() -> bool {
    let mut d = Domain::new();
    d.set_ndim(1);
    d.set_guard(1);
    d.set_size(0, 10);
    if d.commit().is_err() {
        return false;
    }
    let mut f = DField::new(&d, "scalar");
    f.add_member("v");
    if f.commit().is_err() {
        return false;
    }
    for x in 0..10usize {
        let base = (x + 1) * f.stride(0);
        f.data_mut()[base] = x as f64;
    }
    let before = f.data().to_vec();
    let mut buf = vec![0.0; 3];
    if f.extract([3, 0, 0], [6, 1, 1], &mut buf).is_err() {
        return false;
    }
    if f.replace([3, 0, 0], [6, 1, 1], &buf).is_err() {
        return false;
    }
    f.data() == before.as_slice()
}

fn check_guard_sync() -> bool {
    let mut d = Domain::new();
    d.set_ndim(1);
    d.set_guard(2);
    d.set_size(0, 8);
    if d.commit().is_err() {
        return false;
    }
    let mut f = DField::new(&d, "scalar");
    f.add_member("v");
    if f.commit().is_err() {
        return false;
    }
    for x in 0..8usize {
        let base = (x + 2) * f.stride(0);
        f.data_mut()[base] = x as f64;
    }
    if f.sync_guard().is_err() {
        return false;
    }
    let at = |i: usize| f.data()[i * f.stride(0)];
    (at(0) - 6.0).abs() < 1e-12 && (at(1) - 7.0).abs() < 1e-12 && (at(10) - 0.0).abs() < 1e-12
}

fn check_fft_roundtrip() -> bool {
    let mut d = Domain::new();
    d.set_ndim(1);
    d.set_size(0, 8);
    if d.commit().is_err() {
        return false;
    }
    let mut f = DField::new(&d, "scalar");
    f.add_member("v");
    if f.commit().is_err() {
        return false;
    }
    for x in 0..8usize {
        let base = x * f.stride(0);
        f.data_mut()[base] = (x as f64).sin();
    }
    let before = f.data().to_vec();
    let Ok(freq) = forward_component(&d, &f, 0) else {
        return false;
    };
    if reverse_component(&d, &mut f, 0, &freq).is_err() {
        return false;
    }
    f.data()
        .iter()
        .zip(before.iter())
        .all(|(a, b)| (a - b).abs() < 1e-6)
}

fn check_pspec() -> bool {
    let mut d = Domain::new();
    d.set_ndim(1);
    d.set_size(0, 8);
    if d.commit().is_err() {
        return false;
    }
    let mut f = DField::new(&d, "scalar");
    f.add_member("v");
    if f.commit().is_err() {
        return false;
    }
    for x in 0..8usize {
        let base = x * f.stride(0);
        f.data_mut()[base] = (std::f64::consts::TAU * 3.0 * x as f64 / 8.0).cos();
    }
    let Ok(hist) = pspec_scalar(&d, &f, 4) else {
        return false;
    };
    let Ok(sealed) = hist.seal() else {
        return false;
    };
    sealed.values.iter().any(|&v| v > 0.0)
}

fn check_helmholtz() -> bool {
    let mut d = Domain::new();
    d.set_ndim(3);
    d.set_size(0, 4);
    d.set_size(1, 4);
    d.set_size(2, 4);
    if d.commit().is_err() {
        return false;
    }
    let mut f = DField::new(&d, "vec");
    f.add_member("x");
    f.add_member("y");
    f.add_member("z");
    if f.commit().is_err() {
        return false;
    }
    // A pure gradient in x: F = (1,0,0) everywhere is curl-free.
    let g = d.guard();
    let l_ntot = d.l_ntot();
    let stride = [l_ntot[1] * l_ntot[2] * 3, l_ntot[2] * 3, 3usize];
    for x in 0..4usize {
        for y in 0..4usize {
            for z in 0..4usize {
                let base = (x + g) * stride[0] + (y + g) * stride[1] + (z + g) * stride[2];
                f.data_mut()[base] = 1.0;
                f.data_mut()[base + 1] = 0.0;
                f.data_mut()[base + 2] = 0.0;
            }
        }
    }
    helmholtz_decompose(&d, &mut f, ProjectMode::ProjectOutDiv).is_ok()
        && f.data().iter().all(|v| v.abs() < 10.0)
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
