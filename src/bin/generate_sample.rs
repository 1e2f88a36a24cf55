use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rand::prelude::*;
use rand_distr::Normal;

/// Peak field amplitude, V/m.
const E0: f64 = 1.0e4;
/// Physical half-width of the simulated window, metres.
const HALF_WIDTH: f64 = 5.0e-6;
/// Beam waist, metres.
const WAIST: f64 = 1.5e-6;

struct Options {
    out: PathBuf,
    n: usize,
    step: u32,
    seed: u64,
    noise: f64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            out: PathBuf::new(),
            n: 128,
            step: 1005,
            seed: 42,
            noise: 0.05,
        }
    }
}

fn parse_options() -> Result<Options> {
    let mut opts = Options::default();
    let mut out = None;
    for arg in std::env::args().skip(1) {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("expected key=value, got `{arg}`");
        };
        match key {
            "out" => out = Some(PathBuf::from(value)),
            "n" => opts.n = value.parse().with_context(|| format!("n={value}"))?,
            "step" => opts.step = value.parse().with_context(|| format!("step={value}"))?,
            "seed" => opts.seed = value.parse().with_context(|| format!("seed={value}"))?,
            "noise" => opts.noise = value.parse().with_context(|| format!("noise={value}"))?,
            other => bail!("unknown option `{other}`"),
        }
    }
    if opts.n < 2 {
        bail!("n must be at least 2");
    }
    opts.out = out.unwrap_or_else(|| PathBuf::from(format!("exy{}.csv", opts.step)));
    Ok(opts)
}

/// Azimuthally polarised doughnut beam: |E| ∝ r·exp(−r²/w²), E ∥ θ̂ rotated
/// by the local phase, with a weak longitudinal component.
fn vortex_field(x: f64, y: f64) -> [f64; 3] {
    let r = x.hypot(y);
    let theta = y.atan2(x);
    let rho = r / WAIST;
    let envelope = E0 * rho * (-rho * rho).exp();
    [
        envelope * theta.cos(),
        envelope * theta.sin(),
        0.1 * envelope * (2.0 * theta).cos(),
    ]
}

fn main() -> Result<()> {
    let opts = parse_options()?;

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let noise = Normal::new(0.0, opts.noise * E0).context("noise distribution")?;

    let file = File::create(&opts.out)
        .with_context(|| format!("creating {}", opts.out.display()))?;
    let mut sink = BufWriter::new(file);
    writeln!(sink, "# synthetic optical vortex, step {}", opts.step)?;
    writeln!(sink, "# grid {} x {}, noise sigma {:.3} E0", opts.n, opts.n, opts.noise)?;
    writeln!(sink, "X,Y,ex,ey,ez")?;

    let mut writer = csv::Writer::from_writer(sink);
    let coord = |i: usize| -HALF_WIDTH + 2.0 * HALF_WIDTH * i as f64 / (opts.n - 1) as f64;

    // x-major: every y for the first x, then the next x
    for i in 0..opts.n {
        for j in 0..opts.n {
            let (x, y) = (coord(i), coord(j));
            let [ex, ey, ez] = vortex_field(x, y);
            writer.write_record([
                format!("{x:.6e}"),
                format!("{y:.6e}"),
                format!("{:.6e}", ex + noise.sample(&mut rng)),
                format!("{:.6e}", ey + noise.sample(&mut rng)),
                format!("{:.6e}", ez + noise.sample(&mut rng)),
            ])?;
        }
    }
    writer.flush()?;

    println!(
        "Wrote {} samples ({} x {}) to {}",
        opts.n * opts.n,
        opts.n,
        opts.n,
        opts.out.display()
    );
    Ok(())
}
