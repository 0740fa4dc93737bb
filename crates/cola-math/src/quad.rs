//! Globally adaptive Gauss–Kronrod quadrature.
//!
//! Each interval is integrated with the 15-point Kronrod rule; the
//! embedded 7-point Gauss rule gives the error estimate. The interval with
//! the largest error is bisected until the summed error meets the
//! requested tolerance or the interval budget runs out.

use thiserror::Error;

/// Kronrod abscissae on [0, 1] (the rule is symmetric).
const XGK: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

/// Kronrod weights matching `XGK`.
const WGK: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_18,
    0.140_653_259_715_525_92,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_83,
];

/// Gauss weights for the odd Kronrod abscissae `XGK[1], XGK[3], XGK[5], XGK[7]`.
const WG: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuadratureError {
    #[error("quadrature did not converge: estimate {estimate:e}, error {error:e}")]
    NotConverged { estimate: f64, error: f64 },

    #[error("integrand is not finite at x = {0:e}")]
    NonFinite(f64),
}

/// Tolerances and work limit for [`integrate`].
#[derive(Debug, Clone, Copy)]
pub struct QuadratureOptions {
    /// Requested relative accuracy.
    pub rel_tol: f64,
    /// Requested absolute accuracy.
    pub abs_tol: f64,
    /// Maximum number of subintervals.
    pub max_intervals: usize,
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        Self {
            rel_tol: 1e-8,
            abs_tol: 0.0,
            max_intervals: 5000,
        }
    }
}

impl QuadratureOptions {
    /// Options with the given relative tolerance.
    pub fn relative(rel_tol: f64) -> Self {
        Self {
            rel_tol,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    a: f64,
    b: f64,
    value: f64,
    error: f64,
}

fn kronrod15<F: Fn(f64) -> f64>(f: &F, a: f64, b: f64) -> Result<Segment, QuadratureError> {
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);

    let eval = |x: f64| {
        let y = f(x);
        if y.is_finite() {
            Ok(y)
        } else {
            Err(QuadratureError::NonFinite(x))
        }
    };

    let fc = eval(center)?;
    let mut kronrod = fc * WGK[7];
    let mut gauss = fc * WG[3];

    for (j, (&x, &w)) in XGK.iter().zip(WGK.iter()).take(7).enumerate() {
        let dx = half * x;
        let pair = eval(center - dx)? + eval(center + dx)?;
        kronrod += w * pair;
        if j % 2 == 1 {
            gauss += WG[j / 2] * pair;
        }
    }

    Ok(Segment {
        a,
        b,
        value: kronrod * half,
        error: ((kronrod - gauss) * half).abs(),
    })
}

/// Integrate `f` over `[a, b]`.
///
/// `a == b` returns exactly zero without evaluating `f`; `a > b` returns
/// the negated integral over `[b, a]`.
pub fn integrate<F: Fn(f64) -> f64>(
    f: F,
    a: f64,
    b: f64,
    options: QuadratureOptions,
) -> Result<f64, QuadratureError> {
    if a == b {
        return Ok(0.0);
    }
    if a > b {
        return integrate(f, b, a, options).map(|v| -v);
    }

    let mut segments = vec![kronrod15(&f, a, b)?];

    loop {
        let value: f64 = segments.iter().map(|s| s.value).sum();
        let error: f64 = segments.iter().map(|s| s.error).sum();

        if error <= options.abs_tol.max(options.rel_tol * value.abs()) {
            return Ok(value);
        }
        if segments.len() >= options.max_intervals {
            return Err(QuadratureError::NotConverged {
                estimate: value,
                error,
            });
        }

        // Bisect the worst segment
        let (worst, _) = segments
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, s)| {
                if s.error > acc.1 { (i, s.error) } else { acc }
            });
        let seg = segments.swap_remove(worst);
        let mid = 0.5 * (seg.a + seg.b);
        if mid <= seg.a || mid >= seg.b {
            // Interval can no longer be split in floating point
            return Err(QuadratureError::NotConverged {
                estimate: value,
                error,
            });
        }
        segments.push(kronrod15(&f, seg.a, mid)?);
        segments.push(kronrod15(&f, mid, seg.b)?);
    }
}
