//! Math primitives shared by the cola crates.
//!
//! Provides the vector and complex aliases used throughout, helpers for
//! indexing periodic Fourier grids, and an adaptive quadrature routine for
//! the cosmological time integrals.

pub mod quad;

pub use quad::{QuadratureError, QuadratureOptions, integrate};

use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// Complex scalar used by every Fourier-space grid.
pub type Complex64 = num_complex::Complex64;

/// Signed frequency of grid index `i` on a periodic axis of `n` points.
///
/// Indices above `n/2` alias to negative frequencies; the Nyquist index
/// `n/2` is reported as positive.
#[inline]
pub fn fourier_index(i: usize, n: usize) -> i64 {
    if i <= n / 2 {
        i as i64
    } else {
        i as i64 - n as i64
    }
}

/// Index of the mode conjugate to `i` on a periodic axis: `(n - i) mod n`.
#[inline]
pub fn conjugate_index(i: usize, n: usize) -> usize {
    if i == 0 { 0 } else { n - i }
}

/// Wrap a coordinate into `[0, length)`.
#[inline]
pub fn wrap_periodic(x: f64, length: f64) -> f64 {
    let w = x.rem_euclid(length);
    // rem_euclid can round up to exactly `length` for tiny negative inputs
    if w >= length { 0.0 } else { w }
}

/// Wrap every component of a position into `[0, length)`.
#[inline]
pub fn wrap_position(x: &Vec3, length: f64) -> Vec3 {
    Vec3::new(
        wrap_periodic(x.x, length),
        wrap_periodic(x.y, length),
        wrap_periodic(x.z, length),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourier_index() {
        assert_eq!(fourier_index(0, 8), 0);
        assert_eq!(fourier_index(3, 8), 3);
        assert_eq!(fourier_index(4, 8), 4);
        assert_eq!(fourier_index(5, 8), -3);
        assert_eq!(fourier_index(7, 8), -1);
    }

    #[test]
    fn test_conjugate_index() {
        assert_eq!(conjugate_index(0, 8), 0);
        assert_eq!(conjugate_index(1, 8), 7);
        assert_eq!(conjugate_index(4, 8), 4);
    }

    #[test]
    fn test_wrap_periodic() {
        assert_eq!(wrap_periodic(65.0, 64.0), 1.0);
        assert_eq!(wrap_periodic(-1.0, 64.0), 63.0);
        assert_eq!(wrap_periodic(0.0, 64.0), 0.0);
        assert_eq!(wrap_periodic(64.0, 64.0), 0.0);

        let w = wrap_periodic(-1e-18, 64.0);
        assert!((0.0..64.0).contains(&w));
    }

    #[test]
    fn test_wrap_position() {
        let x = wrap_position(&Vec3::new(-2.0, 10.0, 130.0), 64.0);
        assert_eq!(x, Vec3::new(62.0, 10.0, 2.0));
    }
}
