//! Linear matter power spectra P(k).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{CosmologyError, Result};

/// The linear power spectrum evaluated at a wavenumber magnitude.
pub trait PowerSpectrum: Send + Sync {
    fn value(&self, k: f64) -> f64;
}

impl<F> PowerSpectrum for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn value(&self, k: f64) -> f64 {
        self(k)
    }
}

/// White-noise spectrum, P(k) = amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantSpectrum {
    pub amplitude: f64,
}

impl ConstantSpectrum {
    pub fn new(amplitude: f64) -> Self {
        Self { amplitude }
    }
}

impl PowerSpectrum for ConstantSpectrum {
    fn value(&self, _k: f64) -> f64 {
        self.amplitude
    }
}

/// Tabulated spectrum, interpolated linearly in log k – log P.
///
/// Zero outside the tabulated range.
#[derive(Debug, Clone)]
pub struct TabulatedSpectrum {
    log_k: Vec<f64>,
    log_p: Vec<f64>,
}

impl TabulatedSpectrum {
    /// Build from `(k, P)` pairs with strictly increasing positive `k` and
    /// positive `P`.
    pub fn from_points(points: &[(f64, f64)]) -> Result<Self> {
        if points.is_empty() {
            return Err(CosmologyError::EmptyTable);
        }
        let mut log_k = Vec::with_capacity(points.len());
        let mut log_p = Vec::with_capacity(points.len());
        for (i, &(k, p)) in points.iter().enumerate() {
            if !(k > 0.0 && p > 0.0) {
                return Err(CosmologyError::Table {
                    line: i + 1,
                    message: format!("k = {k} and P = {p} must both be positive"),
                });
            }
            let lk = k.ln();
            if log_k.last().is_some_and(|&prev| lk <= prev) {
                return Err(CosmologyError::Table {
                    line: i + 1,
                    message: format!("k = {k} is not increasing"),
                });
            }
            log_k.push(lk);
            log_p.push(p.ln());
        }
        Ok(Self { log_k, log_p })
    }

    /// Parse a whitespace-separated `k P(k)` table. Blank lines and lines
    /// starting with `#` are skipped; extra columns are ignored.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut points = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut cols = trimmed.split_whitespace().map(str::parse::<f64>);
            match (cols.next(), cols.next()) {
                (Some(Ok(k)), Some(Ok(p))) => points.push((k, p)),
                _ => {
                    return Err(CosmologyError::Table {
                        line: n + 1,
                        message: format!("expected two numbers, got '{trimmed}'"),
                    });
                }
            }
        }
        let table = Self::from_points(&points)?;
        tracing::debug!(entries = table.len(), "read power spectrum table");
        Ok(table)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn len(&self) -> usize {
        self.log_k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_k.is_empty()
    }

    /// Tabulated wavenumber range.
    pub fn k_range(&self) -> (f64, f64) {
        (self.log_k[0].exp(), self.log_k[self.len() - 1].exp())
    }
}

impl PowerSpectrum for TabulatedSpectrum {
    fn value(&self, k: f64) -> f64 {
        if !(k > 0.0) {
            return 0.0;
        }
        let lk = k.ln();
        let n = self.log_k.len();
        if lk < self.log_k[0] || lk > self.log_k[n - 1] {
            return 0.0;
        }
        if n == 1 {
            return self.log_p[0].exp();
        }
        // First node strictly above lk, clamped so [hi - 1, hi] is a valid bracket
        let hi = self.log_k.partition_point(|&x| x <= lk).clamp(1, n - 1);
        let lo = hi - 1;
        let t = (lk - self.log_k[lo]) / (self.log_k[hi] - self.log_k[lo]);
        (self.log_p[lo] + t * (self.log_p[hi] - self.log_p[lo])).exp()
    }
}
