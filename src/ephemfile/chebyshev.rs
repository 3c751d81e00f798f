//! Chebyshev polynomial tables for ephemeris interpolation
//!
//! JPL-style ephemeris tables encode smooth trajectories as Chebyshev
//! coefficient windows. Interpolation repeatedly evaluates the same polynomial
//! basis at one normalized time for every active item, so the basis values and
//! their derivatives are built once per (sub-interval, degree) pair and reused
//! across items and components.

use crate::ephemfile::errors::{EphemFileError, Result};

/// Scratch tables holding Chebyshev basis values T_k(x) and derivatives
/// T'_k(x), sized once to the maximum term count across all items.
#[derive(Debug, Clone)]
pub struct ChebyshevTables {
    /// T_k(x) for k in 0..capacity
    values: Vec<f64>,
    /// dT_k/dx for k in 0..capacity
    derivatives: Vec<f64>,
    /// Normalized time the tables were last built for
    x: f64,
    /// Number of valid entries in the tables
    degree: usize,
}

impl ChebyshevTables {
    /// Allocate tables for polynomials of up to `max_terms` terms
    pub fn new(max_terms: usize) -> Self {
        Self {
            values: vec![0.0; max_terms],
            derivatives: vec![0.0; max_terms],
            x: f64::NAN,
            degree: 0,
        }
    }

    /// Capacity in terms
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Ensure the tables cover `nterms` terms at normalized time `x`.
    ///
    /// The recurrences are re-run only when the sub-interval position or the
    /// requested degree changed since the last call.
    pub fn prepare(&mut self, x: f64, nterms: usize) -> Result<()> {
        if nterms > self.values.len() {
            return Err(EphemFileError::TooManyItems(nterms, self.values.len()));
        }
        if !(-1.0..=1.0).contains(&x) {
            return Err(EphemFileError::Other(format!(
                "Chebyshev argument {} outside [-1, 1]",
                x
            )));
        }
        if x == self.x && nterms <= self.degree {
            return Ok(());
        }

        // T_0 = 1, T_1 = x, T_k = 2x T_{k-1} - T_{k-2}
        // T'_0 = 0, T'_1 = 1, T'_k = 2x T'_{k-1} + 2 T_{k-1} - T'_{k-2}
        if nterms > 0 {
            self.values[0] = 1.0;
            self.derivatives[0] = 0.0;
        }
        if nterms > 1 {
            self.values[1] = x;
            self.derivatives[1] = 1.0;
        }
        for k in 2..nterms {
            self.values[k] = 2.0 * x * self.values[k - 1] - self.values[k - 2];
            self.derivatives[k] =
                2.0 * x * self.derivatives[k - 1] + 2.0 * self.values[k - 1]
                    - self.derivatives[k - 2];
        }
        self.x = x;
        self.degree = nterms;
        Ok(())
    }

    /// Dot product of the basis values against a coefficient window
    pub fn interpolate(&self, coefficients: &[f64]) -> f64 {
        coefficients
            .iter()
            .zip(self.values.iter())
            .map(|(c, t)| c * t)
            .sum()
    }

    /// Dot product of the basis derivatives against a coefficient window.
    /// The result is with respect to the normalized variable x; the caller
    /// applies the chain-rule scale to reach physical time.
    pub fn differentiate(&self, coefficients: &[f64]) -> f64 {
        coefficients
            .iter()
            .zip(self.derivatives.iter())
            .map(|(c, dt)| c * dt)
            .sum()
    }
}
