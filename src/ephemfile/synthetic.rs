//! Synthetic ephemeris tables
//!
//! Generates deterministic, physically plausible ephemeris table files for
//! tests and demos when real data is unavailable. Each stored item follows a
//! circular orbit whose phase is drawn from a seeded RNG; the trajectories are
//! projected onto Chebyshev windows by sampling at Chebyshev nodes, so the
//! encoded states match the analytic truth to interpolation accuracy.

use std::io;
use std::path::Path;

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::{AU_KM, C_KM_S, DAY_S};
use crate::ephemfile::bodies::{FileItem, N_FILE_ITEMS};
use crate::ephemfile::errors::Result;
use crate::ephemfile::format::{ItemDescriptor, TableBuilder};

/// Model id carried by synthetic tables
pub const SYNTHETIC_MODEL_ID: u32 = 900;

/// Earth/Moon mass ratio written into synthetic tables
pub const SYNTHETIC_EMRAT: f64 = 81.30056;

/// Chebyshev terms per component in synthetic tables
const NTERMS: u32 = 8;

/// Sub-intervals per record in synthetic tables
const NPOLY: u32 = 2;

/// Record span in days
const SPAN_DAYS: f64 = 8.0;

/// One circular orbit, km and days
#[derive(Debug, Clone, Copy)]
struct Orbit {
    radius_km: f64,
    period_days: f64,
    phase: f64,
    /// Out-of-plane amplitude as a fraction of the radius
    tilt: f64,
    /// Gravitational parameter written to the descriptor, AU^3/day^2
    gm: f64,
}

impl Orbit {
    fn state(&self, jd: f64) -> (Vector3<f64>, Vector3<f64>) {
        let rate = 2.0 * std::f64::consts::PI / self.period_days; // rad/day
        let theta = rate * jd + self.phase;
        let (sin, cos) = theta.sin_cos();
        let position = Vector3::new(
            self.radius_km * cos,
            self.radius_km * sin,
            self.radius_km * self.tilt * sin,
        );
        // rad/day -> rad/s for the velocity
        let rate_s = rate / DAY_S;
        let velocity = Vector3::new(
            -self.radius_km * sin * rate_s,
            self.radius_km * cos * rate_s,
            self.radius_km * self.tilt * cos * rate_s,
        );
        (position, velocity)
    }
}

/// Deterministic synthetic solar-system model
pub struct SyntheticModel {
    orbits: Vec<Option<Orbit>>,
}

impl SyntheticModel {
    /// Build the standard eleven-item model from a seed
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        // (radius km, period days, gm AU^3/day^2) per file item, in item order:
        // Mercury, Venus, EMB, Mars, Jupiter, Saturn, Uranus, Neptune, Pluto,
        // geocentric Moon, Sun (SSB wobble).
        let params: [(f64, f64, f64); N_FILE_ITEMS] = [
            (0.387 * AU_KM, 87.97, 4.9e-11),
            (0.723 * AU_KM, 224.70, 7.2e-10),
            (1.000 * AU_KM, 365.25, 9.0e-10),
            (1.524 * AU_KM, 686.98, 9.5e-11),
            (5.203 * AU_KM, 4332.6, 2.8e-7),
            (9.537 * AU_KM, 10759.0, 8.5e-8),
            (19.19 * AU_KM, 30685.0, 1.3e-8),
            (30.07 * AU_KM, 60190.0, 1.5e-8),
            (39.48 * AU_KM, 90560.0, 2.2e-12),
            (384_400.0, 27.32, 1.1e-11),
            (743_000.0, 4332.6, 2.96e-4),
        ];
        let orbits = params
            .iter()
            .map(|&(radius_km, period_days, gm)| {
                Some(Orbit {
                    radius_km,
                    period_days,
                    phase: rng.gen_range(0.0..(2.0 * std::f64::consts::PI)),
                    tilt: rng.gen_range(0.0..0.1),
                    gm,
                })
            })
            .collect();
        Self { orbits }
    }

    /// Drop an item from the model, producing a file variant without it
    pub fn without_item(mut self, item: FileItem) -> Self {
        self.orbits[item] = None;
        self
    }

    /// Analytic truth state of an item, km and km/s
    pub fn truth(&self, item: FileItem, jd: f64) -> Option<(Vector3<f64>, Vector3<f64>)> {
        self.orbits.get(item).copied().flatten().map(|o| o.state(jd))
    }

    /// Lay the model out as a table builder covering `n_segments` segments of
    /// `records_per_segment` records each, starting at `start_jd`.
    pub fn builder(
        &self,
        start_jd: f64,
        n_segments: usize,
        records_per_segment: u32,
    ) -> Result<TableBuilder> {
        let mut builder = TableBuilder::new(
            SYNTHETIC_MODEL_ID,
            AU_KM,
            C_KM_S,
            SYNTHETIC_EMRAT,
            start_jd,
            SPAN_DAYS,
        );
        for orbit in &self.orbits {
            match orbit {
                Some(o) => builder.add_item(ItemDescriptor::position(NTERMS, NPOLY, o.gm)),
                None => builder.add_item(ItemDescriptor::absent()),
            };
        }

        let record_len = builder.record_len();
        let mut record_jd = start_jd;
        for _ in 0..n_segments {
            let segment_start = record_jd;
            let mut payload = Vec::with_capacity(records_per_segment as usize * record_len);
            for _ in 0..records_per_segment {
                payload.extend_from_slice(&self.encode_record(builder.items(), record_jd));
                record_jd += SPAN_DAYS;
            }
            builder.add_segment(segment_start, records_per_segment, &payload)?;
        }
        Ok(builder)
    }

    /// Write a synthetic table file: `n_segments` segments of
    /// `records_per_segment` records each
    pub fn write_file<P: AsRef<Path>>(
        &self,
        path: P,
        start_jd: f64,
        n_segments: usize,
        records_per_segment: u32,
    ) -> Result<()> {
        let builder = self.builder(start_jd, n_segments, records_per_segment)?;
        builder
            .write_file(path)
            .map_err(|e| crate::ephemfile::errors::EphemFileError::Other(e.to_string()))
    }

    /// Encode one record starting at `record_jd` into a flat double array
    fn encode_record(&self, items: &[ItemDescriptor], record_jd: f64) -> Vec<f64> {
        let record_len: usize = items.iter().map(|d| d.doubles_per_record()).sum();
        let mut record = vec![0.0; record_len];
        let sub_days = SPAN_DAYS / NPOLY as f64;

        for (item, desc) in items.iter().enumerate() {
            if !desc.is_present() {
                continue;
            }
            let orbit = match self.orbits[item] {
                Some(o) => o,
                None => continue,
            };
            let base = desc.offset as usize - 1;
            for sub in 0..NPOLY as usize {
                let sub_start = record_jd + sub as f64 * sub_days;
                for comp in 0..3 {
                    let coeffs = fit_chebyshev(NTERMS as usize, |x| {
                        let jd = sub_start + (x + 1.0) / 2.0 * sub_days;
                        orbit.state(jd).0[comp]
                    });
                    let at = base + (sub * 3 + comp) * NTERMS as usize;
                    record[at..at + NTERMS as usize].copy_from_slice(&coeffs);
                }
            }
        }
        record
    }
}

/// Project a function on [-1, 1] onto the first `n` Chebyshev polynomials by
/// sampling at the Chebyshev nodes.
fn fit_chebyshev<F: Fn(f64) -> f64>(n: usize, f: F) -> Vec<f64> {
    let samples: Vec<(f64, f64)> = (0..n)
        .map(|k| {
            let theta = std::f64::consts::PI * (k as f64 + 0.5) / n as f64;
            (theta, f(theta.cos()))
        })
        .collect();
    (0..n)
        .map(|j| {
            let sum: f64 = samples
                .iter()
                .map(|&(theta, value)| value * (j as f64 * theta).cos())
                .sum();
            let weight = if j == 0 { 1.0 } else { 2.0 };
            weight * sum / n as f64
        })
        .collect()
}
