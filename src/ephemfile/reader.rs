//! Memory-mapped ephemeris table reader
//!
//! [`EphemerisTable`] answers `state(body, time)` by Chebyshev interpolation
//! over the coefficient records of an ephemeris table file. The file is
//! memory-mapped once at open; record lookup keeps a cursor over the current
//! record and segment and relocates lazily as time crosses record boundaries,
//! tolerating backward jumps via an explicit reverse scan.
//!
//! Not safe for concurrent callers: the record cursor and the Chebyshev
//! scratch tables mutate in place. External callers must serialize access.

use std::fs::File;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use memmap2::{Mmap, MmapOptions};
use nalgebra::Vector3;

use crate::constants::{AU3_DAY2_TO_M3_S2, DAY_S, KM_TO_M};
use crate::ephemfile::bodies::{FileItem, TargetBody, ITEM_EMBARY, ITEM_MOON_GEO};
use crate::ephemfile::chebyshev::ChebyshevTables;
use crate::ephemfile::errors::{io_err, EphemFileError, Result};
use crate::ephemfile::format::{TableHeader, DOUBLE_SIZE};

/// Hard cap on the item count a table may carry
pub const MAX_ITEMS: usize = 16;

/// Interpolated state of one item, km and km/s
#[derive(Debug, Clone, Copy, Default)]
struct ItemState {
    position: Vector3<f64>,
    velocity: Vector3<f64>,
}

/// Record/segment cursor for lazy relocation
#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Global (overlap-corrected) record index
    record: u64,
    /// Segment owning that record
    segment: usize,
    /// Byte offset of the record within the mapped file
    record_offset: usize,
}

/// Simulation epoch normalized into an (integer-day, fractional-day) pair
/// to preserve precision across long runs.
#[derive(Debug, Clone, Copy)]
struct EpochBase {
    jd_int: f64,
    jd_frac: f64,
}

/// Memory-mapped ephemeris table
pub struct EphemerisTable {
    /// Path the table was opened from
    path: PathBuf,
    /// Memory map over the whole file
    map: Mmap,
    /// Decoded, overlap-corrected header
    header: TableHeader,
    /// Byte offset of the coefficient payload
    payload_offset: usize,
    /// Per-item interpolation request flags
    active: Vec<bool>,
    /// Chebyshev scratch tables, sized to the max term count
    tables: ChebyshevTables,
    /// Coefficient window scratch, sized to the max term count
    coeff_buf: Vec<f64>,
    /// Latest interpolated state per item
    states: Vec<ItemState>,
    /// Cached record/segment position
    cursor: Option<Cursor>,
    /// Simulation time zero, set by initialize
    epoch: Option<EpochBase>,
    /// Global record index at simulation start (diagnostics)
    reference_record: u64,
    /// Fraction of the geocentric Moon vector from Earth to the EMB: 1/(1+emrat)
    moon_to_emb_fraction: f64,
    /// Earth-Moon L1 point as a fraction of the Earth-Moon distance from the Moon
    l1_fraction: f64,
    /// AU converted to meters
    au_m: f64,
    /// Per-item gravitational parameters converted to m^3/s^2
    gm_si: Vec<f64>,
    /// Time of the last successful update, seconds of simulation time
    updated_at: f64,
}

impl EphemerisTable {
    /// Open and pre-initialize a table, verifying the embedded model id
    /// matches the requested one.
    pub fn open<P: AsRef<Path>>(path: P, requested_model: u32) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf).map_err(|e| io_err(&path_buf, e))?;
        let map = unsafe { MmapOptions::new().map(&file) }.map_err(|e| io_err(&path_buf, e))?;

        let (header, payload_offset) = TableHeader::decode(&map)?;
        if header.model_id != requested_model {
            return Err(EphemFileError::ModelMismatch {
                found: header.model_id,
                requested: requested_model,
            });
        }
        if header.items.len() > MAX_ITEMS {
            return Err(EphemFileError::TooManyItems(header.items.len(), MAX_ITEMS));
        }

        let n_items = header.items.len();
        let max_terms = header.max_terms();
        Ok(Self {
            path: path_buf,
            map,
            payload_offset,
            active: vec![false; n_items],
            tables: ChebyshevTables::new(max_terms),
            coeff_buf: vec![0.0; max_terms],
            states: vec![ItemState::default(); n_items],
            cursor: None,
            epoch: None,
            reference_record: 0,
            moon_to_emb_fraction: 0.0,
            l1_fraction: 0.0,
            au_m: header.au_km * KM_TO_M,
            gm_si: header
                .items
                .iter()
                .map(|d| d.gm * AU3_DAY2_TO_M3_S2)
                .collect(),
            header,
            updated_at: 0.0,
        })
    }

    /// Path the table was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decoded header
    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// Numeric model identifier embedded in the file
    pub fn model_id(&self) -> u32 {
        self.header.model_id
    }

    /// Time of the last successful update, seconds of simulation time
    pub fn timestamp(&self) -> f64 {
        self.updated_at
    }

    /// Bind the simulation time axis to the table and derive physical
    /// constants.
    ///
    /// Simulation time zero corresponds to Julian date
    /// `epoch_jd + day_offset + time_offset_s / 86400`; `init_time_s` is the
    /// simulation time at which the run starts, used to derive the reference
    /// record number.
    pub fn initialize(
        &mut self,
        epoch_jd: f64,
        day_offset: f64,
        time_offset_s: f64,
        init_time_s: f64,
    ) -> Result<()> {
        // Split into integer and fractional days to preserve precision.
        let mut jd_int = epoch_jd.trunc() + day_offset.trunc();
        let mut jd_frac = (epoch_jd - epoch_jd.trunc())
            + (day_offset - day_offset.trunc())
            + time_offset_s / DAY_S;
        let carry = jd_frac.trunc();
        jd_int += carry;
        jd_frac -= carry;
        let epoch = EpochBase { jd_int, jd_frac };
        self.epoch = Some(epoch);

        let start_frac = self.fractional_record(epoch, init_time_s);
        if start_frac < 0.0 || start_frac >= self.header.total_records() as f64 {
            return Err(self.out_of_range(init_time_s));
        }
        self.reference_record = start_frac as u64;

        // Earth-Moon mass and distance relations: emrat = M_earth / M_moon.
        let emrat = self.header.emrat;
        self.moon_to_emb_fraction = 1.0 / (1.0 + emrat);
        self.l1_fraction = collinear_l1_fraction(self.moon_to_emb_fraction);
        Ok(())
    }

    /// Global record index at simulation start
    pub fn reference_record(&self) -> u64 {
        self.reference_record
    }

    /// Earth-Moon L1 point as a fraction of the Earth-Moon distance,
    /// measured from the Moon
    pub fn l1_fraction(&self) -> f64 {
        self.l1_fraction
    }

    /// AU in meters, from the file constant
    pub fn au_m(&self) -> f64 {
        self.au_m
    }

    /// Gravitational parameter of a file item in m^3/s^2
    pub fn gm_si(&self, item: FileItem) -> Option<f64> {
        self.gm_si.get(item).copied()
    }

    /// True when every file item a body needs is present in this variant.
    /// Item slots past the table's item count are absent.
    pub fn is_available(&self, body: TargetBody) -> bool {
        body.required_items()
            .iter()
            .all(|&item| self.header.items.get(item).map_or(false, |d| d.is_present()))
    }

    /// Drop every interpolation request
    pub fn clear_active_items(&mut self) {
        self.active.iter_mut().for_each(|a| *a = false);
    }

    /// Request interpolation of the items a body needs
    pub fn activate_body(&mut self, body: TargetBody) -> Result<()> {
        if !self.is_available(body) {
            return Err(EphemFileError::BodyUnavailable(body.name().to_string()));
        }
        for &item in body.required_items() {
            self.active[item] = true;
        }
        Ok(())
    }

    /// Number of items currently requested for interpolation
    pub fn active_item_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Explicit range check: true when `time_s` lies strictly inside the
    /// covered span
    pub fn covers(&self, time_s: f64) -> bool {
        match self.epoch {
            Some(epoch) => {
                let frac = self.fractional_record(epoch, time_s);
                frac >= 0.0 && frac < self.header.total_records() as f64
            }
            None => false,
        }
    }

    /// Fractional global record number at a simulation time
    fn fractional_record(&self, epoch: EpochBase, time_s: f64) -> f64 {
        let delta_days = (epoch.jd_int - self.header.start_jd_int)
            + (epoch.jd_frac - self.header.start_jd_frac)
            + time_s / DAY_S;
        delta_days / self.header.record_span_days
    }

    fn out_of_range(&self, time_s: f64) -> EphemFileError {
        let jd = self
            .epoch
            .map(|e| e.jd_int + e.jd_frac + time_s / DAY_S)
            .unwrap_or(f64::NAN);
        EphemFileError::OutOfRange {
            jd,
            start_jd: self.header.start_jd(),
            end_jd: self.header.end_jd(),
        }
    }

    /// Relocate the cursor to the segment owning a global record index.
    ///
    /// Scans forward or backward from the current segment; when the target
    /// lies in the final segment, jumps there directly.
    fn relocate(&mut self, record: u64) -> Result<Cursor> {
        let segments = &self.header.segments;
        let mut seg = self.cursor.map(|c| c.segment).unwrap_or(0);

        let last = segments.len() - 1;
        if record >= segments[last].first_record {
            seg = last;
        } else {
            while record >= segments[seg].first_record + segments[seg].records as u64 {
                seg += 1;
            }
            while record < segments[seg].first_record {
                seg -= 1;
            }
        }
        let descriptor = &segments[seg];
        if record < descriptor.first_record
            || record >= descriptor.first_record + descriptor.records as u64
        {
            return Err(EphemFileError::Other(format!(
                "Record {} not owned by any segment",
                record
            )));
        }

        // Rebind the coefficient window for the owning segment.
        let payload_record = descriptor.payload_record + (record - descriptor.first_record);
        let record_offset = self.payload_offset
            + payload_record as usize * self.header.record_len as usize * DOUBLE_SIZE;
        debug!(
            "Cursor moved to record {} (segment {}, payload record {})",
            record, seg, payload_record
        );
        Ok(Cursor {
            record,
            segment: seg,
            record_offset,
        })
    }

    /// Advance the table to a simulation time and interpolate every active
    /// item. Out-of-range times are a hard error; use [`covers`] to check
    /// first.
    ///
    /// [`covers`]: EphemerisTable::covers
    pub fn update(&mut self, time_s: f64) -> Result<()> {
        let epoch = match self.epoch {
            Some(epoch) => epoch,
            None => {
                return Err(EphemFileError::Other(
                    "update called before initialize".to_string(),
                ))
            }
        };
        let frac = self.fractional_record(epoch, time_s);
        if frac < 0.0 || frac >= self.header.total_records() as f64 {
            return Err(self.out_of_range(time_s));
        }
        let record = frac as u64;
        let block_frac = frac - record as f64;

        let cursor = match self.cursor {
            Some(c) if c.record == record => c,
            _ => {
                let c = self.relocate(record)?;
                self.cursor = Some(c);
                c
            }
        };

        for item in 0..self.active.len() {
            if self.active[item] {
                self.interpolate_item(item, cursor.record_offset, block_frac)?;
            }
        }
        self.updated_at = time_s;
        Ok(())
    }

    /// Interpolate one item at a fractional position inside the current
    /// record.
    fn interpolate_item(
        &mut self,
        item: FileItem,
        record_offset: usize,
        block_frac: f64,
    ) -> Result<()> {
        let desc = self.header.items[item];
        if !desc.is_present() {
            return Err(EphemFileError::BodyUnavailable(format!("item {}", item)));
        }
        let npoly = desc.npoly as usize;
        let nterms = desc.nterms as usize;
        let ncomp = desc.ncomp as usize;

        // Locate the sub-interval and its normalized time.
        let scaled = block_frac * npoly as f64;
        let sub = (scaled as usize).min(npoly - 1);
        let x = 2.0 * (scaled - sub as f64) - 1.0;
        self.tables.prepare(x, nterms)?;

        // Chain rule across day -> record -> sub-interval -> x.
        let dx_dt = 2.0 * npoly as f64 / (self.header.record_span_days * DAY_S);

        let window_base = record_offset + (desc.offset as usize - 1) * DOUBLE_SIZE;
        let mut state = ItemState::default();
        for comp in 0..ncomp.min(3) {
            let at = window_base + (sub * ncomp + comp) * nterms * DOUBLE_SIZE;
            let bytes = &self.map[at..at + nterms * DOUBLE_SIZE];
            LittleEndian::read_f64_into(bytes, &mut self.coeff_buf[..nterms]);

            let window = &self.coeff_buf[..nterms];
            state.position[comp] = self.tables.interpolate(window) * desc.scale;
            state.velocity[comp] = self.tables.differentiate(window) * desc.scale * dx_dt;
        }
        self.states[item] = state;
        Ok(())
    }

    /// Raw interpolated state of a file item, km and km/s
    fn item_state(&self, item: FileItem) -> (Vector3<f64>, Vector3<f64>) {
        let s = self.states.get(item).copied().unwrap_or_default();
        (s.position, s.velocity)
    }

    /// Barycentric state of a body, km and km/s, from the last update.
    ///
    /// Earth, the Moon, and the Earth-Moon barycenter are derived from the
    /// stored EMB and geocentric Moon items; the solar-system barycenter is
    /// the coordinate origin and is exactly zero.
    pub fn state(&self, body: TargetBody) -> Result<(Vector3<f64>, Vector3<f64>)> {
        if !self.is_available(body) {
            return Err(EphemFileError::BodyUnavailable(body.name().to_string()));
        }
        let state = match body {
            TargetBody::SolarSystemBarycenter => (Vector3::zeros(), Vector3::zeros()),
            TargetBody::EarthMoonBarycenter => self.item_state(ITEM_EMBARY),
            TargetBody::Earth => {
                let (emb_p, emb_v) = self.item_state(ITEM_EMBARY);
                let (geo_p, geo_v) = self.item_state(ITEM_MOON_GEO);
                (
                    emb_p - geo_p * self.moon_to_emb_fraction,
                    emb_v - geo_v * self.moon_to_emb_fraction,
                )
            }
            TargetBody::Moon => {
                let (emb_p, emb_v) = self.item_state(ITEM_EMBARY);
                let (geo_p, geo_v) = self.item_state(ITEM_MOON_GEO);
                let earth_p = emb_p - geo_p * self.moon_to_emb_fraction;
                let earth_v = emb_v - geo_v * self.moon_to_emb_fraction;
                (earth_p + geo_p, earth_v + geo_v)
            }
            _ => {
                let item = body
                    .direct_item()
                    .unwrap_or_else(|| unreachable!("non-derived body without an item"));
                self.item_state(item)
            }
        };
        Ok(state)
    }
}

/// Fraction of the primary-secondary separation from the secondary to the
/// collinear L1 point, found by Newton-Raphson on the degree-5 polynomial
///
/// g^5 - (3-mu) g^4 + (3-2mu) g^3 - mu g^2 + 2mu g - mu = 0
///
/// where `mu` is the secondary's mass fraction. Converges to 1e-15.
pub fn collinear_l1_fraction(mu: f64) -> f64 {
    let f = |g: f64| {
        g.powi(5) - (3.0 - mu) * g.powi(4) + (3.0 - 2.0 * mu) * g.powi(3) - mu * g * g
            + 2.0 * mu * g
            - mu
    };
    let fp = |g: f64| {
        5.0 * g.powi(4) - 4.0 * (3.0 - mu) * g.powi(3) + 3.0 * (3.0 - 2.0 * mu) * g * g
            - 2.0 * mu * g
            + 2.0 * mu
    };

    let mut g = (mu / 3.0).cbrt();
    for _ in 0..100 {
        let step = f(g) / fp(g);
        g -= step;
        if step.abs() < 1e-15 {
            break;
        }
    }
    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{AU_KM, C_KM_S};
    use crate::ephemfile::format::{ItemDescriptor, TableBuilder};
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    const START_JD: f64 = 2_451_545.0;

    /// A valid table carrying only two item slots: Mercury stored, Venus
    /// declared absent, everything past slot 1 not present at all.
    fn short_item_table(dir: &tempfile::TempDir) -> EphemerisTable {
        let path = dir.path().join("short.eph");
        let mut builder = TableBuilder::new(55, AU_KM, C_KM_S, 81.3, START_JD, 4.0);
        builder.add_item(ItemDescriptor::position(2, 1, 4.9e-11));
        builder.add_item(ItemDescriptor::absent());
        let rlen = builder.record_len();
        builder.add_segment(START_JD, 2, &vec![0.0; 2 * rlen]).unwrap();
        builder.write_file(&path).unwrap();
        EphemerisTable::open(&path, 55).unwrap()
    }

    #[test]
    fn test_short_item_table_marks_missing_slots_unavailable() {
        let dir = tempdir().unwrap();
        let table = short_item_table(&dir);

        assert!(table.is_available(TargetBody::Mercury));
        assert!(!table.is_available(TargetBody::Venus)); // absent descriptor

        // Bodies whose slots lie past the table's item count are unavailable
        // and silently excluded, same as absent descriptors.
        assert!(!table.is_available(TargetBody::Sun));
        assert!(!table.is_available(TargetBody::Moon));
        assert!(!table.is_available(TargetBody::EarthMoonBarycenter));
        assert!(matches!(
            table.state(TargetBody::Moon),
            Err(EphemFileError::BodyUnavailable(_))
        ));

        // The solar-system barycenter is the coordinate origin and needs no
        // stored items.
        assert!(table.is_available(TargetBody::SolarSystemBarycenter));
    }

    #[test]
    fn test_short_item_table_rejects_activation_of_missing_body() {
        let dir = tempdir().unwrap();
        let mut table = short_item_table(&dir);
        table.initialize(START_JD, 0.0, 0.0, 0.0).unwrap();

        assert!(matches!(
            table.activate_body(TargetBody::Sun),
            Err(EphemFileError::BodyUnavailable(_))
        ));
        table.activate_body(TargetBody::Mercury).unwrap();
        assert_eq!(table.active_item_count(), 1);
    }

    #[test]
    fn test_update_before_initialize_is_an_error() {
        let dir = tempdir().unwrap();
        let mut table = short_item_table(&dir);
        assert!(!table.covers(0.0));
        assert!(matches!(
            table.update(0.0),
            Err(EphemFileError::Other(_))
        ));
    }

    #[test]
    fn test_l1_fraction_earth_moon() {
        // DE-style Earth/Moon mass ratio.
        let mu = 1.0 / (1.0 + 81.30056);
        let g = collinear_l1_fraction(mu);
        // Known value: L1 sits about 15% of the separation from the Moon.
        assert_relative_eq!(g, 0.1509, epsilon = 1e-3);

        // The returned fraction is a root of the quintic to full precision.
        let residual = g.powi(5) - (3.0 - mu) * g.powi(4) + (3.0 - 2.0 * mu) * g.powi(3)
            - mu * g * g
            + 2.0 * mu * g
            - mu;
        assert!(residual.abs() < 1e-14);
    }

    #[test]
    fn test_l1_fraction_stays_physical() {
        // The root must stay inside the primary-secondary gap for any mass
        // fraction of a secondary lighter than the primary.
        for mu in [1e-6, 1e-3, 0.1, 0.3, 0.5] {
            let g = collinear_l1_fraction(mu);
            assert!(g > 0.0 && g < 1.0, "mu={} gave g={}", mu, g);
        }
    }
}
