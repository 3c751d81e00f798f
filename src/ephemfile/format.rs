//! On-disk format for binary ephemeris tables
//!
//! An ephemeris table is a little-endian file holding Chebyshev coefficient
//! records for a set of translation items. The layout is explicit and
//! versioned so the format stays inspectable by external tooling:
//!
//! ```text
//! offset  field
//! 0       magic, 8 bytes: "EPHMTBL\0"
//! 8       format version (u32)
//! 12      model id (u32), e.g. 421
//! 16      item count (u32)
//! 20      segment count (u32)
//! 24      record length in doubles (u32)
//! 28      reserved (u32, zero)
//! 32      AU in km (f64)
//! 40      speed of light in km/s (f64)
//! 48      Earth/Moon mass ratio (f64)
//! 56      first record epoch, integer Julian days (f64)
//! 64      first record epoch, fractional day (f64)
//! 72      record span in days (f64)
//! 80      item descriptors, 32 bytes each
//! ...     segment descriptors, 16 bytes each
//! ...     coefficient payload: per segment, record-count records of
//!         record-length doubles; each item occupies the window
//!         [offset-1, offset-1 + npoly*ncomp*nterms) within a record,
//!         grouped as npoly sub-intervals of ncomp components of nterms
//!         consecutive coefficients.
//! ```
//!
//! Items absent from a file variant carry offset 0.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde::Serialize;

use crate::ephemfile::errors::{EphemFileError, Result};

/// Magic bytes identifying an ephemeris table file
pub const MAGIC_BYTES: &[u8; 8] = b"EPHMTBL\0";

/// Current version of the table format
pub const FORMAT_VERSION: u32 = 1;

/// Size of the fixed header in bytes
pub const HEADER_LEN: usize = 80;

/// Size of one item descriptor in bytes
pub const ITEM_DESC_LEN: usize = 32;

/// Size of one segment descriptor in bytes
pub const SEGMENT_DESC_LEN: usize = 16;

/// Size of a double-precision value in bytes
pub const DOUBLE_SIZE: usize = 8;

/// Descriptor for one translation item stored in the table
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ItemDescriptor {
    /// 1-based double index of the item's window within a record; 0 = absent
    pub offset: u32,
    /// Chebyshev terms per component
    pub nterms: u32,
    /// Sub-intervals (polynomials) per record
    pub npoly: u32,
    /// Components per sub-interval (3 for position items)
    pub ncomp: u32,
    /// Gravitational parameter, AU^3/day^2
    pub gm: f64,
    /// Position scale: km per stored coefficient unit
    pub scale: f64,
}

impl ItemDescriptor {
    /// Descriptor for an item absent from this file variant
    pub fn absent() -> Self {
        Self {
            offset: 0,
            nterms: 0,
            npoly: 0,
            ncomp: 0,
            gm: 0.0,
            scale: 1.0,
        }
    }

    /// Descriptor for a present position item (offset assigned by the builder)
    pub fn position(nterms: u32, npoly: u32, gm: f64) -> Self {
        Self {
            offset: 0,
            nterms,
            npoly,
            ncomp: 3,
            gm,
            scale: 1.0,
        }
    }

    /// True if the item is stored in this file variant
    pub fn is_present(&self) -> bool {
        self.offset > 0
    }

    /// Doubles this item occupies within one record
    pub fn doubles_per_record(&self) -> usize {
        (self.npoly * self.ncomp * self.nterms) as usize
    }
}

/// Descriptor for one segment of records sharing a coefficient layout
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SegmentDescriptor {
    /// Epoch of the segment's first record, Julian date
    pub start_jd: f64,
    /// Record count as declared in the file
    pub declared_records: u32,
    /// Record count after overlap correction
    pub records: u32,
    /// First global (corrected) record index owned by this segment
    pub first_record: u64,
    /// First payload record index (declared layout) of this segment
    pub payload_record: u64,
}

impl SegmentDescriptor {
    /// Epoch just past the segment's last corrected record, Julian date
    pub fn end_jd(&self, span_days: f64) -> f64 {
        self.start_jd + self.records as f64 * span_days
    }
}

/// Decoded header of an ephemeris table
#[derive(Debug, Clone, Serialize)]
pub struct TableHeader {
    /// Numeric model identifier embedded in the file
    pub model_id: u32,
    /// Length of one record in doubles
    pub record_len: u32,
    /// Astronomical unit, km
    pub au_km: f64,
    /// Speed of light, km/s
    pub c_km_s: f64,
    /// Earth/Moon mass ratio
    pub emrat: f64,
    /// First record epoch, integer Julian days
    pub start_jd_int: f64,
    /// First record epoch, fractional day
    pub start_jd_frac: f64,
    /// Record span, days
    pub record_span_days: f64,
    /// Per-item descriptors
    pub items: Vec<ItemDescriptor>,
    /// Segment table, overlap-corrected
    pub segments: Vec<SegmentDescriptor>,
}

impl TableHeader {
    /// Decode the header from the front of a mapped file. Returns the header
    /// and the byte offset of the coefficient payload.
    pub fn decode(bytes: &[u8]) -> Result<(TableHeader, usize)> {
        if bytes.len() < HEADER_LEN {
            return Err(EphemFileError::InvalidFormat(
                "File too short for header".to_string(),
            ));
        }
        if &bytes[0..8] != MAGIC_BYTES {
            return Err(EphemFileError::InvalidFormat(
                "Bad magic bytes: not an ephemeris table file".to_string(),
            ));
        }
        let version = LittleEndian::read_u32(&bytes[8..12]);
        if version != FORMAT_VERSION {
            return Err(EphemFileError::InvalidFormat(format!(
                "Unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let model_id = LittleEndian::read_u32(&bytes[12..16]);
        let n_items = LittleEndian::read_u32(&bytes[16..20]) as usize;
        let n_segments = LittleEndian::read_u32(&bytes[20..24]) as usize;
        let record_len = LittleEndian::read_u32(&bytes[24..28]);
        let au_km = LittleEndian::read_f64(&bytes[32..40]);
        let c_km_s = LittleEndian::read_f64(&bytes[40..48]);
        let emrat = LittleEndian::read_f64(&bytes[48..56]);
        let start_jd_int = LittleEndian::read_f64(&bytes[56..64]);
        let start_jd_frac = LittleEndian::read_f64(&bytes[64..72]);
        let record_span_days = LittleEndian::read_f64(&bytes[72..80]);

        if record_span_days <= 0.0 {
            return Err(EphemFileError::InvalidFormat(
                "Non-positive record span".to_string(),
            ));
        }
        if n_segments == 0 {
            return Err(EphemFileError::InvalidFormat(
                "Table carries no segments".to_string(),
            ));
        }

        let items_end = HEADER_LEN + n_items * ITEM_DESC_LEN;
        let segments_end = items_end + n_segments * SEGMENT_DESC_LEN;
        if bytes.len() < segments_end {
            return Err(EphemFileError::InvalidFormat(
                "File too short for descriptor tables".to_string(),
            ));
        }

        let mut items = Vec::with_capacity(n_items);
        for i in 0..n_items {
            let at = HEADER_LEN + i * ITEM_DESC_LEN;
            let desc = ItemDescriptor {
                offset: LittleEndian::read_u32(&bytes[at..at + 4]),
                nterms: LittleEndian::read_u32(&bytes[at + 4..at + 8]),
                npoly: LittleEndian::read_u32(&bytes[at + 8..at + 12]),
                ncomp: LittleEndian::read_u32(&bytes[at + 12..at + 16]),
                gm: LittleEndian::read_f64(&bytes[at + 16..at + 24]),
                scale: LittleEndian::read_f64(&bytes[at + 24..at + 32]),
            };
            if desc.is_present() {
                let window_end = desc.offset as usize - 1 + desc.doubles_per_record();
                if window_end > record_len as usize {
                    return Err(EphemFileError::InvalidFormat(format!(
                        "Item {} window ends at {} past record length {}",
                        i, window_end, record_len
                    )));
                }
                if desc.nterms == 0 || desc.npoly == 0 || desc.ncomp == 0 {
                    return Err(EphemFileError::InvalidFormat(format!(
                        "Item {} present but has an empty window",
                        i
                    )));
                }
            }
            items.push(desc);
        }

        let mut segments = Vec::with_capacity(n_segments);
        for i in 0..n_segments {
            let at = items_end + i * SEGMENT_DESC_LEN;
            let start_jd = LittleEndian::read_f64(&bytes[at..at + 8]);
            let declared_records = LittleEndian::read_u32(&bytes[at + 8..at + 12]);
            segments.push(SegmentDescriptor {
                start_jd,
                declared_records,
                records: declared_records,
                first_record: 0,
                payload_record: 0,
            });
        }

        let mut header = TableHeader {
            model_id,
            record_len,
            au_km,
            c_km_s,
            emrat,
            start_jd_int,
            start_jd_frac,
            record_span_days,
            items,
            segments,
        };
        header.correct_overlaps();

        let payload_bytes = header.declared_records() as usize
            * header.record_len as usize
            * DOUBLE_SIZE;
        if bytes.len() < segments_end + payload_bytes {
            return Err(EphemFileError::InvalidFormat(format!(
                "File too short for coefficient payload: need {} bytes past the tables",
                payload_bytes
            )));
        }

        Ok((header, segments_end))
    }

    /// Correct overlapping segments: a segment's record count is decremented
    /// whenever its stated end epoch exceeds the next segment's start epoch.
    /// Cumulative record indices are then assigned.
    fn correct_overlaps(&mut self) {
        let span = self.record_span_days;
        for i in 0..self.segments.len().saturating_sub(1) {
            let next_start = self.segments[i + 1].start_jd;
            let seg = &mut self.segments[i];
            while seg.records > 0 && seg.end_jd(span) > next_start + 1e-9 {
                seg.records -= 1;
            }
        }
        let mut first_record = 0u64;
        let mut payload_record = 0u64;
        for seg in &mut self.segments {
            seg.first_record = first_record;
            seg.payload_record = payload_record;
            first_record += seg.records as u64;
            payload_record += seg.declared_records as u64;
        }
    }

    /// Total records in the file as laid out (declared counts)
    pub fn declared_records(&self) -> u64 {
        self.segments.iter().map(|s| s.declared_records as u64).sum()
    }

    /// Total usable records after overlap correction
    pub fn total_records(&self) -> u64 {
        self.segments.iter().map(|s| s.records as u64).sum()
    }

    /// Epoch of the first record, Julian date
    pub fn start_jd(&self) -> f64 {
        self.start_jd_int + self.start_jd_frac
    }

    /// Epoch just past the last usable record, Julian date
    pub fn end_jd(&self) -> f64 {
        self.segments
            .last()
            .map(|s| s.end_jd(self.record_span_days))
            .unwrap_or_else(|| self.start_jd())
    }

    /// Maximum term count across present items (scratch-table sizing)
    pub fn max_terms(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.is_present())
            .map(|d| d.nterms as usize)
            .max()
            .unwrap_or(0)
    }
}

/// Builder producing an ephemeris table file.
///
/// Item windows are laid out in registration order; offsets and the record
/// length are assigned on `finish_items`.
pub struct TableBuilder {
    model_id: u32,
    au_km: f64,
    c_km_s: f64,
    emrat: f64,
    start_jd_int: f64,
    start_jd_frac: f64,
    record_span_days: f64,
    items: Vec<ItemDescriptor>,
    record_len: u32,
    segments: Vec<(f64, u32)>,
    payload: Vec<f64>,
}

impl TableBuilder {
    /// Start a builder for the given model id, constants, and record grid
    pub fn new(
        model_id: u32,
        au_km: f64,
        c_km_s: f64,
        emrat: f64,
        start_jd: f64,
        record_span_days: f64,
    ) -> Self {
        let start_jd_int = start_jd.trunc();
        Self {
            model_id,
            au_km,
            c_km_s,
            emrat,
            start_jd_int,
            start_jd_frac: start_jd - start_jd_int,
            record_span_days,
            items: Vec::new(),
            record_len: 0,
            segments: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Append an item descriptor. Present items get their window offset
    /// assigned; absent ones keep offset 0.
    pub fn add_item(&mut self, mut desc: ItemDescriptor) -> usize {
        if desc.nterms > 0 && desc.npoly > 0 && desc.ncomp > 0 {
            desc.offset = self.record_len + 1;
            self.record_len += desc.doubles_per_record() as u32;
        } else {
            desc.offset = 0;
        }
        self.items.push(desc);
        self.items.len() - 1
    }

    /// Item descriptors as laid out so far
    pub fn items(&self) -> &[ItemDescriptor] {
        &self.items
    }

    /// Record length in doubles as laid out so far
    pub fn record_len(&self) -> usize {
        self.record_len as usize
    }

    /// Append a segment. `records` must hold `count * record_len` doubles.
    pub fn add_segment(&mut self, start_jd: f64, count: u32, records: &[f64]) -> Result<()> {
        let expected = count as usize * self.record_len as usize;
        if records.len() != expected {
            return Err(EphemFileError::InvalidFormat(format!(
                "Segment payload holds {} doubles, expected {}",
                records.len(),
                expected
            )));
        }
        self.segments.push((start_jd, count));
        self.payload.extend_from_slice(records);
        Ok(())
    }

    /// Write the table in binary format
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(MAGIC_BYTES)?;
        writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        writer.write_u32::<LittleEndian>(self.model_id)?;
        writer.write_u32::<LittleEndian>(self.items.len() as u32)?;
        writer.write_u32::<LittleEndian>(self.segments.len() as u32)?;
        writer.write_u32::<LittleEndian>(self.record_len)?;
        writer.write_u32::<LittleEndian>(0)?; // reserved
        writer.write_f64::<LittleEndian>(self.au_km)?;
        writer.write_f64::<LittleEndian>(self.c_km_s)?;
        writer.write_f64::<LittleEndian>(self.emrat)?;
        writer.write_f64::<LittleEndian>(self.start_jd_int)?;
        writer.write_f64::<LittleEndian>(self.start_jd_frac)?;
        writer.write_f64::<LittleEndian>(self.record_span_days)?;

        for item in &self.items {
            writer.write_u32::<LittleEndian>(item.offset)?;
            writer.write_u32::<LittleEndian>(item.nterms)?;
            writer.write_u32::<LittleEndian>(item.npoly)?;
            writer.write_u32::<LittleEndian>(item.ncomp)?;
            writer.write_f64::<LittleEndian>(item.gm)?;
            writer.write_f64::<LittleEndian>(item.scale)?;
        }
        for (start_jd, count) in &self.segments {
            writer.write_f64::<LittleEndian>(*start_jd)?;
            writer.write_u32::<LittleEndian>(*count)?;
            writer.write_u32::<LittleEndian>(0)?; // reserved
        }
        for value in &self.payload {
            writer.write_f64::<LittleEndian>(*value)?;
        }
        Ok(())
    }

    /// Write the table to a file at the given path
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()
    }
}
