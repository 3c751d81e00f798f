//! Ephemeris Table Information Tool
//!
//! This binary analyzes binary ephemeris table files and prints information
//! about the data they contain, including format version, time coverage,
//! included items, segment layout, and size statistics.
//!
//! Usage:
//!   cargo run --bin ephem_info -- [--json] [--debug] path/to/table.eph

use std::path::Path;
use std::time::Instant;

use clap::{ArgAction, Parser};
use ephemtree::ephemfile::bodies::item_name;
use ephemtree::ephemfile::format::{TableHeader, DOUBLE_SIZE};

/// Type alias for the error type used throughout this module
type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Ephemeris Table Information Tool
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Analyzes and displays information about binary ephemeris table files",
    long_about = None
)]
struct Args {
    /// Dump the decoded header as JSON and exit
    #[arg(short, long, action = ArgAction::SetTrue)]
    json: bool,

    /// Display detailed debugging information
    #[arg(short, long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Ephemeris table file to analyze
    filename: String,
}

/// Format bytes as KB, MB, or GB
fn format_size(size_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size_bytes >= GB {
        format!("{:.2} GB", size_bytes as f64 / GB as f64)
    } else if size_bytes >= MB {
        format!("{:.2} MB", size_bytes as f64 / MB as f64)
    } else if size_bytes >= KB {
        format!("{:.2} KB", size_bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", size_bytes)
    }
}

/// Prints a section header with a title and separator line
fn print_section_header(title: &str) {
    println!("\n{}:", title);
    println!("-------------------------------------------------------");
}

/// Helper to print named values in a formatted way
fn print_named_value(name: &str, value: impl std::fmt::Display) {
    println!("{}: {}", name, value);
}

/// Displays header constants and coverage
fn display_header(header: &TableHeader) {
    print_section_header("Table Header");
    print_named_value("Model id", header.model_id);
    print_named_value("Record length", format!("{} doubles", header.record_len));
    print_named_value("Record span", format!("{} days", header.record_span_days));
    print_named_value("AU", format!("{} km", header.au_km));
    print_named_value("Light speed", format!("{} km/s", header.c_km_s));
    print_named_value("Earth/Moon mass ratio", header.emrat);

    print_section_header("Time Coverage");
    let start = header.start_jd();
    let end = header.end_jd();
    let duration_days = end - start;
    print_named_value("Start", format!("JD {:.2}", start));
    print_named_value("End", format!("JD {:.2}", end));
    print_named_value(
        "Duration",
        format!(
            "{:.1} days ({:.1} years)",
            duration_days,
            duration_days / 365.25
        ),
    );
    print_named_value(
        "Records",
        format!(
            "{} usable of {} declared",
            header.total_records(),
            header.declared_records()
        ),
    );
}

/// Displays the per-item coefficient layout
fn display_items(header: &TableHeader) {
    print_section_header(format!("Items ({} slots)", header.items.len()).as_str());
    println!(
        "{:<4} {:<12} {:<8} {:<7} {:<6} {:<6} {:<14}",
        "Slot", "Name", "Offset", "Terms", "Poly", "Comp", "GM (file units)"
    );
    println!("-------------------------------------------------------");
    for (slot, item) in header.items.iter().enumerate() {
        let name = item_name(slot).unwrap_or("?");
        if !item.is_present() {
            println!("{:<4} {:<12} absent", slot, name);
            continue;
        }
        println!(
            "{:<4} {:<12} {:<8} {:<7} {:<6} {:<6} {:<14e}",
            slot, name, item.offset, item.nterms, item.npoly, item.ncomp, item.gm
        );
    }
}

/// Displays segment layout, flagging overlap corrections
fn display_segments(header: &TableHeader) {
    print_section_header(format!("Segments ({} total)", header.segments.len()).as_str());
    println!(
        "{:<6} {:<14} {:<14} {:<10} {:<10}",
        "Index", "Start JD", "End JD", "Records", "Declared"
    );
    println!("-------------------------------------------------------");
    for (index, segment) in header.segments.iter().enumerate() {
        let corrected = if segment.records != segment.declared_records {
            " (overlap corrected)"
        } else {
            ""
        };
        println!(
            "{:<6} {:<14.2} {:<14.2} {:<10} {:<10}{}",
            index,
            segment.start_jd,
            segment.end_jd(header.record_span_days),
            segment.records,
            segment.declared_records,
            corrected
        );
    }
}

/// Displays payload-layout debug information
fn display_debug_info(header: &TableHeader) {
    print_section_header("Debug Information");
    print_named_value("Max Chebyshev terms", header.max_terms());
    let record_bytes = header.record_len as usize * DOUBLE_SIZE;
    print_named_value("Record size", format_size(record_bytes as u64));

    println!("\nSegment payload offsets (records):");
    for (index, segment) in header.segments.iter().enumerate() {
        println!(
            "  segment {}: lookup base {}, payload base {}",
            index, segment.first_record, segment.payload_record
        );
    }

    println!("\nItem coefficient windows (doubles within a record):");
    for (slot, item) in header.items.iter().enumerate() {
        if !item.is_present() {
            continue;
        }
        let start = item.offset as usize - 1;
        println!(
            "  {}: [{}, {})",
            item_name(slot).unwrap_or("?"),
            start,
            start + item.doubles_per_record()
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path = Path::new(&args.filename);
    let metadata = std::fs::metadata(path)?;
    let start_time = Instant::now();

    let bytes = std::fs::read(path)?;
    let (header, payload_offset) = TableHeader::decode(&bytes)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&header)?);
        return Ok(());
    }

    println!("Analyzing ephemeris table: {}", args.filename);
    println!("-------------------------------------------------------");
    println!("File size: {}", format_size(metadata.len()));
    println!(
        "Header: {}, payload: {}",
        format_size(payload_offset as u64),
        format_size(metadata.len() - payload_offset as u64)
    );
    println!("File loaded in {:.2?}", start_time.elapsed());

    display_header(&header);
    display_items(&header);
    display_segments(&header);

    if args.debug {
        display_debug_info(&header);
    }

    Ok(())
}
