//! Integration tests for the manager/provider protocol and the ephemeris
//! table reader: provider phase ordering, rebuild idempotence, interpolation
//! over multi-segment files, and segment overlap correction.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use tempfile::tempdir;

use ephemtree::adapter::FileEphemerisProvider;
use ephemtree::constants::{AU_KM, C_KM_S, DAY_S};
use ephemtree::ephemfile::bodies::N_FILE_ITEMS;
use ephemtree::ephemfile::format::{ItemDescriptor, TableBuilder};
use ephemtree::ephemfile::{EphemerisTable, SyntheticModel, TargetBody, SYNTHETIC_MODEL_ID};
use ephemtree::manager::{EphemeridesManager, EphemerisProvider};
use ephemtree::Result;

const START_JD: f64 = 2_451_545.0;

/// Provider that records every phase call into a shared log
struct RecordingProvider {
    name: String,
    log: Rc<RefCell<Vec<String>>>,
}

impl RecordingProvider {
    fn new(name: &str, log: Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            log,
        }
    }

    fn record(&self, phase: &str) {
        self.log.borrow_mut().push(format!("{}:{}", self.name, phase));
    }
}

impl EphemerisProvider for RecordingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> f64 {
        0.0
    }

    fn initialize(&mut self, _manager: &mut EphemeridesManager) -> Result<()> {
        self.record("initialize");
        Ok(())
    }

    fn activate(&mut self, _manager: &mut EphemeridesManager) -> Result<()> {
        self.record("activate");
        Ok(())
    }

    fn build_tree(&mut self, _manager: &mut EphemeridesManager) -> Result<()> {
        self.record("build");
        Ok(())
    }

    fn update(&mut self, _manager: &mut EphemeridesManager, _time: f64) -> Result<()> {
        self.record("update");
        Ok(())
    }
}

#[test]
fn test_activation_reverses_registration_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut manager = EphemeridesManager::new();
    for name in ["a", "b", "c"] {
        manager.add_provider(Box::new(RecordingProvider::new(name, log.clone())));
    }
    manager.initialize().unwrap();
    log.borrow_mut().clear();

    // Several notifications coalesce into exactly one rebuild.
    manager.note_tree_dirty();
    manager.note_tree_dirty();
    manager.update(0.0).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            "c:activate",
            "b:activate",
            "a:activate",
            "a:build",
            "b:build",
            "c:build",
            "a:update",
            "b:update",
            "c:update",
        ]
    );
}

#[test]
fn test_activate_is_idempotent_without_dirty_notification() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut manager = EphemeridesManager::new();
    manager.add_provider(Box::new(RecordingProvider::new("p", log.clone())));
    manager.initialize().unwrap();

    manager.update(0.0).unwrap(); // first update rebuilds
    log.borrow_mut().clear();
    manager.update(1.0).unwrap(); // no notification in between

    assert_eq!(*log.borrow(), vec!["p:update"]);
}

#[test]
fn test_in_range_update_yields_finite_states() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("synthetic.eph");
    let model = SyntheticModel::new(42);
    model.write_file(&path, START_JD, 3, 20).unwrap();

    let table = EphemerisTable::open(&path, SYNTHETIC_MODEL_ID).unwrap();
    let mut manager = EphemeridesManager::new();
    manager.add_provider(Box::new(FileEphemerisProvider::new(table, START_JD, 0.0)));
    manager.initialize().unwrap();

    for body in [
        "Mercury", "Venus", "Earth", "Mars", "Jupiter", "Saturn", "Uranus", "Neptune", "Pluto",
        "Moon", "Sun", "EMBary",
    ] {
        manager.subscribe_frame(&format!("{}.inertial", body)).unwrap();
    }

    // Strictly inside the covered span: 3 segments x 20 records x 8 days.
    let time = 200.0 * DAY_S;
    manager.update(time).unwrap();

    for body in ["Mercury", "Earth", "Moon", "Pluto", "Sun"] {
        let frame = manager.tree().find(&format!("{}.inertial", body)).unwrap();
        let state = &manager.tree().frame(frame).state;
        assert!(
            state.position.iter().all(|v| v.is_finite()),
            "{} position not finite",
            body
        );
        assert!(
            state.velocity.iter().all(|v| v.is_finite()),
            "{} velocity not finite",
            body
        );
        assert_eq!(state.timestamp, time);
    }
}

#[test]
fn test_record_lookup_is_path_independent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("synthetic.eph");
    let model = SyntheticModel::new(11);
    model.write_file(&path, START_JD, 4, 15).unwrap();

    // One reader walks forward through the file segment by segment.
    let mut walker = EphemerisTable::open(&path, SYNTHETIC_MODEL_ID).unwrap();
    walker.initialize(START_JD, 0.0, 0.0, 0.0).unwrap();
    walker.activate_body(TargetBody::Mars).unwrap();
    let target = 410.0 * DAY_S; // in the final segment
    let mut t = 0.0;
    while t < target {
        walker.update(t).unwrap();
        t += 16.0 * DAY_S;
    }
    walker.update(target).unwrap();
    let (walked_pos, walked_vel) = walker.state(TargetBody::Mars).unwrap();

    // Another jumps straight to the target time.
    let mut jumper = EphemerisTable::open(&path, SYNTHETIC_MODEL_ID).unwrap();
    jumper.initialize(START_JD, 0.0, 0.0, 0.0).unwrap();
    jumper.activate_body(TargetBody::Mars).unwrap();
    jumper.update(target).unwrap();
    let (jumped_pos, jumped_vel) = jumper.state(TargetBody::Mars).unwrap();

    assert_eq!(walked_pos, jumped_pos);
    assert_eq!(walked_vel, jumped_vel);

    // Walking backward lands on the same record too.
    walker.update(100.0 * DAY_S).unwrap();
    jumper.update(100.0 * DAY_S).unwrap();
    assert_eq!(
        walker.state(TargetBody::Mars).unwrap(),
        jumper.state(TargetBody::Mars).unwrap()
    );
}

/// Two segments of 100 declared records each where the second starts one
/// record span before the first ends. The overlapping record is dropped from
/// the first segment's usable count and the boundary record is served by the
/// second segment.
#[test]
fn test_segment_overlap_correction() {
    const SPAN: f64 = 4.0;
    let dir = tempdir().unwrap();
    let path = dir.path().join("overlap.eph");

    let mut builder = TableBuilder::new(77, AU_KM, C_KM_S, 81.3, START_JD, SPAN);
    // Mercury's slot carries a constant position; the rest are absent.
    builder.add_item(ItemDescriptor::position(2, 1, 4.9e-11));
    for _ in 1..N_FILE_ITEMS {
        builder.add_item(ItemDescriptor::absent());
    }
    let record_len = builder.record_len();
    assert_eq!(record_len, 6); // 1 sub-interval x 3 components x 2 terms

    let constant_records = |value: f64, count: usize| -> Vec<f64> {
        let mut payload = Vec::with_capacity(count * record_len);
        for _ in 0..count {
            for _ in 0..3 {
                payload.push(value); // c0
                payload.push(0.0); // c1
            }
        }
        payload
    };

    builder
        .add_segment(START_JD, 100, &constant_records(1.0, 100))
        .unwrap();
    builder
        .add_segment(START_JD + 99.0 * SPAN, 100, &constant_records(2.0, 100))
        .unwrap();
    builder.write_file(&path).unwrap();

    let mut table = EphemerisTable::open(&path, 77).unwrap();
    let header = table.header();
    assert_eq!(header.segments[0].records, 99);
    assert_eq!(header.segments[0].declared_records, 100);
    assert_eq!(header.segments[1].records, 100);
    assert_eq!(header.total_records(), 199);
    assert_eq!(header.declared_records(), 200);

    table.initialize(START_JD, 0.0, 0.0, 0.0).unwrap();
    table.activate_body(TargetBody::Mercury).unwrap();

    // Global record 99 is the boundary; it resolves into the second segment.
    let boundary = (99.0 * SPAN + 0.5 * SPAN) * DAY_S;
    table.update(boundary).unwrap();
    let (pos, _) = table.state(TargetBody::Mercury).unwrap();
    assert_relative_eq!(pos.x, 2.0, epsilon = 1e-12);
    assert_relative_eq!(pos.y, 2.0, epsilon = 1e-12);

    // The record just before comes from the first segment.
    table.update((98.0 * SPAN + 0.5 * SPAN) * DAY_S).unwrap();
    let (pos, _) = table.state(TargetBody::Mercury).unwrap();
    assert_relative_eq!(pos.x, 1.0, epsilon = 1e-12);
}
