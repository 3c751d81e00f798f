//! File ephemeris adapter
//!
//! Binds a binary ephemeris table to the manager protocol. The adapter
//! registers one body and one translation item per body the file can serve,
//! decides per rebuild which bodies interpolation must cover, picks the tree
//! root, and writes root-relative states into the frame tree on update.

use std::collections::HashMap;

use log::debug;

use crate::ephemfile::{EphemerisTable, TargetBody};
use crate::framelib::FrameId;
use crate::items::{ItemAspect, ItemId};
use crate::manager::{EphemeridesManager, EphemerisProvider};
use crate::Result;

/// Adapter-side status of one representable body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStatus {
    /// The body's item is disabled
    Deselected,
    /// Enabled but nothing needs it this rebuild
    Inactive,
    /// Needed this rebuild, not yet placed in the tree
    Active,
    /// Attached to the tree under the root
    InTree,
    /// Serving as the tree root, state exactly zero
    IsRoot,
}

/// Per-body bookkeeping
struct BodyEntry {
    body: TargetBody,
    frame: FrameId,
    item: ItemId,
    status: BodyStatus,
    wanted: bool,
}

/// Ephemeris provider backed by a binary table file.
///
/// Earth, the Moon, and the Earth-Moon barycenter are always derived from
/// the stored EMB and geocentric-Moon items: whenever two of the three are
/// wanted, or one of them is wanted alongside any other active body, or the
/// Moon is wanted at all, all three are forced active together.
pub struct FileEphemerisProvider {
    table: EphemerisTable,
    name: String,
    epoch_jd: f64,
    init_time_s: f64,
    entries: Vec<BodyEntry>,
    index: HashMap<TargetBody, usize>,
    root: Option<TargetBody>,
    updated_at: f64,
}

impl FileEphemerisProvider {
    /// Wrap an open table. Simulation time zero corresponds to `epoch_jd`;
    /// the run starts at simulation time `init_time_s`.
    pub fn new(table: EphemerisTable, epoch_jd: f64, init_time_s: f64) -> Self {
        let name = format!("file_ephemeris(model {})", table.model_id());
        Self {
            table,
            name,
            epoch_jd,
            init_time_s,
            entries: Vec::new(),
            index: HashMap::new(),
            root: None,
            updated_at: 0.0,
        }
    }

    /// The wrapped table
    pub fn table(&self) -> &EphemerisTable {
        &self.table
    }

    /// Body serving as the current tree root, if a tree is built
    pub fn root_body(&self) -> Option<TargetBody> {
        self.root
    }

    /// Adapter status of a body; None when the file cannot serve it
    pub fn status(&self, body: TargetBody) -> Option<BodyStatus> {
        self.index.get(&body).map(|&i| self.entries[i].status)
    }

    fn entry(&self, body: TargetBody) -> Option<&BodyEntry> {
        self.index.get(&body).map(|&i| &self.entries[i])
    }

    fn force_wanted(&mut self, body: TargetBody) {
        if let Some(&i) = self.index.get(&body) {
            self.entries[i].wanted = true;
        }
    }
}

impl EphemerisProvider for FileEphemerisProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> f64 {
        self.updated_at
    }

    /// Bind the table to the simulation time axis and register every body
    /// the file can serve, each with a body-centered inertial frame and one
    /// translation item.
    fn initialize(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        if !self.entries.is_empty() {
            return Ok(());
        }
        self.table
            .initialize(self.epoch_jd, 0.0, 0.0, self.init_time_s)?;

        for body in TargetBody::ALL {
            if !self.table.is_available(body) {
                debug!("Body {} not present in this file variant", body.name());
                continue;
            }
            let registered = match manager.find_body(body.name()) {
                Some(existing) => existing.inertial,
                None => {
                    let index = manager.register_body(body.name(), false)?;
                    manager.bodies()[index].inertial
                }
            };
            let item = manager.add_item(
                &format!("{}.inertial", body.name()),
                ItemAspect::Translation,
                true,
            )?;
            self.index.insert(body, self.entries.len());
            self.entries.push(BodyEntry {
                body,
                frame: registered,
                item,
                status: BodyStatus::Inactive,
                wanted: false,
            });
        }
        Ok(())
    }

    /// Decide the wanted set from item enablement and frame subscriptions,
    /// apply the Earth/Moon/barycenter forcing rule, pick the tree root, and
    /// request the matching file items for interpolation.
    fn activate(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        for entry in &mut self.entries {
            let item = manager.items().item(entry.item);
            let subscribed = item
                .target()
                .map(|f| manager.tree().frame(f).is_subscribed())
                .unwrap_or(false);
            entry.wanted = item.is_enabled() && subscribed;
        }

        let trio_wanted = self
            .entries
            .iter()
            .filter(|e| e.wanted && e.body.is_earth_moon_trio())
            .count();
        let other_wanted = self
            .entries
            .iter()
            .filter(|e| e.wanted && !e.body.is_earth_moon_trio())
            .count();
        let moon_wanted = self
            .entry(TargetBody::Moon)
            .map(|e| e.wanted)
            .unwrap_or(false);
        if trio_wanted >= 2 || (trio_wanted >= 1 && other_wanted >= 1) || moon_wanted {
            self.force_wanted(TargetBody::Earth);
            self.force_wanted(TargetBody::Moon);
            self.force_wanted(TargetBody::EarthMoonBarycenter);
        }

        let active: Vec<TargetBody> = self
            .entries
            .iter()
            .filter(|e| e.wanted)
            .map(|e| e.body)
            .collect();
        self.root = match active.len() {
            0 => None,
            1 => Some(active[0]),
            _ if active.iter().all(|b| b.is_earth_moon_trio()) => {
                Some(TargetBody::EarthMoonBarycenter)
            }
            _ => {
                self.force_wanted(TargetBody::SolarSystemBarycenter);
                Some(TargetBody::SolarSystemBarycenter)
            }
        };
        if let Some(root) = self.root {
            debug!("Ephemeris tree root: {}", root.name());
        }

        // A sole active body is the root with an exactly-zero state and
        // needs no interpolation at all.
        self.table.clear_active_items();
        if active.len() > 1 {
            for i in 0..self.entries.len() {
                if self.entries[i].wanted {
                    self.table.activate_body(self.entries[i].body)?;
                }
            }
        }

        for entry in &mut self.entries {
            let is_root = Some(entry.body) == self.root;
            entry.status = if !manager.items().item(entry.item).is_enabled() {
                BodyStatus::Deselected
            } else if !entry.wanted {
                BodyStatus::Inactive
            } else {
                BodyStatus::Active
            };
            // The root is excluded from the active-item count.
            manager.set_item_active(entry.item, entry.wanted && !is_root);
        }
        Ok(())
    }

    /// Attach the root frame with a zero state and every other wanted body
    /// beneath it.
    fn build_tree(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        let root = match self.root {
            Some(root) => root,
            None => return Ok(()),
        };
        let root_frame = match self.entry(root) {
            Some(entry) => entry.frame,
            None => return Ok(()),
        };
        manager.tree_mut().zero_translation(root_frame, self.updated_at);
        manager.set_root_frame(Some(root_frame));

        for entry in &mut self.entries {
            if entry.body == root {
                entry.status = BodyStatus::IsRoot;
                continue;
            }
            if entry.status == BodyStatus::Active {
                manager.tree_mut().attach(entry.frame, root_frame)?;
                entry.status = BodyStatus::InTree;
            }
        }
        Ok(())
    }

    /// Interpolate every in-tree body and write root-relative states into
    /// the frame tree.
    fn update(&mut self, manager: &mut EphemeridesManager, time: f64) -> Result<()> {
        let root = match self.root {
            Some(root) => root,
            None => return Ok(()),
        };
        let root_frame = match self.entry(root) {
            Some(entry) => entry.frame,
            None => return Ok(()),
        };

        if self.table.active_item_count() > 0 {
            self.table.update(time)?;
            let (root_pos, root_vel) = self.table.state(root)?;
            for entry in &self.entries {
                if entry.status != BodyStatus::InTree {
                    continue;
                }
                let (pos, vel) = self.table.state(entry.body)?;
                manager
                    .tree_mut()
                    .set_translation(entry.frame, pos - root_pos, vel - root_vel, time);
                manager.items_mut().item_mut(entry.item).updated_at = time;
            }
        }

        manager.tree_mut().zero_translation(root_frame, time);
        if let Some(entry) = self.entry(root) {
            manager.items_mut().item_mut(entry.item).updated_at = time;
        }
        self.updated_at = time;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use tempfile::tempdir;

    use super::*;
    use crate::constants::DAY_S;
    use crate::ephemfile::bodies::ITEM_MOON_GEO;
    use crate::ephemfile::{SyntheticModel, SYNTHETIC_MODEL_ID};

    const START_JD: f64 = 2_440_400.5;

    fn build_manager(model: &SyntheticModel) -> (EphemeridesManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("synthetic.eph");
        model.write_file(&path, START_JD, 4, 25).unwrap();

        let table = EphemerisTable::open(&path, SYNTHETIC_MODEL_ID).unwrap();
        let provider = FileEphemerisProvider::new(table, START_JD, 0.0);

        let mut manager = EphemeridesManager::new();
        manager.add_provider(Box::new(provider));
        manager.initialize().unwrap();
        (manager, dir)
    }

    fn frame_position(manager: &EphemeridesManager, name: &str) -> Vector3<f64> {
        let frame = manager.tree().find(name).unwrap();
        manager.tree().frame(frame).state.position
    }

    #[test]
    fn test_sole_active_body_is_root_with_zero_state() {
        let model = SyntheticModel::new(7);
        let (mut manager, _dir) = build_manager(&model);

        manager.subscribe_frame("Mars.inertial").unwrap();
        manager.update(3600.0).unwrap();

        let mars = manager.tree().find("Mars.inertial").unwrap();
        assert_eq!(manager.root_frame(), Some(mars));
        assert_eq!(frame_position(&manager, "Mars.inertial"), Vector3::zeros());
    }

    #[test]
    fn test_moon_alone_forces_earth_moon_barycenter_trio() {
        let model = SyntheticModel::new(7);
        let (mut manager, _dir) = build_manager(&model);

        manager.subscribe_frame("Moon.inertial").unwrap();
        let time = 12.5 * DAY_S;
        manager.update(time).unwrap();

        // Activity confined to the trio makes the barycenter the root.
        let embary = manager.tree().find("EMBary.inertial").unwrap();
        assert_eq!(manager.root_frame(), Some(embary));

        // Earth and Moon both came along, attached beneath the barycenter.
        let earth = frame_position(&manager, "Earth.inertial");
        let moon = frame_position(&manager, "Moon.inertial");
        let jd = START_JD + time / DAY_S;
        let (geo_truth, _) = model.truth(ITEM_MOON_GEO, jd).unwrap();
        assert_relative_eq!(moon - earth, geo_truth, epsilon = 1e-6, max_relative = 1e-8);
    }

    #[test]
    fn test_mixed_activity_selects_solar_system_barycenter_root() {
        let model = SyntheticModel::new(7);
        let (mut manager, _dir) = build_manager(&model);

        manager.subscribe_frame("Mars.inertial").unwrap();
        manager.subscribe_frame("Jupiter.inertial").unwrap();
        let time = 40.0 * DAY_S;
        manager.update(time).unwrap();

        let ssbary = manager.tree().find("SSBary.inertial").unwrap();
        assert_eq!(manager.root_frame(), Some(ssbary));

        // With the coordinate origin as root, frame states match the file.
        let jd = START_JD + time / DAY_S;
        let (mars_truth, _) = model
            .truth(crate::ephemfile::bodies::ITEM_MARS, jd)
            .unwrap();
        let mars = frame_position(&manager, "Mars.inertial");
        assert_relative_eq!(mars, mars_truth, max_relative = 1e-8);
    }

    #[test]
    fn test_earth_and_moon_subscriptions_pick_barycenter_root() {
        let model = SyntheticModel::new(7);
        let (mut manager, _dir) = build_manager(&model);

        manager.subscribe_frame("Earth.inertial").unwrap();
        manager.subscribe_frame("Moon.inertial").unwrap();
        manager.update(0.0).unwrap();

        let embary = manager.tree().find("EMBary.inertial").unwrap();
        assert_eq!(manager.root_frame(), Some(embary));
    }

    #[test]
    fn test_short_item_table_serves_only_stored_bodies() {
        use crate::constants::{AU_KM, C_KM_S};
        use crate::ephemfile::format::{ItemDescriptor, TableBuilder};

        // A valid file variant carrying only two item slots.
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.eph");
        let mut builder = TableBuilder::new(55, AU_KM, C_KM_S, 81.3, START_JD, 4.0);
        builder.add_item(ItemDescriptor::position(2, 1, 4.9e-11));
        builder.add_item(ItemDescriptor::position(2, 1, 7.2e-10));
        let rlen = builder.record_len();
        builder.add_segment(START_JD, 4, &vec![0.0; 4 * rlen]).unwrap();
        builder.write_file(&path).unwrap();

        let table = EphemerisTable::open(&path, 55).unwrap();
        let provider = FileEphemerisProvider::new(table, START_JD, 0.0);
        let mut manager = EphemeridesManager::new();
        manager.add_provider(Box::new(provider));
        manager.initialize().unwrap();

        assert!(manager.find_body("Mercury").is_some());
        assert!(manager.find_body("Venus").is_some());
        assert!(manager.find_body("SSBary").is_some());
        // Bodies past the table's item count are excluded, not registered.
        assert!(manager.find_body("Sun").is_none());
        assert!(manager.find_body("Moon").is_none());
        assert!(manager.find_body("EMBary").is_none());
    }

    #[test]
    fn test_absent_body_is_never_registered() {
        let model = SyntheticModel::new(7).without_item(crate::ephemfile::bodies::ITEM_PLUTO);
        let (mut manager, _dir) = build_manager(&model);

        assert!(manager.find_body("Pluto").is_none());
        assert!(manager.subscribe_frame("Pluto.inertial").is_err());

        // The remaining bodies are unaffected.
        manager.subscribe_frame("Venus.inertial").unwrap();
        manager.update(0.0).unwrap();
        let venus = manager.tree().find("Venus.inertial").unwrap();
        assert_eq!(manager.root_frame(), Some(venus));
    }
}
