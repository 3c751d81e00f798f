//! Ephemerides manager
//!
//! The manager reconciles several ephemeris providers (interpolated tables,
//! analytic rotation models, propagated dynamic bodies) into one consistent
//! reference-frame tree. It keeps four registries: bodies, providers, items,
//! and integration frames, and decides per rebuild which item in each
//! name-chain is authoritative.
//!
//! Control flow is three manager-level phases: `initialize` (providers
//! register frames and items), `activate` (reverse-order provider activation
//! followed by forward-order tree build, only when the tree is dirty), and
//! `update` (providers refresh state for the current time).

use std::collections::{HashMap, HashSet};
use std::mem;

use log::{debug, warn};

use crate::framelib::{FrameId, FrameTree};
use crate::items::{qualify_name, ItemAspect, ItemError, ItemId, ItemRegistry};
use crate::{EphemError, Result};

/// Lifecycle capability every ephemeris provider implements.
///
/// The manager invokes the four phase calls in a strict order: `initialize`
/// once at setup; `activate` in REVERSE registration order (so dependent
/// providers decide their own activity, and thereby pull in upstream
/// activity, before the providers they depend on run); `build_tree` in
/// FORWARD registration order (so tree bases exist before dependents attach);
/// `update` in registration order every step.
pub trait EphemerisProvider {
    /// Provider name, for diagnostics
    fn name(&self) -> &str;

    /// Time of the provider's last state refresh
    fn timestamp(&self) -> f64;

    /// Register frames and items with the manager
    fn initialize(&mut self, manager: &mut EphemeridesManager) -> Result<()>;

    /// Decide which of the provider's items are active this rebuild
    fn activate(&mut self, manager: &mut EphemeridesManager) -> Result<()>;

    /// Attach the provider's active frames to the tree
    fn build_tree(&mut self, manager: &mut EphemeridesManager) -> Result<()>;

    /// Refresh state for the given simulation time
    fn update(&mut self, manager: &mut EphemeridesManager, time: f64) -> Result<()>;
}

/// A registered celestial body and its owned frames
#[derive(Debug)]
pub struct RegisteredBody {
    /// Body name, unique after registration
    pub name: String,
    /// Body-centered inertial frame (an integration frame)
    pub inertial: FrameId,
    /// Body-fixed (planet-fixed) frame, child of the inertial frame
    pub fixed: FrameId,
    /// Optional alternate inertial frame, child of the inertial frame
    pub alt_inertial: Option<FrameId>,
}

/// Registry of bodies, providers, items, and integration frames
#[derive(Default)]
pub struct EphemeridesManager {
    tree: FrameTree,
    items: ItemRegistry,
    bodies: Vec<RegisteredBody>,
    body_index: HashMap<String, usize>,
    providers: Vec<Box<dyn EphemerisProvider>>,
    integration_frames: HashSet<FrameId>,
    tree_dirty: bool,
    root_frame: Option<FrameId>,
    single_point_source: bool,
    sim_time: f64,
}

impl EphemeridesManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject translation items: the single point source drives all
    /// translation itself.
    pub fn set_single_point_source(&mut self, single: bool) {
        self.single_point_source = single;
    }

    /// The frame tree
    pub fn tree(&self) -> &FrameTree {
        &self.tree
    }

    /// Mutable access to the frame tree
    pub fn tree_mut(&mut self) -> &mut FrameTree {
        &mut self.tree
    }

    /// The item registry
    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    /// Mutable access to the item registry
    pub fn items_mut(&mut self) -> &mut ItemRegistry {
        &mut self.items
    }

    /// Current simulation time as of the last update
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// The remembered root frame of the current tree, if built
    pub fn root_frame(&self) -> Option<FrameId> {
        self.root_frame
    }

    /// Record the root frame chosen during tree build
    pub fn set_root_frame(&mut self, frame: Option<FrameId>) {
        self.root_frame = frame;
    }

    /// True if the frame is registered as an integration frame
    pub fn is_integration_frame(&self, frame: FrameId) -> bool {
        self.integration_frames.contains(&frame)
    }

    /// True when a rebuild is pending
    pub fn is_tree_dirty(&self) -> bool {
        self.tree_dirty
    }

    /// Register a celestial body: creates its inertial, body-fixed, and
    /// (optionally) alternate-inertial frames, links the children under the
    /// inertial frame, and registers the inertial frame for integration.
    ///
    /// Fails (non-fatally) on an empty or duplicate name; the registry is
    /// left untouched.
    pub fn register_body(&mut self, name: &str, with_alt_inertial: bool) -> Result<usize> {
        if name.is_empty() || name.contains('.') {
            warn!("Body registration abandoned: invalid name '{}'", name);
            return Err(EphemError::Setup(format!("invalid body name '{}'", name)));
        }
        if self.body_index.contains_key(name) {
            warn!("Body registration abandoned: duplicate name '{}'", name);
            return Err(EphemError::Setup(format!("duplicate body name '{}'", name)));
        }

        let inertial = self.tree.add_ephemeris_frame(&format!("{}.inertial", name))?;
        let fixed = self.tree.add_ephemeris_frame(&format!("{}.pfix", name))?;
        self.tree.attach(fixed, inertial)?;
        let alt_inertial = if with_alt_inertial {
            let alt = self
                .tree
                .add_ephemeris_frame(&format!("{}.alt_inertial", name))?;
            self.tree.attach(alt, inertial)?;
            Some(alt)
        } else {
            None
        };
        self.integration_frames.insert(inertial);

        let index = self.bodies.len();
        self.bodies.push(RegisteredBody {
            name: name.to_string(),
            inertial,
            fixed,
            alt_inertial,
        });
        self.body_index.insert(name.to_string(), index);
        self.tree_dirty = true;
        Ok(index)
    }

    /// Look up a registered body by name
    pub fn find_body(&self, name: &str) -> Option<&RegisteredBody> {
        self.body_index.get(name).map(|&i| &self.bodies[i])
    }

    /// Registered bodies in registration order
    pub fn bodies(&self) -> &[RegisteredBody] {
        &self.bodies
    }

    /// Append a provider to the ordered list.
    ///
    /// Callers MUST register providers in dependency order, independent
    /// providers first: the reverse-then-forward activation pass relies on
    /// registration order already being a valid topological sort of an
    /// acyclic provider-dependency graph. No cycle detection is performed.
    pub fn add_provider(&mut self, provider: Box<dyn EphemerisProvider>) {
        debug!("Provider registered: {}", provider.name());
        self.providers.push(provider);
        self.tree_dirty = true;
    }

    /// Number of registered providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Register an ephemeris item and link it into its name-chain.
    ///
    /// A bare body name is qualified with the aspect's default suffix. The
    /// target frame is resolved immediately if a matching frame already
    /// exists; a non-ephemeris frame sharing the name is fatal.
    pub fn add_item(&mut self, name: &str, aspect: ItemAspect, enabled: bool) -> Result<ItemId> {
        if self.single_point_source && aspect == ItemAspect::Translation {
            warn!(
                "Item '{}' rejected: translation items are not accepted in \
                 single-point-source mode",
                name
            );
            return Err(EphemError::Setup(format!(
                "translation item '{}' in single-point-source mode",
                name
            )));
        }
        // Validate the target frame up front so a rejected add leaves the
        // chain registry untouched.
        let qualified = qualify_name(name, aspect);
        let target = self.resolve_frame(&qualified, aspect)?;

        let id = self.items.register(&qualified, aspect, enabled)?;
        if let Some((frame, is_integration)) = target {
            self.items.set_target(id, frame, is_integration)?;
        }
        self.tree_dirty = true;
        Ok(id)
    }

    /// Find the frame matching an item name, if one exists, and check it can
    /// serve as the item's target. A non-ephemeris frame sharing the name is
    /// fatal; an aspect/frame-type mismatch abandons the add.
    fn resolve_frame(&self, name: &str, aspect: ItemAspect) -> Result<Option<(FrameId, bool)>> {
        let frame = match self.tree.find(name) {
            Some(frame) => frame,
            None => return Ok(None),
        };
        if !self.tree.frame(frame).is_ephemeris_frame() {
            return Err(EphemError::Internal(format!(
                "non-ephemeris frame '{}' shares a name with a registered item",
                name
            )));
        }
        let is_integration = self.is_integration_frame(frame);
        let compatible = match aspect {
            ItemAspect::Translation => is_integration,
            ItemAspect::Rotation => !is_integration,
        };
        if !compatible {
            warn!("Item '{}' rejected: incompatible target frame", name);
            return Err(ItemError::AspectMismatch {
                name: name.to_string(),
                aspect,
            }
            .into());
        }
        Ok(Some((frame, is_integration)))
    }

    /// Resolve an item's target frame if a frame of the same name has
    /// appeared since registration.
    fn try_resolve_target(&mut self, id: ItemId) -> Result<()> {
        if self.items.item(id).target().is_some() {
            return Ok(());
        }
        let name = self.items.item(id).name.clone();
        let aspect = self.items.item(id).aspect;
        if let Some((frame, is_integration)) = self.resolve_frame(&name, aspect)? {
            self.items.set_target(id, frame, is_integration)?;
        }
        Ok(())
    }

    /// Enable an item, transferring authority within its name-chain
    pub fn enable_item(&mut self, id: ItemId) {
        if self.items.enable(id) {
            self.tree_dirty = true;
        }
    }

    /// Disable an item and mark the tree dirty
    pub fn disable_item(&mut self, id: ItemId) {
        if self.items.disable(id) {
            self.tree_dirty = true;
        }
    }

    /// Toggle an item's active flag within the enabled state
    pub fn set_item_active(&mut self, id: ItemId, active: bool) {
        self.items.set_active(id, active);
    }

    /// Record whether an orientation item holds its parent-frame subscription
    pub fn set_item_parent_subscription(&mut self, id: ItemId, held: bool) {
        self.items.set_parent_subscription(id, held);
    }

    /// Subscribe to a frame by name, marking the tree dirty when the frame's
    /// activity changes
    pub fn subscribe_frame(&mut self, name: &str) -> Result<()> {
        let frame = self
            .tree
            .find(name)
            .ok_or_else(|| EphemError::Setup(format!("unknown frame '{}'", name)))?;
        if self.tree.subscribe(frame) {
            self.note_tree_dirty();
        }
        Ok(())
    }

    /// Drop a subscription to a frame by name
    pub fn unsubscribe_frame(&mut self, name: &str) -> Result<()> {
        let frame = self
            .tree
            .find(name)
            .ok_or_else(|| EphemError::Setup(format!("unknown frame '{}'", name)))?;
        if self.tree.unsubscribe(frame) {
            self.note_tree_dirty();
        }
        Ok(())
    }

    /// Note that frame activity changed. Multiple notifications coalesce
    /// into one rebuild.
    pub fn note_tree_dirty(&mut self) {
        self.tree_dirty = true;
    }

    /// Run every provider's `initialize` in registration order, then sweep
    /// the items: unresolved items whose frame has appeared are bound now;
    /// items still lacking a target frame are deselected.
    pub fn initialize(&mut self) -> Result<()> {
        self.with_providers(|manager, providers| {
            for provider in providers.iter_mut() {
                provider.initialize(manager)?;
            }
            Ok(())
        })?;

        let ids: Vec<ItemId> = self.items.ids().collect();
        for id in ids {
            self.try_resolve_target(id)?;
            if self.items.item(id).target().is_none() {
                debug!(
                    "Item '{}' has no resolved target frame; deselecting",
                    self.items.item(id).name
                );
                self.items.disable(id);
            }
        }
        Ok(())
    }

    /// Rebuild the frame tree if it is dirty; otherwise a no-op.
    ///
    /// The rebuild disconnects every registered item's frame, clears the
    /// remembered root, runs provider `activate` in reverse registration
    /// order, then provider `build_tree` in forward order, and finally clears
    /// the dirty flag.
    pub fn activate(&mut self) -> Result<()> {
        if !self.tree_dirty {
            return Ok(());
        }
        debug!("Rebuilding frame tree");

        let ids: Vec<ItemId> = self.items.ids().collect();
        for id in ids {
            self.disconnect_item(id);
        }
        self.root_frame = None;

        self.with_providers(|manager, providers| {
            for provider in providers.iter_mut().rev() {
                provider.activate(manager)?;
            }
            for provider in providers.iter_mut() {
                provider.build_tree(manager)?;
            }
            Ok(())
        })?;

        self.tree_dirty = false;
        Ok(())
    }

    /// Disconnect one item's frame from the tree: translation items detach
    /// the frame from its parent, rotation items release the held
    /// parent-frame subscription.
    fn disconnect_item(&mut self, id: ItemId) {
        let item = self.items.item(id);
        let target = match item.target() {
            Some(target) => target,
            None => return,
        };
        match item.aspect {
            ItemAspect::Translation => self.tree.detach(target),
            ItemAspect::Rotation => {
                if item.holds_parent_subscription() {
                    if let Some(parent) = self.tree.frame(target).parent() {
                        self.tree.unsubscribe(parent);
                    }
                    self.items.set_parent_subscription(id, false);
                }
            }
        }
    }

    /// Advance to a simulation time: rebuild the tree if dirty, then run
    /// every provider's `update` in registration order.
    pub fn update(&mut self, time: f64) -> Result<()> {
        if self.tree_dirty {
            self.activate()?;
        }
        self.sim_time = time;
        self.with_providers(|manager, providers| {
            for provider in providers.iter_mut() {
                provider.update(manager, time)?;
            }
            Ok(())
        })
    }

    /// Run a closure over the provider list with the manager borrowed
    /// separately, restoring the list afterwards even on error.
    fn with_providers<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &mut Vec<Box<dyn EphemerisProvider>>) -> Result<()>,
    {
        let mut providers = mem::take(&mut self.providers);
        let result = f(self, &mut providers);
        self.providers = providers;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_body_creates_frames() {
        let mut manager = EphemeridesManager::new();
        manager.register_body("Earth", false).unwrap();

        let inertial = manager.tree().find("Earth.inertial").unwrap();
        let fixed = manager.tree().find("Earth.pfix").unwrap();
        assert_eq!(manager.tree().frame(fixed).parent(), Some(inertial));
        assert!(manager.is_integration_frame(inertial));
        assert!(!manager.is_integration_frame(fixed));
    }

    #[test]
    fn test_register_body_rejects_bad_names() {
        let mut manager = EphemeridesManager::new();
        assert!(manager.register_body("", false).is_err());
        assert!(manager.register_body("Earth.inertial", false).is_err());
        manager.register_body("Earth", false).unwrap();
        assert!(manager.register_body("Earth", false).is_err());
        // The failed registrations left the registry untouched.
        assert_eq!(manager.bodies().len(), 1);
    }

    #[test]
    fn test_add_item_resolves_existing_frame() {
        let mut manager = EphemeridesManager::new();
        manager.register_body("Mars", false).unwrap();

        let id = manager
            .add_item("Mars.inertial", ItemAspect::Translation, true)
            .unwrap();
        assert_eq!(
            manager.items().item(id).target(),
            manager.tree().find("Mars.inertial")
        );
    }

    #[test]
    fn test_add_item_aspect_mismatch_is_abandoned() {
        let mut manager = EphemeridesManager::new();
        manager.register_body("Mars", false).unwrap();

        // A rotation item may not target the integration frame.
        assert!(manager
            .add_item("Mars.inertial", ItemAspect::Rotation, true)
            .is_err());
        // The abandoned add left nothing behind in the chain registry.
        assert!(manager.items().chain("Mars.inertial").is_none());

        // A later legitimate registration under the same name is unaffected.
        let id = manager
            .add_item("Mars.inertial", ItemAspect::Translation, true)
            .unwrap();
        assert!(manager.items().item(id).is_enabled());
        assert_eq!(
            manager.items().chain("Mars.inertial").unwrap().enabled_member(),
            Some(id)
        );
    }

    #[test]
    fn test_single_point_source_rejects_translation_items() {
        let mut manager = EphemeridesManager::new();
        manager.set_single_point_source(true);
        manager.register_body("Earth", false).unwrap();

        assert!(manager
            .add_item("Earth.inertial", ItemAspect::Translation, true)
            .is_err());
        // Rotation items are still accepted.
        assert!(manager
            .add_item("Earth.pfix", ItemAspect::Rotation, true)
            .is_ok());
    }

    #[test]
    fn test_non_ephemeris_frame_name_collision_is_fatal() {
        let mut manager = EphemeridesManager::new();
        manager.tree_mut().add_frame("Probe.inertial").unwrap();

        let result = manager.add_item("Probe.inertial", ItemAspect::Translation, true);
        assert!(matches!(result, Err(EphemError::Internal(_))));
        assert!(manager.items().chain("Probe.inertial").is_none());
    }

    #[test]
    fn test_initialize_deselects_unresolved_items() {
        let mut manager = EphemeridesManager::new();
        let id = manager
            .add_item("Phobos.inertial", ItemAspect::Translation, true)
            .unwrap();
        manager.initialize().unwrap();
        assert!(!manager.items().item(id).is_enabled());
    }

    #[test]
    fn test_dirty_notifications_coalesce() {
        let mut manager = EphemeridesManager::new();
        manager.note_tree_dirty();
        manager.note_tree_dirty();
        assert!(manager.is_tree_dirty());
        manager.activate().unwrap();
        assert!(!manager.is_tree_dirty());
        // A second activate with no intervening notification is a no-op.
        manager.activate().unwrap();
        assert!(!manager.is_tree_dirty());
    }
}
