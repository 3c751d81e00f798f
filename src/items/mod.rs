//! Ephemeris items
//!
//! An ephemeris item is a named unit owning responsibility for one aspect
//! (translation or rotation) of one reference frame. Items sharing a name form
//! a chain of alternates; at most one member of a chain may be active, and
//! enabling one member disables whichever alternate was previously enabled.
//!
//! Chains are kept as an ordered collection per name key with an explicit
//! "currently enabled" index, so there is no link traversal and no way to
//! form an accidental cycle.

use std::collections::HashMap;

use log::warn;
use thiserror::Error;

use crate::framelib::FrameId;

/// Error type for item registration and target assignment
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Item name is empty")]
    EmptyName,

    #[error("Item {0} already has a target frame")]
    TargetAlreadySet(String),

    #[error("Item {name}: {aspect:?} item bound to an incompatible frame")]
    AspectMismatch { name: String, aspect: ItemAspect },
}

/// Result type for item operations
pub type Result<T> = std::result::Result<T, ItemError>;

/// Which aspect of a frame an item drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemAspect {
    /// Drives linear position and velocity; target must be an integration frame
    Translation,
    /// Drives attitude and angular velocity; target must not be an integration frame
    Rotation,
}

impl ItemAspect {
    /// Default frame-name suffix for this aspect
    pub fn default_suffix(&self) -> &'static str {
        match self {
            ItemAspect::Translation => "inertial",
            ItemAspect::Rotation => "pfix",
        }
    }
}

/// Qualify a bare body name with the aspect's default suffix.
///
/// A name already containing a '.' is returned unchanged; a bare body name
/// gets the default suffix appended, with a warning.
pub fn qualify_name(name: &str, aspect: ItemAspect) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        let qualified = format!("{}.{}", name, aspect.default_suffix());
        warn!(
            "Bare item name '{}' qualified to '{}' using default suffix",
            name, qualified
        );
        qualified
    }
}

/// Opaque handle to a registered item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(pub(crate) usize);

/// One ephemeris item
#[derive(Debug)]
pub struct EphemerisItem {
    /// Qualified item name ("<body>.<suffix>")
    pub name: String,
    /// Aspect this item drives
    pub aspect: ItemAspect,
    /// Enabled: this item is the authoritative member of its chain
    enabled: bool,
    /// Active: the item currently drives its frame (requires enabled)
    active: bool,
    /// Target frame, set exactly once
    target: Option<FrameId>,
    /// Orientation items: whether the parent frame subscription is held.
    /// Transfers between alternates on enable.
    subscribed_to_parent: bool,
    /// Time of last state write, seconds of simulation time
    pub updated_at: f64,
}

impl EphemerisItem {
    /// True if this item is the authoritative member of its chain
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True if this item currently drives its frame
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Resolved target frame, if any
    pub fn target(&self) -> Option<FrameId> {
        self.target
    }

    /// Orientation items: whether the parent-frame subscription is held
    pub fn holds_parent_subscription(&self) -> bool {
        self.subscribed_to_parent
    }
}

/// Same-named alternates, ordered by registration
#[derive(Debug, Default)]
pub struct ItemChain {
    members: Vec<ItemId>,
    /// Index into `members` of the enabled alternate, if any
    enabled: Option<usize>,
}

impl ItemChain {
    /// Members of the chain in registration order
    pub fn members(&self) -> &[ItemId] {
        &self.members
    }

    /// Currently enabled member, if any
    pub fn enabled_member(&self) -> Option<ItemId> {
        self.enabled.map(|i| self.members[i])
    }
}

/// Registry of items and their name-chains
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: Vec<EphemerisItem>,
    chains: HashMap<String, ItemChain>,
}

impl ItemRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item into its name-chain, creating the chain if new.
    ///
    /// If a second member of the chain reports enabled, the later one is
    /// force-disabled with a warning.
    pub fn register(&mut self, name: &str, aspect: ItemAspect, enabled: bool) -> Result<ItemId> {
        if name.is_empty() {
            return Err(ItemError::EmptyName);
        }
        let name = qualify_name(name, aspect);

        let id = ItemId(self.items.len());
        let chain = self.chains.entry(name.clone()).or_default();
        let mut enabled = enabled;
        if enabled && chain.enabled.is_some() {
            warn!(
                "Item '{}': an alternate is already enabled; force-disabling the new item",
                name
            );
            enabled = false;
        }
        if enabled {
            chain.enabled = Some(chain.members.len());
        }
        chain.members.push(id);

        self.items.push(EphemerisItem {
            name,
            aspect,
            enabled,
            active: false,
            target: None,
            subscribed_to_parent: false,
            updated_at: 0.0,
        });
        Ok(id)
    }

    /// Access an item
    pub fn item(&self, id: ItemId) -> &EphemerisItem {
        &self.items[id.0]
    }

    /// Mutable access to an item
    pub fn item_mut(&mut self, id: ItemId) -> &mut EphemerisItem {
        &mut self.items[id.0]
    }

    /// Chain for a qualified name
    pub fn chain(&self, name: &str) -> Option<&ItemChain> {
        self.chains.get(name)
    }

    /// Iterate over all registered items
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &EphemerisItem)> {
        self.items.iter().enumerate().map(|(i, it)| (ItemId(i), it))
    }

    /// Item ids of all registered items
    pub fn ids(&self) -> impl Iterator<Item = ItemId> {
        (0..self.items.len()).map(ItemId)
    }

    /// Number of registered items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no items are registered
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Enable an item, transferring active status, target-frame ownership,
    /// and the parent-subscription flag away from whichever alternate was
    /// previously enabled. Returns true if anything changed.
    pub fn enable(&mut self, id: ItemId) -> bool {
        if self.items[id.0].enabled {
            return false;
        }
        let name = self.items[id.0].name.clone();
        let chain = self
            .chains
            .get_mut(&name)
            .unwrap_or_else(|| unreachable!("item registered without a chain"));
        let position = chain
            .members
            .iter()
            .position(|&m| m == id)
            .unwrap_or_else(|| unreachable!("item missing from its own chain"));

        let previous = chain.enabled.map(|i| chain.members[i]);
        chain.enabled = Some(position);

        let (was_active, held_subscription, target) = match previous {
            Some(prev) => {
                let prev = &mut self.items[prev.0];
                let carried = (prev.active, prev.subscribed_to_parent, prev.target);
                prev.enabled = false;
                prev.active = false;
                prev.subscribed_to_parent = false;
                carried
            }
            None => (false, false, None),
        };

        let item = &mut self.items[id.0];
        item.enabled = true;
        item.active = was_active;
        item.subscribed_to_parent = held_subscription;
        if item.target.is_none() {
            item.target = target;
        }
        true
    }

    /// Disable an item. Returns true if the item was enabled (tree is dirty).
    pub fn disable(&mut self, id: ItemId) -> bool {
        if !self.items[id.0].enabled {
            return false;
        }
        let name = self.items[id.0].name.clone();
        if let Some(chain) = self.chains.get_mut(&name) {
            if chain.enabled_member() == Some(id) {
                chain.enabled = None;
            }
        }
        let item = &mut self.items[id.0];
        item.enabled = false;
        item.active = false;
        item.subscribed_to_parent = false;
        true
    }

    /// Toggle the active flag within the enabled state. Has no effect on a
    /// disabled item.
    pub fn set_active(&mut self, id: ItemId, active: bool) {
        let item = &mut self.items[id.0];
        if item.enabled {
            item.active = active;
        }
    }

    /// Record whether the enabled orientation item holds its parent-frame
    /// subscription.
    pub fn set_parent_subscription(&mut self, id: ItemId, held: bool) {
        self.items[id.0].subscribed_to_parent = held;
    }

    /// Assign the target frame, exactly once, enforcing aspect compatibility:
    /// translation items target integration frames, rotation items must not.
    pub fn set_target(
        &mut self,
        id: ItemId,
        frame: FrameId,
        frame_is_integration: bool,
    ) -> Result<()> {
        let item = &mut self.items[id.0];
        if item.target.is_some() {
            return Err(ItemError::TargetAlreadySet(item.name.clone()));
        }
        let compatible = match item.aspect {
            ItemAspect::Translation => frame_is_integration,
            ItemAspect::Rotation => !frame_is_integration,
        };
        if !compatible {
            return Err(ItemError::AspectMismatch {
                name: item.name.clone(),
                aspect: item.aspect,
            });
        }
        item.target = Some(frame);
        // Alternates share the frame; propagate to unresolved chain members.
        let name = item.name.clone();
        if let Some(chain) = self.chains.get(&name) {
            for &member in chain.members.clone().iter() {
                let alt = &mut self.items[member.0];
                if alt.target.is_none() {
                    alt.target = Some(frame);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_bare_names() {
        assert_eq!(
            qualify_name("Mars", ItemAspect::Translation),
            "Mars.inertial"
        );
        assert_eq!(qualify_name("Mars", ItemAspect::Rotation), "Mars.pfix");
        assert_eq!(
            qualify_name("Mars.inertial", ItemAspect::Translation),
            "Mars.inertial"
        );
    }

    #[test]
    fn test_chain_exclusivity() {
        let mut reg = ItemRegistry::new();
        let a = reg
            .register("Earth.inertial", ItemAspect::Translation, true)
            .unwrap();
        let b = reg
            .register("Earth.inertial", ItemAspect::Translation, true)
            .unwrap();

        // The second enabled registration is force-disabled.
        assert!(reg.item(a).is_enabled());
        assert!(!reg.item(b).is_enabled());

        // Enabling B disables A and transfers active status.
        reg.set_active(a, true);
        assert!(reg.enable(b));
        assert!(!reg.item(a).is_enabled());
        assert!(!reg.item(a).is_active());
        assert!(reg.item(b).is_enabled());
        assert!(reg.item(b).is_active());

        // At most one member of the chain is ever enabled.
        let chain = reg.chain("Earth.inertial").unwrap();
        assert_eq!(chain.enabled_member(), Some(b));
    }

    #[test]
    fn test_disable_clears_active() {
        let mut reg = ItemRegistry::new();
        let a = reg
            .register("Moon.inertial", ItemAspect::Translation, true)
            .unwrap();
        reg.set_active(a, true);
        assert!(reg.disable(a));
        assert!(!reg.item(a).is_enabled());
        assert!(!reg.item(a).is_active());
        assert!(!reg.disable(a)); // second disable is a no-op
        assert_eq!(reg.chain("Moon.inertial").unwrap().enabled_member(), None);
    }

    #[test]
    fn test_active_requires_enabled() {
        let mut reg = ItemRegistry::new();
        let a = reg
            .register("Sun.inertial", ItemAspect::Translation, false)
            .unwrap();
        reg.set_active(a, true);
        assert!(!reg.item(a).is_active());
    }

    #[test]
    fn test_target_set_exactly_once() {
        let mut reg = ItemRegistry::new();
        let a = reg
            .register("Mars.inertial", ItemAspect::Translation, true)
            .unwrap();
        reg.set_target(a, FrameId(0), true).unwrap();
        assert!(matches!(
            reg.set_target(a, FrameId(1), true),
            Err(ItemError::TargetAlreadySet(_))
        ));
    }

    #[test]
    fn test_aspect_frame_compatibility() {
        let mut reg = ItemRegistry::new();
        let trans = reg
            .register("Mars.inertial", ItemAspect::Translation, true)
            .unwrap();
        let rot = reg.register("Mars.pfix", ItemAspect::Rotation, true).unwrap();

        // Translation targets must be integration frames.
        assert!(matches!(
            reg.set_target(trans, FrameId(0), false),
            Err(ItemError::AspectMismatch { .. })
        ));
        // Rotation targets must not be.
        assert!(matches!(
            reg.set_target(rot, FrameId(1), true),
            Err(ItemError::AspectMismatch { .. })
        ));

        reg.set_target(trans, FrameId(0), true).unwrap();
        reg.set_target(rot, FrameId(1), false).unwrap();
    }

    #[test]
    fn test_parent_subscription_transfers_on_enable() {
        let mut reg = ItemRegistry::new();
        let a = reg.register("Mars.pfix", ItemAspect::Rotation, true).unwrap();
        let b = reg.register("Mars.pfix", ItemAspect::Rotation, false).unwrap();
        reg.set_parent_subscription(a, true);

        reg.enable(b);
        assert!(reg.item(b).holds_parent_subscription());
        assert!(!reg.item(a).holds_parent_subscription());
    }
}
