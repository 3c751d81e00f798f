//! Reference frame tree
//!
//! This module provides the reference-frame hierarchy consumed by downstream
//! dynamics and gravity calculations. Frames are stored in an arena and
//! addressed by [`FrameId`]; parent/child links express relative states.
//!
//! Frames carry no back-reference to their owning manager: all structural
//! mutation flows through the manager, which tracks tree dirtiness itself.

use std::collections::HashMap;

use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

/// Error type for frame tree operations
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame name is empty")]
    EmptyName,

    #[error("Frame already registered: {0}")]
    DuplicateName(String),

    #[error("Frame not found: {0}")]
    NotFound(String),

    #[error("Attaching frame {child} under {parent} would create a cycle")]
    CycleDetected { child: String, parent: String },
}

/// Result type for frame tree operations
pub type Result<T> = std::result::Result<T, FrameError>;

/// Opaque handle to a frame in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub(crate) usize);

/// Translational and rotational state of a frame relative to its parent
#[derive(Debug, Clone)]
pub struct FrameState {
    /// Position of the frame origin relative to its parent, km
    pub position: Vector3<f64>,
    /// Velocity relative to its parent, km/s
    pub velocity: Vector3<f64>,
    /// Attitude of the frame relative to its parent
    pub attitude: UnitQuaternion<f64>,
    /// Angular velocity relative to its parent, rad/s
    pub angular_velocity: Vector3<f64>,
    /// Time of last state refresh, seconds of simulation time
    pub timestamp: f64,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            attitude: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            timestamp: 0.0,
        }
    }
}

/// A node in the reference frame tree
#[derive(Debug)]
pub struct RefFrame {
    /// Frame name, unique within the tree ("<body>.<suffix>")
    pub name: String,
    /// Parent frame, if attached
    parent: Option<FrameId>,
    /// Attached child frames
    children: Vec<FrameId>,
    /// Current state relative to the parent
    pub state: FrameState,
    /// Subscription count: nonzero means some consumer needs this frame
    subscriptions: usize,
    /// True when the frame is owned by the ephemerides machinery
    ephemeris: bool,
}

impl RefFrame {
    fn new(name: String, ephemeris: bool) -> Self {
        Self {
            name,
            parent: None,
            children: Vec::new(),
            state: FrameState::default(),
            subscriptions: 0,
            ephemeris,
        }
    }

    /// Parent frame, if this frame is attached to the tree
    pub fn parent(&self) -> Option<FrameId> {
        self.parent
    }

    /// Attached children
    pub fn children(&self) -> &[FrameId] {
        &self.children
    }

    /// True if at least one consumer has subscribed to this frame
    pub fn is_subscribed(&self) -> bool {
        self.subscriptions > 0
    }

    /// True when the frame was created by the ephemerides machinery
    pub fn is_ephemeris_frame(&self) -> bool {
        self.ephemeris
    }
}

/// Arena of reference frames with by-name lookup
#[derive(Debug, Default)]
pub struct FrameTree {
    frames: Vec<RefFrame>,
    by_name: HashMap<String, FrameId>,
}

impl FrameTree {
    /// Create an empty frame tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame owned by the ephemerides machinery
    pub fn add_ephemeris_frame(&mut self, name: &str) -> Result<FrameId> {
        self.add_frame_inner(name, true)
    }

    /// Add a frame owned by an external collaborator (e.g. a vehicle frame)
    pub fn add_frame(&mut self, name: &str) -> Result<FrameId> {
        self.add_frame_inner(name, false)
    }

    fn add_frame_inner(&mut self, name: &str, ephemeris: bool) -> Result<FrameId> {
        if name.is_empty() {
            return Err(FrameError::EmptyName);
        }
        if self.by_name.contains_key(name) {
            return Err(FrameError::DuplicateName(name.to_string()));
        }
        let id = FrameId(self.frames.len());
        self.frames.push(RefFrame::new(name.to_string(), ephemeris));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Look up a frame by name
    pub fn find(&self, name: &str) -> Option<FrameId> {
        self.by_name.get(name).copied()
    }

    /// Immutable access to a frame
    pub fn frame(&self, id: FrameId) -> &RefFrame {
        &self.frames[id.0]
    }

    /// Mutable access to a frame
    pub fn frame_mut(&mut self, id: FrameId) -> &mut RefFrame {
        &mut self.frames[id.0]
    }

    /// Number of frames in the arena (attached or not)
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the arena holds no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Attach `child` under `parent`, detaching it from any previous parent.
    ///
    /// Rejects attachments that would make a frame its own ancestor.
    pub fn attach(&mut self, child: FrameId, parent: FrameId) -> Result<()> {
        if child == parent || self.is_ancestor(child, parent) {
            return Err(FrameError::CycleDetected {
                child: self.frames[child.0].name.clone(),
                parent: self.frames[parent.0].name.clone(),
            });
        }
        self.detach(child);
        self.frames[child.0].parent = Some(parent);
        self.frames[parent.0].children.push(child);
        Ok(())
    }

    /// Detach `child` from its parent, if attached. No-op otherwise.
    pub fn detach(&mut self, child: FrameId) {
        if let Some(parent) = self.frames[child.0].parent.take() {
            self.frames[parent.0].children.retain(|&c| c != child);
        }
    }

    /// True when `ancestor` appears on the parent chain of `frame`
    pub fn is_ancestor(&self, ancestor: FrameId, frame: FrameId) -> bool {
        let mut cursor = self.frames[frame.0].parent;
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.frames[id.0].parent;
        }
        false
    }

    /// Register interest in a frame. Returns true when the frame transitions
    /// from unsubscribed to subscribed (activity changed).
    pub fn subscribe(&mut self, id: FrameId) -> bool {
        let frame = &mut self.frames[id.0];
        frame.subscriptions += 1;
        frame.subscriptions == 1
    }

    /// Drop interest in a frame. Returns true when the frame transitions
    /// from subscribed to unsubscribed.
    pub fn unsubscribe(&mut self, id: FrameId) -> bool {
        let frame = &mut self.frames[id.0];
        if frame.subscriptions > 0 {
            frame.subscriptions -= 1;
            frame.subscriptions == 0
        } else {
            false
        }
    }

    /// Write a translational state into a frame
    pub fn set_translation(
        &mut self,
        id: FrameId,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        timestamp: f64,
    ) {
        let state = &mut self.frames[id.0].state;
        state.position = position;
        state.velocity = velocity;
        state.timestamp = timestamp;
    }

    /// Write a rotational state into a frame
    pub fn set_rotation(
        &mut self,
        id: FrameId,
        attitude: UnitQuaternion<f64>,
        angular_velocity: Vector3<f64>,
        timestamp: f64,
    ) {
        let state = &mut self.frames[id.0].state;
        state.attitude = attitude;
        state.angular_velocity = angular_velocity;
        state.timestamp = timestamp;
    }

    /// Zero a frame's translational state (used for the tree root)
    pub fn zero_translation(&mut self, id: FrameId, timestamp: f64) {
        self.set_translation(id, Vector3::zeros(), Vector3::zeros(), timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_find() {
        let mut tree = FrameTree::new();
        let earth = tree.add_ephemeris_frame("Earth.inertial").unwrap();
        assert_eq!(tree.find("Earth.inertial"), Some(earth));
        assert_eq!(tree.find("Mars.inertial"), None);
        assert!(tree.frame(earth).is_ephemeris_frame());
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let mut tree = FrameTree::new();
        tree.add_ephemeris_frame("Earth.inertial").unwrap();
        assert!(matches!(
            tree.add_ephemeris_frame("Earth.inertial"),
            Err(FrameError::DuplicateName(_))
        ));
        assert!(matches!(
            tree.add_ephemeris_frame(""),
            Err(FrameError::EmptyName)
        ));
    }

    #[test]
    fn test_attach_detach() {
        let mut tree = FrameTree::new();
        let root = tree.add_ephemeris_frame("SSBary.inertial").unwrap();
        let earth = tree.add_ephemeris_frame("Earth.inertial").unwrap();

        tree.attach(earth, root).unwrap();
        assert_eq!(tree.frame(earth).parent(), Some(root));
        assert_eq!(tree.frame(root).children(), &[earth]);

        tree.detach(earth);
        assert_eq!(tree.frame(earth).parent(), None);
        assert!(tree.frame(root).children().is_empty());

        // Detaching twice is harmless
        tree.detach(earth);
    }

    #[test]
    fn test_reattach_moves_frame() {
        let mut tree = FrameTree::new();
        let ssb = tree.add_ephemeris_frame("SSBary.inertial").unwrap();
        let emb = tree.add_ephemeris_frame("EMBary.inertial").unwrap();
        let moon = tree.add_ephemeris_frame("Moon.inertial").unwrap();

        tree.attach(moon, ssb).unwrap();
        tree.attach(moon, emb).unwrap();
        assert_eq!(tree.frame(moon).parent(), Some(emb));
        assert!(tree.frame(ssb).children().is_empty());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut tree = FrameTree::new();
        let a = tree.add_ephemeris_frame("A.inertial").unwrap();
        let b = tree.add_ephemeris_frame("B.inertial").unwrap();
        tree.attach(b, a).unwrap();
        assert!(matches!(
            tree.attach(a, b),
            Err(FrameError::CycleDetected { .. })
        ));
        assert!(matches!(
            tree.attach(a, a),
            Err(FrameError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_subscription_edges() {
        let mut tree = FrameTree::new();
        let f = tree.add_ephemeris_frame("Mars.inertial").unwrap();
        assert!(!tree.frame(f).is_subscribed());

        assert!(tree.subscribe(f)); // first subscriber changes activity
        assert!(!tree.subscribe(f)); // second does not
        assert!(!tree.unsubscribe(f));
        assert!(tree.unsubscribe(f)); // last unsubscribe changes activity
        assert!(!tree.unsubscribe(f)); // underflow is a no-op
    }
}
