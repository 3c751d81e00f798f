//! Analytic and externally propagated providers
//!
//! Two provider families besides the file adapter: rotation models drive a
//! body's planet-fixed frame from an analytic orientation function, and
//! propagated bodies carry externally integrated translation state into the
//! tree. Both pull in their parent body's activity by holding a subscription
//! on the parent frame while active.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector3};

use crate::framelib::FrameId;
use crate::items::{ItemAspect, ItemId};
use crate::manager::{EphemeridesManager, EphemerisProvider};
use crate::{EphemError, Result};

/// Analytic orientation of a planet-fixed frame relative to the body's
/// inertial frame
pub trait PlanetRotationModel {
    /// Attitude and angular velocity (rad/s) at a simulation time
    fn orientation(&self, time: f64) -> (UnitQuaternion<f64>, Vector3<f64>);
}

/// Uniform rotation about the inertial Z axis
pub struct UniformSpinModel {
    /// Spin rate, rad/s
    pub rate: f64,
    /// Rotation angle at simulation time zero, rad
    pub phase: f64,
}

impl PlanetRotationModel for UniformSpinModel {
    fn orientation(&self, time: f64) -> (UnitQuaternion<f64>, Vector3<f64>) {
        let angle = self.phase + self.rate * time;
        let attitude = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle);
        (attitude, Vector3::new(0.0, 0.0, self.rate))
    }
}

/// Drives `<body>.pfix` from an analytic rotation model.
///
/// While active, the provider holds a subscription on the body's inertial
/// frame so the translation source treats the body as wanted.
pub struct RotationModelProvider {
    body: String,
    name: String,
    model: Box<dyn PlanetRotationModel>,
    item: Option<ItemId>,
    frame: Option<FrameId>,
    parent: Option<FrameId>,
    active: bool,
    updated_at: f64,
}

impl RotationModelProvider {
    /// Create a provider for a body's planet-fixed frame. The body must
    /// already be registered when `initialize` runs.
    pub fn new(body: &str, model: Box<dyn PlanetRotationModel>) -> Self {
        Self {
            body: body.to_string(),
            name: format!("rotation_model({})", body),
            model,
            item: None,
            frame: None,
            parent: None,
            active: false,
            updated_at: 0.0,
        }
    }
}

impl EphemerisProvider for RotationModelProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> f64 {
        self.updated_at
    }

    fn initialize(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        if self.item.is_some() {
            return Ok(());
        }
        // A rotation model referencing a body nothing registered is a
        // missing sub-model, not a recoverable setup slip.
        let body = manager.find_body(&self.body).ok_or_else(|| {
            EphemError::Fidelity(format!(
                "rotation model references unregistered body '{}'",
                self.body
            ))
        })?;
        self.frame = Some(body.fixed);
        self.parent = Some(body.inertial);
        self.item = Some(manager.add_item(
            &format!("{}.pfix", self.body),
            ItemAspect::Rotation,
            true,
        )?);
        Ok(())
    }

    /// Orientation items subscribe and unsubscribe their parent frame as
    /// their active status flips, tracked by the held-subscription flag so
    /// the subscription count never drifts.
    fn activate(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        let (item, frame, parent) = match (self.item, self.frame, self.parent) {
            (Some(i), Some(f), Some(p)) => (i, f, p),
            _ => return Ok(()),
        };
        let enabled = manager.items().item(item).is_enabled();
        self.active = enabled && manager.tree().frame(frame).is_subscribed();

        let held = manager.items().item(item).holds_parent_subscription();
        if self.active && !held {
            manager.tree_mut().subscribe(parent);
            manager.set_item_parent_subscription(item, true);
        } else if !self.active && held {
            manager.tree_mut().unsubscribe(parent);
            manager.set_item_parent_subscription(item, false);
        }
        manager.set_item_active(item, self.active);
        Ok(())
    }

    fn build_tree(&mut self, _manager: &mut EphemeridesManager) -> Result<()> {
        // The planet-fixed frame stays structurally attached under the
        // body's inertial frame; nothing to place.
        Ok(())
    }

    fn update(&mut self, manager: &mut EphemeridesManager, time: f64) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let (item, frame) = match (self.item, self.frame) {
            (Some(i), Some(f)) => (i, f),
            _ => return Ok(()),
        };
        let (attitude, angular_velocity) = self.model.orientation(time);
        manager
            .tree_mut()
            .set_rotation(frame, attitude, angular_velocity, time);
        manager.items_mut().item_mut(item).updated_at = time;
        self.updated_at = time;
        Ok(())
    }
}

/// Shared handle through which an external integrator feeds a propagated
/// body's translation state.
#[derive(Clone, Default)]
pub struct PropagatedState {
    inner: Rc<RefCell<(Vector3<f64>, Vector3<f64>)>>,
}

impl PropagatedState {
    /// Replace the stored position (km) and velocity (km/s), relative to the
    /// parent frame
    pub fn set(&self, position: Vector3<f64>, velocity: Vector3<f64>) {
        *self.inner.borrow_mut() = (position, velocity);
    }

    fn get(&self) -> (Vector3<f64>, Vector3<f64>) {
        *self.inner.borrow()
    }
}

/// A body whose translation is integrated outside the ephemeris, attached
/// under a named parent frame.
pub struct PropagatedBodyProvider {
    body: String,
    parent_name: String,
    name: String,
    state: PropagatedState,
    item: Option<ItemId>,
    frame: Option<FrameId>,
    parent: Option<FrameId>,
    active: bool,
    updated_at: f64,
}

impl PropagatedBodyProvider {
    /// Create a propagated body under `parent_frame` (e.g. "Earth.inertial").
    /// Returns the provider and the state handle the integrator writes to.
    pub fn new(body: &str, parent_frame: &str) -> (Self, PropagatedState) {
        let state = PropagatedState::default();
        let provider = Self {
            body: body.to_string(),
            parent_name: parent_frame.to_string(),
            name: format!("propagated_body({})", body),
            state: state.clone(),
            item: None,
            frame: None,
            parent: None,
            active: false,
            updated_at: 0.0,
        };
        (provider, state)
    }
}

impl EphemerisProvider for PropagatedBodyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> f64 {
        self.updated_at
    }

    fn initialize(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        if self.item.is_some() {
            return Ok(());
        }
        let index = manager.register_body(&self.body, false)?;
        self.frame = Some(manager.bodies()[index].inertial);
        self.parent = manager.tree().find(&self.parent_name);
        if self.parent.is_none() {
            return Err(EphemError::Setup(format!(
                "propagated body '{}' names unknown parent frame '{}'",
                self.body, self.parent_name
            )));
        }
        self.item = Some(manager.add_item(
            &format!("{}.inertial", self.body),
            ItemAspect::Translation,
            true,
        )?);
        Ok(())
    }

    /// While active, hold a subscription on the parent frame so upstream
    /// providers keep the parent body in the tree.
    fn activate(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        let (item, frame, parent) = match (self.item, self.frame, self.parent) {
            (Some(i), Some(f), Some(p)) => (i, f, p),
            _ => return Ok(()),
        };
        let enabled = manager.items().item(item).is_enabled();
        self.active = enabled && manager.tree().frame(frame).is_subscribed();

        let held = manager.items().item(item).holds_parent_subscription();
        if self.active && !held {
            manager.tree_mut().subscribe(parent);
            manager.set_item_parent_subscription(item, true);
        } else if !self.active && held {
            manager.tree_mut().unsubscribe(parent);
            manager.set_item_parent_subscription(item, false);
        }
        manager.set_item_active(item, self.active);
        Ok(())
    }

    fn build_tree(&mut self, manager: &mut EphemeridesManager) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        if let (Some(frame), Some(parent)) = (self.frame, self.parent) {
            manager.tree_mut().attach(frame, parent)?;
        }
        Ok(())
    }

    fn update(&mut self, manager: &mut EphemeridesManager, time: f64) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let (item, frame) = match (self.item, self.frame) {
            (Some(i), Some(f)) => (i, f),
            _ => return Ok(()),
        };
        let (position, velocity) = self.state.get();
        manager.tree_mut().set_translation(frame, position, velocity, time);
        manager.items_mut().item_mut(item).updated_at = time;
        self.updated_at = time;
        Ok(())
    }
}
