//! Configuration-driven control groups and the target values they hold.
//!
//! Every robot revision describes its controls as a list of [`ControlDescriptor`]s;
//! a [`JointTargetSet`] is built from that list and enforces each control's range.

use serde::{Deserialize, Serialize};

use crate::LinkError;

/// One operator control: a labelled value bound to `[min, max]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlDescriptor {
    pub label: String,
    pub min: f64,
    pub max: f64,
    /// Axis or joint identifier shown next to the control (e.g. `"z"`).
    pub axis: String,
}

impl ControlDescriptor {
    pub fn new(label: impl Into<String>, min: f64, max: f64, axis: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            min,
            max,
            axis: axis.into(),
        }
    }

    /// Bounds `value` to the range. Never panics, even on a range that fails [`validate`].
    ///
    /// [`validate`]: ControlDescriptor::validate
    pub fn clamp(&self, value: f64) -> f64 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(LinkError::Config(format!(
                "control {:?} has an invalid range [{}, {}]",
                self.label, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// The control groups of one robot revision.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlLayout {
    pub joints: Vec<ControlDescriptor>,
    pub xyz: Vec<ControlDescriptor>,
    pub calibration: Vec<ControlDescriptor>,
    pub speed: ControlDescriptor,
}

impl Default for ControlLayout {
    fn default() -> Self {
        let percent = |label: &str, axis: &str| ControlDescriptor::new(label, 0.0, 100.0, axis);
        Self {
            joints: vec![
                ControlDescriptor::new("Joint z", -360.0, 360.0, "z"),
                ControlDescriptor::new("Joint y", -65.0, 95.0, "y"),
                ControlDescriptor::new("Joint x", -90.0, 95.0, "x"),
                ControlDescriptor::new("Joint v", 0.0, 180.0, "v"),
                ControlDescriptor::new("Joint w", 5.0, 180.0, "w"),
            ],
            xyz: vec![percent("X", "x"), percent("Y", "y"), percent("Z", "z")],
            calibration: vec![
                percent("Reference 1", "r1"),
                percent("Reference 2", "r2"),
                percent("Reference 3", "r3"),
            ],
            speed: percent("Speed", "speed"),
        }
    }
}

impl ControlLayout {
    pub fn validate(&self) -> Result<(), LinkError> {
        self.joints
            .iter()
            .chain(&self.xyz)
            .chain(&self.calibration)
            .chain(std::iter::once(&self.speed))
            .try_for_each(ControlDescriptor::validate)
    }
}

/// Ordered target values, one per control, each kept inside its control's range.
#[derive(Debug, Clone, PartialEq)]
pub struct JointTargetSet {
    controls: Vec<ControlDescriptor>,
    values: Vec<f64>,
}

impl JointTargetSet {
    /// Every value starts at zero, clamped into its range.
    pub fn new(controls: Vec<ControlDescriptor>) -> Self {
        let values = controls.iter().map(|c| c.clamp(0.0)).collect();
        Self { controls, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn controls(&self) -> &[ControlDescriptor] {
        &self.controls
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Sets one target, clamping it the way a slider would. Returns the stored value.
    ///
    /// A non-finite `value` is ignored and `None` is returned.
    pub fn set(&mut self, index: usize, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        let control = self.controls.get(index)?;
        let clamped = control.clamp(value);
        self.values[index] = clamped;
        Some(clamped)
    }

    /// Moves one target by `delta`, clamped. Returns the stored value.
    pub fn nudge(&mut self, index: usize, delta: f64) -> Option<f64> {
        let current = self.get(index)?;
        self.set(index, current + delta)
    }

    /// Copy of the current values, in control order.
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.clone()
    }

    /// Applies a whole pose, one value per control, clamping each value into its range.
    pub fn apply(&mut self, pose: &[f64]) -> Result<(), LinkError> {
        if pose.len() != self.controls.len() {
            return Err(LinkError::Config(format!(
                "pose has {} values but there are {} controls",
                pose.len(),
                self.controls.len()
            )));
        }
        if let Some(bad) = pose.iter().find(|v| !v.is_finite()) {
            return Err(LinkError::Config(format!("pose value {} is not finite", bad)));
        }
        for ((value, control), target) in self.values.iter_mut().zip(&self.controls).zip(pose) {
            *value = control.clamp(*target);
        }
        Ok(())
    }

    /// Sets every value to zero, clamped into its range.
    pub fn zero(&mut self) {
        for (value, control) in self.values.iter_mut().zip(&self.controls) {
            *value = control.clamp(0.0);
        }
    }
}
