//! Attribute engine: derived numeric values from a base spec plus an ordered
//! modifier list.
//!
//! Every mutation triggers a full recompute. Each attribute is reset to its
//! default and every applied modifier targeting it is folded in insertion
//! order, clamping to `[min, max]` after **each** step. Incremental patching
//! is never used, so floating point results do not depend on mutation history.
use thiserror::Error;

use crate::error::{ClassifiedError, FailureClass};
use crate::ids::ModifierHandle;
use crate::tags::Tag;

/// Bounds and default for one attribute, taken from an item definition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeSpec {
    pub tag: Tag,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

impl AttributeSpec {
    pub fn new(tag: impl Into<Tag>, default: f32, min: f32, max: f32) -> Self {
        Self {
            tag: tag.into(),
            default,
            min,
            max,
        }
    }

    /// Unbounded spec, handy for counters that only need a default.
    pub fn unbounded(tag: impl Into<Tag>, default: f32) -> Self {
        Self::new(tag, default, f32::MIN, f32::MAX)
    }

    /// Clamp without panicking on a misconfigured `min > max` (lower bound wins).
    pub fn clamp(&self, value: f32) -> f32 {
        value.min(self.max).max(self.min)
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ModifierOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ModifierOp {
    pub fn apply(self, value: f32, magnitude: f32) -> f32 {
        match self {
            ModifierOp::Add => value + magnitude,
            ModifierOp::Subtract => value - magnitude,
            ModifierOp::Multiply => value * magnitude,
            ModifierOp::Divide => value / magnitude,
        }
    }
}

/// Request to modify one attribute; turned into a [`Modifier`] on apply.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModifierSpec {
    pub target: Tag,
    pub op: ModifierOp,
    pub magnitude: f32,
}

impl ModifierSpec {
    pub fn new(target: impl Into<Tag>, op: ModifierOp, magnitude: f32) -> Self {
        Self {
            target: target.into(),
            op,
            magnitude,
        }
    }

    pub fn add(target: impl Into<Tag>, magnitude: f32) -> Self {
        Self::new(target, ModifierOp::Add, magnitude)
    }

    pub fn subtract(target: impl Into<Tag>, magnitude: f32) -> Self {
        Self::new(target, ModifierOp::Subtract, magnitude)
    }

    pub fn multiply(target: impl Into<Tag>, magnitude: f32) -> Self {
        Self::new(target, ModifierOp::Multiply, magnitude)
    }

    pub fn divide(target: impl Into<Tag>, magnitude: f32) -> Self {
        Self::new(target, ModifierOp::Divide, magnitude)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Modifier {
    pub target: Tag,
    pub op: ModifierOp,
    pub magnitude: f32,
    pub applied: bool,
    pub handle: ModifierHandle,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeValue {
    pub spec: AttributeSpec,
    pub current: f32,
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum AttributeError {
    #[error("attribute `{0}` not found")]
    NotFound(Tag),

    #[error("modifier handle {0:?} not found")]
    UnknownHandle(ModifierHandle),

    #[error("modifier {op} {magnitude} on `{target}` would produce a non-finite value")]
    InvalidModifier {
        target: Tag,
        op: ModifierOp,
        magnitude: f32,
    },
}

impl ClassifiedError for AttributeError {
    fn class(&self) -> FailureClass {
        FailureClass::Precondition
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ATTRIBUTE_NOT_FOUND",
            Self::UnknownHandle(_) => "MODIFIER_NOT_FOUND",
            Self::InvalidModifier { .. } => "INVALID_MODIFIER",
        }
    }
}

/// Attribute values of one item instance plus its active modifiers.
///
/// # Example
/// ```
/// # use inventory_core::attribute::{AttributeSpec, AttributeState, ModifierSpec};
/// let mut state = AttributeState::from_specs([AttributeSpec::new("Damage", 10.0, 0.0, 100.0)]);
/// let flat = state.apply_modifier(ModifierSpec::add("Damage", 5.0)).unwrap();
/// state.apply_modifier(ModifierSpec::multiply("Damage", 2.0)).unwrap();
/// assert_eq!(state.value(&"Damage".into()), Some(30.0));
///
/// state.remove_modifier(flat).unwrap();
/// assert_eq!(state.value(&"Damage".into()), Some(20.0));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeState {
    attributes: Vec<AttributeValue>,
    modifiers: Vec<Modifier>,
}

impl AttributeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds state from specs; the first spec for a tag wins.
    pub fn from_specs(specs: impl IntoIterator<Item = AttributeSpec>) -> Self {
        let mut state = Self::new();
        for spec in specs {
            state.insert_unique(spec);
        }
        state
    }

    pub(crate) fn insert_unique(&mut self, spec: AttributeSpec) -> bool {
        if self.attributes.iter().any(|a| a.spec.tag == spec.tag) {
            return false;
        }
        let current = spec.clamp(spec.default);
        self.attributes.push(AttributeValue { spec, current });
        true
    }

    pub fn value(&self, tag: &Tag) -> Option<f32> {
        self.attributes
            .iter()
            .find(|a| &a.spec.tag == tag)
            .map(|a| a.current)
    }

    pub fn attributes(&self) -> &[AttributeValue] {
        &self.attributes
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn apply_modifier(&mut self, spec: ModifierSpec) -> Result<ModifierHandle, AttributeError> {
        if !self.attributes.iter().any(|a| a.spec.tag == spec.target) {
            return Err(AttributeError::NotFound(spec.target));
        }
        if !spec.magnitude.is_finite() || (spec.op == ModifierOp::Divide && spec.magnitude == 0.0)
        {
            return Err(AttributeError::InvalidModifier {
                target: spec.target,
                op: spec.op,
                magnitude: spec.magnitude,
            });
        }

        let handle = ModifierHandle::allocate();
        self.modifiers.push(Modifier {
            target: spec.target,
            op: spec.op,
            magnitude: spec.magnitude,
            applied: true,
            handle,
        });
        self.recompute();
        Ok(handle)
    }

    pub fn remove_modifier(&mut self, handle: ModifierHandle) -> Result<Modifier, AttributeError> {
        let index = self
            .modifiers
            .iter()
            .position(|m| m.handle == handle)
            .ok_or(AttributeError::UnknownHandle(handle))?;
        let removed = self.modifiers.remove(index);
        self.recompute();
        Ok(removed)
    }

    pub fn toggle_modifier(&mut self, handle: ModifierHandle, on: bool) -> Result<(), AttributeError> {
        let modifier = self
            .modifiers
            .iter_mut()
            .find(|m| m.handle == handle)
            .ok_or(AttributeError::UnknownHandle(handle))?;
        modifier.applied = on;
        self.recompute();
        Ok(())
    }

    /// Full recompute from defaults.
    pub fn recompute(&mut self) {
        for attribute in &mut self.attributes {
            let spec = &attribute.spec;
            let mut value = spec.clamp(spec.default);
            for modifier in self
                .modifiers
                .iter()
                .filter(|m| m.applied && m.target == spec.tag)
            {
                value = spec.clamp(modifier.op.apply(value, modifier.magnitude));
            }
            attribute.current = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn damage(min: f32, max: f32) -> AttributeState {
        AttributeState::from_specs([AttributeSpec::new("Damage", 10.0, min, max)])
    }

    fn value(state: &AttributeState) -> f32 {
        state.value(&Tag::from("Damage")).unwrap()
    }

    #[test]
    fn modifiers_fold_in_insertion_order() {
        let mut state = damage(0.0, 100.0);
        let add = state.apply_modifier(ModifierSpec::add("Damage", 5.0)).unwrap();
        state
            .apply_modifier(ModifierSpec::multiply("Damage", 2.0))
            .unwrap();
        assert_eq!(value(&state), 30.0);

        state.remove_modifier(add).unwrap();
        assert_eq!(value(&state), 20.0);
    }

    #[test]
    fn clamp_applies_after_each_modifier() {
        // 10 - 20 clamps to 0, then +5 gives 5 (end-only clamping would give 0)
        let mut state = damage(0.0, 25.0);
        state
            .apply_modifier(ModifierSpec::subtract("Damage", 20.0))
            .unwrap();
        state.apply_modifier(ModifierSpec::add("Damage", 5.0)).unwrap();
        assert_eq!(value(&state), 5.0);

        // 10 + 50 clamps to 25, then halves to 12.5 (end-only clamping would give 25)
        let mut state = damage(0.0, 25.0);
        state.apply_modifier(ModifierSpec::add("Damage", 50.0)).unwrap();
        state
            .apply_modifier(ModifierSpec::divide("Damage", 2.0))
            .unwrap();
        assert_eq!(value(&state), 12.5);
    }

    #[test]
    fn toggling_recomputes_from_default() {
        let mut state = damage(0.0, 100.0);
        let add = state.apply_modifier(ModifierSpec::add("Damage", 5.0)).unwrap();
        state
            .apply_modifier(ModifierSpec::multiply("Damage", 3.0))
            .unwrap();
        assert_eq!(value(&state), 45.0);

        state.toggle_modifier(add, false).unwrap();
        assert_eq!(value(&state), 30.0);
        state.toggle_modifier(add, true).unwrap();
        assert_eq!(value(&state), 45.0);
    }

    #[test]
    fn missing_target_and_handle_are_reported() {
        let mut state = damage(0.0, 100.0);
        assert_eq!(
            state.apply_modifier(ModifierSpec::add("Weight", 1.0)),
            Err(AttributeError::NotFound(Tag::from("Weight")))
        );
        let bogus = ModifierHandle(u64::MAX);
        assert_eq!(
            state.toggle_modifier(bogus, true),
            Err(AttributeError::UnknownHandle(bogus))
        );
        assert!(state.modifiers().is_empty());
    }

    #[test]
    fn division_by_zero_is_rejected() {
        let mut state = damage(0.0, 100.0);
        let err = state
            .apply_modifier(ModifierSpec::divide("Damage", 0.0))
            .unwrap_err();
        assert!(matches!(err, AttributeError::InvalidModifier { .. }));
        assert_eq!(value(&state), 10.0);
    }

    #[test]
    fn handles_are_unique() {
        let mut state = damage(0.0, 100.0);
        let a = state.apply_modifier(ModifierSpec::add("Damage", 1.0)).unwrap();
        let b = state.apply_modifier(ModifierSpec::add("Damage", 1.0)).unwrap();
        assert_ne!(a, b);
    }
}
