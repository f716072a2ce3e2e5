//! Named, user-adjustable RGB controls bound to shader uniforms.

use serde::{Deserialize, Serialize};

use crate::error::{ControlError, RegistryError};
use crate::gpu::GraphicsBackend;
use crate::render::program::{Location, ShaderProgram};
use crate::vector::{with_channel, Channel, Vector3};

/// Channel values are specified on a 0-255 scale and normalized on upload.
pub const CHANNEL_SCALE: f32 = 255.0;

/// Static description of one control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSpec {
    pub uniform_name: String,
    pub label: String,
    pub default_value: Vector3,
}

impl ControlSpec {
    pub fn new(uniform_name: impl Into<String>, label: impl Into<String>, default_value: Vector3) -> Self {
        Self {
            uniform_name: uniform_name.into(),
            label: label.into(),
            default_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformControl<L> {
    pub uniform_name: String,
    pub label: String,
    pub default_value: Vector3,
    pub current_value: Vector3,
    pub location: Location<L>,
}

impl<L> UniformControl<L> {
    /// Value as uploaded to the GPU.
    pub fn normalized(&self) -> [f32; 3] {
        (self.current_value / CHANNEL_SCALE).to_array()
    }

    pub fn is_bound(&self) -> bool {
        self.location.is_present()
    }
}

/// Controls in declaration order, keyed by uniform name.
#[derive(Debug, Clone)]
pub struct UniformControlRegistry<L> {
    controls: Vec<UniformControl<L>>,
}

impl<L> Default for UniformControlRegistry<L> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<L> UniformControlRegistry<L> {
    pub fn empty() -> Self {
        Self {
            controls: Vec::new(),
        }
    }

    /// Builds controls from `table`, asking `resolve` for each location.
    pub fn with_locations<F>(table: &[ControlSpec], mut resolve: F) -> Result<Self, RegistryError>
    where
        F: FnMut(&str) -> Location<L>,
    {
        let mut controls: Vec<UniformControl<L>> = Vec::with_capacity(table.len());
        for spec in table {
            if controls.iter().any(|c| c.uniform_name == spec.uniform_name) {
                return Err(RegistryError::DuplicateUniform(spec.uniform_name.clone()));
            }
            let location = resolve(&spec.uniform_name);
            log::debug!(
                "control `{}` -> {}",
                spec.uniform_name,
                if location.is_present() { "bound" } else { "absent" }
            );
            controls.push(UniformControl {
                uniform_name: spec.uniform_name.clone(),
                label: spec.label.clone(),
                default_value: spec.default_value,
                current_value: spec.default_value,
                location,
            });
        }
        Ok(Self { controls })
    }

    /// Resolves every control against a linked program.
    pub fn init<B>(
        program: &ShaderProgram<B>,
        backend: &B,
        table: &[ControlSpec],
    ) -> Result<Self, RegistryError>
    where
        B: GraphicsBackend<UniformLocation = L>,
    {
        Self::with_locations(table, |name| program.uniform_location(backend, name))
    }

    /// Replaces one channel of a control. Returns `Ok(false)` when the
    /// control is unknown or not bound to the program; the stored state is
    /// untouched in that case and on error.
    pub fn update(
        &mut self,
        uniform_name: &str,
        channel: Channel,
        raw_value: &str,
    ) -> Result<bool, ControlError> {
        let Some(control) = self
            .controls
            .iter_mut()
            .find(|c| c.uniform_name == uniform_name)
        else {
            return Ok(false);
        };
        if !control.location.is_present() {
            return Ok(false);
        }

        let value = parse_channel_value(raw_value)?;
        control.current_value = with_channel(control.current_value, channel, value);
        Ok(true)
    }

    pub fn apply(&mut self, event: &ControlEvent) -> Result<bool, ControlError> {
        self.update(&event.uniform_name, event.channel, &event.raw_value)
    }

    pub fn get(&self, uniform_name: &str) -> Option<&UniformControl<L>> {
        self.controls.iter().find(|c| c.uniform_name == uniform_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformControl<L>> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Restores every control to its default value.
    pub fn reset(&mut self) {
        for control in &mut self.controls {
            control.current_value = control.default_value;
        }
    }
}

fn parse_channel_value(raw: &str) -> Result<f32, ControlError> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ControlError::InvalidValue {
            raw: raw.to_string(),
        })
}

/// `"<uniformName>-<channel>"`, the id used for one channel input.
pub fn control_id(uniform_name: &str, channel: Channel) -> String {
    format!("{uniform_name}-{channel}")
}

/// Request to set one channel of one control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub uniform_name: String,
    pub channel: Channel,
    pub raw_value: String,
}

impl ControlEvent {
    pub fn new(uniform_name: impl Into<String>, channel: Channel, raw_value: impl Into<String>) -> Self {
        Self {
            uniform_name: uniform_name.into(),
            channel,
            raw_value: raw_value.into(),
        }
    }

    /// Splits a control id on its last `-`.
    pub fn from_id(id: &str, raw_value: impl Into<String>) -> Result<Self, ControlError> {
        let (name, channel) = id
            .rsplit_once('-')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| ControlError::MalformedId(id.to_string()))?;
        Ok(Self::new(name, channel.parse()?, raw_value))
    }

    /// Parses `id=value` or `id value`.
    pub fn parse_command(line: &str) -> Result<Self, ControlError> {
        let line = line.trim();
        let (id, value) = line
            .split_once('=')
            .or_else(|| line.split_once(char::is_whitespace))
            .ok_or_else(|| ControlError::MalformedId(line.to_string()))?;
        Self::from_id(id.trim(), value.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_controls;

    fn registry() -> UniformControlRegistry<u32> {
        let mut next = 0;
        UniformControlRegistry::with_locations(&default_controls(), |name| {
            next += 1;
            if name == "uSphereDiff" {
                Location::Absent
            } else {
                Location::Present(next)
            }
        })
        .unwrap()
    }

    #[test]
    fn keeps_declaration_order_and_defaults() {
        let registry = registry();
        let names: Vec<_> = registry.iter().map(|c| c.uniform_name.as_str()).collect();
        assert_eq!(names, ["uLightAmb", "uLightDiff", "uSphereAmb", "uSphereDiff"]);
        for control in registry.iter() {
            assert_eq!(control.current_value, control.default_value);
        }
    }

    #[test]
    fn update_replaces_one_channel() {
        let mut registry = registry();
        assert_eq!(registry.update("uLightDiff", Channel::X, " 50 "), Ok(true));
        assert_eq!(
            registry.get("uLightDiff").unwrap().current_value,
            Vector3::new(50.0, 204.0, 25.1)
        );
    }

    #[test]
    fn unknown_and_unbound_controls_are_ignored() {
        let mut registry = registry();
        assert_eq!(registry.update("uNope", Channel::X, "1"), Ok(false));
        assert_eq!(registry.update("uSphereDiff", Channel::Y, "1"), Ok(false));
        assert_eq!(
            registry.get("uSphereDiff").unwrap().current_value,
            Vector3::splat(255.0)
        );
    }

    #[test]
    fn invalid_values_leave_state_untouched() {
        let mut registry = registry();
        for raw in ["", "abc", "NaN", "inf"] {
            assert_eq!(
                registry.update("uLightAmb", Channel::Z, raw),
                Err(ControlError::InvalidValue {
                    raw: raw.to_string()
                })
            );
        }
        assert_eq!(
            registry.get("uLightAmb").unwrap().current_value,
            Vector3::splat(12.75)
        );
    }

    #[test]
    fn values_are_not_clamped() {
        let mut registry = registry();
        registry.update("uLightAmb", Channel::X, "510").unwrap();
        registry.update("uLightAmb", Channel::Y, "-25.5").unwrap();
        let control = registry.get("uLightAmb").unwrap();
        assert_eq!(control.normalized(), [2.0, -0.1, 0.05]);
    }

    #[test]
    fn channel_extremes_normalize_to_unit_range() {
        let mut registry = registry();
        for channel in Channel::ALL {
            registry.update("uLightDiff", channel, "0").unwrap();
        }
        assert_eq!(registry.get("uLightDiff").unwrap().normalized(), [0.0, 0.0, 0.0]);
        assert_eq!(registry.get("uSphereAmb").map(|c| c.normalized()[2]), Some(1.0));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut registry = registry();
        registry.update("uSphereAmb", Channel::Z, "0").unwrap();
        registry.reset();
        assert_eq!(
            registry.get("uSphereAmb").unwrap().current_value,
            Vector3::new(204.0, 204.0, 255.0)
        );
    }

    #[test]
    fn duplicate_uniforms_are_rejected() {
        let table = vec![
            ControlSpec::new("uA", "A", Vector3::ZERO),
            ControlSpec::new("uA", "A again", Vector3::ONE),
        ];
        let err = UniformControlRegistry::<u32>::with_locations(&table, |_| Location::Absent)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateUniform("uA".to_string()));
    }

    #[test]
    fn parses_control_ids_and_commands() {
        let event = ControlEvent::from_id("uLightDiff-x", "50").unwrap();
        assert_eq!(event, ControlEvent::new("uLightDiff", Channel::X, "50"));

        assert_eq!(ControlEvent::parse_command("uSphereAmb-z=12").unwrap().channel, Channel::Z);
        assert_eq!(ControlEvent::parse_command("uSphereAmb-y 3").unwrap().raw_value, "3");
        assert_eq!(
            ControlEvent::from_id("uLightDiff", "1"),
            Err(ControlError::MalformedId("uLightDiff".to_string()))
        );
        assert_eq!(
            ControlEvent::from_id("uLightDiff-w", "1"),
            Err(ControlError::UnknownChannel("w".to_string()))
        );
        assert_eq!(control_id("uLightAmb", Channel::Y), "uLightAmb-y");
    }
}
