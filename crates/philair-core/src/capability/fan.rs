// ── Fan operations ──
//
// Power, preset, speed, oscillation and switch control for one device,
// expressed as descriptor lookups plus coordinator writes.

use std::sync::Arc;

use philair_api::{Connector, StatusValue};
use tracing::debug;

use super::descriptor::{HumidifierCapability, ModelDescriptor};
use super::keys;
use crate::coordinator::Coordinator;
use crate::error::CoreError;

/// Drives a device through its model descriptor.
///
/// Reads come from the coordinator's current snapshot; writes go through
/// [`Coordinator::set_value`] / [`Coordinator::set_values`], so listeners see
/// every successful change.
pub struct FanControl<C: Connector> {
    coordinator: Coordinator<C>,
    descriptor: Arc<ModelDescriptor>,
}

impl<C: Connector> Clone for FanControl<C> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            descriptor: Arc::clone(&self.descriptor),
        }
    }
}

impl<C: Connector> FanControl<C> {
    pub fn new(coordinator: &Coordinator<C>, descriptor: &ModelDescriptor) -> Self {
        Self {
            coordinator: coordinator.clone(),
            descriptor: Arc::new(descriptor.clone()),
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Device name as reported by whichever firmware generation is present.
    pub fn device_name(&self) -> Option<String> {
        self.coordinator
            .status()
            .first_of(&keys::NAME_KEYS)
            .map(|(_, v)| v.to_string())
    }

    // ── Power ────────────────────────────────────────────────────

    pub fn is_on(&self) -> bool {
        let power = &self.descriptor.power;
        self.coordinator.status().get(&power.key) == Some(&power.on)
    }

    /// Power on. A preset wins over a percentage; with neither, only the
    /// power key is written.
    pub async fn turn_on(&self, preset_mode: Option<&str>, percentage: Option<u8>) -> Result<(), CoreError> {
        if let Some(preset) = preset_mode {
            return self.set_preset_mode(preset).await;
        }
        if let Some(percentage) = percentage {
            return self.set_percentage(percentage).await;
        }
        let power = &self.descriptor.power;
        self.coordinator.set_value(&power.key, power.on.clone()).await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        let power = &self.descriptor.power;
        self.coordinator.set_value(&power.key, power.off.clone()).await
    }

    // ── Presets ──────────────────────────────────────────────────

    pub fn preset_modes(&self) -> Vec<&str> {
        self.descriptor.presets.keys().map(String::as_str).collect()
    }

    /// First preset whose patch matches the current snapshot.
    pub fn preset_mode(&self) -> Option<String> {
        self.descriptor
            .match_preset(&self.coordinator.status())
            .map(str::to_owned)
    }

    pub async fn set_preset_mode(&self, name: &str) -> Result<(), CoreError> {
        let patch = self
            .descriptor
            .presets
            .get(name)
            .ok_or_else(|| CoreError::UnknownPreset {
                model: self.descriptor.model.clone(),
                name: name.to_owned(),
            })?;
        debug!(model = %self.descriptor.model, preset = name, "setting preset mode");
        self.coordinator.set_values(patch).await
    }

    // ── Speed ────────────────────────────────────────────────────

    pub fn speed_count(&self) -> usize {
        self.descriptor.speeds.len()
    }

    /// Current speed as a percentage, or `None` when no speed matches.
    pub fn percentage(&self) -> Option<u8> {
        let index = self.descriptor.match_speed(&self.coordinator.status())?;
        Some(ordered_index_to_percentage(index, self.speed_count()))
    }

    /// `0` powers off; anything else selects the closest speed step.
    pub async fn set_percentage(&self, percentage: u8) -> Result<(), CoreError> {
        if percentage == 0 {
            return self.turn_off().await;
        }
        let index = percentage_to_ordered_index(percentage, self.speed_count())
            .ok_or_else(|| self.unsupported("speed"))?;
        let Some((name, patch)) = self.descriptor.speeds.get_index(index) else {
            return Err(self.unsupported("speed"));
        };
        debug!(model = %self.descriptor.model, speed = %name, percentage, "setting speed");
        self.coordinator.set_values(patch).await
    }

    // ── Oscillation ──────────────────────────────────────────────

    /// `None` when the model cannot oscillate or has not reported it yet.
    pub fn oscillating(&self) -> Option<bool> {
        let spec = self.descriptor.oscillation.as_ref()?;
        let status = self.coordinator.status();
        let value = status.get(&spec.key)?;
        Some(spec.on.contains(value))
    }

    pub async fn oscillate(&self, enabled: bool) -> Result<(), CoreError> {
        let spec = self
            .descriptor
            .oscillation
            .as_ref()
            .ok_or_else(|| self.unsupported("oscillation"))?;
        let value = if enabled {
            spec.on.first().ok_or_else(|| self.unsupported("oscillation"))?
        } else {
            &spec.off
        };
        self.coordinator.set_value(&spec.key, value.clone()).await
    }

    // ── Switches and selects ─────────────────────────────────────

    /// `None` when the model has no such switch or it is not reported.
    pub fn switch_is_on(&self, key: &str) -> Option<bool> {
        let spec = self.descriptor.switch(key)?;
        let status = self.coordinator.status();
        let value = status.get(keys::status_key(&spec.key))?;
        Some(*value == spec.on)
    }

    pub async fn set_switch(&self, key: &str, on: bool) -> Result<(), CoreError> {
        let spec = self
            .descriptor
            .switch(key)
            .ok_or_else(|| self.unsupported(key))?;
        let value = if on { &spec.on } else { &spec.off };
        self.coordinator
            .set_value(keys::status_key(&spec.key), value.clone())
            .await
    }

    /// Raw value of a select declared by the model.
    pub fn select_value(&self, key: &str) -> Option<StatusValue> {
        if !self.descriptor.selects.iter().any(|s| s == key) {
            return None;
        }
        self.coordinator.status().get(keys::status_key(key)).cloned()
    }

    pub async fn set_select(&self, key: &str, value: impl Into<StatusValue>) -> Result<(), CoreError> {
        if !self.descriptor.selects.iter().any(|s| s == key) {
            return Err(self.unsupported(key));
        }
        self.coordinator.set_value(keys::status_key(key), value).await
    }

    // ── Humidifier ───────────────────────────────────────────────

    /// Target humidity on humidifying models.
    pub fn humidity_target(&self) -> Option<StatusValue> {
        self.humidifier_value(|h| &h.humidity_target_key)
    }

    /// Active function, e.g. purify only or purify and humidify.
    pub fn humidifier_function(&self) -> Option<StatusValue> {
        self.humidifier_value(|h| &h.function_key)
    }

    /// Device error code; `0` means no error.
    pub fn error_code(&self) -> Option<StatusValue> {
        self.humidifier_value(|h| &h.error_code_key)
    }

    /// `true` when the reported error code is non-zero.
    pub fn has_error(&self) -> bool {
        self.error_code()
            .and_then(|code| code.as_i64())
            .is_some_and(|code| code != 0)
    }

    fn humidifier_value(&self, key: impl Fn(&HumidifierCapability) -> &String) -> Option<StatusValue> {
        let humidifier = self.descriptor.humidifier.as_ref()?;
        self.coordinator.status().get(key(humidifier)).cloned()
    }

    fn unsupported(&self, operation: &str) -> CoreError {
        CoreError::Unsupported {
            model: self.descriptor.model.clone(),
            operation: operation.to_owned(),
        }
    }
}

// ── Percentage mapping ───────────────────────────────────────────

/// Percentage of step `index` (zero-based) out of `len` ordered steps.
#[allow(clippy::cast_possible_truncation)]
pub fn ordered_index_to_percentage(index: usize, len: usize) -> u8 {
    if len == 0 {
        return 0;
    }
    (((index + 1) * 100) / len).min(100) as u8
}

/// First step whose upper bound `(position * 100) / len` reaches
/// `percentage`, else the last step. `None` when there are no steps.
pub fn percentage_to_ordered_index(percentage: u8, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let percentage = usize::from(percentage);
    let index = (1..=len)
        .position(|position| percentage <= (position * 100) / len)
        .unwrap_or(len - 1);
    Some(index)
}
