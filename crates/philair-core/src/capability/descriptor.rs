// ── Capability descriptors ──
//
// Pure data describing how one device model maps abstract controls onto
// protocol key/value patches. Models are built by overlaying overrides on
// a base descriptor.

use indexmap::IndexMap;
use philair_api::{DeviceStatus, StatusPatch, StatusValue};
use serde::{Deserialize, Serialize};

/// Power control: one key toggled between two values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSpec {
    pub key: String,
    pub on: StatusValue,
    pub off: StatusValue,
}

/// Oscillation control. Several "on" values may be reported; the first is
/// the one written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillationSpec {
    pub key: String,
    pub on: Vec<StatusValue>,
    pub off: StatusValue,
}

/// A two-state control such as child lock or beep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleSpec {
    pub key: String,
    pub on: StatusValue,
    pub off: StatusValue,
}

/// Keys of the humidifier controls, present only on models that humidify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumidifierCapability {
    pub function_key: String,
    pub humidity_target_key: String,
    pub error_code_key: String,
}

/// Read a patch key back from a different status key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyReplacement {
    pub from: String,
    pub to: String,
}

impl KeyReplacement {
    fn as_pair(&self) -> (&str, &str) {
        (&self.from, &self.to)
    }
}

/// Everything the fan operations need to drive one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model id, e.g. `AC2889`.
    pub model: String,
    pub power: PowerSpec,
    /// Preset name -> patch, in display order.
    #[serde(default)]
    pub presets: IndexMap<String, StatusPatch>,
    #[serde(default)]
    pub replace_preset_key: Option<KeyReplacement>,
    /// Speed name -> patch, slowest first.
    #[serde(default)]
    pub speeds: IndexMap<String, StatusPatch>,
    #[serde(default)]
    pub replace_speed_key: Option<KeyReplacement>,
    #[serde(default)]
    pub oscillation: Option<OscillationSpec>,
    #[serde(default)]
    pub switches: Vec<ToggleSpec>,
    #[serde(default)]
    pub lights: Vec<String>,
    #[serde(default)]
    pub selects: Vec<String>,
    #[serde(default)]
    pub numbers: Vec<String>,
    #[serde(default)]
    pub humidifier: Option<HumidifierCapability>,
}

/// Partial descriptor applied on top of a base with [`ModelDescriptor::overlay`].
///
/// Preset and speed maps merge key by key; every other present field
/// replaces the base value outright.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorOverrides {
    pub power: Option<PowerSpec>,
    pub presets: Option<IndexMap<String, StatusPatch>>,
    pub replace_preset_key: Option<KeyReplacement>,
    pub speeds: Option<IndexMap<String, StatusPatch>>,
    pub replace_speed_key: Option<KeyReplacement>,
    pub oscillation: Option<OscillationSpec>,
    pub switches: Option<Vec<ToggleSpec>>,
    pub lights: Option<Vec<String>>,
    pub selects: Option<Vec<String>>,
    pub numbers: Option<Vec<String>>,
    pub humidifier: Option<HumidifierCapability>,
}

impl ModelDescriptor {
    /// A descriptor with only a power control.
    pub fn new(model: impl Into<String>, power: PowerSpec) -> Self {
        Self {
            model: model.into(),
            power,
            presets: IndexMap::new(),
            replace_preset_key: None,
            speeds: IndexMap::new(),
            replace_speed_key: None,
            oscillation: None,
            switches: Vec::new(),
            lights: Vec::new(),
            selects: Vec::new(),
            numbers: Vec::new(),
            humidifier: None,
        }
    }

    /// Derive a new model from this one.
    pub fn overlay(&self, model: impl Into<String>, overrides: &DescriptorOverrides) -> Self {
        let mut out = self.clone();
        out.model = model.into();

        if let Some(power) = &overrides.power {
            out.power = power.clone();
        }
        if let Some(presets) = &overrides.presets {
            merge_patches(&mut out.presets, presets);
        }
        if let Some(replace) = &overrides.replace_preset_key {
            out.replace_preset_key = Some(replace.clone());
        }
        if let Some(speeds) = &overrides.speeds {
            merge_patches(&mut out.speeds, speeds);
        }
        if let Some(replace) = &overrides.replace_speed_key {
            out.replace_speed_key = Some(replace.clone());
        }
        if let Some(oscillation) = &overrides.oscillation {
            out.oscillation = Some(oscillation.clone());
        }
        if let Some(switches) = &overrides.switches {
            out.switches.clone_from(switches);
        }
        if let Some(lights) = &overrides.lights {
            out.lights.clone_from(lights);
        }
        if let Some(selects) = &overrides.selects {
            out.selects.clone_from(selects);
        }
        if let Some(numbers) = &overrides.numbers {
            out.numbers.clone_from(numbers);
        }
        if let Some(humidifier) = &overrides.humidifier {
            out.humidifier = Some(humidifier.clone());
        }
        out
    }

    /// First preset whose patch matches `status`.
    pub fn match_preset(&self, status: &DeviceStatus) -> Option<&str> {
        first_match(&self.presets, status, self.replace_preset_key.as_ref())
    }

    /// Position of the first speed whose patch matches `status`.
    pub fn match_speed(&self, status: &DeviceStatus) -> Option<usize> {
        let replace = self.replace_speed_key.as_ref().map(KeyReplacement::as_pair);
        self.speeds
            .values()
            .position(|patch| patch.matches(status, replace))
    }

    pub fn switch(&self, key: &str) -> Option<&ToggleSpec> {
        self.switches.iter().find(|s| s.key == key)
    }
}

fn merge_patches(base: &mut IndexMap<String, StatusPatch>, overrides: &IndexMap<String, StatusPatch>) {
    for (name, patch) in overrides {
        base.insert(name.clone(), patch.clone());
    }
}

fn first_match<'a>(
    table: &'a IndexMap<String, StatusPatch>,
    status: &DeviceStatus,
    replace: Option<&KeyReplacement>,
) -> Option<&'a str> {
    let replace = replace.map(KeyReplacement::as_pair);
    table
        .iter()
        .find(|(_, patch)| patch.matches(status, replace))
        .map(|(name, _)| name.as_str())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn base() -> ModelDescriptor {
        let mut base = ModelDescriptor::new(
            "generic",
            PowerSpec {
                key: "pwr".into(),
                on: "1".into(),
                off: "0".into(),
            },
        );
        base.presets.insert(
            "auto".into(),
            [("pwr", "1"), ("mode", "P")].into_iter().collect(),
        );
        base.presets.insert(
            "allergen".into(),
            [("pwr", "1"), ("mode", "A")].into_iter().collect(),
        );
        base.lights = vec!["uil".into(), "aqil".into()];
        base
    }

    #[test]
    fn overlay_merges_presets_by_key() {
        let overrides = DescriptorOverrides {
            presets: Some(
                [
                    (
                        "allergen".to_owned(),
                        [("pwr", "1"), ("mode", "AG")].into_iter().collect(),
                    ),
                    (
                        "turbo".to_owned(),
                        [("pwr", "1"), ("mode", "T")].into_iter().collect(),
                    ),
                ]
                .into_iter()
                .collect(),
            ),
            ..DescriptorOverrides::default()
        };

        let model = base().overlay("AC0001", &overrides);

        assert_eq!(model.model, "AC0001");
        assert_eq!(
            model.presets.keys().collect::<Vec<_>>(),
            vec!["auto", "allergen", "turbo"]
        );
        assert_eq!(
            model.presets["allergen"].get("mode"),
            Some(&StatusValue::from("AG"))
        );
    }

    #[test]
    fn overlay_replaces_lists() {
        let overrides = DescriptorOverrides {
            lights: Some(vec!["D03-05".into()]),
            selects: Some(vec!["ddp".into()]),
            ..DescriptorOverrides::default()
        };

        let model = base().overlay("AC0002", &overrides);

        assert_eq!(model.lights, vec!["D03-05".to_owned()]);
        assert_eq!(model.selects, vec!["ddp".to_owned()]);
        assert_eq!(model.power, base().power);
    }

    #[test]
    fn empty_overrides_only_rename() {
        let model = base().overlay("AC0003", &DescriptorOverrides::default());
        let mut expected = base();
        expected.model = "AC0003".into();
        assert_eq!(model, expected);
    }

    #[test]
    fn match_preset_uses_declaration_order() {
        let mut model = base();
        model.presets.insert(
            "manual".into(),
            StatusPatch::single("pwr", "1"),
        );
        let status: DeviceStatus = [("pwr", "1"), ("mode", "A")].into_iter().collect();

        assert_eq!(model.match_preset(&status), Some("allergen"));

        let unknown: DeviceStatus = [("pwr", "1"), ("mode", "X")].into_iter().collect();
        assert_eq!(model.match_preset(&unknown), Some("manual"));
    }

    #[test]
    fn match_honours_replacement_key() {
        let mut model = base();
        model.replace_preset_key = Some(KeyReplacement {
            from: "mode".into(),
            to: "mode_status".into(),
        });
        let status: DeviceStatus = [("pwr", "1"), ("mode_status", "P")].into_iter().collect();

        assert_eq!(model.match_preset(&status), Some("auto"));
    }

    #[test]
    fn overrides_deserialize_partially() {
        let overrides: DescriptorOverrides = from_json(
            r#"{
                "speeds": { "turbo": { "pwr": "1", "om": "t" } },
                "oscillation": { "key": "D0320F", "on": [17920], "off": 0 }
            }"#,
        );

        assert_eq!(overrides.speeds.unwrap()["turbo"].len(), 2);
        let osc = overrides.oscillation.unwrap();
        assert_eq!(osc.on, vec![StatusValue::Integer(17920)]);
        assert!(overrides.power.is_none());
    }

    fn from_json(json: &str) -> DescriptorOverrides {
        serde_json::from_str(json).unwrap()
    }
}
