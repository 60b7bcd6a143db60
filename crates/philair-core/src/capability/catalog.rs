// ── Model catalog ──
//
// Explicit dispatch table from model id to descriptor. Built-in bases and
// models are registered here; configuration may add or adjust more.

use indexmap::IndexMap;
use philair_api::{StatusPatch, StatusValue};

use super::descriptor::{
    DescriptorOverrides, HumidifierCapability, ModelDescriptor, OscillationSpec, PowerSpec,
    ToggleSpec,
};
use super::keys;
use crate::error::CoreError;

pub const GENERIC: &str = "generic";
pub const NEW_GENERIC: &str = "new_generic";
pub const NEW2_GENERIC: &str = "new2_generic";

/// Model id -> descriptor.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: IndexMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The three firmware bases plus the built-in models.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();

        let generic = generic();
        let new_generic = new_generic();
        let new2_generic = new2_generic();

        catalog.insert(ac0850(&new_generic));
        catalog.insert(ac1715(&new_generic));
        catalog.insert(ac2729(&generic));
        catalog.insert(legacy_purifier(&generic, "AC2889", keys::PREFERRED_INDEX));
        catalog.insert(legacy_purifier(&generic, "AC3259", keys::GAS_PREFERRED_INDEX));
        catalog.insert(cx5120(&new2_generic));

        catalog.insert(generic);
        catalog.insert(new_generic);
        catalog.insert(new2_generic);
        catalog
    }

    pub fn get(&self, model: &str) -> Result<&ModelDescriptor, CoreError> {
        self.models
            .get(model)
            .ok_or_else(|| CoreError::UnknownModel {
                model: model.to_owned(),
            })
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Register `descriptor` under its own model id, replacing any previous one.
    pub fn insert(&mut self, descriptor: ModelDescriptor) {
        self.models.insert(descriptor.model.clone(), descriptor);
    }

    /// Overlay `overrides` on `base` (or on the existing `model` when no base
    /// is named) and register the result as `model`.
    pub fn apply_overrides(
        &mut self,
        model: &str,
        overrides: &DescriptorOverrides,
        base: Option<&str>,
    ) -> Result<&ModelDescriptor, CoreError> {
        let start = self.get(base.unwrap_or(model))?;
        let derived = start.overlay(model, overrides);
        self.insert(derived);
        self.get(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

// ── Built-in descriptors ─────────────────────────────────────────

fn patch<V>(pairs: &[(&str, V)]) -> StatusPatch
where
    V: Clone + Into<StatusValue>,
{
    pairs.iter().map(|(k, v)| (*k, v.clone())).collect()
}

fn table(entries: Vec<(&str, StatusPatch)>) -> IndexMap<String, StatusPatch> {
    entries
        .into_iter()
        .map(|(name, patch)| (name.to_owned(), patch))
        .collect()
}

fn toggle(key: &str, on: impl Into<StatusValue>, off: impl Into<StatusValue>) -> ToggleSpec {
    ToggleSpec {
        key: key.to_owned(),
        on: on.into(),
        off: off.into(),
    }
}

fn generic() -> ModelDescriptor {
    let mut base = ModelDescriptor::new(
        GENERIC,
        PowerSpec {
            key: keys::POWER.to_owned(),
            on: "1".into(),
            off: "0".into(),
        },
    );
    base.lights = vec![
        keys::DISPLAY_BACKLIGHT.to_owned(),
        keys::LIGHT_BRIGHTNESS.to_owned(),
    ];
    base
}

fn new_generic() -> ModelDescriptor {
    let mut base = ModelDescriptor::new(
        NEW_GENERIC,
        PowerSpec {
            key: keys::NEW_POWER.to_owned(),
            on: "ON".into(),
            off: "OFF".into(),
        },
    );
    base.selects = vec![keys::NEW_PREFERRED_INDEX.to_owned()];
    base
}

fn new2_generic() -> ModelDescriptor {
    ModelDescriptor::new(
        NEW2_GENERIC,
        PowerSpec {
            key: keys::NEW2_POWER.to_owned(),
            on: 1.into(),
            off: 0.into(),
        },
    )
}

fn new_mode(mode: &str) -> StatusPatch {
    patch(&[(keys::NEW_POWER, "ON"), (keys::NEW_MODE, mode)])
}

fn ac0850(base: &ModelDescriptor) -> ModelDescriptor {
    base.overlay(
        "AC0850",
        &DescriptorOverrides {
            presets: Some(table(vec![
                ("auto", new_mode("Auto General")),
                ("turbo", new_mode("Turbo")),
                ("sleep", new_mode("Sleep")),
            ])),
            speeds: Some(table(vec![
                ("sleep", new_mode("Sleep")),
                ("turbo", new_mode("Turbo")),
            ])),
            ..DescriptorOverrides::default()
        },
    )
}

fn ac1715(base: &ModelDescriptor) -> ModelDescriptor {
    base.overlay(
        "AC1715",
        &DescriptorOverrides {
            presets: Some(table(vec![
                ("auto", new_mode("Auto General")),
                ("speed 1", new_mode("Gentle/Speed 1")),
                ("speed 2", new_mode("Speed 2")),
                ("turbo", new_mode("Turbo")),
                ("sleep", new_mode("Sleep")),
            ])),
            speeds: Some(table(vec![
                ("sleep", new_mode("Sleep")),
                ("speed 1", new_mode("Gentle/Speed 1")),
                ("speed 2", new_mode("Speed 2")),
                ("turbo", new_mode("Turbo")),
            ])),
            lights: Some(vec![keys::NEW_DISPLAY_BACKLIGHT.to_owned()]),
            ..DescriptorOverrides::default()
        },
    )
}

fn legacy_mode(mode: &str) -> StatusPatch {
    patch(&[(keys::POWER, "1"), (keys::MODE, mode)])
}

fn legacy_speed(mode: &str, speed: &str) -> StatusPatch {
    patch(&[(keys::POWER, "1"), (keys::MODE, mode), (keys::SPEED, speed)])
}

/// Manual speed steps shared by the original-firmware purifiers.
fn legacy_speeds<'a>(slowest: &'a str, slowest_mode: &str) -> Vec<(&'a str, StatusPatch)> {
    vec![
        (slowest, legacy_speed(slowest_mode, "s")),
        ("speed 1", legacy_speed("M", "1")),
        ("speed 2", legacy_speed("M", "2")),
        ("speed 3", legacy_speed("M", "3")),
        ("turbo", legacy_speed("M", "t")),
    ]
}

fn ac2729(base: &ModelDescriptor) -> ModelDescriptor {
    let mut presets = vec![("auto", legacy_mode("P")), ("allergen", legacy_mode("A"))];
    presets.extend(legacy_speeds("night", "S"));

    base.overlay(
        "AC2729",
        &DescriptorOverrides {
            presets: Some(table(presets)),
            speeds: Some(table(legacy_speeds("night", "S"))),
            switches: Some(vec![toggle(
                keys::CHILD_LOCK,
                serde_json::Value::Bool(true),
                serde_json::Value::Bool(false),
            )]),
            selects: Some(vec![
                keys::FUNCTION.to_owned(),
                keys::HUMIDITY_TARGET.to_owned(),
                keys::PREFERRED_INDEX.to_owned(),
            ]),
            humidifier: Some(HumidifierCapability {
                function_key: keys::FUNCTION.to_owned(),
                humidity_target_key: keys::HUMIDITY_TARGET.to_owned(),
                error_code_key: keys::ERROR_CODE.to_owned(),
            }),
            ..DescriptorOverrides::default()
        },
    )
}

/// AC2889 and AC3259 share their tables and differ in the preferred index select.
fn legacy_purifier(base: &ModelDescriptor, model: &str, preferred_index: &str) -> ModelDescriptor {
    let mut presets = vec![
        ("auto", legacy_mode("P")),
        ("allergen", legacy_mode("A")),
        ("bacteria", legacy_mode("B")),
    ];
    presets.extend(legacy_speeds("sleep", "M"));

    base.overlay(
        model,
        &DescriptorOverrides {
            presets: Some(table(presets)),
            speeds: Some(table(legacy_speeds("sleep", "M"))),
            selects: Some(vec![preferred_index.to_owned()]),
            ..DescriptorOverrides::default()
        },
    )
}

fn new2_mode(mode_a: i64, mode_b: i64) -> StatusPatch {
    patch(&[
        (keys::NEW2_POWER, 1),
        (keys::NEW2_MODE_A, mode_a),
        (keys::NEW2_MODE_B, mode_b),
    ])
}

fn cx5120(base: &ModelDescriptor) -> ModelDescriptor {
    base.overlay(
        "CX5120",
        &DescriptorOverrides {
            presets: Some(table(vec![
                ("auto", new2_mode(3, 0)),
                ("high", new2_mode(3, 65)),
                ("low", new2_mode(3, 66)),
                ("ventilation", new2_mode(1, -127)),
            ])),
            speeds: Some(table(vec![
                ("high", new2_mode(3, 65)),
                ("low", new2_mode(3, 66)),
            ])),
            oscillation: Some(OscillationSpec {
                key: keys::NEW2_OSCILLATION.to_owned(),
                on: vec![17920.into(), 17242.into(), 23080.into()],
                off: 0.into(),
            }),
            switches: Some(vec![toggle(keys::NEW2_BEEP, 100, 0)]),
            lights: Some(vec![keys::NEW2_DISPLAY_BACKLIGHT.to_owned()]),
            selects: Some(vec![keys::NEW2_TIMER.to_owned()]),
            numbers: Some(vec![keys::NEW2_TARGET_TEMP.to_owned()]),
            ..DescriptorOverrides::default()
        },
    )
}
