// ── Device status data types ──
//
// A device reports its whole state as a flat map of short protocol keys
// (`"pwr"`, `"mode"`, `"D0310C"`, ...) to scalar or small composite values.
// The coordinator never interprets these; capability descriptors do.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ── StatusValue ──────────────────────────────────────────────────────

/// One value in a status snapshot.
///
/// Untagged so it round-trips the device's JSON: older firmware reports
/// strings (`"1"`, `"P"`), newer firmware reports integers, and a few keys
/// carry nested objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Integer(i64),
    Text(String),
    Composite(serde_json::Value),
}

impl StatusValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
            Self::Composite(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for StatusValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for StatusValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for StatusValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for StatusValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<serde_json::Value> for StatusValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Number(ref n) => n.as_i64().map_or(Self::Composite(value), Self::Integer),
            other => Self::Composite(other),
        }
    }
}

// ── DeviceStatus ─────────────────────────────────────────────────────

/// A complete status snapshot received from the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceStatus(BTreeMap<String, StatusValue>);

impl DeviceStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&StatusValue> {
        self.0.get(key)
    }

    /// Shorthand for text-valued keys.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(StatusValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// First key from `keys` present in the snapshot.
    ///
    /// Firmware generations name the same field differently (`name`,
    /// `D01S03`, ...), so lookups of identity fields try each in turn.
    pub fn first_of<'a>(&self, keys: &[&'a str]) -> Option<(&'a str, &StatusValue)> {
        keys.iter().find_map(|k| self.get(k).map(|v| (*k, v)))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StatusValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge every key of `patch` into this snapshot.
    pub fn apply(&mut self, patch: &StatusPatch) {
        for (key, value) in patch.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StatusValue)> {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for DeviceStatus
where
    K: Into<String>,
    V: Into<StatusValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ── StatusPatch ──────────────────────────────────────────────────────

/// A partial key -> value mapping, written to the device as one control
/// request or compared against a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusPatch(IndexMap<String, StatusValue>);

impl StatusPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: impl Into<String>, value: impl Into<StatusValue>) -> Self {
        let mut patch = Self::new();
        patch.insert(key, value);
        patch
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StatusValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&StatusValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StatusValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Whether every key of the patch has an equal value in `status`.
    ///
    /// `replace` maps a patch key to the key it is reported under, for
    /// models that write one key and echo another.
    pub fn matches(&self, status: &DeviceStatus, replace: Option<(&str, &str)>) -> bool {
        self.0.iter().all(|(key, expected)| {
            let key = match replace {
                Some((from, to)) if from == key => to,
                _ => key.as_str(),
            };
            status.get(key) == Some(expected)
        })
    }
}

impl<K, V> FromIterator<(K, V)> for StatusPatch
where
    K: Into<String>,
    V: Into<StatusValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_mixed_firmware_values() {
        let status: DeviceStatus = serde_json::from_value(json!({
            "pwr": "1",
            "mode": "P",
            "D0310C": 65,
            "D03-13": { "a": 1 },
        }))
        .unwrap();

        assert_eq!(status.get_str("pwr"), Some("1"));
        assert_eq!(status.get("D0310C"), Some(&StatusValue::Integer(65)));
        assert_eq!(
            status.get("D03-13"),
            Some(&StatusValue::Composite(json!({ "a": 1 })))
        );
    }

    #[test]
    fn apply_overwrites_only_patched_keys() {
        let mut status: DeviceStatus = [("pwr", "1"), ("mode", "P"), ("om", "2")]
            .into_iter()
            .collect();
        let patch: StatusPatch = [("mode", "M"), ("om", "t")].into_iter().collect();

        status.apply(&patch);

        assert_eq!(status.get_str("pwr"), Some("1"));
        assert_eq!(status.get_str("mode"), Some("M"));
        assert_eq!(status.get_str("om"), Some("t"));
    }

    #[test]
    fn patch_matches_when_all_keys_agree() {
        let status: DeviceStatus = [("pwr", "1"), ("mode", "A")].into_iter().collect();
        let allergen: StatusPatch = [("pwr", "1"), ("mode", "A")].into_iter().collect();
        let auto: StatusPatch = [("pwr", "1"), ("mode", "P")].into_iter().collect();

        assert!(allergen.matches(&status, None));
        assert!(!auto.matches(&status, None));
    }

    #[test]
    fn patch_match_honours_key_replacement() {
        let status: DeviceStatus = [("D03-12", "Auto General")].into_iter().collect();
        let patch = StatusPatch::single("D03-12x", "Auto General");

        assert!(!patch.matches(&status, None));
        assert!(patch.matches(&status, Some(("D03-12x", "D03-12"))));
    }

    #[test]
    fn integer_and_text_values_are_distinct() {
        let status: DeviceStatus = [("pwr", StatusValue::Integer(1))].into_iter().collect();
        let patch = StatusPatch::single("pwr", "1");

        assert!(!patch.matches(&status, None));
    }

    #[test]
    fn first_of_prefers_earlier_keys() {
        let status: DeviceStatus = [("D01S03", "Bedroom"), ("name", "Living room")]
            .into_iter()
            .collect();

        let (key, value) = status.first_of(&["name", "D01S03"]).unwrap();
        assert_eq!(key, "name");
        assert_eq!(value.to_string(), "Living room");
    }

    #[test]
    fn json_numbers_convert_to_integers() {
        assert_eq!(StatusValue::from(json!(3)), StatusValue::Integer(3));
        assert_eq!(StatusValue::from(json!("3")), StatusValue::Text("3".into()));
        assert_eq!(
            StatusValue::from(json!(true)),
            StatusValue::Composite(json!(true))
        );
    }
}
