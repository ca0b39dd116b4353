//! A single metric observation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label carrying the scraped node's name.
pub const NODE_LABEL: &str = "node";
pub const NAMESPACE_LABEL: &str = "namespace";
pub const POD_LABEL: &str = "pod";
pub const CONTAINER_LABEL: &str = "container";

/// One decoded sample: metric name, label set, value, and timestamp.
///
/// The value is serialized as a string so `NaN` and the infinities
/// survive a JSON round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(with = "value_repr")]
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64, timestamp_ms: i64) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value,
            timestamp_ms,
        }
    }

    /// Builder-style label setter.
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    /// Look up a label value, treating an empty value as absent.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Record the node this sample was scraped from, unless the source
    /// already set one.
    pub fn tag_node(&mut self, node: &str) {
        if self.label(NODE_LABEL).is_none() {
            self.labels.insert(NODE_LABEL.to_string(), node.to_string());
        }
    }
}

mod value_repr {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        let text = if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value.is_sign_positive() { "+Inf" } else { "-Inf" }.to_string()
        } else {
            value.to_string()
        };
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<f64>()
            .map_err(|_| de::Error::custom(format!("invalid sample value {text:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_sample() {
        let sample = MetricSample::new("container_memory_usage_bytes", 1.5e9, 1_700_000_000_000)
            .with_label("namespace", "default")
            .with_label("pod", "web-0");

        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"value\":\"1500000000\""), "{json}");

        let back: MetricSample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn non_finite_values_round_trip() {
        for value in [f64::INFINITY, f64::NEG_INFINITY] {
            let sample = MetricSample::new("m", value, 0);
            let back: MetricSample =
                serde_json::from_slice(&serde_json::to_vec(&sample).unwrap()).unwrap();
            assert_eq!(back.value, value);
        }

        let nan = MetricSample::new("m", f64::NAN, 0);
        let json = serde_json::to_string(&nan).unwrap();
        assert!(json.contains("\"NaN\""));
        let back: MetricSample = serde_json::from_str(&json).unwrap();
        assert!(back.value.is_nan());
    }

    #[test]
    fn empty_label_counts_as_absent() {
        let sample = MetricSample::new("m", 1.0, 0).with_label("container", "");
        assert_eq!(sample.label(CONTAINER_LABEL), None);
    }

    #[test]
    fn tag_node_keeps_existing_value() {
        let mut sample = MetricSample::new("m", 1.0, 0);
        sample.tag_node("node-a");
        assert_eq!(sample.label(NODE_LABEL), Some("node-a"));

        sample.tag_node("node-b");
        assert_eq!(sample.label(NODE_LABEL), Some("node-a"));
    }
}
