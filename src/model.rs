//! Metric data model shared by the agent and the server.
//!
//! Defines the wire representation (`Metric`), the update command derived
//! from it (`MetricUpdate`) and the stored aggregate (`MetricRecord`) together
//! with the replace-or-accumulate rule that ties them together.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while interpreting a metric coming from the outside world.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("unknown metric type '{0}'")]
    UnknownKind(String),

    #[error("metric '{id}' of type {kind} carries no value")]
    MissingValue { id: String, kind: MetricKind },

    #[error("invalid {kind} value '{raw}'")]
    InvalidValue { kind: MetricKind, raw: String },

    #[error("metric id must not be empty")]
    EmptyId,
}

/// The two metric kinds understood by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricError::UnknownKind(other.to_string())),
        }
    }
}

/// Wire form of a single metric, used by the JSON endpoints and the agent.
///
/// `value` is meaningful for gauges, `delta` for counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Builds the wire view of `record` restricted to `kind`.
    ///
    /// Returns `None` when the record holds no value of that kind.
    pub fn from_record(record: &MetricRecord, kind: MetricKind) -> Option<Self> {
        match kind {
            MetricKind::Gauge => record.gauge.map(|v| Metric::gauge(record.id.clone(), v)),
            MetricKind::Counter => record
                .counter
                .map(|d| Metric::counter(record.id.clone(), d)),
        }
    }
}

/// The value carried by one update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parses the textual value used by the URL-encoded update route.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self, MetricError> {
        let invalid = || MetricError::InvalidValue {
            kind,
            raw: raw.to_string(),
        };
        match kind {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(invalid),
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| invalid()),
        }
    }
}

/// A validated update command for one metric id.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub id: String,
    pub value: MetricValue,
}

impl MetricUpdate {
    pub fn new(id: impl Into<String>, value: MetricValue) -> Result<Self, MetricError> {
        let id = id.into();
        if id.is_empty() {
            return Err(MetricError::EmptyId);
        }
        Ok(Self { id, value })
    }
}

impl TryFrom<Metric> for MetricUpdate {
    type Error = MetricError;

    fn try_from(metric: Metric) -> Result<Self, Self::Error> {
        let value = match metric.kind {
            MetricKind::Gauge => metric.value.map(MetricValue::Gauge),
            MetricKind::Counter => metric.delta.map(MetricValue::Counter),
        };
        match value {
            Some(value) => MetricUpdate::new(metric.id, value),
            None => Err(MetricError::MissingValue {
                id: metric.id,
                kind: metric.kind,
            }),
        }
    }
}

/// Stored aggregate for one metric id.
///
/// A gauge update overwrites `gauge`; a counter update adds to `counter`,
/// seeding it on first write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricRecord {
    pub id: String,
    pub gauge: Option<f64>,
    pub counter: Option<i64>,
}

impl MetricRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Wire view of every value the record holds, gauge first.
    pub fn to_metrics(&self) -> Vec<Metric> {
        [MetricKind::Gauge, MetricKind::Counter]
            .into_iter()
            .filter_map(|kind| Metric::from_record(self, kind))
            .collect()
    }

    /// Applies the replace-or-accumulate rule for `value`.
    pub fn apply(&mut self, value: MetricValue) {
        match value {
            MetricValue::Gauge(v) => self.gauge = Some(v),
            MetricValue::Counter(d) => {
                self.counter = Some(self.counter.map_or(d, |c| c.wrapping_add(d)));
            }
        }
    }
}

/// One element of the persisted snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub delta: Option<i64>,
}

impl From<&MetricRecord> for SnapshotEntry {
    fn from(record: &MetricRecord) -> Self {
        Self {
            name: record.id.clone(),
            value: record.gauge,
            delta: record.counter,
        }
    }
}

impl From<SnapshotEntry> for MetricRecord {
    fn from(entry: SnapshotEntry) -> Self {
        Self {
            id: entry.name,
            gauge: entry.value,
            counter: entry.delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let mut record = MetricRecord::new("x");
        record.apply(MetricValue::Counter(5));
        record.apply(MetricValue::Counter(7));
        assert_eq!(record.counter, Some(12));
        assert_eq!(record.gauge, None);

        record.apply(MetricValue::Gauge(0.5));
        assert_eq!(
            record.to_metrics(),
            vec![Metric::gauge("x", 0.5), Metric::counter("x", 12)]
        );
    }

    #[test]
    fn test_gauge_overwrites() {
        let mut record = MetricRecord::new("x");
        record.apply(MetricValue::Gauge(1.5));
        record.apply(MetricValue::Gauge(-2.25));
        assert_eq!(record.gauge, Some(-2.25));
        assert_eq!(record.counter, None);
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(
            MetricValue::parse(MetricKind::Gauge, "3.14"),
            Ok(MetricValue::Gauge(3.14))
        );
        assert_eq!(
            MetricValue::parse(MetricKind::Counter, "42"),
            Ok(MetricValue::Counter(42))
        );
        assert!(MetricValue::parse(MetricKind::Counter, "4.2").is_err());
        assert!(MetricValue::parse(MetricKind::Gauge, "abc").is_err());
        assert!(MetricValue::parse(MetricKind::Gauge, "NaN").is_err());
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&Metric::counter("PollCount", 5)).unwrap();
        assert_eq!(json, r#"{"id":"PollCount","type":"counter","delta":5}"#);

        let parsed: Metric = serde_json::from_str(r#"{"id":"a","type":"gauge","value":1.5}"#).unwrap();
        assert_eq!(parsed, Metric::gauge("a", 1.5));

        assert!(serde_json::from_str::<Metric>(r#"{"id":"a","type":"histogram"}"#).is_err());
    }

    #[test]
    fn test_update_requires_matching_field() {
        let metric = Metric {
            id: "a".into(),
            kind: MetricKind::Counter,
            delta: None,
            value: Some(1.0),
        };
        assert!(matches!(
            MetricUpdate::try_from(metric),
            Err(MetricError::MissingValue { .. })
        ));
        assert_eq!(
            MetricUpdate::try_from(Metric::gauge("", 1.0)),
            Err(MetricError::EmptyId)
        );
    }
}
