//! Protobuf messages of the `metric` package.
//!
//! Field tags match the deployed wire schema, so they must not be renumbered.

use crate::model::{self, MetricError, MetricKind};

#[derive(Clone, PartialEq, prost::Message)]
pub struct Metric {
    #[prost(string, tag = "1")]
    pub mtype: String,
    #[prost(int64, tag = "2")]
    pub delta: i64,
    #[prost(double, tag = "3")]
    pub value: f64,
    #[prost(string, tag = "4")]
    pub id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdatesRequest {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdatesResponse {
    #[prost(string, tag = "1")]
    pub error: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListResponse {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PingResponse {}

impl From<&model::Metric> for Metric {
    fn from(metric: &model::Metric) -> Self {
        Self {
            mtype: metric.kind.as_str().to_string(),
            delta: metric.delta.unwrap_or_default(),
            value: metric.value.unwrap_or_default(),
            id: metric.id.clone(),
        }
    }
}

impl TryFrom<Metric> for model::Metric {
    type Error = MetricError;

    /// Only the field matching `mtype` is carried over; proto3 scalars have
    /// no presence, so the other one is always dropped.
    fn try_from(metric: Metric) -> Result<Self, Self::Error> {
        let kind: MetricKind = metric.mtype.parse()?;
        Ok(match kind {
            MetricKind::Gauge => model::Metric::gauge(metric.id, metric.value),
            MetricKind::Counter => model::Metric::counter(metric.id, metric.delta),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_model_conversion() {
        let wire = Metric::from(&model::Metric::counter("PollCount", 7));
        assert_eq!(wire.mtype, "counter");
        assert_eq!(wire.delta, 7);
        assert_eq!(
            model::Metric::try_from(wire).unwrap(),
            model::Metric::counter("PollCount", 7)
        );

        let bad = Metric {
            mtype: "summary".into(),
            ..Default::default()
        };
        assert!(model::Metric::try_from(bad).is_err());
    }

    #[test]
    fn test_encoding_uses_fixed_tags() {
        let msg = Metric {
            mtype: String::new(),
            delta: 0,
            value: 0.0,
            id: "a".into(),
        };
        // field 4, wire type 2, length 1, 'a'
        assert_eq!(msg.encode_to_vec(), vec![0x22, 0x01, b'a']);
    }
}
