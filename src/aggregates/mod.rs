//! Per-signal metadata aggregates (C4, spec §3, §4.4).

pub mod attribute;
pub mod log;
pub mod metric;
pub mod span;

pub use attribute::{AttributeMetadata, AttributeScope, SerializedAttributeMetadata, SignalType};
pub use log::{LogMetadata, LogRecordUpdate, LogUpdate, SerializedLogMetadata};
pub use metric::{MetricDataPointUpdate, MetricMetadata, MetricType, MetricUpdate, SerializedMetricMetadata};
pub use span::{SerializedSpanMetadata, SpanMetadata, SpanRecordUpdate, SpanUpdate};
