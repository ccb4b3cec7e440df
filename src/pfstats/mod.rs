//! Packet filter statistics.
//!
//! Turns the output of `pfctl -vvsInterface` into Prometheus counters:
//! the parser attributes `Packets`/`Bytes` lines to the interface
//! section they appear in, and the collector runs the command on every
//! scrape and exposes the results.

mod collector;
mod field;
mod parser;

pub use collector::{
    CollectError, CounterKind, CounterSample, DescPair, FieldDescs, InvalidMetricValue,
    PfStatsCollector, StatsCommand,
};
pub use field::{Action, AddressFamily, Direction, StatField, UnknownField};
pub use parser::{InterfaceFilter, StatLines, StatRecord, StatsError, StatsParser};
