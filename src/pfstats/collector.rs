//! Prometheus collector for pf interface statistics.
//!
//! Every scrape runs the stats command once, parses its output and
//! turns each record into a packets counter and a bytes counter. No
//! state is kept between scrapes.

use super::field::StatField;
use super::parser::{InterfaceFilter, StatRecord, StatsError, StatsParser};
use crate::config::PfctlSettings;
use crate::metrics::{wrap_u64, MetricsError, PROM_NAMESPACE};
use prometheus::core::{Collector, Desc};
use prometheus::proto::{Counter, LabelPair, Metric, MetricFamily, MetricType};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::num::ParseIntError;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;

/// Variable labels of every pf stats counter.
const VARIABLE_LABELS: [&str; 2] = ["interface", "desc"];

/// Errors that abort the stats of a single scrape.
#[derive(Debug, Error)]
pub enum CollectError {
    /// The stats command could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        /// Command line that was run.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Reading the command output failed.
    #[error(transparent)]
    Stream(#[from] StatsError),
}

/// Which of the two counters of a field a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Packet count.
    Packets,
    /// Byte count.
    Bytes,
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterKind::Packets => f.write_str("packets"),
            CounterKind::Bytes => f.write_str("bytes"),
        }
    }
}

/// A count that could not be parsed as an unsigned 64-bit integer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} count: {source}")]
pub struct InvalidMetricValue {
    /// Counter the value was meant for.
    pub kind: CounterKind,
    /// Underlying parse error.
    #[source]
    pub source: ParseIntError,
}

/// One counter value produced by a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSample {
    /// Field the counter belongs to.
    pub field: StatField,
    /// Packets or bytes.
    pub kind: CounterKind,
    /// Interface device name.
    pub interface: String,
    /// Interface description.
    pub description: String,
    /// Wrapped counter value, or the reason the series is invalid.
    pub value: Result<f64, InvalidMetricValue>,
}

impl CounterSample {
    fn from_record(record: &StatRecord, kind: CounterKind) -> Self {
        let count = match kind {
            CounterKind::Packets => &record.packets,
            CounterKind::Bytes => &record.bytes,
        };
        Self {
            field: record.field,
            kind,
            interface: record.interface.clone(),
            description: record.description.clone(),
            value: count
                .clone()
                .map(wrap_u64)
                .map_err(|source| InvalidMetricValue { kind, source }),
        }
    }
}

/// Descriptors of the packets and bytes counters of one field.
#[derive(Debug, Clone)]
pub struct DescPair {
    /// `{namespace}_pfstats_packets`
    pub packets: Desc,
    /// `{namespace}_pfstats_bytes`
    pub bytes: Desc,
}

impl DescPair {
    fn new(namespace: &str, field: StatField) -> Result<Self, prometheus::Error> {
        let const_labels: HashMap<String, String> = field
            .const_labels()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let variable_labels: Vec<String> = VARIABLE_LABELS.iter().map(|l| l.to_string()).collect();

        Ok(Self {
            packets: Desc::new(
                format!("{namespace}_pfstats_packets"),
                "Number of packets processed by pf".to_string(),
                variable_labels.clone(),
                const_labels.clone(),
            )?,
            bytes: Desc::new(
                format!("{namespace}_pfstats_bytes"),
                "Number of bytes processed by pf".to_string(),
                variable_labels,
                const_labels,
            )?,
        })
    }

    /// Descriptor for `kind`.
    pub fn get(&self, kind: CounterKind) -> &Desc {
        match kind {
            CounterKind::Packets => &self.packets,
            CounterKind::Bytes => &self.bytes,
        }
    }
}

/// Descriptor pairs for all eight fields.
///
/// Built once at startup and shared read-only between scrapes.
#[derive(Debug, Clone)]
pub struct FieldDescs {
    pairs: BTreeMap<StatField, DescPair>,
}

impl FieldDescs {
    /// Builds the table for metrics under `namespace`.
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let pairs: BTreeMap<StatField, DescPair> = StatField::ALL
            .iter()
            .map(|&field| DescPair::new(namespace, field).map(|pair| (field, pair)))
            .collect::<Result<_, _>>()?;
        Ok(Self { pairs })
    }

    /// Returns the descriptors of `field`.
    pub fn get(&self, field: StatField) -> Option<&DescPair> {
        self.pairs.get(&field)
    }

    /// All sixteen descriptors.
    pub fn descs(&self) -> impl Iterator<Item = &Desc> {
        self.pairs
            .values()
            .flat_map(|pair| [&pair.packets, &pair.bytes])
    }
}

/// Program and arguments of the stats command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsCommand {
    /// Program to run.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
}

impl Default for StatsCommand {
    fn default() -> Self {
        PfctlSettings::default().into()
    }
}

impl From<PfctlSettings> for StatsCommand {
    fn from(settings: PfctlSettings) -> Self {
        Self {
            program: settings.command,
            args: settings.args,
        }
    }
}

impl fmt::Display for StatsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Collector exporting pf statistics of the enabled interfaces.
pub struct PfStatsCollector {
    filter: InterfaceFilter,
    command: StatsCommand,
    parser: StatsParser,
    descs: Arc<FieldDescs>,
}

impl PfStatsCollector {
    /// Creates a collector with the default `opnsense` namespace.
    pub fn new(filter: InterfaceFilter, command: StatsCommand) -> Result<Self, MetricsError> {
        let descs = Arc::new(FieldDescs::new(PROM_NAMESPACE)?);
        Self::with_descs(filter, command, descs)
    }

    /// Creates a collector sharing an existing descriptor table.
    pub fn with_descs(
        filter: InterfaceFilter,
        command: StatsCommand,
        descs: Arc<FieldDescs>,
    ) -> Result<Self, MetricsError> {
        Ok(Self {
            filter,
            command,
            parser: StatsParser::new()?,
            descs,
        })
    }

    /// Runs the stats command once and returns its samples.
    pub fn scrape(&self) -> Result<Vec<CounterSample>, CollectError> {
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| CollectError::Spawn {
                command: self.command.to_string(),
                source,
            })?;

        let result = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"))
            .map_err(StatsError::from)
            .and_then(|stdout| self.samples_from_reader(BufReader::new(stdout)))
            .map_err(CollectError::from);

        // Reap the child; its exit status does not affect the scrape.
        match child.wait() {
            Ok(status) => tracing::debug!(command = %self.command, %status, "Stats command exited"),
            Err(e) => tracing::debug!(command = %self.command, error = %e, "Failed to wait for stats command"),
        }

        result
    }

    /// Parses stats output from `reader` into samples.
    pub fn samples_from_reader(&self, reader: impl BufRead) -> Result<Vec<CounterSample>, StatsError> {
        let mut samples = Vec::new();
        for record in self.parser.parse(reader, &self.filter) {
            let record = record?;
            samples.push(CounterSample::from_record(&record, CounterKind::Packets));
            samples.push(CounterSample::from_record(&record, CounterKind::Bytes));
        }
        Ok(samples)
    }

    /// Groups samples into metric families by descriptor name.
    pub fn families(&self, samples: &[CounterSample]) -> Vec<MetricFamily> {
        let mut families: BTreeMap<&str, MetricFamily> = BTreeMap::new();

        for sample in samples {
            let Some(pair) = self.descs.get(sample.field) else {
                continue;
            };
            let desc = pair.get(sample.kind);

            let value = match &sample.value {
                Ok(value) => *value,
                Err(e) => {
                    tracing::warn!(
                        metric = %desc.fq_name,
                        interface = %sample.interface,
                        field = %sample.field,
                        error = %e,
                        "Invalid metric value"
                    );
                    f64::NAN
                }
            };

            families
                .entry(desc.fq_name.as_str())
                .or_insert_with(|| {
                    let mut family = MetricFamily::default();
                    family.set_name(desc.fq_name.clone());
                    family.set_help(desc.help.clone());
                    family.set_field_type(MetricType::COUNTER);
                    family
                })
                .mut_metric()
                .push(counter_metric(sample, value));
        }

        families.into_values().collect()
    }

    /// Families for one scrape; a failed scrape reports no pf stats at all.
    fn families_from_scrape(
        &self,
        scraped: Result<Vec<CounterSample>, CollectError>,
    ) -> Vec<MetricFamily> {
        match scraped {
            Ok(samples) => self.families(&samples),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect pf stats");
                Vec::new()
            }
        }
    }
}

fn counter_metric(sample: &CounterSample, value: f64) -> Metric {
    let mut labels: Vec<(&str, &str)> = VARIABLE_LABELS
        .iter()
        .copied()
        .zip([sample.interface.as_str(), sample.description.as_str()])
        .chain(sample.field.const_labels())
        .collect();
    labels.sort_unstable_by_key(|(name, _)| *name);

    let label_pairs: Vec<LabelPair> = labels
        .into_iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.to_string());
            pair.set_value(value.to_string());
            pair
        })
        .collect();

    let mut counter = Counter::default();
    counter.set_value(value);

    let mut metric = Metric::default();
    metric.set_label(label_pairs.into());
    metric.set_counter(counter);
    metric
}

impl Collector for PfStatsCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.descs().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families_from_scrape(self.scrape())
    }
}
