//! Line-oriented parser for `pfctl -vvsInterface` output.
//!
//! The output is a sequence of sections. Each section starts with the
//! interface name at column 0, followed by indented detail lines:
//!
//! ```text
//! em0
//!     Cleared:     Thu Jan  1 00:00:00 2024
//!     References:  [ States:  12   Rules: 40 ]
//!     In4/Pass:    [ Packets: 42   Bytes: 1000 ]
//!     In4/Block:   [ Packets: 0    Bytes: 0 ]
//! ```
//!
//! Only the `Packets`/`Bytes` lines of interfaces in the allow-list are
//! turned into records.

use super::field::StatField;
use crate::config::Interface;
use regex::Regex;
use std::collections::HashMap;
use std::io::BufRead;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while reading the stats stream.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Reading the stream failed.
    #[error("error occurred when reading pfctl output: {0}")]
    Read(#[from] std::io::Error),
}

/// Allow-list of interfaces to report, mapping device name to description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceFilter {
    descriptions: HashMap<String, String>,
}

impl InterfaceFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the filter from the enabled interfaces in `interfaces`.
    ///
    /// Interfaces without a device name are skipped.
    pub fn from_interfaces<'a>(interfaces: impl IntoIterator<Item = &'a Interface>) -> Self {
        interfaces
            .into_iter()
            .filter(|iface| iface.enabled && !iface.name.is_empty())
            .map(|iface| (iface.name.clone(), iface.description.clone()))
            .collect()
    }

    /// Adds or replaces an interface.
    pub fn insert(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.descriptions.insert(name.into(), description.into());
    }

    /// Returns the description of `name` if it is in the allow-list.
    pub fn description(&self, name: &str) -> Option<&str> {
        self.descriptions.get(name).map(String::as_str)
    }

    /// Number of interfaces in the allow-list.
    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    /// Returns true if no interface is allowed.
    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}

impl FromIterator<(String, String)> for InterfaceFilter {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            descriptions: iter.into_iter().collect(),
        }
    }
}

/// Statistics for one field of one interface.
///
/// Each count keeps its own parse result so a malformed packet count
/// does not hide a valid byte count on the same line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    /// Interface device name.
    pub interface: String,
    /// Interface description.
    pub description: String,
    /// Field the counts belong to.
    pub field: StatField,
    /// Packet count.
    pub packets: Result<u64, ParseIntError>,
    /// Byte count.
    pub bytes: Result<u64, ParseIntError>,
}

/// Compiled patterns for the stats stream.
#[derive(Debug, Clone)]
pub struct StatsParser {
    iface_line: Regex,
    stats_line: Regex,
}

impl StatsParser {
    /// Compiles the line patterns.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            iface_line: Regex::new(r"^\S+")?,
            stats_line: Regex::new(
                r"^\s+([A-Za-z0-9_/]+):\s*\[\s*Packets:\s*([0-9]+)\s*Bytes:\s*([0-9]+)\s*\]",
            )?,
        })
    }

    /// Starts parsing `reader`, reporting only interfaces in `filter`.
    pub fn parse<'p, R: BufRead>(
        &'p self,
        reader: R,
        filter: &'p InterfaceFilter,
    ) -> StatLines<'p, R> {
        StatLines {
            parser: self,
            filter,
            reader,
            current_interface: String::new(),
            buf: Vec::new(),
            done: false,
        }
    }

    /// Processes one line, updating the current interface.
    fn parse_line(
        &self,
        line: &str,
        current_interface: &mut String,
        filter: &InterfaceFilter,
    ) -> Option<StatRecord> {
        if let Some(iface) = self.iface_line.find(line) {
            current_interface.clear();
            current_interface.push_str(iface.as_str());
            return None;
        }

        // Cheap lookup first; most sections are not interesting.
        let description = filter.description(current_interface)?;

        let caps = self.stats_line.captures(line)?;
        let field: StatField = caps[1].parse().ok()?;

        Some(StatRecord {
            interface: current_interface.clone(),
            description: description.to_string(),
            field,
            packets: caps[2].parse(),
            bytes: caps[3].parse(),
        })
    }
}

/// Iterator over the records of one stats stream.
///
/// Ends when the input ends. A read error is yielded once, after which
/// the iterator is exhausted.
pub struct StatLines<'p, R> {
    parser: &'p StatsParser,
    filter: &'p InterfaceFilter,
    reader: R,
    current_interface: String,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Iterator for StatLines<'_, R> {
    type Item = Result<StatRecord, StatsError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if let Some(record) =
                        self.parser
                            .parse_line(line, &mut self.current_interface, self.filter)
                    {
                        return Some(Ok(record));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(StatsError::Read(e)));
                }
            }
        }
        None
    }
}
