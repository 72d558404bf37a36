//! Newline-delimited JSON ingestion of position reports.

use std::collections::VecDeque;
use std::io::BufRead;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::aircraft::PositionReport;

/// A feed document holding a batch of reports.
#[derive(Deserialize)]
struct FeedDocument {
    #[serde(rename = "acList")]
    ac_list: Vec<Value>,
}

/// Iterator of [`PositionReport`]s read from JSON lines.
///
/// Each non-blank line is either one report object or a feed document
/// `{"acList": [...]}`. Lines and reports that do not parse are logged and
/// skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
    line_number: u64,
    pending: VecDeque<PositionReport>,
    malformed: u64,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
            pending: VecDeque::new(),
            malformed: 0,
        }
    }

    /// Lines or reports skipped so far because they did not parse.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    fn parse_line(&mut self) {
        let line = self.line.trim();
        if line.is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                self.malformed += 1;
                warn!(line = self.line_number, error = %e, "skipping malformed line");
                return;
            }
        };

        if value.get("acList").is_some() {
            match FeedDocument::deserialize(value) {
                Ok(document) => {
                    for report in document.ac_list {
                        self.push_report(report);
                    }
                }
                Err(e) => {
                    self.malformed += 1;
                    warn!(line = self.line_number, error = %e, "skipping malformed feed document");
                }
            }
        } else {
            self.push_report(value);
        }
    }

    fn push_report(&mut self, value: Value) {
        match PositionReport::deserialize(value) {
            Ok(report) => self.pending.push_back(report),
            Err(e) => {
                self.malformed += 1;
                warn!(line = self.line_number, error = %e, "skipping malformed position report");
            }
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesSource<R> {
    type Item = PositionReport;

    fn next(&mut self) -> Option<PositionReport> {
        loop {
            if let Some(report) = self.pending.pop_front() {
                return Some(report);
            }

            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    self.parse_line();
                }
                Err(e) => {
                    warn!(line = self.line_number + 1, error = %e, "input read failed, stopping");
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/source_tests.rs"]
mod tests;
