// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub document: PathBuf,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFailure {
    pub device: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedCore(String),
    Duplicate { kept: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub device: String,
    pub document: PathBuf,
    pub reason: SkipReason,
}

/// Everything that happened during a run, gathered for the final summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Family id and selected version.
    pub families: Vec<(String, String)>,
    pub warnings: Vec<String>,
    pub parse_failures: Vec<ParseFailure>,
    pub generation_failures: Vec<DeviceFailure>,
    pub write_failures: Vec<DeviceFailure>,
    pub skipped: Vec<Skipped>,
    pub produced: Vec<String>,
}

impl RunReport {
    pub fn failure_count(&self) -> usize {
        self.parse_failures.len() + self.generation_failures.len() + self.write_failures.len()
    }

    /// Prints the report through the logger, problems as warnings. Discovery warnings were
    /// logged when they were found.
    pub fn log(&self) {
        for f in &self.parse_failures {
            warn!("{}: {} ({})", f.document.display(), f.message, f.reason);
        }
        for f in self.generation_failures.iter().chain(&self.write_failures) {
            warn!("{}: {}", f.device, f.message);
        }
        for s in &self.skipped {
            info!("Skipped {}", s);
        }
        info!("{}", self.summary());
    }

    fn summary(&self) -> String {
        format!(
            "{} families, {} devices produced, {} skipped, {} failed",
            self.families.len(), self.produced.len(), self.skipped.len(), self.failure_count(),
        )
    }
}

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.reason {
            SkipReason::UnsupportedCore(cpu) => {
                write!(f, "{} ({}): unsupported core {}", self.device, self.document.display(), cpu)
            }
            SkipReason::Duplicate { kept } => {
                write!(f, "{} ({}): duplicate of {}", self.device, self.document.display(), kept.display())
            }
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Families:")?;
        for (family, version) in &self.families {
            writeln!(f, "  {} {}", family, version)?;
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for w in &self.warnings {
                writeln!(f, "  {}", w)?;
            }
        }
        if !self.parse_failures.is_empty() {
            writeln!(f, "Parse failures:")?;
            for p in &self.parse_failures {
                writeln!(f, "  {} [{}] {}", p.document.display(), p.reason, p.message)?;
            }
        }
        for (title, failures) in [("Generation failures:", &self.generation_failures), ("Write failures:", &self.write_failures)] {
            if !failures.is_empty() {
                writeln!(f, "{}", title)?;
                for d in failures {
                    writeln!(f, "  {}: {}", d.device, d.message)?;
                }
            }
        }
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped:")?;
            for s in &self.skipped {
                writeln!(f, "  {}", s)?;
            }
        }
        write!(f, "{}", self.summary())
    }
}
