// SPDX-License-Identifier: GPL-3.0-or-later

//! Locate, parse, generate and write, for every device under the packs directories.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use crate::device::Device;
use crate::generate::{self, selector, GenOptions};
use crate::locator;
use crate::report::{DeviceFailure, ParseFailure, RunReport, SkipReason, Skipped};
use crate::scheduler;
use crate::writer::OutputWriter;

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub packs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// 0 means one worker per hardware thread.
    pub parse_jobs: usize,
    pub options: GenOptions,
}

pub fn run(settings: &RunSettings) -> RunReport {
    let start = Instant::now();
    let mut report = RunReport::default();

    let discovery = locator::locate(&settings.packs);
    report.families = discovery.families.iter()
        .map(|f| (f.id.clone(), f.selected().version.as_str().to_string()))
        .collect();
    report.warnings = discovery.warnings.clone();

    let parsed = scheduler::run(discovery.units(), settings.parse_jobs);
    debug!("Parsed {} documents in {:.1?}", parsed.len(), start.elapsed());

    let writer = OutputWriter::new(&settings.output_dir);
    let mut seen: HashMap<&str, &PathBuf> = HashMap::new();
    let mut produced: Vec<&Device> = vec![];

    for unit in &parsed {
        let device = match &unit.result {
            Ok(device) => device,
            Err(e) => {
                report.parse_failures.push(ParseFailure {
                    document: unit.unit.path.clone(),
                    reason: e.reason_code(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        // Results are sorted, so the first document naming a device wins
        if let Some(kept) = seen.get(device.name.as_str()) {
            report.skipped.push(Skipped {
                device: device.name.clone(),
                document: unit.unit.path.clone(),
                reason: SkipReason::Duplicate { kept: (*kept).clone() },
            });
            continue;
        }
        seen.insert(&device.name, &unit.unit.path);

        if !device.core.is_supported() {
            report.skipped.push(Skipped {
                device: device.name.clone(),
                document: unit.unit.path.clone(),
                reason: SkipReason::UnsupportedCore(device.cpu.clone()),
            });
            continue;
        }

        let artifacts = match generate::generate_device(device, &settings.options) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                report.generation_failures.push(DeviceFailure { device: device.name.clone(), message: e.to_string() });
                continue;
            }
        };

        match writer.write_device(&artifacts) {
            Ok(paths) => {
                info!("Generated {} ({} files)", device.name, paths.len());
                report.produced.push(device.name.clone());
                produced.push(device);
            }
            Err(e) => {
                report.write_failures.push(DeviceFailure { device: device.name.clone(), message: format!("{:#}", e) });
            }
        }
    }

    if !produced.is_empty() {
        let selector_header = selector::generate(produced.iter().copied(), &settings.options);
        let shared = writer.write_file(selector::relative_path(), &selector_header)
            .and_then(|_| writer.write_license());
        if let Err(e) = shared {
            report.write_failures.push(DeviceFailure { device: "(shared files)".to_string(), message: format!("{:#}", e) });
        }
    }

    info!("Done in {:.1?}, output in {}", start.elapsed(), writer.root().display());
    report
}
