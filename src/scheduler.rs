// SPDX-License-Identifier: GPL-3.0-or-later

//! Parses document units on a fixed pool of worker threads. Workers pull units from a shared
//! injector queue, and the collected results are put back into a deterministic order, so the
//! outcome never depends on the worker count or on which thread finished first.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Instant;
use crossbeam_deque::{Injector, Steal};

use crate::device::Device;
use crate::locator::DocumentUnit;
use crate::parser::{self, ParseError};

#[derive(Debug)]
pub struct ParsedUnit {
    pub unit: DocumentUnit,
    pub result: Result<Device, ParseError>,
}

impl ParsedUnit {
    /// Device name when parsed, file stem otherwise.
    pub fn label(&self) -> String {
        match &self.result {
            Ok(device) => device.name.clone(),
            Err(_) => parser::unit_label(&self.unit.path),
        }
    }
}

/// Number of workers for `requested` (0 meaning "one per CPU"), clamped to the machine's
/// parallelism and to the amount of work.
pub fn worker_count(requested: usize, units: usize) -> usize {
    let available = thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1);
    let n = match requested {
        0 => available,
        n => n.min(available),
    };
    n.min(units).max(1)
}

fn next_job<T>(queue: &Injector<T>) -> Option<T> {
    loop {
        match queue.steal() {
            Steal::Success(job) => return Some(job),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}

/// Parses every unit with the given parse function. Results come back sorted by family, device
/// name and path.
pub fn run_with<F>(units: Vec<DocumentUnit>, requested_workers: usize, parse: F) -> Vec<ParsedUnit>
where
    F: Fn(&DocumentUnit) -> Result<Device, ParseError> + Sync,
{
    let workers = worker_count(requested_workers, units.len());
    info!("Parsing {} documents with {} workers", units.len(), workers);

    let queue = Injector::new();
    for unit in units {
        queue.push(unit);
    }

    let mut results = thread::scope(|s| {
        let handles = (0..workers)
            .map(|id| {
                let queue = &queue;
                let parse = &parse;
                s.spawn(move || {
                    let mut done = vec![];
                    while let Some(unit) = next_job(queue) {
                        debug!("worker={} parsing {}", id, unit.path.display());
                        let start = Instant::now();
                        let result = parse(&unit);
                        match &result {
                            Ok(d) => debug!("worker={} parsed {} ({}) in {:.1?}", id, unit.path.display(), d.name, start.elapsed()),
                            Err(e) => debug!("worker={} failed {}: {}", id, unit.path.display(), e),
                        }
                        done.push(ParsedUnit { unit, result });
                    }
                    done
                })
            })
            .collect::<Vec<_>>();

        handles.into_iter()
            .flat_map(|h| match h.join() {
                Ok(done) => done,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<_>>()
    });

    results.sort_by_cached_key(|r| (r.unit.family.clone(), r.label(), r.unit.path.clone()));
    results
}

pub fn run(units: Vec<DocumentUnit>, requested_workers: usize) -> Vec<ParsedUnit> {
    run_with(units, requested_workers, |unit| parser::parse_file(&unit.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::parser::tests::SAMPLE;

    fn units(dir: &std::path::Path, names: &[&str]) -> Vec<DocumentUnit> {
        names.iter()
            .map(|n| {
                let path = dir.join(format!("{}.atdf", n));
                let doc = SAMPLE.replace("ATSAMTEST1A", n);
                std::fs::write(&path, doc).unwrap();
                DocumentUnit { family: "SAMT".to_string(), path }
            })
            .collect()
    }

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(worker_count(0, 0), 1);
        assert_eq!(worker_count(1, 100), 1);
        assert!(worker_count(0, 100) >= 1);
        assert!(worker_count(10_000, 100) <= 100);
        assert_eq!(worker_count(8, 2).min(2), worker_count(8, 2));
    }

    #[test]
    fn results_do_not_depend_on_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["ATSAMZ3", "ATSAMA1", "ATSAMM2", "ATSAMB9", "ATSAMC0"];
        let mut bad = units(dir.path(), &names);
        let broken = dir.path().join("BROKEN.atdf");
        std::fs::write(&broken, "<avr-tools-device-file>").unwrap();
        bad.push(DocumentUnit { family: "SAMT".to_string(), path: broken });

        let one = run(bad.clone(), 1);
        let many = run(bad, 8);

        let summary = |r: &[ParsedUnit]| r.iter()
            .map(|p| (p.label(), p.result.is_ok()))
            .collect::<Vec<_>>();
        assert_eq!(summary(&one), summary(&many));
        assert_eq!(summary(&one), [
            ("BROKEN".to_string(), false),
            ("SAMA1".to_string(), true),
            ("SAMB9".to_string(), true),
            ("SAMC0".to_string(), true),
            ("SAMM2".to_string(), true),
            ("SAMZ3".to_string(), true),
        ]);

        for (a, b) in one.iter().zip(&many) {
            assert_eq!(a.result, b.result);
        }
    }

    #[test]
    fn failures_are_isolated() {
        let units = (0..20)
            .map(|i| DocumentUnit { family: "F".to_string(), path: PathBuf::from(format!("{:02}.atdf", i)) })
            .collect::<Vec<_>>();

        let results = run_with(units, 4, |unit| {
            if unit.path.to_string_lossy().starts_with('1') {
                Err(ParseError::Xml("boom".to_string()))
            } else {
                parser::parse_document(SAMPLE.as_bytes(), None)
            }
        });

        assert_eq!(results.len(), 20);
        assert_eq!(results.iter().filter(|r| r.result.is_err()).count(), 10);
        // Successful units all carry the same device name, so the path breaks the tie
        let ok_paths = results.iter()
            .filter(|r| r.result.is_ok())
            .map(|r| r.unit.path.clone())
            .collect::<Vec<_>>();
        let mut sorted = ok_paths.clone();
        sorted.sort();
        assert_eq!(ok_paths, sorted);
    }
}
