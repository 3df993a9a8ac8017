// SPDX-License-Identifier: GPL-3.0-or-later

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use regex::Regex;

use crate::version::Version;

pub const DOCUMENT_EXTENSION: &str = "atdf";

lazy_static::lazy_static! {
    // "3.8.234", "1.0.0-rc1", "2"
    static ref VERSION_DIR: Regex = Regex::new(r"^[0-9]+(?:[.\-_+][0-9A-Za-z]+)*$").unwrap();
}

#[derive(Debug, Clone)]
pub struct VersionCandidate {
    pub version: Version,
    pub path: PathBuf,
    pub documents: Vec<PathBuf>,
}

impl VersionCandidate {
    // Highest release first, then the textually later spelling and directory
    fn precedence(&self, other: &Self) -> Ordering {
        self.version.release_cmp(&other.version)
            .then_with(|| self.version.as_str().cmp(other.version.as_str()))
            .then_with(|| self.path.cmp(&other.path))
    }
}

#[derive(Debug, Clone)]
pub struct DeviceFamily {
    pub id: String,
    pub candidates: Vec<VersionCandidate>,
    selected: usize,
}

impl DeviceFamily {
    fn resolve(id: String, candidates: Vec<VersionCandidate>) -> Option<Self> {
        let selected = candidates.iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.precedence(b))
            .map(|(i, _)| i)?;
        Some(Self { id, candidates, selected })
    }

    pub fn selected(&self) -> &VersionCandidate {
        &self.candidates[self.selected]
    }
}

/// One description document waiting to be parsed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentUnit {
    pub family: String,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct Discovery {
    /// Sorted by family id.
    pub families: Vec<DeviceFamily>,
    pub warnings: Vec<String>,
}

impl Discovery {
    pub fn units(&self) -> Vec<DocumentUnit> {
        self.families.iter()
            .flat_map(|f| f.selected().documents.iter().map(move |path| DocumentUnit {
                family: f.id.clone(),
                path: path.clone(),
            }))
            .collect()
    }
}

#[derive(Default)]
struct Walker {
    candidates: BTreeMap<String, Vec<VersionCandidate>>,
    warnings: Vec<String>,
}

impl Walker {
    fn sorted_entries(&mut self, dir: &Path) -> Vec<fs::DirEntry> {
        match fs::read_dir(dir) {
            Ok(entries) => {
                let mut entries = entries.filter_map(|e| e.ok()).collect::<Vec<_>>();
                entries.sort_by_key(|e| e.file_name());
                entries
            }
            Err(e) => {
                self.warnings.push(format!("Cannot read directory {}: {}", dir.display(), e));
                vec![]
            }
        }
    }

    fn subdirs(&mut self, dir: &Path) -> Vec<PathBuf> {
        // file_type() does not follow symlinks, which keeps us out of link cycles
        self.sorted_entries(dir).into_iter()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect()
    }

    fn collect_documents(&mut self, dir: &Path, out: &mut Vec<PathBuf>) {
        for entry in self.sorted_entries(dir) {
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(_) => continue,
            };
            let path = entry.path();
            if file_type.is_dir() {
                self.collect_documents(&path, out);
            } else if file_type.is_file() && is_description_document(&path) {
                out.push(path);
            }
        }
    }

    fn walk(&mut self, dir: &Path) {
        let (version_dirs, other_dirs): (Vec<_>, Vec<_>) = self.subdirs(dir).into_iter()
            .partition(|d| dir_name(d).map(|n| VERSION_DIR.is_match(&n)).unwrap_or(false));

        if !version_dirs.is_empty() {
            let family = match dir_name(dir) {
                Some(name) => name,
                None => {
                    self.warnings.push(format!("Cannot name family at {}", dir.display()));
                    return;
                }
            };

            let family_candidates = self.candidates.entry(family.clone()).or_default().len();
            let mut found = vec![];

            for vdir in version_dirs {
                let mut documents = vec![];
                self.collect_documents(&vdir, &mut documents);
                let version = Version::parse(&dir_name(&vdir).unwrap_or_default());

                if documents.is_empty() {
                    debug!("family={} version={} has no .{} documents", family, version, DOCUMENT_EXTENSION);
                    continue;
                }
                found.push(VersionCandidate { version, path: vdir, documents });
            }

            trace!("family={} candidates={} (previously {})", family, found.len(), family_candidates);
            self.candidates.entry(family).or_default().extend(found);
        }

        for sub in other_dirs {
            self.walk(&sub);
        }
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

pub fn is_description_document(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(DOCUMENT_EXTENSION))
        .unwrap_or(false)
}

/// Finds every versioned family under the given roots and selects the highest version of each.
pub fn locate(roots: &[PathBuf]) -> Discovery {
    let mut walker = Walker::default();

    for root in roots {
        if !root.is_dir() {
            walker.warnings.push(format!("Packs directory {} does not exist", root.display()));
            continue;
        }
        walker.walk(root);
    }

    let Walker { candidates, mut warnings } = walker;
    let mut families = vec![];

    // BTreeMap iteration keeps families sorted by id
    for (id, candidates) in candidates {
        match DeviceFamily::resolve(id.clone(), candidates) {
            Some(family) => {
                info!("Found family={} version={} documents={}",
                    family.id, family.selected().version, family.selected().documents.len());
                families.push(family);
            }
            None => {
                warnings.push(format!("Family {} has no valid version directory, skipped", id));
            }
        }
    }

    for w in &warnings {
        warn!("{}", w);
    }

    Discovery { families, warnings }
}
