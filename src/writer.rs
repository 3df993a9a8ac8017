// SPDX-License-Identifier: GPL-3.0-or-later

//! The only part of the program that writes generated content to disk.

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

use crate::generate::{templates, Artifact, OUTPUT_SUBDIR};

const STAGING_SUFFIX: &str = "partial";

pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self { root: output_dir.as_ref().join(OUTPUT_SUBDIR) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}", STAGING_SUFFIX));
        path.with_file_name(name)
    }

    fn stage(&self, artifact: &Artifact) -> Result<(PathBuf, PathBuf)> {
        let dest = self.root.join(&artifact.path);
        let staged = Self::staging_path(&dest);
        if let Some(dir) = dest.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        fs::write(&staged, &artifact.contents)
            .with_context(|| format!("Failed to write {}", staged.display()))?;
        Ok((staged, dest))
    }

    /// Writes a device's artifacts. Everything is staged next to its destination first and only
    /// moved into place once all of it was written, so a failure leaves none of the new files.
    pub fn write_device(&self, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
        let mut staged = vec![];
        for artifact in artifacts {
            match self.stage(artifact) {
                Ok(pair) => staged.push(pair),
                Err(e) => {
                    discard(&staged);
                    return Err(e);
                }
            }
        }

        let mut written: Vec<PathBuf> = vec![];
        for (i, (tmp, dest)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, dest) {
                discard(&staged[i..]);
                for path in &written {
                    if let Err(e) = fs::remove_file(path) {
                        warn!("Could not remove partially written {}: {}", path.display(), e);
                    }
                }
                return Err(e).with_context(|| format!("Failed to move {} into place", dest.display()));
            }
            written.push(dest.clone());
        }

        Ok(written)
    }

    /// Writes one file outside of any device's artifact set.
    pub fn write_file(&self, relative: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let path = self.root.join(relative);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn write_license(&self) -> Result<PathBuf> {
        self.write_file("LICENSE", templates::LICENSE)
    }
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if let Err(e) = fs::remove_file(tmp) {
            trace!("Could not remove {}: {}", tmp.display(), e);
        }
    }
}
