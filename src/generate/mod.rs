// SPDX-License-Identifier: GPL-3.0-or-later

//! Turns a parsed device into the files a generic Clang toolchain needs to target it. Every
//! generator is a pure function of the device and the run's `GenOptions`.

pub mod compiler_config;
pub mod fuses;
pub mod header;
pub mod linker;
pub mod selector;
pub mod startup;
pub(crate) mod templates;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::device::{CoreArch, Device};
use crate::util::{is_c_identifier, is_c_safe_value};

/// Directory created under the output root.
pub const OUTPUT_SUBDIR: &str = "mcu-device-files";

pub const DEFAULT_STACK_SIZE: u64 = 0x400;
pub const DEFAULT_HEAP_SIZE: u64 = 0xC00;
pub const DEFAULT_STACK_GUARD_SIZE: u64 = 0x20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenError {
    #[error("regions {first} and {second} overlap with different access attributes")]
    OverlappingRegions { first: String, second: String },
    #[error("no usable {0} region")]
    MissingRegion(&'static str),
    #[error("symbol {symbol} would be emitted twice")]
    SymbolCollision { symbol: String },
    #[error("core {cpu} is not supported by the {generator} generator")]
    UnsupportedCore { cpu: String, generator: &'static str },
    #[error("{fpu} FPU is not supported on {arch}")]
    UnsupportedFpu { arch: &'static str, fpu: &'static str },
}

/// A `-D` style definition: `NAME` or `NAME=VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    pub value: Option<String>,
}

impl FromStr for MacroDefinition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (s, None),
        };

        if !is_c_identifier(name) {
            return Err(format!("`{}` is not a valid macro name", name));
        }
        if let Some(value) = value {
            if !is_c_safe_value(value) || value.contains(char::is_whitespace) {
                return Err(format!("`{}` is not a valid value for macro {}", value, name));
            }
        }

        Ok(Self { name: name.to_string(), value: value.map(str::to_string) })
    }
}

impl fmt::Display for MacroDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "-D{}={}", self.name, value),
            None => write!(f, "-D{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenOptions {
    pub macros: Vec<MacroDefinition>,
    /// Extra lines placed in every banner, above the license notice.
    pub copyright: Vec<String>,
    pub stack_size: u64,
    pub heap_size: u64,
    pub stack_guard_size: u64,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            macros: vec![],
            copyright: vec![],
            stack_size: DEFAULT_STACK_SIZE,
            heap_size: DEFAULT_HEAP_SIZE,
            stack_guard_size: DEFAULT_STACK_GUARD_SIZE,
        }
    }
}

impl GenOptions {
    /// File banner as a C block comment.
    pub fn c_banner(&self) -> String {
        let mut out = String::from("/*\n");
        for line in self.banner_lines() {
            if line.is_empty() {
                out.push_str(" *\n");
            } else {
                out.push_str(&format!(" * {}\n", line));
            }
        }
        out.push_str(" */\n");
        out
    }

    /// File banner as `#` comment lines, for the compiler config.
    pub fn hash_banner(&self) -> String {
        self.banner_lines()
            .map(|line| if line.is_empty() { "#\n".to_string() } else { format!("# {}\n", line) })
            .collect()
    }

    fn banner_lines(&self) -> impl Iterator<Item = String> + '_ {
        let copyright = self.copyright.iter().map(|l| crate::util::comment_text(l));
        std::iter::once(templates::GENERATED_BY.to_string())
            .chain(std::iter::once(String::new()))
            .chain(copyright.clone())
            .chain(copyright.take(1).map(|_| String::new()))
            .chain(templates::APACHE_NOTICE.iter().map(|l| l.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    LinkerScript,
    Header,
    /// Only for devices with configuration fuses.
    FusesHeader,
    Startup,
    CompilerConfig,
}

impl ArtifactKind {
    /// Location relative to `OUTPUT_SUBDIR`.
    pub fn relative_path(self, device: &str) -> PathBuf {
        let dev = device.to_ascii_lowercase();
        match self {
            Self::LinkerScript => PathBuf::from(format!("lib/proc/{}/default.ld", dev)),
            Self::Header => PathBuf::from(format!("include/proc/{}.h", dev)),
            Self::FusesHeader => PathBuf::from(format!("include/proc/fuses/{}.h", dev)),
            Self::Startup => PathBuf::from(format!("lib/proc/{}/startup.c", dev)),
            Self::CompilerConfig => PathBuf::from(format!("config/{}.cfg", dev)),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::LinkerScript => "linker script",
            Self::Header => "header",
            Self::FusesHeader => "fuses header",
            Self::Startup => "startup code",
            Self::CompilerConfig => "compiler config",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub contents: String,
}

/// The complete artifact set of one device, or the first generator failure.
pub fn generate_device(device: &Device, opts: &GenOptions) -> Result<Vec<Artifact>, GenError> {
    if device.core == CoreArch::Unsupported {
        return Err(GenError::UnsupportedCore { cpu: device.cpu.clone(), generator: "device" });
    }

    let (header, fuses) = header::generate_with_fuses(device, opts)?;
    let mut contents = vec![
        (ArtifactKind::LinkerScript, linker::generate(device, opts)?),
        (ArtifactKind::Header, header),
    ];
    if let Some(fuses) = fuses {
        contents.push((ArtifactKind::FusesHeader, fuses));
    }
    contents.push((ArtifactKind::Startup, startup::generate(device, opts)?));
    contents.push((ArtifactKind::CompilerConfig, compiler_config::generate(device, opts)?));

    Ok(contents.into_iter()
        .map(|(kind, contents)| {
            trace!("{}: generated {} ({} bytes)", device.name, kind, contents.len());
            Artifact { kind, path: kind.relative_path(&device.name), contents }
        })
        .collect())
}

/// Emitted-name bookkeeping shared by the generators. Inserting a name twice is an error, which
/// is how distinct model entities are kept from collapsing onto one symbol.
#[derive(Default)]
pub(crate) struct Symbols {
    seen: std::collections::HashSet<String>,
}

impl Symbols {
    pub fn claim(&mut self, symbol: impl Into<String>) -> Result<(), GenError> {
        let symbol = symbol.into();
        if self.seen.contains(&symbol) {
            return Err(GenError::SymbolCollision { symbol });
        }
        self.seen.insert(symbol);
        Ok(())
    }
}
