// SPDX-License-Identifier: GPL-3.0-or-later

mod config;
mod device;
mod generate;
mod locator;
mod parser;
mod pipeline;
mod report;
mod scheduler;
mod util;
mod version;
mod writer;

use std::io::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use clap::Parser;
use clap::AppSettings;
use anyhow::{bail, Result};
use env_logger::fmt::Color;
use log::LevelFilter;

use config::Config;
use generate::MacroDefinition;
use pipeline::RunSettings;

#[macro_use]
extern crate log;

lazy_static::lazy_static! {
    static ref START: Instant = Instant::now();
}

fn jobs_in_range(s: &str) -> Result<usize, String> {
    clap_num::number_range(s, 0, 1024)
}

/// Generate linker scripts, device headers, startup code and Clang configuration files from
/// ATDF device packs
#[derive(Parser, Debug)]
#[clap(
    version,
    global_setting(AppSettings::DeriveDisplayOrder)
)]
pub struct Args {
    /// Directories holding <family>/<version>/<device>.atdf packs
    #[clap(value_name = "PACKS_DIR", required = true, parse(from_os_str))]
    packs: Vec<PathBuf>,

    /// Where to create the mcu-device-files directory
    #[clap(long, alias = "output_dir", default_value = ".", parse(from_os_str))]
    output_dir: PathBuf,

    /// Macro to add to every compiler config, as NAME or NAME=VALUE. Can be repeated
    #[clap(short = 'D', long, value_name = "NAME[=VALUE]")]
    define_macro: Vec<MacroDefinition>,

    /// Parallel parse jobs. 0 uses every hardware thread
    #[clap(long, default_value = "0", parse(try_from_str = jobs_in_range))]
    parse_jobs: usize,

    /// YAML run configuration
    #[clap(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Verbosity. Can be repeated
    #[clap(short, long, parse(from_occurrences))]
    verbose: u8,
}

fn init_logging(level: u8) {
    let lf = match level {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    lazy_static::initialize(&START);

    env_logger::Builder::new()
        .filter_level(lf)
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            let mut style = buf.style();
            let level = match record.level() {
                log::Level::Error => style.set_color(Color::Red).set_intense(true).value("ERROR"),
                log::Level::Warn =>  style.set_color(Color::Yellow).set_intense(true).value("WARN "),
                log::Level::Info =>  style.set_color(Color::Green).set_intense(true).value("INFO "),
                log::Level::Debug => style.set_color(Color::Cyan).set_intense(true).value("DEBUG"),
                log::Level::Trace => style.set_color(Color::Blue).set_intense(true).value("TRACE"),
            };

            let elapsed = START.elapsed().as_secs_f64();
            writeln!(buf, "[{:9.3}s] {} {}", elapsed, level, record.args())
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let settings = RunSettings {
        packs: args.packs,
        output_dir: args.output_dir,
        parse_jobs: args.parse_jobs,
        options: config.into_options(args.define_macro)?,
    };

    let report = pipeline::run(&settings);
    report.log();

    if report.produced.is_empty() {
        bail!("No device files were produced");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_jobs_is_range_checked() {
        let args = Args::try_parse_from(["mcu-device-files", "packs", "--parse-jobs", "4"]).unwrap();
        assert_eq!(args.parse_jobs, 4);
        assert_eq!(args.packs, [PathBuf::from("packs")]);

        let args = Args::try_parse_from(["mcu-device-files", "packs"]).unwrap();
        assert_eq!(args.parse_jobs, 0);

        assert!(Args::try_parse_from(["mcu-device-files", "packs", "--parse-jobs", "2000"]).is_err());
        assert!(Args::try_parse_from(["mcu-device-files", "packs", "--parse-jobs", "many"]).is_err());
    }

    #[test]
    fn defines_are_repeatable() {
        let args = Args::try_parse_from(["mcu-device-files", "packs", "-D", "FOO", "-D", "BAR=1", "-vv"]).unwrap();
        assert_eq!(args.define_macro.len(), 2);
        assert_eq!(args.verbose, 2);
    }
}
