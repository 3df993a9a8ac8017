// SPDX-License-Identifier: GPL-3.0-or-later

//! Clang configuration files. A `--config` file is a list of options, one per line, in which
//! `<CFGDIR>` expands to the directory holding the file.

use std::path::Path;

use super::templates::{self, fill};
use super::{ArtifactKind, GenError, GenOptions};
use crate::device::{Device, Fpu};
use crate::util::is_c_identifier;

/// Target options derived from the core and its FPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFlags {
    pub march: String,
    pub fpu: &'static str,
    pub float_abi: &'static str,
    pub cmse: bool,
}

fn fpu_name(fpu: Fpu) -> &'static str {
    match fpu {
        Fpu::None => "none",
        Fpu::Single => "single precision",
        Fpu::Double => "double precision",
    }
}

pub fn target_flags(device: &Device) -> Result<TargetFlags, GenError> {
    let arch = device.core.arch().ok_or_else(|| GenError::UnsupportedCore {
        cpu: device.cpu.clone(),
        generator: "compiler config",
    })?;
    let fpu = device.features.fpu;
    let unsupported = || GenError::UnsupportedFpu { arch, fpu: fpu_name(fpu) };

    let mfpu = match (arch, fpu) {
        (_, Fpu::None) => "none",
        ("armv7em", Fpu::Single) => "fpv4-sp-d16",
        ("armv7em", Fpu::Double) => "fpv5-d16",
        ("armv8m.main", Fpu::Single) => "fpv5-sp-d16",
        ("armv8.1m.main", Fpu::Double) => "fp-armv8-fullfp16-d16",
        ("armv7-a", _) => "vfpv4-d16",
        _ => return Err(unsupported()),
    };

    // M-profile Vector Extension, present on every Armv8.1-M core we know of
    let mve = match (arch, fpu) {
        ("armv8.1m.main", Fpu::Double) => "+mve.fp+fp.dp",
        ("armv8.1m.main", Fpu::Single) => "+mve.fp",
        ("armv8.1m.main", Fpu::None) => "+mve",
        _ => "",
    };

    let float_abi = if fpu == Fpu::None && mve.is_empty() { "soft" } else { "hard" };

    Ok(TargetFlags {
        march: format!("{}{}", arch, mve),
        fpu: mfpu,
        float_abi,
        cmse: device.core.has_cmse(),
    })
}

/// Macros identifying the device, on top of those in the device header.
pub fn device_macros(device: &Device, flags: &TargetFlags) -> Vec<String> {
    let mut macros: Vec<String> = vec![];
    let mut push = |m: String| {
        if !macros.contains(&m) {
            macros.push(m);
        }
    };

    for name in [&device.name, &device.series, &device.family] {
        if is_c_identifier(name) {
            push(format!("-D__{}__", name));
            push(format!("-D__{}", name));
        }
    }
    if device.name.starts_with("SAM") {
        push(format!("-D__AT{}__", device.name));
    }

    let features = &device.features;
    if features.icache || features.dcache {
        push("-D__MCU_HAS_L1CACHE".to_string());
    }
    if features.fpu != Fpu::None {
        push("-D__MCU_HAS_FPU".to_string());
    }
    if features.fpu == Fpu::Double {
        push("-D__MCU_HAS_FPU64".to_string());
    }
    if features.mpu {
        push("-D__MCU_HAS_MPU".to_string());
    }
    if features.mmu {
        push("-D__MCU_HAS_MMU".to_string());
    }
    if features.trustzone {
        push("-D__MCU_HAS_TRUSTZONE".to_string());
    }

    push(format!("-D__MCU_DEVICE_NAME=\"{}\"", device.name));
    if let Some(pins) = device.pin_count {
        push(format!("-D__MCU_PIN_COUNT={}", pins));
    }
    push(format!("-D__MCU_CPU_NAME=\"{}\"", device.core.cpu_name()));
    push(format!("-D__MCU_FPU_NAME=\"{}\"", flags.fpu));
    push(format!("-D__MCU_ARCH=\"{}\"", flags.march));

    macros
}

fn cfgdir_path(path: &Path) -> String {
    format!("<CFGDIR>/../{}", path.to_string_lossy())
}

pub fn generate(device: &Device, opts: &GenOptions) -> Result<String, GenError> {
    let flags = target_flags(device)?;
    let script = ArtifactKind::LinkerScript.relative_path(&device.name);
    let sysroot = if device.core.is_cortex_m() { "cortex-m" } else { "cortex-a" };

    let mut out = opts.hash_banner();
    out.push_str(&format!("\n# Clang configuration for {}. Use it with --config.\n", device.name));
    out.push_str("\n-target arm-none-eabi\n");
    out.push_str(&format!("-march={}\n", flags.march));
    out.push_str(&format!("-mfpu={}\n", flags.fpu));
    out.push_str(&format!("-mfloat-abi={}\n", flags.float_abi));
    if flags.cmse {
        out.push_str("-mcmse\n");
    }

    out.push_str(&fill(templates::CONFIG_COMMON, &[("SYSROOT", sysroot)]));

    out.push_str("\n# Device startup code and default linker script.\n");
    if let Some(dir) = script.parent() {
        out.push_str(&format!("-L {}\n", cfgdir_path(dir)));
    }
    out.push_str(&format!("-Wl,--default-script={}\n", cfgdir_path(&script)));

    out.push_str("\n# Device macros.\n");
    for m in device_macros(device, &flags) {
        out.push_str(&m);
        out.push('\n');
    }

    if !opts.macros.is_empty() {
        out.push_str("\n# User macros.\n");
        for m in &opts.macros {
            out.push_str(&format!("{}\n", m));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fixtures::device;
    use crate::device::CoreArch;
    use crate::generate::MacroDefinition;
    use crate::parser::tests::sample;

    fn with_core(core: CoreArch, fpu: Fpu) -> Device {
        let mut dev = device();
        dev.core = core;
        dev.cpu = core.cpu_name().to_string();
        dev.features.fpu = fpu;
        dev
    }

    #[test]
    fn sample_config() {
        let opts = GenOptions {
            macros: vec!["NDEBUG".parse().unwrap(), "BOARD=3".parse::<MacroDefinition>().unwrap()],
            ..Default::default()
        };
        let cfg = generate(&sample(), &opts).unwrap();
        let lines = cfg.lines().collect::<Vec<_>>();

        for expected in [
            "-target arm-none-eabi",
            "-march=armv7em",
            "-mfpu=fpv4-sp-d16",
            "-mfloat-abi=hard",
            "--sysroot=<CFGDIR>/../cortex-m",
            "-L <CFGDIR>/../lib/proc/samtest1a",
            "-Wl,--default-script=<CFGDIR>/../lib/proc/samtest1a/default.ld",
            "-D__SAMTEST1A__",
            "-D__ATSAMTEST1A__",
            "-D__SAMT1__",
            "-D__SAMT",
            "-D__MCU_HAS_FPU",
            "-D__MCU_DEVICE_NAME=\"SAMTEST1A\"",
            "-D__MCU_PIN_COUNT=48",
            "-D__MCU_CPU_NAME=\"cortex-m4\"",
        ] {
            assert!(lines.contains(&expected), "missing {}", expected);
        }
        assert!(!lines.contains(&"-mcmse"));
        assert_eq!(&lines[lines.len() - 2..], ["-DNDEBUG", "-DBOARD=3"]);
    }

    #[test]
    fn fpu_and_architecture_flags() {
        let flags = |core, fpu| target_flags(&with_core(core, fpu));

        let f = flags(CoreArch::CortexM0Plus, Fpu::None).unwrap();
        assert_eq!((f.march.as_str(), f.fpu, f.float_abi, f.cmse), ("armv6m", "none", "soft", false));

        let f = flags(CoreArch::CortexM7, Fpu::Double).unwrap();
        assert_eq!((f.march.as_str(), f.fpu), ("armv7em", "fpv5-d16"));

        let f = flags(CoreArch::CortexM33, Fpu::Single).unwrap();
        assert_eq!((f.march.as_str(), f.fpu, f.cmse), ("armv8m.main", "fpv5-sp-d16", true));

        let f = flags(CoreArch::CortexM23, Fpu::None).unwrap();
        assert_eq!((f.march.as_str(), f.float_abi, f.cmse), ("armv8m.base", "soft", true));

        let f = flags(CoreArch::CortexM55, Fpu::Double).unwrap();
        assert_eq!((f.march.as_str(), f.fpu, f.float_abi), ("armv8.1m.main+mve.fp+fp.dp", "fp-armv8-fullfp16-d16", "hard"));

        // Integer-only MVE still passes vectors in FP registers
        let f = flags(CoreArch::CortexM55, Fpu::None).unwrap();
        assert_eq!((f.march.as_str(), f.fpu, f.float_abi), ("armv8.1m.main+mve", "none", "hard"));

        let f = flags(CoreArch::CortexA5, Fpu::Double).unwrap();
        assert_eq!((f.march.as_str(), f.fpu), ("armv7-a", "vfpv4-d16"));
    }

    #[test]
    fn impossible_fpus_are_errors() {
        let err = |core, fpu| target_flags(&with_core(core, fpu)).unwrap_err();
        assert_eq!(err(CoreArch::CortexM0, Fpu::Single), GenError::UnsupportedFpu { arch: "armv6m", fpu: "single precision" });
        assert_eq!(err(CoreArch::CortexM33, Fpu::Double), GenError::UnsupportedFpu { arch: "armv8m.main", fpu: "double precision" });
        assert_eq!(err(CoreArch::CortexM55, Fpu::Single), GenError::UnsupportedFpu { arch: "armv8.1m.main", fpu: "single precision" });
        assert!(matches!(err(CoreArch::Unsupported, Fpu::None), GenError::UnsupportedCore { .. }));
    }

    #[test]
    fn legacy_cores_use_their_own_sysroot() {
        let cfg = generate(&with_core(CoreArch::Arm926EjS, Fpu::None), &GenOptions::default()).unwrap();
        assert!(cfg.contains("\n--sysroot=<CFGDIR>/../cortex-a\n"));
        assert!(cfg.contains("\n-march=armv5te\n-mfpu=none\n-mfloat-abi=soft\n"));
        assert!(!cfg.contains("User macros"));
    }

    #[test]
    fn unusable_family_names_are_left_out() {
        let mut dev = device();
        dev.family = "SAM D".to_string();
        dev.series = dev.name.clone();
        let flags = target_flags(&dev).unwrap();
        let macros = device_macros(&dev, &flags);
        assert_eq!(macros.iter().filter(|m| *m == "-D__TEST1__").count(), 1);
        assert!(!macros.iter().any(|m| m.contains("SAM D")));
    }
}
