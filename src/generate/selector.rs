// SPDX-License-Identifier: GPL-3.0-or-later

//! `devices.h`, which includes the right device header for whichever `__<DEVICE>__` macro the
//! compiler config defined.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{ArtifactKind, GenOptions};
use crate::device::Device;
use crate::util::is_c_identifier;

/// Location relative to the output subdirectory.
pub fn relative_path() -> PathBuf {
    PathBuf::from("include/devices.h")
}

fn include_line(device: &Device, indent: &str) -> String {
    let header = ArtifactKind::Header.relative_path(&device.name);
    let header = header.strip_prefix("include").unwrap_or(header.as_path());
    format!("#{}include \"{}\"\n", indent, header.to_string_lossy())
}

/// Devices are grouped by family; devices without a usable family name are tested on their own.
pub fn generate<'d>(devices: impl IntoIterator<Item = &'d Device>, opts: &GenOptions) -> String {
    let mut families: BTreeMap<&str, Vec<&Device>> = BTreeMap::new();
    let mut loose = vec![];
    for device in devices {
        if is_c_identifier(&device.family) {
            families.entry(device.family.as_str()).or_default().push(device);
        } else {
            loose.push(device);
        }
    }

    let mut out = opts.c_banner();
    out.push_str("\n#ifndef DEVICES_H_\n#define DEVICES_H_\n\n");

    let mut keyword = "if";
    for (family, devices) in &families {
        out.push_str(&format!("#{} defined(__{}__)\n", keyword, family));
        keyword = "elif";

        let mut inner = "if";
        for device in devices {
            out.push_str(&format!("#  {} defined(__{}__)\n", inner, device.name));
            out.push_str(&include_line(device, "    "));
            inner = "elif";
        }
        out.push_str("#  else\n");
        out.push_str(&format!("#    error Unknown device for the {} family!\n", family));
        out.push_str("#  endif\n");
    }

    for device in &loose {
        out.push_str(&format!("#{} defined(__{}__)\n", keyword, device.name));
        out.push_str(&include_line(device, "  "));
        keyword = "elif";
    }

    if keyword == "if" {
        out.push_str("#error No devices were generated!\n");
    } else {
        out.push_str("#else\n#  error Unknown device or family!\n#endif\n");
    }
    out.push_str("\n#endif /* DEVICES_H_ */\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fixtures::device;

    fn named(name: &str, family: &str) -> Device {
        Device { name: name.to_string(), family: family.to_string(), ..device() }
    }

    #[test]
    fn groups_devices_by_family() {
        let devices = [named("SAME54P20A", "SAME"), named("SAME51J19A", "SAME"), named("SAMD21G18A", "SAMD"), named("ODD1", "")];
        let h = generate(&devices, &GenOptions::default());
        let body = &h[h.find("#define DEVICES_H_").unwrap()..];

        let expected = "\
#define DEVICES_H_

#if defined(__SAMD__)
#  if defined(__SAMD21G18A__)
#    include \"proc/samd21g18a.h\"
#  else
#    error Unknown device for the SAMD family!
#  endif
#elif defined(__SAME__)
#  if defined(__SAME54P20A__)
#    include \"proc/same54p20a.h\"
#  elif defined(__SAME51J19A__)
#    include \"proc/same51j19a.h\"
#  else
#    error Unknown device for the SAME family!
#  endif
#elif defined(__ODD1__)
#  include \"proc/odd1.h\"
#else
#  error Unknown device or family!
#endif

#endif /* DEVICES_H_ */
";
        assert_eq!(body, expected);
    }

    #[test]
    fn empty_device_list() {
        let h = generate(std::iter::empty::<&Device>(), &GenOptions::default());
        assert!(h.contains("#error No devices were generated!\n"));
    }
}
