// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration fuses. Unlike other peripherals their values are part of the firmware image, so
//! each fuse register gets its own constant, output section and linker region.

use crate::device::{Device, GroupMember, Module, RegisterWidth};

pub const FUSES_MODULE: &str = "FUSES";

/// One fuse register word at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseCell {
    /// Lowercase region name, like `user_fuses_user_word0`.
    pub name: String,
    /// The C constant, like `FUSES_USER_FUSES_USER_WORD0`.
    pub symbol: String,
    pub address: u64,
    pub width: RegisterWidth,
}

impl FuseCell {
    pub fn section(&self) -> String {
        format!(".{}", self.name)
    }
}

pub fn fuses_module(device: &Device) -> Option<&Module> {
    device.modules.iter().find(|m| m.name == FUSES_MODULE)
}

/// Every fuse register of every FUSES instance, in declared order. Register arrays give one cell
/// per element.
pub fn cells(device: &Device) -> Vec<FuseCell> {
    let mut cells = vec![];
    for p in device.peripherals.iter().filter(|p| p.module == FUSES_MODULE) {
        for gi in &p.groups {
            for member in &gi.layout.members {
                let reg = match member {
                    GroupMember::Register(reg) => reg,
                    GroupMember::Subgroup(_) => continue,
                };
                let base = format!("{}_{}", gi.name, reg.name);
                let address = gi.base_address + reg.offset;

                let mut push = |suffix: String, address: u64| {
                    let name = format!("{}{}", base, suffix);
                    let upper = name.to_ascii_uppercase();
                    cells.push(FuseCell {
                        symbol: if upper.starts_with("FUSES_") { upper } else { format!("FUSES_{}", upper) },
                        name: name.to_ascii_lowercase(),
                        address,
                        width: reg.width,
                    });
                };

                match reg.count {
                    1 => push(String::new(), address),
                    n => {
                        for i in 0..n {
                            push(i.to_string(), address + i * reg.width.bytes());
                        }
                    }
                }
            }
        }
    }
    cells
}
