// SPDX-License-Identifier: GPL-3.0-or-later

use super::fuses;
use super::templates::{self, fill};
use super::{GenError, GenOptions, Symbols};
use crate::device::{Device, MemorySegment, SegmentAccess, SegmentKind};

/// One MEMORY entry: a run of adjacent segments of the same kind and access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub start: u64,
    pub size: u64,
    pub kind: SegmentKind,
    pub access: SegmentAccess,
    pub external: bool,
    pub segments: Vec<String>,
}

impl Region {
    fn new(seg: &MemorySegment) -> Self {
        Self {
            name: seg.name.to_ascii_lowercase(),
            start: seg.start,
            size: seg.size,
            kind: seg.kind,
            access: seg.access,
            external: seg.external,
            segments: vec![seg.name.clone()],
        }
    }

    fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    fn extends_with(&self, seg: &MemorySegment) -> bool {
        self.kind == seg.kind
            && self.access == seg.access
            && self.external == seg.external
            && self.end() == seg.start
    }
}

/// Flash and RAM regions in declared order, with adjacent compatible segments merged.
pub fn regions(device: &Device) -> Result<Vec<Region>, GenError> {
    let mut regions: Vec<Region> = vec![];
    let candidates = device.segments.iter()
        .filter(|s| matches!(s.kind, SegmentKind::Flash | SegmentKind::Ram))
        .filter(|s| s.size > 0 && !device.is_sub_region(&s.name));

    for seg in candidates {
        match regions.last_mut() {
            Some(r) if r.extends_with(seg) => {
                r.size += seg.size;
                r.segments.push(seg.name.clone());
            }
            _ => regions.push(Region::new(seg)),
        }
    }

    for (i, a) in regions.iter().enumerate() {
        for b in &regions[i + 1..] {
            if a.start < b.end() && b.start < a.end() {
                return Err(GenError::OverlappingRegions { first: a.name.clone(), second: b.name.clone() });
            }
        }
    }

    let mut symbols = Symbols::default();
    for r in &regions {
        symbols.claim(r.name.as_str())?;
    }

    Ok(regions)
}

fn largest(regions: &[Region], kind: SegmentKind, external: bool) -> Option<&Region> {
    regions.iter()
        .filter(|r| r.kind == kind && r.external == external)
        .fold(None, |best: Option<&Region>, r| match best {
            Some(b) if b.size >= r.size => Some(b),
            _ => Some(r),
        })
}

/// Where code goes: internal flash, else external flash, else RAM.
fn program_region(regions: &[Region]) -> Option<&Region> {
    largest(regions, SegmentKind::Flash, false)
        .or_else(|| largest(regions, SegmentKind::Flash, true))
        .or_else(|| largest(regions, SegmentKind::Ram, false))
}

fn hex(n: u64) -> String {
    format!("0x{:08X}", n)
}

pub fn generate(device: &Device, opts: &GenOptions) -> Result<String, GenError> {
    let regions = regions(device)?;
    let ram = largest(&regions, SegmentKind::Ram, false).ok_or(GenError::MissingRegion("RAM"))?;
    let flash = program_region(&regions).ok_or(GenError::MissingRegion("program"))?;

    let mut out = opts.c_banner();
    out.push_str(&format!("\n/* Linker script for {}. */\n", device.name));
    out.push_str(&fill(templates::LINKER_SYMBOLS, &[
        ("ROM_BASE", &hex(flash.start)),
        ("ROM_SIZE", &hex(flash.size)),
        ("RAM_BASE", &hex(ram.start)),
        ("RAM_SIZE", &hex(ram.size)),
        ("STACK_SIZE", &hex(opts.stack_size)),
        ("HEAP_SIZE", &hex(opts.heap_size)),
        ("GUARD_SIZE", &hex(opts.stack_guard_size)),
    ]));

    let fuse_cells = fuses::cells(device);
    let mut symbols = Symbols::default();
    for name in regions.iter().map(|r| &r.name).chain(fuse_cells.iter().map(|c| &c.name)) {
        symbols.claim(name.as_str())?;
    }

    out.push_str("\nMEMORY\n{\n");
    for r in &regions {
        out.push_str(&format!(
            "    {:<16} ({}) : ORIGIN = {}, LENGTH = {}\n",
            r.name, r.access.attributes(), hex(r.start), hex(r.size),
        ));
    }
    for cell in &fuse_cells {
        out.push_str(&format!(
            "    {:<16} (r) : ORIGIN = {}, LENGTH = 0x{:02X}\n",
            cell.name, hex(cell.address), cell.width.bytes(),
        ));
    }
    out.push_str("}\n\nENTRY(Reset_Handler)\n\nSECTIONS\n{");

    out.push_str(&fill(templates::LINKER_PROGRAM_SECTIONS, &[("VECTORS", &flash.name), ("FLASH", &flash.name)]));

    for r in regions.iter().filter(|r| r.name != ram.name && r.name != flash.name) {
        for section in ["itcm", "dtcm"] {
            if r.name.contains(section) {
                out.push_str(&fill(templates::LINKER_TCM_SECTION, &[("SECTION", section), ("REGION", &r.name)]));
            }
        }
    }

    let stack_top = format!("ORIGIN({0}) + LENGTH({0})", ram.name);
    out.push_str(&fill(templates::LINKER_DATA_SECTIONS, &[
        ("RAM", &ram.name),
        ("FLASH", &flash.name),
        ("STACK_TOP", &stack_top),
    ]));

    if !fuse_cells.is_empty() {
        out.push_str("\n    /* Configuration fuses, programmed along with the image */\n");
        for cell in &fuse_cells {
            let section = cell.section();
            out.push_str(&format!("    {:<32} : {{ KEEP(*({})) }} > {}\n", section, section, cell.name));
        }
    }
    out.push_str("}\n");

    Ok(out)
}
