// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    #[error("memory segments {first} and {second} overlap and are executable or writable")]
    OverlappingSegments { first: String, second: String },

    #[error("{group}: {first} and {second} overlap{}", view_suffix(.mode))]
    OverlappingMembers { group: String, first: String, second: String, mode: Option<String> },

    #[error("{group}: {member} ends at {end:#x}, past the group size {size:#x}")]
    MemberOutsideGroup { group: String, member: String, end: u64, size: u64 },

    #[error("{register}.{field}: bits {offset}..{end} do not fit in {bits} bits")]
    BitfieldOutOfRange { register: String, field: String, offset: u32, end: u32, bits: u32 },

    #[error("bitfield {field}: mask {mask:#x} is not one contiguous run of bits")]
    BadMask { field: String, mask: u64 },

    #[error("{register}: bitfields {first} and {second} overlap")]
    OverlappingBitfields { register: String, first: String, second: String },

    #[error("{register}.{field}: value {name}={value:#x} does not fit in {width} bits")]
    ValueOutOfRange { register: String, field: String, name: String, value: u64, width: u32 },

    #[error("duplicate {kind} {name} in {scope}")]
    DuplicateName { kind: &'static str, scope: String, name: String },

    #[error("interrupt vector {0} is missing")]
    MissingVector(u32),

    #[error("interrupt vector {0} is declared twice")]
    DuplicateVector(u32),

    #[error("exception number {0} is declared twice")]
    DuplicateException(u8),

    #[error("register group {0} contains itself")]
    CyclicLayout(String),
}

fn view_suffix(mode: &Option<String>) -> String {
    match mode {
        Some(m) => format!(" in mode {}", m),
        None => String::new(),
    }
}

pub(super) fn check_device(device: &Device) -> Result<(), InvariantError> {
    check_segments(&device.segments)?;
    for module in &device.modules {
        unique_names("register group", &module.name, module.groups.iter().map(|g| g.name.as_str()))?;
        for group in &module.groups {
            check_group(group)?;
        }
    }
    unique_names("module", &device.name, device.modules.iter().map(|m| m.name.as_str()))?;
    unique_names("peripheral", &device.name, device.peripherals.iter().map(|p| p.name.as_str()))?;
    check_vectors(&device.interrupts)?;
    check_exceptions(&device.exceptions)?;

    let handlers = device.exceptions.iter().map(|e| e.name.as_str())
        .chain(device.interrupts.iter().filter_map(|v| v.handler_name()));
    unique_names("interrupt handler", &device.name, handlers)?;
    Ok(())
}

fn unique_names<'a>(
    kind: &'static str,
    scope: &str,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), InvariantError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(InvariantError::DuplicateName {
                kind, scope: scope.to_string(), name: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Two executable or writable memory segments must not overlap. Every other overlap is allowed
/// and returned as an alias: memory over peripheral space, a peripheral window inside another,
/// an enclosed segment of the same kind and access, or read-only memory over writable memory.
pub fn check_segments(segments: &[MemorySegment]) -> Result<Vec<SegmentAlias>, InvariantError> {
    unique_names("memory segment", "address space", segments.iter().map(|s| s.name.as_str()))?;

    let mut aliases = vec![];
    for (i, a) in segments.iter().enumerate() {
        for b in &segments[i + 1..] {
            if !a.overlaps(b) {
                continue;
            }
            let alias = |inner: &MemorySegment, outer: &MemorySegment, kind| SegmentAlias {
                segment: inner.name.clone(),
                within: outer.name.clone(),
                kind,
            };
            // The smaller of two segments, listed first
            let (inner, outer) = if b.encloses(a) && a.size != b.size { (a, b) } else { (b, a) };
            let nested = inner.size != outer.size && outer.encloses(inner);

            match (a.is_memory(), b.is_memory()) {
                (true, false) => aliases.push(alias(a, b, AliasKind::Peripheral)),
                (false, true) => aliases.push(alias(b, a, AliasKind::Peripheral)),
                (false, false) => {
                    if nested {
                        aliases.push(alias(inner, outer, AliasKind::PeripheralWindow));
                    }
                }
                (true, true) => {
                    let same_kind = a.kind == b.kind && a.access == b.access && a.external == b.external;
                    if same_kind && nested {
                        aliases.push(alias(inner, outer, AliasKind::SubRegion));
                    } else if a.is_exec_or_writable() && b.is_exec_or_writable() {
                        return Err(InvariantError::OverlappingSegments {
                            first: a.name.clone(),
                            second: b.name.clone(),
                        });
                    } else if !a.is_exec_or_writable() && b.is_exec_or_writable() {
                        aliases.push(alias(a, b, AliasKind::ReadOnlyOverlay));
                    } else if a.is_exec_or_writable() && !b.is_exec_or_writable() {
                        aliases.push(alias(b, a, AliasKind::ReadOnlyOverlay));
                    }
                }
            }
        }
    }
    Ok(aliases)
}

pub fn check_group(group: &RegisterGroup) -> Result<(), InvariantError> {
    for view in group.views() {
        let mut members = group.members.iter()
            .filter(|m| m.in_view(view))
            .collect::<Vec<_>>();
        members.sort_by_key(|m| m.offset());

        unique_names("register", &group.name, members.iter().map(|m| m.name()))?;

        for pair in members.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if prev.span() > 0 && prev.offset().saturating_add(prev.span()) > cur.offset() {
                return Err(InvariantError::OverlappingMembers {
                    group: group.name.clone(),
                    first: prev.name().to_string(),
                    second: cur.name().to_string(),
                    mode: view.map(str::to_string),
                });
            }
        }

        if group.size > 0 {
            if let Some(m) = members.iter().find(|m| m.offset().saturating_add(m.span()) > group.size) {
                return Err(InvariantError::MemberOutsideGroup {
                    group: group.name.clone(),
                    member: m.name().to_string(),
                    end: m.offset().saturating_add(m.span()),
                    size: group.size,
                });
            }
        }
    }

    for member in &group.members {
        if let GroupMember::Register(r) = member {
            check_register(r)?;
        }
    }
    Ok(())
}

pub fn check_register(reg: &Register) -> Result<(), InvariantError> {
    let bits = reg.width.bits();

    for (i, f) in reg.fields.iter().enumerate() {
        if f.width == 0 || f.end() > bits {
            return Err(InvariantError::BitfieldOutOfRange {
                register: reg.name.clone(),
                field: f.name.clone(),
                offset: f.offset,
                end: f.end(),
                bits,
            });
        }

        for other in &reg.fields[i + 1..] {
            if !f.shares_mode_with(other) {
                continue;
            }
            if f.name == other.name {
                return Err(InvariantError::DuplicateName {
                    kind: "bitfield", scope: reg.name.clone(), name: f.name.clone(),
                });
            }
            if f.mask() & other.mask() != 0 {
                return Err(InvariantError::OverlappingBitfields {
                    register: reg.name.clone(),
                    first: f.name.clone(),
                    second: other.name.clone(),
                });
            }
        }

        for v in &f.values {
            if f.width < 64 && v.value >> f.width != 0 {
                return Err(InvariantError::ValueOutOfRange {
                    register: reg.name.clone(),
                    field: f.name.clone(),
                    name: v.name.clone(),
                    value: v.value,
                    width: f.width,
                });
            }
        }
        unique_names("value", &f.name, f.values.iter().map(|v| v.name.as_str()))?;
    }
    Ok(())
}

/// Vectors must be ordered and dense from ordinal 0.
pub fn check_vectors(vectors: &[InterruptVector]) -> Result<(), InvariantError> {
    for (expected, v) in vectors.iter().enumerate() {
        let expected = expected as u32;
        if v.ordinal < expected {
            return Err(InvariantError::DuplicateVector(v.ordinal));
        }
        if v.ordinal > expected {
            return Err(InvariantError::MissingVector(expected));
        }
    }
    Ok(())
}

fn check_exceptions(exceptions: &[SystemException]) -> Result<(), InvariantError> {
    let mut seen = BTreeSet::new();
    for e in exceptions {
        if !seen.insert(e.number) {
            return Err(InvariantError::DuplicateException(e.number));
        }
    }
    Ok(())
}

/// Follows subgroup references from `root`, failing if a layout reaches itself.
pub fn check_acyclic<'a, F>(root: &'a str, children: F) -> Result<(), InvariantError>
where
    F: Fn(&str) -> Vec<&'a str>,
{
    fn visit<'a, F: Fn(&str) -> Vec<&'a str>>(
        name: &'a str,
        children: &F,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), InvariantError> {
        if path.contains(&name) {
            return Err(InvariantError::CyclicLayout(name.to_string()));
        }
        if !done.insert(name) {
            return Ok(());
        }
        path.push(name);
        for child in children(name) {
            visit(child, children, path, done)?;
        }
        path.pop();
        Ok(())
    }

    visit(root, &children, &mut vec![], &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fixtures::*;

    fn group(members: Vec<GroupMember>) -> RegisterGroup {
        RegisterGroup {
            name: "G".to_string(),
            caption: String::new(),
            size: 0,
            modes: vec![],
            members,
        }
    }

    #[test]
    fn executable_overlap_is_rejected() {
        let segs = vec![
            segment("FLASH", 0x0, 0x1000, SegmentKind::Flash, "rx"),
            segment("RAM", 0x800, 0x1000, SegmentKind::Ram, "rwx"),
        ];
        assert_eq!(check_segments(&segs), Err(InvariantError::OverlappingSegments {
            first: "FLASH".to_string(),
            second: "RAM".to_string(),
        }));
    }

    #[test]
    fn read_only_overlap_and_adjacency_are_fine() {
        let segs = vec![
            segment("FLASH", 0x0, 0x1000, SegmentKind::Flash, "rx"),
            segment("RAM", 0x1000, 0x1000, SegmentKind::Ram, "rwx"),
            segment("USER", 0x4000, 0x100, SegmentKind::Reserved, "r"),
            segment("BOOT", 0x4080, 0x100, SegmentKind::Reserved, "r"),
        ];
        assert_eq!(check_segments(&segs), Ok(vec![]));
    }

    #[test]
    fn nested_peripheral_windows_are_aliases() {
        let segs = vec![
            segment("PERIPHERALS", 0x4000_0000, 0x2000_0000, SegmentKind::Peripheral, "rw"),
            segment("HPB0", 0x4000_0000, 0x4000, SegmentKind::Peripheral, "rw"),
            segment("HPB1", 0x4100_0000, 0x4000, SegmentKind::Peripheral, "rw"),
        ];
        assert_eq!(check_segments(&segs), Ok(vec![
            SegmentAlias {
                segment: "HPB0".to_string(),
                within: "PERIPHERALS".to_string(),
                kind: AliasKind::PeripheralWindow,
            },
            SegmentAlias {
                segment: "HPB1".to_string(),
                within: "PERIPHERALS".to_string(),
                kind: AliasKind::PeripheralWindow,
            },
        ]));
    }

    #[test]
    fn read_only_memory_over_flash_is_an_overlay() {
        let segs = vec![
            segment("FLASH", 0x0, 0x10_0000, SegmentKind::Flash, "rx"),
            segment("BOOTROM", 0x0, 0x1000, SegmentKind::Reserved, "r"),
        ];
        assert_eq!(check_segments(&segs), Ok(vec![SegmentAlias {
            segment: "BOOTROM".to_string(),
            within: "FLASH".to_string(),
            kind: AliasKind::ReadOnlyOverlay,
        }]));

        // Read-only flash over RAM
        let segs = vec![
            segment("RAM", 0x2000_0000, 0x1000, SegmentKind::Ram, "rwx"),
            segment("ROMTAB", 0x2000_0800, 0x1000, SegmentKind::Flash, "r"),
        ];
        assert_eq!(check_segments(&segs).unwrap()[0].segment, "ROMTAB");
    }

    #[test]
    fn memory_over_peripheral_is_an_alias() {
        let segs = vec![
            segment("IO", 0x4000_0000, 0x1000, SegmentKind::Peripheral, "rw"),
            segment("BKUPRAM", 0x4000_0800, 0x100, SegmentKind::Ram, "rwx"),
        ];
        assert_eq!(check_segments(&segs), Ok(vec![SegmentAlias {
            segment: "BKUPRAM".to_string(),
            within: "IO".to_string(),
            kind: AliasKind::Peripheral,
        }]));
    }

    #[test]
    fn enclosed_memory_of_the_same_kind_is_a_sub_region() {
        let segs = vec![
            segment("HSRAM", 0x2000_0000, 0x4_0000, SegmentKind::Ram, "rwx"),
            segment("HSRAM_ETB", 0x2000_0000, 0x8000, SegmentKind::Ram, "rwx"),
        ];
        assert_eq!(check_segments(&segs), Ok(vec![SegmentAlias {
            segment: "HSRAM_ETB".to_string(),
            within: "HSRAM".to_string(),
            kind: AliasKind::SubRegion,
        }]));

        // Same window, different access: a real conflict
        let segs = vec![
            segment("HSRAM", 0x2000_0000, 0x4_0000, SegmentKind::Ram, "rwx"),
            segment("HSRAM_RO", 0x2000_0000, 0x8000, SegmentKind::Ram, "rw"),
        ];
        assert!(matches!(check_segments(&segs), Err(InvariantError::OverlappingSegments { .. })));

        // Identical ranges are not a sub-region of each other
        let segs = vec![
            segment("A", 0x2000_0000, 0x8000, SegmentKind::Ram, "rwx"),
            segment("B", 0x2000_0000, 0x8000, SegmentKind::Ram, "rwx"),
        ];
        assert!(matches!(check_segments(&segs), Err(InvariantError::OverlappingSegments { .. })));
    }

    #[test]
    fn overlapping_bitfields_are_rejected() {
        let reg = register("CTRL", 0, vec![field("A", 0, 4), field("B", 3, 2)]);
        assert!(matches!(check_register(&reg), Err(InvariantError::OverlappingBitfields { .. })));

        let reg = register("CTRL", 0, vec![field("A", 0, 4), field("B", 4, 4)]);
        assert_eq!(check_register(&reg), Ok(()));
    }

    #[test]
    fn bitfields_in_disjoint_modes_may_overlap() {
        let mut a = field("A", 0, 4);
        a.modes = vec!["MASTER".to_string()];
        let mut b = field("B", 0, 8);
        b.modes = vec!["SLAVE".to_string()];
        assert_eq!(check_register(&register("CTRL", 0, vec![a, b])), Ok(()));
    }

    #[test]
    fn bitfield_past_register_width() {
        let reg = register("CTRL", 0, vec![field("A", 30, 4)]);
        assert!(matches!(check_register(&reg), Err(InvariantError::BitfieldOutOfRange { end: 34, .. })));
    }

    #[test]
    fn enum_value_must_fit_field() {
        let mut f = field("MODE", 0, 2);
        f.values.push(EnumValue { name: "BIG".to_string(), value: 4, caption: String::new() });
        assert!(matches!(check_register(&register("R", 0, vec![f])), Err(InvariantError::ValueOutOfRange { .. })));
    }

    #[test]
    fn registers_overlap_per_view() {
        let g = group(vec![
            GroupMember::Register(register("A", 0, vec![])),
            GroupMember::Register(register("B", 2, vec![])),
        ]);
        assert!(matches!(check_group(&g), Err(InvariantError::OverlappingMembers { .. })));

        let mut a = register("A", 0, vec![]);
        a.modes = vec!["M0".to_string()];
        let mut b = register("B", 0, vec![]);
        b.modes = vec!["M1".to_string()];
        let mut g = group(vec![GroupMember::Register(a), GroupMember::Register(b)]);
        g.modes = vec!["M0".to_string(), "M1".to_string()];
        assert_eq!(check_group(&g), Ok(()));
    }

    #[test]
    fn register_arrays_cover_their_span() {
        let mut a = register("A", 0, vec![]);
        a.count = 4;
        let g = group(vec![
            GroupMember::Register(a),
            GroupMember::Register(register("B", 0x10, vec![])),
        ]);
        assert_eq!(check_group(&g), Ok(()));

        let mut g = g;
        if let GroupMember::Register(b) = &mut g.members[1] {
            b.offset = 0xC;
        }
        assert!(check_group(&g).is_err());
    }

    #[test]
    fn vectors_must_be_dense() {
        assert_eq!(check_vectors(&[handler(0, "A"), handler(1, "B")]), Ok(()));
        assert_eq!(check_vectors(&[handler(0, "A"), handler(1, "B"), handler(3, "C")]),
            Err(InvariantError::MissingVector(2)));
        assert_eq!(check_vectors(&[handler(0, "A"), handler(0, "B")]),
            Err(InvariantError::DuplicateVector(0)));
        assert_eq!(check_vectors(&[]), Ok(()));
    }

    #[test]
    fn duplicate_handler_names() {
        let mut dev = device();
        dev.interrupts[1] = handler(1, "PM");
        assert!(matches!(dev.validate(), Err(InvariantError::DuplicateName { kind: "interrupt handler", .. })));
    }

    #[test]
    fn cycles_are_detected() {
        let edges = |n: &str| -> Vec<&'static str> {
            match n {
                "A" => vec!["B", "C"],
                "B" => vec!["C"],
                "C" => vec!["A"],
                _ => vec![],
            }
        };
        assert_eq!(check_acyclic("A", edges), Err(InvariantError::CyclicLayout("A".to_string())));

        let dag = |n: &str| -> Vec<&'static str> {
            match n {
                "A" => vec!["B", "C"],
                "B" => vec!["C"],
                _ => vec![],
            }
        };
        assert_eq!(check_acyclic("A", dag), Ok(()));
    }
}
