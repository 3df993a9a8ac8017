// SPDX-License-Identifier: GPL-3.0-or-later

//! Register layouts of one `<modules>/<module>`: value groups, register groups and the
//! sub-groups they nest.

use std::collections::HashMap;
use std::sync::Arc;

use super::xml::Element;
use super::ParseError;
use crate::device::{
    validate, Bitfield, EnumValue, GroupMember, Module, Register, RegisterAccess, RegisterGroup,
    RegisterWidth, SubgroupRef,
};

type ValueGroups = HashMap<String, Vec<EnumValue>>;

// A register group before its sub-group sizes are known
struct PendingGroup {
    path: String,
    declared_size: Option<u64>,
    group: RegisterGroup,
    // (member index, declared size, member path)
    subgroups: Vec<(usize, Option<u64>, String)>,
}

pub fn parse_module(el: Element) -> Result<Module, ParseError> {
    let name = el.identifier("name")?;
    let values = parse_value_groups(el)?;

    let mut pending = vec![];
    for g in el.children("register-group") {
        let p = parse_group(g, &values)?;
        if pending.iter().any(|q: &PendingGroup| q.group.name == p.group.name) {
            return Err(ParseError::Invariant {
                path: p.path,
                source: validate::InvariantError::DuplicateName {
                    kind: "register group",
                    scope: name,
                    name: p.group.name,
                },
            });
        }
        pending.push(p);
    }

    let index = pending.iter().enumerate()
        .map(|(i, p)| (p.group.name.clone(), i))
        .collect::<HashMap<_, _>>();

    for p in &pending {
        for (member, _, path) in &p.subgroups {
            if let GroupMember::Subgroup(s) = &p.group.members[*member] {
                if !index.contains_key(&s.layout) {
                    return Err(ParseError::UnresolvedReference {
                        path: path.clone(),
                        kind: "register-group",
                        name: s.layout.clone(),
                    });
                }
            }
        }
    }

    for p in &pending {
        validate::check_acyclic(&p.group.name, |n| {
            index.get(n)
                .map(|&i| subgroup_layouts(&pending[i].group))
                .unwrap_or_default()
        })
        .map_err(|source| ParseError::Invariant { path: el.path(), source })?;
    }

    let mut sizes = HashMap::new();
    for i in 0..pending.len() {
        resolve_size(i, &mut pending, &index, &mut sizes)?;
    }

    let mut groups = vec![];
    for p in pending {
        validate::check_group(&p.group)
            .map_err(|source| ParseError::Invariant { path: p.path.clone(), source })?;
        groups.push(Arc::new(p.group));
    }

    Ok(Module {
        name,
        id: el.text_attr("id"),
        version: el.text_attr("version"),
        caption: el.text_attr("caption"),
        groups,
    })
}

fn subgroup_layouts(group: &RegisterGroup) -> Vec<&str> {
    group.members.iter()
        .filter_map(|m| match m {
            GroupMember::Subgroup(s) => Some(s.layout.as_str()),
            GroupMember::Register(_) => None,
        })
        .collect()
}

/// Fills in sub-group sizes and the group's own size, children first. Layouts are acyclic here.
fn resolve_size(
    i: usize,
    pending: &mut [PendingGroup],
    index: &HashMap<String, usize>,
    sizes: &mut HashMap<usize, u64>,
) -> Result<u64, ParseError> {
    if let Some(&size) = sizes.get(&i) {
        return Ok(size);
    }

    let subgroups = pending[i].subgroups.clone();
    for (member, declared, path) in subgroups {
        let size = match declared {
            Some(size) => size,
            None => {
                let layout = match &pending[i].group.members[member] {
                    GroupMember::Subgroup(s) => s.layout.clone(),
                    GroupMember::Register(_) => continue,
                };
                match index.get(&layout) {
                    Some(&child) => resolve_size(child, pending, index, sizes)?,
                    None => return Err(ParseError::UnresolvedReference { path, kind: "register-group", name: layout }),
                }
            }
        };
        if let GroupMember::Subgroup(s) = &mut pending[i].group.members[member] {
            s.size = size;
            if size.checked_mul(s.count).and_then(|span| s.offset.checked_add(span)).is_none() {
                return Err(ParseError::OutOfRange { path, attribute: "count".to_string(), value: s.count.to_string() });
            }
        }
    }

    let p = &mut pending[i];
    let size = match p.declared_size {
        Some(size) => size,
        None => p.group.members.iter()
            .map(|m| m.offset() + m.span())
            .max()
            .unwrap_or(0),
    };
    p.group.size = size;
    sizes.insert(i, size);
    Ok(size)
}

fn parse_value_groups(module: Element) -> Result<ValueGroups, ParseError> {
    let mut groups = ValueGroups::new();
    for vg in module.children("value-group") {
        let name = vg.required_attr("name")?.trim().to_string();
        let mut values = vec![];
        for v in vg.children("value") {
            values.push(EnumValue {
                name: v.identifier_part("name")?,
                value: v.required_u64("value")?,
                caption: v.text_attr("caption"),
            });
        }
        groups.insert(name, values);
    }
    Ok(groups)
}

fn parse_group(el: Element, values: &ValueGroups) -> Result<PendingGroup, ParseError> {
    let name = el.identifier("name")?;
    let modes = el.children("mode")
        .map(|m| m.identifier("name"))
        .collect::<Result<Vec<_>, _>>()?;

    let mut entries = vec![];
    for child in el.elements() {
        match child.tag() {
            "register" => entries.push((GroupMember::Register(parse_register(child, values)?), None)),
            "register-group" => {
                let (sub, declared) = parse_subgroup(child)?;
                entries.push((GroupMember::Subgroup(sub), Some((declared, child.path()))));
            }
            _ => {}
        }
    }
    entries.sort_by_key(|(m, _)| m.offset());

    let mut members = vec![];
    let mut subgroups = vec![];
    for (i, (member, sub)) in entries.into_iter().enumerate() {
        if let Some((declared, path)) = sub {
            subgroups.push((i, declared, path));
        }
        members.push(member);
    }

    Ok(PendingGroup {
        path: el.path(),
        declared_size: el.u64_attr("size")?,
        group: RegisterGroup {
            name,
            caption: el.text_attr("caption"),
            size: 0,
            modes,
            members,
        },
        subgroups,
    })
}

fn parse_subgroup(el: Element) -> Result<(SubgroupRef, Option<u64>), ParseError> {
    let name = el.identifier("name")?;
    let layout = match el.attr("name-in-module") {
        Some(_) => el.identifier("name-in-module")?,
        None => name.clone(),
    };
    let count = count_attr(el)?;
    let declared = el.u64_attr("size")?;

    Ok((SubgroupRef {
        name,
        layout,
        caption: el.text_attr("caption"),
        offset: el.u64_attr("offset")?.unwrap_or(0),
        size: declared.unwrap_or(0),
        count,
        modes: el.modes()?,
    }, declared))
}

fn count_attr(el: Element) -> Result<u64, ParseError> {
    match el.u64_attr("count")? {
        None => Ok(1),
        Some(0) => Err(el.invalid("count", "0", "must be at least 1")),
        Some(n) => Ok(n),
    }
}

fn parse_register(el: Element, values: &ValueGroups) -> Result<Register, ParseError> {
    let name = el.identifier("name")?;
    let offset = el.required_u64("offset")?;

    let size = el.u64_attr("size")?.unwrap_or(4);
    let width = u8::try_from(size).ok()
        .and_then(|b| RegisterWidth::try_from(b).ok())
        .ok_or_else(|| el.invalid("size", &size.to_string(), "is not a register width of 1, 2, 4 or 8 bytes"))?;

    let access = match el.attr("rw").map(|s| s.trim().to_ascii_uppercase()).as_deref() {
        None | Some("") | Some("RW") => RegisterAccess::ReadWrite,
        Some("R") => RegisterAccess::ReadOnly,
        Some("W") => RegisterAccess::WriteOnly,
        Some(v) => return Err(el.invalid("rw", v, "is not one of R, W or RW")),
    };

    let reset_value = el.u64_attr("initval")?.unwrap_or(0);
    if width.bits() < 64 && reset_value >> width.bits() != 0 {
        return Err(el.out_of_range("initval", &format!("{:#x}", reset_value)));
    }

    let count = count_attr(el)?;
    if width.bytes().checked_mul(count).and_then(|span| offset.checked_add(span)).is_none() {
        return Err(el.out_of_range("count", &count.to_string()));
    }

    let mut fields = el.children("bitfield")
        .map(|bf| parse_bitfield(bf, values))
        .collect::<Result<Vec<_>, _>>()?;
    fields.sort_by_key(|f| f.offset);

    Ok(Register {
        name,
        caption: el.text_attr("caption"),
        offset,
        width,
        access,
        reset_value,
        count,
        modes: el.modes()?,
        fields,
    })
}

fn parse_bitfield(el: Element, values: &ValueGroups) -> Result<Bitfield, ParseError> {
    let name = el.identifier_part("name")?;
    let mask = el.required_u64("mask")?;

    let offset = mask.trailing_zeros();
    let shifted = mask.checked_shr(offset).unwrap_or(0);
    if mask == 0 || shifted & shifted.wrapping_add(1) != 0 {
        return Err(ParseError::Invariant {
            path: el.path(),
            source: validate::InvariantError::BadMask { field: name, mask },
        });
    }

    let values = match el.attr("values").map(str::trim) {
        None | Some("") => vec![],
        Some(group) => values.get(group).cloned().ok_or_else(|| ParseError::UnresolvedReference {
            path: el.path(),
            kind: "value-group",
            name: group.to_string(),
        })?,
    };

    Ok(Bitfield {
        name,
        caption: el.text_attr("caption"),
        offset,
        width: shifted.count_ones(),
        modes: el.modes()?,
        values,
    })
}
