// SPDX-License-Identifier: GPL-3.0-or-later

//! The device header: interrupt numbers, configuration macros, the memory map and one set of
//! register structs and bitfield macros per module.

use std::collections::HashSet;
use std::sync::Arc;

use super::fuses::{self, FUSES_MODULE};
use super::{GenError, GenOptions, Symbols};
use crate::device::{
    Bitfield, Device, GroupMember, Module, Register, RegisterAccess, RegisterGroup, RegisterWidth,
};
use crate::util::comment_text;

/// Cortex-M system peripherals live here and are declared by the CMSIS core header instead.
const CORE_PERIPHERAL_BASE: u64 = 0xE000_0000;

pub fn generate(device: &Device, opts: &GenOptions) -> Result<String, GenError> {
    generate_with_fuses(device, opts).map(|(header, _)| header)
}

/// The device header, and the fuses header it includes when the device has configuration fuses.
/// Both share one set of symbols.
pub fn generate_with_fuses(device: &Device, opts: &GenOptions) -> Result<(String, Option<String>), GenError> {
    let mut h = HeaderWriter { device, out: opts.c_banner(), symbols: Symbols::default() };
    let guard = format!("{}_H_", device.name.to_ascii_uppercase());

    h.line("");
    h.line(&format!("#ifndef {}", guard));
    h.line(&format!("#define {}", guard));
    h.line("");
    h.line("#ifdef __cplusplus");
    h.line("extern \"C\" {");
    h.line("#endif");
    h.line("");
    h.line("#include <stdint.h>");

    h.interrupts()?;
    h.configuration()?;
    h.properties()?;
    h.memory_map()?;
    h.core_include();

    for module in device.modules.iter().filter(|m| !is_skipped_module(device, &m.name)) {
        h.module(module)?;
    }
    h.instances()?;

    let fuses = match fuses::fuses_module(device) {
        Some(module) => Some(h.fuses(module, opts)?),
        None => None,
    };

    h.line("");
    h.line("#ifdef __cplusplus");
    h.line("}");
    h.line("#endif");
    h.line("");
    h.line(&format!("#endif /* {} */", guard));

    Ok((h.out, fuses))
}

/// Fuses get their own header, and the core's own peripherals come from CMSIS.
fn is_skipped_module(device: &Device, module: &str) -> bool {
    if module == FUSES_MODULE {
        return true;
    }
    let mut instances = device.peripherals.iter().filter(|p| p.module == module).peekable();
    device.core.is_cortex_m()
        && instances.peek().is_some()
        && instances.all(|p| p.base_address >= CORE_PERIPHERAL_BASE)
}

/// Macro prefix of a register group: `PORT_GROUP` stays as is, `GROUP` in module `PORT` becomes
/// `PORT_GROUP`.
fn group_prefix(module: &str, group: &str) -> String {
    if group.starts_with(module) {
        group.to_string()
    } else {
        format!("{}_{}", module, group)
    }
}

fn type_name(prefix: &str, mode: Option<&str>) -> String {
    match mode {
        Some(mode) => format!("{}_{}_registers_t", prefix.to_ascii_lowercase(), mode.to_ascii_lowercase()),
        None => format!("{}_registers_t", prefix.to_ascii_lowercase()),
    }
}

/// `CHIPID_DSU` becomes `CHIP_DSU`, `REV` becomes `CHIP_REV`.
fn property_macro(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("CHIPID_") {
        format!("CHIP_{}", rest)
    } else if name.starts_with("CHIP_") {
        name.to_string()
    } else {
        format!("CHIP_{}", name)
    }
}

fn parenthesized(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        format!("({})", value)
    }
}

/// Groups of a module, each after the groups it embeds.
fn dependency_order(module: &Module) -> Vec<&Arc<RegisterGroup>> {
    fn visit<'m>(
        module: &'m Module,
        group: &'m Arc<RegisterGroup>,
        seen: &mut HashSet<&'m str>,
        order: &mut Vec<&'m Arc<RegisterGroup>>,
    ) {
        if !seen.insert(group.name.as_str()) {
            return;
        }
        for member in &group.members {
            if let GroupMember::Subgroup(sub) = member {
                if let Some(child) = module.group(&sub.layout) {
                    visit(module, child, seen, order);
                }
            }
        }
        order.push(group);
    }

    let mut seen = HashSet::new();
    let mut order = vec![];
    for group in &module.groups {
        visit(module, group, &mut seen, &mut order);
    }
    order
}

/// Names a moded item once per mode, or once without a mode.
fn mode_names(base: &str, name: &str, modes: &[String]) -> Vec<String> {
    if modes.is_empty() {
        vec![format!("{}_{}", base, name)]
    } else {
        modes.iter().map(|m| format!("{}_{}_{}", base, m, name)).collect()
    }
}

struct HeaderWriter<'d> {
    device: &'d Device,
    out: String,
    symbols: Symbols,
}

impl<'d> HeaderWriter<'d> {
    fn line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn section(&mut self, title: &str) {
        self.line("");
        self.line(&format!("/* {:-^90} */", format!(" {} ", title)));
    }

    fn define(&mut self, symbol: &str, value: &str, caption: &str) -> Result<(), GenError> {
        self.define_as(symbol, symbol, value, caption)
    }

    /// `symbol` is what must stay unique, `head` what follows `#define`, e.g. `X(value)`.
    fn define_as(&mut self, symbol: &str, head: &str, value: &str, caption: &str) -> Result<(), GenError> {
        self.symbols.claim(symbol)?;
        let mut line = match value {
            "" => format!("#define {}", head),
            _ => format!("#define {:<48} {}", head, value),
        };
        let caption = comment_text(caption);
        if !caption.is_empty() {
            line.push_str(&format!(" /* {} */", caption));
        }
        self.line(&line);
        Ok(())
    }

    fn interrupts(&mut self) -> Result<(), GenError> {
        let device = self.device;
        self.section("Interrupt Number Definition");
        self.line("typedef enum IRQn");
        self.line("{");

        if !device.exceptions.is_empty() {
            self.line(&format!("/* ******* {} Processor Exceptions Numbers ******* */", device.cpu));
        }
        for exc in &device.exceptions {
            let symbol = format!("{}_IRQn", exc.name);
            self.symbols.claim(symbol.as_str())?;
            let number = i32::from(exc.number) - 16;
            self.line(&format!("    {:<40} = {:>4}, /* {:>3} {} */", symbol, number, exc.number, comment_text(&exc.caption)));
        }

        self.line(&format!("/* ******* {} Specific Interrupt Numbers ******* */", device.name));
        for vector in &device.interrupts {
            if let crate::device::VectorEntry::Handler { name, caption, .. } = &vector.entry {
                let symbol = format!("{}_IRQn", name);
                self.symbols.claim(symbol.as_str())?;
                self.line(&format!("    {:<40} = {:>4}, /* {:>3} {} */", symbol, vector.ordinal, vector.ordinal, comment_text(caption)));
            }
        }

        self.symbols.claim("PERIPH_COUNT_IRQn")?;
        self.line(&format!("    {:<40} = {:>4}  /* Number of peripheral IDs */", "PERIPH_COUNT_IRQn", device.interrupts.len()));
        self.line("} IRQn_Type;");
        Ok(())
    }

    fn configuration(&mut self) -> Result<(), GenError> {
        let device = self.device;
        self.section("Processor and Core Peripheral Configuration");
        for (name, m) in &device.macros {
            self.define(name, &parenthesized(&m.value), &m.caption)?;
        }
        Ok(())
    }

    fn properties(&mut self) -> Result<(), GenError> {
        let device = self.device;
        if device.properties.is_empty() {
            return Ok(());
        }
        self.section("Device Properties");
        for (name, p) in &device.properties {
            self.define(&property_macro(name), &parenthesized(&p.value), &p.caption)?;
        }
        Ok(())
    }

    fn memory_map(&mut self) -> Result<(), GenError> {
        let device = self.device;
        self.section("Memory Mapping Definitions");
        for seg in &device.segments {
            self.define(&format!("{}_BASE", seg.name), &format!("(0x{:08X}UL)", seg.start), &format!("{} base address", seg.name))?;
            self.define(&format!("{}_SIZE", seg.name), &format!("(0x{:08X}UL)", seg.size), &format!("{} size", seg.name))?;
            if let Some(page) = seg.page_size {
                self.define(&format!("{}_PAGESIZE", seg.name), &format!("({}UL)", page), &format!("{} page size", seg.name))?;
            }
        }
        Ok(())
    }

    fn core_include(&mut self) {
        let device = self.device;
        self.section("CMSIS Core");
        if let Some(core) = device.core.core_header() {
            self.line(&format!("#include <{}>", core));
        }
        // The register structs below use the CMSIS access qualifiers
        for (qualifier, definition) in [("__I", "volatile const"), ("__O", "volatile"), ("__IO", "volatile")] {
            self.line(&format!("#ifndef {}", qualifier));
            self.line(&format!("#  define {} {}", qualifier, definition));
            self.line("#endif");
        }
    }

    fn module(&mut self, module: &Module) -> Result<(), GenError> {
        let title = format!("{} ({} {}) {}", module.name, module.id, module.version, comment_text(&module.caption));
        self.section(title.trim_end());

        for group in dependency_order(module) {
            let prefix = group_prefix(&module.name, &group.name);
            for member in &group.members {
                if let GroupMember::Register(reg) = member {
                    for base in mode_names(&prefix, &reg.name, &reg.modes) {
                        self.register(&base, reg)?;
                    }
                }
            }
            self.group_types(module, &prefix, group)?;
        }
        Ok(())
    }

    fn register(&mut self, base: &str, reg: &Register) -> Result<(), GenError> {
        let suffix = if reg.width == RegisterWidth::W64 { "ULL" } else { "U" };
        let digits = reg.width.bytes() as usize * 2;

        self.line("");
        self.line(&format!(
            "/* -------- {} : (Offset: 0x{:02X}) ({} {}) {} -------- */",
            base, reg.offset, access_label(reg.access), reg.width.bits(), comment_text(&reg.caption),
        ));
        self.define(&format!("{}_OFFSET", base), &format!("(0x{:02X})", reg.offset), &format!("({}) {} Offset", base, reg.caption))?;
        self.define(
            &format!("{}_RESETVAL", base),
            &format!("(0x{:0width$X}{})", reg.reset_value, suffix, width = digits),
            &format!("({}) {} Reset Value", base, reg.caption),
        )?;

        let mut mask = 0;
        for field in &reg.fields {
            for name in mode_names(base, &field.name, &field.modes) {
                self.bitfield(&name, field, suffix)?;
            }
            mask |= field.mask();
        }
        self.define(&format!("{}_Msk", base), &format!("(0x{:0width$X}{})", mask, suffix, width = digits), &format!("({}) Register Mask", base))?;
        Ok(())
    }

    fn bitfield(&mut self, name: &str, field: &Bitfield, suffix: &str) -> Result<(), GenError> {
        let pos = format!("{}_Pos", name);
        let msk = format!("{}_Msk", name);
        let caption = comment_text(&field.caption);

        self.define(&pos, &format!("({}U)", field.offset), &format!("({}) {} Position", name, caption))?;
        self.define(&msk, &format!("(0x{:X}{} << {})", field.mask() >> field.offset, suffix, pos), &format!("({}) {} Mask", name, caption))?;
        self.define_as(name, &format!("{}(value)", name), &format!("({} & ((value) << {}))", msk, pos), "")?;

        for v in &field.values {
            let value_name = format!("{}_{}", name, v.name);
            let val = format!("{}_Val", value_name);
            self.define(&val, &format!("(0x{:X}{})", v.value, suffix), &format!("({}) {}", name, v.caption))?;
            self.define(&value_name, &format!("({} << {})", val, pos), &format!("({}) {}", name, v.caption))?;
        }
        Ok(())
    }

    fn group_types(&mut self, module: &Module, prefix: &str, group: &RegisterGroup) -> Result<(), GenError> {
        if group.modes.is_empty() {
            return self.group_struct(module, prefix, group, None);
        }

        for mode in &group.modes {
            self.group_struct(module, prefix, group, Some(mode))?;
        }

        let union = type_name(prefix, None);
        self.symbols.claim(union.as_str())?;
        self.line("");
        self.line(&format!("/** \\brief {} hardware registers, one view per mode */", prefix));
        self.line("typedef union");
        self.line("{");
        for mode in &group.modes {
            self.line(&format!("    {:<40} {};", type_name(prefix, Some(mode)), mode));
        }
        self.line(&format!("}} {};", union));
        Ok(())
    }

    fn group_struct(&mut self, module: &Module, prefix: &str, group: &RegisterGroup, mode: Option<&str>) -> Result<(), GenError> {
        let name = type_name(prefix, mode);
        self.symbols.claim(name.as_str())?;

        self.line("");
        match mode {
            Some(m) => self.line(&format!("/** \\brief {} {} hardware registers */", prefix, m)),
            None => self.line(&format!("/** \\brief {} hardware registers */", prefix)),
        }
        self.line("typedef struct");
        self.line("{");

        let mut cursor = 0u64;
        let mut reserved = 0;
        for member in group.members.iter().filter(|m| m.in_view(mode)) {
            if member.offset() > cursor {
                reserved += 1;
                self.padding(reserved, member.offset() - cursor);
            }

            match member {
                GroupMember::Register(reg) => {
                    let mode = mode.or_else(|| reg.modes.first().map(String::as_str));
                    let field_name = match (reg.modes.is_empty(), mode) {
                        (false, Some(m)) => format!("{}_{}_{}", prefix, m, reg.name),
                        _ => format!("{}_{}", prefix, reg.name),
                    };
                    let qualifier = match reg.access {
                        RegisterAccess::ReadOnly => "__I",
                        RegisterAccess::WriteOnly => "__O",
                        RegisterAccess::ReadWrite => "__IO",
                    };
                    let declarator = match reg.count {
                        1 => field_name,
                        n => format!("{}[{}]", field_name, n),
                    };
                    self.line(&format!(
                        "    {:<5} {:<34} {:<32} /**< Offset: 0x{:02X} ({:<3} {:>2}) {} */",
                        qualifier, reg.width.c_type(), format!("{};", declarator),
                        reg.offset, access_label(reg.access), reg.width.bits(), comment_text(&reg.caption),
                    ));
                }
                GroupMember::Subgroup(sub) => {
                    let ty = type_name(&group_prefix(&module.name, &sub.layout), None);
                    let declarator = match sub.count {
                        1 => sub.name.clone(),
                        n => format!("{}[{}]", sub.name, n),
                    };
                    self.line(&format!(
                        "    {:<40} {:<32} /**< Offset: 0x{:02X} {} */",
                        ty, format!("{};", declarator), sub.offset, comment_text(&sub.caption),
                    ));
                }
            }
            cursor = cursor.max(member.offset() + member.span());
        }

        if group.size > cursor {
            reserved += 1;
            self.padding(reserved, group.size - cursor);
        }

        self.line(&format!("}} {};", name));
        Ok(())
    }

    fn padding(&mut self, index: u32, bytes: u64) {
        self.line(&format!("    {:<5} {:<34} Reserved{}[0x{:X}];", "__I", "uint8_t", index, bytes));
    }

    /// Writes the fuse layout as a separate header and returns it. The device header gets the
    /// include plus an address and a constant per fuse word.
    fn fuses(&mut self, module: &Module, opts: &GenOptions) -> Result<String, GenError> {
        let device = self.device;
        let device_header = std::mem::replace(&mut self.out, opts.c_banner());
        let guard = format!("{}_FUSES_H_", device.name.to_ascii_uppercase());

        self.line("");
        self.line(&format!("#ifndef {}", guard));
        self.line(&format!("#define {}", guard));
        self.line("");
        self.line("#include <stdint.h>");
        self.module(module)?;
        self.line("");
        self.line(&format!("#endif /* {} */", guard));
        let fuses_header = std::mem::replace(&mut self.out, device_header);

        let cells = fuses::cells(device);
        self.section("Device Configuration Fuses");
        self.line(&format!("#include \"fuses/{}.h\"", device.name.to_ascii_lowercase()));
        self.line("");
        for cell in &cells {
            self.define(&format!("{}_BASE", cell.symbol), &format!("(0x{:08X}UL)", cell.address), "")?;
        }
        self.line("");
        self.line("#ifndef __ASSEMBLER__");
        for cell in &cells {
            self.symbols.claim(cell.symbol.as_str())?;
            self.line(&format!(
                "extern const {} __attribute__((used, retain, section(\"{}\"))) {};",
                cell.width.c_type(), cell.section(), cell.symbol,
            ));
        }
        self.line("#endif /* __ASSEMBLER__ */");
        Ok(fuses_header)
    }

    fn instances(&mut self) -> Result<(), GenError> {
        let device = self.device;
        self.section("Peripheral Instances");

        for p in device.peripherals.iter().filter(|p| !is_skipped_module(device, &p.module)) {
            self.line("");
            self.line(&format!("/* {} ({}) */", p.name, p.module));
            self.define(&format!("{}_BASE_ADDRESS", p.name), &format!("(0x{:08X}UL)", p.base_address), "")?;

            for gi in &p.groups {
                let ty = type_name(&group_prefix(&p.module, &gi.layout.name), None);
                if gi.name != p.name {
                    self.define(&format!("{}_BASE_ADDRESS", gi.name), &format!("(0x{:08X}UL)", gi.base_address), "")?;
                }
                self.define(&format!("{}_REGS", gi.name), &format!("(({} *)0x{:08X}UL)", ty, gi.base_address), "")?;
            }

            for (name, param) in &p.params {
                self.define(&format!("{}_{}", p.name, name), &parenthesized(&param.value), &param.caption)?;
            }
        }
        Ok(())
    }
}

fn access_label(access: RegisterAccess) -> &'static str {
    match access {
        RegisterAccess::ReadOnly => "R",
        RegisterAccess::WriteOnly => "W",
        RegisterAccess::ReadWrite => "R/W",
    }
}
