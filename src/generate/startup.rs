// SPDX-License-Identifier: GPL-3.0-or-later

//! Reset code and the vector table. Table cells follow the parsed ordinals one to one; the
//! position of a handler is the hardware's vector-fetch index and is never rearranged.

use super::templates::{self, fill};
use super::{ArtifactKind, GenError, GenOptions, Symbols};
use crate::device::{Device, VectorEntry};
use crate::util::comment_text;

/// Architectural Cortex-M exception slots after the initial stack pointer.
const CORTEX_M_SYSTEM_SLOTS: u8 = 15;
const HARD_FAULT: u8 = 3;

/// Handlers the startup skeletons define themselves.
const CORTEX_M_BUILTIN: &[&str] = &[
    "Reset_Handler", "HardFault_Handler", "Default_Handler", "Default_Handler_Jump", "Reserved_Handler",
];
const CORTEX_A_BUILTIN: &[&str] = &[
    "Reset_Handler", "Undef_Handler", "SVC_Handler", "PAbt_Handler", "DAbt_Handler", "IRQ_Handler",
    "FIQ_Handler", "Default_Handler", "Default_Handler_Jump", "Reserved_Handler",
];

fn handler_symbol(name: &str) -> String {
    format!("{}_Handler", name)
}

pub fn generate(device: &Device, opts: &GenOptions) -> Result<String, GenError> {
    let header = ArtifactKind::Header.relative_path(&device.name);
    let header = header.strip_prefix("include").unwrap_or(header.as_path()).to_string_lossy().into_owned();

    let mut out = opts.c_banner();
    out.push_str(&format!("\n/* Startup code for {} ({}). */\n", device.name, device.cpu));

    if device.core.is_cortex_m() {
        out.push_str(&fill(templates::STARTUP_CM_PROLOGUE, &[("HEADER", &header)]));
        cortex_m_vectors(device, &mut out)?;
        out.push_str(templates::STARTUP_CM_RESET);
    } else if device.core.is_legacy_a() {
        out.push_str(&fill(templates::STARTUP_A_PROLOGUE, &[("HEADER", &header)]));
        irq_table(device, &mut out)?;
        out.push_str(templates::STARTUP_A_RESET);
    } else {
        return Err(GenError::UnsupportedCore { cpu: device.cpu.clone(), generator: "startup" });
    }

    Ok(out)
}

/// Declares one handler. Weak handlers fall back to `Default_Handler`, the others must be
/// provided by the application.
fn declare(out: &mut String, symbols: &mut Symbols, symbol: &str, weak: bool) -> Result<(), GenError> {
    symbols.claim(symbol)?;
    if weak {
        out.push_str(&format!("void {}(void) __attribute__((weak, alias(\"Default_Handler_Jump\")));\n", symbol));
    } else {
        out.push_str(&format!("void {}(void);\n", symbol));
    }
    Ok(())
}

fn declare_device_handlers(device: &Device, out: &mut String, symbols: &mut Symbols) -> Result<(), GenError> {
    for vector in &device.interrupts {
        if let VectorEntry::Handler { name, weak, .. } = &vector.entry {
            declare(out, symbols, &handler_symbol(name), *weak)?;
        }
    }
    Ok(())
}

fn cell(out: &mut String, value: &str, index: &str, caption: &str) {
    let comment = format!("{:>4} {}", index, comment_text(caption));
    out.push_str(&format!("    {:<40} /* {} */\n", format!("{},", value), comment.trim_end()));
}

fn device_cells(device: &Device, out: &mut String) {
    for vector in &device.interrupts {
        match &vector.entry {
            VectorEntry::Handler { name, caption, .. } => {
                cell(out, &handler_symbol(name), &vector.ordinal.to_string(), caption);
            }
            VectorEntry::Reserved => cell(out, "Reserved_Handler", &vector.ordinal.to_string(), "Reserved"),
        }
    }
}

fn cortex_m_vectors(device: &Device, out: &mut String) -> Result<(), GenError> {
    let mut symbols = Symbols::default();
    for builtin in CORTEX_M_BUILTIN {
        symbols.claim(*builtin)?;
    }

    out.push_str("\n/* ----- Exception and interrupt handlers ----- */\n");
    for exc in &device.exceptions {
        let symbol = handler_symbol(&exc.name);
        if exc.number == 1 || exc.number == HARD_FAULT {
            continue;
        }
        declare(out, &mut symbols, &symbol, true)?;
    }
    declare_device_handlers(device, out, &mut symbols)?;

    let cells = 1 + usize::from(CORTEX_M_SYSTEM_SLOTS) + device.interrupts.len();
    out.push_str("\n/* ----- Vector table ----- */\n");
    out.push_str(&format!(
        "const VECTOR_TABLE_Type __VECTOR_TABLE[{}] __attribute__((used, retain, section(\".vectors\"))) =\n{{\n",
        cells,
    ));
    cell(out, "(VECTOR_TABLE_Type)&__StackTop", "", "Initial Stack Pointer");

    for number in 1..=CORTEX_M_SYSTEM_SLOTS {
        let index = format!("{}", i32::from(number) - 16);
        let exc = device.exceptions.iter().find(|e| e.number == number);
        match (number, exc) {
            (1, _) => cell(out, "Reset_Handler", &index, "Reset Handler"),
            (HARD_FAULT, e) => cell(out, "HardFault_Handler", &index, e.map_or("Hard Fault Handler", |e| e.caption.as_str())),
            (_, Some(e)) => cell(out, &handler_symbol(&e.name), &index, &e.caption),
            (_, None) => cell(out, "0", &index, "Reserved"),
        }
    }
    device_cells(device, out);
    out.push_str("};\n");
    Ok(())
}

fn irq_table(device: &Device, out: &mut String) -> Result<(), GenError> {
    let mut symbols = Symbols::default();
    for builtin in CORTEX_A_BUILTIN {
        symbols.claim(*builtin)?;
    }

    out.push_str("\n/* ----- Peripheral interrupt handlers ----- */\n");
    declare_device_handlers(device, out, &mut symbols)?;

    if device.interrupts.is_empty() {
        out.push_str(templates::STARTUP_A_IRQ_DEFAULT);
        return Ok(());
    }

    let count = device.interrupts.len().to_string();
    out.push_str("\n/* Peripheral handlers indexed by peripheral ID. */\n");
    out.push_str(&format!(
        "const IRQ_HANDLER_Type __IRQ_TABLE[{}] __attribute__((used, retain)) =\n{{\n",
        count,
    ));
    device_cells(device, out);
    out.push_str("};\n");
    out.push_str(&fill(templates::STARTUP_A_IRQ_DISPATCH, &[("COUNT", &count)]));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fixtures::*;
    use crate::device::{CoreArch, InterruptVector};
    use crate::parser::tests::sample;

    /// The initializer cells of a table, as `(value, index)` pairs.
    fn cells(src: &str, table: &str) -> Vec<(String, String)> {
        let start = src.find(table).unwrap();
        src[start..].lines()
            .skip(2)
            .take_while(|l| *l != "};")
            .map(|l| {
                let (value, comment) = l.split_once(',').unwrap();
                let index = comment.trim().trim_start_matches("/*").split_whitespace().next().unwrap_or("");
                (value.trim().to_string(), index.to_string())
            })
            .collect()
    }

    #[test]
    fn cortex_m_table_follows_ordinals() {
        let src = generate(&sample(), &GenOptions::default()).unwrap();
        assert!(src.contains("#include <proc/samtest1a.h>"));
        assert!(src.contains("__VECTOR_TABLE[20]"));

        let table = cells(&src, "__VECTOR_TABLE[");
        assert_eq!(table.len(), 20);
        assert_eq!(table[0].0, "(VECTOR_TABLE_Type)&__StackTop");
        assert_eq!(table[1], ("Reset_Handler".to_string(), "-15".to_string()));
        assert_eq!(table[2], ("NonMaskableInt_Handler".to_string(), "-14".to_string()));
        assert_eq!(table[3].0, "HardFault_Handler");
        assert_eq!(table[4].0, "0");
        assert_eq!(table[15], ("SysTick_Handler".to_string(), "-1".to_string()));

        let device_part = table[16..].iter().map(|(v, i)| format!("{}@{}", v, i)).collect::<Vec<_>>();
        assert_eq!(device_part, ["PM_Handler@0", "Reserved_Handler@1", "UART0_Handler@2", "UART1_Handler@3"]);
    }

    #[test]
    fn handlers_are_weak_unless_marked_otherwise() {
        let src = generate(&sample(), &GenOptions::default()).unwrap();
        assert!(src.contains("void PM_Handler(void) __attribute__((weak, alias(\"Default_Handler_Jump\")));\n"));
        assert!(src.contains("void SysTick_Handler(void) __attribute__((weak, alias(\"Default_Handler_Jump\")));\n"));
        assert!(src.contains("\nvoid UART1_Handler(void);\n"));
        assert!(!src.contains("void HardFault_Handler(void) __attribute__((weak, alias"));
        assert!(!src.contains("RESERVED1"));
    }

    #[test]
    fn handler_names_cannot_shadow_builtins() {
        let mut dev = device();
        dev.interrupts.push(handler(3, "Default"));
        assert_eq!(generate(&dev, &GenOptions::default()), Err(GenError::SymbolCollision {
            symbol: "Default_Handler".to_string(),
        }));
    }

    #[test]
    fn cortex_a_gets_an_irq_table() {
        let mut dev = device();
        dev.core = CoreArch::CortexA5;
        dev.cpu = "cortex-a5".to_string();
        dev.exceptions.clear();

        let src = generate(&dev, &GenOptions::default()).unwrap();
        assert!(src.contains("ldr pc, =Reset_Handler"));
        assert!(!src.contains("__VECTOR_TABLE"));
        let table = cells(&src, "__IRQ_TABLE[3]");
        let values = table.iter().map(|(v, _)| v.as_str()).collect::<Vec<_>>();
        assert_eq!(values, ["PM_Handler", "Reserved_Handler", "UART0_Handler"]);
        assert!(src.contains("if(id < 3)\n        __IRQ_TABLE[id]();"));
        assert_eq!(src.matches("IRQ_Handler(void)\n").count(), 1);

        dev.interrupts.clear();
        let src = generate(&dev, &GenOptions::default()).unwrap();
        assert!(!src.contains("IRQ_HANDLER_Type __IRQ_TABLE"));
        assert!(!src.contains("__IRQ_TABLE[id]"));
        assert!(src.contains("IRQ_Handler(void)\n{\n    Default_Handler();\n}"));
    }

    #[test]
    fn unsupported_core_is_refused() {
        let mut dev = device();
        dev.core = CoreArch::Unsupported;
        assert!(matches!(generate(&dev, &GenOptions::default()), Err(GenError::UnsupportedCore { .. })));
    }

    #[test]
    fn reserved_device_vectors_keep_their_slot() {
        let mut dev = device();
        dev.interrupts = vec![
            InterruptVector { ordinal: 0, entry: VectorEntry::Reserved },
            handler(1, "LATE"),
        ];
        let src = generate(&dev, &GenOptions::default()).unwrap();
        let table = cells(&src, "__VECTOR_TABLE[18]");
        assert_eq!(table[16].0, "Reserved_Handler");
        assert_eq!(table[17], ("LATE_Handler".to_string(), "1".to_string()));
    }
}
