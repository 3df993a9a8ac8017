// SPDX-License-Identifier: GPL-3.0-or-later

//! The resolved, immutable model of one device. Only the parser builds these; generators read
//! them.

pub(crate) mod validate;

pub use validate::InvariantError;

use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoreArch {
    CortexM0,
    CortexM0Plus,
    CortexM1,
    CortexM3,
    CortexM4,
    CortexM7,
    CortexM23,
    CortexM33,
    CortexM35P,
    CortexM52,
    CortexM55,
    CortexM85,
    CortexA5,
    CortexA7,
    CortexA9,
    Arm926EjS,
    Unsupported,
}

impl CoreArch {
    /// Maps the vendor's `architecture` attribute, e.g. "CORTEX-M4" or "ARM926EJ-S".
    pub fn from_cpu_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "cortex-m0" => Self::CortexM0,
            "cortex-m0plus" | "cortex-m0+" => Self::CortexM0Plus,
            "cortex-m1" => Self::CortexM1,
            "cortex-m3" => Self::CortexM3,
            "cortex-m4" => Self::CortexM4,
            "cortex-m7" => Self::CortexM7,
            "cortex-m23" => Self::CortexM23,
            "cortex-m33" => Self::CortexM33,
            "cortex-m35p" | "cortex-m35" => Self::CortexM35P,
            "cortex-m52" => Self::CortexM52,
            "cortex-m55" => Self::CortexM55,
            "cortex-m85" => Self::CortexM85,
            "cortex-a5" => Self::CortexA5,
            "cortex-a7" => Self::CortexA7,
            "cortex-a9" => Self::CortexA9,
            "arm926ej-s" | "arm926ejs" | "arm9" => Self::Arm926EjS,
            _ => Self::Unsupported,
        }
    }

    pub fn cpu_name(self) -> &'static str {
        match self {
            Self::CortexM0 => "cortex-m0",
            Self::CortexM0Plus => "cortex-m0plus",
            Self::CortexM1 => "cortex-m1",
            Self::CortexM3 => "cortex-m3",
            Self::CortexM4 => "cortex-m4",
            Self::CortexM7 => "cortex-m7",
            Self::CortexM23 => "cortex-m23",
            Self::CortexM33 => "cortex-m33",
            Self::CortexM35P => "cortex-m35p",
            Self::CortexM52 => "cortex-m52",
            Self::CortexM55 => "cortex-m55",
            Self::CortexM85 => "cortex-m85",
            Self::CortexA5 => "cortex-a5",
            Self::CortexA7 => "cortex-a7",
            Self::CortexA9 => "cortex-a9",
            Self::Arm926EjS => "arm926ej-s",
            Self::Unsupported => "unsupported",
        }
    }

    /// The ISA name as the compiler's `-march` wants it.
    pub fn arch(self) -> Option<&'static str> {
        Some(match self {
            Self::CortexM0 | Self::CortexM0Plus | Self::CortexM1 => "armv6m",
            Self::CortexM3 => "armv7m",
            Self::CortexM4 | Self::CortexM7 => "armv7em",
            Self::CortexM23 => "armv8m.base",
            Self::CortexM33 | Self::CortexM35P => "armv8m.main",
            Self::CortexM52 | Self::CortexM55 | Self::CortexM85 => "armv8.1m.main",
            Self::CortexA5 | Self::CortexA7 | Self::CortexA9 => "armv7-a",
            Self::Arm926EjS => "armv5te",
            Self::Unsupported => return None,
        })
    }

    pub fn is_cortex_m(self) -> bool {
        self < Self::CortexA5
    }

    pub fn is_legacy_a(self) -> bool {
        matches!(self, Self::CortexA5 | Self::CortexA7 | Self::CortexA9 | Self::Arm926EjS)
    }

    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }

    /// Armv8-M cores carry the Cortex-M Security Extensions.
    pub fn has_cmse(self) -> bool {
        matches!(self.arch(), Some(a) if a.starts_with("armv8"))
    }

    /// Name of the CMSIS core header for this core.
    pub fn core_header(self) -> Option<String> {
        if self.is_cortex_m() {
            let suffix = self.cpu_name().strip_prefix("cortex-m")?;
            Some(format!("core_cm{}.h", suffix))
        } else if matches!(self, Self::CortexA5 | Self::CortexA7 | Self::CortexA9) {
            Some("core_ca.h".to_string())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fpu {
    None,
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub fpu: Fpu,
    pub icache: bool,
    pub dcache: bool,
    pub mpu: bool,
    pub mmu: bool,
    pub trustzone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Flash,
    Ram,
    Peripheral,
    Reserved,
}

impl SegmentKind {
    pub fn from_type(ty: &str) -> Self {
        match ty.to_ascii_lowercase().as_str() {
            "flash" => Self::Flash,
            "ram" => Self::Ram,
            "io" => Self::Peripheral,
            _ => Self::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentAccess {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub cacheable: bool,
}

impl SegmentAccess {
    /// Linker-script attribute letters, e.g. "rx".
    pub fn attributes(&self) -> String {
        let mut s = String::new();
        if self.readable { s.push('r'); }
        if self.writable { s.push('w'); }
        if self.executable { s.push('x'); }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySegment {
    pub name: String,
    pub start: u64,
    pub size: u64,
    pub kind: SegmentKind,
    pub access: SegmentAccess,
    pub external: bool,
    pub page_size: Option<u64>,
}

impl MemorySegment {
    /// One past the last byte. The parser rejects segments for which this would overflow.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    pub fn overlaps(&self, other: &MemorySegment) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end()
    }

    pub fn is_memory(&self) -> bool {
        self.kind != SegmentKind::Peripheral
    }

    pub fn is_exec_or_writable(&self) -> bool {
        self.access.executable || self.access.writable
    }

    pub fn encloses(&self, other: &MemorySegment) -> bool {
        self.start <= other.start && other.end() <= self.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    /// Memory mapped over peripheral address space.
    Peripheral,
    /// Memory wholly inside a bigger segment of the same kind and access, such as a trace buffer
    /// window carved out of SRAM.
    SubRegion,
    /// Read-only memory, such as a boot ROM, mapped over executable or writable memory.
    ReadOnlyOverlay,
    /// A peripheral window inside a bigger one, such as a bridge inside the peripheral space.
    PeripheralWindow,
}

/// An overlap the model allows but records: `segment` lies over `within`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentAlias {
    pub segment: String,
    pub within: String,
    pub kind: AliasKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum RegisterWidth {
    W8 = 1,
    W16 = 2,
    W32 = 4,
    W64 = 8,
}

impl RegisterWidth {
    pub fn bytes(self) -> u64 {
        self as u64
    }

    pub fn bits(self) -> u32 {
        self as u32 * 8
    }

    pub fn c_type(self) -> &'static str {
        match self {
            Self::W8 => "uint8_t",
            Self::W16 => "uint16_t",
            Self::W32 => "uint32_t",
            Self::W64 => "uint64_t",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub value: u64,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    pub name: String,
    pub caption: String,
    pub offset: u32,
    pub width: u32,
    /// Register modes this field exists in. Empty means all of them.
    pub modes: Vec<String>,
    pub values: Vec<EnumValue>,
}

impl Bitfield {
    pub fn mask(&self) -> u64 {
        let ones = if self.width >= 64 { u64::MAX } else { (1u64 << self.width) - 1 };
        ones << self.offset
    }

    pub fn end(&self) -> u32 {
        self.offset + self.width
    }

    pub fn shares_mode_with(&self, other: &Bitfield) -> bool {
        modes_intersect(&self.modes, &other.modes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub caption: String,
    pub offset: u64,
    pub width: RegisterWidth,
    pub access: RegisterAccess,
    pub reset_value: u64,
    /// Array length; 1 for a plain register.
    pub count: u64,
    pub modes: Vec<String>,
    /// Ordered by ascending bit offset.
    pub fields: Vec<Bitfield>,
}

/// A register group nested inside another one, such as the per-port groups of a PORT module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgroupRef {
    pub name: String,
    pub layout: String,
    pub caption: String,
    pub offset: u64,
    pub size: u64,
    pub count: u64,
    pub modes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMember {
    Register(Register),
    Subgroup(SubgroupRef),
}

impl GroupMember {
    pub fn name(&self) -> &str {
        match self {
            GroupMember::Register(r) => &r.name,
            GroupMember::Subgroup(g) => &g.name,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            GroupMember::Register(r) => r.offset,
            GroupMember::Subgroup(g) => g.offset,
        }
    }

    pub fn element_size(&self) -> u64 {
        match self {
            GroupMember::Register(r) => r.width.bytes(),
            GroupMember::Subgroup(g) => g.size,
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            GroupMember::Register(r) => r.count,
            GroupMember::Subgroup(g) => g.count,
        }
    }

    /// Bytes covered by the member, arrays included. The parser guarantees no overflow.
    pub fn span(&self) -> u64 {
        self.element_size().saturating_mul(self.count())
    }

    pub fn modes(&self) -> &[String] {
        match self {
            GroupMember::Register(r) => &r.modes,
            GroupMember::Subgroup(g) => &g.modes,
        }
    }

    /// True if the member is part of the given view of its group (`None` is the mode-less view).
    pub fn in_view(&self, mode: Option<&str>) -> bool {
        match mode {
            None => true,
            Some(m) => self.modes().is_empty() || self.modes().iter().any(|x| x == m),
        }
    }
}

/// A register layout defined once per module and shared by all of the module's instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterGroup {
    pub name: String,
    pub caption: String,
    pub size: u64,
    pub modes: Vec<String>,
    /// Ordered by ascending offset.
    pub members: Vec<GroupMember>,
}

impl RegisterGroup {
    /// Mode views of this group: one per declared mode, or the single mode-less view.
    pub fn views(&self) -> Vec<Option<&str>> {
        if self.modes.is_empty() {
            vec![None]
        } else {
            self.modes.iter().map(|m| Some(m.as_str())).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub id: String,
    pub version: String,
    pub caption: String,
    pub groups: Vec<Arc<RegisterGroup>>,
}

impl Module {
    pub fn group(&self, name: &str) -> Option<&Arc<RegisterGroup>> {
        self.groups.iter().find(|g| g.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInstance {
    pub name: String,
    pub base_address: u64,
    pub layout: Arc<RegisterGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peripheral {
    pub name: String,
    pub module: String,
    pub base_address: u64,
    pub groups: Vec<GroupInstance>,
    pub params: BTreeMap<String, MacroDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorEntry {
    Handler {
        name: String,
        caption: String,
        module_instance: Option<String>,
        weak: bool,
    },
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptVector {
    pub ordinal: u32,
    pub entry: VectorEntry,
}

impl InterruptVector {
    pub fn handler_name(&self) -> Option<&str> {
        match &self.entry {
            VectorEntry::Handler { name, .. } => Some(name),
            VectorEntry::Reserved => None,
        }
    }
}

/// An architectural Cortex-M exception (NMI, HardFault, SysTick, ...) by exception number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemException {
    pub number: u8,
    pub name: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub value: String,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub family: String,
    pub series: String,
    pub cpu: String,
    pub core: CoreArch,
    pub features: Features,
    pub pin_count: Option<u32>,
    /// In document order.
    pub segments: Vec<MemorySegment>,
    pub aliases: Vec<SegmentAlias>,
    pub modules: Vec<Module>,
    pub peripherals: Vec<Peripheral>,
    /// Ordered by exception number.
    pub exceptions: Vec<SystemException>,
    /// Dense from ordinal 0.
    pub interrupts: Vec<InterruptVector>,
    pub macros: BTreeMap<String, MacroDef>,
    pub properties: BTreeMap<String, MacroDef>,
}

impl Device {
    /// Segment containing `addr`, preferring peripheral-mapped ones.
    pub fn segment_at(&self, addr: u64) -> Option<&MemorySegment> {
        let mut slots = self.segments.iter().collect::<Vec<_>>();
        slots.sort_by_key(|s| (s.start, s.is_memory()));

        let index = slots.binary_search_by_key(&addr, |s| s.start)
            .map_or_else(|e| e.checked_sub(1), Some);

        index.and_then(|i| {
            slots[..=i].iter().rev()
                .filter(|s| s.contains(addr))
                .min_by_key(|s| s.is_memory())
                .copied()
        })
    }

    /// Whether `segment` only re-maps part of another memory segment, which then owns the range.
    pub fn is_sub_region(&self, segment: &str) -> bool {
        self.aliases.iter().any(|a| {
            matches!(a.kind, AliasKind::SubRegion | AliasKind::ReadOnlyOverlay) && a.segment == segment
        })
    }

    pub fn validate(&self) -> Result<(), InvariantError> {
        validate::check_device(self)
    }
}

pub(crate) fn modes_intersect(a: &[String], b: &[String]) -> bool {
    a.is_empty() || b.is_empty() || a.iter().any(|m| b.contains(m))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn segment(name: &str, start: u64, size: u64, kind: SegmentKind, rwx: &str) -> MemorySegment {
        MemorySegment {
            name: name.to_string(),
            start,
            size,
            kind,
            access: SegmentAccess {
                readable: rwx.contains('r'),
                writable: rwx.contains('w'),
                executable: rwx.contains('x'),
                cacheable: matches!(kind, SegmentKind::Flash | SegmentKind::Ram),
            },
            external: false,
            page_size: None,
        }
    }

    pub fn field(name: &str, offset: u32, width: u32) -> Bitfield {
        Bitfield {
            name: name.to_string(),
            caption: String::new(),
            offset,
            width,
            modes: vec![],
            values: vec![],
        }
    }

    pub fn register(name: &str, offset: u64, fields: Vec<Bitfield>) -> Register {
        Register {
            name: name.to_string(),
            caption: String::new(),
            offset,
            width: RegisterWidth::W32,
            access: RegisterAccess::ReadWrite,
            reset_value: 0,
            count: 1,
            modes: vec![],
            fields,
        }
    }

    pub fn handler(ordinal: u32, name: &str) -> InterruptVector {
        InterruptVector {
            ordinal,
            entry: VectorEntry::Handler {
                name: name.to_string(),
                caption: String::new(),
                module_instance: None,
                weak: true,
            },
        }
    }

    /// A small Cortex-M4 device with one UART.
    pub fn device() -> Device {
        let uart = Arc::new(RegisterGroup {
            name: "UART".to_string(),
            caption: "UART registers".to_string(),
            size: 0x10,
            modes: vec![],
            members: vec![
                GroupMember::Register(register("CTRL", 0x0, vec![field("EN", 0, 4), field("MODE", 4, 4)])),
                GroupMember::Register(Register {
                    access: RegisterAccess::ReadOnly,
                    ..register("STATUS", 0x4, vec![field("RDY", 0, 1)])
                }),
            ],
        });

        Device {
            name: "TEST1".to_string(),
            family: "TST".to_string(),
            series: "TST1".to_string(),
            cpu: "cortex-m4".to_string(),
            core: CoreArch::CortexM4,
            features: Features {
                fpu: Fpu::Single,
                icache: false,
                dcache: false,
                mpu: true,
                mmu: false,
                trustzone: false,
            },
            pin_count: Some(64),
            segments: vec![
                segment("FLASH", 0x0, 0x4_0000, SegmentKind::Flash, "rx"),
                segment("HSRAM", 0x2000_0000, 0x2_0000, SegmentKind::Ram, "rwx"),
                segment("HPB0", 0x4000_0000, 0x1000, SegmentKind::Peripheral, "rw"),
            ],
            aliases: vec![],
            modules: vec![Module {
                name: "UART".to_string(),
                id: "U0001".to_string(),
                version: "1.0.0".to_string(),
                caption: String::new(),
                groups: vec![uart.clone()],
            }],
            peripherals: vec![Peripheral {
                name: "UART0".to_string(),
                module: "UART".to_string(),
                base_address: 0x4000_0800,
                groups: vec![GroupInstance { name: "UART0".to_string(), base_address: 0x4000_0800, layout: uart }],
                params: BTreeMap::new(),
            }],
            exceptions: vec![
                SystemException { number: 2, name: "NonMaskableInt".to_string(), caption: String::new() },
                SystemException { number: 3, name: "HardFault".to_string(), caption: String::new() },
                SystemException { number: 15, name: "SysTick".to_string(), caption: String::new() },
            ],
            interrupts: vec![
                handler(0, "PM"),
                InterruptVector { ordinal: 1, entry: VectorEntry::Reserved },
                handler(2, "UART0"),
            ],
            macros: [("__FPU_PRESENT".to_string(), MacroDef { value: "1".to_string(), caption: String::new() })]
                .into_iter().collect(),
            properties: BTreeMap::new(),
        }
    }
}
