// SPDX-License-Identifier: GPL-3.0-or-later

//! Reads one ATDF description document into a `Device`.
//!
//! Parsing is a pure function of the document bytes. Layouts declared under `<modules>` are
//! collected first, then the device's peripheral instances are resolved against them, so a
//! reference that names a missing layout fails the whole document.

mod layout;
pub mod xml;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::device::{
    self, CoreArch, Device, Features, Fpu, GroupInstance, InterruptVector, InvariantError,
    MacroDef, MemorySegment, Module, Peripheral, SegmentAccess, SegmentKind, SystemException,
    VectorEntry,
};
use xml::{Element, Encoding};

pub use xml::MAX_DOCUMENT_SIZE;

lazy_static! {
    static ref TRAILING_DIGITS: Regex = Regex::new(r"([0-9]+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{0}")]
    Io(String),

    #[error("document is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("unsupported or invalid encoding: {0}")]
    Encoding(String),

    #[error("document contains a DTD, which is not accepted")]
    DtdRefused,

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("{path}: missing <{element}> element")]
    MissingElement { path: String, element: String },

    #[error("{path}: missing attribute \"{attribute}\"")]
    MissingAttribute { path: String, attribute: String },

    #[error("{path}: {attribute}=\"{value}\" is not a number")]
    BadNumber { path: String, attribute: String, value: String },

    #[error("{path}: {attribute}=\"{value}\" is out of range")]
    OutOfRange { path: String, attribute: String, value: String },

    #[error("{path}: {attribute}=\"{value}\" {reason}")]
    InvalidValue { path: String, attribute: String, value: String, reason: String },

    #[error("{path}: {kind} {name} is not defined")]
    UnresolvedReference { path: String, kind: &'static str, name: String },

    #[error("{path}: {source}")]
    Invariant { path: String, source: InvariantError },
}

impl ParseError {
    /// Stable reason code for reports.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ParseError::Io(_) => "io",
            ParseError::TooLarge { .. } => "too-large",
            ParseError::Encoding(_) => "encoding",
            ParseError::DtdRefused => "dtd-refused",
            ParseError::Xml(_) => "xml",
            ParseError::MissingElement { .. } => "missing-element",
            ParseError::MissingAttribute { .. } => "missing-attribute",
            ParseError::BadNumber { .. } => "bad-number",
            ParseError::OutOfRange { .. } => "out-of-range",
            ParseError::InvalidValue { .. } => "invalid-value",
            ParseError::UnresolvedReference { .. } => "unresolved-reference",
            ParseError::Invariant { .. } => "invariant",
        }
    }
}

/// Reads and parses one document, refusing files above the size limit before reading them.
pub fn parse_file(path: &Path) -> Result<Device, ParseError> {
    let io_error = |e: std::io::Error| ParseError::Io(format!("{}: {}", path.display(), e));

    let size = std::fs::metadata(path).map_err(io_error)?.len();
    if size > MAX_DOCUMENT_SIZE as u64 {
        return Err(ParseError::TooLarge { size, limit: MAX_DOCUMENT_SIZE as u64 });
    }

    let bytes = std::fs::read(path).map_err(io_error)?;
    parse_document(&bytes, None)
}

pub fn parse_document(bytes: &[u8], encoding: Option<Encoding>) -> Result<Device, ParseError> {
    let text = xml::decode(bytes, encoding)?;
    let doc = xml::parse_xml(&text)?;
    let root = Element::new(doc.root_element());

    if root.tag() != "avr-tools-device-file" {
        return Err(ParseError::MissingElement { path: "/".to_string(), element: "avr-tools-device-file".to_string() });
    }

    let device_el = root.required_child("devices")?.required_child("device")?;
    if root.required_child("devices")?.children("device").count() > 1 {
        warn!("{}: more than one <device>, using the first", device_el.path());
    }

    let modules = root.nested("modules", "module").into_iter()
        .map(layout::parse_module)
        .collect::<Result<Vec<_>, _>>()?;
    check_unique_modules(&modules, root)?;

    DeviceBuilder { root, device_el, modules }.build()
}

fn check_unique_modules(modules: &[Module], root: Element) -> Result<(), ParseError> {
    let mut seen = HashSet::new();
    for m in modules {
        if !seen.insert(m.name.as_str()) {
            return Err(ParseError::Invariant {
                path: format!("{}/modules", root.path()),
                source: InvariantError::DuplicateName {
                    kind: "module", scope: "modules".to_string(), name: m.name.clone(),
                },
            });
        }
    }
    Ok(())
}

/// Name without the Atmel "AT" prefix on SAM parts: "ATSAME54P20A" becomes "SAME54P20A".
pub fn device_name(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("ATSAM") => &raw[2..],
        _ => raw,
    }
}

struct DeviceBuilder<'a, 'input> {
    root: Element<'a, 'input>,
    device_el: Element<'a, 'input>,
    modules: Vec<Module>,
}

impl<'a, 'input> DeviceBuilder<'a, 'input> {
    fn build(self) -> Result<Device, ParseError> {
        let el = self.device_el;

        let raw_name = el.required_attr("name")?;
        let name = device_name(raw_name).to_string();
        if !crate::util::is_c_identifier(&name) {
            return Err(el.invalid("name", raw_name, "is not a valid C identifier"));
        }

        let cpu = el.required_attr("architecture")?.trim().to_ascii_lowercase();
        let core = CoreArch::from_cpu_name(&cpu);

        let (segments, spaces) = self.segments()?;
        let aliases = device::validate::check_segments(&segments)
            .map_err(|source| ParseError::Invariant { path: format!("{}/address-spaces", el.path()), source })?;
        for alias in &aliases {
            debug!("{}: memory segment {} lies within {} ({:?})", name, alias.segment, alias.within, alias.kind);
        }

        let macros = params(el.nested("parameters", "param"))?;
        let mut properties = BTreeMap::new();
        for group in el.children("property-groups").flat_map(|pg| pg.children("property-group").collect::<Vec<_>>()) {
            for (k, v) in params(group.children("property").collect())? {
                if properties.contains_key(&k) {
                    trace!("{}: property {} repeated in group {}, keeping the first", name, k, group.text_attr("name"));
                    continue;
                }
                properties.insert(k, v);
            }
        }

        let features = features(core, &macros);
        let peripherals = self.peripherals(&spaces)?;
        let (exceptions, interrupts) = self.interrupts()?;

        let device = Device {
            name,
            family: el.text_attr("family"),
            series: el.text_attr("series"),
            cpu,
            core,
            features,
            pin_count: self.pin_count()?,
            segments,
            aliases,
            modules: self.modules,
            peripherals,
            exceptions,
            interrupts,
            macros,
            properties,
        };

        device.validate().map_err(|source| ParseError::Invariant { path: el.path(), source })?;

        for p in &device.peripherals {
            if device.segment_at(p.base_address).map(|s| s.kind) != Some(SegmentKind::Peripheral) {
                trace!("{}: peripheral {} at {:#x} is outside any io segment", device.name, p.name, p.base_address);
            }
        }

        Ok(device)
    }

    /// Memory segments with absolute addresses, and the start address of every address space.
    fn segments(&self) -> Result<(Vec<MemorySegment>, HashMap<String, u64>), ParseError> {
        let mut segments = vec![];
        let mut spaces = HashMap::new();

        for space in self.device_el.nested("address-spaces", "address-space") {
            let space_start = space.u64_attr("start")?.unwrap_or(0);
            if let Some(id) = space.attr("id") {
                spaces.insert(id.trim().to_string(), space_start);
            }

            for seg in space.children("memory-segment") {
                let name = seg.identifier("name")?;
                let kind = SegmentKind::from_type(&seg.text_attr("type"));
                let external = seg.bool_attr("external")?.unwrap_or(false);

                let raw_start = seg.required_attr("start")?;
                let start = space_start.checked_add(seg.required_u64("start")?)
                    .ok_or_else(|| seg.out_of_range("start", raw_start))?;
                let size = seg.required_u64("size")?;
                if start.checked_add(size).is_none() {
                    return Err(seg.out_of_range("size", &seg.text_attr("size")));
                }

                let access = match seg.attr("rw").map(str::trim).filter(|s| !s.is_empty()) {
                    Some(rw) => rw_access(seg, rw)?,
                    None => default_access(kind),
                };

                segments.push(MemorySegment {
                    name,
                    start,
                    size,
                    kind,
                    access: SegmentAccess {
                        cacheable: matches!(kind, SegmentKind::Flash | SegmentKind::Ram) && !external,
                        ..access
                    },
                    external,
                    page_size: seg.u64_attr("pagesize")?,
                });
            }
        }
        Ok((segments, spaces))
    }

    fn layout_module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    fn peripherals(&self, spaces: &HashMap<String, u64>) -> Result<Vec<Peripheral>, ParseError> {
        let mut peripherals = vec![];

        for module_el in self.device_el.nested("peripherals", "module") {
            let module_name = module_el.identifier("name")?;
            let module = self.layout_module(&module_name);

            for inst in module_el.children("instance") {
                let name = inst.identifier("name")?;
                let mut groups = vec![];

                for group_el in inst.children("register-group") {
                    let module = module.ok_or_else(|| ParseError::UnresolvedReference {
                        path: module_el.path(),
                        kind: "module",
                        name: module_name.clone(),
                    })?;

                    let layout_name = match group_el.attr("name-in-module") {
                        Some(_) => group_el.identifier("name-in-module")?,
                        None => group_el.identifier("name")?,
                    };
                    let layout = module.group(&layout_name).ok_or_else(|| ParseError::UnresolvedReference {
                        path: group_el.path(),
                        kind: "register-group",
                        name: layout_name.clone(),
                    })?;

                    let base = match group_el.attr("address-space").map(str::trim) {
                        None | Some("") => 0,
                        Some(id) => *spaces.get(id).ok_or_else(|| ParseError::UnresolvedReference {
                            path: group_el.path(),
                            kind: "address-space",
                            name: id.to_string(),
                        })?,
                    };
                    let offset = group_el.required_u64("offset")?;
                    let base_address = base.checked_add(offset)
                        .ok_or_else(|| group_el.out_of_range("offset", &group_el.text_attr("offset")))?;

                    groups.push(GroupInstance {
                        name: match group_el.attr("name") {
                            Some(_) => group_el.identifier("name")?,
                            None => name.clone(),
                        },
                        base_address,
                        layout: layout.clone(),
                    });
                }

                let base_address = match groups.iter().map(|g| g.base_address).min() {
                    Some(addr) => addr,
                    None => {
                        debug!("{}: instance {} has no registers, skipped", module_name, name);
                        continue;
                    }
                };

                peripherals.push(Peripheral {
                    name,
                    module: module_name.clone(),
                    base_address,
                    groups,
                    params: params(inst.nested("parameters", "param"))?,
                });
            }
        }
        Ok(peripherals)
    }

    fn interrupts(&self) -> Result<(Vec<SystemException>, Vec<InterruptVector>), ParseError> {
        let mut exceptions = BTreeMap::new();
        let mut vectors = BTreeMap::new();
        let path = format!("{}/interrupts", self.device_el.path());

        for irq in self.device_el.nested("interrupts", "interrupt") {
            let index = irq.required_i64("index")?;
            let reserved = irq.bool_attr("reserved")?.unwrap_or(false);

            if (-15..=-1).contains(&index) {
                let number = (16 + index) as u8;
                let exception = SystemException {
                    number,
                    name: irq.identifier("name")?,
                    caption: irq.text_attr("caption"),
                };
                if exceptions.insert(number, exception).is_some() {
                    return Err(ParseError::Invariant { path, source: InvariantError::DuplicateException(number) });
                }
                continue;
            }

            let ordinal = u32::try_from(index)
                .map_err(|_| irq.out_of_range("index", &index.to_string()))?;
            let entry = if reserved {
                VectorEntry::Reserved
            } else {
                VectorEntry::Handler {
                    name: irq.identifier("name")?,
                    caption: irq.text_attr("caption"),
                    module_instance: irq.attr("module-instance").map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                    weak: irq.bool_attr("weak")?.unwrap_or(true),
                }
            };
            if vectors.insert(ordinal, InterruptVector { ordinal, entry }).is_some() {
                return Err(ParseError::Invariant { path, source: InvariantError::DuplicateVector(ordinal) });
            }
        }

        let interrupts = vectors.into_values().collect::<Vec<_>>();
        device::validate::check_vectors(&interrupts)
            .map_err(|source| ParseError::Invariant { path, source })?;

        Ok((exceptions.into_values().collect(), interrupts))
    }

    /// Smallest pin count among the package variants, from the trailing number of the package name.
    fn pin_count(&self) -> Result<Option<u32>, ParseError> {
        let mut min = None;
        for variant in self.root.nested("variants", "variant") {
            let package = variant.text_attr("package");
            if let Some(digits) = TRAILING_DIGITS.captures(&package).and_then(|c| c.get(1)) {
                let pins = digits.as_str().parse::<u32>()
                    .map_err(|_| variant.out_of_range("package", &package))?;
                min = Some(min.map_or(pins, |m: u32| m.min(pins)));
            }
        }
        Ok(min)
    }
}

fn params(elements: Vec<Element>) -> Result<BTreeMap<String, MacroDef>, ParseError> {
    let mut out = BTreeMap::new();
    for p in elements {
        let name = p.identifier("name")?;
        let def = MacroDef { value: p.safe_value("value")?, caption: p.text_attr("caption") };
        if let Some(prev) = out.get(&name) {
            if prev != &def {
                return Err(p.invalid("name", &name, "is defined twice with different values"));
            }
        }
        out.insert(name, def);
    }
    Ok(out)
}

fn rw_access(seg: Element, rw: &str) -> Result<SegmentAccess, ParseError> {
    let upper = rw.to_ascii_uppercase();
    if !upper.chars().all(|c| matches!(c, 'R' | 'W' | 'X')) {
        return Err(seg.invalid("rw", rw, "is not a combination of R, W and X"));
    }
    Ok(SegmentAccess {
        readable: upper.contains('R'),
        writable: upper.contains('W'),
        executable: upper.contains('X'),
        cacheable: false,
    })
}

fn default_access(kind: SegmentKind) -> SegmentAccess {
    let (writable, executable) = match kind {
        SegmentKind::Flash => (false, true),
        SegmentKind::Ram => (true, true),
        SegmentKind::Peripheral => (true, false),
        SegmentKind::Reserved => (false, false),
    };
    SegmentAccess { readable: true, writable, executable, cacheable: false }
}

fn macro_flag(macros: &BTreeMap<String, MacroDef>, name: &str) -> bool {
    macros.get(name)
        .and_then(|m| crate::util::parse_u64(m.value.trim_end_matches(|c| c == 'U' || c == 'u')).ok())
        .map_or(false, |v| v != 0)
}

fn features(core: CoreArch, macros: &BTreeMap<String, MacroDef>) -> Features {
    let fpu = match (macro_flag(macros, "__FPU_PRESENT"), macro_flag(macros, "__FPU_DP")) {
        (_, true) => Fpu::Double,
        (true, false) => Fpu::Single,
        (false, false) => Fpu::None,
    };
    Features {
        fpu,
        icache: macro_flag(macros, "__ICACHE_PRESENT"),
        dcache: macro_flag(macros, "__DCACHE_PRESENT"),
        mpu: macro_flag(macros, "__MPU_PRESENT"),
        mmu: core.is_legacy_a() && core != CoreArch::Arm926EjS,
        trustzone: macro_flag(macros, "__SAUREGION_PRESENT") || core.has_cmse(),
    }
}

/// Names a unit by its file stem when it fails before the device name is known.
pub fn unit_label(path: &Path) -> String {
    match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}
