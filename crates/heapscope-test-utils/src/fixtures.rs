//! Reusable heap, trace, and dump fixtures.
//!
//! - [`standard_heap`]: an empty heap with an eden and an old space.
//! - [`Trace`]: a builder for ordered [`HeapEvent`] sequences.
//! - [`DumpBuilder`]: writes small HPROF dumps through [`HprofWriter`].

use std::sync::Arc;

use heapscope_arena::{ArenaConfig, HeapSnapshot, LabKind, Space};
use heapscope_core::{
    Address, AllocatedType, AllocationSite, EventKind, GcId, ObjectInfo, RootKind, RootPtr,
    SiteId, SpaceId, Symbols, TypeId,
};
use heapscope_dump::{
    BasicType, ClassDump, DumpError, FieldDecl, HprofWriter, InstanceDump, LoadClass,
    ObjectArrayDump, PrimitiveArrayDump, StartThread, SubRecord,
};
use heapscope_evolution::{GcBoundary, HeapEvent};

/// Young space id.
pub const EDEN: SpaceId = SpaceId(0);
/// Tenured space id.
pub const OLD: SpaceId = SpaceId(1);
/// Base address of [`EDEN`].
pub const EDEN_BASE: u64 = 0x10_0000;
/// Base address of [`OLD`].
pub const OLD_BASE: u64 = 0x80_0000;
/// Length of each standard space.
pub const SPACE_LEN: u64 = 0x10_0000;
/// Object alignment of the standard heap.
pub const HEAP_WORD: u32 = 8;

/// Type id of the 16-byte `LItem;` type.
pub const ITEM_TYPE: TypeId = TypeId(1);
/// Type id of the `[I` filler type.
pub const INT_ARRAY_TYPE: TypeId = TypeId(2);
/// Site allocating `LItem;`.
pub const ITEM_SITE: SiteId = SiteId(1);
/// Site allocating `[I` fillers.
pub const FILLER_SITE: SiteId = SiteId(2);

/// Symbols with `LItem;` and `[I` registered.
pub fn standard_symbols() -> Symbols {
    let mut symbols = Symbols::new(true, HEAP_WORD)
        .unwrap_or_else(|e| panic!("standard symbols rejected: {e}"));
    symbols.add_type(AllocatedType {
        id: ITEM_TYPE,
        internal_name: "LItem;".into(),
        size: 16,
        pointers_per_object: Some(1),
    });
    symbols.add_type(AllocatedType {
        id: INT_ARRAY_TYPE,
        internal_name: "[I".into(),
        size: (16 << 8) | 4,
        pointers_per_object: Some(0),
    });
    symbols.add_site(AllocationSite {
        id: ITEM_SITE,
        label: "Item.<init>".into(),
        allocated_type: Some(ITEM_TYPE),
    });
    symbols.add_site(AllocationSite {
        id: FILLER_SITE,
        label: "<filler>".into(),
        allocated_type: Some(INT_ARRAY_TYPE),
    });
    symbols
}

/// An empty heap over [`standard_symbols`] with [`EDEN`] and [`OLD`].
pub fn standard_heap() -> HeapSnapshot {
    let mut heap = HeapSnapshot::new(standard_symbols(), ArenaConfig::default());
    heap.add_space(Space::new(EDEN, "eden", Address(EDEN_BASE), SPACE_LEN));
    heap.add_space(Space::new(OLD, "old", Address(OLD_BASE), SPACE_LEN));
    heap
}

/// Identity of an `LItem;` allocated by `thread`.
pub fn item_info(symbols: &Symbols, thread: &str) -> Arc<ObjectInfo> {
    let ty = symbols
        .type_by_id(ITEM_TYPE)
        .cloned()
        .unwrap_or_else(|| panic!("standard symbols lack type {ITEM_TYPE}"));
    let site = symbols
        .site_by_id(ITEM_SITE)
        .cloned()
        .unwrap_or_else(|| panic!("standard symbols lack site {ITEM_SITE}"));
    Arc::new(ObjectInfo::instance(
        thread.into(),
        EventKind::C2Fast,
        site,
        ty,
        HEAP_WORD,
    ))
}

/// Identity of an `int[length]` filler.
pub fn filler_info(symbols: &Symbols, length: u32) -> Arc<ObjectInfo> {
    let ty = symbols
        .type_by_id(INT_ARRAY_TYPE)
        .cloned()
        .unwrap_or_else(|| panic!("standard symbols lack type {INT_ARRAY_TYPE}"));
    let site = symbols
        .site_by_id(FILLER_SITE)
        .cloned()
        .unwrap_or_else(|| panic!("standard symbols lack site {FILLER_SITE}"));
    Arc::new(ObjectInfo::array(
        "gc".into(),
        EventKind::Vm,
        site,
        ty,
        length,
        HEAP_WORD,
    ))
}

// ── Trace builder ───────────────────────────────────────────────

/// Builds an ordered event sequence against the standard symbols.
///
/// Allocations without an address bump into the thread's current lab;
/// addresses given explicitly must be consecutive within one lab.
pub struct Trace {
    symbols: Symbols,
    events: Vec<HeapEvent>,
}

impl Trace {
    pub fn new() -> Self {
        Self {
            symbols: standard_symbols(),
            events: Vec::new(),
        }
    }

    /// Allocate an `LItem;` at `addr` in `space` on thread `main`.
    pub fn item(mut self, space: SpaceId, addr: u64) -> Self {
        let info = item_info(&self.symbols, "main");
        self.events.push(HeapEvent::Allocate {
            space,
            thread: "main".into(),
            kind: LabKind::Tlab,
            address: Some(Address(addr)),
            info,
            may_be_filler: false,
        });
        self
    }

    /// Allocate an `int[length]` filler at `addr` in `space`.
    pub fn filler(mut self, space: SpaceId, addr: u64, length: u32) -> Self {
        let info = filler_info(&self.symbols, length);
        self.events.push(HeapEvent::Allocate {
            space,
            thread: "gc".into(),
            kind: LabKind::Plab,
            address: Some(Address(addr)),
            info,
            may_be_filler: true,
        });
        self
    }

    /// Move the object at `from` to `to` in `to_space`.
    pub fn relocate(mut self, from: u64, to_space: SpaceId, to: u64) -> Self {
        self.events.push(HeapEvent::Move {
            from: Address(from),
            to_space,
            to: Address(to),
            thread: "gc".into(),
        });
        self
    }

    /// Point the object at `addr` at `targets`.
    pub fn pointers(mut self, addr: u64, targets: &[Option<u64>]) -> Self {
        self.events.push(HeapEvent::Pointers {
            addr: Address(addr),
            values: targets.iter().map(|t| t.map(Address)).collect(),
        });
        self
    }

    /// Add a root of `kind` to `addr`.
    pub fn root(mut self, kind: RootKind, addr: u64) -> Self {
        self.events
            .push(HeapEvent::Root(RootPtr::new(kind, Address(addr))));
        self
    }

    /// Start minor GC `id` at `time`, evacuating `spaces`.
    pub fn gc_start(mut self, id: u16, time: i64, spaces: &[SpaceId]) -> Self {
        self.events.push(
            GcBoundary::start(GcId(id), time)
                .collecting(spaces.iter().copied())
                .into(),
        );
        self
    }

    /// Start full GC `id` at `time`.
    pub fn full_gc_start(mut self, id: u16, time: i64) -> Self {
        self.events
            .push(GcBoundary::start(GcId(id), time).full().into());
        self
    }

    /// End GC `id` at `time`.
    pub fn gc_end(mut self, id: u16, time: i64) -> Self {
        self.events.push(GcBoundary::end(GcId(id), time).into());
        self
    }

    /// A GC with no survivors handling: start and end back to back.
    pub fn empty_gc(self, id: u16, time: i64) -> Self {
        self.gc_start(id, time, &[]).gc_end(id, time)
    }

    pub fn events(&self) -> &[HeapEvent] {
        &self.events
    }

    pub fn build(self) -> Vec<HeapEvent> {
        self.events
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

// ── Dump builder ────────────────────────────────────────────────

/// Builds a small HPROF dump with named classes.
///
/// Class and field names get string ids automatically. Everything is
/// written into a single heap-dump segment.
pub struct DumpBuilder {
    id_size: u32,
    strings: Vec<(u64, String)>,
    classes: Vec<LoadClass>,
    threads: Vec<StartThread>,
    records: Vec<SubRecord>,
    next_string: u64,
}

impl DumpBuilder {
    pub fn new(id_size: u32) -> Self {
        Self {
            id_size,
            strings: Vec::new(),
            classes: Vec::new(),
            threads: Vec::new(),
            records: Vec::new(),
            next_string: 1,
        }
    }

    fn string(&mut self, s: &str) -> u64 {
        let id = self.next_string;
        self.next_string += 1;
        self.strings.push((id, s.to_string()));
        id
    }

    fn load(&mut self, class_id: u64, name: &str) {
        let name_id = self.string(name);
        self.classes.push(LoadClass {
            serial: self.classes.len() as u32 + 1,
            class_id,
            stack_serial: 0,
            name_id,
        });
    }

    /// Load and dump class `name` with object-typed instance `fields`.
    pub fn class(mut self, class_id: u64, name: &str, super_id: u64, fields: &[&str]) -> Self {
        self.load(class_id, name);
        let fields = fields
            .iter()
            .map(|f| FieldDecl {
                name_id: self.string(f),
                ty: BasicType::Object,
            })
            .collect();
        self.records.push(SubRecord::Class(ClassDump {
            class_id,
            stack_serial: 0,
            super_id,
            loader_id: 0,
            signers_id: 0,
            protection_domain_id: 0,
            instance_size: 0,
            constants: vec![],
            statics: vec![],
            fields,
        }));
        self
    }

    /// Load a class by name without dumping it (array classes).
    pub fn load_class(mut self, class_id: u64, name: &str) -> Self {
        self.load(class_id, name);
        self
    }

    /// Dump an instance of `class_id` whose object fields hold `refs`.
    pub fn instance(mut self, id: u64, class_id: u64, refs: &[u64]) -> Self {
        let id_size = self.id_size;
        let data = refs
            .iter()
            .flat_map(|&r| {
                let bytes = r.to_be_bytes();
                bytes[(8 - id_size as usize)..].to_vec()
            })
            .collect();
        self.records.push(SubRecord::Instance(InstanceDump {
            id,
            stack_serial: 0,
            class_id,
            data,
        }));
        self
    }

    /// Dump an object array of `class_id`.
    pub fn object_array(mut self, id: u64, class_id: u64, elements: &[u64]) -> Self {
        self.records.push(SubRecord::ObjectArray(ObjectArrayDump {
            id,
            stack_serial: 0,
            class_id,
            elements: elements.to_vec(),
        }));
        self
    }

    /// Dump an `int[]`.
    pub fn int_array(mut self, id: u64, values: &[i32]) -> Self {
        self.records
            .push(SubRecord::PrimitiveArray(PrimitiveArrayDump::ints(id, values)));
        self
    }

    /// Add a root of `kind` to `target`.
    pub fn root(mut self, kind: RootKind, target: u64) -> Self {
        self.records.push(SubRecord::Root(RootPtr::new(kind, target)));
        self
    }

    /// Start a thread whose thread object is `object_id`.
    pub fn thread(mut self, object_id: u64, name: &str) -> Self {
        let name_id = self.string(name);
        self.threads.push(StartThread {
            serial: self.threads.len() as u32 + 1,
            object_id,
            stack_serial: 0,
            name_id,
            group_name_id: 0,
            parent_group_name_id: 0,
        });
        self
    }

    /// Write the dump.
    pub fn write(self) -> Result<Vec<u8>, DumpError> {
        let mut buf = Vec::new();
        let mut w = HprofWriter::new(&mut buf, self.id_size, 1_700_000_000_000)?;
        for (id, s) in &self.strings {
            w.write_string(*id, s)?;
        }
        for class in &self.classes {
            w.write_load_class(class)?;
        }
        for thread in &self.threads {
            w.write_start_thread(thread)?;
        }
        w.write_heap_dump_segment(&self.records)?;
        w.write_heap_dump_end()?;
        drop(w);
        Ok(buf)
    }

    /// Write the dump, panicking on failure.
    pub fn bytes(self) -> Vec<u8> {
        self.write()
            .unwrap_or_else(|e| panic!("fixture dump failed to encode: {e}"))
    }
}
