//! Benchmark profiles for the Heapscope crates.
//!
//! - [`empty_heap`] and [`bench_heap`]: an eden/old heap, optionally with
//!   eden filled by 16-byte objects
//! - [`young_gc_trace`]: one window-opening young GC promoting a fraction of eden
//! - [`linked_list_dump`]: an HPROF dump of a rooted singly linked list

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use heapscope_arena::{ArenaConfig, ArenaError, HeapSnapshot, LabKind, Space};
use heapscope_core::{
    Address, AllocatedType, AllocationSite, EventKind, GcId, ObjectInfo, RootKind, RootPtr,
    SiteId, SpaceId, Symbols, TypeId,
};
use heapscope_dump::{
    BasicType, ClassDump, DumpError, FieldDecl, HprofWriter, InstanceDump, LoadClass, SubRecord,
};
use heapscope_evolution::{GcBoundary, HeapEvent};

/// Young space.
pub const EDEN: SpaceId = SpaceId(0);
/// Tenured space.
pub const OLD: SpaceId = SpaceId(1);
/// Size of every benchmark object.
pub const OBJECT_SIZE: u64 = 16;

const EDEN_BASE: u64 = 0x1000_0000;
const OLD_BASE: u64 = 0x8000_0000;
const NODE_CLASS: u64 = 0x10;
const MAX_PER_SEGMENT: usize = 50_000;

/// Symbols with one 16-byte type, and the identity of its objects.
pub fn bench_symbols() -> (Symbols, Arc<ObjectInfo>) {
    let mut symbols = Symbols::with_default_word_size(true);
    let ty = symbols.add_type(AllocatedType {
        id: TypeId(1),
        internal_name: "LNode;".into(),
        size: OBJECT_SIZE as u32,
        pointers_per_object: Some(1),
    });
    let site = symbols.add_site(AllocationSite {
        id: SiteId(1),
        label: "Node.<init>".into(),
        allocated_type: Some(TypeId(1)),
    });
    let info = Arc::new(ObjectInfo::instance("main".into(), EventKind::C2Fast, site, ty, 8));
    (symbols, info)
}

fn space_len(objects: usize) -> u64 {
    (objects as u64 + 1) * OBJECT_SIZE
}

/// Address of the `k`-th eden object.
pub fn eden_address(k: usize) -> Address {
    Address(EDEN_BASE + k as u64 * OBJECT_SIZE)
}

/// An empty eden/old heap with room for `capacity` objects per space.
pub fn empty_heap(capacity: usize) -> HeapSnapshot {
    let (symbols, _) = bench_symbols();
    let mut heap = HeapSnapshot::new(symbols, ArenaConfig::default());
    heap.add_space(Space::new(EDEN, "eden", Address(EDEN_BASE), space_len(capacity)));
    heap.add_space(Space::new(OLD, "old", Address(OLD_BASE), space_len(capacity)));
    heap
}

/// A heap whose eden holds `objects` consecutive objects in one lab.
pub fn bench_heap(objects: usize) -> Result<HeapSnapshot, ArenaError> {
    let mut heap = empty_heap(objects);
    let info = bench_symbols().1;
    for k in 0..objects {
        heap.allocate(
            EDEN,
            "main",
            LabKind::Tlab,
            Some(eden_address(k)),
            Arc::clone(&info),
            false,
        )?;
    }
    Ok(heap)
}

/// Events for `objects` eden allocations followed by GC 1, which opens
/// the window and promotes every `survive_every`-th object to old.
pub fn young_gc_trace(objects: usize, survive_every: usize) -> Vec<HeapEvent> {
    let (_, info) = bench_symbols();
    let mut events = Vec::with_capacity(objects + objects / survive_every.max(1) + 2);
    for k in 0..objects {
        events.push(HeapEvent::Allocate {
            space: EDEN,
            thread: "main".into(),
            kind: LabKind::Tlab,
            address: Some(eden_address(k)),
            info: Arc::clone(&info),
            may_be_filler: false,
        });
    }
    events.push(GcBoundary::start(GcId(1), 10).collecting([EDEN]).into());
    let mut promoted = 0u64;
    for k in (0..objects).step_by(survive_every.max(1)) {
        events.push(HeapEvent::Move {
            from: eden_address(k),
            to_space: OLD,
            to: Address(OLD_BASE + promoted * OBJECT_SIZE),
            thread: "gc".into(),
        });
        promoted += 1;
    }
    events.push(GcBoundary::end(GcId(1), 11).into());
    events
}

/// An HPROF dump of `objects` `Node` instances, each pointing to the
/// next, with the head held by a JNI global root.
pub fn linked_list_dump(objects: usize, id_size: u32) -> Result<Vec<u8>, DumpError> {
    let mut buf = Vec::with_capacity(objects * (2 * id_size as usize + 9) + 256);
    let mut w = HprofWriter::new(&mut buf, id_size, 0)?;
    w.write_string(1, "Node")?;
    w.write_string(2, "next")?;
    w.write_load_class(&LoadClass {
        serial: 1,
        class_id: NODE_CLASS,
        stack_serial: 0,
        name_id: 1,
    })?;

    let node_id = |k: usize| 0x1000 + k as u64 * 0x10;
    let mut segment = vec![
        SubRecord::Class(ClassDump {
            class_id: NODE_CLASS,
            stack_serial: 0,
            super_id: 0,
            loader_id: 0,
            signers_id: 0,
            protection_domain_id: 0,
            instance_size: id_size,
            constants: vec![],
            statics: vec![],
            fields: vec![FieldDecl {
                name_id: 2,
                ty: BasicType::Object,
            }],
        }),
        SubRecord::Root(RootPtr::new(RootKind::JniGlobal, node_id(0))),
    ];
    for k in 0..objects {
        let next = if k + 1 < objects { node_id(k + 1) } else { 0 };
        let bytes = next.to_be_bytes();
        segment.push(SubRecord::Instance(InstanceDump {
            id: node_id(k),
            stack_serial: 0,
            class_id: NODE_CLASS,
            data: bytes[8 - id_size as usize..].to_vec(),
        }));
        if segment.len() >= MAX_PER_SEGMENT {
            w.write_heap_dump_segment(&segment)?;
            segment.clear();
        }
    }
    if !segment.is_empty() {
        w.write_heap_dump_segment(&segment)?;
    }
    w.write_heap_dump_end()?;
    drop(w);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapscope_dump::{HeapDumpResolver, HprofReader, ResolverConfig};
    use heapscope_evolution::{EvolutionTracker, WindowConfig};

    #[test]
    fn bench_heap_holds_every_object() {
        let heap = bench_heap(100).unwrap();
        assert_eq!(heap.object_count(), 100);
        assert!(heap.get_object(eden_address(99)).is_ok());
    }

    #[test]
    fn young_gc_trace_promotes_a_fraction() {
        let mut tracker =
            EvolutionTracker::new(empty_heap(100), WindowConfig::new(0, i64::MAX)).unwrap();
        for event in young_gc_trace(100, 10) {
            tracker.apply(event).unwrap();
        }
        let data = tracker.finish().unwrap();
        assert_eq!(data.perm_object_count(), 10);
        assert_eq!(data.died_object_count(), 90);
    }

    #[test]
    fn linked_list_dump_resolves() {
        let bytes = linked_list_dump(1000, 8).unwrap();
        let reader = HprofReader::open(bytes.as_slice()).unwrap();
        let heap = HeapDumpResolver::new(ResolverConfig::strict())
            .resolve(reader)
            .unwrap();
        // The class object sorts first.
        assert_eq!(heap.len(), 1001);
        assert_eq!(heap.roots.len(), 1);
        assert!(heap.from_pointers[1].is_empty());
        assert_eq!(heap.from_pointers[2].len(), 1);
    }
}
