//! Integration test: write small dumps with `DumpBuilder`, read them back,
//! and resolve them into dense arrays.

use heapscope_core::{Anomaly, CancelFlag, DenseIndex, RootKind};
use heapscope_dump::{
    DumpError, DumpIngest, HeapDumpResolver, HprofReader, PointerTarget, RecordHandler,
    ResolvedHeap, ResolverConfig,
};
use heapscope_test_utils::fixtures::DumpBuilder;
use heapscope_test_utils::{init_logging, CollectingSink};

const NODE: u64 = 10;
const INT_ARRAY: u64 = 20;
const NODE_ARRAY: u64 = 30;

fn nodes(id_size: u32) -> DumpBuilder {
    DumpBuilder::new(id_size)
        .class(NODE, "Node", 0, &["next"])
        .load_class(INT_ARRAY, "[I")
        .load_class(NODE_ARRAY, "[LNode;")
}

fn resolve(bytes: Vec<u8>, config: ResolverConfig) -> Result<ResolvedHeap, DumpError> {
    let reader = HprofReader::open(bytes.as_slice())?;
    HeapDumpResolver::new(config).resolve(reader)
}

fn obj(i: u32) -> PointerTarget {
    PointerTarget::Object(DenseIndex(i))
}

#[test]
fn pointer_between_two_instances_resolves() {
    init_logging();
    let bytes = nodes(8)
        .instance(100, NODE, &[200])
        .instance(200, NODE, &[0])
        .bytes();
    let heap = resolve(bytes, ResolverConfig::default()).unwrap();

    // The class object sorts first.
    assert_eq!(heap.addr, vec![NODE, 100, 200]);
    assert_eq!(heap.timestamp, 1_700_000_000_000);
    assert_eq!(heap.to_pointers[1], vec![obj(2)]);
    assert_eq!(heap.to_pointers[2], vec![PointerTarget::Null]);
    assert_eq!(heap.from_pointers[2], vec![DenseIndex(1)]);
    assert!(heap.from_pointers[1].is_empty());
    assert_eq!(heap.type_name(DenseIndex(1)), Some("Node"));
    assert!(heap.anomalies.is_empty());
}

#[test]
fn four_byte_ids_resolve_the_same_graph() {
    let wide = resolve(
        nodes(8).instance(100, NODE, &[200]).instance(200, NODE, &[100]).bytes(),
        ResolverConfig::default(),
    )
    .unwrap();
    let narrow = resolve(
        nodes(4).instance(100, NODE, &[200]).instance(200, NODE, &[100]).bytes(),
        ResolverConfig::default(),
    )
    .unwrap();
    assert_eq!(wide.addr, narrow.addr);
    assert_eq!(wide.to_pointers, narrow.to_pointers);
    assert_eq!(wide.from_pointers, narrow.from_pointers);
}

#[test]
fn arrays_carry_lengths_and_type_keys() {
    init_logging();
    let bytes = nodes(8)
        .instance(100, NODE, &[0])
        .instance(200, NODE, &[100])
        .int_array(300, &[1, 2, 3])
        .object_array(400, NODE_ARRAY, &[100, 0, 200, 100])
        .bytes();
    let heap = resolve(bytes, ResolverConfig::default()).unwrap();
    let ints = heap.index_of(300).unwrap();
    let refs = heap.index_of(400).unwrap();

    assert_eq!(heap.type_keys[ints.as_usize()], INT_ARRAY);
    assert_eq!(heap.type_name(ints), Some("[I"));
    assert_eq!(heap.array_lengths[ints.as_usize()], Some(3));
    assert!(heap.to_pointers[ints.as_usize()].is_empty());

    assert_eq!(heap.array_lengths[refs.as_usize()], Some(4));
    assert_eq!(
        heap.to_pointers[refs.as_usize()],
        vec![obj(1), PointerTarget::Null, obj(2), obj(1)]
    );
    // Sources sorted, duplicates kept.
    assert_eq!(heap.from_pointers[1], vec![DenseIndex(2), refs, refs]);
    assert_eq!(heap.array_lengths[1], None);
}

#[test]
fn null_pointers_can_be_dropped() {
    let bytes = nodes(8)
        .instance(100, NODE, &[0])
        .object_array(200, NODE_ARRAY, &[0, 100, 0])
        .bytes();
    let config = ResolverConfig {
        keep_null_pointers: false,
        ..ResolverConfig::default()
    };
    let heap = resolve(bytes, config).unwrap();
    assert!(heap.to_pointers[1].is_empty());
    assert_eq!(heap.to_pointers[2], vec![obj(1)]);
}

#[test]
fn unknown_target_is_kept_when_lenient() {
    init_logging();
    let sink = CollectingSink::new();
    let bytes = nodes(8).instance(100, NODE, &[999]).bytes();
    let reader = HprofReader::open(bytes.as_slice()).unwrap();
    let heap = HeapDumpResolver::new(ResolverConfig::default())
        .with_sink(Box::new(sink.clone()))
        .resolve(reader)
        .unwrap();

    assert_eq!(heap.to_pointers[1], vec![PointerTarget::Unresolved(999)]);
    assert_eq!(
        sink.anomalies(),
        vec![Anomaly::UnresolvedPointer {
            from: DenseIndex(1),
            target: 999
        }]
    );
    assert_eq!(heap.anomalies, sink.anomalies());
}

#[test]
fn unknown_target_fails_when_strict() {
    let bytes = nodes(8).instance(100, NODE, &[999]).bytes();
    assert!(matches!(
        resolve(bytes, ResolverConfig::strict()),
        Err(DumpError::UnresolvedObject {
            from: 100,
            target: 999
        })
    ));

    let bytes = nodes(8).root(RootKind::JniGlobal, 777).bytes();
    assert!(matches!(
        resolve(bytes, ResolverConfig::strict()),
        Err(DumpError::UnresolvedObject { from: 0, target: 777 })
    ));
}

#[test]
fn roots_and_thread_names_use_dense_indices() {
    init_logging();
    let bytes = nodes(8)
        .class(40, "java/lang/Thread", 0, &[])
        .instance(100, NODE, &[0])
        .instance(500, 40, &[])
        .root(RootKind::JavaFrame, 100)
        .root(RootKind::ThreadObject, 500)
        .root(RootKind::StickyClass, NODE)
        .root(RootKind::JniLocal, 100)
        .root(RootKind::JniGlobal, 12345)
        .thread(500, "main")
        .bytes();
    let heap = resolve(bytes, ResolverConfig::default()).unwrap();
    let node = heap.index_of(100).unwrap();
    let thread = heap.index_of(500).unwrap();

    assert!(heap.is_root(node));
    assert!(heap.is_root(thread));
    assert!(heap.is_root(DenseIndex(0)));
    let kinds: Vec<RootKind> = heap.roots[&node].iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![RootKind::JavaFrame, RootKind::JniLocal]);
    assert!(heap.roots[&node].iter().all(|r| r.target == node));
    assert_eq!(heap.thread_names.get(&thread).map(String::as_str), Some("main"));
    assert_eq!(
        heap.anomalies,
        vec![Anomaly::UnresolvedRoot { target: 12345 }]
    );
}

#[test]
fn superclass_fields_are_walked_after_own_fields() {
    let bytes = DumpBuilder::new(8)
        .class(10, "Base", 0, &["base"])
        .class(11, "Derived", 10, &["own"])
        .instance(100, 11, &[200, 300])
        .instance(200, 10, &[0])
        .instance(300, 10, &[0])
        .bytes();
    let heap = resolve(bytes, ResolverConfig::default()).unwrap();
    let derived = heap.index_of(100).unwrap();
    let own = heap.index_of(200).unwrap();
    let base = heap.index_of(300).unwrap();
    assert_eq!(
        heap.to_pointers[derived.as_usize()],
        vec![PointerTarget::Object(own), PointerTarget::Object(base)]
    );
}

#[test]
fn instance_of_undumped_class_has_no_pointers() {
    let bytes = nodes(8).instance(100, 77, &[]).bytes();
    let heap = resolve(bytes, ResolverConfig::default()).unwrap();
    assert!(heap.to_pointers[1].is_empty());
    assert_eq!(
        heap.anomalies,
        vec![Anomaly::MissingClass {
            object: 100,
            class: 77
        }]
    );
}

#[test]
fn phases_can_be_driven_by_hand() {
    let bytes = nodes(8)
        .instance(300, NODE, &[100])
        .instance(100, NODE, &[0])
        .root(RootKind::JniLocal, 300)
        .bytes();
    let mut reader = HprofReader::open(bytes.as_slice()).unwrap();
    let mut ingest = DumpIngest::new();
    ingest.header(reader.header()).unwrap();
    assert_eq!(reader.read_all(&mut ingest).unwrap(), 9);
    assert_eq!(ingest.object_count(), 3);
    assert_eq!(ingest.rooted_object_count(), 1);

    let index = ingest.into_index().unwrap();
    assert_eq!(index.index_of(100), Some(DenseIndex(1)));
    assert_eq!(index.index_of(300), Some(DenseIndex(2)));
    assert_eq!(index.index_of(200), None);

    let mut sink = CollectingSink::new();
    let heap = index
        .resolve(&ResolverConfig::default(), &mut sink, None)
        .unwrap();
    assert_eq!(heap.len(), 3);
    assert!(sink.is_empty());
}

#[test]
fn cancelled_resolution_stops() {
    let bytes = nodes(8).instance(100, NODE, &[0]).bytes();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let reader = HprofReader::open(bytes.as_slice()).unwrap();
    let result = HeapDumpResolver::new(ResolverConfig::default())
        .with_cancel(cancel)
        .resolve(reader);
    assert!(matches!(result, Err(DumpError::Cancelled)));
}

#[test]
fn garbage_input_is_rejected() {
    assert!(matches!(
        HprofReader::open(&b"NOT A DUMP AT ALL\0"[..]),
        Err(DumpError::InvalidHeader { .. })
    ));

    let mut bytes = nodes(8).instance(100, NODE, &[200]).bytes();
    bytes.truncate(bytes.len() - 12);
    let reader = HprofReader::open(bytes.as_slice()).unwrap();
    assert!(matches!(
        HeapDumpResolver::new(ResolverConfig::default()).resolve(reader),
        Err(DumpError::Malformed { .. })
    ));
}
