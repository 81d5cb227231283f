//! Two-phase pointer resolution.
//!
//! [`DumpIngest`] collects object records in arrival order, keyed by the
//! dump's native ids. [`DumpIngest::into_index`] sorts them once into an
//! immutable [`SortedIndex`]; only then can
//! [`SortedIndex::resolve`] map every pointer onto dense indices by binary
//! search. The type system keeps the two phases apart: nothing can resolve
//! against a list that is still growing.

use std::io::Read;

use indexmap::IndexMap;

use heapscope_core::{Anomaly, AnomalySink, CancelFlag, DenseIndex, LogSink, RootPtr};

use crate::codec::decode_fields;
use crate::config::ResolverConfig;
use crate::error::DumpError;
use crate::handler::RecordHandler;
use crate::reader::HprofReader;
use crate::types::*;

/// Names the `java.lang.Class` class may be loaded under.
const CLASS_CLASS_NAMES: [&str; 2] = ["java/lang/Class", "java.lang.Class"];

/// End marker of an incoming-pointer chain.
const NO_LINK: u32 = u32::MAX;

// ── Ingest ──────────────────────────────────────────────────────

#[derive(Clone, Debug)]
enum ObjectBody {
    Class { statics: Vec<u64> },
    Instance { class_id: u64, data: Vec<u8> },
    ObjectArray { class_id: u64, elements: Vec<u64> },
    PrimitiveArray { elem_type: BasicType, length: u32 },
}

#[derive(Clone, Debug)]
struct DumpObject {
    id: u64,
    body: ObjectBody,
}

#[derive(Clone, Debug)]
struct ClassLayout {
    super_id: u64,
    fields: Vec<BasicType>,
}

/// First phase: accumulates a dump's records.
///
/// Implements [`RecordHandler`], so an [`HprofReader`] can feed it
/// directly. Objects keep their native ids until
/// [`into_index`](Self::into_index) is called.
#[derive(Debug, Default)]
pub struct DumpIngest {
    id_size: u32,
    timestamp: u64,
    strings: IndexMap<u64, String>,
    class_name_ids: IndexMap<u64, u64>,
    thread_name_ids: IndexMap<u64, u64>,
    layouts: IndexMap<u64, ClassLayout>,
    objects: Vec<DumpObject>,
    roots: IndexMap<u64, Vec<RootPtr<u64>>>,
}

impl DumpIngest {
    /// An empty ingest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Object records collected so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Distinct objects named by root records so far.
    pub fn rooted_object_count(&self) -> usize {
        self.roots.len()
    }

    /// Close the ingest phase: sort objects by native id.
    ///
    /// Fails if two object records share an id.
    pub fn into_index(mut self) -> Result<SortedIndex, DumpError> {
        self.objects.sort_unstable_by_key(|o| o.id);
        if let Some(pair) = self.objects.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(DumpError::Malformed {
                detail: format!("object id {:#x} dumped twice", pair[0].id),
            });
        }
        if u32::try_from(self.objects.len()).is_err() {
            return Err(DumpError::Malformed {
                detail: format!("{} objects exceed the dense index range", self.objects.len()),
            });
        }

        let mut class_names = IndexMap::new();
        let mut primitive_classes = IndexMap::new();
        let mut class_class = None;
        for (&class_id, name_id) in &self.class_name_ids {
            let Some(name) = self.strings.get(name_id) else {
                continue;
            };
            if let Some(elem) = BasicType::from_array_name(name) {
                primitive_classes.insert(elem, class_id);
            }
            if CLASS_CLASS_NAMES.contains(&name.as_str()) {
                class_class = Some(class_id);
            }
            class_names.insert(class_id, name.clone());
        }

        let mut thread_names = IndexMap::new();
        for (&object_id, name_id) in &self.thread_name_ids {
            if let Some(name) = self.strings.get(name_id) {
                thread_names.insert(object_id, name.clone());
            }
        }

        log::debug!(
            "sorted {} dump objects ({} classes named, {} roots)",
            self.objects.len(),
            class_names.len(),
            self.roots.len()
        );

        Ok(SortedIndex {
            ids: self.objects.iter().map(|o| o.id).collect(),
            objects: self.objects,
            id_size: self.id_size,
            timestamp: self.timestamp,
            layouts: self.layouts,
            roots: self.roots,
            class_names,
            thread_names,
            primitive_classes,
            class_class,
        })
    }
}

impl RecordHandler for DumpIngest {
    fn header(&mut self, header: &HprofHeader) -> Result<(), DumpError> {
        self.id_size = header.id_size;
        self.timestamp = header.timestamp;
        Ok(())
    }

    fn string(&mut self, id: u64, bytes: &[u8]) -> Result<(), DumpError> {
        self.strings
            .insert(id, String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn load_class(&mut self, rec: &LoadClass) -> Result<(), DumpError> {
        self.class_name_ids.insert(rec.class_id, rec.name_id);
        Ok(())
    }

    fn start_thread(&mut self, rec: &StartThread) -> Result<(), DumpError> {
        self.thread_name_ids.insert(rec.object_id, rec.name_id);
        Ok(())
    }

    fn root(&mut self, root: RootPtr<u64>) -> Result<(), DumpError> {
        self.roots.entry(root.target).or_default().push(root);
        Ok(())
    }

    fn class_dump(&mut self, class: ClassDump) -> Result<(), DumpError> {
        self.layouts.insert(
            class.class_id,
            ClassLayout {
                super_id: class.super_id,
                fields: class.fields.iter().map(|f| f.ty).collect(),
            },
        );
        let statics = class
            .statics
            .iter()
            .filter_map(|s| s.value.as_object())
            .collect();
        self.objects.push(DumpObject {
            id: class.class_id,
            body: ObjectBody::Class { statics },
        });
        Ok(())
    }

    fn instance_dump(&mut self, instance: InstanceDump) -> Result<(), DumpError> {
        self.objects.push(DumpObject {
            id: instance.id,
            body: ObjectBody::Instance {
                class_id: instance.class_id,
                data: instance.data,
            },
        });
        Ok(())
    }

    fn object_array_dump(&mut self, array: ObjectArrayDump) -> Result<(), DumpError> {
        self.objects.push(DumpObject {
            id: array.id,
            body: ObjectBody::ObjectArray {
                class_id: array.class_id,
                elements: array.elements,
            },
        });
        Ok(())
    }

    fn primitive_array_dump(&mut self, array: PrimitiveArrayDump) -> Result<(), DumpError> {
        self.objects.push(DumpObject {
            id: array.id,
            body: ObjectBody::PrimitiveArray {
                elem_type: array.elem_type,
                length: array.length,
            },
        });
        Ok(())
    }
}

// ── Sorted index ────────────────────────────────────────────────

/// Second phase: the immutable, id-sorted object list.
#[derive(Debug)]
pub struct SortedIndex {
    ids: Vec<u64>,
    objects: Vec<DumpObject>,
    id_size: u32,
    timestamp: u64,
    layouts: IndexMap<u64, ClassLayout>,
    roots: IndexMap<u64, Vec<RootPtr<u64>>>,
    class_names: IndexMap<u64, String>,
    thread_names: IndexMap<u64, String>,
    primitive_classes: IndexMap<BasicType, u64>,
    class_class: Option<u64>,
}

/// Where one outgoing pointer leads after resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerTarget {
    /// A null reference.
    Null,
    /// An object in the dump.
    Object(DenseIndex),
    /// A raw id that names no object in the dump.
    Unresolved(u64),
}

impl PointerTarget {
    /// The target's dense index, if it resolved to an object.
    pub fn index(self) -> Option<DenseIndex> {
        match self {
            Self::Object(i) => Some(i),
            _ => None,
        }
    }
}

impl SortedIndex {
    /// Number of objects.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the dump holds no objects.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Dense index of a native id.
    pub fn index_of(&self, id: u64) -> Option<DenseIndex> {
        index_in(&self.ids, id)
    }

    /// Map every pointer and root onto dense indices.
    ///
    /// Anomalies go to `sink` and are kept in the result. `cancel` is
    /// checked between objects.
    pub fn resolve(
        self,
        config: &ResolverConfig,
        sink: &mut dyn AnomalySink,
        cancel: Option<&CancelFlag>,
    ) -> Result<ResolvedHeap, DumpError> {
        let n = self.objects.len();
        let mut anomalies = Vec::new();
        let mut report = |anomaly: Anomaly| {
            sink.report(&anomaly);
            anomalies.push(anomaly);
        };

        let mut to_pointers = Vec::with_capacity(n);
        let mut type_keys = Vec::with_capacity(n);
        let mut array_lengths = Vec::with_capacity(n);
        // Incoming pointers as singly linked chains: heads[target] is the
        // newest link, links[k] = (source, next).
        let mut heads = vec![NO_LINK; n];
        let mut links: Vec<(u32, u32)> = Vec::new();
        let mut layout = Vec::new();

        for (i, object) in self.objects.iter().enumerate() {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(DumpError::Cancelled);
            }
            let from = DenseIndex(i as u32);

            let (raw_targets, type_key, array_length) = match &object.body {
                ObjectBody::Class { statics } => {
                    (statics.clone(), self.class_class.unwrap_or(0), None)
                }
                ObjectBody::Instance { class_id, data } => {
                    let targets = if self.layout_chain(*class_id, &mut layout) {
                        decode_fields(data, &layout, self.id_size)
                            .map_err(|e| DumpError::Malformed {
                                detail: format!("instance {:#x}: {e}", object.id),
                            })?
                            .iter()
                            .filter_map(FieldValue::as_object)
                            .collect()
                    } else {
                        report(Anomaly::MissingClass {
                            object: object.id,
                            class: *class_id,
                        });
                        Vec::new()
                    };
                    (targets, *class_id, None)
                }
                ObjectBody::ObjectArray { class_id, elements } => {
                    (elements.clone(), *class_id, Some(elements.len() as u32))
                }
                ObjectBody::PrimitiveArray { elem_type, length } => {
                    let key = self.primitive_classes.get(elem_type).copied().unwrap_or(0);
                    (Vec::new(), key, Some(*length))
                }
            };

            let mut targets = Vec::with_capacity(raw_targets.len());
            for raw in raw_targets {
                if raw == 0 {
                    if config.keep_null_pointers {
                        targets.push(PointerTarget::Null);
                    }
                    continue;
                }
                match index_in(&self.ids, raw) {
                    Some(to) => {
                        targets.push(PointerTarget::Object(to));
                        links.push((from.0, heads[to.as_usize()]));
                        heads[to.as_usize()] = (links.len() - 1) as u32;
                    }
                    None if config.strict_unresolved => {
                        return Err(DumpError::UnresolvedObject {
                            from: object.id,
                            target: raw,
                        });
                    }
                    None => {
                        report(Anomaly::UnresolvedPointer { from, target: raw });
                        targets.push(PointerTarget::Unresolved(raw));
                    }
                }
            }

            to_pointers.push(targets);
            type_keys.push(type_key);
            array_lengths.push(array_length);
        }

        let from_pointers: Vec<Vec<DenseIndex>> = heads
            .iter()
            .map(|&head| {
                let mut sources = Vec::new();
                let mut link = head;
                while link != NO_LINK {
                    let (source, next) = links[link as usize];
                    sources.push(DenseIndex(source));
                    link = next;
                }
                sources.sort_unstable();
                sources
            })
            .collect();

        let mut roots: IndexMap<DenseIndex, Vec<RootPtr<DenseIndex>>> = IndexMap::new();
        for (raw, ptrs) in self.roots {
            match index_in(&self.ids, raw) {
                Some(index) => roots
                    .entry(index)
                    .or_default()
                    .extend(ptrs.into_iter().map(|p| p.map_target(|_| index))),
                None if config.strict_unresolved => {
                    return Err(DumpError::UnresolvedObject {
                        from: 0,
                        target: raw,
                    });
                }
                None => report(Anomaly::UnresolvedRoot { target: raw }),
            }
        }
        roots.sort_unstable_keys();

        let thread_names = self
            .thread_names
            .into_iter()
            .filter_map(|(id, name)| index_in(&self.ids, id).map(|i| (i, name)))
            .collect();

        let pointer_count = links.len();
        drop(report);
        log::info!(
            "resolved {} objects: {} pointers, {} rooted objects, {} anomalies",
            n,
            pointer_count,
            roots.len(),
            anomalies.len()
        );

        Ok(ResolvedHeap {
            timestamp: self.timestamp,
            addr: self.ids,
            to_pointers,
            from_pointers,
            type_keys,
            array_lengths,
            roots,
            class_names: self.class_names,
            thread_names,
            anomalies,
        })
    }

    /// Collect the field types of `class_id` and its superclasses, in
    /// instance encoding order. Returns `false` if a class is missing.
    fn layout_chain(&self, class_id: u64, out: &mut Vec<BasicType>) -> bool {
        out.clear();
        let mut current = class_id;
        // Bounded by the class count so a cyclic chain cannot spin.
        for _ in 0..=self.layouts.len() {
            if current == 0 {
                return true;
            }
            let Some(layout) = self.layouts.get(&current) else {
                return false;
            };
            out.extend_from_slice(&layout.fields);
            current = layout.super_id;
        }
        false
    }
}

fn index_in(ids: &[u64], id: u64) -> Option<DenseIndex> {
    ids.binary_search(&id).ok().map(|i| DenseIndex(i as u32))
}

// ── Result ──────────────────────────────────────────────────────

/// A fully resolved heap dump.
///
/// Every `Vec` is indexed by [`DenseIndex`]: position `i` describes the
/// object with the `i`-th smallest native id.
#[derive(Clone, Debug, Default)]
pub struct ResolvedHeap {
    /// Dump timestamp from the header, in milliseconds.
    pub timestamp: u64,
    /// Native id of each object, ascending.
    pub addr: Vec<u64>,
    /// Outgoing pointers in field/element order.
    pub to_pointers: Vec<Vec<PointerTarget>>,
    /// Incoming pointers, sorted by source index. A source pointing to
    /// the same object twice appears twice.
    pub from_pointers: Vec<Vec<DenseIndex>>,
    /// Raw class id of each object's type; 0 when unknown.
    pub type_keys: Vec<u64>,
    /// Element count for arrays.
    pub array_lengths: Vec<Option<u32>>,
    /// Root pointers by target.
    pub roots: IndexMap<DenseIndex, Vec<RootPtr<DenseIndex>>>,
    /// Class names by raw class id, as loaded.
    pub class_names: IndexMap<u64, String>,
    /// Thread names by thread object.
    pub thread_names: IndexMap<DenseIndex, String>,
    /// Consistency problems found while resolving.
    pub anomalies: Vec<Anomaly>,
}

impl ResolvedHeap {
    /// Number of objects.
    pub fn len(&self) -> usize {
        self.addr.len()
    }

    /// Whether the dump held no objects.
    pub fn is_empty(&self) -> bool {
        self.addr.is_empty()
    }

    /// Dense index of a native id.
    pub fn index_of(&self, id: u64) -> Option<DenseIndex> {
        index_in(&self.addr, id)
    }

    /// Name of the object's class, if it was loaded with a name.
    pub fn type_name(&self, index: DenseIndex) -> Option<&str> {
        let key = self.type_keys.get(index.as_usize())?;
        self.class_names.get(key).map(String::as_str)
    }

    /// Whether any root points at the object.
    pub fn is_root(&self, index: DenseIndex) -> bool {
        self.roots.contains_key(&index)
    }
}

// ── Convenience driver ──────────────────────────────────────────

/// Reads a whole dump and resolves it in one call.
pub struct HeapDumpResolver {
    config: ResolverConfig,
    sink: Box<dyn AnomalySink + Send>,
    cancel: Option<CancelFlag>,
}

// Compile-time assertion: HeapDumpResolver must be Send.
const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<HeapDumpResolver>();
};

impl HeapDumpResolver {
    /// A resolver that reports anomalies through [`LogSink`].
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            sink: Box::new(LogSink),
            cancel: None,
        }
    }

    /// Report anomalies to `sink` instead.
    pub fn with_sink(mut self, sink: Box<dyn AnomalySink + Send>) -> Self {
        self.sink = sink;
        self
    }

    /// Stop with [`DumpError::Cancelled`] once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Ingest every record from `reader`, then resolve.
    pub fn resolve<R: Read>(&mut self, mut reader: HprofReader<R>) -> Result<ResolvedHeap, DumpError> {
        let mut ingest = DumpIngest::new();
        ingest.header(reader.header())?;
        reader.read_all(&mut ingest)?;
        ingest
            .into_index()?
            .resolve(&self.config, self.sink.as_mut(), self.cancel.as_ref())
    }
}
