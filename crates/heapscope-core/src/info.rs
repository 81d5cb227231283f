//! Type, allocation-site, and object identity metadata.
//!
//! [`ObjectInfo`] is the identity handed to downstream classifiers: two
//! objects with equal `ObjectInfo` fall into the same histogram bucket.
//! Infos are shared between records through `Arc`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SymbolsError;
use crate::id::{SiteId, TypeId};

/// Internal name of `java.lang.Class`.
pub const MIRROR_CLASS: &str = "Ljava/lang/Class;";

/// How the traced VM created an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// No allocation event (synthesized objects, heap dumps).
    Nop,
    /// Slow-path allocation in the VM runtime.
    Slow,
    /// Interpreter fast path.
    InterpreterFast,
    /// Interpreter normal path.
    InterpreterNormal,
    /// Client-compiler fast path.
    C1Fast,
    /// Client-compiler normal path.
    C1Normal,
    /// Server-compiler fast path.
    C2Fast,
    /// Server-compiler normal path.
    C2Normal,
    /// Allocated by the VM itself (mirrors, internal arrays).
    Vm,
}

impl EventKind {
    /// Whether the event came from JIT-compiled code.
    pub fn is_compiled(self) -> bool {
        matches!(
            self,
            Self::C1Fast | Self::C1Normal | Self::C2Fast | Self::C2Normal
        )
    }
}

/// A type known to the symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocatedType {
    /// Symbol-table id.
    pub id: TypeId,
    /// Internal (descriptor) name, e.g. `Ljava/lang/String;` or `[I`.
    pub internal_name: String,
    /// Instance size in bytes, or for arrays `header_size << 8 | element_size`.
    pub size: u32,
    /// Declared pointer fields per instance. `None` if the layout is not
    /// statically known (e.g. `java.lang.ref.Reference` subclasses).
    pub pointers_per_object: Option<u32>,
}

impl AllocatedType {
    /// Mask selecting the element size from an array type's `size`.
    pub const ELEM_SIZE_MASK: u32 = 0xFF;

    /// Whether this is an array type.
    pub fn is_array(&self) -> bool {
        self.internal_name.starts_with('[')
    }

    /// Primitive arrays have two-character descriptors like `[C`.
    pub fn is_primitive_array(&self) -> bool {
        self.internal_name.len() == 2 && self.is_array()
    }

    /// Whether the pointer layout of instances is unknown.
    pub fn has_unknown_pointer_count(&self) -> bool {
        self.pointers_per_object.is_none()
    }

    /// Unpadded byte size of an array of this type with `length` elements.
    ///
    /// Large primitive arrays exceed 4 GiB, so the result is 64-bit.
    pub fn array_size(&self, length: u32) -> u64 {
        let header = u64::from(self.size >> 8);
        let elem = u64::from(self.size & Self::ELEM_SIZE_MASK);
        header + elem * u64::from(length)
    }
}

impl fmt::Display for AllocatedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.internal_name)
    }
}

/// A code location at which objects are allocated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationSite {
    /// Symbol-table id.
    pub id: SiteId,
    /// Human-readable call-site label.
    pub label: String,
    /// The type this site allocates, if recorded.
    pub allocated_type: Option<TypeId>,
}

impl AllocationSite {
    /// The site used for objects with no recorded origin.
    pub fn unknown() -> Self {
        Self {
            id: SiteId::UNKNOWN,
            label: "<unknown>".into(),
            allocated_type: None,
        }
    }
}

impl fmt::Display for AllocationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

/// Identity class of a heap object.
///
/// Equality and hashing cover thread, event kind, site, type, and array
/// length. Size and the mirror flag are derived data and excluded.
#[derive(Clone, Debug)]
pub struct ObjectInfo {
    /// Internal name of the allocating thread.
    pub thread: Arc<str>,
    /// How the object was allocated.
    pub event: EventKind,
    /// Where the object was allocated.
    pub site: Arc<AllocationSite>,
    /// The object's type.
    pub ty: Arc<AllocatedType>,
    /// Padded size in bytes.
    pub size: u64,
    /// Whether this is a `java.lang.Class` mirror with explicit size.
    pub is_mirror: bool,
    /// Element count for arrays, `None` for non-arrays.
    pub array_length: Option<u32>,
}

impl ObjectInfo {
    /// Info for a plain instance; size comes from the type.
    pub fn instance(
        thread: Arc<str>,
        event: EventKind,
        site: Arc<AllocationSite>,
        ty: Arc<AllocatedType>,
        heap_word_size: u32,
    ) -> Self {
        let size = pad_object_size(u64::from(ty.size), heap_word_size);
        Self {
            thread,
            event,
            site,
            ty,
            size,
            is_mirror: false,
            array_length: None,
        }
    }

    /// Info for a class mirror, whose size the trace states explicitly.
    pub fn mirror(
        thread: Arc<str>,
        event: EventKind,
        site: Arc<AllocationSite>,
        ty: Arc<AllocatedType>,
        size: u64,
        heap_word_size: u32,
    ) -> Self {
        Self {
            thread,
            event,
            site,
            ty,
            size: pad_object_size(size, heap_word_size),
            is_mirror: true,
            array_length: None,
        }
    }

    /// Info for an array of `length` elements.
    pub fn array(
        thread: Arc<str>,
        event: EventKind,
        site: Arc<AllocationSite>,
        ty: Arc<AllocatedType>,
        length: u32,
        heap_word_size: u32,
    ) -> Self {
        let size = pad_object_size(ty.array_size(length), heap_word_size);
        Self {
            thread,
            event,
            site,
            ty,
            size,
            is_mirror: false,
            array_length: Some(length),
        }
    }

    /// Whether the object is an array.
    pub fn is_array(&self) -> bool {
        self.array_length.is_some()
    }
}

impl PartialEq for ObjectInfo {
    fn eq(&self, other: &Self) -> bool {
        self.array_length == other.array_length
            && self.thread == other.thread
            && self.event == other.event
            && self.site.id == other.site.id
            && self.ty.id == other.ty.id
    }
}

impl Eq for ObjectInfo {}

impl Hash for ObjectInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.thread.hash(state);
        self.event.hash(state);
        self.ty.id.hash(state);
        self.site.id.hash(state);
        self.array_length.hash(state);
    }
}

impl fmt::Display for ObjectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ObjectInfo[thread: {}, event: {:?}, site: {}, type: {}, size: {}",
            self.thread, self.event, self.site, self.ty, self.size
        )?;
        if let Some(len) = self.array_length {
            write!(f, ", length: {len}")?;
        }
        write!(f, "]")
    }
}

/// Round `unpadded` up to the next multiple of `heap_word_size`.
///
/// A word size of 0 leaves the size unpadded.
pub fn pad_object_size(unpadded: u64, heap_word_size: u32) -> u64 {
    let word = u64::from(heap_word_size);
    match unpadded.checked_rem(word) {
        None | Some(0) => unpadded,
        Some(rem) => unpadded + word - rem,
    }
}

/// Type and site registry for one trace.
#[derive(Clone, Debug)]
pub struct Symbols {
    /// Whether the trace records pointers at all. When `false`, every
    /// record is created with zero pointer slots.
    pub expect_pointers: bool,
    heap_word_size: u32,
    types: IndexMap<TypeId, Arc<AllocatedType>>,
    sites: IndexMap<SiteId, Arc<AllocationSite>>,
}

impl Symbols {
    /// Object alignment of 64-bit HotSpot heaps.
    pub const DEFAULT_HEAP_WORD_SIZE: u32 = 8;

    /// Empty registry containing only the unknown allocation site.
    ///
    /// `heap_word_size` must be a power of two.
    pub fn new(expect_pointers: bool, heap_word_size: u32) -> Result<Self, SymbolsError> {
        if !heap_word_size.is_power_of_two() {
            return Err(SymbolsError::InvalidHeapWordSize {
                value: heap_word_size,
            });
        }
        let mut sites = IndexMap::new();
        sites.insert(SiteId::UNKNOWN, Arc::new(AllocationSite::unknown()));
        Ok(Self {
            expect_pointers,
            heap_word_size,
            types: IndexMap::new(),
            sites,
        })
    }

    /// Empty registry with [`Self::DEFAULT_HEAP_WORD_SIZE`] alignment.
    pub fn with_default_word_size(expect_pointers: bool) -> Self {
        let mut sites = IndexMap::new();
        sites.insert(SiteId::UNKNOWN, Arc::new(AllocationSite::unknown()));
        Self {
            expect_pointers,
            heap_word_size: Self::DEFAULT_HEAP_WORD_SIZE,
            types: IndexMap::new(),
            sites,
        }
    }

    /// Object alignment in bytes.
    pub fn heap_word_size(&self) -> u32 {
        self.heap_word_size
    }

    /// Register a type, replacing any previous entry with the same id.
    pub fn add_type(&mut self, ty: AllocatedType) -> Arc<AllocatedType> {
        let ty = Arc::new(ty);
        self.types.insert(ty.id, Arc::clone(&ty));
        ty
    }

    /// Register an allocation site.
    pub fn add_site(&mut self, site: AllocationSite) -> Arc<AllocationSite> {
        let site = Arc::new(site);
        self.sites.insert(site.id, Arc::clone(&site));
        site
    }

    /// Look up a type by id.
    pub fn type_by_id(&self, id: TypeId) -> Option<&Arc<AllocatedType>> {
        self.types.get(&id)
    }

    /// Look up a site by id.
    pub fn site_by_id(&self, id: SiteId) -> Option<&Arc<AllocationSite>> {
        self.sites.get(&id)
    }

    /// Number of registered types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Whether objects from `site` may be heap fillers.
    ///
    /// Fillers are `int[]` or `Object` padding written by the VM; sites
    /// without a recorded type are treated as possible fillers.
    pub fn may_be_filler(&self, site: &AllocationSite) -> bool {
        match site.allocated_type {
            None => true,
            Some(type_id) => self.type_by_id(type_id).is_some_and(|ty| {
                ty.internal_name == "[I" || ty.internal_name == "Ljava/lang/Object;"
            }),
        }
    }
}
