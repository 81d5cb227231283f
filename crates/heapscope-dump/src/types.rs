//! HPROF record types.

use heapscope_core::RootPtr;

use crate::error::DumpError;

/// Top-level record tags.
pub mod tag {
    /// UTF-8 string.
    pub const UTF8: u8 = 0x01;
    /// Class loaded.
    pub const LOAD_CLASS: u8 = 0x02;
    /// Class unloaded.
    pub const UNLOAD_CLASS: u8 = 0x03;
    /// Stack frame.
    pub const STACK_FRAME: u8 = 0x04;
    /// Stack trace.
    pub const STACK_TRACE: u8 = 0x05;
    /// Heap summary.
    pub const HEAP_SUMMARY: u8 = 0x07;
    /// Thread started.
    pub const START_THREAD: u8 = 0x0A;
    /// Thread ended.
    pub const END_THREAD: u8 = 0x0B;
    /// Whole heap dump in one record.
    pub const HEAP_DUMP: u8 = 0x0C;
    /// One segment of a heap dump.
    pub const HEAP_DUMP_SEGMENT: u8 = 0x1C;
    /// End of a segmented heap dump.
    pub const HEAP_DUMP_END: u8 = 0x2C;
}

/// Heap-dump sub-record tags.
pub mod sub_tag {
    /// Root of unknown origin.
    pub const ROOT_UNKNOWN: u8 = 0xFF;
    /// JNI global reference.
    pub const ROOT_JNI_GLOBAL: u8 = 0x01;
    /// JNI local reference.
    pub const ROOT_JNI_LOCAL: u8 = 0x02;
    /// Java stack frame local.
    pub const ROOT_JAVA_FRAME: u8 = 0x03;
    /// Native stack reference.
    pub const ROOT_NATIVE_STACK: u8 = 0x04;
    /// System class.
    pub const ROOT_STICKY_CLASS: u8 = 0x05;
    /// Thread block reference.
    pub const ROOT_THREAD_BLOCK: u8 = 0x06;
    /// Monitor in use.
    pub const ROOT_MONITOR_USED: u8 = 0x07;
    /// Thread object.
    pub const ROOT_THREAD_OBJECT: u8 = 0x08;
    /// Class dump.
    pub const CLASS_DUMP: u8 = 0x20;
    /// Instance dump.
    pub const INSTANCE_DUMP: u8 = 0x21;
    /// Object array dump.
    pub const OBJECT_ARRAY_DUMP: u8 = 0x22;
    /// Primitive array dump.
    pub const PRIMITIVE_ARRAY_DUMP: u8 = 0x23;
}

/// Type of a field, constant, or array element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BasicType {
    /// Object reference, one identifier wide.
    Object,
    /// `boolean`.
    Boolean,
    /// `char`.
    Char,
    /// `float`.
    Float,
    /// `double`.
    Double,
    /// `byte`.
    Byte,
    /// `short`.
    Short,
    /// `int`.
    Int,
    /// `long`.
    Long,
}

impl BasicType {
    /// Decode a type tag.
    pub fn from_tag(tag: u8) -> Result<Self, DumpError> {
        Ok(match tag {
            2 => Self::Object,
            4 => Self::Boolean,
            5 => Self::Char,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::Byte,
            9 => Self::Short,
            10 => Self::Int,
            11 => Self::Long,
            _ => return Err(DumpError::UnknownBasicType { tag }),
        })
    }

    /// The type's tag.
    pub fn tag(self) -> u8 {
        match self {
            Self::Object => 2,
            Self::Boolean => 4,
            Self::Char => 5,
            Self::Float => 6,
            Self::Double => 7,
            Self::Byte => 8,
            Self::Short => 9,
            Self::Int => 10,
            Self::Long => 11,
        }
    }

    /// Encoded width in bytes.
    pub fn size(self, id_size: u32) -> u32 {
        match self {
            Self::Object => id_size,
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Float | Self::Int => 4,
            Self::Double | Self::Long => 8,
        }
    }

    /// The primitive array type of this element type, by internal and
    /// external name. `None` for [`BasicType::Object`].
    pub fn array_names(self) -> Option<(&'static str, &'static str)> {
        Some(match self {
            Self::Object => return None,
            Self::Boolean => ("[Z", "boolean[]"),
            Self::Char => ("[C", "char[]"),
            Self::Float => ("[F", "float[]"),
            Self::Double => ("[D", "double[]"),
            Self::Byte => ("[B", "byte[]"),
            Self::Short => ("[S", "short[]"),
            Self::Int => ("[I", "int[]"),
            Self::Long => ("[J", "long[]"),
        })
    }

    /// Element type of the primitive array class named `name`.
    pub fn from_array_name(name: &str) -> Option<Self> {
        [
            Self::Boolean,
            Self::Char,
            Self::Float,
            Self::Double,
            Self::Byte,
            Self::Short,
            Self::Int,
            Self::Long,
        ]
        .into_iter()
        .find(|t| {
            t.array_names()
                .is_some_and(|(internal, external)| name == internal || name == external)
        })
    }
}

/// A decoded field, constant, or static value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    /// Object reference by raw id; 0 is null.
    Object(u64),
    /// `boolean`.
    Boolean(bool),
    /// `char`.
    Char(u16),
    /// `float`.
    Float(f32),
    /// `double`.
    Double(f64),
    /// `byte`.
    Byte(i8),
    /// `short`.
    Short(i16),
    /// `int`.
    Int(i32),
    /// `long`.
    Long(i64),
}

impl FieldValue {
    /// The value's type.
    pub fn basic_type(&self) -> BasicType {
        match self {
            Self::Object(_) => BasicType::Object,
            Self::Boolean(_) => BasicType::Boolean,
            Self::Char(_) => BasicType::Char,
            Self::Float(_) => BasicType::Float,
            Self::Double(_) => BasicType::Double,
            Self::Byte(_) => BasicType::Byte,
            Self::Short(_) => BasicType::Short,
            Self::Int(_) => BasicType::Int,
            Self::Long(_) => BasicType::Long,
        }
    }

    /// The raw object id, for reference values.
    pub fn as_object(&self) -> Option<u64> {
        match *self {
            Self::Object(id) => Some(id),
            _ => None,
        }
    }
}

/// File header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HprofHeader {
    /// Format string, e.g. `JAVA PROFILE 1.0.2`.
    pub version: String,
    /// Identifier width in bytes (4 or 8).
    pub id_size: u32,
    /// Dump time in milliseconds since the epoch.
    pub timestamp: u64,
}

/// A `LOAD CLASS` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadClass {
    /// Class serial number.
    pub serial: u32,
    /// Raw id of the class object.
    pub class_id: u64,
    /// Stack trace serial number.
    pub stack_serial: u32,
    /// String id of the class name.
    pub name_id: u64,
}

/// A `STACK FRAME` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    /// Frame id.
    pub frame_id: u64,
    /// String id of the method name.
    pub method_name_id: u64,
    /// String id of the method signature.
    pub method_sig_id: u64,
    /// String id of the source file name.
    pub source_file_id: u64,
    /// Serial number of the declaring class.
    pub class_serial: u32,
    /// Line number, or a negative marker for unknown/compiled/native.
    pub line: i32,
}

/// A `STACK TRACE` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackTrace {
    /// Stack trace serial number.
    pub serial: u32,
    /// Serial number of the thread.
    pub thread_serial: u32,
    /// Frame ids, innermost first.
    pub frame_ids: Vec<u64>,
}

/// A `START THREAD` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartThread {
    /// Thread serial number.
    pub serial: u32,
    /// Raw id of the thread object.
    pub object_id: u64,
    /// Stack trace serial number.
    pub stack_serial: u32,
    /// String id of the thread name.
    pub name_id: u64,
    /// String id of the thread group name.
    pub group_name_id: u64,
    /// String id of the parent thread group name.
    pub parent_group_name_id: u64,
}

/// A `HEAP SUMMARY` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapSummary {
    /// Live bytes.
    pub live_bytes: u32,
    /// Live instances.
    pub live_instances: u32,
    /// Bytes allocated.
    pub bytes_allocated: u64,
    /// Instances allocated.
    pub instances_allocated: u64,
}

/// A constant pool entry of a class dump.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantEntry {
    /// Constant pool index.
    pub index: u16,
    /// The value.
    pub value: FieldValue,
}

/// A static field of a class dump.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticField {
    /// String id of the field name.
    pub name_id: u64,
    /// The value.
    pub value: FieldValue,
}

/// An instance field declaration of a class dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDecl {
    /// String id of the field name.
    pub name_id: u64,
    /// The field type.
    pub ty: BasicType,
}

/// A `CLASS DUMP` sub-record.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassDump {
    /// Raw id of the class object.
    pub class_id: u64,
    /// Stack trace serial number.
    pub stack_serial: u32,
    /// Raw id of the superclass, 0 for none.
    pub super_id: u64,
    /// Raw id of the class loader.
    pub loader_id: u64,
    /// Raw id of the signers object.
    pub signers_id: u64,
    /// Raw id of the protection domain.
    pub protection_domain_id: u64,
    /// Instance size in bytes.
    pub instance_size: u32,
    /// Constant pool.
    pub constants: Vec<ConstantEntry>,
    /// Static fields.
    pub statics: Vec<StaticField>,
    /// Instance fields declared by this class (not its superclasses).
    pub fields: Vec<FieldDecl>,
}

/// An `INSTANCE DUMP` sub-record.
///
/// Field values are kept as raw bytes: decoding them needs the layout of
/// the whole class chain, which may appear later in the dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceDump {
    /// Raw object id.
    pub id: u64,
    /// Stack trace serial number.
    pub stack_serial: u32,
    /// Raw id of the class.
    pub class_id: u64,
    /// Field values, this class's fields first, then each superclass's.
    pub data: Vec<u8>,
}

/// An `OBJECT ARRAY DUMP` sub-record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectArrayDump {
    /// Raw object id.
    pub id: u64,
    /// Stack trace serial number.
    pub stack_serial: u32,
    /// Raw id of the array class.
    pub class_id: u64,
    /// Element ids; 0 is null.
    pub elements: Vec<u64>,
}

/// A `PRIMITIVE ARRAY DUMP` sub-record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimitiveArrayDump {
    /// Raw object id.
    pub id: u64,
    /// Stack trace serial number.
    pub stack_serial: u32,
    /// Element type.
    pub elem_type: BasicType,
    /// Element count.
    pub length: u32,
    /// Raw big-endian element bytes.
    pub data: Vec<u8>,
}

impl PrimitiveArrayDump {
    /// An `int[]` with the given elements.
    pub fn ints(id: u64, values: &[i32]) -> Self {
        Self {
            id,
            stack_serial: 0,
            elem_type: BasicType::Int,
            length: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_be_bytes()).collect(),
        }
    }
}

/// One sub-record of a heap dump or heap-dump segment.
#[derive(Clone, Debug, PartialEq)]
pub enum SubRecord {
    /// A root pointer, targeting a raw object id.
    Root(RootPtr<u64>),
    /// A class.
    Class(ClassDump),
    /// An instance.
    Instance(InstanceDump),
    /// An object array.
    ObjectArray(ObjectArrayDump),
    /// A primitive array.
    PrimitiveArray(PrimitiveArrayDump),
}
