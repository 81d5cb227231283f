//! Binary encode/decode for the HPROF format.
//!
//! All integers are big-endian. Object ids are 4 or 8 bytes wide, as
//! declared in the file header. Every top-level record is framed by a
//! `u8` tag, a `u32` time offset, and a `u32` body length.

use std::io::{self, Read, Write};

use heapscope_core::{RootKind, RootPtr};

use crate::error::DumpError;
use crate::types::*;

/// Prefix every supported header string starts with.
pub const HEADER_PREFIX: &str = "JAVA PROFILE 1.0.";

/// Longest header string accepted before the terminating NUL.
const MAX_HEADER_LEN: usize = 64;

/// Largest buffer reserved ahead of reading a length-prefixed body.
const MAX_PREALLOC: usize = 1 << 20;

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), DumpError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a big-endian u16.
pub fn write_u16_be(w: &mut dyn Write, v: u16) -> Result<(), DumpError> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write a big-endian u32.
pub fn write_u32_be(w: &mut dyn Write, v: u32) -> Result<(), DumpError> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write a big-endian u64.
pub fn write_u64_be(w: &mut dyn Write, v: u64) -> Result<(), DumpError> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write an object id in `id_size` bytes.
pub fn write_id(w: &mut dyn Write, id: u64, id_size: u32) -> Result<(), DumpError> {
    if id_size == 4 {
        let narrow = u32::try_from(id).map_err(|_| DumpError::Malformed {
            detail: format!("id {id:#x} does not fit in 4 bytes"),
        })?;
        write_u32_be(w, narrow)
    } else {
        write_u64_be(w, id)
    }
}

/// Write a value in its basic type's encoding.
pub fn write_value(w: &mut dyn Write, value: &FieldValue, id_size: u32) -> Result<(), DumpError> {
    match *value {
        FieldValue::Object(id) => write_id(w, id, id_size),
        FieldValue::Boolean(b) => write_u8(w, u8::from(b)),
        FieldValue::Char(c) => write_u16_be(w, c),
        FieldValue::Float(f) => write_u32_be(w, f.to_bits()),
        FieldValue::Double(d) => write_u64_be(w, d.to_bits()),
        FieldValue::Byte(b) => write_u8(w, b as u8),
        FieldValue::Short(s) => write_u16_be(w, s as u16),
        FieldValue::Int(i) => write_u32_be(w, i as u32),
        FieldValue::Long(l) => write_u64_be(w, l as u64),
    }
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, DumpError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a big-endian u16.
pub fn read_u16_be(r: &mut dyn Read) -> Result<u16, DumpError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Read a big-endian u32.
pub fn read_u32_be(r: &mut dyn Read) -> Result<u32, DumpError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a big-endian u64.
pub fn read_u64_be(r: &mut dyn Read) -> Result<u64, DumpError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Read an object id of `id_size` bytes.
pub fn read_id(r: &mut dyn Read, id_size: u32) -> Result<u64, DumpError> {
    if id_size == 4 {
        Ok(u64::from(read_u32_be(r)?))
    } else {
        read_u64_be(r)
    }
}

/// Read exactly `len` bytes.
///
/// The buffer grows with the input, so a corrupt length cannot force a
/// huge up-front allocation.
pub fn read_bytes(r: &mut dyn Read, len: usize) -> Result<Vec<u8>, DumpError> {
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
    Read::take(&mut *r, len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

/// Read a value of type `ty`.
pub fn read_value(r: &mut dyn Read, ty: BasicType, id_size: u32) -> Result<FieldValue, DumpError> {
    Ok(match ty {
        BasicType::Object => FieldValue::Object(read_id(r, id_size)?),
        BasicType::Boolean => FieldValue::Boolean(read_u8(r)? != 0),
        BasicType::Char => FieldValue::Char(read_u16_be(r)?),
        BasicType::Float => FieldValue::Float(f32::from_bits(read_u32_be(r)?)),
        BasicType::Double => FieldValue::Double(f64::from_bits(read_u64_be(r)?)),
        BasicType::Byte => FieldValue::Byte(read_u8(r)? as i8),
        BasicType::Short => FieldValue::Short(read_u16_be(r)? as i16),
        BasicType::Int => FieldValue::Int(read_u32_be(r)? as i32),
        BasicType::Long => FieldValue::Long(read_u64_be(r)? as i64),
    })
}

/// Decode instance field bytes against a field layout.
///
/// `layout` lists field types in encoding order: the instance's own class
/// first, then each superclass. Trailing bytes beyond the layout are an
/// error, as is data that ends early.
pub fn decode_fields(
    mut data: &[u8],
    layout: &[BasicType],
    id_size: u32,
) -> Result<Vec<FieldValue>, DumpError> {
    let mut values = Vec::with_capacity(layout.len());
    for &ty in layout {
        if data.len() < ty.size(id_size) as usize {
            return Err(DumpError::Malformed {
                detail: format!(
                    "instance data ends inside field {} of {}",
                    values.len(),
                    layout.len()
                ),
            });
        }
        values.push(read_value(&mut data, ty, id_size)?);
    }
    if !data.is_empty() {
        return Err(DumpError::Malformed {
            detail: format!("{} trailing bytes after instance fields", data.len()),
        });
    }
    Ok(values)
}

// ── Header encode/decode ────────────────────────────────────────

/// Encode the file header.
pub fn encode_header(w: &mut dyn Write, header: &HprofHeader) -> Result<(), DumpError> {
    w.write_all(header.version.as_bytes())?;
    write_u8(w, 0)?;
    write_u32_be(w, header.id_size)?;
    write_u64_be(w, header.timestamp)?;
    Ok(())
}

/// Decode and validate the file header.
pub fn decode_header(r: &mut dyn Read) -> Result<HprofHeader, DumpError> {
    let mut raw = Vec::new();
    loop {
        let b = read_u8(r)?;
        if b == 0 {
            break;
        }
        raw.push(b);
        if raw.len() > MAX_HEADER_LEN {
            return Err(DumpError::InvalidHeader {
                found: String::from_utf8_lossy(&raw).into_owned(),
            });
        }
    }
    let version = String::from_utf8_lossy(&raw).into_owned();
    if !version.starts_with(HEADER_PREFIX) {
        return Err(DumpError::InvalidHeader { found: version });
    }

    let id_size = read_u32_be(r)?;
    if id_size != 4 && id_size != 8 {
        return Err(DumpError::UnsupportedIdSize { size: id_size });
    }
    let timestamp = read_u64_be(r)?;

    Ok(HprofHeader {
        version,
        id_size,
        timestamp,
    })
}

// ── Top-level record bodies ─────────────────────────────────────

/// Encode the framing of a top-level record.
pub fn encode_record_header(
    w: &mut dyn Write,
    tag: u8,
    time: u32,
    length: u32,
) -> Result<(), DumpError> {
    write_u8(w, tag)?;
    write_u32_be(w, time)?;
    write_u32_be(w, length)
}

/// Encode a `LOAD CLASS` body.
pub fn encode_load_class(w: &mut dyn Write, rec: &LoadClass, id_size: u32) -> Result<(), DumpError> {
    write_u32_be(w, rec.serial)?;
    write_id(w, rec.class_id, id_size)?;
    write_u32_be(w, rec.stack_serial)?;
    write_id(w, rec.name_id, id_size)
}

/// Decode a `LOAD CLASS` body.
pub fn decode_load_class(r: &mut dyn Read, id_size: u32) -> Result<LoadClass, DumpError> {
    Ok(LoadClass {
        serial: read_u32_be(r)?,
        class_id: read_id(r, id_size)?,
        stack_serial: read_u32_be(r)?,
        name_id: read_id(r, id_size)?,
    })
}

/// Encode a `STACK FRAME` body.
pub fn encode_stack_frame(
    w: &mut dyn Write,
    rec: &StackFrame,
    id_size: u32,
) -> Result<(), DumpError> {
    write_id(w, rec.frame_id, id_size)?;
    write_id(w, rec.method_name_id, id_size)?;
    write_id(w, rec.method_sig_id, id_size)?;
    write_id(w, rec.source_file_id, id_size)?;
    write_u32_be(w, rec.class_serial)?;
    write_u32_be(w, rec.line as u32)
}

/// Decode a `STACK FRAME` body.
pub fn decode_stack_frame(r: &mut dyn Read, id_size: u32) -> Result<StackFrame, DumpError> {
    Ok(StackFrame {
        frame_id: read_id(r, id_size)?,
        method_name_id: read_id(r, id_size)?,
        method_sig_id: read_id(r, id_size)?,
        source_file_id: read_id(r, id_size)?,
        class_serial: read_u32_be(r)?,
        line: read_u32_be(r)? as i32,
    })
}

/// Encode a `STACK TRACE` body.
pub fn encode_stack_trace(
    w: &mut dyn Write,
    rec: &StackTrace,
    id_size: u32,
) -> Result<(), DumpError> {
    write_u32_be(w, rec.serial)?;
    write_u32_be(w, rec.thread_serial)?;
    write_u32_be(w, rec.frame_ids.len() as u32)?;
    for &id in &rec.frame_ids {
        write_id(w, id, id_size)?;
    }
    Ok(())
}

/// Decode a `STACK TRACE` body.
pub fn decode_stack_trace(r: &mut dyn Read, id_size: u32) -> Result<StackTrace, DumpError> {
    let serial = read_u32_be(r)?;
    let thread_serial = read_u32_be(r)?;
    let count = read_u32_be(r)?;
    let mut frame_ids = Vec::new();
    for _ in 0..count {
        frame_ids.push(read_id(r, id_size)?);
    }
    Ok(StackTrace {
        serial,
        thread_serial,
        frame_ids,
    })
}

/// Encode a `START THREAD` body.
pub fn encode_start_thread(
    w: &mut dyn Write,
    rec: &StartThread,
    id_size: u32,
) -> Result<(), DumpError> {
    write_u32_be(w, rec.serial)?;
    write_id(w, rec.object_id, id_size)?;
    write_u32_be(w, rec.stack_serial)?;
    write_id(w, rec.name_id, id_size)?;
    write_id(w, rec.group_name_id, id_size)?;
    write_id(w, rec.parent_group_name_id, id_size)
}

/// Decode a `START THREAD` body.
pub fn decode_start_thread(r: &mut dyn Read, id_size: u32) -> Result<StartThread, DumpError> {
    Ok(StartThread {
        serial: read_u32_be(r)?,
        object_id: read_id(r, id_size)?,
        stack_serial: read_u32_be(r)?,
        name_id: read_id(r, id_size)?,
        group_name_id: read_id(r, id_size)?,
        parent_group_name_id: read_id(r, id_size)?,
    })
}

/// Encode a `HEAP SUMMARY` body.
pub fn encode_heap_summary(w: &mut dyn Write, rec: &HeapSummary) -> Result<(), DumpError> {
    write_u32_be(w, rec.live_bytes)?;
    write_u32_be(w, rec.live_instances)?;
    write_u64_be(w, rec.bytes_allocated)?;
    write_u64_be(w, rec.instances_allocated)
}

/// Decode a `HEAP SUMMARY` body.
pub fn decode_heap_summary(r: &mut dyn Read) -> Result<HeapSummary, DumpError> {
    Ok(HeapSummary {
        live_bytes: read_u32_be(r)?,
        live_instances: read_u32_be(r)?,
        bytes_allocated: read_u64_be(r)?,
        instances_allocated: read_u64_be(r)?,
    })
}

// ── Heap-dump sub-records ───────────────────────────────────────

fn root_tag(kind: RootKind) -> u8 {
    match kind {
        RootKind::JniGlobal => sub_tag::ROOT_JNI_GLOBAL,
        RootKind::JniLocal => sub_tag::ROOT_JNI_LOCAL,
        RootKind::JavaFrame => sub_tag::ROOT_JAVA_FRAME,
        RootKind::NativeStack => sub_tag::ROOT_NATIVE_STACK,
        RootKind::StickyClass => sub_tag::ROOT_STICKY_CLASS,
        RootKind::ThreadBlock => sub_tag::ROOT_THREAD_BLOCK,
        RootKind::MonitorUsed => sub_tag::ROOT_MONITOR_USED,
        RootKind::ThreadObject => sub_tag::ROOT_THREAD_OBJECT,
        // No dedicated tag in the format.
        RootKind::Unknown | RootKind::StaticField | RootKind::Vm => sub_tag::ROOT_UNKNOWN,
    }
}

/// Encode one sub-record, tag included.
///
/// JNI global reference ids and thread-object stack serials are not kept
/// on [`RootPtr`] and are written as 0.
pub fn encode_sub_record(w: &mut dyn Write, rec: &SubRecord, id_size: u32) -> Result<(), DumpError> {
    match rec {
        SubRecord::Root(root) => {
            let tag = root_tag(root.kind);
            write_u8(w, tag)?;
            write_id(w, root.target, id_size)?;
            let thread = root.thread.unwrap_or(0);
            let frame = root.frame.unwrap_or(0);
            match tag {
                sub_tag::ROOT_JNI_GLOBAL => write_id(w, 0, id_size)?,
                sub_tag::ROOT_JNI_LOCAL | sub_tag::ROOT_JAVA_FRAME => {
                    write_u32_be(w, thread)?;
                    write_u32_be(w, frame)?;
                }
                sub_tag::ROOT_NATIVE_STACK | sub_tag::ROOT_THREAD_BLOCK => {
                    write_u32_be(w, thread)?;
                }
                sub_tag::ROOT_THREAD_OBJECT => {
                    write_u32_be(w, thread)?;
                    write_u32_be(w, 0)?;
                }
                _ => {}
            }
        }
        SubRecord::Class(class) => {
            write_u8(w, sub_tag::CLASS_DUMP)?;
            write_id(w, class.class_id, id_size)?;
            write_u32_be(w, class.stack_serial)?;
            write_id(w, class.super_id, id_size)?;
            write_id(w, class.loader_id, id_size)?;
            write_id(w, class.signers_id, id_size)?;
            write_id(w, class.protection_domain_id, id_size)?;
            // Two reserved ids.
            write_id(w, 0, id_size)?;
            write_id(w, 0, id_size)?;
            write_u32_be(w, class.instance_size)?;
            write_u16_be(w, class.constants.len() as u16)?;
            for c in &class.constants {
                write_u16_be(w, c.index)?;
                write_u8(w, c.value.basic_type().tag())?;
                write_value(w, &c.value, id_size)?;
            }
            write_u16_be(w, class.statics.len() as u16)?;
            for s in &class.statics {
                write_id(w, s.name_id, id_size)?;
                write_u8(w, s.value.basic_type().tag())?;
                write_value(w, &s.value, id_size)?;
            }
            write_u16_be(w, class.fields.len() as u16)?;
            for f in &class.fields {
                write_id(w, f.name_id, id_size)?;
                write_u8(w, f.ty.tag())?;
            }
        }
        SubRecord::Instance(inst) => {
            write_u8(w, sub_tag::INSTANCE_DUMP)?;
            write_id(w, inst.id, id_size)?;
            write_u32_be(w, inst.stack_serial)?;
            write_id(w, inst.class_id, id_size)?;
            write_u32_be(w, inst.data.len() as u32)?;
            w.write_all(&inst.data)?;
        }
        SubRecord::ObjectArray(arr) => {
            write_u8(w, sub_tag::OBJECT_ARRAY_DUMP)?;
            write_id(w, arr.id, id_size)?;
            write_u32_be(w, arr.stack_serial)?;
            write_u32_be(w, arr.elements.len() as u32)?;
            write_id(w, arr.class_id, id_size)?;
            for &e in &arr.elements {
                write_id(w, e, id_size)?;
            }
        }
        SubRecord::PrimitiveArray(arr) => {
            let expected = arr.length as usize * arr.elem_type.size(id_size) as usize;
            if arr.elem_type == BasicType::Object || arr.data.len() != expected {
                return Err(DumpError::Malformed {
                    detail: format!(
                        "primitive array {:#x}: {} data bytes for {} elements of {:?}",
                        arr.id,
                        arr.data.len(),
                        arr.length,
                        arr.elem_type
                    ),
                });
            }
            write_u8(w, sub_tag::PRIMITIVE_ARRAY_DUMP)?;
            write_id(w, arr.id, id_size)?;
            write_u32_be(w, arr.stack_serial)?;
            write_u32_be(w, arr.length)?;
            write_u8(w, arr.elem_type.tag())?;
            w.write_all(&arr.data)?;
        }
    }
    Ok(())
}

fn decode_root(r: &mut dyn Read, tag: u8, id_size: u32) -> Result<RootPtr<u64>, DumpError> {
    let target = read_id(r, id_size)?;
    let root = match tag {
        sub_tag::ROOT_UNKNOWN => RootPtr::new(RootKind::Unknown, target),
        sub_tag::ROOT_JNI_GLOBAL => {
            let _global_ref = read_id(r, id_size)?;
            RootPtr::new(RootKind::JniGlobal, target)
        }
        sub_tag::ROOT_JNI_LOCAL | sub_tag::ROOT_JAVA_FRAME => {
            let kind = if tag == sub_tag::ROOT_JNI_LOCAL {
                RootKind::JniLocal
            } else {
                RootKind::JavaFrame
            };
            let mut root = RootPtr::new(kind, target);
            root.thread = Some(read_u32_be(r)?);
            root.frame = Some(read_u32_be(r)?);
            root
        }
        sub_tag::ROOT_NATIVE_STACK | sub_tag::ROOT_THREAD_BLOCK => {
            let kind = if tag == sub_tag::ROOT_NATIVE_STACK {
                RootKind::NativeStack
            } else {
                RootKind::ThreadBlock
            };
            let mut root = RootPtr::new(kind, target);
            root.thread = Some(read_u32_be(r)?);
            root
        }
        sub_tag::ROOT_STICKY_CLASS => RootPtr::new(RootKind::StickyClass, target),
        sub_tag::ROOT_MONITOR_USED => RootPtr::new(RootKind::MonitorUsed, target),
        sub_tag::ROOT_THREAD_OBJECT => {
            let mut root = RootPtr::new(RootKind::ThreadObject, target);
            root.thread = Some(read_u32_be(r)?);
            let _stack_serial = read_u32_be(r)?;
            root
        }
        _ => {
            return Err(DumpError::Malformed {
                detail: format!("tag {tag:#04x} is not a root sub-record"),
            })
        }
    };
    Ok(root)
}

fn decode_class(r: &mut dyn Read, id_size: u32) -> Result<ClassDump, DumpError> {
    let class_id = read_id(r, id_size)?;
    let stack_serial = read_u32_be(r)?;
    let super_id = read_id(r, id_size)?;
    let loader_id = read_id(r, id_size)?;
    let signers_id = read_id(r, id_size)?;
    let protection_domain_id = read_id(r, id_size)?;
    read_id(r, id_size)?;
    read_id(r, id_size)?;
    let instance_size = read_u32_be(r)?;

    let n = read_u16_be(r)?;
    let mut constants = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let index = read_u16_be(r)?;
        let ty = BasicType::from_tag(read_u8(r)?)?;
        constants.push(ConstantEntry {
            index,
            value: read_value(r, ty, id_size)?,
        });
    }

    let n = read_u16_be(r)?;
    let mut statics = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let name_id = read_id(r, id_size)?;
        let ty = BasicType::from_tag(read_u8(r)?)?;
        statics.push(StaticField {
            name_id,
            value: read_value(r, ty, id_size)?,
        });
    }

    let n = read_u16_be(r)?;
    let mut fields = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let name_id = read_id(r, id_size)?;
        let ty = BasicType::from_tag(read_u8(r)?)?;
        fields.push(FieldDecl { name_id, ty });
    }

    Ok(ClassDump {
        class_id,
        stack_serial,
        super_id,
        loader_id,
        signers_id,
        protection_domain_id,
        instance_size,
        constants,
        statics,
        fields,
    })
}

/// Decode one sub-record whose tag has already been read.
///
/// `offset` is only used for error reporting.
pub fn decode_sub_record(
    r: &mut dyn Read,
    tag: u8,
    id_size: u32,
    offset: usize,
) -> Result<SubRecord, DumpError> {
    match tag {
        sub_tag::ROOT_UNKNOWN | sub_tag::ROOT_JNI_GLOBAL..=sub_tag::ROOT_THREAD_OBJECT => {
            Ok(SubRecord::Root(decode_root(r, tag, id_size)?))
        }
        sub_tag::CLASS_DUMP => Ok(SubRecord::Class(decode_class(r, id_size)?)),
        sub_tag::INSTANCE_DUMP => {
            let id = read_id(r, id_size)?;
            let stack_serial = read_u32_be(r)?;
            let class_id = read_id(r, id_size)?;
            let len = read_u32_be(r)? as usize;
            Ok(SubRecord::Instance(InstanceDump {
                id,
                stack_serial,
                class_id,
                data: read_bytes(r, len)?,
            }))
        }
        sub_tag::OBJECT_ARRAY_DUMP => {
            let id = read_id(r, id_size)?;
            let stack_serial = read_u32_be(r)?;
            let length = read_u32_be(r)?;
            let class_id = read_id(r, id_size)?;
            let mut elements = Vec::new();
            for _ in 0..length {
                elements.push(read_id(r, id_size)?);
            }
            Ok(SubRecord::ObjectArray(ObjectArrayDump {
                id,
                stack_serial,
                class_id,
                elements,
            }))
        }
        sub_tag::PRIMITIVE_ARRAY_DUMP => {
            let id = read_id(r, id_size)?;
            let stack_serial = read_u32_be(r)?;
            let length = read_u32_be(r)?;
            let elem_type = BasicType::from_tag(read_u8(r)?)?;
            if elem_type == BasicType::Object {
                return Err(DumpError::Malformed {
                    detail: format!("primitive array {id:#x} declares object elements"),
                });
            }
            let len = length as usize * elem_type.size(id_size) as usize;
            Ok(SubRecord::PrimitiveArray(PrimitiveArrayDump {
                id,
                stack_serial,
                elem_type,
                length,
                data: read_bytes(r, len)?,
            }))
        }
        _ => Err(DumpError::UnknownSubRecord { tag, offset }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = HprofHeader {
            version: "JAVA PROFILE 1.0.2".into(),
            id_size: 8,
            timestamp: 1_700_000_000_000,
        };
        let mut buf = Vec::new();
        encode_header(&mut buf, &header).unwrap();
        let decoded = decode_header(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_rejects_foreign_magic() {
        let mut buf = b"NOT A PROFILE\0".to_vec();
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(&0u64.to_be_bytes());
        match decode_header(&mut buf.as_slice()) {
            Err(DumpError::InvalidHeader { found }) => assert_eq!(found, "NOT A PROFILE"),
            other => panic!("expected InvalidHeader, got {other:?}"),
        }
    }

    #[test]
    fn header_rejects_odd_id_size() {
        let mut buf = b"JAVA PROFILE 1.0.1\0".to_vec();
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&0u64.to_be_bytes());
        assert!(matches!(
            decode_header(&mut buf.as_slice()),
            Err(DumpError::UnsupportedIdSize { size: 2 })
        ));
    }

    #[test]
    fn narrow_ids_reject_wide_values() {
        let mut buf = Vec::new();
        assert!(write_id(&mut buf, 0x1_0000_0000, 4).is_err());
        write_id(&mut buf, 0xDEAD_BEEF, 4).unwrap();
        assert_eq!(read_id(&mut buf.as_slice(), 4).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn fields_decode_in_layout_order() {
        let mut data = Vec::new();
        write_value(&mut data, &FieldValue::Object(200), 4).unwrap();
        write_value(&mut data, &FieldValue::Int(-7), 4).unwrap();
        write_value(&mut data, &FieldValue::Boolean(true), 4).unwrap();
        let values = decode_fields(
            &data,
            &[BasicType::Object, BasicType::Int, BasicType::Boolean],
            4,
        )
        .unwrap();
        assert_eq!(
            values,
            vec![
                FieldValue::Object(200),
                FieldValue::Int(-7),
                FieldValue::Boolean(true)
            ]
        );
    }

    #[test]
    fn fields_reject_short_and_long_data() {
        assert!(decode_fields(&[0, 0], &[BasicType::Int], 4).is_err());
        assert!(decode_fields(&[0, 0, 0, 0, 1], &[BasicType::Int], 4).is_err());
    }

    #[test]
    fn java_frame_root_keeps_thread_and_frame() {
        let mut root = RootPtr::new(RootKind::JavaFrame, 0x40u64);
        root.thread = Some(3);
        root.frame = Some(1);
        let mut buf = Vec::new();
        encode_sub_record(&mut buf, &SubRecord::Root(root.clone()), 8).unwrap();
        let mut r = buf.as_slice();
        let tag = read_u8(&mut r).unwrap();
        let decoded = decode_sub_record(&mut r, tag, 8, 0).unwrap();
        assert_eq!(decoded, SubRecord::Root(root));
        assert!(r.is_empty());
    }

    #[test]
    fn unknown_sub_record_reports_offset() {
        let mut r: &[u8] = &[];
        assert!(matches!(
            decode_sub_record(&mut r, 0x42, 8, 17),
            Err(DumpError::UnknownSubRecord {
                tag: 0x42,
                offset: 17
            })
        ));
    }
}
