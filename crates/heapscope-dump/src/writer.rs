//! HPROF stream writer.
//!
//! [`HprofWriter`] streams records to any `Write` sink. The header is
//! written immediately on construction. Record bodies are encoded into a
//! scratch buffer first so their length prefix is exact.

use std::io::Write;

use crate::codec::*;
use crate::error::DumpError;
use crate::types::*;

/// Header string written by [`HprofWriter`].
pub const WRITER_VERSION: &str = "JAVA PROFILE 1.0.2";

/// Writes a heap dump to a byte stream.
///
/// Generic over `W: Write` so tests can use `Vec<u8>` and production
/// code can use `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use heapscope_dump::{
///     BasicType, ClassDump, FieldDecl, HeapDumpResolver, HprofReader, HprofWriter,
///     InstanceDump, PointerTarget, ResolverConfig, SubRecord,
/// };
///
/// let node = ClassDump {
///     class_id: 1,
///     stack_serial: 0,
///     super_id: 0,
///     loader_id: 0,
///     signers_id: 0,
///     protection_domain_id: 0,
///     instance_size: 8,
///     constants: vec![],
///     statics: vec![],
///     fields: vec![FieldDecl { name_id: 2, ty: BasicType::Object }],
/// };
/// let instance = |id: u64, next: u64| InstanceDump {
///     id,
///     stack_serial: 0,
///     class_id: 1,
///     data: next.to_be_bytes().to_vec(),
/// };
///
/// let mut buf = Vec::new();
/// let mut writer = HprofWriter::new(&mut buf, 8, 0).unwrap();
/// writer.write_string(2, "next").unwrap();
/// writer
///     .write_heap_dump_segment(&[
///         SubRecord::Class(node),
///         SubRecord::Instance(instance(100, 200)),
///         SubRecord::Instance(instance(200, 0)),
///     ])
///     .unwrap();
/// writer.write_heap_dump_end().unwrap();
/// assert_eq!(writer.records_written(), 3);
/// drop(writer);
///
/// let reader = HprofReader::open(buf.as_slice()).unwrap();
/// let heap = HeapDumpResolver::new(ResolverConfig::default())
///     .resolve(reader)
///     .unwrap();
/// let a = heap.index_of(100).unwrap();
/// let b = heap.index_of(200).unwrap();
/// assert_eq!(heap.to_pointers[a.as_usize()], vec![PointerTarget::Object(b)]);
/// assert_eq!(heap.from_pointers[b.as_usize()], vec![a]);
/// ```
pub struct HprofWriter<W: Write> {
    writer: W,
    id_size: u32,
    scratch: Vec<u8>,
    records_written: u64,
}

impl<W: Write> HprofWriter<W> {
    /// Create a new writer, immediately writing the header.
    pub fn new(mut writer: W, id_size: u32, timestamp: u64) -> Result<Self, DumpError> {
        if id_size != 4 && id_size != 8 {
            return Err(DumpError::UnsupportedIdSize { size: id_size });
        }
        let header = HprofHeader {
            version: WRITER_VERSION.to_string(),
            id_size,
            timestamp,
        };
        encode_header(&mut writer, &header)?;
        Ok(Self {
            writer,
            id_size,
            scratch: Vec::new(),
            records_written: 0,
        })
    }

    /// Identifier width in bytes.
    pub fn id_size(&self) -> u32 {
        self.id_size
    }

    /// Write a `UTF8` string record.
    pub fn write_string(&mut self, id: u64, s: &str) -> Result<(), DumpError> {
        self.record(tag::UTF8, |w, id_size| {
            write_id(w, id, id_size)?;
            w.write_all(s.as_bytes())?;
            Ok(())
        })
    }

    /// Write a `LOAD CLASS` record.
    pub fn write_load_class(&mut self, rec: &LoadClass) -> Result<(), DumpError> {
        self.record(tag::LOAD_CLASS, |w, id_size| encode_load_class(w, rec, id_size))
    }

    /// Write an `UNLOAD CLASS` record.
    pub fn write_unload_class(&mut self, serial: u32) -> Result<(), DumpError> {
        self.record(tag::UNLOAD_CLASS, |w, _| write_u32_be(w, serial))
    }

    /// Write a `STACK FRAME` record.
    pub fn write_stack_frame(&mut self, rec: &StackFrame) -> Result<(), DumpError> {
        self.record(tag::STACK_FRAME, |w, id_size| {
            encode_stack_frame(w, rec, id_size)
        })
    }

    /// Write a `STACK TRACE` record.
    pub fn write_stack_trace(&mut self, rec: &StackTrace) -> Result<(), DumpError> {
        self.record(tag::STACK_TRACE, |w, id_size| {
            encode_stack_trace(w, rec, id_size)
        })
    }

    /// Write a `START THREAD` record.
    pub fn write_start_thread(&mut self, rec: &StartThread) -> Result<(), DumpError> {
        self.record(tag::START_THREAD, |w, id_size| {
            encode_start_thread(w, rec, id_size)
        })
    }

    /// Write an `END THREAD` record.
    pub fn write_end_thread(&mut self, serial: u32) -> Result<(), DumpError> {
        self.record(tag::END_THREAD, |w, _| write_u32_be(w, serial))
    }

    /// Write a `HEAP SUMMARY` record.
    pub fn write_heap_summary(&mut self, rec: &HeapSummary) -> Result<(), DumpError> {
        self.record(tag::HEAP_SUMMARY, |w, _| encode_heap_summary(w, rec))
    }

    /// Write a complete, unsegmented `HEAP DUMP` record.
    pub fn write_heap_dump(&mut self, records: &[SubRecord]) -> Result<(), DumpError> {
        self.record(tag::HEAP_DUMP, |w, id_size| {
            records
                .iter()
                .try_for_each(|rec| encode_sub_record(w, rec, id_size))
        })
    }

    /// Write one `HEAP DUMP SEGMENT` record.
    pub fn write_heap_dump_segment(&mut self, records: &[SubRecord]) -> Result<(), DumpError> {
        self.record(tag::HEAP_DUMP_SEGMENT, |w, id_size| {
            records
                .iter()
                .try_for_each(|rec| encode_sub_record(w, rec, id_size))
        })
    }

    /// Write the `HEAP DUMP END` record closing a segmented dump.
    pub fn write_heap_dump_end(&mut self) -> Result<(), DumpError> {
        self.record(tag::HEAP_DUMP_END, |_, _| Ok(()))
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), DumpError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Consume the writer and return the underlying `Write` sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn record(
        &mut self,
        record_tag: u8,
        body: impl FnOnce(&mut dyn Write, u32) -> Result<(), DumpError>,
    ) -> Result<(), DumpError> {
        self.scratch.clear();
        body(&mut self.scratch, self.id_size)?;
        let length = u32::try_from(self.scratch.len()).map_err(|_| DumpError::Malformed {
            detail: format!("record body of {} bytes exceeds u32", self.scratch.len()),
        })?;
        encode_record_header(&mut self.writer, record_tag, 0, length)?;
        self.writer.write_all(&self.scratch)?;
        self.records_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_id_size() {
        assert!(matches!(
            HprofWriter::new(Vec::new(), 2, 0),
            Err(DumpError::UnsupportedIdSize { size: 2 })
        ));
    }

    #[test]
    fn string_record_framing() {
        let mut w = HprofWriter::new(Vec::new(), 4, 0).unwrap();
        w.write_string(7, "ab").unwrap();
        let buf = w.into_inner();
        let body_start = WRITER_VERSION.len() + 1 + 4 + 8;
        assert_eq!(
            &buf[body_start..],
            &[tag::UTF8, 0, 0, 0, 0, 0, 0, 0, 6, 0, 0, 0, 7, b'a', b'b']
        );
    }

    #[test]
    fn invalid_primitive_array_is_rejected_before_writing() {
        let mut w = HprofWriter::new(Vec::new(), 8, 0).unwrap();
        let bad = PrimitiveArrayDump {
            id: 1,
            stack_serial: 0,
            elem_type: BasicType::Int,
            length: 2,
            data: vec![0; 4],
        };
        assert!(w
            .write_heap_dump_segment(&[SubRecord::PrimitiveArray(bad)])
            .is_err());
        assert_eq!(w.records_written(), 0);
    }
}
