//! Callback interface driven by [`HprofReader`](crate::reader::HprofReader).

use heapscope_core::RootPtr;

use crate::error::DumpError;
use crate::types::*;

/// Receives decoded records in file order.
///
/// Every method defaults to ignoring its record. Returning an error stops
/// the reader, which hands the error back to its caller unchanged.
#[allow(unused_variables)]
pub trait RecordHandler {
    /// The file header was read.
    fn header(&mut self, header: &HprofHeader) -> Result<(), DumpError> {
        Ok(())
    }

    /// A `UTF8` record: string id and its bytes.
    fn string(&mut self, id: u64, bytes: &[u8]) -> Result<(), DumpError> {
        Ok(())
    }

    /// A `LOAD CLASS` record.
    fn load_class(&mut self, rec: &LoadClass) -> Result<(), DumpError> {
        Ok(())
    }

    /// An `UNLOAD CLASS` record.
    fn unload_class(&mut self, serial: u32) -> Result<(), DumpError> {
        Ok(())
    }

    /// A `STACK FRAME` record.
    fn stack_frame(&mut self, rec: &StackFrame) -> Result<(), DumpError> {
        Ok(())
    }

    /// A `STACK TRACE` record.
    fn stack_trace(&mut self, rec: &StackTrace) -> Result<(), DumpError> {
        Ok(())
    }

    /// A `START THREAD` record.
    fn start_thread(&mut self, rec: &StartThread) -> Result<(), DumpError> {
        Ok(())
    }

    /// An `END THREAD` record.
    fn end_thread(&mut self, serial: u32) -> Result<(), DumpError> {
        Ok(())
    }

    /// A `HEAP SUMMARY` record.
    fn heap_summary(&mut self, rec: &HeapSummary) -> Result<(), DumpError> {
        Ok(())
    }

    /// A heap dump or heap-dump segment begins.
    fn heap_dump_start(&mut self) -> Result<(), DumpError> {
        Ok(())
    }

    /// A heap dump or heap-dump segment ended.
    fn heap_dump_end(&mut self) -> Result<(), DumpError> {
        Ok(())
    }

    /// A root sub-record.
    fn root(&mut self, root: RootPtr<u64>) -> Result<(), DumpError> {
        Ok(())
    }

    /// A class dump.
    fn class_dump(&mut self, class: ClassDump) -> Result<(), DumpError> {
        Ok(())
    }

    /// An instance dump.
    fn instance_dump(&mut self, instance: InstanceDump) -> Result<(), DumpError> {
        Ok(())
    }

    /// An object array dump.
    fn object_array_dump(&mut self, array: ObjectArrayDump) -> Result<(), DumpError> {
        Ok(())
    }

    /// A primitive array dump.
    fn primitive_array_dump(&mut self, array: PrimitiveArrayDump) -> Result<(), DumpError> {
        Ok(())
    }

    /// A top-level record with an unrecognized tag; its body was skipped.
    fn unknown_record(&mut self, tag: u8, length: u32) -> Result<(), DumpError> {
        Ok(())
    }

    /// The end of the stream was reached.
    fn finished(&mut self) -> Result<(), DumpError> {
        Ok(())
    }
}

/// Route a decoded sub-record to its handler method.
pub(crate) fn dispatch_sub_record(
    handler: &mut dyn RecordHandler,
    rec: SubRecord,
) -> Result<(), DumpError> {
    match rec {
        SubRecord::Root(root) => handler.root(root),
        SubRecord::Class(class) => handler.class_dump(class),
        SubRecord::Instance(inst) => handler.instance_dump(inst),
        SubRecord::ObjectArray(arr) => handler.object_array_dump(arr),
        SubRecord::PrimitiveArray(arr) => handler.primitive_array_dump(arr),
    }
}
