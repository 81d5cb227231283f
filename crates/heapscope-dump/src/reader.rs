//! HPROF stream reader.
//!
//! [`HprofReader`] reads records from any `Read` source and hands them to
//! a [`RecordHandler`]. The header is validated on construction.

use std::io::{self, Read};

use crate::codec::*;
use crate::error::DumpError;
use crate::handler::{dispatch_sub_record, RecordHandler};
use crate::types::{tag, HprofHeader};

/// Reads a heap dump from a byte stream.
///
/// Generic over `R: Read` so tests can use `&[u8]` and production
/// code can use `BufReader<File>`.
pub struct HprofReader<R: Read> {
    reader: R,
    header: HprofHeader,
    records_read: u64,
    done: bool,
}

impl<R: Read> HprofReader<R> {
    /// Open a dump stream, reading and validating the header.
    pub fn open(mut reader: R) -> Result<Self, DumpError> {
        let header = decode_header(&mut reader)?;
        log::debug!(
            "opened {} dump, {}-byte ids, timestamp {}",
            header.version,
            header.id_size,
            header.timestamp
        );
        Ok(Self {
            reader,
            header,
            records_read: 0,
            done: false,
        })
    }

    /// The file header.
    pub fn header(&self) -> &HprofHeader {
        &self.header
    }

    /// Number of top-level records read so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Read one top-level record into `handler`.
    ///
    /// Returns `false` once the stream is exhausted, after calling
    /// [`RecordHandler::finished`]. The end of the stream must fall on a
    /// record boundary; anything else is reported as malformed.
    pub fn read_record(&mut self, handler: &mut dyn RecordHandler) -> Result<bool, DumpError> {
        if self.done {
            return Ok(false);
        }
        let Some(record_tag) = self.read_tag()? else {
            self.done = true;
            handler.finished()?;
            return Ok(false);
        };
        let _time = read_u32_be(&mut self.reader).map_err(truncated)?;
        let length = read_u32_be(&mut self.reader).map_err(truncated)?;
        let body = read_bytes(&mut self.reader, length as usize).map_err(truncated)?;
        let id_size = self.header.id_size;
        let mut r = body.as_slice();

        match record_tag {
            tag::UTF8 => {
                let id = read_id(&mut r, id_size).map_err(truncated)?;
                handler.string(id, r)?;
            }
            tag::LOAD_CLASS => {
                let rec = decode_load_class(&mut r, id_size).map_err(truncated)?;
                handler.load_class(&rec)?;
            }
            tag::UNLOAD_CLASS => {
                let serial = read_u32_be(&mut r).map_err(truncated)?;
                handler.unload_class(serial)?;
            }
            tag::STACK_FRAME => {
                let rec = decode_stack_frame(&mut r, id_size).map_err(truncated)?;
                handler.stack_frame(&rec)?;
            }
            tag::STACK_TRACE => {
                let rec = decode_stack_trace(&mut r, id_size).map_err(truncated)?;
                handler.stack_trace(&rec)?;
            }
            tag::START_THREAD => {
                let rec = decode_start_thread(&mut r, id_size).map_err(truncated)?;
                handler.start_thread(&rec)?;
            }
            tag::END_THREAD => {
                let serial = read_u32_be(&mut r).map_err(truncated)?;
                handler.end_thread(serial)?;
            }
            tag::HEAP_SUMMARY => {
                let rec = decode_heap_summary(&mut r).map_err(truncated)?;
                handler.heap_summary(&rec)?;
            }
            tag::HEAP_DUMP | tag::HEAP_DUMP_SEGMENT => {
                handler.heap_dump_start()?;
                read_segment(&body, id_size, handler)?;
                handler.heap_dump_end()?;
            }
            tag::HEAP_DUMP_END => {}
            other => {
                log::debug!("skipping record with unknown tag {other:#04x} ({length} bytes)");
                handler.unknown_record(other, length)?;
            }
        }
        self.records_read += 1;
        Ok(true)
    }

    /// Read every remaining record into `handler`.
    ///
    /// Returns the number of top-level records read by this call.
    pub fn read_all(&mut self, handler: &mut dyn RecordHandler) -> Result<u64, DumpError> {
        let before = self.records_read;
        while self.read_record(handler)? {}
        Ok(self.records_read - before)
    }

    /// Read the next record tag, or `None` at a clean end of stream.
    fn read_tag(&mut self) -> Result<Option<u8>, DumpError> {
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn read_segment(
    body: &[u8],
    id_size: u32,
    handler: &mut dyn RecordHandler,
) -> Result<(), DumpError> {
    let mut r = body;
    while !r.is_empty() {
        let offset = body.len() - r.len();
        let sub_tag = read_u8(&mut r)?;
        let rec = decode_sub_record(&mut r, sub_tag, id_size, offset).map_err(truncated)?;
        dispatch_sub_record(handler, rec)?;
    }
    Ok(())
}

/// Map an early end of data inside a record to [`DumpError::Malformed`].
fn truncated(e: DumpError) -> DumpError {
    match e {
        DumpError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => DumpError::Malformed {
            detail: "record truncated".into(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use crate::writer::HprofWriter;

    #[derive(Default)]
    struct Counter {
        strings: Vec<(u64, String)>,
        instances: usize,
        roots: usize,
        segments: usize,
        unknown: Vec<u8>,
        finished: bool,
    }

    impl RecordHandler for Counter {
        fn string(&mut self, id: u64, bytes: &[u8]) -> Result<(), DumpError> {
            self.strings
                .push((id, String::from_utf8_lossy(bytes).into_owned()));
            Ok(())
        }
        fn instance_dump(&mut self, _: InstanceDump) -> Result<(), DumpError> {
            self.instances += 1;
            Ok(())
        }
        fn root(&mut self, _: heapscope_core::RootPtr<u64>) -> Result<(), DumpError> {
            self.roots += 1;
            Ok(())
        }
        fn heap_dump_start(&mut self) -> Result<(), DumpError> {
            self.segments += 1;
            Ok(())
        }
        fn unknown_record(&mut self, tag: u8, _: u32) -> Result<(), DumpError> {
            self.unknown.push(tag);
            Ok(())
        }
        fn finished(&mut self) -> Result<(), DumpError> {
            self.finished = true;
            Ok(())
        }
    }

    fn sample(id_size: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut w = HprofWriter::new(&mut buf, id_size, 99).unwrap();
        w.write_string(1, "Foo").unwrap();
        w.write_heap_dump_segment(&[
            SubRecord::Root(heapscope_core::RootPtr::new(
                heapscope_core::RootKind::StickyClass,
                0x10,
            )),
            SubRecord::Instance(InstanceDump {
                id: 0x20,
                stack_serial: 0,
                class_id: 0x10,
                data: vec![],
            }),
        ])
        .unwrap();
        w.write_heap_dump_end().unwrap();
        buf
    }

    #[test]
    fn reads_all_records() {
        for id_size in [4, 8] {
            let buf = sample(id_size);
            let mut reader = HprofReader::open(buf.as_slice()).unwrap();
            assert_eq!(reader.header().id_size, id_size);
            assert_eq!(reader.header().timestamp, 99);
            let mut counter = Counter::default();
            assert_eq!(reader.read_all(&mut counter).unwrap(), 3);
            assert_eq!(counter.strings, vec![(1, "Foo".to_string())]);
            assert_eq!(counter.instances, 1);
            assert_eq!(counter.roots, 1);
            assert_eq!(counter.segments, 1);
            assert!(counter.finished);
            assert!(!reader.read_record(&mut counter).unwrap());
        }
    }

    #[test]
    fn unknown_top_level_records_are_skipped() {
        let mut buf = Vec::new();
        HprofWriter::new(&mut buf, 8, 0).unwrap();
        encode_record_header(&mut buf, 0x55, 0, 3).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        let mut w = Vec::new();
        encode_record_header(&mut w, tag::UNLOAD_CLASS, 0, 4).unwrap();
        write_u32_be(&mut w, 7).unwrap();
        buf.extend_from_slice(&w);

        let mut counter = Counter::default();
        let mut reader = HprofReader::open(buf.as_slice()).unwrap();
        assert_eq!(reader.read_all(&mut counter).unwrap(), 2);
        assert_eq!(counter.unknown, vec![0x55]);
    }

    #[test]
    fn truncated_record_is_malformed() {
        let buf = sample(8);
        let cut = &buf[..buf.len() - 12];
        let mut reader = HprofReader::open(cut).unwrap();
        let err = reader.read_all(&mut Counter::default()).unwrap_err();
        assert!(matches!(err, DumpError::Malformed { .. }), "{err}");
    }

    #[test]
    fn unknown_sub_record_aborts() {
        let mut buf = Vec::new();
        HprofWriter::new(&mut buf, 8, 0).unwrap();
        encode_record_header(&mut buf, tag::HEAP_DUMP_SEGMENT, 0, 1).unwrap();
        buf.push(0x99);
        let mut reader = HprofReader::open(buf.as_slice()).unwrap();
        assert!(matches!(
            reader.read_all(&mut Counter::default()),
            Err(DumpError::UnknownSubRecord { tag: 0x99, offset: 0 })
        ));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Header string, NUL, id size, timestamp.
        const HEADER_LEN: usize = crate::writer::WRITER_VERSION.len() + 1 + 4 + 8;

        proptest! {
            #[test]
            fn any_cut_is_complete_or_malformed(id_size in prop::sample::select(vec![4u32, 8]), cut in 0usize..200) {
                let buf = sample(id_size);
                let end = HEADER_LEN + cut % (buf.len() - HEADER_LEN + 1);
                let mut reader = HprofReader::open(&buf[..end]).unwrap();
                match reader.read_all(&mut Counter::default()) {
                    Ok(_) => {}
                    Err(DumpError::Malformed { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }

            #[test]
            fn garbage_after_header_never_panics(body in prop::collection::vec(any::<u8>(), 0..256)) {
                let mut buf = Vec::new();
                HprofWriter::new(&mut buf, 8, 0).unwrap();
                buf.extend_from_slice(&body);
                let mut reader = HprofReader::open(buf.as_slice()).unwrap();
                let _ = reader.read_all(&mut Counter::default());
            }
        }
    }
}
