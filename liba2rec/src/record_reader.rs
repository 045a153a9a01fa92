use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};

use super::constants::{KNOWN_MARKERS, WORD_SIZE};
use super::error::RecordReaderError;

/// One framed record of the raw stream: a type tag plus an opaque byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub marker: u32,
    pub payload: Vec<u8>,
}

impl Record {
    /// The payload viewed as little-endian words.
    pub fn words(&self) -> Vec<u32> {
        self.payload
            .chunks_exact(WORD_SIZE)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

/// Streams framed, time-ordered binary records from a raw file.
///
/// Wire shape of one record: `marker: u32`, `length: u32` (payload bytes,
/// multiple of the word size), then `length` payload bytes, all
/// little-endian. A record boundary carries no meaning beyond framing; one
/// event block may span several records and one record may hold several
/// events.
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    source: R,
    bytes_read: u64,
    total_size: Option<u64>,
}

impl RecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, RecordReaderError> {
        if !path.exists() {
            return Err(RecordReaderError::BadFilePath(PathBuf::from(path)));
        }
        let file = File::open(path)?;
        let total_size = file.metadata()?.len();
        Ok(Self {
            source: BufReader::new(file),
            bytes_read: 0,
            total_size: Some(total_size),
        })
    }
}

impl<R: Read> RecordReader<R> {
    pub fn from_reader(source: R) -> Self {
        Self {
            source,
            bytes_read: 0,
            total_size: None,
        }
    }

    /// Bytes consumed so far, for progress reporting.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Total stream size in bytes, if known at open time.
    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Pull the next record.
    ///
    /// Returns `Ok(None)` at a clean end of stream, i.e. exactly zero bytes
    /// remaining after a complete record. A marker word outside the known set
    /// is fatal ([`RecordReaderError::DesynchronizedStream`]): the stream
    /// position cannot be recovered. Fewer payload bytes than declared yield
    /// [`RecordReaderError::TruncatedRecord`]; whether that is acceptable
    /// (natural end of file) is decided upstream.
    pub fn next_record(&mut self) -> Result<Option<Record>, RecordReaderError> {
        let marker = match self.source.read_u32::<LittleEndian>() {
            Ok(w) => w,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(RecordReaderError::IOError(e)),
        };
        if !KNOWN_MARKERS.contains(&marker) {
            return Err(RecordReaderError::DesynchronizedStream {
                marker,
                position: self.bytes_read,
            });
        }
        let length = match self.source.read_u32::<LittleEndian>() {
            Ok(w) => w,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(RecordReaderError::TruncatedRecord {
                    expected: WORD_SIZE,
                    got: 0,
                });
            }
            Err(e) => return Err(RecordReaderError::IOError(e)),
        };
        if length as usize % WORD_SIZE != 0 {
            return Err(RecordReaderError::OddRecordLength(length));
        }

        let mut payload = vec![0u8; length as usize];
        let mut filled = 0;
        while filled < payload.len() {
            match self.source.read(&mut payload[filled..]) {
                Ok(0) => {
                    return Err(RecordReaderError::TruncatedRecord {
                        expected: length as usize,
                        got: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecordReaderError::IOError(e)),
            }
        }
        self.bytes_read += (2 * WORD_SIZE + payload.len()) as u64;

        Ok(Some(Record { marker, payload }))
    }
}
