use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::acqu_format::AcquFormat;
use super::constants::{EGEANT_HEAD, EHEAD};
use super::error::{RecordReaderError, UnpackerError};
use super::event::RawEventBlock;
use super::geant_format::GeantFormat;
use super::message::UnpackerMessage;
use super::record_reader::RecordReader;

/// The polymorphic stream decoder.
///
/// The variant is selected exactly once at open time by the signature of the
/// leading header record, so dispatch is static per opened stream. Whatever
/// the variant, `next_event` yields the same [`RawEventBlock`] shape; the
/// reconstruction never needs to know which format it is fed.
#[derive(Debug)]
pub enum Unpacker<R: Read> {
    Acqu(AcquFormat<R>),
    A2Geant(GeantFormat<R>),
}

impl Unpacker<BufReader<File>> {
    /// Open a raw file, sniffing the format from the first record marker.
    ///
    /// Fails with [`UnpackerError::UnsupportedFormat`] if no variant's header
    /// signature matches.
    pub fn open(path: &Path) -> Result<Self, UnpackerError> {
        let mut reader = RecordReader::open(path)?;
        let header_record = match reader.next_record() {
            Ok(Some(r)) => r,
            Ok(None) => return Err(UnpackerError::UnsupportedFormat(path.to_path_buf())),
            // an unknown leading marker is not desynchronization, it is
            // simply not a format we speak
            Err(RecordReaderError::DesynchronizedStream { .. }) => {
                return Err(UnpackerError::UnsupportedFormat(path.to_path_buf()));
            }
            Err(e) => return Err(UnpackerError::RecordError(e)),
        };
        match header_record.marker {
            EHEAD => Ok(Unpacker::Acqu(AcquFormat::new(reader, &header_record)?)),
            EGEANT_HEAD => Ok(Unpacker::A2Geant(GeantFormat::new(reader, &header_record)?)),
            _ => Err(UnpackerError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

impl<R: Read> Unpacker<R> {
    /// Variant dispatch over an already-opened record reader. Used when the
    /// byte source is not a file on disk.
    pub fn from_record_reader(mut reader: RecordReader<R>) -> Result<Self, UnpackerError> {
        let unknown = || UnpackerError::UnsupportedFormat(std::path::PathBuf::from("<stream>"));
        let header_record = match reader.next_record() {
            Ok(Some(r)) => r,
            Ok(None) => return Err(unknown()),
            Err(RecordReaderError::DesynchronizedStream { .. }) => return Err(unknown()),
            Err(e) => return Err(UnpackerError::RecordError(e)),
        };
        match header_record.marker {
            EHEAD => Ok(Unpacker::Acqu(AcquFormat::new(reader, &header_record)?)),
            EGEANT_HEAD => Ok(Unpacker::A2Geant(GeantFormat::new(reader, &header_record)?)),
            _ => Err(unknown()),
        }
    }

    /// Pull the next event block, format-agnostic.
    pub fn next_event(&mut self) -> Result<Option<RawEventBlock>, UnpackerError> {
        match self {
            Unpacker::Acqu(u) => u.next_event(),
            Unpacker::A2Geant(u) => u.next_event(),
        }
    }

    /// Diagnostics not attributed to any emitted block (header summaries,
    /// trailing truncation notices).
    pub fn drain_messages(&mut self) -> Vec<UnpackerMessage> {
        match self {
            Unpacker::Acqu(u) => u.drain_messages(),
            Unpacker::A2Geant(u) => u.drain_messages(),
        }
    }

    pub fn run_number(&self) -> u32 {
        match self {
            Unpacker::Acqu(u) => u.header().run_number,
            Unpacker::A2Geant(u) => u.header().run_number,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Unpacker::Acqu(_) => "Acqu",
            Unpacker::A2Geant(_) => "A2Geant",
        }
    }

    pub fn bytes_read(&self) -> u64 {
        match self {
            Unpacker::Acqu(u) => u.bytes_read(),
            Unpacker::A2Geant(u) => u.bytes_read(),
        }
    }

    pub fn total_size(&self) -> Option<u64> {
        match self {
            Unpacker::Acqu(u) => u.total_size(),
            Unpacker::A2Geant(u) => u.total_size(),
        }
    }
}
