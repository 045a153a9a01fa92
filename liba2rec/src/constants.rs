//! Marker words of the raw stream framing and the Acqu event grammar.

/// Word size of the raw stream in bytes. All framing is u32 little-endian.
pub const WORD_SIZE: usize = 4;

/// Record marker of the Acqu file header record.
pub const EHEAD: u32 = 0x1000_2200;
/// Record marker of an Acqu Mk2 data record.
pub const EDATABUFF: u32 = 0x1000_1002;
/// Record marker of the A2Geant file header record.
pub const EGEANT_HEAD: u32 = 0x1000_4D43;
/// Record marker of one A2Geant event record.
pub const EGEANT_EVENT: u32 = 0x1000_4D45;

/// All record markers the framing layer accepts. Anything else means the
/// reader has lost synchronization.
pub const KNOWN_MARKERS: [u32; 4] = [EHEAD, EDATABUFF, EGEANT_HEAD, EGEANT_EVENT];

/// Terminates the content words of one Acqu event block.
pub const EEND_EVENT: u32 = 0xFFFF_FFFF;
/// Frames a scaler (slow-control) sub-block inside an Acqu event.
pub const ESCALER: u32 = 0xFEFE_FEFE;
/// Introduces a 3-word DAQ error record inside an Acqu event.
pub const EREAD_ERROR: u32 = 0xEFEF_EFEF;

/// Magic word at the start of the A2Geant header payload ("A2MC").
pub const GEANT_MAGIC: u32 = 0x434D_3241;

/// Acqu Mk2 format version this unpacker understands.
pub const ACQU_MK2_VERSION: u32 = 2;

/// Per-module word count of the Acqu header module table.
pub const MODULE_TABLE_WORDS: usize = 4;

/// Upper bound on the declared word count of one event block. Anything
/// larger is treated as a corrupt length word.
pub const MAX_EVENT_WORDS: u32 = 0x0010_0000;
