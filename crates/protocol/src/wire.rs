//! Fixed wire structures exchanged verbatim with the search service.
//!
//! Every structure is a run of 32-bit little-endian words with no padding,
//! in declared order. Structures are encoded and parsed field by field; a
//! received buffer is never reinterpreted in place, so alignment and the
//! lifetime of the backing allocation never matter.
//!
//! | Structure | Size | Layout |
//! |-----------|------|--------|
//! | [`QueryHeader`] | 20 | endpoint, reply tag, flags, offset, max results; then a NUL-terminated UTF-16 string |
//! | [`ResultListHeader`] | 28 | totals (folders, files, items), available (folders, files, items), offset |
//! | [`ResultItem`] | 12 | flags, filename byte offset, path byte offset |

use crate::{EndpointId, ItemFlags, QueryId, QueryOptions, SearchFlags};

// ---------------------------------------------------------------------------
// Bounds-checked reader
// ---------------------------------------------------------------------------

/// Sequential reader over a byte buffer. Every read checks the remaining
/// length first and returns `None` instead of reading past the end.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Creates a reader positioned at `pos`. A position past the end simply
    /// leaves nothing to read.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Reads one little-endian `u32` and advances past it.
    pub fn read_u32(&mut self) -> Option<u32> {
        let end = self.pos.checked_add(4)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Reads the NUL-terminated UTF-16LE string starting at byte `offset`.
///
/// Returns `None` if `offset` lies outside the buffer or no terminator is
/// found before the end of the buffer. Unpaired surrogates decode to U+FFFD.
pub fn read_wide_str(buf: &[u8], offset: u32) -> Option<String> {
    let start = usize::try_from(offset).ok()?;
    let tail = buf.get(start..)?;
    let mut units = Vec::new();
    for pair in tail.chunks_exact(2) {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        if unit == 0 {
            return Some(String::from_utf16_lossy(&units));
        }
        units.push(unit);
    }
    None
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// The fixed part of a query payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryHeader {
    /// Endpoint the service must deliver the reply to.
    pub reply_endpoint: EndpointId,
    /// Tag the service attaches to the reply delivery.
    pub reply_tag: QueryId,
    pub flags: SearchFlags,
    /// Index of the first result to return.
    pub offset: u32,
    pub max_results: u32,
}

impl QueryHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;

    fn write_to(&self, out: &mut Vec<u8>) {
        for word in [
            self.reply_endpoint.as_u32(),
            self.reply_tag.as_u32(),
            self.flags.bits(),
            self.offset,
            self.max_results,
        ] {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
}

/// A complete, immutable query: the header plus the search string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    header: QueryHeader,
    terms: String,
}

impl QueryRequest {
    pub fn new(
        terms: impl Into<String>,
        options: &QueryOptions,
        reply_endpoint: EndpointId,
        query_id: QueryId,
    ) -> Self {
        Self {
            header: QueryHeader {
                reply_endpoint,
                reply_tag: query_id,
                flags: options.flags(),
                offset: options.offset(),
                max_results: options.limit(),
            },
            terms: terms.into(),
        }
    }

    pub fn header(&self) -> &QueryHeader {
        &self.header
    }

    pub fn terms(&self) -> &str {
        &self.terms
    }

    pub fn query_id(&self) -> QueryId {
        self.header.reply_tag
    }

    /// Encodes the payload: header words followed by the UTF-16LE search
    /// string and its NUL terminator.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(QueryHeader::SIZE + (self.terms.len() + 1) * 2);
        self.header.write_to(&mut out);
        for unit in self.terms.encode_utf16().chain(std::iter::once(0)) {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Header at the start of every reply buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResultListHeader {
    /// Total number of folders matching the query.
    pub total_folders: u32,
    /// Total number of files matching the query.
    pub total_files: u32,
    /// `total_folders + total_files`.
    pub total_items: u32,
    /// Folders present in this reply.
    pub available_folders: u32,
    /// Files present in this reply.
    pub available_files: u32,
    /// Item records present in this reply.
    pub available_items: u32,
    /// Index of the first returned item within the full result set.
    pub offset: u32,
}

impl ResultListHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 28;

    /// Copies the header out of the start of `buf`, or returns `None` if the
    /// buffer is too short to hold one.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let mut reader = ByteReader::new(buf);
        Some(Self {
            total_folders: reader.read_u32()?,
            total_files: reader.read_u32()?,
            total_items: reader.read_u32()?,
            available_folders: reader.read_u32()?,
            available_files: reader.read_u32()?,
            available_items: reader.read_u32()?,
            offset: reader.read_u32()?,
        })
    }
}

/// One fixed-size item record. Offsets are byte offsets from the start of the
/// reply buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultItem {
    pub flags: ItemFlags,
    pub filename_offset: u32,
    /// Offset of the containing directory; meaningless for drive roots.
    pub path_offset: u32,
}

impl ResultItem {
    /// Encoded size in bytes.
    pub const SIZE: usize = 12;

    /// Reads the next record from `reader`, or `None` if fewer than
    /// [`Self::SIZE`] bytes remain.
    pub fn read(reader: &mut ByteReader<'_>) -> Option<Self> {
        if reader.remaining() < Self::SIZE {
            return None;
        }
        Some(Self {
            flags: ItemFlags::from_bits_retain(reader.read_u32()?),
            filename_offset: reader.read_u32()?,
            path_offset: reader.read_u32()?,
        })
    }

    pub fn is_folder(&self) -> bool {
        self.flags.contains(ItemFlags::FOLDER)
    }

    pub fn is_drive(&self) -> bool {
        self.flags.contains(ItemFlags::DRIVE)
    }
}
