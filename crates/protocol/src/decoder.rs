//! Lazy decoder for the service's reply buffers.
//!
//! A reply is a [`ResultListHeader`] followed by `available_items` fixed-size
//! [`ResultItem`] records, followed by a string pool the records point into by
//! byte offset. [`ResultList`] keeps the raw buffer and resolves each record
//! into a [`ResultEntry`] only when iterated.
//!
//! ## Malformed buffers
//!
//! Decoding never fails. If a record would extend past the end of the buffer,
//! or a string it points at has no terminator before the end, iteration stops
//! and only the entries produced so far are returned.
//!
//! ## Drive roots
//!
//! A drive root whose name is exactly two characters (`C:`) is surfaced with a
//! trailing separator (`C:\`), and a two-character directory ending in `:` is
//! given one before it is joined with a file name. The service reports Windows
//! paths, so the separator is always [`PATH_SEPARATOR`], whatever platform the
//! client was built for.

use serde::Serialize;

use crate::wire::{read_wide_str, ByteReader, ResultItem, ResultListHeader};

/// Separator used when joining and completing the service's paths.
pub const PATH_SEPARATOR: char = '\\';

/// One decoded search result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResultEntry {
    /// Absolute path of the file or folder.
    pub full_path: String,
    /// `false` for folders and drive roots.
    pub is_file: bool,
}

impl From<ResultEntry> for (String, bool) {
    fn from(entry: ResultEntry) -> Self {
        (entry.full_path, entry.is_file)
    }
}

// ---------------------------------------------------------------------------

/// A reply buffer together with its parsed header.
///
/// An empty list (no buffer at all) is what a cancelled or timed-out query
/// returns.
#[derive(Debug, Clone, Default)]
pub struct ResultList {
    header: Option<ResultListHeader>,
    buffer: Vec<u8>,
}

impl ResultList {
    /// A list with no buffer and no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a raw reply buffer. A buffer too short to hold the header is
    /// treated as an empty reply.
    pub fn from_buffer(buffer: Vec<u8>) -> Self {
        let header = ResultListHeader::parse(&buffer);
        if header.is_none() {
            tracing::debug!(
                len = buffer.len(),
                "Reply buffer shorter than the list header; treating it as empty"
            );
        }
        Self { header, buffer }
    }

    /// The parsed list header, if the reply carried one.
    pub fn header(&self) -> Option<&ResultListHeader> {
        self.header.as_ref()
    }

    /// Number of items the reply declares.
    ///
    /// Iteration yields fewer entries when the buffer is truncated.
    pub fn len(&self) -> usize {
        self.header.map_or(0, |h| h.available_items as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw reply bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Iterates over the decoded entries. Each call starts from the first
    /// record and yields the same sequence.
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            buf: &self.buffer,
            reader: ByteReader::at(&self.buffer, ResultListHeader::SIZE),
            remaining: self.header.map_or(0, |h| h.available_items),
            index: 0,
        }
    }
}

impl<'a> IntoIterator for &'a ResultList {
    type Item = ResultEntry;
    type IntoIter = Entries<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`ResultList`].
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    buf: &'a [u8],
    reader: ByteReader<'a>,
    remaining: u32,
    index: u32,
}

impl Entries<'_> {
    fn stop(&mut self, what: &'static str) -> Option<ResultEntry> {
        tracing::debug!(
            index = self.index,
            undecoded = self.remaining,
            "Reply buffer truncated ({what}); returning partial results"
        );
        self.remaining = 0;
        None
    }
}

impl Iterator for Entries<'_> {
    type Item = ResultEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let Some(item) = ResultItem::read(&mut self.reader) else {
            return self.stop("item record");
        };
        let Some(entry) = resolve(self.buf, &item) else {
            return self.stop("item string");
        };
        self.remaining -= 1;
        self.index += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

impl std::iter::FusedIterator for Entries<'_> {}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

fn resolve(buf: &[u8], item: &ResultItem) -> Option<ResultEntry> {
    if item.is_drive() {
        let mut root = read_wide_str(buf, item.filename_offset)?;
        if root.chars().count() == 2 {
            root.push(PATH_SEPARATOR);
        }
        return Some(ResultEntry {
            full_path: root,
            is_file: false,
        });
    }

    let mut dir = read_wide_str(buf, item.path_offset)?;
    if is_bare_drive(&dir) {
        dir.push(PATH_SEPARATOR);
    }
    let name = read_wide_str(buf, item.filename_offset)?;
    Some(ResultEntry {
        full_path: join(dir, &name),
        is_file: !item.is_folder(),
    })
}

/// `D:` but not `D:\` or `ab`.
fn is_bare_drive(dir: &str) -> bool {
    dir.chars().count() == 2 && dir.ends_with(':')
}

fn join(mut dir: String, name: &str) -> String {
    if dir.is_empty() {
        return name.to_owned();
    }
    if !dir.ends_with(['\\', '/']) {
        dir.push(PATH_SEPARATOR);
    }
    dir.push_str(name);
    dir
}
