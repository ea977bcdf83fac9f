//! Reply-buffer construction for tests and simulated services.
//!
//! Only compiled for this crate's tests or with the `test-util` feature.

use crate::wire::{ResultItem, ResultListHeader};
use crate::ItemFlags;

#[derive(Debug, Clone)]
enum Item {
    Drive(String),
    Entry { dir: String, name: String, folder: bool },
}

/// Builds reply buffers laid out the way the service lays them out: the list
/// header, every item record, then a string pool holding each item's strings
/// in item order.
#[derive(Debug, Clone, Default)]
pub struct ReplyBuilder {
    items: Vec<Item>,
    totals: Option<(u32, u32)>,
    offset: u32,
}

impl ReplyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, dir: &str, name: &str) -> Self {
        self.items.push(Item::Entry {
            dir: dir.to_owned(),
            name: name.to_owned(),
            folder: false,
        });
        self
    }

    pub fn folder(mut self, dir: &str, name: &str) -> Self {
        self.items.push(Item::Entry {
            dir: dir.to_owned(),
            name: name.to_owned(),
            folder: true,
        });
        self
    }

    pub fn drive(mut self, root: &str) -> Self {
        self.items.push(Item::Drive(root.to_owned()));
        self
    }

    /// Overrides the total folder/file counts; defaults to the available ones.
    pub fn totals(mut self, folders: u32, files: u32) -> Self {
        self.totals = Some((folders, files));
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    fn pool_start(&self) -> usize {
        ResultListHeader::SIZE + self.items.len() * ResultItem::SIZE
    }

    /// Byte position just past the last string belonging to item `index`.
    /// Truncating a built buffer there keeps items `0..=index` decodable.
    pub fn string_pool_end_of(&self, index: usize) -> usize {
        self.items[..=index]
            .iter()
            .fold(self.pool_start(), |pos, item| pos + pool_len(item))
    }

    pub fn build(&self) -> Vec<u8> {
        let folders = self
            .items
            .iter()
            .filter(|item| matches!(item, Item::Drive(_) | Item::Entry { folder: true, .. }))
            .count() as u32;
        let files = self.items.len() as u32 - folders;
        let (total_folders, total_files) = self.totals.unwrap_or((folders, files));

        let mut out = Vec::new();
        for word in [
            total_folders,
            total_files,
            total_folders + total_files,
            folders,
            files,
            self.items.len() as u32,
            self.offset,
        ] {
            out.extend_from_slice(&word.to_le_bytes());
        }

        let mut pool = Vec::new();
        let pool_start = self.pool_start();
        let intern = |s: &str, pool: &mut Vec<u8>| -> u32 {
            let at = (pool_start + pool.len()) as u32;
            pool.extend_from_slice(&wide(s));
            at
        };
        for item in &self.items {
            let (flags, filename_offset, path_offset) = match item {
                Item::Drive(root) => (ItemFlags::DRIVE | ItemFlags::FOLDER, intern(root, &mut pool), 0),
                Item::Entry { dir, name, folder } => {
                    let path_offset = intern(dir, &mut pool);
                    let filename_offset = intern(name, &mut pool);
                    let flags = if *folder { ItemFlags::FOLDER } else { ItemFlags::empty() };
                    (flags, filename_offset, path_offset)
                }
            };
            for word in [flags.bits(), filename_offset, path_offset] {
                out.extend_from_slice(&word.to_le_bytes());
            }
        }
        out.extend_from_slice(&pool);
        out
    }
}

fn wide(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn pool_len(item: &Item) -> usize {
    match item {
        Item::Drive(root) => wide(root).len(),
        Item::Entry { dir, name, .. } => wide(dir).len() + wide(name).len(),
    }
}
