//! Memory-mapped segment persistence (`shared_memory.bin`).
//!
//! Reference: spec.md §6 "Object Store persistence" and §9's note that a
//! language without raw offset-pointer facilities should implement them
//! explicitly. DESIGN.md records the narrowing actually taken here: the
//! 512-byte header (magic, dirty bit, environment descriptor) is memory
//! mapped exactly as specified, so the dirty-bit guard is a real mmap'd
//! flag rather than a convention layered on top of plain file I/O. The
//! table data itself is not literally addressed through segment-relative
//! offset pointers — `Table<S>` lives in ordinary heap `BTreeMap`s — and
//! is instead snapshotted to the region following the header as one
//! length-prefixed, CRC-32-trailed `bincode` blob on clean shutdown and
//! loaded back on reopen.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{StoreError, StoreResult};

const MAGIC: u64 = 0x4348_4149_4e42_4153; // "CHAINBAS" (truncated to 8 bytes)
const HEADER_LEN: usize = 512;
const FORMAT_VERSION: u32 = 1;

/// The 512-byte header persisted at the start of `shared_memory.bin`.
struct Header {
    magic: u64,
    dirty: bool,
    format_version: u32,
    max_size: u64,
}

impl Header {
    fn encode(&self, buf: &mut [u8; HEADER_LEN]) {
        buf.fill(0);
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8] = self.dirty as u8;
        buf[9..13].copy_from_slice(&self.format_version.to_le_bytes());
        buf[13..21].copy_from_slice(&self.max_size.to_le_bytes());
    }

    fn decode(buf: &[u8; HEADER_LEN]) -> StoreResult<Self> {
        let magic = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        if magic != MAGIC {
            return Err(StoreError::Decode("bad segment magic".into()));
        }
        let dirty = buf[8] != 0;
        let format_version = u32::from_le_bytes(buf[9..13].try_into().unwrap());
        let max_size = u64::from_le_bytes(buf[13..21].try_into().unwrap());
        Ok(Header {
            magic,
            dirty,
            format_version,
            max_size,
        })
    }
}

/// An open `shared_memory.bin` segment file.
pub struct SegmentFile {
    file: std::fs::File,
    mmap: MmapMut,
}

impl SegmentFile {
    /// Open (creating if absent) the segment at `path`. If the file
    /// already exists and its dirty bit is set, this is a fatal condition
    /// unless `allow_dirty` is set — an unclean prior shutdown may have
    /// left the snapshot region inconsistent.
    pub fn open(path: impl AsRef<Path>, max_size: u64, allow_dirty: bool) -> StoreResult<Self> {
        let path = path.as_ref();
        let existed = path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if existed {
            let mut header_buf = [0u8; HEADER_LEN];
            file.read_exact(&mut header_buf)?;
            let header = Header::decode(&header_buf)?;
            if header.dirty && !allow_dirty {
                return Err(StoreError::DatabaseGuard(
                    "segment dirty bit set on reopen; prior shutdown was not clean".into(),
                ));
            }
        } else {
            file.set_len(HEADER_LEN as u64 + max_size)?;
        }

        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        let header = Header {
            magic: MAGIC,
            dirty: true,
            format_version: FORMAT_VERSION,
            max_size,
        };
        let mut buf = [0u8; HEADER_LEN];
        header.encode(&mut buf);
        mmap[..HEADER_LEN].copy_from_slice(&buf);
        mmap.flush()?;

        Ok(SegmentFile { file, mmap })
    }

    fn header(&self) -> StoreResult<Header> {
        let buf: [u8; HEADER_LEN] = self.mmap[..HEADER_LEN].try_into().unwrap();
        Header::decode(&buf)
    }

    fn set_dirty(&mut self, dirty: bool) -> StoreResult<()> {
        let mut header = self.header()?;
        header.dirty = dirty;
        let mut buf = [0u8; HEADER_LEN];
        header.encode(&mut buf);
        self.mmap[..HEADER_LEN].copy_from_slice(&buf);
        self.mmap.flush()?;
        Ok(())
    }

    /// Write a length-prefixed, CRC-32-trailed snapshot blob to the region
    /// following the header.
    pub fn write_snapshot(&mut self, payload: &[u8]) -> StoreResult<()> {
        let crc = crc32fast::hash(payload);
        self.file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        self.file.write_all(&(payload.len() as u64).to_le_bytes())?;
        self.file.write_all(payload)?;
        self.file.write_all(&crc.to_le_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    pub fn read_snapshot(&mut self) -> StoreResult<Vec<u8>> {
        self.file.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        let mut len_buf = [0u8; 8];
        self.file.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        self.file.read_exact(&mut payload)?;
        let mut crc_buf = [0u8; 4];
        self.file.read_exact(&mut crc_buf)?;
        let expected = u32::from_le_bytes(crc_buf);
        let actual = crc32fast::hash(&payload);
        if actual != expected {
            return Err(StoreError::Decode("snapshot CRC32 mismatch".into()));
        }
        Ok(payload)
    }

    /// Clear the dirty bit, marking this a clean shutdown, without
    /// consuming the handle. Used by `Database::close`, which holds the
    /// segment for the node's full lifetime and only wants to flag a
    /// clean exit at the end of it.
    pub fn mark_clean(&mut self) -> StoreResult<()> {
        self.set_dirty(false)
    }

    /// Clear the dirty bit and drop the handle, marking this a clean
    /// shutdown.
    pub fn close(mut self) -> StoreResult<()> {
        self.mark_clean()
    }
}
