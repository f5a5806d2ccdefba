//! # Region Pool Images
//!
//! Saves a [`RegionPool`] to a byte stream and restores it identically.
//!
//! ## Format
//!
//! All integers little-endian.
//!
//! ```text
//! [4 bytes: magic "RPOL"]
//! [4 bytes: version]
//! [8 bytes: growth granule]
//! [8 bytes: buffer length N][N bytes: buffer]
//! [8 bytes: slot count S]
//!   S x [8 bytes: offset][8 bytes: size][4 bytes: generation][1 byte: pending]
//! [8 bytes: free handle count H]   H x [4 bytes: slot index]
//! [8 bytes: pending count P]       P x [4 bytes: slot index]
//! [8 bytes: free region count F]   F x [8 bytes: offset][8 bytes: size]
//! [4 bytes: CRC32 of everything above]
//! ```

use std::collections::VecDeque;
use std::io::{Read, Write};

use super::descriptor::Region;
use super::free_space::FreeSpaceIndex;
use super::pool::{RegionPool, Slot};
use crate::error::{PoolError, PoolResult};

/// Magic bytes identifying a region pool image.
const IMAGE_MAGIC: &[u8; 4] = b"RPOL";

/// Current image format version.
const IMAGE_VERSION: u32 = 1;

impl RegionPool {
    /// Writes the pool's buffer and tables to `writer`.
    ///
    /// Pending removals are saved as pending; reclaim is not forced.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Io`] if writing fails.
    pub fn save<W: Write>(&self, writer: &mut W) -> PoolResult<()> {
        let mut buf = Vec::with_capacity(self.buffer.len() + 64 + self.slots.len() * 21);

        buf.extend_from_slice(IMAGE_MAGIC);
        buf.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.growth_granule.to_le_bytes());

        buf.extend_from_slice(&(self.buffer.len() as u64).to_le_bytes());
        buf.extend_from_slice(&self.buffer);

        buf.extend_from_slice(&(self.slots.len() as u64).to_le_bytes());
        for slot in &self.slots {
            buf.extend_from_slice(&slot.region.offset.to_le_bytes());
            buf.extend_from_slice(&slot.region.size.to_le_bytes());
            buf.extend_from_slice(&slot.generation.to_le_bytes());
            buf.push(u8::from(slot.pending));
        }

        buf.extend_from_slice(&(self.free_handles.len() as u64).to_le_bytes());
        for index in &self.free_handles {
            buf.extend_from_slice(&index.to_le_bytes());
        }

        buf.extend_from_slice(&(self.pending.len() as u64).to_le_bytes());
        for index in &self.pending {
            buf.extend_from_slice(&index.to_le_bytes());
        }

        let free = self.free_space.sorted();
        buf.extend_from_slice(&(free.len() as u64).to_le_bytes());
        for region in free {
            buf.extend_from_slice(&region.offset.to_le_bytes());
            buf.extend_from_slice(&region.size.to_le_bytes());
        }

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(())
    }

    /// Restores a pool previously written by [`RegionPool::save`].
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Io`] if reading fails, or
    /// [`PoolError::CorruptImage`] if the image fails its checksum or any
    /// structural check.
    pub fn load<R: Read>(reader: &mut R) -> PoolResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        if data.len() < 4 {
            return Err(corrupt("image shorter than its checksum"));
        }
        let (body, tail) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        if crc32fast::hash(body) != stored {
            return Err(corrupt("checksum mismatch"));
        }

        let mut cursor = Cursor { data: body, pos: 0 };

        if cursor.take(4)? != IMAGE_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = cursor.u32()?;
        if version != IMAGE_VERSION {
            return Err(corrupt(&format!("unsupported version {version}")));
        }

        let growth_granule = cursor.u64()?;
        if growth_granule == 0 {
            return Err(corrupt("zero growth granule"));
        }

        let buffer_len = cursor.length()?;
        let buffer = cursor.take(buffer_len)?.to_vec();

        let slot_count = cursor.length()?;
        let mut slots = Vec::with_capacity(slot_count.min(body.len() / 21));
        for _ in 0..slot_count {
            let region = cursor.region(buffer.len())?;
            let generation = cursor.u32()?;
            let pending = match cursor.u8()? {
                0 => false,
                1 => true,
                other => return Err(corrupt(&format!("bad pending flag {other}"))),
            };
            if pending && region.is_empty() {
                return Err(corrupt("empty slot marked pending"));
            }
            slots.push(Slot {
                region,
                generation,
                pending,
            });
        }

        let free_handles = cursor.indices(slots.len())?;
        if free_handles.len() != slots.iter().filter(|slot| slot.region.is_empty()).count()
            || free_handles
                .iter()
                .any(|&index| !slots[index as usize].region.is_empty())
        {
            return Err(corrupt("free handles disagree with unassigned slots"));
        }

        let pending: VecDeque<u32> = cursor.indices(slots.len())?.into();
        if pending.len() != slots.iter().filter(|slot| slot.pending).count()
            || pending.iter().any(|&index| !slots[index as usize].pending)
        {
            return Err(corrupt("pending queue disagrees with slot flags"));
        }

        let free_count = cursor.length()?;
        let mut free = Vec::with_capacity(free_count.min(body.len() / 16));
        for _ in 0..free_count {
            let region = cursor.region(buffer.len())?;
            if region.is_empty() {
                return Err(corrupt("empty free region"));
            }
            free.push(region);
        }
        free.sort_unstable_by_key(|r| r.offset);
        for pair in free.windows(2) {
            if pair[0].end() >= pair[1].offset {
                return Err(corrupt(&format!(
                    "free regions {} and {} overlap or touch",
                    pair[0], pair[1]
                )));
            }
        }

        let mut free_space = FreeSpaceIndex::new();
        for region in free {
            free_space.insert(region, false);
        }
        free_space.rebuild_heap();

        if cursor.pos != body.len() {
            return Err(corrupt("trailing bytes after free regions"));
        }

        let mut pool = Self {
            buffer,
            growth_granule,
            slots,
            free_handles,
            free_space,
            pending,
            live_order: Vec::new(),
        };
        pool.rebuild_live_order();
        pool.validate().map_err(|err| match err {
            PoolError::InvariantViolation(msg) => PoolError::CorruptImage(msg),
            other => other,
        })?;

        Ok(pool)
    }
}

fn corrupt(reason: &str) -> PoolError {
    PoolError::CorruptImage(reason.to_string())
}

/// Bounds-checked little-endian reader over an image body.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, count: usize) -> PoolResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| corrupt("truncated image"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> PoolResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> PoolResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> PoolResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// A length field that must fit in memory.
    fn length(&mut self) -> PoolResult<usize> {
        usize::try_from(self.u64()?).map_err(|_| corrupt("length overflows usize"))
    }

    /// An `(offset, size)` pair lying inside a buffer of `buffer_len` bytes.
    fn region(&mut self, buffer_len: usize) -> PoolResult<Region> {
        let offset = self.u64()?;
        let size = self.u64()?;
        match offset.checked_add(size) {
            Some(end) if end <= buffer_len as u64 => Ok(Region::new(offset, size)),
            _ => Err(corrupt(&format!(
                "region at {offset} of {size} bytes exceeds buffer of {buffer_len} bytes"
            ))),
        }
    }

    /// A counted list of distinct slot indices, each below `slot_count`.
    fn indices(&mut self, slot_count: usize) -> PoolResult<Vec<u32>> {
        let count = self.length()?;
        let mut seen = vec![false; slot_count];
        let mut indices = Vec::with_capacity(count.min(slot_count));
        for _ in 0..count {
            let index = self.u32()?;
            match seen.get_mut(index as usize) {
                Some(flag) if !*flag => *flag = true,
                Some(_) => return Err(corrupt(&format!("slot index {index} listed twice"))),
                None => return Err(corrupt(&format!("slot index {index} out of range"))),
            }
            indices.push(index);
        }
        Ok(indices)
    }
}
