//! Snapshot binary format constants and footer read/write helpers.
//!
//! The footer is always the **last 28 bytes** of a snapshot file:
//!
//! ```text
//! [count: u64][id_limit: u32][last_seq: u64][crc32: u32][magic: u32 = 0x4B54_5331]
//! ```
//!
//! All fields little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result as IoResult, Write};

/// Magic number identifying snapshot v1 files (ASCII "KTS1").
pub const SNAPSHOT_MAGIC: u32 = 0x4B54_5331;

/// Footer size: `count` + `id_limit` + `last_seq` + `crc32` + `magic`.
pub const FOOTER_BYTES: u64 = 8 + 4 + 8 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub count: u64,
    pub id_limit: u32,
    pub last_seq: u64,
    pub crc: u32,
    pub magic: u32,
}

/// Writes the snapshot footer to `w`.
pub(crate) fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> IoResult<()> {
    w.write_u64::<LittleEndian>(footer.count)?;
    w.write_u32::<LittleEndian>(footer.id_limit)?;
    w.write_u64::<LittleEndian>(footer.last_seq)?;
    w.write_u32::<LittleEndian>(footer.crc)?;
    w.write_u32::<LittleEndian>(footer.magic)?;
    Ok(())
}

/// Parses a footer from exactly [`FOOTER_BYTES`] bytes.
pub(crate) fn read_footer<R: Read>(r: &mut R) -> IoResult<Footer> {
    Ok(Footer {
        count: r.read_u64::<LittleEndian>()?,
        id_limit: r.read_u32::<LittleEndian>()?,
        last_seq: r.read_u64::<LittleEndian>()?,
        crc: r.read_u32::<LittleEndian>()?,
        magic: r.read_u32::<LittleEndian>()?,
    })
}
