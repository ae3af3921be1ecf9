//! Bounds-checked word access into arena bytes.
//!
//! Every piece of allocator metadata is a native-endian `u64` stored
//! inline in the region. References between metadata records are byte
//! offsets from the region base; `NIL` encodes the absent reference.
//! Nothing here reinterprets bytes without first checking that the whole
//! word lies inside the region.

use crate::config::EngineKind;
use crate::error::AllocError;

/// Size of one metadata word.
pub const WORD: usize = 8;

/// Encoded absent reference.
pub(crate) const NIL: u64 = u64::MAX;

/// Size of the arena header at the start of every region.
pub const ARENA_HEADER_SIZE: usize = 5 * WORD;

const TAG_FIELD: usize = 0;
const REGION_SIZE_FIELD: usize = WORD;
const USABLE_SIZE_FIELD: usize = 2 * WORD;
pub(crate) const ROOT_FIELD: usize = 3 * WORD;
pub(crate) const AUX_FIELD: usize = 4 * WORD;

pub(crate) fn read_word(bytes: &[u8], offset: usize) -> Result<u64, AllocError> {
    let end = offset
        .checked_add(WORD)
        .ok_or(AllocError::invalid("metadata offset overflow"))?;
    let raw = bytes
        .get(offset..end)
        .ok_or(AllocError::invalid("metadata offset outside region"))?;
    let mut word = [0u8; WORD];
    word.copy_from_slice(raw);
    Ok(u64::from_ne_bytes(word))
}

pub(crate) fn write_word(bytes: &mut [u8], offset: usize, value: u64) -> Result<(), AllocError> {
    let end = offset
        .checked_add(WORD)
        .ok_or(AllocError::invalid("metadata offset overflow"))?;
    let raw = bytes
        .get_mut(offset..end)
        .ok_or(AllocError::invalid("metadata offset outside region"))?;
    raw.copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

pub(crate) fn read_usize(bytes: &[u8], offset: usize) -> Result<usize, AllocError> {
    usize::try_from(read_word(bytes, offset)?)
        .map_err(|_| AllocError::invalid("metadata word exceeds address width"))
}

pub(crate) fn write_usize(bytes: &mut [u8], offset: usize, value: usize) -> Result<(), AllocError> {
    write_word(bytes, offset, value as u64)
}

pub(crate) fn read_link(bytes: &[u8], offset: usize) -> Result<Option<usize>, AllocError> {
    match read_word(bytes, offset)? {
        NIL => Ok(None),
        raw => usize::try_from(raw)
            .map(Some)
            .map_err(|_| AllocError::invalid("link exceeds address width")),
    }
}

pub(crate) fn write_link(
    bytes: &mut [u8],
    offset: usize,
    link: Option<usize>,
) -> Result<(), AllocError> {
    write_word(bytes, offset, link.map_or(NIL, |at| at as u64))
}

pub(crate) fn read_flag(bytes: &[u8], offset: usize) -> Result<bool, AllocError> {
    Ok(read_word(bytes, offset)? != 0)
}

pub(crate) fn write_flag(bytes: &mut [u8], offset: usize, flag: bool) -> Result<(), AllocError> {
    write_word(bytes, offset, u64::from(flag))
}

/// Decoded arena header.
///
/// `root` is the free-list head (free-list engine) or the free-page list
/// head (slab engine). `aux` is the slab engine's carved-page list head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaHeader {
    pub engine: EngineKind,
    pub region_size: usize,
    pub usable_size: usize,
    pub root: Option<usize>,
    pub aux: Option<usize>,
}

impl ArenaHeader {
    /// Decodes the header from the first [`ARENA_HEADER_SIZE`] bytes of `bytes`.
    pub fn read(bytes: &[u8]) -> Result<Self, AllocError> {
        let engine = EngineKind::from_tag(read_word(bytes, TAG_FIELD)?)
            .ok_or(AllocError::invalid("region carries no arena header"))?;
        let region_size = read_usize(bytes, REGION_SIZE_FIELD)?;
        let usable_size = read_usize(bytes, USABLE_SIZE_FIELD)?;
        if region_size.checked_sub(ARENA_HEADER_SIZE) != Some(usable_size) {
            return Err(AllocError::invalid("arena header sizes disagree"));
        }
        Ok(Self {
            engine,
            region_size,
            usable_size,
            root: read_link(bytes, ROOT_FIELD)?,
            aux: read_link(bytes, AUX_FIELD)?,
        })
    }

    pub(crate) fn write(&self, bytes: &mut [u8]) -> Result<(), AllocError> {
        write_word(bytes, TAG_FIELD, self.engine.tag())?;
        write_usize(bytes, REGION_SIZE_FIELD, self.region_size)?;
        write_usize(bytes, USABLE_SIZE_FIELD, self.usable_size)?;
        write_link(bytes, ROOT_FIELD, self.root)?;
        write_link(bytes, AUX_FIELD, self.aux)
    }

    /// Reads a header and checks it belongs to `engine` and to a region of `len` bytes.
    pub(crate) fn expect(bytes: &[u8], engine: EngineKind) -> Result<Self, AllocError> {
        let header = Self::read(bytes)?;
        if header.engine != engine {
            return Err(AllocError::invalid("arena was created by another engine"));
        }
        if header.region_size != bytes.len() {
            return Err(AllocError::invalid("region length differs from arena header"));
        }
        Ok(header)
    }
}
