// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single-file tile archives (PMTiles v3).
//!
//! Sources look like `pmtiles://<archive>/<z>/<x>/<y>`. The archive path is
//! resolved against the catalogue directory unless it is absolute. Only
//! uncompressed and gzip-compressed directories and tiles are supported.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::debug;
use thiserror::Error;

use crate::protocol::{ProtocolError, SourceProtocol};

const MAGIC: &[u8; 7] = b"PMTiles";
const VERSION: u8 = 3;
const HEADER_LEN: usize = 127;
const MAX_DIRECTORY_DEPTH: usize = 4;
const MAX_ZOOM: u8 = 26;

/// Errors that can occur while reading a tile archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a PMTiles archive")]
    BadMagic,

    #[error("unsupported PMTiles version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported compression type {0}")]
    UnsupportedCompression(u8),

    #[error("archive directory is truncated or malformed")]
    Truncated,

    #[error("directories nest deeper than {} levels", MAX_DIRECTORY_DEPTH)]
    TooDeep,

    #[error("invalid tile address '{0}', expected <archive>/<z>/<x>/<y>")]
    BadAddress(String),

    #[error("tile {z}/{x}/{y} is not in the archive")]
    TileNotFound { z: u8, x: u32, y: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
}

impl Compression {
    fn from_byte(byte: u8) -> Result<Self, ArchiveError> {
        match byte {
            // 0 is "unknown", which readers treat as uncompressed
            0 | 1 => Ok(Self::None),
            2 => Ok(Self::Gzip),
            other => Err(ArchiveError::UnsupportedCompression(other)),
        }
    }

    fn decompress(self, data: Vec<u8>) -> Result<Vec<u8>, ArchiveError> {
        match self {
            Self::None => Ok(data),
            Self::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(&data[..]).read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    root_offset: u64,
    root_length: u64,
    leaf_offset: u64,
    tile_data_offset: u64,
    internal_compression: Compression,
    tile_compression: Compression,
    min_zoom: u8,
    max_zoom: u8,
}

impl Header {
    fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, ArchiveError> {
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(ArchiveError::BadMagic);
        }
        if bytes[7] != VERSION {
            return Err(ArchiveError::UnsupportedVersion(bytes[7]));
        }

        let u64_at = |at: usize| {
            let mut word = [0_u8; 8];
            word.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(word)
        };

        Ok(Self {
            root_offset: u64_at(8),
            root_length: u64_at(16),
            leaf_offset: u64_at(40),
            tile_data_offset: u64_at(56),
            internal_compression: Compression::from_byte(bytes[97])?,
            tile_compression: Compression::from_byte(bytes[98])?,
            min_zoom: bytes[100],
            max_zoom: bytes[101],
        })
    }
}

/// One directory entry: a run of tiles, or a pointer to a leaf directory
/// when `run_length` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    tile_id: u64,
    offset: u64,
    length: u32,
    run_length: u32,
}

/// Hilbert-curve tile id used to key archive directories.
///
/// Returns `None` for coordinates outside the zoom level.
#[must_use]
pub fn tile_id(z: u8, x: u32, y: u32) -> Option<u64> {
    if z > MAX_ZOOM {
        return None;
    }
    let n = 1_u64 << z;
    let (mut x, mut y) = (u64::from(x), u64::from(y));
    if x >= n || y >= n {
        return None;
    }

    // Tiles on all lower zoom levels come first
    let base = ((1_u64 << (2 * u32::from(z))) - 1) / 3;

    let mut d = 0;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        d += s * s * ((3 * rx) ^ ry);
        if ry == 0 {
            if rx == 1 {
                x = n - 1 - x;
                y = n - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    Some(base + d)
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64, ArchiveError> {
    let mut value = 0_u64;
    for shift in (0..64).step_by(7) {
        let byte = *bytes.get(*pos).ok_or(ArchiveError::Truncated)?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(ArchiveError::Truncated)
}

/// Decode a column-oriented directory: ids (delta), run lengths, lengths, offsets.
fn parse_directory(bytes: &[u8]) -> Result<Vec<Entry>, ArchiveError> {
    let mut pos = 0;
    let count = read_varint(bytes, &mut pos)? as usize;
    // Every entry takes at least four bytes
    if count > bytes.len() {
        return Err(ArchiveError::Truncated);
    }

    let mut entries = Vec::with_capacity(count);
    let mut tile_id = 0_u64;
    for _ in 0..count {
        tile_id = tile_id
            .checked_add(read_varint(bytes, &mut pos)?)
            .ok_or(ArchiveError::Truncated)?;
        entries.push(Entry {
            tile_id,
            offset: 0,
            length: 0,
            run_length: 0,
        });
    }
    for entry in &mut entries {
        entry.run_length = read_varint(bytes, &mut pos)? as u32;
    }
    for entry in &mut entries {
        entry.length = read_varint(bytes, &mut pos)? as u32;
    }

    // Zero means "directly after the previous entry"
    let mut previous_end = None;
    for entry in &mut entries {
        let value = read_varint(bytes, &mut pos)?;
        entry.offset = match (value, previous_end) {
            (0, Some(end)) => end,
            _ => value.checked_sub(1).ok_or(ArchiveError::Truncated)?,
        };
        previous_end = Some(entry.offset + u64::from(entry.length));
    }

    Ok(entries)
}

fn find_entry(entries: &[Entry], tile_id: u64) -> Option<&Entry> {
    match entries.binary_search_by_key(&tile_id, |entry| entry.tile_id) {
        Ok(index) => entries.get(index),
        Err(0) => None,
        Err(index) => {
            let entry = &entries[index - 1];
            let covered =
                entry.run_length == 0 || tile_id - entry.tile_id < u64::from(entry.run_length);
            covered.then_some(entry)
        }
    }
}

/// An open archive file.
#[derive(Debug)]
pub struct Archive {
    file: File,
    header: Header,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let mut file = File::open(path)?;
        let mut bytes = [0_u8; HEADER_LEN];
        file.read_exact(&mut bytes)?;
        let header = Header::parse(&bytes)?;
        Ok(Self { file, header })
    }

    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>, ArchiveError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        (&mut self.file).take(length).read_to_end(&mut buf)?;
        if buf.len() as u64 != length {
            return Err(ArchiveError::Truncated);
        }
        Ok(buf)
    }

    /// Read one tile, decompressed.
    pub fn tile(&mut self, z: u8, x: u32, y: u32) -> Result<Vec<u8>, ArchiveError> {
        let not_found = || ArchiveError::TileNotFound { z, x, y };
        if z < self.header.min_zoom || z > self.header.max_zoom {
            return Err(not_found());
        }
        let id = tile_id(z, x, y).ok_or_else(not_found)?;

        let (mut offset, mut length) = (self.header.root_offset, self.header.root_length);
        for _ in 0..MAX_DIRECTORY_DEPTH {
            let raw = self.read_range(offset, length)?;
            let directory = self.header.internal_compression.decompress(raw)?;
            let entries = parse_directory(&directory)?;
            let entry = *find_entry(&entries, id).ok_or_else(not_found)?;

            if entry.run_length > 0 {
                let data = self.read_range(
                    self.header.tile_data_offset + entry.offset,
                    u64::from(entry.length),
                )?;
                return self.header.tile_compression.decompress(data);
            }
            offset = self.header.leaf_offset + entry.offset;
            length = u64::from(entry.length);
        }
        Err(ArchiveError::TooDeep)
    }
}

/// Split `pmtiles://<archive>/<z>/<x>/<y>` into its archive path and tile.
fn parse_address(location: &str) -> Result<(&str, u8, u32, u32), ArchiveError> {
    let rest = location.split_once("://").map_or(location, |(_, rest)| rest);
    let bad = || ArchiveError::BadAddress(location.to_string());

    let mut parts = rest.rsplitn(4, '/');
    let y = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let x = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let z = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let archive = parts.next().filter(|a| !a.is_empty()).ok_or_else(bad)?;
    Ok((archive, z, x, y))
}

/// Serves single tiles out of local archives.
#[derive(Debug)]
pub struct PmtilesProtocol {
    base_dir: PathBuf,
}

impl PmtilesProtocol {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl SourceProtocol for PmtilesProtocol {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, ProtocolError> {
        let (archive, z, x, y) = parse_address(location)?;
        let path = self.base_dir.join(archive);
        debug!("Reading tile {}/{}/{} from {}", z, x, y, path.display());
        Ok(Archive::open(&path)?.tile(z, x, y)?)
    }
}
