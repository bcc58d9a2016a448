//! Binary graph snapshot format.
//!
//! All integers are little-endian.
//!
//! ```text
//! magic            b"RHNS"
//! version          u16 (currently 1)
//! m                u32
//! ef_construction  u32
//! ef_search        u32
//! level_mult       f64
//! dimensions       u32, 0 when no vector was ever inserted
//! entry_point      u32, u32::MAX when the graph is empty
//! max_level        u32
//! node_count       u32
//! node_count × node:
//!     id           u32 length + UTF-8 bytes
//!     deleted      u8 (0 or 1)
//!     level        u32
//!     vector       dimensions × f32
//!     metadata     u32 pair count + (key, value) strings
//!     neighbors    (level + 1) × (u32 count + count × u32 handle)
//! ```
//!
//! Decoding validates every handle, so a decoded index can be searched
//! without bounds surprises.

use super::HnswError;
use super::hnsw::{HnswConfig, HnswIndex, MAX_LEVEL, Node};
use recall_context::Metadata;

pub const MAGIC: &[u8; 4] = b"RHNS";
pub const VERSION: u16 = 1;

const NO_ENTRY: u32 = u32::MAX;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn len(&mut self, value: usize) {
        self.u32(value as u32);
    }

    fn f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn str(&mut self, value: &str) {
        self.len(value.len());
        self.buf.extend_from_slice(value.as_bytes());
    }
}

pub(crate) fn encode(index: &HnswIndex) -> Vec<u8> {
    let mut w = Writer { buf: Vec::new() };
    w.buf.extend_from_slice(MAGIC);
    w.u16(VERSION);

    w.len(index.config.m);
    w.len(index.config.ef_construction);
    w.len(index.config.ef_search);
    w.f64(index.config.level_multiplier());

    w.len(index.dimensions.unwrap_or(0));
    w.u32(index.entry_point.unwrap_or(NO_ENTRY));
    w.len(index.max_level);
    w.len(index.nodes.len());

    for node in &index.nodes {
        w.str(&node.id);
        w.u8(u8::from(node.deleted));
        w.len(node.level);
        for &value in &node.vector {
            w.f32(value);
        }
        w.len(node.metadata.len());
        for (key, value) in &node.metadata {
            w.str(key);
            w.str(value);
        }
        for list in &node.neighbors {
            w.len(list.len());
            for &handle in list {
                w.u32(handle);
            }
        }
    }

    w.buf
}

fn corrupt(message: impl Into<String>) -> HnswError {
    HnswError::Corrupt(message.into())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], HnswError> {
        if n > self.remaining() {
            return Err(corrupt(format!(
                "unexpected end of data at byte {} (wanted {n} more)",
                self.pos
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], HnswError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, HnswError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, HnswError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, HnswError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// A length prefix, rejected when the data cannot possibly hold
    /// `len` items of `item_size` bytes.
    fn len(&mut self, item_size: usize) -> Result<usize, HnswError> {
        let len = self.u32()? as usize;
        if len.saturating_mul(item_size) > self.remaining() {
            return Err(corrupt(format!("length {len} exceeds remaining data")));
        }
        Ok(len)
    }

    fn f32(&mut self) -> Result<f32, HnswError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, HnswError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String, HnswError> {
        let len = self.len(1)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| corrupt(format!("invalid UTF-8: {e}")))
    }
}

pub(crate) fn decode(bytes: &[u8]) -> Result<HnswIndex, HnswError> {
    let mut r = Reader { buf: bytes, pos: 0 };

    if r.take(MAGIC.len()).map_err(|_| corrupt("missing header"))? != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(HnswError::UnsupportedVersion(version));
    }

    let config = HnswConfig {
        m: r.u32()? as usize,
        ef_construction: r.u32()? as usize,
        ef_search: r.u32()? as usize,
        level_mult: Some(r.f64()?),
        seed: None,
    };
    config
        .validate()
        .map_err(|e| corrupt(format!("stored configuration rejected: {e}")))?;

    let dimensions = r.u32()? as usize;
    let entry_point = r.u32()?;
    let max_level = r.u32()? as usize;
    // id length + deleted flag + level is the smallest possible node
    let node_count = r.len(9)?;
    if node_count > 0 && dimensions == 0 {
        return Err(corrupt("nodes present but dimensions unset"));
    }

    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let id = r.string()?;
        let deleted = match r.u8()? {
            0 => false,
            1 => true,
            other => return Err(corrupt(format!("invalid deleted flag {other}"))),
        };
        let level = r.u32()? as usize;
        if level > MAX_LEVEL || (!deleted && level > max_level) {
            return Err(corrupt(format!("node {id:?} has level {level}")));
        }

        let mut vector = Vec::with_capacity(dimensions.min(r.remaining() / 4));
        for _ in 0..dimensions {
            vector.push(r.f32()?);
        }

        let pairs = r.len(8)?;
        let mut metadata = Metadata::new();
        for _ in 0..pairs {
            let key = r.string()?;
            let value = r.string()?;
            metadata.insert(key, value);
        }

        let mut neighbors = Vec::with_capacity(level + 1);
        for _ in 0..=level {
            let count = r.len(4)?;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                list.push(r.u32()?);
            }
            neighbors.push(list);
        }

        nodes.push(Node {
            id,
            vector,
            metadata,
            level,
            neighbors,
            deleted,
        });
    }

    if r.remaining() != 0 {
        return Err(corrupt(format!("{} trailing bytes", r.remaining())));
    }

    for node in &nodes {
        for (layer, list) in node.neighbors.iter().enumerate() {
            for &handle in list {
                let target = nodes
                    .get(handle as usize)
                    .ok_or_else(|| corrupt(format!("neighbor handle {handle} out of range")))?;
                if target.level < layer {
                    return Err(corrupt(format!(
                        "node {:?} links to {:?} above its level",
                        node.id, target.id
                    )));
                }
            }
        }
    }

    let entry_point = if entry_point == NO_ENTRY {
        if nodes.iter().any(|n| !n.deleted) {
            return Err(corrupt("live nodes present but no entry point"));
        }
        None
    } else {
        let entry = nodes
            .get(entry_point as usize)
            .ok_or_else(|| corrupt(format!("entry point {entry_point} out of range")))?;
        if entry.deleted || entry.level != max_level {
            return Err(corrupt("entry point is not a live top-level node"));
        }
        Some(entry_point)
    };

    let dimensions = (dimensions > 0).then_some(dimensions);
    HnswIndex::from_parts(config, nodes, entry_point, max_level, dimensions)
}
