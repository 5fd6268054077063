// Reader for the Witcher 3 savegame format (LZ4 chunk container + SAV3 variable image)
use std::fs;
use std::path::Path;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::model::{AttributeNode, Guid, NodeKind, Scalar};

pub(crate) const CONTAINER_MAGIC: &[u8; 8] = b"SNFHFZLC";
pub(crate) const SAVE_MAGIC: &[u8; 4] = b"SAV3";
pub(crate) const FOOTER_MAGIC: &[u8; 2] = b"SE";
pub(crate) const NM_MAGIC: &[u8; 2] = b"NM";
pub(crate) const RB_MAGIC: &[u8; 2] = b"RB";
pub(crate) const MANU_MAGIC: &[u8; 4] = b"MANU";
pub(crate) const ENOD_MAGIC: &[u8; 4] = b"ENOD";
pub(crate) const BS_MAGIC: &[u8; 2] = b"BS";
pub(crate) const VL_MAGIC: &[u8; 2] = b"VL";

/// Size of a chunk table entry: compressed, decompressed, end offset.
pub(crate) const CHUNK_ENTRY_SIZE: usize = 12;
/// Bytes between the string-table offsets and the variable table.
pub(crate) const STRING_FOOTER_SIZE: usize = 10;

/// How much of the save to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadLevel {
    /// Known value types only; the top-level RB table is not read.
    #[default]
    Quick,
    /// Also keeps raw bytes of opaque values and validates the RB table.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveHeader {
    pub type_codes: [i32; 3],
}

/// A decoded save. Typed views (journal, report) are decoded on demand from `root`.
#[derive(Debug, Clone)]
pub struct SaveGame {
    pub header: SaveHeader,
    pub root: AttributeNode,
}

pub fn read_save_file(path: &Path, level: ReadLevel) -> Result<SaveGame> {
    // the file is read in one go; nothing below holds the handle
    let data = fs::read(path)?;
    debug!("read {} bytes from {}", data.len(), path.display());
    read_save(&data, level)
}

pub fn read_save(data: &[u8], level: ReadLevel) -> Result<SaveGame> {
    let (image, header_size) = decompress_container(data)?;
    let (header, root) = parse_image(&image, header_size, level)?;
    debug!(
        "decoded save: {} top-level variables, {} nodes",
        root.children().len(),
        root.descendant_count()
    );
    Ok(SaveGame { header, root })
}

/// Inflate the chunked container. The returned image starts with `header_size`
/// zero bytes so that inner offsets can be used as-is.
pub fn decompress_container(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut r = Reader::new(data);
    r.expect_magic(CONTAINER_MAGIC, "container")?;
    let chunk_count = r.read_len("chunk count")?;
    let header_size = r.read_len("header size")?;
    let table_end = CONTAINER_MAGIC.len() + 8 + chunk_count * CHUNK_ENTRY_SIZE;
    if header_size < table_end || header_size > data.len() {
        return Err(Error::decode(format!(
            "container header size {header_size:#x} out of range ({chunk_count} chunks, {} bytes)",
            data.len()
        )));
    }

    let mut chunks = Vec::with_capacity(chunk_count);
    for _ in 0..chunk_count {
        let compressed = r.read_len("compressed chunk size")?;
        let decompressed = r.read_len("decompressed chunk size")?;
        let _end_offset = r.read_i32()?;
        chunks.push((compressed, decompressed));
    }

    let mut image = vec![0u8; header_size];

    r.seek(header_size)?;
    for (i, (compressed, decompressed)) in chunks.into_iter().enumerate() {
        let block = r.read_slice(compressed)?;
        let buf = lz4_flex::block::decompress(block, decompressed)
            .map_err(|e| Error::decode(format!("lz4 chunk {i}: {e}")))?;
        if buf.len() != decompressed {
            return Err(Error::decode(format!(
                "lz4 chunk {i}: expected {decompressed} bytes, got {}",
                buf.len()
            )));
        }
        image.extend_from_slice(&buf);
    }
    debug!(
        "container: {chunk_count} chunks, header {header_size:#x}, image {} bytes",
        image.len()
    );
    Ok((image, header_size))
}

/// Decode the variable image into an unnamed root group.
pub fn parse_image(
    image: &[u8],
    header_size: usize,
    level: ReadLevel,
) -> Result<(SaveHeader, AttributeNode)> {
    let mut r = Reader::new(image);
    r.seek(header_size)?;
    r.expect_magic(SAVE_MAGIC, "save header")?;
    let header = SaveHeader {
        type_codes: [r.read_i32()?, r.read_i32()?, r.read_i32()?],
    };

    let footer_at = image
        .len()
        .checked_sub(6)
        .filter(|at| *at >= header_size)
        .ok_or_else(|| Error::decode("save image too short for footer"))?;
    r.seek(footer_at)?;
    let var_table_offset = r.read_len("variable table offset")?;
    r.expect_magic(FOOTER_MAGIC, "footer")?;

    let string_footer = var_table_offset
        .checked_sub(STRING_FOOTER_SIZE)
        .ok_or_else(|| Error::decode(format!("variable table offset {var_table_offset:#x} too small")))?;
    r.seek(string_footer)?;
    let nm_offset = r.read_len("NM offset")?;
    let rb_offset = r.read_len("RB offset")?;

    let strings = read_string_table(&mut r, nm_offset)?;
    let top_level = read_main_table(&mut r, rb_offset, level)?;
    let entries = read_variable_table(&mut r, var_table_offset)?;

    let mut vars = Vec::with_capacity(entries.len());
    for (offset, size) in entries {
        if let Some(var) = read_variable(&mut r, offset, size, &strings, level)? {
            vars.push(var);
        }
    }

    if level == ReadLevel::Full {
        for offset in &top_level {
            if !vars.iter().any(|v| v.offset == *offset) {
                return Err(Error::decode(format!(
                    "RB entry points at {offset:#x}, which is not a decoded variable"
                )));
            }
        }
    }

    Ok((header, build_tree(vars)?))
}

fn read_string_table(r: &mut Reader<'_>, nm_offset: usize) -> Result<Vec<String>> {
    r.seek(nm_offset)?;
    r.expect_magic(NM_MAGIC, "NM section")?;
    r.expect_magic(MANU_MAGIC, "string table")?;
    let count = r.read_len("string count")?;
    r.expect_zero("string table")?;
    let mut strings = Vec::with_capacity(count.min(r.remaining()) + 1);
    strings.push(String::new());
    for _ in 0..count {
        let len = r.read_u8()? as usize;
        let bytes = r.read_slice(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Error::decode(format!("invalid utf8 in string table at {:#x}", r.pos() - len)))?;
        strings.push(s.to_string());
    }
    r.expect_zero("string table end")?;
    r.expect_magic(ENOD_MAGIC, "string table end")?;
    debug!("string table: {count} names");
    Ok(strings)
}

fn read_main_table(r: &mut Reader<'_>, rb_offset: usize, level: ReadLevel) -> Result<Vec<usize>> {
    r.seek(rb_offset)?;
    r.expect_magic(RB_MAGIC, "RB section")?;
    if level == ReadLevel::Quick {
        return Ok(Vec::new());
    }
    let count = r.read_len("RB count")?;
    let mut offsets = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let _size = r.read_i16()?;
        offsets.push(r.read_len("RB offset")?);
    }
    Ok(offsets)
}

fn read_variable_table(r: &mut Reader<'_>, offset: usize) -> Result<Vec<(usize, usize)>> {
    r.seek(offset)?;
    let count = r.read_len("variable count")?;
    let mut entries = Vec::with_capacity(count.min(r.remaining()));
    for _ in 0..count {
        let offset = r.read_len("variable offset")?;
        let size = r.read_len("variable size")?;
        entries.push((offset, size));
    }
    entries.sort_by_key(|(offset, _)| *offset);
    debug!("variable table: {count} entries");
    Ok(entries)
}

struct Variable {
    offset: usize,
    kind: VariableKind,
}

enum VariableKind {
    Open { name: String, end: usize },
    Leaf(AttributeNode),
}

fn read_variable(
    r: &mut Reader<'_>,
    offset: usize,
    size: usize,
    strings: &[String],
    level: ReadLevel,
) -> Result<Option<Variable>> {
    r.seek(offset)?;
    let magic = r.read_array::<2>()?;
    let kind = match &magic {
        BS_MAGIC => {
            if size < 4 {
                return Err(Error::decode(format!("BS at {offset:#x} has size {size}")));
            }
            let name = lookup(strings, r.read_u16()?)?;
            VariableKind::Open {
                name,
                end: offset + size,
            }
        }
        VL_MAGIC => {
            let remaining = size
                .checked_sub(6)
                .ok_or_else(|| Error::decode(format!("VL at {offset:#x} has size {size}")))?;
            let name = lookup(strings, r.read_u16()?)?;
            let type_name = lookup(strings, r.read_u16()?)?;
            let value = read_value(r, &type_name, remaining, strings, level)?;
            VariableKind::Leaf(AttributeNode::leaf(name, type_name, value))
        }
        other => {
            trace!(
                "skipping {} variable at {offset:#x}",
                String::from_utf8_lossy(other)
            );
            return Ok(None);
        }
    };
    Ok(Some(Variable { offset, kind }))
}

/// Enum-typed values (`EJournalStatus`, ...) are stored as a name index.
pub(crate) fn is_enum_type(type_name: &str) -> bool {
    let mut chars = type_name.chars();
    chars.next() == Some('E') && chars.next().is_some_and(|c| c.is_ascii_uppercase())
}

fn read_value(
    r: &mut Reader<'_>,
    type_name: &str,
    remaining: usize,
    strings: &[String],
    level: ReadLevel,
) -> Result<Option<Scalar>> {
    let v = match type_name {
        "Bool" => Scalar::Bool(r.read_u8()? == 1),
        "Int8" => Scalar::Int(r.read_i8()? as i64),
        "Int16" => Scalar::Int(r.read_i16()? as i64),
        "Int32" | "LocalizedString" => Scalar::Int(r.read_i32()? as i64),
        "Int64" => Scalar::Int(r.read_i64()?),
        "Uint8" => Scalar::UInt(r.read_u8()? as u64),
        "Uint16" => Scalar::UInt(r.read_u16()? as u64),
        "Uint32" => Scalar::UInt(r.read_u32()? as u64),
        "Uint64" => Scalar::UInt(r.read_u64()?),
        "Float" => Scalar::Float(r.read_f32()? as f64),
        "Double" => Scalar::Float(r.read_f64()?),
        "CName" => Scalar::Str(lookup(strings, r.read_u16()?)?),
        "String" => {
            let len = r.read_u16()? as usize;
            let bytes = r.read_slice(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| Error::decode(format!("invalid utf8 in String at {:#x}", r.pos() - len)))?;
            Scalar::Str(s.to_string())
        }
        "CGUID" => Scalar::Guid(Guid::from_bytes(r.read_array::<16>()?)),
        t if is_enum_type(t) => Scalar::Str(lookup(strings, r.read_u16()?)?),
        _ => match level {
            ReadLevel::Full => Scalar::Bytes(r.read_slice(remaining)?.to_vec()),
            ReadLevel::Quick => return Ok(None),
        },
    };
    Ok(Some(v))
}

fn lookup(strings: &[String], index: u16) -> Result<String> {
    strings
        .get(index as usize)
        .cloned()
        .ok_or_else(|| Error::decode(format!("string index {index} out of range ({})", strings.len())))
}

fn push_child(parent: &mut AttributeNode, child: AttributeNode) {
    if let NodeKind::Group { children } = &mut parent.kind {
        children.push(child);
    }
}

// Variables arrive sorted by offset; a BS owns everything up to its end offset.
fn build_tree(vars: Vec<Variable>) -> Result<AttributeNode> {
    let mut stack: Vec<(AttributeNode, usize)> = vec![(AttributeNode::group("", Vec::new()), usize::MAX)];
    for var in vars {
        close_groups(&mut stack, var.offset);
        match var.kind {
            VariableKind::Open { name, end } => {
                if let Some((parent, parent_end)) = stack.last()
                    && end > *parent_end
                {
                    return Err(Error::decode(format!(
                        "BS {name:?} at {:#x} ends at {end:#x}, past its parent {:?} ({parent_end:#x})",
                        var.offset, parent.name
                    )));
                }
                stack.push((AttributeNode::group(name, Vec::new()), end));
            }
            VariableKind::Leaf(node) => {
                if let Some((parent, _)) = stack.last_mut() {
                    push_child(parent, node);
                }
            }
        }
    }
    close_groups(&mut stack, usize::MAX);
    Ok(stack
        .pop()
        .map(|(root, _)| root)
        .unwrap_or_else(|| AttributeNode::group("", Vec::new())))
}

fn close_groups(stack: &mut Vec<(AttributeNode, usize)>, offset: usize) {
    while stack.len() > 1 && stack.last().is_some_and(|(_, end)| offset >= *end) {
        if let Some((done, _)) = stack.pop()
            && let Some((parent, _)) = stack.last_mut()
        {
            push_child(parent, done);
        }
    }
}

/// Bounds-checked little-endian reader over a byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
    pub fn pos(&self) -> usize {
        self.pos
    }
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::decode(format!(
                "seek to {pos:#x} past end of data ({:#x})",
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::decode(format!("unexpected eof at {:#x} (wanted {len} bytes)", self.pos)))?;
        let s = &self.data[self.pos..end];
        self.pos = end;
        Ok(s)
    }
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }
    /// An i32 used as a count or offset; negative values are rejected.
    pub fn read_len(&mut self, what: &str) -> Result<usize> {
        let at = self.pos;
        let v = self.read_i32()?;
        usize::try_from(v).map_err(|_| Error::decode(format!("negative {what} {v} at {at:#x}")))
    }
    pub fn expect_magic(&mut self, magic: &[u8], what: &str) -> Result<()> {
        let at = self.pos;
        let found = self.read_slice(magic.len())?;
        if found != magic {
            return Err(Error::decode(format!(
                "bad {what} magic at {at:#x}: expected {:?}, found {:?}",
                String::from_utf8_lossy(magic),
                String::from_utf8_lossy(found)
            )));
        }
        Ok(())
    }
    fn expect_zero(&mut self, what: &str) -> Result<()> {
        let at = self.pos;
        match self.read_i32()? {
            0 => Ok(()),
            v => Err(Error::decode(format!("expected 0 in {what} at {at:#x}, found {v}"))),
        }
    }
}
