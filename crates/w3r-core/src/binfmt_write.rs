// Encoder for the savegame format read by `binfmt`. Used to re-encode trees
// and to build synthetic saves.
use std::collections::HashMap;
use std::path::Path;

use crate::binfmt::{
    BS_MAGIC, CHUNK_ENTRY_SIZE, CONTAINER_MAGIC, ENOD_MAGIC, FOOTER_MAGIC, MANU_MAGIC, NM_MAGIC,
    RB_MAGIC, SAVE_MAGIC, VL_MAGIC, is_enum_type,
};
use crate::error::{Error, Result};
use crate::model::{AttributeNode, NodeKind, Scalar};

#[derive(Debug, Clone, Copy)]
pub struct WriteOpts {
    pub type_codes: [i32; 3],
    /// Uncompressed bytes per LZ4 chunk.
    pub chunk_size: usize,
}

impl Default for WriteOpts {
    fn default() -> Self {
        Self {
            type_codes: [0, 0, 0],
            chunk_size: 1 << 20,
        }
    }
}

/// Encode `root`'s children as the top-level variables of a save file.
pub fn write_save(root: &AttributeNode, opts: WriteOpts) -> Result<Vec<u8>> {
    if !root.is_group() {
        return Err(Error::mismatch("save root must be a group"));
    }
    let chunk_size = opts.chunk_size.max(1);
    // inner offsets are absolute, so size the container header first
    let probe = Writer::new(0).write_image(root, opts.type_codes)?;
    let chunk_count = probe.len().div_ceil(chunk_size).max(1);
    let header_size = CONTAINER_MAGIC.len() + 8 + chunk_count * CHUNK_ENTRY_SIZE;
    let body = Writer::new(header_size).write_image(root, opts.type_codes)?;

    let mut table = Vec::with_capacity(header_size);
    let mut payload = Vec::with_capacity(body.len());
    table.extend_from_slice(CONTAINER_MAGIC);
    table.extend_from_slice(&to_i32(chunk_count)?.to_le_bytes());
    table.extend_from_slice(&to_i32(header_size)?.to_le_bytes());
    let mut end_offset = header_size;
    for chunk in body.chunks(chunk_size) {
        let compressed = lz4_flex::block::compress(chunk);
        end_offset += chunk.len();
        table.extend_from_slice(&to_i32(compressed.len())?.to_le_bytes());
        table.extend_from_slice(&to_i32(chunk.len())?.to_le_bytes());
        table.extend_from_slice(&to_i32(end_offset)?.to_le_bytes());
        payload.extend_from_slice(&compressed);
    }
    table.extend_from_slice(&payload);
    Ok(table)
}

pub fn write_save_file(path: &Path, root: &AttributeNode, opts: WriteOpts) -> Result<()> {
    let data = write_save(root, opts)?;
    std::fs::write(path, data)?;
    Ok(())
}

fn to_i32(v: usize) -> Result<i32> {
    i32::try_from(v).map_err(|_| Error::decode(format!("{v} does not fit in an i32 field")))
}

struct Writer {
    out: Vec<u8>,
    base: usize,
    strings: Vec<String>,
    string_ids: HashMap<String, u16>,
    variables: Vec<(usize, usize)>,
    top_level: Vec<(usize, usize)>,
}

impl Writer {
    fn new(base: usize) -> Self {
        Self {
            out: Vec::with_capacity(1024),
            base,
            strings: Vec::new(),
            string_ids: HashMap::new(),
            variables: Vec::new(),
            top_level: Vec::new(),
        }
    }
    fn pos(&self) -> usize {
        self.base + self.out.len()
    }
    fn write_u16(&mut self, v: u16) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }
    fn write_i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }
    fn write_len(&mut self, v: usize) -> Result<()> {
        let v = to_i32(v)?;
        self.write_i32(v);
        Ok(())
    }
    // index 0 is reserved for the empty string
    fn intern(&mut self, s: &str) -> Result<u16> {
        if s.is_empty() {
            return Ok(0);
        }
        if let Some(id) = self.string_ids.get(s) {
            return Ok(*id);
        }
        if s.len() > u8::MAX as usize {
            return Err(Error::mismatch(format!("name too long for string table: {s:?}")));
        }
        let id = u16::try_from(self.strings.len() + 1)
            .map_err(|_| Error::mismatch("string table is full"))?;
        self.strings.push(s.to_string());
        self.string_ids.insert(s.to_string(), id);
        Ok(id)
    }

    fn write_image(mut self, root: &AttributeNode, type_codes: [i32; 3]) -> Result<Vec<u8>> {
        self.out.extend_from_slice(SAVE_MAGIC);
        for code in type_codes {
            self.write_i32(code);
        }
        for child in root.children() {
            let offset = self.pos();
            self.write_node(child)?;
            self.top_level.push((offset, self.pos() - offset));
        }

        let nm_offset = self.pos();
        self.out.extend_from_slice(NM_MAGIC);
        self.out.extend_from_slice(MANU_MAGIC);
        self.write_len(self.strings.len())?;
        self.write_i32(0);
        let strings = std::mem::take(&mut self.strings);
        for s in &strings {
            self.out.push(s.len() as u8);
            self.out.extend_from_slice(s.as_bytes());
        }
        self.write_i32(0);
        self.out.extend_from_slice(ENOD_MAGIC);

        let rb_offset = self.pos();
        self.out.extend_from_slice(RB_MAGIC);
        self.write_len(self.top_level.len())?;
        for (offset, size) in std::mem::take(&mut self.top_level) {
            // The RB size field is 16 bits wide and saturates for blocks past
            // 32 KiB; readers locate variables through the variable table.
            let size = i16::try_from(size).unwrap_or(i16::MAX);
            self.out.extend_from_slice(&size.to_le_bytes());
            self.write_len(offset)?;
        }

        self.write_len(nm_offset)?;
        self.write_len(rb_offset)?;
        self.out.extend_from_slice(&[0, 0]);

        let var_table_offset = self.pos();
        self.write_len(self.variables.len())?;
        for (offset, size) in std::mem::take(&mut self.variables) {
            self.write_len(offset)?;
            self.write_len(size)?;
        }
        self.write_len(var_table_offset)?;
        self.out.extend_from_slice(FOOTER_MAGIC);
        Ok(self.out)
    }

    fn write_node(&mut self, node: &AttributeNode) -> Result<()> {
        let offset = self.pos();
        match &node.kind {
            NodeKind::Group { children } => {
                self.out.extend_from_slice(BS_MAGIC);
                let name = self.intern(&node.name)?;
                self.write_u16(name);
                for child in children {
                    self.write_node(child)?;
                }
            }
            NodeKind::Leaf { type_name, value } => {
                self.out.extend_from_slice(VL_MAGIC);
                let name = self.intern(&node.name)?;
                let ty = self.intern(type_name)?;
                self.write_u16(name);
                self.write_u16(ty);
                self.write_value(&node.name, type_name, value.as_ref())?;
            }
        }
        self.variables.push((offset, self.pos() - offset));
        Ok(())
    }

    fn write_value(&mut self, name: &str, type_name: &str, value: Option<&Scalar>) -> Result<()> {
        let bad = || {
            Error::mismatch(format!(
                "leaf '{name}' of type {type_name} cannot hold {value:?}"
            ))
        };
        let Some(value) = value else {
            return if is_opaque(type_name) { Ok(()) } else { Err(bad()) };
        };
        match (type_name, value) {
            ("Bool", Scalar::Bool(b)) => self.out.push(u8::from(*b)),
            ("Int8", Scalar::Int(x)) => {
                let v = i8::try_from(*x).map_err(|_| bad())?;
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            ("Int16", Scalar::Int(x)) => {
                let v = i16::try_from(*x).map_err(|_| bad())?;
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            ("Int32" | "LocalizedString", Scalar::Int(x)) => {
                let v = i32::try_from(*x).map_err(|_| bad())?;
                self.write_i32(v);
            }
            ("Int64", Scalar::Int(x)) => self.out.extend_from_slice(&x.to_le_bytes()),
            ("Uint8", Scalar::UInt(x)) => self.out.push(u8::try_from(*x).map_err(|_| bad())?),
            ("Uint16", Scalar::UInt(x)) => {
                let v = u16::try_from(*x).map_err(|_| bad())?;
                self.write_u16(v);
            }
            ("Uint32", Scalar::UInt(x)) => {
                let v = u32::try_from(*x).map_err(|_| bad())?;
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            ("Uint64", Scalar::UInt(x)) => self.out.extend_from_slice(&x.to_le_bytes()),
            ("Float", Scalar::Float(x)) => self.out.extend_from_slice(&(*x as f32).to_le_bytes()),
            ("Double", Scalar::Float(x)) => self.out.extend_from_slice(&x.to_le_bytes()),
            ("String", Scalar::Str(s)) => {
                let len = u16::try_from(s.len()).map_err(|_| bad())?;
                self.write_u16(len);
                self.out.extend_from_slice(s.as_bytes());
            }
            ("CGUID", Scalar::Guid(g)) => self.out.extend_from_slice(&g.to_bytes()),
            (t, Scalar::Str(s)) if t == "CName" || is_enum_type(t) => {
                let id = self.intern(s)?;
                self.write_u16(id);
            }
            (t, Scalar::Bytes(b)) if is_opaque(t) => self.out.extend_from_slice(b),
            _ => return Err(bad()),
        }
        Ok(())
    }
}

fn is_opaque(type_name: &str) -> bool {
    !matches!(
        type_name,
        "Bool"
            | "Int8"
            | "Int16"
            | "Int32"
            | "Int64"
            | "LocalizedString"
            | "Uint8"
            | "Uint16"
            | "Uint32"
            | "Uint64"
            | "Float"
            | "Double"
            | "CName"
            | "String"
            | "CGUID"
    ) && !is_enum_type(type_name)
}
