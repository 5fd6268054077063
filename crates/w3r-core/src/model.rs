use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A `CGUID` as stored in the save (16 bytes, .NET field layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid {
    pub a: u32,
    pub b: u16,
    pub c: u16,
    pub d_to_k: [u8; 8],
}

impl Guid {
    pub fn from_bytes(raw: [u8; 16]) -> Self {
        let mut d_to_k = [0u8; 8];
        d_to_k.copy_from_slice(&raw[8..16]);
        Self {
            a: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            b: u16::from_le_bytes([raw[4], raw[5]]),
            c: u16::from_le_bytes([raw[6], raw[7]]),
            d_to_k,
        }
    }

    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.a.to_le_bytes());
        out[4..6].copy_from_slice(&self.b.to_le_bytes());
        out[6..8].copy_from_slice(&self.c.to_le_bytes());
        out[8..16].copy_from_slice(&self.d_to_k);
        out
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-",
            self.a, self.b, self.c, self.d_to_k[0], self.d_to_k[1]
        )?;
        for b in &self.d_to_k[2..] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

// Canonical hyphenated form (8-4-4-4-12), case-insensitive
impl FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::decode(format!("invalid guid: {s:?}"));
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 5
            || parts[0].len() != 8
            || parts[1].len() != 4
            || parts[2].len() != 4
            || parts[3].len() != 4
            || parts[4].len() != 12
        {
            return Err(bad());
        }
        let a = u32::from_str_radix(parts[0], 16).map_err(|_| bad())?;
        let b = u16::from_str_radix(parts[1], 16).map_err(|_| bad())?;
        let c = u16::from_str_radix(parts[2], 16).map_err(|_| bad())?;
        let tail = format!("{}{}", parts[3], parts[4]);
        let mut d_to_k = [0u8; 8];
        for (i, slot) in d_to_k.iter_mut().enumerate() {
            let off = i * 2;
            *slot = tail
                .get(off..off + 2)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(bad)?;
        }
        Ok(Guid { a, b, c, d_to_k })
    }
}

/// Decoded leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Guid(Guid),
    Bytes(Vec<u8>),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(x) => write!(f, "{}", x),
            Scalar::UInt(x) => write!(f, "{}", x),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Str(s) => f.write_str(s),
            Scalar::Guid(g) => write!(f, "{}", g),
            Scalar::Bytes(b) => {
                for by in b {
                    write!(f, "{:02x}", by)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `VL` variable. `value` is `None` when the type was not decoded.
    Leaf {
        type_name: String,
        value: Option<Scalar>,
    },
    /// `BS` block; children keep file order.
    Group { children: Vec<AttributeNode> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeNode {
    pub name: String,
    pub kind: NodeKind,
}

impl AttributeNode {
    pub fn group(name: impl Into<String>, children: Vec<AttributeNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Group { children },
        }
    }

    pub fn leaf(
        name: impl Into<String>,
        type_name: impl Into<String>,
        value: impl Into<Option<Scalar>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Leaf {
                type_name: type_name.into(),
                value: value.into(),
            },
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    /// Children of a group; a leaf has none.
    pub fn children(&self) -> &[AttributeNode] {
        match &self.kind {
            NodeKind::Group { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn value(&self) -> Option<&Scalar> {
        match &self.kind {
            NodeKind::Leaf { value, .. } => value.as_ref(),
            NodeKind::Group { .. } => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Leaf { type_name, .. } => Some(type_name),
            NodeKind::Group { .. } => None,
        }
    }

    fn group_children(&self) -> Result<&[AttributeNode]> {
        match &self.kind {
            NodeKind::Group { children } => Ok(children),
            NodeKind::Leaf { .. } => Err(Error::mismatch(format!(
                "'{}' is a leaf, expected a group",
                self.name
            ))),
        }
    }

    /// First direct child with exactly `name`. One level only.
    pub fn find_child(&self, name: &str) -> Result<Option<&AttributeNode>> {
        Ok(self.group_children()?.iter().find(|c| c.name == name))
    }

    pub fn require_child(&self, name: &str) -> Result<&AttributeNode> {
        self.find_child(name)?.ok_or_else(|| {
            Error::mismatch(format!("'{}' has no child named '{}'", self.name, name))
        })
    }

    /// Like [`require_child`](Self::require_child) but the child must itself be a group.
    pub fn require_group(&self, name: &str) -> Result<&AttributeNode> {
        let child = self.require_child(name)?;
        if !child.is_group() {
            return Err(Error::mismatch(format!(
                "'{}' is a leaf, expected a group",
                name
            )));
        }
        Ok(child)
    }

    /// Direct children named `name`, in file order.
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> Result<impl Iterator<Item = &'a AttributeNode> + 'a> {
        Ok(self
            .group_children()?
            .iter()
            .filter(move |c| c.name == name))
    }

    pub fn require_value(&self) -> Result<&Scalar> {
        match &self.kind {
            NodeKind::Leaf {
                value: Some(v), ..
            } => Ok(v),
            NodeKind::Leaf { value: None, type_name } => Err(Error::mismatch(format!(
                "'{}' ({}) has no decoded value",
                self.name, type_name
            ))),
            NodeKind::Group { .. } => Err(Error::mismatch(format!(
                "'{}' is a group, expected a leaf",
                self.name
            ))),
        }
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.children()
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}
