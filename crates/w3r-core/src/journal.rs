//! Typed view of the quest journal (`CJournalManager`).
//!
//! Layout inside the variable tree:
//!
//! ```text
//! CJournalManager
//!   JStatuses
//!     JEntryStatus
//!       primaryGUID : CGUID
//!       status      : EJournalStatus
//!     JEntryStatus
//!       ...
//! ```
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binfmt::SaveGame;
use crate::error::{Error, Result};
use crate::model::{AttributeNode, Guid, Scalar};

pub const JOURNAL_MANAGER: &str = "CJournalManager";
pub const STATUSES: &str = "JStatuses";
pub const ENTRY_STATUS: &str = "JEntryStatus";
pub const PRIMARY_GUID: &str = "primaryGUID";
pub const STATUS: &str = "status";

/// Journal entry status. Serializes as its canonical name (`"Succeeded"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestStatus {
    Inactive,
    Active,
    Succeeded,
    Failed,
}

impl QuestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestStatus::Inactive => "Inactive",
            QuestStatus::Active => "Active",
            QuestStatus::Succeeded => "Succeeded",
            QuestStatus::Failed => "Failed",
        }
    }

    /// `EJournalStatus` numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(QuestStatus::Inactive),
            1 => Some(QuestStatus::Active),
            2 => Some(QuestStatus::Succeeded),
            3 => Some(QuestStatus::Failed),
            _ => None,
        }
    }

    /// Accepts both the engine names (`JS_Success`) and the canonical ones.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "JS_Inactive" | "Inactive" => Some(QuestStatus::Inactive),
            "JS_Active" | "Active" => Some(QuestStatus::Active),
            "JS_Success" | "Success" | "Succeeded" => Some(QuestStatus::Succeeded),
            "JS_Failed" | "Failed" => Some(QuestStatus::Failed),
            _ => None,
        }
    }

}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestStatusRecord {
    pub primary_guid: String,
    pub status: QuestStatus,
}

impl SaveGame {
    /// Decodes the quest journal from the tree; see [`decode_journal`].
    pub fn quests(&self) -> Result<Option<Vec<QuestStatusRecord>>> {
        decode_journal(&self.root)
    }
}

/// `None` when the save carries no journal manager at all.
pub fn decode_journal(root: &AttributeNode) -> Result<Option<Vec<QuestStatusRecord>>> {
    match root.find_child(JOURNAL_MANAGER)? {
        Some(manager) => decode_statuses(manager).map(Some),
        None => Ok(None),
    }
}

pub fn decode_statuses(manager: &AttributeNode) -> Result<Vec<QuestStatusRecord>> {
    let statuses = manager.require_group(STATUSES)?;
    statuses
        .children_named(ENTRY_STATUS)?
        .map(decode_entry)
        .collect()
}

fn decode_entry(entry: &AttributeNode) -> Result<QuestStatusRecord> {
    let primary_guid = match entry.require_child(PRIMARY_GUID)?.require_value()? {
        Scalar::Guid(g) => g.to_string(),
        Scalar::Str(s) => s.parse::<Guid>().map(|g| g.to_string()).unwrap_or_else(|_| s.clone()),
        other => {
            return Err(Error::mismatch(format!(
                "{PRIMARY_GUID} holds {other:?}, expected a guid"
            )));
        }
    };
    let status = match entry.require_child(STATUS)?.require_value()? {
        Scalar::Str(s) => QuestStatus::from_name(s),
        Scalar::Int(n) => QuestStatus::from_code(*n),
        Scalar::UInt(n) => i64::try_from(*n).ok().and_then(QuestStatus::from_code),
        _ => None,
    }
    .ok_or_else(|| Error::mismatch(format!("unknown journal status for quest {primary_guid}")))?;
    Ok(QuestStatusRecord {
        primary_guid,
        status,
    })
}
