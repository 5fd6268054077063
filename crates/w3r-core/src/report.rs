use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::binfmt::SaveGame;
use crate::error::{Error, Result};
use crate::journal::{QuestStatus, QuestStatusRecord};
use crate::model::AttributeNode;

pub const MAP_MANAGER: &str = "CCommonMapManager";
pub const MAP_PIN_TAG: &str = "MapPinTag";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestStatusEntry {
    #[serde(rename = "Guid")]
    pub primary_guid: String,
    #[serde(rename = "Status")]
    pub status: QuestStatus,
}

/// Field order matches the tracker JSON consumers expect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub quests: Vec<QuestStatusEntry>,
    pub map_pin_tags: Vec<String>,
}

impl Report {
    /// Distinct quests (by upper-cased GUID) that succeeded, optionally
    /// restricted to a set of known upper-cased GUIDs.
    pub fn count_succeeded(&self, known: Option<&HashSet<String>>) -> usize {
        self.quests
            .iter()
            .filter(|q| q.status == QuestStatus::Succeeded)
            .map(|q| q.primary_guid.to_ascii_uppercase())
            .filter(|guid| known.is_none_or(|k| k.contains(guid)))
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Every `MapPinTag` value directly under `CCommonMapManager`, in file order.
pub fn extract_map_pin_tags(root: &AttributeNode) -> Result<Vec<String>> {
    let manager = root.require_group(MAP_MANAGER)?;
    manager
        .children_named(MAP_PIN_TAG)?
        .map(|tag| tag.require_value().map(|v| v.to_string()))
        .collect()
}

pub fn extract_quests(statuses: &[QuestStatusRecord]) -> Vec<QuestStatusEntry> {
    statuses
        .iter()
        .map(|s| QuestStatusEntry {
            primary_guid: s.primary_guid.clone(),
            status: s.status,
        })
        .collect()
}

/// All-or-nothing: a missing journal fails the report even if tags were found.
pub fn build_report(
    root: &AttributeNode,
    statuses: Option<&[QuestStatusRecord]>,
) -> Result<Report> {
    let map_pin_tags = extract_map_pin_tags(root)?;
    let statuses = statuses.ok_or_else(|| Error::mismatch("save has no quest journal data"))?;
    Ok(Report {
        quests: extract_quests(statuses),
        map_pin_tags,
    })
}

impl SaveGame {
    pub fn report(&self) -> Result<Report> {
        let quests = self.quests()?;
        build_report(&self.root, quests.as_deref())
    }
}
