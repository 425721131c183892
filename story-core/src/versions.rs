//! Version store: an in-memory tree of story snapshots.
//!
//! The first version is the root and has no parent. Every other version
//! points at an existing parent. Versions are kept in creation order, and the
//! store tracks which one is active and, optionally, which one is being
//! compared against.

use crate::ai::Analysis;
use crate::error::VersionError;
use crate::model::{Character, Flowchart};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a story version.
pub type VersionId = Uuid;

/// Name given to the root version.
pub const ROOT_NAME: &str = "Original";

/// One snapshot of story text and its derived structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryVersion {
    pub id: VersionId,
    pub name: String,
    pub text: String,
    #[serde(rename = "flowchartData")]
    pub flowchart: Flowchart,
    pub characters: Vec<Character>,
    pub plot: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub parent_version_id: Option<VersionId>,
}

impl StoryVersion {
    fn new(
        name: String,
        text: String,
        analysis: Analysis,
        description: String,
        parent: Option<VersionId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            text,
            flowchart: analysis.flowchart,
            characters: analysis.characters,
            plot: analysis.plot,
            timestamp: Utc::now(),
            description,
            parent_version_id: parent,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_version_id.is_none()
    }

    /// The derived structure as an analysis.
    pub fn analysis(&self) -> Analysis {
        Analysis {
            flowchart: self.flowchart.clone(),
            characters: self.characters.clone(),
            plot: self.plot.clone(),
        }
    }
}

/// Ordered collection of versions with an active and a compare selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawVersionStore")]
pub struct VersionStore {
    versions: Vec<StoryVersion>,
    active: usize,
    compare: Option<usize>,
    next_number: usize,
}

/// Unchecked wire form of a [`VersionStore`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVersionStore {
    versions: Vec<StoryVersion>,
    active: usize,
    compare: Option<usize>,
    next_number: usize,
}

impl TryFrom<RawVersionStore> for VersionStore {
    type Error = String;

    fn try_from(raw: RawVersionStore) -> Result<Self, Self::Error> {
        let len = raw.versions.len();
        match raw.versions.first() {
            None => return Err("version store has no versions".to_string()),
            Some(first) if !first.is_root() => {
                return Err("first version must be the root".to_string())
            }
            Some(_) => {}
        }
        if raw.versions.iter().skip(1).any(StoryVersion::is_root) {
            return Err("version store has more than one root".to_string());
        }
        for version in &raw.versions {
            if let Some(parent) = version.parent_version_id {
                if !raw.versions.iter().any(|v| v.id == parent) {
                    return Err(format!(
                        "version {} points at missing parent {}",
                        version.id, parent
                    ));
                }
            }
        }
        if raw.active >= len {
            return Err(format!("active index {} out of range for {} versions", raw.active, len));
        }
        if let Some(compare) = raw.compare.filter(|&c| c >= len) {
            return Err(format!("compare index {} out of range for {} versions", compare, len));
        }

        Ok(Self {
            versions: raw.versions,
            active: raw.active,
            compare: raw.compare,
            next_number: raw.next_number.max(len + 1),
        })
    }
}

impl VersionStore {
    /// Create a store holding only the root version, which becomes active.
    pub fn new(text: impl Into<String>, analysis: Analysis, description: impl Into<String>) -> Self {
        let root = StoryVersion::new(
            ROOT_NAME.to_string(),
            text.into(),
            analysis,
            description.into(),
            None,
        );
        tracing::info!(version_id = %root.id, "created root version");

        Self {
            versions: vec![root],
            active: 0,
            compare: None,
            next_number: 2,
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn versions(&self) -> &[StoryVersion] {
        &self.versions
    }

    pub fn root(&self) -> &StoryVersion {
        &self.versions[0]
    }

    pub fn get(&self, id: VersionId) -> Option<&StoryVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn index_of(&self, id: VersionId) -> Option<usize> {
        self.versions.iter().position(|v| v.id == id)
    }

    pub fn at(&self, index: usize) -> Result<&StoryVersion, VersionError> {
        self.versions.get(index).ok_or(VersionError::InvalidIndex {
            index,
            len: self.versions.len(),
        })
    }

    pub fn active(&self) -> &StoryVersion {
        &self.versions[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn compare_index(&self) -> Option<usize> {
        self.compare
    }

    pub fn compare_version(&self) -> Option<&StoryVersion> {
        self.compare.and_then(|i| self.versions.get(i))
    }

    /// Append a child of `parent`. The active selection does not move.
    pub fn append(
        &mut self,
        parent: VersionId,
        text: impl Into<String>,
        analysis: Analysis,
        description: impl Into<String>,
    ) -> Result<VersionId, VersionError> {
        if self.get(parent).is_none() {
            return Err(VersionError::MissingParent(parent));
        }

        let name = format!("Version {}", self.next_number);
        self.next_number += 1;

        let version =
            StoryVersion::new(name, text.into(), analysis, description.into(), Some(parent));
        let id = version.id;
        tracing::info!(version_id = %id, parent_id = %parent, "appended version");
        self.versions.push(version);
        Ok(id)
    }

    /// Make the version at `index` active.
    pub fn set_active(&mut self, index: usize) -> Result<&StoryVersion, VersionError> {
        self.at(index)?;
        self.active = index;
        Ok(&self.versions[index])
    }

    pub fn set_active_id(&mut self, id: VersionId) -> Result<&StoryVersion, VersionError> {
        let index = self.index_of(id).ok_or(VersionError::NotFound(id))?;
        self.set_active(index)
    }

    /// Select a version to compare against, or clear the selection.
    pub fn set_compare(&mut self, index: Option<usize>) -> Result<(), VersionError> {
        if let Some(i) = index {
            self.at(i)?;
        }
        self.compare = index;
        Ok(())
    }

    pub fn rename(&mut self, id: VersionId, name: impl Into<String>) -> Result<(), VersionError> {
        let index = self.index_of(id).ok_or(VersionError::NotFound(id))?;
        let version = &mut self.versions[index];
        if version.is_root() {
            return Err(VersionError::RootVersion);
        }
        version.name = name.into();
        Ok(())
    }

    /// Replace the active version's text and structure in place.
    pub fn update_active(&mut self, text: impl Into<String>, analysis: Analysis) -> VersionId {
        let version = &mut self.versions[self.active];
        version.text = text.into();
        version.flowchart = analysis.flowchart;
        version.characters = analysis.characters;
        version.plot = analysis.plot;
        version.timestamp = Utc::now();
        tracing::info!(version_id = %version.id, "re-analyzed version in place");
        version.id
    }

    /// Delete a non-root version.
    ///
    /// Children move up to the deleted version's parent. A deleted active
    /// version hands the selection to the preceding version; selections after
    /// the removed slot shift down by one; a compare selection on the removed
    /// version is cleared.
    pub fn delete(&mut self, id: VersionId) -> Result<StoryVersion, VersionError> {
        let index = self.index_of(id).ok_or(VersionError::NotFound(id))?;
        if self.versions[index].is_root() {
            return Err(VersionError::RootVersion);
        }

        let removed = self.versions.remove(index);
        for version in &mut self.versions {
            if version.parent_version_id == Some(removed.id) {
                version.parent_version_id = removed.parent_version_id;
            }
        }

        if self.active >= index {
            self.active = self.active.saturating_sub(1);
        }

        self.compare = match self.compare {
            Some(c) if c == index => None,
            Some(c) if c > index => Some(c - 1),
            other => other,
        };

        tracing::info!(version_id = %removed.id, "deleted version");
        Ok(removed)
    }

    /// Direct children of `id`, in creation order.
    pub fn children(&self, id: VersionId) -> Vec<&StoryVersion> {
        self.versions
            .iter()
            .filter(|v| v.parent_version_id == Some(id))
            .collect()
    }

    /// Ids from `id` up to the root, inclusive.
    pub fn ancestry(&self, id: VersionId) -> Vec<VersionId> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(version) = current {
            if chain.contains(&version.id) {
                break;
            }
            chain.push(version.id);
            current = version.parent_version_id.and_then(|p| self.get(p));
        }
        chain
    }

    /// Every (parent, child) pair, in child creation order.
    pub fn parent_edges(&self) -> Vec<(VersionId, VersionId)> {
        self.versions
            .iter()
            .filter_map(|v| v.parent_version_id.map(|p| (p, v.id)))
            .collect()
    }
}
