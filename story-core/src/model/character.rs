//! Story characters and character-list diffs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A directed relationship from one character to another.
///
/// `to` is not checked against the character list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterRelation {
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl CharacterRelation {
    pub fn new(to: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            kind: kind.into(),
        }
    }
}

/// A character in a story version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub relationships: Vec<CharacterRelation>,
}

impl Character {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            relationships: Vec::new(),
        }
    }

    /// Synthetic id used by the analyzer for the `index`-th character.
    pub fn synthetic_id(index: usize) -> String {
        format!("char-{index}")
    }

    pub fn with_relation(mut self, to: impl Into<String>, kind: impl Into<String>) -> Self {
        self.relationships.push(CharacterRelation::new(to, kind));
        self
    }
}

/// Which fields of a character differ between two lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldChanges {
    pub name: bool,
    pub description: bool,
    pub relationships: bool,
}

impl FieldChanges {
    pub fn any(&self) -> bool {
        self.name || self.description || self.relationships
    }
}

/// A character present in both lists.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedCharacter {
    pub before: Character,
    pub after: Character,
    pub changes: FieldChanges,
}

/// Difference between an old and a new character list, matched by id.
///
/// Every input character lands in exactly one bucket; a character present on
/// both sides is a single `modified` entry even when nothing changed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CharacterDiff {
    pub added: Vec<Character>,
    pub modified: Vec<ModifiedCharacter>,
    pub deleted: Vec<Character>,
}

impl CharacterDiff {
    pub fn compute(before: &[Character], after: &[Character]) -> Self {
        let mut diff = Self::default();

        for new in after {
            match before.iter().find(|old| old.id == new.id) {
                Some(old) => {
                    let changes = FieldChanges {
                        name: old.name != new.name,
                        description: old.description != new.description,
                        relationships: !same_relations(&old.relationships, &new.relationships),
                    };
                    diff.modified.push(ModifiedCharacter {
                        before: old.clone(),
                        after: new.clone(),
                        changes,
                    });
                }
                None => diff.added.push(new.clone()),
            }
        }

        for old in before {
            if !after.iter().any(|new| new.id == old.id) {
                diff.deleted.push(old.clone());
            }
        }

        diff
    }

    /// Modified entries with at least one changed field.
    pub fn changed(&self) -> impl Iterator<Item = &ModifiedCharacter> {
        self.modified.iter().filter(|m| m.changes.any())
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.deleted.is_empty() || self.changed().next().is_some()
    }

    /// Human-readable summary used in rewrite prompts.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();

        for c in &self.added {
            lines.push(format!("- Added: {} ({})", c.name, c.description));
        }
        for m in self.changed() {
            let mut parts = Vec::new();
            if m.changes.name {
                parts.push(format!("name \"{}\" -> \"{}\"", m.before.name, m.after.name));
            }
            if m.changes.description {
                parts.push(format!("description now \"{}\"", m.after.description));
            }
            if m.changes.relationships {
                let rels: Vec<String> = m
                    .after
                    .relationships
                    .iter()
                    .map(|r| format!("{} of {}", r.kind, r.to))
                    .collect();
                parts.push(format!("relationships now [{}]", rels.join(", ")));
            }
            lines.push(format!("- Modified: {}: {}", m.after.name, parts.join("; ")));
        }
        for c in &self.deleted {
            lines.push(format!("- Deleted: {}", c.name));
        }

        if lines.is_empty() {
            "- No changes".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Relationship lists compare as sets; order is not meaningful.
fn same_relations(a: &[CharacterRelation], b: &[CharacterRelation]) -> bool {
    let a: HashSet<_> = a.iter().collect();
    let b: HashSet<_> = b.iter().collect();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast() -> Vec<Character> {
        vec![
            Character::new("char-0", "Mira", "A cartographer"),
            Character::new("char-1", "Tovin", "Her brother").with_relation("char-0", "sibling"),
            Character::new("char-2", "The Warden", "Keeper of the gate"),
        ]
    }

    #[test]
    fn test_every_character_in_one_bucket() {
        let before = cast();
        let mut after = cast();
        after.remove(2);
        after[0].name = "Mira Vell".to_string();
        after.push(Character::new("char-9", "Oskar", "A smuggler"));

        let diff = CharacterDiff::compute(&before, &after);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.deleted.len(), 1);
        assert_eq!(diff.modified.len(), 2);

        let mut seen: Vec<&str> = diff
            .added
            .iter()
            .chain(diff.deleted.iter())
            .map(|c| c.id.as_str())
            .chain(diff.modified.iter().map(|m| m.after.id.as_str()))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["char-0", "char-1", "char-2", "char-9"]);
    }

    #[test]
    fn test_field_flags() {
        let before = cast();
        let mut after = cast();
        after[0].name = "Mira Vell".to_string();
        after[1].description = "Her younger brother".to_string();
        after[1].relationships.push(CharacterRelation::new("char-2", "rival"));

        let diff = CharacterDiff::compute(&before, &after);
        let mira = &diff.modified[0];
        assert_eq!(
            mira.changes,
            FieldChanges {
                name: true,
                description: false,
                relationships: false
            }
        );
        let tovin = &diff.modified[1];
        assert!(!tovin.changes.name);
        assert!(tovin.changes.description);
        assert!(tovin.changes.relationships);
        assert!(!diff.modified[2].changes.any());
    }

    #[test]
    fn test_relationship_order_ignored() {
        let a = Character::new("c", "A", "d")
            .with_relation("x", "friend")
            .with_relation("y", "enemy");
        let b = Character::new("c", "A", "d")
            .with_relation("y", "enemy")
            .with_relation("x", "friend");
        let diff = CharacterDiff::compute(&[a], &[b]);
        assert!(!diff.has_changes());
        assert_eq!(diff.describe(), "- No changes");
    }

    #[test]
    fn test_describe_mentions_each_change() {
        let before = cast();
        let mut after = cast();
        after.remove(2);
        after.push(Character::new("char-9", "Oskar", "A smuggler"));
        let text = CharacterDiff::compute(&before, &after).describe();
        assert!(text.contains("Added: Oskar"));
        assert!(text.contains("Deleted: The Warden"));
        assert!(!text.contains("Modified"));
    }

    #[test]
    fn test_relation_serializes_type_field() {
        let rel = CharacterRelation::new("char-1", "mentor");
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "mentor");
    }
}
