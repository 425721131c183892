//! Story data model: flowcharts and characters.

mod character;
mod flowchart;

pub use character::{
    Character, CharacterDiff, CharacterRelation, FieldChanges, ModifiedCharacter,
};
pub use flowchart::{EdgeKind, FlowEdge, FlowNode, Flowchart, Position, MAX_NODES};
