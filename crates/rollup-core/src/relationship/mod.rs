//! Relationship Field Finder
//!
//! Turns dotted field paths (`Account.Owner.Region`) into validated hop
//! lists once, at resolution time. Everything downstream walks the parsed
//! hops instead of splitting strings again.

pub mod finder;

pub use finder::{resolve_field, resolve_path, FieldRef, Hop, RelationshipPath};
