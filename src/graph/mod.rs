//! Graph domain model: file parsing, entities, and derived indices.
//!
//! Nothing in here knows about rendering; the only contract with the render
//! layers is the dense index each channel and block is assigned at load.

pub mod model;
pub mod schema;

pub use model::{
    Block, BlockKind, Channel, Color, GraphLoadError, GraphModel, LoadOptions, ORPHAN_COLOR,
};
