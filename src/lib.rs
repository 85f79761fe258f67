//! Constellate - instanced 3D rendering and interaction engine for
//! channel/block graphs.
//!
//! A loaded graph becomes a [`graph::GraphModel`] (typed entities plus
//! read-only derived indices), which sizes the flat attribute stores in
//! [`render`]. Layout algorithms in [`layout`] compute target positions and
//! an animator interpolates toward them; [`engine::Engine`] enforces the
//! one-active-visual-mode convention on top of it all.

pub mod engine;
pub mod graph;
pub mod layout;
pub mod render;

pub use engine::{ActiveMode, Engine};
pub use graph::{Block, BlockKind, Channel, GraphLoadError, GraphModel};
pub use layout::{Layout, LayoutEngine, LayoutKind, LayoutParams};
pub use render::{EdgeStore, GraphRenderer, InstancedNodeStore, PickingSystem, NO_HIT};
