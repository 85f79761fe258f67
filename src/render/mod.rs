//! Rendering layer: attribute stores, GPU pipelines, and picking.
//!
//! The stores (`InstancedNodeStore`, `EdgeStore`) are plain CPU buffers with
//! a staged/committed contract and no wgpu dependency of their own; `gpu`
//! uploads their committed state and `picking` re-renders the instance
//! transforms for hit-testing.

pub mod edge_store;
pub mod gpu;
pub mod node_store;
pub mod picking;

pub use edge_store::{EdgeStore, FADED_EDGE_ALPHA};
pub use gpu::GraphRenderer;
pub use node_store::{InstancedNodeStore, FADED_OPACITY, FADED_SCALE};
pub use picking::{decode_pick_id, encode_pick_id, PickingSystem, NO_HIT};
