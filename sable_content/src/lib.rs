//! # Overview
//!
//! Offline asset cooking: heterogeneous source assets are turned into
//! self-describing binary blobs (or cooked JSON for materials and
//! shaders), with cross-asset references resolved through an
//! [`AssetRegistry`](registry::AssetRegistry).
//!
//! ```text
//! sources                      importers                  outputs
//! ├─ mesh.obj / mesh.glb  ──►  mesh::cook_mesh       ──►  mesh blob
//! ├─ image.png / .jpg     ──►  texture::cook_texture ──►  pixel blob
//! ├─ sound.wav / .ogg     ──►  audio::cook_audio     ──►  chunked audio blob
//! ├─ surface.hlsl/.slang  ──►  shader::cook_shader   ──►  inlined shader text
//! └─ surface.mat (JSON)   ──►  material::cook_material ─► cooked JSON + deps
//! ```
//!
//! The registry is built before cooking starts and is treated as an
//! immutable snapshot while importers run; every importer call is
//! synchronous, independent and side-effect-free on shared state, so an
//! external worker pool can cook assets in parallel without additional
//! synchronization.
//!
//! Each importer returns its cooked bytes together with a summary
//! descriptor and (for materials) a dependency list; the driver feeds both
//! back into the registry.

mod common;
mod json;

pub mod audio;
pub mod blob;
pub mod material;
pub mod mesh;
pub mod meta;
pub mod model;
pub mod registry;
pub mod shader;
pub mod texture;

pub use common::{AssetHandle, AssetType, Error, Result};
