//! World kernel: the chunked cell grid behind edit transactions, binders, active areas
//! and dynamic lights.
//!
//! # Invariants
//! - All cell mutations flow through [`World::edit`] and are reported to binders when the
//!   transaction closes.
//! - Derived cell state (obstruction flags, openness) is refreshed before binders see an
//!   edit, except in generator mode.
//! - Binder callbacks other than `on_chunk_ready` run on the thread that owns the world.

mod binder;
mod config;
mod editor;
mod error;
mod light;
mod permission;
mod refresh;
mod world;

pub use binder::{
    Binder, CellEditInfo, DEFAULT_BINDER_PRIORITY, MAX_BINDER_PRIORITY, MIN_BINDER_PRIORITY,
};
pub use config::WorldConfig;
pub use editor::Editor;
pub use error::WorldError;
pub use light::Light;
pub use permission::EditPermission;
pub use world::{ActiveAreaId, REFRESH_HALO, World};

pub fn crate_info() -> &'static str {
    "gridspace-kernel v0.1.0"
}
