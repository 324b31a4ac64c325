//! Prefabs: serialized node trees that can be instantiated many times and
//! whose edits flow back into every live instance.
//!
//! # Invariants
//! - Every instantiated object carries a link to the template object it
//!   was cloned from.
//! - A prefab is never unloaded while pinned or while a live node derives
//!   from it.
//! - Reconciling against an unchanged template mutates nothing.

mod library;
mod prefab;
mod reconcile;

pub use library::PrefabLibrary;
pub use prefab::{Prefab, PrefabError, PrefabState};
pub use reconcile::ReconcileReport;
