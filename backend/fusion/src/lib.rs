//! Fusion engine: merges per-image extraction results into one record.
//!
//! The merge is a pure function of the ordered result list. Every field is
//! resolved through the precedence table in [`policy`], so slot-labeled and
//! unlabeled batches go through the same code path.

pub mod engine;
pub mod policy;

pub use engine::{fuse, fuse_outcomes, FusionMode};
pub use policy::{policy_for, FieldPolicy, Position};
