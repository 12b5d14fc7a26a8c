//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//! - Each entity comes as a `*Core` (no ID, used for insertion) and a full
//!   version carrying its `_id`.

pub mod candidate;
pub mod election;
pub mod party;
pub mod vote;
pub mod voter;
