mod bson;
mod collection;
mod errors;

pub use bson::{serde_id_hex, serde_id_map, Id};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use errors::{is_duplicate_key_error, is_write_conflict};
