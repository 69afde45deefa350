//! 24-hour stories. Rows live in `db::stories`; expiry is enforced at read
//! time and reclaimed by a periodic purge.

pub mod retention;
pub mod routes;
