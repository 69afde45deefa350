pub mod profile;
pub mod relations;
