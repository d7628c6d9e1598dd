//! Sea-ORM entities for shopora-store

pub mod kv_entries;

pub use kv_entries::Entity as KvEntries;
