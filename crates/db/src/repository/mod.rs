//! Repository functions, one per database operation.
//!
//! Every function takes a pool or an open transaction and returns a
//! `Result<T, DbError>`.  No business logic, only SQL.

pub mod definitions;
pub mod instances;
