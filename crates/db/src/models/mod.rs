//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` input DTOs for inserts and patches where the API accepts them

pub mod cart;
pub mod course;
pub mod order;
pub mod status;
pub mod user;
