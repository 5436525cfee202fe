//! Coursehub domain core.
//!
//! Pure types, constants, and validation shared by the database, payment,
//! and API crates. Has no internal dependencies and performs no I/O.

pub mod course;
pub mod error;
pub mod pricing;
pub mod signature;
pub mod types;
