//! Access-token handling.
//!
//! Accounts and login live in a separate service; this API only verifies
//! the HS256 access tokens it issues.

pub mod jwt;
