//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods. Methods
//! that issue a single statement accept any `PgExecutor`, so they run
//! equally against `&PgPool` or inside a caller's transaction
//! (`&mut *tx`). Methods that need several statements take `&PgPool` and
//! manage their own transaction.

pub mod cart_repo;
pub mod course_repo;
pub mod order_repo;
pub mod user_repo;

pub use cart_repo::CartRepo;
pub use course_repo::CourseRepo;
pub use order_repo::OrderRepo;
pub use user_repo::UserRepo;
