pub mod cart;
pub mod courses;
pub mod orders;
pub mod webhooks;
