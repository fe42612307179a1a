pub mod emails;
pub mod error;
pub mod folders;
pub mod router;
