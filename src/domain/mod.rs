pub mod reminder;
pub mod session;
pub mod timestamp;
pub mod todo;
pub mod user;
