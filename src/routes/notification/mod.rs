mod handler;
mod model;

pub use handler::{check_overdue, create, delete, list, send, update_preferences};
