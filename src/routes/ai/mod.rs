mod handler;
mod model;

pub use handler::{delete_content, generate, get_content, list_for_pdf, regenerate};
