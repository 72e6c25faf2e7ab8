mod handler;
mod model;

pub use handler::{delete_pdf, get_pdf, list_my_pdfs, serve_file, update_title, upload};
