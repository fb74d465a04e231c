pub mod model;

// Re-export commonly used loaders for both binaries
pub use model::{load_hex, load_labels, read_text, write_text};
