//! Session file storage

mod writer;

pub use writer::{FileWriter, WriterConfig, DEFAULT_DATA_DIR, DEFAULT_FILE_PREFIX};
