pub mod reader;
pub mod record;

pub use reader::read_reviews_file;
pub use record::{RawRecord, Review};
