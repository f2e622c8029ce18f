mod file_reader;
mod range_reader;

pub use file_reader::LocalFileReader;
pub use range_reader::{MemoryReader, RangeReader};
