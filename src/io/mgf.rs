//! Write [MGF](https://www.matrixscience.com/help/data_file_help.html#GEN) files.
mod writer;

pub use writer::MGFWriter;
