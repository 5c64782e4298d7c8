pub mod driver;

pub use driver::{check_file, check_module, load_module, CheckOptions, Report};
