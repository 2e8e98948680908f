pub mod import_file;
pub mod settings;
pub mod trade;

pub use import_file::*;
pub use settings::*;
pub use trade::*;
