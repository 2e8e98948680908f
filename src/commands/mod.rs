pub mod settings;
pub mod trades;

pub use settings::*;
pub use trades::*;
