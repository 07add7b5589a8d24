pub mod dataset;
pub mod loaders;
pub mod synthetic;

pub use dataset::*;
pub use loaders::*;
pub use synthetic::*;
