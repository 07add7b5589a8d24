pub mod errors;
pub mod search;
pub mod trial;

pub use errors::*;
pub use search::*;
pub use trial::*;
