pub mod analysis;
pub mod response;

pub use analysis::*;
pub use response::*;
