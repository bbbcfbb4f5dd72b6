pub mod assessment;
pub mod case;
pub mod enums;
pub mod response;

pub use assessment::*;
pub use case::*;
pub use response::*;
