mod notice;
mod payload;
mod response;

pub use notice::*;
pub use payload::*;
pub use response::*;
