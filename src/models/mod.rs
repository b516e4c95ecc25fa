mod api;
mod channel;
mod check;
mod report;

pub use api::*;
pub use channel::*;
pub use check::*;
pub use report::*;
