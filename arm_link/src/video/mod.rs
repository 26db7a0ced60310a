mod capture;
mod frame;
mod pipeline;

pub use capture::*;
pub use frame::*;
pub use pipeline::*;
