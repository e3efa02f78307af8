pub mod payloads;
pub mod percent;

pub use payloads::*;
pub use percent::*;
