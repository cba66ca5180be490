mod decode;
mod generate;
mod inspect;

pub use decode::*;
pub use generate::*;
pub use inspect::*;
