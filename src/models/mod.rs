pub mod enums;
pub mod medicine;

pub use enums::*;
pub use medicine::*;
