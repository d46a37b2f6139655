pub mod account;
pub mod exposure;
pub mod option;

pub use account::*;
pub use exposure::*;
pub use option::*;
