pub mod layout;
pub mod reading;
pub mod types;

pub use layout::*;
pub use reading::*;
pub use types::*;
