//! Utility helpers: date parsing, spinners and terminal styling

pub mod dates;
pub mod progress;
pub mod styling;

pub use progress::*;
pub use styling::*;
