//! Report module - terminal summaries, residual diagnostics and exports

pub mod export;
pub mod residuals;
pub mod summary;

pub use export::*;
pub use residuals::*;
pub use summary::*;
