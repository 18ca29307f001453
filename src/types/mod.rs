pub mod instrument;
pub mod summary;
pub mod trade;

pub use instrument::*;
pub use summary::*;
pub use trade::*;
