//! Style factors computed from a trailing price window.
//!
//! Each factor lives in its own module and implements [`crate::Factor`].
//! The defaults are Market (beta), Size (log price), Value (inverse price)
//! and Momentum (window return).

pub mod market;
pub mod momentum;
pub mod size;
pub mod value;

pub use market::{Market, MarketConfig};
pub use momentum::{Momentum, MomentumConfig};
pub use size::Size;
pub use value::Value;
