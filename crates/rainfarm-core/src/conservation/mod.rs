//! Block aggregation and volume-conserving correction.

pub mod aggregate;
pub mod correct;

pub use aggregate::{aggregate, block_average};
pub use correct::{conserve, expand, GatherIndex};
