//! Grid geometry: coordinate axes, the native-grid window and output placement.

pub mod axis;
pub mod nearest;
pub mod window;

pub use axis::{AxisCoords, RegularGrid};
pub use nearest::NearestIndex;
pub use window::{map_grids, GridMapping, GridWindow};
