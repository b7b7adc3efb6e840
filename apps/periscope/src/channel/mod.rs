pub mod control;
pub mod pixels;

pub use control::{ControlChannel, ControlEvent};
pub use pixels::{Phase, PixelStreamChannel};
