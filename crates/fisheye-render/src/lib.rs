// fisheye-render — software fisheye compositor
//
// Renders up to 6 perspective views per frame and melds them together to
// allow fields of view beyond 180 degrees. A "globe" script arranges the
// camera views around the player; a "lens" script controls how the views
// are melded into the final image.

pub mod commands;
pub mod engine;
pub mod frame;
pub mod globe;
pub mod lens;
pub mod lensmap;
pub mod palette;
pub mod script;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::FisheyeEngine;
pub use frame::{PlateView, Refresh, VRect, VidSurface};
