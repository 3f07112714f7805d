// fisheye-common — support code shared by the fisheye crates

pub mod cmd;
pub mod common;
pub mod completion;
pub mod mathlib;
pub mod pcx;
