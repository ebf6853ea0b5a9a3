#![allow(clippy::len_zero, clippy::enum_variant_names)]

#[macro_use]
mod macros;
pub mod cli;
pub mod format;
pub mod logger;
pub mod utils;
pub mod video;
pub mod vulkan;
