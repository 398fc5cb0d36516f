#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::large_enum_variant)]

pub mod config;
pub mod core;
pub mod snapshot;
pub mod sync;
