#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod account;
pub mod block;
pub mod config;
pub mod crypto;
pub mod escrow;
pub mod events;
pub mod serializer;
pub mod transaction;
pub mod utils;
