#![doc = include_str!("../README.md")]

pub mod channel;
mod error;
mod pool;
mod registry;
mod worker;

pub use crate::channel::{Outlet, Receiver};
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::worker::*;
