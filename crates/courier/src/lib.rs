#![doc = include_str!("../README.md")]

mod accumulator;
mod codec;
mod cycle;
mod error;
mod interface;
mod item;
mod memory;
mod message;
pub mod metrics;
mod partition;
mod pool;
mod scheduler;
mod shutdown;
#[cfg(test)]
mod testing;
mod transport;

pub use crate::accumulator::*;
pub use crate::codec::*;
pub use crate::cycle::*;
pub use crate::error::*;
pub use crate::interface::*;
pub use crate::item::*;
pub use crate::memory::*;
pub use crate::message::*;
pub use crate::partition::*;
pub use crate::pool::*;
pub use crate::scheduler::*;
pub use crate::shutdown::*;
pub use crate::transport::*;
