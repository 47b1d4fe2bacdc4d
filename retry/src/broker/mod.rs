//! Broker implementations
//!
//! - [`MemoryBroker`]: in-process, for tests and demos
//! - `AmqpBroker`: AMQP 0-9-1 over lapin (feature `amqp`)

#[cfg(feature = "amqp")]
pub mod amqp;
mod memory;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use memory::MemoryBroker;
