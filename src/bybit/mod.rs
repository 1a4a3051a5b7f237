pub mod client;

pub use client::{BybitClient, InstrumentInfo, OrderAck};
