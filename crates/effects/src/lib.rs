//! Nebula Effects
//!
//! Pixel effects run inside a native effect processor that owns its own
//! buffer arena. This crate provides:
//! - **Processor contract:** [`NativeEffectProcessor`], explicitly
//!   initialized and passed in by the caller
//! - **Buffer exchange:** checked allocate/write/read/free with guaranteed
//!   release on every exit path
//! - **Effect invoker:** dispatch from [`nebula_render_model::EffectOperation`]
//!   to processor calls, with passthrough/fade fallbacks for unknown kinds
//! - **CPU processor:** a software implementation of the full contract

pub mod cpu;
pub mod exchange;
pub mod invoker;
pub mod processor;

pub use cpu::CpuEffectProcessor;
pub use exchange::{BufferExchange, BufferHandle, ExchangeStats};
pub use invoker::EffectInvoker;
pub use processor::{BufferPtr, NativeEffectProcessor};
