//! Batch processing operations
//!
//! This module provides the record store port and the generic processor that
//! turns pending integration records into per-partition hub batches.

pub mod ports;
mod processor;

pub use ports::{BatchDispatch, RecordStore};
pub use processor::{decode_json, BatchProcessor, PayloadDecoder, TickReport};
