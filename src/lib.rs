#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod admission_controller;
pub use admission_controller::*;

mod cleanup_loop;

mod error;
pub use error::*;

mod common;
pub use common::{AdmissionDecision, RequestLimit, WindowSize};

#[cfg(test)]
mod tests;
