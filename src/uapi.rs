//! Wire-compatible structures and ioctl entry points for the GPIO
//! character device uAPI, both revisions.
//!
//! Layouts mirror `linux/gpio.h` exactly; padding is written as zero and
//! ignored on read. Nothing here interprets the configuration - that is
//! the job of [`crate::line::config`].

#[allow(non_camel_case_types)]
mod common;

#[allow(non_camel_case_types)]
pub mod v1;

#[allow(non_camel_case_types)]
pub mod v2;

pub use common::*;
