//! The `linedev` crate provides safe access to the [GPIO character
//! device](https://www.kernel.org/doc/Documentation/ABI/testing/gpio-cdev),
//! the kernel interface that replaced the deprecated sysfs GPIO files.
//!
//! Both uAPI revisions are handled: the current v2 interface and the
//! legacy v1 one, negotiated per chip at open time. Lines are requested
//! in sets with a layered configuration - chip defaults, request
//! options, and per-subset overrides - and can deliver debounced,
//! timestamped edge events to a handler on a background reader.
//!
//! # Examples
//!
//! Drive two lines and read one back:
//!
//! ```no_run
//! use linedev::{Chip, ConfigOption, Value};
//!
//! # fn main() -> linedev::Result<()> {
//! let chip = Chip::open("/dev/gpiochip0", [])?;
//! let lines = chip.request_lines(
//!     &[17, 27],
//!     [ConfigOption::Output(vec![Value::Active, Value::Inactive]).into()],
//! )?;
//! lines.set_values(&[Value::Inactive, Value::Active])?;
//!
//! let button = chip.request_line(4, [ConfigOption::Input.into()])?;
//! println!("button: {:?}", button.value()?);
//! # Ok(()) }
//! ```
//!
//! Watch for edges with a handler:
//!
//! ```no_run
//! use std::sync::Arc;
//! use linedev::{Chip, ConfigOption, ReqOption};
//!
//! # fn main() -> linedev::Result<()> {
//! let chip = Chip::open("gpiochip0", [])?;
//! let lines = chip.request_line(
//!     4,
//!     [
//!         ConfigOption::BothEdges.into(),
//!         ReqOption::EventHandler(Some(Arc::new(|event| {
//!             println!("{event:?}");
//!         }))),
//!     ],
//! )?;
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! lines.close()?;
//! # Ok(()) }
//! ```

pub mod chip;
mod errors;
pub mod fixed_str;
pub mod line;
pub mod uapi;

pub use chip::{chips, is_chip, AbiVersion, Chip, InfoChangeHandler};
pub use errors::{Error, Result};
pub use line::{
    Bias, ChipOption, ConfigOption, Direction, Drive, Edge, EdgeKind, EventClock, EventHandler,
    InfoChangeEvent, InfoChangeKind, LineConfig, LineEvent, LineInfo, Lines, ReqOption, Value,
};
