//! Line requests: configuration, options, values, info, and edge events.

pub mod config;
pub mod event;
pub mod info;
pub mod options;
pub mod request;
pub mod values;

pub use config::{Bias, Direction, Drive, Edge, EventClock, LineConfig};
pub use event::{EdgeKind, EventHandler, LineEvent};
pub use info::{InfoChangeEvent, InfoChangeKind, LineInfo};
pub use options::{ChipOption, ConfigOption, ReqOption};
pub use request::Lines;
pub use values::Value;
