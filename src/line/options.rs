//! The three option families and their nesting.
//!
//! Options compose in the order given: [`ChipOption`]s set chip-wide
//! defaults, [`ReqOption`]s apply at request time, and [`ConfigOption`]s
//! are also valid at reconfigure time and inside
//! [`ConfigOption::Lines`] subset overrides.

use std::fmt;
use std::time::Duration;

use crate::chip::AbiVersion;
use crate::line::event::EventHandler;
use crate::line::values::Value;

/// Configuration options, applicable at chip, request, and reconfigure
/// level.
///
/// Edge and debounce options imply input direction; drive options imply
/// output. `Defaulted` reverts the fields accumulated so far to the chip
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOption {
    /// Leave the direction as the kernel has it.
    AsIs,
    Input,
    /// Request as output with initial values, positional over the lines
    /// this option applies to. Shorter lists pad with inactive; longer
    /// lists fail validation.
    Output(Vec<Value>),
    ActiveLow,
    ActiveHigh,
    OpenDrain,
    OpenSource,
    PushPull,
    BiasDisabled,
    /// Leave the bias as the kernel has it.
    BiasAsIs,
    PullUp,
    PullDown,
    RisingEdge,
    FallingEdge,
    BothEdges,
    NoEdges,
    Debounce(Duration),
    MonotonicEventClock,
    RealtimeEventClock,
    /// Revert previously set fields to the chip defaults.
    Defaulted,
    /// Apply the inner options only to the listed offsets. An empty list
    /// targets every offset of the request.
    Lines(Vec<u32>, Vec<ConfigOption>),
}

/// Options applicable when requesting lines.
#[derive(Clone)]
pub enum ReqOption {
    Config(ConfigOption),
    /// Consumer label attached to the request, at most 31 bytes.
    Consumer(String),
    /// Edge event handler. `None` explicitly silences event delivery
    /// even when a chip default handler exists.
    EventHandler(Option<EventHandler>),
    /// Kernel event buffer size hint (uAPI v2 only; v1 kernels keep
    /// their fixed 16 event buffer).
    EventBufferSize(u32),
}

impl From<ConfigOption> for ReqOption {
    fn from(opt: ConfigOption) -> Self {
        ReqOption::Config(opt)
    }
}

impl fmt::Debug for ReqOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReqOption::Config(c) => f.debug_tuple("Config").field(c).finish(),
            ReqOption::Consumer(c) => f.debug_tuple("Consumer").field(c).finish(),
            ReqOption::EventHandler(h) => f
                .debug_tuple("EventHandler")
                .field(&h.as_ref().map(|_| "..."))
                .finish(),
            ReqOption::EventBufferSize(n) => f.debug_tuple("EventBufferSize").field(n).finish(),
        }
    }
}

/// Options applicable when opening a chip; they become the defaults for
/// every request made from it.
#[derive(Clone)]
pub enum ChipOption {
    Config(ConfigOption),
    Consumer(String),
    EventHandler(Option<EventHandler>),
    EventBufferSize(u32),
    /// Pin the uAPI version instead of probing the kernel.
    AbiVersion(AbiVersion),
}

impl From<ConfigOption> for ChipOption {
    fn from(opt: ConfigOption) -> Self {
        ChipOption::Config(opt)
    }
}

impl From<ReqOption> for ChipOption {
    fn from(opt: ReqOption) -> Self {
        match opt {
            ReqOption::Config(c) => ChipOption::Config(c),
            ReqOption::Consumer(c) => ChipOption::Consumer(c),
            ReqOption::EventHandler(h) => ChipOption::EventHandler(h),
            ReqOption::EventBufferSize(n) => ChipOption::EventBufferSize(n),
        }
    }
}

impl fmt::Debug for ChipOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipOption::Config(c) => f.debug_tuple("Config").field(c).finish(),
            ChipOption::Consumer(c) => f.debug_tuple("Consumer").field(c).finish(),
            ChipOption::EventHandler(h) => f
                .debug_tuple("EventHandler")
                .field(&h.as_ref().map(|_| "..."))
                .finish(),
            ChipOption::EventBufferSize(n) => f.debug_tuple("EventBufferSize").field(n).finish(),
            ChipOption::AbiVersion(v) => f.debug_tuple("AbiVersion").field(v).finish(),
        }
    }
}
