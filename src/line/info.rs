use std::time::Duration;

use crate::chip::kernel_str;
use crate::line::config::{Bias, Direction, Drive, Edge, EventClock, LineConfig};
use crate::uapi;

/// Immutable snapshot of one line, as reported by the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct LineInfo {
    pub offset: u32,
    /// Line name assigned by the chip, empty if unnamed.
    pub name: String,
    /// Consumer label of the current user, empty if unused.
    pub consumer: String,
    pub used: bool,
    pub config: LineConfig,
}

impl LineInfo {
    pub(crate) fn from_v1(info: &uapi::v1::gpioline_info) -> Self {
        use uapi::v1::InfoFlags;

        let flags = info.flags;
        let config = LineConfig {
            direction: Some(if flags.contains(InfoFlags::IS_OUT) {
                Direction::Output
            } else {
                Direction::Input
            }),
            active_low: Some(flags.contains(InfoFlags::ACTIVE_LOW)),
            drive: Some(if flags.contains(InfoFlags::OPEN_DRAIN) {
                Drive::OpenDrain
            } else if flags.contains(InfoFlags::OPEN_SOURCE) {
                Drive::OpenSource
            } else {
                Drive::PushPull
            }),
            bias: decode_bias(
                flags.contains(InfoFlags::BIAS_PULL_UP),
                flags.contains(InfoFlags::BIAS_PULL_DOWN),
                flags.contains(InfoFlags::BIAS_DISABLE),
            ),
            edge: None,
            debounce: None,
            event_clock: Some(EventClock::Monotonic),
            value: None,
        };
        Self {
            offset: info.line_offset,
            name: kernel_str(&info.name),
            consumer: kernel_str(&info.consumer),
            used: flags.contains(InfoFlags::KERNEL),
            config,
        }
    }

    pub(crate) fn from_v2(info: &uapi::v2::gpio_v2_line_info) -> Self {
        use uapi::v2::{LineAttr, LineFlags};

        let mut flags = info.flags;
        let mut debounce = None;
        for attr in info.attributes() {
            match attr {
                // a flags attribute replaces the line's flags outright
                LineAttr::Flags(f) => flags = f,
                LineAttr::DebouncePeriodUs(us) => {
                    debounce = Some(Duration::from_micros(us as u64))
                }
                LineAttr::OutputValues(_) => {}
            }
        }

        let config = LineConfig {
            direction: Some(if flags.contains(LineFlags::OUTPUT) {
                Direction::Output
            } else {
                Direction::Input
            }),
            active_low: Some(flags.contains(LineFlags::ACTIVE_LOW)),
            drive: Some(if flags.contains(LineFlags::OPEN_DRAIN) {
                Drive::OpenDrain
            } else if flags.contains(LineFlags::OPEN_SOURCE) {
                Drive::OpenSource
            } else {
                Drive::PushPull
            }),
            bias: decode_bias(
                flags.contains(LineFlags::BIAS_PULL_UP),
                flags.contains(LineFlags::BIAS_PULL_DOWN),
                flags.contains(LineFlags::BIAS_DISABLED),
            ),
            edge: match (
                flags.contains(LineFlags::EDGE_RISING),
                flags.contains(LineFlags::EDGE_FALLING),
            ) {
                (true, true) => Some(Edge::Both),
                (true, false) => Some(Edge::Rising),
                (false, true) => Some(Edge::Falling),
                (false, false) => None,
            },
            debounce,
            event_clock: Some(if flags.contains(LineFlags::EVENT_CLOCK_REALTIME) {
                EventClock::Realtime
            } else {
                EventClock::Monotonic
            }),
            value: None,
        };
        Self {
            offset: info.offset,
            name: kernel_str(&info.name),
            consumer: kernel_str(&info.consumer),
            used: flags.contains(LineFlags::USED),
            config,
        }
    }
}

/// Why a line's info changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoChangeKind {
    Requested,
    Released,
    Reconfigured,
}

impl InfoChangeKind {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            uapi::v2::LINE_CHANGED_REQUESTED => Some(Self::Requested),
            uapi::v2::LINE_CHANGED_RELEASED => Some(Self::Released),
            uapi::v2::LINE_CHANGED_CONFIG => Some(Self::Reconfigured),
            _ => None,
        }
    }
}

/// A change in status of a watched line.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoChangeEvent {
    pub kind: InfoChangeKind,
    pub info: LineInfo,
    /// Time of the change, as a duration since the monotonic clock epoch.
    pub timestamp: Duration,
}

impl InfoChangeEvent {
    pub(crate) fn from_v1(raw: &uapi::v1::gpioline_info_changed) -> Option<Self> {
        Some(Self {
            kind: InfoChangeKind::from_raw(raw.event_type)?,
            info: LineInfo::from_v1(&raw.info),
            timestamp: Duration::from_nanos(raw.timestamp_ns),
        })
    }

    pub(crate) fn from_v2(raw: &uapi::v2::gpio_v2_line_info_changed) -> Option<Self> {
        Some(Self {
            kind: InfoChangeKind::from_raw(raw.event_type)?,
            info: LineInfo::from_v2(&raw.info),
            timestamp: Duration::from_nanos(raw.timestamp_ns),
        })
    }
}

fn decode_bias(pull_up: bool, pull_down: bool, disabled: bool) -> Option<Bias> {
    if pull_up {
        Some(Bias::PullUp)
    } else if pull_down {
        Some(Bias::PullDown)
    } else if disabled {
        Some(Bias::Disabled)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uapi::v2::{gpio_v2_line_attribute, gpio_v2_line_info, LineFlags};

    #[test]
    fn v1_flag_decode() {
        use crate::uapi::v1::{gpioline_info, InfoFlags};

        let mut raw = gpioline_info::zeroed();
        raw.line_offset = 7;
        raw.flags = InfoFlags::KERNEL | InfoFlags::IS_OUT | InfoFlags::OPEN_DRAIN;
        raw.name[..3].copy_from_slice(b"LED");
        raw.consumer[..5].copy_from_slice(b"blink");

        let info = LineInfo::from_v1(&raw);
        assert_eq!(info.offset, 7);
        assert_eq!(info.name, "LED");
        assert_eq!(info.consumer, "blink");
        assert!(info.used);
        assert_eq!(info.config.direction, Some(Direction::Output));
        assert_eq!(info.config.drive, Some(Drive::OpenDrain));
        assert_eq!(info.config.active_low, Some(false));
        assert_eq!(info.config.bias, None);
        assert_eq!(info.config.edge, None);
        assert_eq!(info.config.debounce, None);
    }

    #[test]
    fn v2_decode_with_attributes() {
        let mut raw = gpio_v2_line_info::zeroed();
        raw.offset = 3;
        raw.flags = LineFlags::USED
            | LineFlags::INPUT
            | LineFlags::EDGE_RISING
            | LineFlags::EDGE_FALLING
            | LineFlags::BIAS_PULL_UP
            | LineFlags::EVENT_CLOCK_REALTIME;
        raw.attrs[0] = gpio_v2_line_attribute::debounce(5000);
        raw.num_attrs = 1;

        let info = LineInfo::from_v2(&raw);
        assert!(info.used);
        assert_eq!(info.config.direction, Some(Direction::Input));
        assert_eq!(info.config.edge, Some(Edge::Both));
        assert_eq!(info.config.bias, Some(Bias::PullUp));
        assert_eq!(info.config.event_clock, Some(EventClock::Realtime));
        assert_eq!(info.config.debounce, Some(Duration::from_micros(5000)));
    }

    #[test]
    fn v2_flags_attribute_replaces_line_flags() {
        let mut raw = gpio_v2_line_info::zeroed();
        raw.flags = LineFlags::USED | LineFlags::INPUT;
        raw.attrs[0] =
            gpio_v2_line_attribute::flags(LineFlags::OUTPUT | LineFlags::ACTIVE_LOW);
        raw.num_attrs = 1;

        let info = LineInfo::from_v2(&raw);
        assert_eq!(info.config.direction, Some(Direction::Output));
        assert_eq!(info.config.active_low, Some(true));
        // replacement, not a union: USED came only from the base flags
        assert!(!info.used);
    }

    #[test]
    fn change_kind_decode() {
        assert_eq!(
            InfoChangeKind::from_raw(1),
            Some(InfoChangeKind::Requested)
        );
        assert_eq!(InfoChangeKind::from_raw(3), Some(InfoChangeKind::Reconfigured));
        assert_eq!(InfoChangeKind::from_raw(9), None);
    }
}
