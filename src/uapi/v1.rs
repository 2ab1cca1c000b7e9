//! The legacy (v1) GPIO uAPI: handle and event requests.
//!
//! Maps to the `GPIOHANDLE_*`/`GPIOEVENT_*` structures in `linux/gpio.h`.
//! v1 has no per-line configuration, no debounce, no event clock
//! selection, and events carry no sequence numbers.

use bitflags::bitflags;
use nix::ioctl_readwrite;

use super::{GPIO_LINES_MAX, GPIO_MAX_NAME_SIZE};

bitflags! {
    /// `GPIOLINE_FLAG_*`: informational flags reported in line info.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct InfoFlags: u32 {
        const KERNEL = 1 << 0;
        const IS_OUT = 1 << 1;
        const ACTIVE_LOW = 1 << 2;
        const OPEN_DRAIN = 1 << 3;
        const OPEN_SOURCE = 1 << 4;
        const BIAS_PULL_UP = 1 << 5;
        const BIAS_PULL_DOWN = 1 << 6;
        const BIAS_DISABLE = 1 << 7;
    }
}

bitflags! {
    /// `GPIOHANDLE_REQUEST_*`: flags for handle and event requests.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct HandleFlags: u32 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
        const ACTIVE_LOW = 1 << 2;
        const OPEN_DRAIN = 1 << 3;
        const OPEN_SOURCE = 1 << 4;
        const BIAS_PULL_UP = 1 << 5;
        const BIAS_PULL_DOWN = 1 << 6;
        const BIAS_DISABLE = 1 << 7;
    }
}

bitflags! {
    /// `GPIOEVENT_REQUEST_*`: edge selection for event requests.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        const RISING_EDGE = 1 << 0;
        const FALLING_EDGE = 1 << 1;
        const BOTH_EDGES = Self::RISING_EDGE.bits() | Self::FALLING_EDGE.bits();
    }
}

/// `GPIOEVENT_EVENT_*`: identifier in a [`gpioevent_data`] record.
pub const GPIOEVENT_EVENT_RISING_EDGE: u32 = 0x01;
pub const GPIOEVENT_EVENT_FALLING_EDGE: u32 = 0x02;

/// `GPIOLINE_CHANGED_*`: kind in a [`gpioline_info_changed`] record.
pub const GPIOLINE_CHANGED_REQUESTED: u32 = 1;
pub const GPIOLINE_CHANGED_RELEASED: u32 = 2;
pub const GPIOLINE_CHANGED_CONFIG: u32 = 3;

// struct gpioline_info
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpioline_info {
    pub line_offset: u32,
    pub flags: InfoFlags,
    pub name: [u8; GPIO_MAX_NAME_SIZE],
    pub consumer: [u8; GPIO_MAX_NAME_SIZE],
}

impl gpioline_info {
    pub const fn zeroed() -> Self {
        Self {
            line_offset: 0,
            flags: InfoFlags::empty(),
            name: [0; GPIO_MAX_NAME_SIZE],
            consumer: [0; GPIO_MAX_NAME_SIZE],
        }
    }
}

// struct gpioline_info_changed
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpioline_info_changed {
    pub info: gpioline_info,
    pub timestamp_ns: u64,
    pub event_type: u32,
    pub padding: [u32; 5],
}

// struct gpiohandle_request
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpiohandle_request {
    pub lineoffsets: [u32; GPIO_LINES_MAX],
    pub flags: HandleFlags,
    pub default_values: [u8; GPIO_LINES_MAX],
    pub consumer_label: [u8; GPIO_MAX_NAME_SIZE],
    pub lines: u32,
    pub fd: libc::c_int,
}

impl gpiohandle_request {
    pub const fn zeroed() -> Self {
        Self {
            lineoffsets: [0; GPIO_LINES_MAX],
            flags: HandleFlags::empty(),
            default_values: [0; GPIO_LINES_MAX],
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            lines: 0,
            fd: 0,
        }
    }
}

// struct gpiohandle_config
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpiohandle_config {
    pub flags: HandleFlags,
    pub default_values: [u8; GPIO_LINES_MAX],
    pub padding: [u32; 4],
}

impl gpiohandle_config {
    pub const fn zeroed() -> Self {
        Self {
            flags: HandleFlags::empty(),
            default_values: [0; GPIO_LINES_MAX],
            padding: [0; 4],
        }
    }
}

// struct gpiohandle_data
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpiohandle_data {
    pub values: [u8; GPIO_LINES_MAX],
}

impl gpiohandle_data {
    pub const fn zeroed() -> Self {
        Self {
            values: [0; GPIO_LINES_MAX],
        }
    }
}

// struct gpioevent_request
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpioevent_request {
    pub lineoffset: u32,
    pub handleflags: HandleFlags,
    pub eventflags: EventFlags,
    pub consumer_label: [u8; GPIO_MAX_NAME_SIZE],
    pub fd: libc::c_int,
}

impl gpioevent_request {
    pub const fn zeroed() -> Self {
        Self {
            lineoffset: 0,
            handleflags: HandleFlags::empty(),
            eventflags: EventFlags::empty(),
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            fd: 0,
        }
    }
}

// struct gpioevent_data
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpioevent_data {
    pub timestamp_ns: u64,
    pub id: u32,
}

ioctl_readwrite!(gpio_get_lineinfo, 0xB4, 0x02, gpioline_info);
ioctl_readwrite!(gpio_get_linehandle, 0xB4, 0x03, gpiohandle_request);
ioctl_readwrite!(gpio_get_lineevent, 0xB4, 0x04, gpioevent_request);
ioctl_readwrite!(gpiohandle_get_line_values, 0xB4, 0x08, gpiohandle_data);
ioctl_readwrite!(gpiohandle_set_line_values, 0xB4, 0x09, gpiohandle_data);
ioctl_readwrite!(gpiohandle_set_config, 0xB4, 0x0A, gpiohandle_config);
ioctl_readwrite!(gpio_get_lineinfo_watch, 0xB4, 0x0B, gpioline_info);

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    // Sizes from linux/gpio.h; a mismatch corrupts the ioctl numbers too.
    #[test]
    fn wire_layout() {
        assert_eq!(size_of::<gpioline_info>(), 72);
        assert_eq!(size_of::<gpioline_info_changed>(), 104);
        assert_eq!(size_of::<gpiohandle_request>(), 364);
        assert_eq!(size_of::<gpiohandle_config>(), 84);
        assert_eq!(size_of::<gpiohandle_data>(), 64);
        assert_eq!(size_of::<gpioevent_request>(), 48);
        assert_eq!(size_of::<gpioevent_data>(), 16);
    }

    #[test]
    fn both_edges_is_union_of_edges() {
        assert_eq!(
            EventFlags::BOTH_EDGES,
            EventFlags::RISING_EDGE | EventFlags::FALLING_EDGE
        );
    }
}
