//! The current (v2) GPIO uAPI: line requests with per-line attributes.
//!
//! Maps to the `GPIO_V2_*` structures in `linux/gpio.h`. All reserved
//! padding is zeroed on write; kernels reject non-zero padding with
//! EINVAL.

use bitflags::bitflags;
use nix::ioctl_readwrite;

use super::{GPIO_LINES_MAX, GPIO_LINE_NUM_ATTRS_MAX, GPIO_MAX_NAME_SIZE};

bitflags! {
    /// `GPIO_V2_LINE_FLAG_*`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct LineFlags: u64 {
        const USED = 1 << 0;
        const ACTIVE_LOW = 1 << 1;
        const INPUT = 1 << 2;
        const OUTPUT = 1 << 3;
        const EDGE_RISING = 1 << 4;
        const EDGE_FALLING = 1 << 5;
        const OPEN_DRAIN = 1 << 6;
        const OPEN_SOURCE = 1 << 7;
        const BIAS_PULL_UP = 1 << 8;
        const BIAS_PULL_DOWN = 1 << 9;
        const BIAS_DISABLED = 1 << 10;
        const EVENT_CLOCK_REALTIME = 1 << 11;
        const EVENT_CLOCK_HTE = 1 << 12;
    }
}

/// `GPIO_V2_LINE_ATTR_ID_*`.
pub const LINE_ATTR_ID_FLAGS: u32 = 1;
pub const LINE_ATTR_ID_OUTPUT_VALUES: u32 = 2;
pub const LINE_ATTR_ID_DEBOUNCE: u32 = 3;

/// `GPIO_V2_LINE_EVENT_*`.
pub const LINE_EVENT_RISING_EDGE: u32 = 1;
pub const LINE_EVENT_FALLING_EDGE: u32 = 2;

/// `GPIO_V2_LINE_CHANGED_*`.
pub const LINE_CHANGED_REQUESTED: u32 = 1;
pub const LINE_CHANGED_RELEASED: u32 = 2;
pub const LINE_CHANGED_CONFIG: u32 = 3;

// union inside struct gpio_v2_line_attribute
#[repr(C)]
#[derive(Clone, Copy)]
pub union line_attribute_value {
    pub flags: u64,
    pub values: u64,
    pub debounce_period_us: u32,
}

// struct gpio_v2_line_attribute
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpio_v2_line_attribute {
    pub id: u32,
    pub padding: u32,
    pub value: line_attribute_value,
}

/// A decoded v2 attribute. Unknown IDs decode to `None` and are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAttr {
    Flags(LineFlags),
    OutputValues(u64),
    DebouncePeriodUs(u32),
}

impl gpio_v2_line_attribute {
    pub const fn zeroed() -> Self {
        Self {
            id: 0,
            padding: 0,
            value: line_attribute_value { values: 0 },
        }
    }

    pub const fn flags(flags: LineFlags) -> Self {
        Self {
            id: LINE_ATTR_ID_FLAGS,
            padding: 0,
            value: line_attribute_value { flags: flags.bits() },
        }
    }

    pub const fn output_values(bits: u64) -> Self {
        Self {
            id: LINE_ATTR_ID_OUTPUT_VALUES,
            padding: 0,
            value: line_attribute_value { values: bits },
        }
    }

    pub const fn debounce(period_us: u32) -> Self {
        Self {
            id: LINE_ATTR_ID_DEBOUNCE,
            padding: 0,
            value: line_attribute_value {
                debounce_period_us: period_us,
            },
        }
    }

    pub fn decode(&self) -> Option<LineAttr> {
        // The union fields are all plain integers, so reading any of them
        // is defined once the id selects the variant.
        unsafe {
            match self.id {
                LINE_ATTR_ID_FLAGS => Some(LineAttr::Flags(LineFlags::from_bits_retain(
                    self.value.flags,
                ))),
                LINE_ATTR_ID_OUTPUT_VALUES => Some(LineAttr::OutputValues(self.value.values)),
                LINE_ATTR_ID_DEBOUNCE => {
                    Some(LineAttr::DebouncePeriodUs(self.value.debounce_period_us))
                }
                _ => None,
            }
        }
    }
}

// struct gpio_v2_line_config_attribute
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpio_v2_line_config_attribute {
    pub attr: gpio_v2_line_attribute,
    pub mask: u64,
}

impl gpio_v2_line_config_attribute {
    pub const fn zeroed() -> Self {
        Self {
            attr: gpio_v2_line_attribute::zeroed(),
            mask: 0,
        }
    }
}

// struct gpio_v2_line_config
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpio_v2_line_config {
    pub flags: LineFlags,
    pub num_attrs: u32,
    pub padding: [u32; 5],
    pub attrs: [gpio_v2_line_config_attribute; GPIO_LINE_NUM_ATTRS_MAX],
}

impl gpio_v2_line_config {
    pub const fn zeroed() -> Self {
        Self {
            flags: LineFlags::empty(),
            num_attrs: 0,
            padding: [0; 5],
            attrs: [gpio_v2_line_config_attribute::zeroed(); GPIO_LINE_NUM_ATTRS_MAX],
        }
    }
}

// struct gpio_v2_line_request
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpio_v2_line_request {
    pub offsets: [u32; GPIO_LINES_MAX],
    pub consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub config: gpio_v2_line_config,
    pub num_lines: u32,
    pub event_buffer_size: u32,
    pub padding: [u32; 5],
    pub fd: libc::c_int,
}

impl gpio_v2_line_request {
    pub const fn zeroed() -> Self {
        Self {
            offsets: [0; GPIO_LINES_MAX],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            config: gpio_v2_line_config::zeroed(),
            num_lines: 0,
            event_buffer_size: 0,
            padding: [0; 5],
            fd: 0,
        }
    }
}

// struct gpio_v2_line_values
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct gpio_v2_line_values {
    pub bits: u64,
    pub mask: u64,
}

// struct gpio_v2_line_info
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpio_v2_line_info {
    pub name: [u8; GPIO_MAX_NAME_SIZE],
    pub consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub offset: u32,
    pub num_attrs: u32,
    pub flags: LineFlags,
    pub attrs: [gpio_v2_line_attribute; GPIO_LINE_NUM_ATTRS_MAX],
    pub padding: [u32; 4],
}

impl gpio_v2_line_info {
    pub const fn zeroed() -> Self {
        Self {
            name: [0; GPIO_MAX_NAME_SIZE],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            offset: 0,
            num_attrs: 0,
            flags: LineFlags::empty(),
            attrs: [gpio_v2_line_attribute::zeroed(); GPIO_LINE_NUM_ATTRS_MAX],
            padding: [0; 4],
        }
    }

    /// Decoded attributes, unknown IDs skipped.
    pub fn attributes(&self) -> impl Iterator<Item = LineAttr> + '_ {
        self.attrs
            .iter()
            .take((self.num_attrs as usize).min(GPIO_LINE_NUM_ATTRS_MAX))
            .filter_map(|a| a.decode())
    }
}

// struct gpio_v2_line_info_changed
#[repr(C)]
#[derive(Clone, Copy)]
pub struct gpio_v2_line_info_changed {
    pub info: gpio_v2_line_info,
    pub timestamp_ns: u64,
    pub event_type: u32,
    pub padding: [u32; 5],
}

// struct gpio_v2_line_event
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct gpio_v2_line_event {
    pub timestamp_ns: u64,
    pub id: u32,
    pub offset: u32,
    pub seqno: u32,
    pub line_seqno: u32,
    pub padding: [u32; 6],
}

ioctl_readwrite!(gpio_v2_get_lineinfo, 0xB4, 0x05, gpio_v2_line_info);
ioctl_readwrite!(gpio_v2_get_lineinfo_watch, 0xB4, 0x06, gpio_v2_line_info);
ioctl_readwrite!(gpio_v2_get_line, 0xB4, 0x07, gpio_v2_line_request);
ioctl_readwrite!(gpio_v2_line_set_config, 0xB4, 0x0D, gpio_v2_line_config);
ioctl_readwrite!(gpio_v2_line_get_values, 0xB4, 0x0E, gpio_v2_line_values);
ioctl_readwrite!(gpio_v2_line_set_values, 0xB4, 0x0F, gpio_v2_line_values);

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;

    // Sizes from linux/gpio.h; a mismatch corrupts the ioctl numbers too.
    #[test]
    fn wire_layout() {
        assert_eq!(size_of::<gpio_v2_line_attribute>(), 16);
        assert_eq!(size_of::<gpio_v2_line_config_attribute>(), 24);
        assert_eq!(size_of::<gpio_v2_line_config>(), 272);
        assert_eq!(size_of::<gpio_v2_line_request>(), 592);
        assert_eq!(size_of::<gpio_v2_line_values>(), 16);
        assert_eq!(size_of::<gpio_v2_line_info>(), 256);
        assert_eq!(size_of::<gpio_v2_line_info_changed>(), 288);
        assert_eq!(size_of::<gpio_v2_line_event>(), 48);
    }

    #[test]
    fn attribute_round_trip() {
        let attr = gpio_v2_line_attribute::flags(LineFlags::INPUT | LineFlags::EDGE_RISING);
        assert_eq!(
            attr.decode(),
            Some(LineAttr::Flags(LineFlags::INPUT | LineFlags::EDGE_RISING))
        );

        let attr = gpio_v2_line_attribute::output_values(0b101);
        assert_eq!(attr.decode(), Some(LineAttr::OutputValues(0b101)));

        let attr = gpio_v2_line_attribute::debounce(1234);
        assert_eq!(attr.decode(), Some(LineAttr::DebouncePeriodUs(1234)));
    }

    #[test]
    fn unknown_attribute_is_skipped() {
        let mut attr = gpio_v2_line_attribute::zeroed();
        attr.id = 42;
        assert_eq!(attr.decode(), None);

        let mut info = gpio_v2_line_info::zeroed();
        info.attrs[0] = gpio_v2_line_attribute::debounce(10);
        info.attrs[1] = attr;
        info.attrs[2] = gpio_v2_line_attribute::output_values(1);
        info.num_attrs = 3;
        let decoded: Vec<_> = info.attributes().collect();
        assert_eq!(
            decoded,
            vec![LineAttr::DebouncePeriodUs(10), LineAttr::OutputValues(1)]
        );
    }

    #[test]
    fn zeroed_request_has_zero_padding() {
        let req = gpio_v2_line_request::zeroed();
        assert_eq!(req.padding, [0; 5]);
        assert_eq!(req.config.padding, [0; 5]);
        assert!(req.config.attrs.iter().all(|a| a.mask == 0));
    }
}
