//! The multi-line request handle.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Mutex;

use tracing::debug;

use crate::chip::{AbiVersion, Chip};
use crate::errors::{Error, Result};
use crate::fixed_str::FixedStr;
use crate::line::config::ConfigBank;
use crate::line::event::{EventHandler, EventReader};
use crate::line::options::{ConfigOption, ReqOption};
use crate::line::values::Value;
use crate::uapi::{self, LineBits, GPIO_LINES_MAX, GPIO_MAX_NAME_SIZE};

/// A requested set of lines.
///
/// Holds the kernel descriptor(s) and, when edge detection and a handler
/// are configured, the background event reader. Lifetime is independent
/// of the [`Chip`] it was requested from.
///
/// All kernel calls on one request serialize through an internal mutex,
/// so `set_values` and `reconfigure` never race.
pub struct Lines {
    abi: AbiVersion,
    consumer: String,
    state: Mutex<State>,
}

struct State {
    bank: ConfigBank,
    fds: Option<LineFds>,
    reader: Option<EventReader>,
}

enum LineFds {
    /// One descriptor covering the whole set (v2 always; v1 without
    /// edges).
    Handle(OwnedFd),
    /// v1 edge requests need one event descriptor per line, in request
    /// order.
    PerLineEvents(Vec<(OwnedFd, u32)>),
}

impl Lines {
    pub(crate) fn request(
        chip: &Chip,
        offsets: &[u32],
        options: impl IntoIterator<Item = ReqOption>,
    ) -> Result<Self> {
        validate_offsets(offsets, chip.num_lines(), chip.name())?;

        let defaults = chip.defaults();
        let mut bank = ConfigBank::new(offsets, &defaults.options)?;
        let mut consumer: Option<String> = None;
        let mut handler: Option<Option<EventHandler>> = None;
        let mut event_buffer_size: Option<u32> = None;
        for opt in options {
            match opt {
                ReqOption::Config(c) => bank.apply(&c)?,
                ReqOption::Consumer(c) => consumer = Some(c),
                ReqOption::EventHandler(h) => handler = Some(h),
                ReqOption::EventBufferSize(n) => event_buffer_size = Some(n),
            }
        }
        let consumer = consumer
            .or_else(|| defaults.consumer.clone())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let label = FixedStr::<GPIO_MAX_NAME_SIZE>::new(&consumer)?;
        let handler = handler.unwrap_or_else(|| defaults.handler.clone());
        let event_buffer_size = event_buffer_size.or(defaults.event_buffer_size).unwrap_or(0);

        let abi = chip.abi_version();
        bank.validate(abi)?;

        let fds = match abi {
            AbiVersion::V2 => {
                let mut req = uapi::v2::gpio_v2_line_request::zeroed();
                req.num_lines = offsets.len() as u32;
                req.offsets[..offsets.len()].copy_from_slice(offsets);
                req.consumer = label.into_byte_array();
                req.config = bank.to_v2()?;
                req.event_buffer_size = event_buffer_size;
                unsafe { uapi::v2::gpio_v2_get_line(chip.as_raw_fd(), &mut req) }?;
                LineFds::Handle(unsafe { OwnedFd::from_raw_fd(req.fd) })
            }
            AbiVersion::V1 if bank.wants_edges() => {
                let mut fds = Vec::with_capacity(offsets.len());
                for offset in offsets {
                    let mut req = uapi::v1::gpioevent_request::zeroed();
                    req.lineoffset = *offset;
                    req.handleflags = bank.to_v1().0;
                    req.eventflags = bank.v1_event_flags();
                    req.consumer_label = label.into_byte_array();
                    unsafe { uapi::v1::gpio_get_lineevent(chip.as_raw_fd(), &mut req) }?;
                    fds.push((unsafe { OwnedFd::from_raw_fd(req.fd) }, *offset));
                }
                LineFds::PerLineEvents(fds)
            }
            AbiVersion::V1 => {
                let mut req = uapi::v1::gpiohandle_request::zeroed();
                let (flags, default_values) = bank.to_v1();
                req.lines = offsets.len() as u32;
                req.lineoffsets[..offsets.len()].copy_from_slice(offsets);
                req.flags = flags;
                req.default_values = default_values;
                req.consumer_label = label.into_byte_array();
                unsafe { uapi::v1::gpio_get_linehandle(chip.as_raw_fd(), &mut req) }?;
                LineFds::Handle(unsafe { OwnedFd::from_raw_fd(req.fd) })
            }
        };

        let reader = match (&handler, bank.wants_edges()) {
            (Some(handler), true) => {
                let sources = match &fds {
                    LineFds::Handle(fd) => vec![(fd.try_clone().map_err(Error::Io)?, 0)],
                    LineFds::PerLineEvents(fds) => {
                        let mut sources = Vec::with_capacity(fds.len());
                        for (fd, offset) in fds {
                            sources.push((fd.try_clone().map_err(Error::Io)?, *offset));
                        }
                        sources
                    }
                };
                Some(EventReader::spawn(sources, abi, handler.clone())?)
            }
            _ => None,
        };

        debug!(
            chip = chip.name(),
            ?offsets,
            consumer = %consumer,
            ?abi,
            "requested lines"
        );

        Ok(Self {
            abi,
            consumer,
            state: Mutex::new(State {
                bank,
                fds: Some(fds),
                reader,
            }),
        })
    }

    pub fn num_lines(&self) -> usize {
        self.lock().bank.offsets().len()
    }

    pub fn offsets(&self) -> Vec<u32> {
        self.lock().bank.offsets().to_vec()
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    pub fn abi_version(&self) -> AbiVersion {
        self.abi
    }

    /// Reads the logical values of all requested lines, in request
    /// order. `out` must have exactly one slot per line.
    pub fn values(&self, out: &mut [Value]) -> Result<()> {
        let state = self.lock();
        let fds = state.fds.as_ref().ok_or(Error::Closed)?;
        let n = state.bank.offsets().len();
        if out.len() != n {
            return Err(Error::invalid_config(format!(
                "{} value slots for {n} requested lines",
                out.len()
            )));
        }
        match fds {
            LineFds::Handle(fd) if self.abi == AbiVersion::V2 => {
                let mut data = uapi::v2::gpio_v2_line_values {
                    bits: 0,
                    mask: LineBits::mask(n).0,
                };
                unsafe { uapi::v2::gpio_v2_line_get_values(fd.as_raw_fd(), &mut data) }?;
                let bits = LineBits(data.bits);
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = Value::from_bit(bits.get(i));
                }
            }
            LineFds::Handle(fd) => {
                let mut data = uapi::v1::gpiohandle_data::zeroed();
                unsafe { uapi::v1::gpiohandle_get_line_values(fd.as_raw_fd(), &mut data) }?;
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = Value::from(data.values[i]);
                }
            }
            LineFds::PerLineEvents(fds) => {
                for ((fd, _), slot) in fds.iter().zip(out.iter_mut()) {
                    let mut data = uapi::v1::gpiohandle_data::zeroed();
                    unsafe { uapi::v1::gpiohandle_get_line_values(fd.as_raw_fd(), &mut data) }?;
                    *slot = Value::from(data.values[0]);
                }
            }
        }
        Ok(())
    }

    /// The logical value of the first requested line.
    pub fn value(&self) -> Result<Value> {
        let mut values = vec![Value::Inactive; self.num_lines()];
        self.values(&mut values)?;
        Ok(values[0])
    }

    /// Writes logical values, in request order. A list shorter than the
    /// request applies to a prefix of the lines; a longer one is
    /// rejected.
    pub fn set_values(&self, values: &[Value]) -> Result<()> {
        let state = self.lock();
        let fds = state.fds.as_ref().ok_or(Error::Closed)?;
        let n = state.bank.offsets().len();
        if values.len() > n {
            return Err(Error::invalid_config(format!(
                "{} values for {n} requested lines",
                values.len()
            )));
        }
        if values.is_empty() {
            return Ok(());
        }
        match fds {
            LineFds::Handle(fd) if self.abi == AbiVersion::V2 => {
                let mut bits = LineBits::empty();
                for (i, value) in values.iter().enumerate() {
                    bits.set(i, value.is_active());
                }
                let mut data = uapi::v2::gpio_v2_line_values {
                    bits: bits.0,
                    mask: LineBits::mask(values.len()).0,
                };
                unsafe { uapi::v2::gpio_v2_line_set_values(fd.as_raw_fd(), &mut data) }?;
            }
            LineFds::Handle(fd) => {
                let mut data = uapi::v1::gpiohandle_data::zeroed();
                if values.len() < n {
                    // v1 writes all lines at once, so fill the suffix
                    // with the current state
                    unsafe { uapi::v1::gpiohandle_get_line_values(fd.as_raw_fd(), &mut data) }?;
                }
                for (i, value) in values.iter().enumerate() {
                    data.values[i] = value.as_u8();
                }
                unsafe { uapi::v1::gpiohandle_set_line_values(fd.as_raw_fd(), &mut data) }?;
            }
            // edge-detecting v1 lines are inputs with no value-setting
            // ioctl, so this is rejected without a kernel call
            LineFds::PerLineEvents(_) => {
                return Err(Error::invalid_config(
                    "cannot set values on edge-detecting input lines",
                ))
            }
        }
        Ok(())
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        self.set_values(&[value])
    }

    /// Recomposes the configuration in place and pushes it to the
    /// kernel. The set of offsets never changes. Requires uAPI v2.
    pub fn reconfigure(&self, options: impl IntoIterator<Item = ConfigOption>) -> Result<()> {
        if self.abi == AbiVersion::V1 {
            return Err(Error::abi("reconfigure", self.abi));
        }
        let mut state = self.lock();
        let fd = match state.fds.as_ref().ok_or(Error::Closed)? {
            LineFds::Handle(fd) => fd.as_raw_fd(),
            LineFds::PerLineEvents(_) => unreachable!("per-line descriptors are v1 only"),
        };
        let mut bank = state.bank.clone();
        for opt in options {
            bank.apply(&opt)?;
        }
        bank.validate(self.abi)?;
        let mut config = bank.to_v2()?;
        unsafe { uapi::v2::gpio_v2_line_set_config(fd, &mut config) }?;
        state.bank = bank;
        debug!(consumer = %self.consumer, "reconfigured lines");
        Ok(())
    }

    /// Stops the event reader, waits for it to drain, and releases the
    /// kernel descriptor(s). A second call returns [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let (fds, reader) = {
            let mut state = self.lock();
            if state.fds.is_none() {
                return Err(Error::Closed);
            }
            (state.fds.take(), state.reader.take())
        };
        // join the reader before the descriptors go away
        if let Some(mut reader) = reader {
            reader.shutdown();
        }
        drop(fds);
        debug!(consumer = %self.consumer, "closed lines");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Lines {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Lines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lines")
            .field("abi", &self.abi)
            .field("consumer", &self.consumer)
            .field("offsets", &self.offsets())
            .finish()
    }
}

/// Offsets must be present, unique, within the chip, and at most 64.
/// Their order is preserved as the value order of the request.
fn validate_offsets(offsets: &[u32], num_lines: u32, chip_name: &str) -> Result<()> {
    if offsets.is_empty() {
        return Err(Error::invalid_config("no offsets requested"));
    }
    if offsets.len() > GPIO_LINES_MAX {
        return Err(Error::invalid_config(format!(
            "{} offsets exceed the request cap of {GPIO_LINES_MAX}",
            offsets.len()
        )));
    }
    for (i, offset) in offsets.iter().enumerate() {
        if offsets[..i].contains(offset) {
            return Err(Error::invalid_config(format!(
                "offset {offset} requested twice"
            )));
        }
        if *offset >= num_lines {
            return Err(Error::NotFound(format!(
                "offset {offset} on {chip_name} with {num_lines} lines"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_offsets_are_rejected() {
        let err = validate_offsets(&[1, 2, 1], 8, "gpiochip0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn empty_and_oversized_requests_are_rejected() {
        assert!(matches!(
            validate_offsets(&[], 8, "gpiochip0"),
            Err(Error::InvalidConfig(_))
        ));
        let too_many: Vec<u32> = (0..65).collect();
        assert!(matches!(
            validate_offsets(&too_many, 100, "gpiochip0"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn out_of_range_offset_is_not_found() {
        assert!(matches!(
            validate_offsets(&[7, 8], 8, "gpiochip0"),
            Err(Error::NotFound(_))
        ));
        assert!(validate_offsets(&[0, 7], 8, "gpiochip0").is_ok());
    }
}
