//! Edge events and the per-request reader.

use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use tracing::{debug, trace, warn};

use crate::chip::AbiVersion;
use crate::errors::{Error, Result};
use crate::uapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// A kernel-reported transition on a requested input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    pub offset: u32,
    pub kind: EdgeKind,
    /// Time of the transition, as a duration since the epoch of the
    /// request's event clock.
    pub timestamp: Duration,
    /// Per-request monotonic counter. Zero on uAPI v1, which does not
    /// report sequence numbers.
    pub seqno: u32,
    /// Per-line monotonic counter. Zero on uAPI v1.
    pub line_seqno: u32,
}

impl LineEvent {
    pub(crate) fn from_v2(raw: &uapi::v2::gpio_v2_line_event) -> Option<Self> {
        let kind = match raw.id {
            uapi::v2::LINE_EVENT_RISING_EDGE => EdgeKind::Rising,
            uapi::v2::LINE_EVENT_FALLING_EDGE => EdgeKind::Falling,
            _ => return None,
        };
        Some(Self {
            offset: raw.offset,
            kind,
            timestamp: Duration::from_nanos(raw.timestamp_ns),
            seqno: raw.seqno,
            line_seqno: raw.line_seqno,
        })
    }

    pub(crate) fn from_v1(raw: &uapi::v1::gpioevent_data, offset: u32) -> Option<Self> {
        let kind = match raw.id {
            uapi::v1::GPIOEVENT_EVENT_RISING_EDGE => EdgeKind::Rising,
            uapi::v1::GPIOEVENT_EVENT_FALLING_EDGE => EdgeKind::Falling,
            _ => return None,
        };
        Some(Self {
            offset,
            kind,
            timestamp: Duration::from_nanos(raw.timestamp_ns),
            seqno: 0,
            line_seqno: 0,
        })
    }
}

/// The capability invoked for each edge event. Unrecoverable read
/// failures are delivered as the `Err` variant, after which no further
/// invocations occur.
pub type EventHandler = Arc<dyn Fn(Result<LineEvent>) + Send + Sync + 'static>;

/// Background reader owning duplicated line descriptors for the lifetime
/// of one request.
pub(crate) struct EventReader {
    cancel: EventFd,
    join: Option<JoinHandle<()>>,
}

impl EventReader {
    /// Spawns the reader over `(fd, offset)` event sources. On v2 there
    /// is a single source and the offset comes from the event record; on
    /// v1 each line has its own descriptor and the offset is fixed.
    pub(crate) fn spawn(
        sources: Vec<(OwnedFd, u32)>,
        abi: AbiVersion,
        handler: EventHandler,
    ) -> Result<Self> {
        let cancel =
            EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC).map_err(Error::from)?;
        let wakeup = cancel.as_fd().try_clone_to_owned().map_err(Error::Io)?;
        let join = std::thread::Builder::new()
            .name("linedev-events".into())
            .spawn(move || read_loop(&sources, &wakeup, abi, &handler))
            .map_err(Error::Io)?;
        debug!(?abi, "edge event reader started");
        Ok(Self {
            cancel,
            join: Some(join),
        })
    }

    /// Signals the reader and waits for it to exit. A handler stuck in
    /// user code delays this call until it returns.
    pub(crate) fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        if let Err(e) = self.cancel.arm() {
            warn!("failed to signal event reader: {e}");
        }
        if join.join().is_err() {
            warn!("event reader panicked");
        }
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(sources: &[(OwnedFd, u32)], wakeup: &OwnedFd, abi: AbiVersion, handler: &EventHandler) {
    loop {
        let mut pollfds = Vec::with_capacity(sources.len() + 1);
        pollfds.push(PollFd::new(wakeup.as_fd(), PollFlags::POLLIN));
        for (fd, _) in sources {
            pollfds.push(PollFd::new(fd.as_fd(), PollFlags::POLLIN));
        }
        match poll(&mut pollfds, PollTimeout::NONE) {
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                handler(Err(e.into()));
                break;
            }
            Ok(_) => {}
        }
        if pollfds[0].revents().is_some_and(|r| !r.is_empty()) {
            trace!("event reader cancelled");
            break;
        }
        let ready: Vec<usize> = pollfds[1..]
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                p.revents()
                    .is_some_and(|r| r.intersects(PollFlags::POLLIN))
            })
            .map(|(i, _)| i)
            .collect();
        drop(pollfds);

        for idx in ready {
            let (fd, offset) = &sources[idx];
            match read_one(fd.as_raw_fd(), *offset, abi) {
                Ok(Some(event)) => handler(Ok(event)),
                // unknown event id, skipped
                Ok(None) => {}
                Err(e) => {
                    handler(Err(e));
                    return;
                }
            }
        }
    }
}

fn read_one(fd: std::os::fd::RawFd, offset: u32, abi: AbiVersion) -> Result<Option<LineEvent>> {
    let event = match abi {
        AbiVersion::V2 => {
            let raw: uapi::v2::gpio_v2_line_event =
                unsafe { uapi::read_record(fd) }.map_err(map_read_err)?;
            LineEvent::from_v2(&raw)
        }
        AbiVersion::V1 => {
            let raw: uapi::v1::gpioevent_data =
                unsafe { uapi::read_record(fd) }.map_err(map_read_err)?;
            LineEvent::from_v1(&raw, offset)
        }
    };
    Ok(event)
}

// The uAPI delivers whole records; a short read means the stream lost
// alignment, which only happens when the kernel buffer overflowed.
fn map_read_err(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::InvalidData {
        Error::Overflow
    } else {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_event_decode() {
        let raw = uapi::v2::gpio_v2_line_event {
            timestamp_ns: 1_000_000_001,
            id: uapi::v2::LINE_EVENT_RISING_EDGE,
            offset: 9,
            seqno: 4,
            line_seqno: 2,
            padding: [0; 6],
        };
        let event = LineEvent::from_v2(&raw).unwrap();
        assert_eq!(event.kind, EdgeKind::Rising);
        assert_eq!(event.offset, 9);
        assert_eq!(event.timestamp, Duration::from_nanos(1_000_000_001));
        assert_eq!(event.seqno, 4);
        assert_eq!(event.line_seqno, 2);
    }

    #[test]
    fn v1_event_reports_zero_seqnos() {
        let raw = uapi::v1::gpioevent_data {
            timestamp_ns: 42,
            id: uapi::v1::GPIOEVENT_EVENT_FALLING_EDGE,
        };
        let event = LineEvent::from_v1(&raw, 5).unwrap();
        assert_eq!(event.kind, EdgeKind::Falling);
        assert_eq!(event.offset, 5);
        assert_eq!(event.seqno, 0);
        assert_eq!(event.line_seqno, 0);
    }

    #[test]
    fn unknown_event_id_is_skipped() {
        let raw = uapi::v2::gpio_v2_line_event {
            timestamp_ns: 0,
            id: 0xFF,
            offset: 0,
            seqno: 0,
            line_seqno: 0,
            padding: [0; 6],
        };
        assert!(LineEvent::from_v2(&raw).is_none());
    }

    #[test]
    fn reader_delivers_and_shuts_down() {
        use std::sync::mpsc;

        // feed the reader through a pipe; records are wire-identical to
        // what the kernel writes
        let (rx, tx) = nix::unistd::pipe().unwrap();
        let (sender, received) = mpsc::channel();
        let handler: EventHandler = Arc::new(move |evt| {
            let _ = sender.send(evt.map(|e| (e.offset, e.kind, e.seqno)));
        });
        let mut reader = EventReader::spawn(vec![(rx, 0)], AbiVersion::V2, handler).unwrap();

        let raw = uapi::v2::gpio_v2_line_event {
            timestamp_ns: 7,
            id: uapi::v2::LINE_EVENT_RISING_EDGE,
            offset: 3,
            seqno: 1,
            line_seqno: 1,
            padding: [0; 6],
        };
        let bytes: [u8; core::mem::size_of::<uapi::v2::gpio_v2_line_event>()] =
            unsafe { core::mem::transmute(raw) };
        nix::unistd::write(&tx, &bytes).unwrap();

        let got = received
            .recv_timeout(Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!(got, (3, EdgeKind::Rising, 1));

        reader.shutdown();
        // after shutdown no further events are delivered
        nix::unistd::write(&tx, &bytes).unwrap();
        assert!(received.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
