use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bstr::ByteSlice;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use tracing::{debug, trace, warn};

use crate::errors::{Error, Result};
use crate::line::event::EventHandler;
use crate::line::info::{InfoChangeEvent, LineInfo};
use crate::line::options::{ChipOption, ConfigOption, ReqOption};
use crate::line::request::Lines;
use crate::uapi;

/// The two incompatible ioctl families of the GPIO character device. A
/// chip operates at exactly one version for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiVersion {
    V1,
    V2,
}

impl std::fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbiVersion::V1 => f.write_str("v1"),
            AbiVersion::V2 => f.write_str("v2"),
        }
    }
}

/// The capability invoked for each change on a watched line.
pub type InfoChangeHandler = Arc<dyn Fn(InfoChangeEvent) + Send + Sync + 'static>;

/// Request defaults collected from the chip options.
#[derive(Default, Clone)]
pub(crate) struct ChipDefaults {
    pub(crate) consumer: Option<String>,
    pub(crate) options: Vec<ConfigOption>,
    pub(crate) handler: Option<EventHandler>,
    pub(crate) event_buffer_size: Option<u32>,
}

/// A GPIO chip: the character device through which its lines are
/// inspected and requested.
///
/// Closing a chip never closes line requests obtained from it; a
/// [`Lines`] handle holds its own descriptor.
pub struct Chip {
    fd: OwnedFd,
    path: PathBuf,
    name: String,
    label: String,
    num_lines: u32,
    abi: AbiVersion,
    defaults: ChipDefaults,
    watch: Mutex<InfoWatch>,
}

impl Chip {
    /// Opens a GPIO character device by path or bare chip name.
    ///
    /// Fails with [`Error::NotCharacterDevice`] or
    /// [`Error::NotGpioChip`] for paths that exist but are not a GPIO
    /// chip, and [`Error::NotFound`] for paths that do not.
    pub fn open(
        path: impl AsRef<Path>,
        options: impl IntoIterator<Item = ChipOption>,
    ) -> Result<Chip> {
        let path = resolve_name(path.as_ref());
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
                _ => Error::Io(e),
            })?;
        if !file
            .metadata()
            .map_err(Error::Io)?
            .file_type()
            .is_char_device()
        {
            return Err(Error::NotCharacterDevice(path));
        }
        let fd = OwnedFd::from(file);

        let mut info = uapi::gpiochip_info::zeroed();
        if let Err(errno) = unsafe { uapi::gpio_get_chipinfo(fd.as_raw_fd(), &mut info) } {
            return match errno {
                nix::errno::Errno::ENOTTY | nix::errno::Errno::EINVAL => {
                    Err(Error::NotGpioChip(path))
                }
                e => Err(e.into()),
            };
        }

        let mut defaults = ChipDefaults::default();
        let mut pinned_abi = None;
        for opt in options {
            match opt {
                ChipOption::Config(c) => defaults.options.push(c),
                ChipOption::Consumer(c) => defaults.consumer = Some(c),
                ChipOption::EventHandler(h) => defaults.handler = h,
                ChipOption::EventBufferSize(n) => defaults.event_buffer_size = Some(n),
                ChipOption::AbiVersion(v) => pinned_abi = Some(v),
            }
        }
        let abi = match pinned_abi {
            Some(v) => v,
            None => probe_abi(fd.as_raw_fd()),
        };

        let chip = Chip {
            fd,
            path,
            name: kernel_str(&info.name),
            label: kernel_str(&info.label),
            num_lines: info.lines,
            abi,
            defaults,
            watch: Mutex::new(InfoWatch::default()),
        };
        debug!(name = %chip.name, label = %chip.label, lines = chip.num_lines, abi = %chip.abi,
            "opened chip");
        Ok(chip)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The kernel's name for the chip, e.g. `gpiochip0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The functional label, e.g. `pinctrl-bcm2835`. May be empty.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of lines indexable through this chip.
    pub fn num_lines(&self) -> u32 {
        self.num_lines
    }

    /// The negotiated (or pinned) uAPI version.
    pub fn abi_version(&self) -> AbiVersion {
        self.abi
    }

    pub(crate) fn defaults(&self) -> &ChipDefaults {
        &self.defaults
    }

    /// A snapshot of the line at `offset`.
    pub fn line_info(&self, offset: u32) -> Result<LineInfo> {
        self.check_offset(offset)?;
        match self.abi {
            AbiVersion::V2 => {
                let mut info = uapi::v2::gpio_v2_line_info::zeroed();
                info.offset = offset;
                unsafe { uapi::v2::gpio_v2_get_lineinfo(self.fd.as_raw_fd(), &mut info) }?;
                Ok(LineInfo::from_v2(&info))
            }
            AbiVersion::V1 => {
                let mut info = uapi::v1::gpioline_info::zeroed();
                info.line_offset = offset;
                unsafe { uapi::v1::gpio_get_lineinfo(self.fd.as_raw_fd(), &mut info) }?;
                Ok(LineInfo::from_v1(&info))
            }
        }
    }

    /// Requests a single line. See [`Chip::request_lines`].
    pub fn request_line(
        &self,
        offset: u32,
        options: impl IntoIterator<Item = ReqOption>,
    ) -> Result<Lines> {
        Lines::request(self, &[offset], options)
    }

    /// Requests a set of lines for exclusive use, composed from the
    /// chip defaults and the given options. Offsets must be unique;
    /// their order defines the order of values.
    pub fn request_lines(
        &self,
        offsets: &[u32],
        options: impl IntoIterator<Item = ReqOption>,
    ) -> Result<Lines> {
        Lines::request(self, offsets, options)
    }

    /// Starts watching the line at `offset` for info changes and returns
    /// the current snapshot. Watching an already watched offset fails
    /// with [`Error::Busy`]; [`Chip::unwatch_line_info`] is explicit.
    pub fn watch_line_info(&self, offset: u32, handler: InfoChangeHandler) -> Result<LineInfo> {
        self.check_offset(offset)?;
        let mut watch = self.lock_watch();
        if watch.handlers.lock().unwrap_or_else(|e| e.into_inner()).contains_key(&offset) {
            return Err(Error::Busy);
        }
        let info = match self.abi {
            AbiVersion::V2 => {
                let mut info = uapi::v2::gpio_v2_line_info::zeroed();
                info.offset = offset;
                unsafe { uapi::v2::gpio_v2_get_lineinfo_watch(self.fd.as_raw_fd(), &mut info) }?;
                LineInfo::from_v2(&info)
            }
            AbiVersion::V1 => {
                let mut info = uapi::v1::gpioline_info::zeroed();
                info.line_offset = offset;
                unsafe { uapi::v1::gpio_get_lineinfo_watch(self.fd.as_raw_fd(), &mut info) }?;
                LineInfo::from_v1(&info)
            }
        };
        if watch.reader.is_none() {
            watch.reader = Some(WatchReader::spawn(
                self.fd.try_clone().map_err(Error::Io)?,
                self.abi,
                Arc::clone(&watch.handlers),
            )?);
        }
        watch
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(offset, handler);
        trace!(chip = %self.name, offset, "watching line info");
        Ok(info)
    }

    /// Stops watching `offset`. When the last watch is removed the
    /// shared reader stops.
    pub fn unwatch_line_info(&self, offset: u32) -> Result<()> {
        self.check_offset(offset)?;
        let mut watch = self.lock_watch();
        let mut off = offset;
        unsafe { uapi::gpio_get_lineinfo_unwatch(self.fd.as_raw_fd(), &mut off) }?;
        let empty = {
            let mut handlers = watch.handlers.lock().unwrap_or_else(|e| e.into_inner());
            handlers.remove(&offset);
            handlers.is_empty()
        };
        if empty {
            if let Some(mut reader) = watch.reader.take() {
                reader.shutdown();
            }
        }
        Ok(())
    }

    /// Closes the chip. Outstanding line requests stay valid; an active
    /// info watch reader is stopped.
    pub fn close(self) {}

    fn check_offset(&self, offset: u32) -> Result<()> {
        if offset >= self.num_lines {
            return Err(Error::NotFound(format!(
                "offset {offset} on {} with {} lines",
                self.name, self.num_lines
            )));
        }
        Ok(())
    }

    fn lock_watch(&self) -> std::sync::MutexGuard<'_, InfoWatch> {
        self.watch.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Chip {
    fn drop(&mut self) {
        if let Some(mut reader) = self.lock_watch().reader.take() {
            reader.shutdown();
        }
    }
}

impl AsRawFd for Chip {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::fmt::Debug for Chip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chip")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("label", &self.label)
            .field("num_lines", &self.num_lines)
            .field("abi", &self.abi)
            .finish()
    }
}

/// Probes which uAPI revision the kernel speaks, using a trivially
/// invalid v2 line-info request: a v1-only kernel answers ENOTTY,
/// anything else means v2 is handled.
fn probe_abi(fd: RawFd) -> AbiVersion {
    let mut info = uapi::v2::gpio_v2_line_info::zeroed();
    info.offset = u32::MAX;
    match unsafe { uapi::v2::gpio_v2_get_lineinfo(fd, &mut info) } {
        Err(nix::errno::Errno::ENOTTY) => AbiVersion::V1,
        _ => AbiVersion::V2,
    }
}

#[derive(Default)]
struct InfoWatch {
    handlers: Arc<Mutex<HashMap<u32, InfoChangeHandler>>>,
    reader: Option<WatchReader>,
}

/// Shared reader for line-info change records on the chip descriptor,
/// keyed by offset.
struct WatchReader {
    cancel: EventFd,
    join: Option<JoinHandle<()>>,
}

impl WatchReader {
    fn spawn(
        fd: OwnedFd,
        abi: AbiVersion,
        handlers: Arc<Mutex<HashMap<u32, InfoChangeHandler>>>,
    ) -> Result<Self> {
        let cancel =
            EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC).map_err(Error::from)?;
        let wakeup = cancel.as_fd().try_clone_to_owned().map_err(Error::Io)?;
        let join = std::thread::Builder::new()
            .name("linedev-infowatch".into())
            .spawn(move || watch_loop(&fd, &wakeup, abi, &handlers))
            .map_err(Error::Io)?;
        Ok(Self {
            cancel,
            join: Some(join),
        })
    }

    fn shutdown(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        if let Err(e) = self.cancel.arm() {
            warn!("failed to signal info watch reader: {e}");
        }
        if join.join().is_err() {
            warn!("info watch reader panicked");
        }
    }
}

impl Drop for WatchReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_loop(
    fd: &OwnedFd,
    wakeup: &OwnedFd,
    abi: AbiVersion,
    handlers: &Mutex<HashMap<u32, InfoChangeHandler>>,
) {
    loop {
        let mut pollfds = [
            PollFd::new(wakeup.as_fd(), PollFlags::POLLIN),
            PollFd::new(fd.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut pollfds, PollTimeout::NONE) {
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                warn!("info watch poll failed: {e}");
                break;
            }
            Ok(_) => {}
        }
        if pollfds[0].revents().is_some_and(|r| !r.is_empty()) {
            trace!("info watch reader cancelled");
            break;
        }
        if !pollfds[1]
            .revents()
            .is_some_and(|r| r.intersects(PollFlags::POLLIN))
        {
            continue;
        }
        let event = match abi {
            AbiVersion::V2 => unsafe {
                uapi::read_record::<uapi::v2::gpio_v2_line_info_changed>(fd.as_raw_fd())
            }
            .map(|raw| InfoChangeEvent::from_v2(&raw)),
            AbiVersion::V1 => unsafe {
                uapi::read_record::<uapi::v1::gpioline_info_changed>(fd.as_raw_fd())
            }
            .map(|raw| InfoChangeEvent::from_v1(&raw)),
        };
        match event {
            Ok(Some(event)) => {
                let handler = handlers
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&event.info.offset)
                    .cloned();
                if let Some(handler) = handler {
                    handler(event);
                }
            }
            // unknown change kind, skipped
            Ok(None) => {}
            Err(e) => {
                warn!("info watch read failed: {e}");
                break;
            }
        }
    }
}

/// All GPIO character devices on this system, sorted by name.
///
/// Scans `/dev` and keeps only entries that [`is_chip`] validates
/// against `/sys/bus/gpio`.
pub fn chips() -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir("/dev").map_err(Error::Io)? {
        let entry = entry.map_err(Error::Io)?;
        let path = entry.path();
        let Some(name) = path.file_name() else {
            continue;
        };
        if !name.as_encoded_bytes().contains_str("gpiochip") {
            continue;
        }
        if let Ok(path) = is_chip(&path) {
            found.push(path);
        }
    }
    found.sort();
    found.dedup();
    Ok(found)
}

/// Validates that `path` is a GPIO character device, resolving symlinks,
/// by matching its device number against `/sys/bus/gpio/devices`.
pub fn is_chip(path: &Path) -> Result<PathBuf> {
    let path = std::fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    let meta = std::fs::metadata(&path).map_err(Error::Io)?;
    if !meta.file_type().is_char_device() {
        return Err(Error::NotCharacterDevice(path));
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Err(Error::NotGpioChip(path));
    };
    let sys_dev = PathBuf::from("/sys/bus/gpio/devices").join(name).join("dev");
    let Ok(dev) = std::fs::read_to_string(sys_dev) else {
        return Err(Error::NotGpioChip(path));
    };
    let rdev = meta.rdev();
    let expected = format!(
        "{}:{}",
        nix::sys::stat::major(rdev),
        nix::sys::stat::minor(rdev)
    );
    if dev.trim() != expected {
        return Err(Error::NotGpioChip(path));
    }
    Ok(path)
}

fn resolve_name(path: &Path) -> PathBuf {
    // a bare chip name refers to its /dev node
    if path.components().count() == 1 && !path.has_root() {
        Path::new("/dev").join(path)
    } else {
        path.to_path_buf()
    }
}

pub(crate) fn kernel_str(buf: &[u8]) -> String {
    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_resolve_to_dev() {
        assert_eq!(
            resolve_name(Path::new("gpiochip0")),
            Path::new("/dev/gpiochip0")
        );
        assert_eq!(
            resolve_name(Path::new("/dev/gpiochip0")),
            Path::new("/dev/gpiochip0")
        );
    }

    #[test]
    fn open_missing_chip_is_not_found() {
        let err = Chip::open("/dev/gpiochip-none-such", []).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn open_non_chip_device() {
        // /dev/null is a character device but refuses GET_CHIPINFO
        let err = Chip::open("/dev/null", []).unwrap_err();
        assert!(matches!(err, Error::NotGpioChip(_)));
    }

    #[test]
    fn abi_display() {
        assert_eq!(AbiVersion::V1.to_string(), "v1");
        assert_eq!(AbiVersion::V2.to_string(), "v2");
    }
}
