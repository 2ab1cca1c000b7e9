use std::ops::Deref;

/// A fixed-capacity string stored the way the kernel stores line and chip
/// names: NUL-padded, at most `N` bytes including the terminator.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedStr<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    pub const fn empty() -> Self {
        Self { buf: [0; N] }
    }

    /// Builds a buffer from `s`, zero-padded to `N`.
    ///
    /// The kernel requires room for the terminator, so `s` may be at most
    /// `N - 1` bytes.
    pub fn new(s: &str) -> Result<Self, FixedStrError> {
        if s.len() >= N {
            return Err(FixedStrError::TooLong {
                capacity: N - 1,
                required: s.len(),
            });
        }
        let mut buf = [0; N];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self { buf })
    }

    /// Adopts a buffer returned by the kernel, trimming at the first NUL.
    pub fn from_byte_array(mut buf: [u8; N]) -> Result<Self, FixedStrError> {
        let len = buf.iter().position(|b| *b == 0).unwrap_or(N);
        core::str::from_utf8(&buf[..len])?;
        buf[len..].fill(0);
        Ok(Self { buf })
    }

    pub const fn into_byte_array(self) -> [u8; N] {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.iter().position(|b| *b == 0).unwrap_or(N)
    }

    pub const fn is_empty(&self) -> bool {
        self.buf[0] == 0
    }

    pub fn as_str(&self) -> &str {
        // Validated as UTF-8 on construction.
        unsafe { core::str::from_utf8_unchecked(&self.buf[..self.len()]) }
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> Deref for FixedStr<N> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> AsRef<str> for FixedStr<N> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> std::fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FixedStr").field(&self.as_str()).finish()
    }
}

impl<const N: usize> std::fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum FixedStrError {
    #[error("string of {required} bytes exceeds the {capacity} byte kernel buffer")]
    TooLong { capacity: usize, required: usize },
    #[error("kernel string is not valid UTF-8")]
    Utf8(#[from] core::str::Utf8Error),
}

impl From<FixedStrError> for crate::errors::Error {
    fn from(e: FixedStrError) -> Self {
        crate::errors::Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let s = FixedStr::<32>::new("gpiochip0").unwrap();
        assert_eq!(s.as_str(), "gpiochip0");
        assert_eq!(s.len(), 9);
        let arr = s.into_byte_array();
        assert_eq!(arr[9..], [0; 23]);
        let back = FixedStr::<32>::from_byte_array(arr).unwrap();
        assert_eq!(back.as_str(), "gpiochip0");
    }

    #[test]
    fn needs_room_for_terminator() {
        let max = "a".repeat(31);
        assert!(FixedStr::<32>::new(&max).is_ok());
        let over = "a".repeat(32);
        assert!(matches!(
            FixedStr::<32>::new(&over),
            Err(FixedStrError::TooLong { .. })
        ));
    }

    #[test]
    fn unterminated_kernel_buffer() {
        let s = FixedStr::<4>::from_byte_array(*b"abcd").unwrap();
        assert_eq!(s.as_str(), "abcd");
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn empty() {
        let s = FixedStr::<32>::empty();
        assert!(s.is_empty());
        assert_eq!(s.as_str(), "");
    }
}
