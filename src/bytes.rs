use std::{borrow::Cow, fmt};

/// Hex rendering of a byte buffer, for logs and error messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Displayable<'a>(Cow<'a, [u8]>);

impl<'a> From<&'a [u8]> for Displayable<'a> {
    fn from(buf: &'a [u8]) -> Self {
        Self(Cow::Borrowed(buf))
    }
}

impl From<Vec<u8>> for Displayable<'static> {
    fn from(buf: Vec<u8>) -> Self {
        Self(Cow::Owned(buf))
    }
}

impl<'a> Displayable<'a> {
    pub fn to_owned(&self) -> Displayable<'static> {
        Displayable(Cow::Owned(self.0.to_vec()))
    }
}

// Long dumps would flood the logs, so only show the head and the tail.
const MAX_SHOWN: usize = 32;

impl<'a> fmt::Display for Displayable<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buf = self.0.as_ref();
        if buf.is_empty() {
            return f.write_str("(empty)");
        }

        let write_all = |f: &mut fmt::Formatter<'_>, bytes: &[u8]| -> fmt::Result {
            let mut iter = bytes.iter();
            if let Some(first) = iter.next() {
                write!(f, "{first:02X}")?;
            }
            for val in iter {
                write!(f, " {val:02X}")?;
            }
            Ok(())
        };

        if buf.len() <= MAX_SHOWN {
            return write_all(f, buf);
        }

        write_all(f, &buf[..MAX_SHOWN - 4])?;
        write!(f, " .. ({} bytes) .. ", buf.len())?;
        write_all(f, &buf[buf.len() - 4..])
    }
}
