mod error;
pub use error::Error;

mod io;
pub use io::Close;

pub mod msg;
pub use msg::Msg;

pub mod port;
pub use port::{PortName, PortPair, Ports, PortsIn, PortsOut};

pub mod sysex {
    pub const TAG: u8 = 0xf0;
    pub const END_TAG: u8 = 0xf7;
}

/// 14 bits values spread over two 7 bits data bytes, most significant first.
pub mod u14 {
    use super::Error;
    use crate::bytes::Displayable;

    pub const MAX: u16 = 0x3fff;

    #[inline]
    pub fn from_msb_lsb(buf: &[u8]) -> Result<u16, Error> {
        match *buf {
            [msb, lsb] if msb <= 0x7f && lsb <= 0x7f => Ok(((msb as u16) << 7) | lsb as u16),
            _ => Err(Error::InvalidTwoBytesValue(
                Displayable::from(buf).to_owned(),
            )),
        }
    }

    #[inline]
    pub fn to_msb_lsb(val: u16) -> Result<[u8; 2], Error> {
        if val > MAX {
            return Err(Error::InvalidU14(val));
        }

        Ok([(val >> 7) as u8, val as u8 & 0x7f])
    }
}
