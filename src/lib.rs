//! Programming a Behringer BCR2000 with BCL.
//!
//! BCL text is parsed by [`bcl`], translated to and from SysEx by
//! [`bcr::codec`] and exchanged with the device through a [`transport`]
//! by a [`bcr::Bcr2000`] session.

pub mod bcl;
pub mod bcr;
pub mod bytes;
pub mod config;
pub mod detect;

mod error;
pub use error::Error;

pub mod files;
pub mod midi;
pub mod transfer;
pub mod transport;
