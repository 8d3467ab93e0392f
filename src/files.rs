//! `.bcl` & `.syx` documents.

use std::{fs, path::Path};

use crate::{bcr, midi::Msg, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    /// BCL text: `.bcl`, `.bcr` or `.txt`.
    Bcl,
    /// Raw SysEx messages.
    Syx,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("bcl" | "bcr" | "txt") => Ok(FileKind::Bcl),
            Some("syx") => Ok(FileKind::Syx),
            _ => Err(Error::UnsupportedFile(path.to_path_buf())),
        }
    }
}

/// Loads the BCR2000 messages of a `.syx` file.
///
/// Messages from other devices are dropped.
pub fn load_syx(path: &Path) -> Result<Vec<Msg>, Error> {
    let stream = fs::read(path).map_err(|err| Error::io(path, err))?;
    let all = Msg::split_sysex_stream(&stream);
    let total = all.len();

    let msgs: Vec<Msg> = all.into_iter().filter(bcr::is_from_bcr2000).collect();
    if msgs.len() < total {
        log::warn!(
            "Dropped {} non BCR2000 messages from {}",
            total - msgs.len(),
            path.display(),
        );
    }

    log::info!("Loaded {} messages from {}", msgs.len(), path.display());

    Ok(msgs)
}

pub fn save_syx(path: &Path, msgs: &[Msg]) -> Result<(), Error> {
    let stream: Vec<u8> = msgs
        .iter()
        .flat_map(|msg| msg.inner().iter().copied())
        .collect();

    fs::write(path, stream).map_err(|err| Error::io(path, err))?;
    log::info!("Saved {} messages to {}", msgs.len(), path.display());

    Ok(())
}

pub fn load_bcl(path: &Path) -> Result<String, Error> {
    let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
    log::info!("Loaded {}", path.display());

    Ok(text)
}

pub fn save_bcl(path: &Path, text: &str) -> Result<(), Error> {
    fs::write(path, text).map_err(|err| Error::io(path, err))?;
    log::info!("Saved {}", path.display());

    Ok(())
}

/// Loads `path` as BCL text, decoding it if it's a `.syx` file.
pub fn load_document(path: &Path) -> Result<String, Error> {
    match FileKind::from_path(path)? {
        FileKind::Bcl => load_bcl(path),
        FileKind::Syx => Ok(bcr::decode(&load_syx(path)?)),
    }
}
