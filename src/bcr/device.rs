use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use super::{codec, DeviceHandle, Identity, Preset};
use crate::{
    transfer::{
        self, Cancel, Dump, DumpAccumulator, ErrorBatch, ErrorCollector, IdentityProbe, Machine,
        SharedTimer, Transfer,
    },
    transport::Transport,
    Error,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub identity_timeout: Duration,
    pub reply_timeout: Duration,
    pub dump_timeout: Duration,
    pub max_in_flight: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity_timeout: Duration::from_millis(1000),
            reply_timeout: Duration::from_millis(2000),
            dump_timeout: Duration::from_millis(3000),
            max_in_flight: 1,
        }
    }
}

/// A session with one BCR2000.
///
/// Only one operation runs at a time: starting an operation cancels
/// the one in flight, if any.
pub struct Bcr2000<T: Transport> {
    transport: Arc<T>,
    handle: DeviceHandle,
    config: SessionConfig,
    timer: SharedTimer,
    active: Mutex<Option<Weak<dyn Cancel>>>,
}

impl<T: Transport> Bcr2000<T> {
    pub fn new(transport: Arc<T>, handle: DeviceHandle, config: SessionConfig) -> Self {
        log::info!("Using BCR2000 on {handle}");

        Self {
            transport,
            handle,
            config,
            timer: transfer::new_timer(),
            active: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Asks the device to dump `preset`.
    pub fn request_dump(&self, preset: Preset) -> Transfer<Dump> {
        self.start(
            self.config.dump_timeout,
            DumpAccumulator::new(preset, self.handle.device_id),
        )
    }

    /// Sends `source` verbatim & collects the errors the device reports.
    ///
    /// Lines which can't be fully encoded are still sent, see [`codec::encode_verbatim`].
    pub fn send_bcl(&self, source: &str) -> Transfer<ErrorBatch> {
        let encoded = codec::encode_verbatim(source, self.handle.device_id);
        for diagnostic in &encoded.diagnostics {
            log::warn!("{diagnostic}");
        }

        self.send_encoded(encoded)
    }

    pub fn send_encoded(&self, encoded: codec::Encoded) -> Transfer<ErrorBatch> {
        log::info!("Sending {} BCL messages", encoded.len());

        self.start(
            self.config.reply_timeout,
            ErrorCollector::new(encoded, self.config.max_in_flight),
        )
    }

    /// Checks that the device still answers.
    pub fn identify(&self) -> Transfer<Identity> {
        self.start(self.config.identity_timeout, IdentityProbe)
    }

    /// Cancels the operation in flight, if any.
    pub fn cancel(&self) {
        if let Some(prev) = self.active.lock().unwrap().take().and_then(|weak| weak.upgrade()) {
            prev.cancel();
        }
    }

    fn start<M: Machine>(&self, timeout: Duration, machine: M) -> Transfer<M::Output> {
        let mut active = self.active.lock().unwrap();
        if let Some(prev) = active.take().and_then(|weak| weak.upgrade()) {
            if !prev.phase().is_done() {
                log::info!("Cancelling previous operation");
                prev.cancel();
            }
        }

        let transfer = transfer::launch(self.transport.clone(), self.timer.clone(), timeout, machine);
        *active = Some(transfer.canceller());

        transfer
    }
}

impl<T: Transport> Drop for Bcr2000<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Runs `f` on each preset in turn, stopping at the first error.
pub fn for_each_preset<T, F>(session: &Bcr2000<T>, mut f: F) -> Result<(), Error>
where
    T: Transport,
    F: FnMut(Preset, Dump),
{
    for preset in Preset::all() {
        let dump = session.request_dump(preset).wait()?;
        f(preset, dump);
    }

    Ok(())
}
