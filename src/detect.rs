//! BCR2000 auto-detection.
//!
//! Every candidate port pair is challenged with an identity request at the
//! same time. The first one to answer wins and the other probes are cancelled.

use crossbeam_channel as channel;
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    bcr::{DeviceHandle, Identity},
    midi::PortPair,
    transfer::{self, IdentityProbe, SharedTimer, Transfer},
    transport::{MidiTransport, Transport},
    Error,
};

pub struct Candidate<T: Transport> {
    pub ports: PortPair,
    pub transport: Arc<T>,
}

impl<T: Transport> Candidate<T> {
    pub fn new(ports: PortPair, transport: Arc<T>) -> Self {
        Self { ports, transport }
    }
}

/// Outcome of the probe of one candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeReport {
    pub ports: PortPair,
    pub identity: Option<Identity>,
}

impl ProbeReport {
    pub fn confirmed(&self) -> bool {
        self.identity.is_some()
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identity {
            Some(identity) => write!(f, "{}: confirmed, {identity}", self.ports),
            None => write!(f, "{}: rejected", self.ports),
        }
    }
}

pub struct Detected<T: Transport> {
    pub handle: DeviceHandle,
    pub identity: Identity,
    pub transport: Arc<T>,
}

pub struct Detection<T: Transport> {
    /// One report per candidate, in candidate order.
    pub reports: Vec<ProbeReport>,
    pub detected: Option<Detected<T>>,
}

impl<T: Transport> Detection<T> {
    pub fn device(self) -> Result<Detected<T>, Error> {
        let count = self.reports.len();
        self.detected.ok_or(Error::DeviceNotFound(count))
    }
}

/// Probes all `candidates` in parallel, within `timeout`.
pub fn auto_detect<T: Transport>(
    candidates: Vec<Candidate<T>>,
    timer: SharedTimer,
    timeout: Duration,
) -> Detection<T> {
    let deadline = Instant::now() + timeout;

    let mut reports: Vec<ProbeReport> = candidates
        .iter()
        .map(|candidate| ProbeReport {
            ports: candidate.ports.clone(),
            identity: None,
        })
        .collect();

    let mut probes: Vec<Option<Transfer<Identity>>> = candidates
        .iter()
        .map(|candidate| {
            log::debug!("Probing {}", candidate.ports);
            Some(transfer::launch(
                candidate.transport.clone(),
                timer.clone(),
                timeout,
                IdentityProbe,
            ))
        })
        .collect();

    let mut winner = None;
    let mut pending = probes.len();

    while pending > 0 {
        let (idx, res) = {
            let receivers: Vec<(usize, &channel::Receiver<_>)> = probes
                .iter()
                .enumerate()
                .filter_map(|(idx, probe)| probe.as_ref().map(|probe| (idx, probe.receiver())))
                .collect();

            let mut sel = channel::Select::new();
            for &(_, rx) in &receivers {
                sel.recv(rx);
            }

            let oper = match sel.select_deadline(deadline) {
                Ok(oper) => oper,
                Err(_) => {
                    log::debug!("Auto-detection deadline reached");
                    break;
                }
            };

            let (idx, rx) = receivers[oper.index()];
            (idx, oper.recv(rx))
        };
        probes[idx] = None;
        pending -= 1;

        match res {
            Ok(Ok(identity)) => {
                log::info!("Found {identity} on {}", reports[idx].ports);
                reports[idx].identity = Some(identity);
                winner = Some(idx);
                break;
            }
            Ok(Err(err)) => log::debug!("Rejecting {}: {err}", reports[idx].ports),
            Err(_) => log::debug!("Probe on {} cancelled", reports[idx].ports),
        }
    }

    // Cancels the remaining probes.
    drop(probes);

    let detected = winner.and_then(|idx| {
        let identity = reports[idx].identity.clone()?;
        let candidate = candidates.into_iter().nth(idx)?;

        Some(Detected {
            handle: DeviceHandle::new(candidate.ports, identity.device_id),
            identity,
            transport: candidate.transport,
        })
    });

    if detected.is_none() {
        log::warn!("No BCR2000 found among {} candidates", reports.len());
    }

    Detection { reports, detected }
}

/// Connects a [`MidiTransport`] to each port pair which could lead to a device.
///
/// Port pairs which can't be connected are skipped.
pub fn midi_candidates(client_name: &str) -> Result<Vec<Candidate<MidiTransport>>, Error> {
    let pairs = MidiTransport::try_new(client_name)?.candidates();
    log::debug!("{} candidate port pairs", pairs.len());

    let mut candidates = Vec::with_capacity(pairs.len());
    for ports in pairs {
        let transport = MidiTransport::try_new(client_name)?;
        match transport.connect(&ports) {
            Ok(()) => candidates.push(Candidate::new(ports, Arc::new(transport))),
            Err(err) => log::warn!("Skipping {ports}: {err}"),
        }
    }

    Ok(candidates)
}

/// Connects a [`MidiTransport`] to `ports`.
pub fn connect(client_name: &str, ports: &PortPair) -> Result<Arc<MidiTransport>, Error> {
    let transport = MidiTransport::try_new(client_name)?;
    if !transport.is_available(ports) {
        return Err(Error::PortNotFound(ports.clone()));
    }

    transport.connect(ports)?;
    log::info!("Connected to {ports}");

    Ok(Arc::new(transport))
}
