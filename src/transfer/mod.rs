//! In-flight operations with the device.
//!
//! An operation drives a [`Machine`] from the transport's inbound messages
//! and from an inactivity timeout. Its result is posted once on a channel
//! which the caller reads through a [`Transfer`].

use crossbeam_channel as channel;
use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use crate::{
    midi::{self, Msg},
    transport::{HandlerId, Transport},
    Error,
};

pub mod dump;
pub use dump::{Dump, DumpAccumulator};

pub mod feedback;
pub use feedback::{BcrError, Completion, ErrorBatch, ErrorCollector};

pub mod probe;
pub use probe::IdentityProbe;

/// Timer shared by the operations of a session.
pub type SharedTimer = Arc<Mutex<timer::Timer>>;

pub fn new_timer() -> SharedTimer {
    Arc::new(Mutex::new(timer::Timer::new()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
    Complete,
    Cancelled,
}

impl Phase {
    pub fn is_done(self) -> bool {
        matches!(self, Phase::Complete | Phase::Cancelled)
    }
}

/// What an operation must do after feeding its machine.
#[derive(Debug)]
pub enum Step<O> {
    /// The message doesn't belong to this operation.
    Ignored,
    /// Send these messages, if any, & re-arm the timeout.
    Progress(Vec<Msg>),
    Done(Result<O, Error>),
}

impl<O> Step<O> {
    pub fn progress() -> Self {
        Step::Progress(Vec::new())
    }
}

/// A protocol state machine, free of any I/O.
pub trait Machine: Send + 'static {
    type Output: Send + 'static;

    const NAME: &'static str;

    fn start(&mut self) -> Step<Self::Output>;

    fn on_msg(&mut self, msg: &Msg) -> Step<Self::Output>;

    /// Called when nothing happened for `after`.
    fn on_timeout(&mut self, after: Duration) -> Result<Self::Output, Error>;
}

pub trait Cancel: Send + Sync {
    fn cancel(&self);
    fn phase(&self) -> Phase;
}

struct Inner<M: Machine> {
    phase: Phase,
    machine: M,
    tx: Option<channel::Sender<Result<M::Output, Error>>>,
    guard: Option<timer::Guard>,
}

struct Operation<T: Transport, M: Machine> {
    transport: Arc<T>,
    handler_id: HandlerId,
    timer: SharedTimer,
    timeout: Duration,
    inner: Mutex<Inner<M>>,
}

impl<T: Transport, M: Machine> Operation<T, M> {
    fn arm(self: &Arc<Self>) -> timer::Guard {
        let weak = Arc::downgrade(self);
        let delay = chrono::Duration::milliseconds(self.timeout.as_millis() as i64);

        self.timer
            .lock()
            .unwrap()
            .schedule_with_delay(delay, move || {
                if let Some(op) = weak.upgrade() {
                    op.on_timeout();
                }
            })
    }

    /// Applies `step` and returns the messages to send, if the operation goes on.
    fn apply(self: &Arc<Self>, inner: &mut Inner<M>, step: Step<M::Output>) -> Option<Vec<Msg>> {
        match step {
            Step::Ignored => Some(Vec::new()),
            Step::Progress(msgs) => {
                inner.guard = Some(self.arm());
                Some(msgs)
            }
            Step::Done(res) => {
                Self::complete(inner, res);
                None
            }
        }
    }

    fn complete(inner: &mut Inner<M>, res: Result<M::Output, Error>) {
        inner.phase = Phase::Complete;
        inner.guard = None;

        match &res {
            Ok(_) => log::debug!("{} complete", M::NAME),
            Err(err) => log::debug!("{} failed: {err}", M::NAME),
        }

        if let Some(tx) = inner.tx.take() {
            // The caller may have given up on the result.
            let _ = tx.try_send(res);
        }
    }

    fn on_msg(self: &Arc<Self>, msg: &Msg) {
        let to_send = {
            let mut inner = self.inner.lock().unwrap();
            if inner.phase != Phase::Collecting {
                return;
            }

            let step = inner.machine.on_msg(msg);
            self.apply(&mut inner, step)
        };

        match to_send {
            Some(msgs) => self.send_all(&msgs),
            None => self.transport.remove_handler(self.handler_id),
        }
    }

    fn on_timeout(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.phase != Phase::Collecting {
                return;
            }

            log::debug!("{} timed out after {:?}", M::NAME, self.timeout);
            let res = inner.machine.on_timeout(self.timeout);
            Self::complete(&mut inner, res);
        }

        self.transport.remove_handler(self.handler_id);
    }

    fn send_all(self: &Arc<Self>, msgs: &[Msg]) {
        for msg in msgs {
            if let Err(err) = self.transport.send(msg) {
                log::error!("{} couldn't send {}: {err}", M::NAME, msg.display());
                self.fail(err);
                return;
            }
        }
    }

    fn fail(self: &Arc<Self>, err: midi::Error) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.phase.is_done() {
                return;
            }
            Self::complete(&mut inner, Err(err.into()));
        }

        self.transport.remove_handler(self.handler_id);
    }
}

impl<T: Transport, M: Machine> Cancel for Operation<T, M> {
    fn cancel(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.phase.is_done() {
                return;
            }

            log::debug!("Cancelling {}", M::NAME);
            inner.phase = Phase::Cancelled;
            inner.guard = None;
            inner.tx = None;
        }

        self.transport.remove_handler(self.handler_id);
    }

    fn phase(&self) -> Phase {
        self.inner.lock().unwrap().phase
    }
}

/// Starts `machine` on `transport`.
///
/// The inbound handler is registered before the first messages are sent.
pub fn launch<T: Transport, M: Machine>(
    transport: Arc<T>,
    timer: SharedTimer,
    timeout: Duration,
    machine: M,
) -> Transfer<M::Output> {
    let (tx, rx) = channel::bounded(1);
    let handler_id = HandlerId::next();

    let op = Arc::new(Operation {
        transport: transport.clone(),
        handler_id,
        timer,
        timeout,
        inner: Mutex::new(Inner {
            phase: Phase::Idle,
            machine,
            tx: Some(tx),
            guard: None,
        }),
    });

    let weak = Arc::downgrade(&op);
    transport.register_handler(
        handler_id,
        Box::new(move |_port: &midi::PortName, msg: &Msg| {
            if let Some(op) = weak.upgrade() {
                op.on_msg(msg);
            }
        }),
    );

    log::debug!("Starting {}", M::NAME);

    let to_send = {
        let mut inner = op.inner.lock().unwrap();
        inner.phase = Phase::Collecting;
        let step = inner.machine.start();
        let to_send = op.apply(&mut inner, step);
        if to_send.is_some() && inner.guard.is_none() {
            inner.guard = Some(op.arm());
        }

        to_send
    };

    match to_send {
        Some(msgs) => op.send_all(&msgs),
        None => transport.remove_handler(handler_id),
    }

    Transfer {
        rx,
        op: op as Arc<dyn Cancel>,
    }
}

/// Handle on an in-flight operation.
///
/// Dropping the handle cancels the operation.
pub struct Transfer<R> {
    rx: channel::Receiver<Result<R, Error>>,
    op: Arc<dyn Cancel>,
}

impl<R> Transfer<R> {
    /// Blocks until the operation completes.
    pub fn wait(self) -> Result<R, Error> {
        self.rx.recv().map_err(|_| Error::Cancelled)?
    }

    /// Returns the result if the operation is over.
    pub fn try_result(&self) -> Option<Result<R, Error>> {
        match self.rx.try_recv() {
            Ok(res) => Some(res),
            Err(channel::TryRecvError::Empty) => None,
            Err(channel::TryRecvError::Disconnected) => Some(Err(Error::Cancelled)),
        }
    }

    /// The channel the result is posted on, e.g. for a `select!`.
    pub fn receiver(&self) -> &channel::Receiver<Result<R, Error>> {
        &self.rx
    }

    pub fn phase(&self) -> Phase {
        self.op.phase()
    }

    pub fn cancel(&self) {
        self.op.cancel();
    }

    pub(crate) fn canceller(&self) -> Weak<dyn Cancel> {
        Arc::downgrade(&self.op)
    }
}

impl<R> Drop for Transfer<R> {
    fn drop(&mut self) {
        self.op.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{midi::PortName, transport::Handlers};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Loopback {
        handlers: Handlers,
        sent: Mutex<Vec<Msg>>,
    }

    impl Loopback {
        fn deliver(&self, msg: Msg) {
            let port: PortName = "test".into();
            self.handlers.dispatch(&port, &msg);
        }
    }

    impl Transport for Loopback {
        fn send(&self, msg: &Msg) -> Result<(), midi::Error> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }

        fn register_handler(&self, id: HandlerId, handler: crate::transport::Handler) {
            self.handlers.register(id, handler);
        }

        fn remove_handler(&self, id: HandlerId) {
            self.handlers.remove(id);
        }
    }

    /// Completes after `count` messages.
    struct Counter {
        count: usize,
        seen: Arc<AtomicUsize>,
    }

    impl Machine for Counter {
        type Output = usize;
        const NAME: &'static str = "counter";

        fn start(&mut self) -> Step<usize> {
            Step::Progress(vec![Msg::from([0xf0, 0x01, 0xf7])])
        }

        fn on_msg(&mut self, _msg: &Msg) -> Step<usize> {
            let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if seen == self.count {
                Step::Done(Ok(seen))
            } else {
                Step::progress()
            }
        }

        fn on_timeout(&mut self, after: Duration) -> Result<usize, Error> {
            Err(Error::Timeout(after))
        }
    }

    fn counter(count: usize) -> (Counter, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        (
            Counter {
                count,
                seen: seen.clone(),
            },
            seen,
        )
    }

    #[test]
    fn complete_once() {
        let transport = Arc::new(Loopback::default());
        let (machine, seen) = counter(2);
        let transfer = launch(transport.clone(), new_timer(), Duration::from_secs(5), machine);

        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert_eq!(transfer.phase(), Phase::Collecting);
        assert!(transfer.try_result().is_none());

        transport.deliver(Msg::from([0xf0, 0x02, 0xf7]));
        transport.deliver(Msg::from([0xf0, 0x02, 0xf7]));
        assert_eq!(transfer.phase(), Phase::Complete);
        assert!(transport.handlers.is_empty());

        // handler is gone
        transport.deliver(Msg::from([0xf0, 0x02, 0xf7]));
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        assert_eq!(transfer.wait().unwrap(), 2);
    }

    #[test]
    fn cancel_on_drop() {
        let transport = Arc::new(Loopback::default());
        let (machine, seen) = counter(2);
        let transfer = launch(transport.clone(), new_timer(), Duration::from_secs(5), machine);
        let rx = transfer.receiver().clone();

        transport.deliver(Msg::from([0xf0, 0x02, 0xf7]));
        drop(transfer);
        assert!(transport.handlers.is_empty());

        transport.deliver(Msg::from([0xf0, 0x02, 0xf7]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn inactivity_timeout() {
        let transport = Arc::new(Loopback::default());
        let (machine, _) = counter(2);
        let transfer = launch(transport.clone(), new_timer(), Duration::from_millis(50), machine);

        transport.deliver(Msg::from([0xf0, 0x02, 0xf7]));
        assert!(matches!(transfer.wait(), Err(Error::Timeout(_))));
    }
}
