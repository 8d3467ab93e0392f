//! The MIDI transport the device sessions talk through.
//!
//! A [`Transport`] sends messages immediately and hands every inbound
//! message to the handlers currently registered. Handlers run on the
//! transport's delivery context, e.g. the midir callback thread, and may
//! register or remove handlers, including themselves.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use crate::midi::{self, PortName};

pub mod live;
pub use live::MidiTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub type Handler = Box<dyn FnMut(&PortName, &midi::Msg) + Send>;

/// Inbound messages are handed to the handlers in arrival order, one at a
/// time, even if the transport receives them from several threads.
pub trait Transport: Send + Sync + 'static {
    /// Sends `msg` without waiting for any answer from the device.
    fn send(&self, msg: &midi::Msg) -> Result<(), midi::Error>;

    /// Registers `handler` under `id`, replacing any handler with the same `id`.
    fn register_handler(&self, id: HandlerId, handler: Handler);

    fn remove_handler(&self, id: HandlerId);
}

#[derive(Default)]
struct Inbound {
    /// A dispatch is delivering the queue.
    busy: bool,
    queue: VecDeque<(PortName, midi::Msg)>,
}

/// Clears the busy flag if a handler panics.
struct Delivering<'a>(&'a Mutex<Inbound>);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            if let Ok(mut inbound) = self.0.lock() {
                inbound.busy = false;
            }
        }
    }
}

/// Handlers registry which can be mutated while dispatching.
#[derive(Default)]
pub struct Handlers {
    map: Mutex<BTreeMap<HandlerId, Arc<Mutex<Handler>>>>,
    inbound: Mutex<Inbound>,
}

impl Handlers {
    pub fn register(&self, id: HandlerId, handler: Handler) {
        let prev = self
            .map
            .lock()
            .unwrap()
            .insert(id, Arc::new(Mutex::new(handler)));

        if prev.is_some() {
            log::debug!("Replaced MIDI handler {id:?}");
        }
    }

    pub fn remove(&self, id: HandlerId) {
        self.map.lock().unwrap().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().unwrap().is_empty()
    }

    /// Hands `msg` to each registered handler, in registration id order.
    ///
    /// A message received while another one is being handled, from a
    /// handler or from another thread, is queued & handled next by the
    /// ongoing dispatch.
    pub fn dispatch(&self, port: &PortName, msg: &midi::Msg) {
        log::trace!("Received {} from {port}", msg.display());

        {
            let mut inbound = self.inbound.lock().unwrap();
            inbound.queue.push_back((port.clone(), msg.clone()));
            if inbound.busy {
                return;
            }
            inbound.busy = true;
        }

        let _delivering = Delivering(&self.inbound);
        loop {
            let next = {
                let mut inbound = self.inbound.lock().unwrap();
                let next = inbound.queue.pop_front();
                if next.is_none() {
                    inbound.busy = false;
                }
                next
            };

            match next {
                Some((port, msg)) => self.deliver(&port, &msg),
                None => break,
            }
        }
    }

    fn deliver(&self, port: &PortName, msg: &midi::Msg) {
        // The registry lock must not be held while a handler runs.
        let snapshot: Vec<(HandlerId, Arc<Mutex<Handler>>)> = self
            .map
            .lock()
            .unwrap()
            .iter()
            .map(|(id, handler)| (*id, handler.clone()))
            .collect();

        for (id, handler) in snapshot {
            if !self.map.lock().unwrap().contains_key(&id) {
                // removed by a previous handler
                continue;
            }

            match handler.lock() {
                Ok(mut handler) => handler(port, msg),
                Err(_) => {
                    log::error!("MIDI handler {id:?} poisoned, removing it");
                    self.remove(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> midi::Msg {
        midi::Msg::from([0xf0, 0x01, 0xf7])
    }

    #[test]
    fn dispatch_to_all() {
        let handlers = Handlers::default();
        let count = Arc::new(Mutex::new(0));

        for _ in 0..3 {
            let count = count.clone();
            handlers.register(
                HandlerId::next(),
                Box::new(move |_, _| *count.lock().unwrap() += 1),
            );
        }

        handlers.dispatch(&"port".into(), &msg());
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn same_id_replaces() {
        let handlers = Handlers::default();
        let id = HandlerId::next();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let first = hits.clone();
        handlers.register(id, Box::new(move |_, _| first.lock().unwrap().push(1)));
        let second = hits.clone();
        handlers.register(id, Box::new(move |_, _| second.lock().unwrap().push(2)));

        handlers.dispatch(&"port".into(), &msg());
        assert_eq!(*hits.lock().unwrap(), vec![2]);
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn handler_removes_itself_and_others() {
        let handlers = Arc::new(Handlers::default());
        let first = HandlerId::next();
        let second = HandlerId::next();
        let hits = Arc::new(Mutex::new(0));

        let registry = handlers.clone();
        handlers.register(
            first,
            Box::new(move |_, _| {
                registry.remove(first);
                registry.remove(second);
            }),
        );
        let second_hits = hits.clone();
        handlers.register(
            second,
            Box::new(move |_, _| *second_hits.lock().unwrap() += 1),
        );

        handlers.dispatch(&"port".into(), &msg());
        assert_eq!(*hits.lock().unwrap(), 0);
        assert!(handlers.is_empty());

        // Nothing left to call.
        handlers.dispatch(&"port".into(), &msg());
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn reentrant_dispatch_is_queued() {
        let handlers = Arc::new(Handlers::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let registry = handlers.clone();
        let sink = seen.clone();
        handlers.register(
            HandlerId::next(),
            Box::new(move |port, msg| {
                sink.lock().unwrap().push(msg[1]);
                if msg[1] == 0x01 {
                    registry.dispatch(port, &midi::Msg::from([0xf0, 0x02, 0xf7]));
                    // handled after this one
                    assert_eq!(*sink.lock().unwrap(), vec![0x01]);
                }
            }),
        );

        handlers.dispatch(&"port".into(), &msg());
        assert_eq!(*seen.lock().unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn concurrent_deliveries_keep_order() {
        let handlers = Arc::new(Handlers::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        handlers.register(
            HandlerId::next(),
            Box::new(move |_, msg| sink.lock().unwrap().push(msg[1])),
        );

        let threads: Vec<_> = (0..2u8)
            .map(|thread| {
                let handlers = handlers.clone();
                std::thread::spawn(move || {
                    for idx in 0..50u8 {
                        let msg = midi::Msg::from([0xf0, thread * 50 + idx, 0xf7]);
                        handlers.dispatch(&"port".into(), &msg);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 100);
        for thread in 0..2u8 {
            let from_thread: Vec<u8> = seen.iter().copied().filter(|val| val / 50 == thread).collect();
            assert_eq!(from_thread, (thread * 50..thread * 50 + 50).collect::<Vec<u8>>());
        }
    }
}
