//! Single-threaded signal bus.
//!
//! Listeners run in subscription order. A listener returning
//! [`Propagation::Stop`] halts delivery and the publisher treats the signal as
//! vetoed; for [`Signal::PreSettlement`] that means the host skips settlement.

use crate::domain::clock::SimClock;
use crate::domain::error::IncrementalError;
use crate::domain::event::Signal;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

pub trait EventListener {
    fn on_signal(
        &mut self,
        signal: &Signal,
        clock: &mut SimClock,
    ) -> Result<Propagation, IncrementalError>;
}

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Rc<RefCell<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Rc<RefCell<dyn EventListener>>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn publish(
        &self,
        signal: &Signal,
        clock: &mut SimClock,
    ) -> Result<Propagation, IncrementalError> {
        for listener in &self.listeners {
            let mut listener = listener
                .try_borrow_mut()
                .map_err(|_| IncrementalError::Lifecycle {
                    reason: format!("listener re-entered while handling {}", signal.name()),
                })?;
            if listener.on_signal(signal, clock)? == Propagation::Stop {
                return Ok(Propagation::Stop);
            }
        }
        Ok(Propagation::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct Counter {
        seen: Vec<&'static str>,
        veto: bool,
    }

    impl EventListener for Counter {
        fn on_signal(
            &mut self,
            signal: &Signal,
            _clock: &mut SimClock,
        ) -> Result<Propagation, IncrementalError> {
            self.seen.push(signal.name());
            Ok(if self.veto {
                Propagation::Stop
            } else {
                Propagation::Continue
            })
        }
    }

    fn clock() -> SimClock {
        SimClock::new(
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        )
    }

    #[test]
    fn delivers_in_order_until_stopped() {
        let first = Rc::new(RefCell::new(Counter { seen: vec![], veto: true }));
        let second = Rc::new(RefCell::new(Counter { seen: vec![], veto: false }));
        let mut bus = EventBus::new();
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        let mut clock = clock();
        let result = bus.publish(&Signal::SystemInitialized, &mut clock).unwrap();

        assert_eq!(result, Propagation::Stop);
        assert_eq!(first.borrow().seen, vec!["system_initialized"]);
        assert!(second.borrow().seen.is_empty());
    }

    #[test]
    fn empty_bus_continues() {
        let bus = EventBus::new();
        let mut clock = clock();
        assert_eq!(
            bus.publish(&Signal::StateRestored, &mut clock).unwrap(),
            Propagation::Continue
        );
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn borrowed_listener_is_a_lifecycle_error() {
        let listener = Rc::new(RefCell::new(Counter { seen: vec![], veto: false }));
        let mut bus = EventBus::new();
        bus.subscribe(listener.clone());

        let _held = listener.borrow_mut();
        let mut clock = clock();
        let err = bus.publish(&Signal::StateRestored, &mut clock).unwrap_err();
        assert!(matches!(err, IncrementalError::Lifecycle { .. }));
    }
}
