//! Periodic Toggle Driver.
//!
//! Alternates the two blink outputs from a one-shot platform timer that the
//! driver re-arms on every firing.
//!
//! # State Machine
//!
//! ```text
//! Disarmed --arm(period)--> Armed    schedules now + period
//! Armed    --fire-->        Armed    toggles led1/led2, schedules deadline + period
//! Armed    --disarm-->      Disarmed cancels, waits for an in-flight firing
//! ```
//!
//! The next deadline is computed from the previous *scheduled* deadline, not
//! from the time the callback actually ran. A late firing is not corrected.

use core::cell::Cell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embassy_time::{Duration, Instant};
use portable_atomic::{AtomicBool, Ordering};

use crate::platform::{LineId, LinePort, TimerPort};
use crate::registry::Registry;

/// Last levels driven onto the blink outputs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlinkLevels {
    pub led1: bool,
    pub led2: bool,
}

pub struct Blinker {
    period: Duration,
    armed: AtomicBool,
    led1: AtomicBool,
    led2: AtomicBool,
    deadline: Mutex<CriticalSectionRawMutex, Cell<Option<Instant>>>,
}

impl Blinker {
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            armed: AtomicBool::new(false),
            led1: AtomicBool::new(false),
            led2: AtomicBool::new(false),
            deadline: Mutex::new(Cell::new(None)),
        }
    }

    /// Starts the cycle with both outputs considered low. The first firing is
    /// one period from now.
    pub fn arm<T: TimerPort>(&self, timer: &T) {
        self.led1.store(false, Ordering::Release);
        self.led2.store(false, Ordering::Release);

        let first = timer.now() + self.period;
        self.deadline.lock(|d| d.set(Some(first)));
        self.armed.store(true, Ordering::Release);
        timer.schedule_at(first);

        debug!("blink timer armed, period {} s", self.period.as_secs());
    }

    /// Timer callback body.
    ///
    /// Toggles led1 onto `outputs[0]` and led2 onto `outputs[1]`, then
    /// schedules the next firing. Returns `false` without touching anything
    /// if the driver is disarmed.
    pub fn fire<P: LinePort + TimerPort>(&self, platform: &P, registry: &Registry, outputs: [LineId; 2]) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            trace!("blink timer fired while disarmed");
            return false;
        }

        let led1 = !self.led1.fetch_not(Ordering::AcqRel);
        registry.set_level(platform, outputs[0], led1);
        let led2 = !self.led2.fetch_not(Ordering::AcqRel);
        registry.set_level(platform, outputs[1], led2);

        let next = self.deadline.lock(|d| {
            let next = d.get().unwrap_or_else(|| platform.now()) + self.period;
            d.set(Some(next));
            next
        });
        platform.schedule_at(next);
        true
    }

    /// Stops the cycle. When this returns no firing is in progress and none
    /// will toggle the outputs.
    pub fn disarm<T: TimerPort>(&self, timer: &T) {
        if self.armed.swap(false, Ordering::AcqRel) {
            timer.cancel_and_wait();
            self.deadline.lock(|d| d.set(None));
            debug!("blink timer disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn levels(&self) -> BlinkLevels {
        BlinkLevels {
            led1: self.led1.load(Ordering::Acquire),
            led2: self.led2.load(Ordering::Acquire),
        }
    }

    /// Deadline of the pending firing, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.lock(|d| d.get())
    }
}
