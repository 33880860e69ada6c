//! Edge Reaction Handler.
//!
//! Two input lines are bound to platform interrupts, rising edge only:
//!
//! - **Input 0** toggles the demo output and bumps the event counter. When
//!   the `ioEdge` parameter equals the input's line id, the count is logged.
//! - **Input 1** forces the demo output low.
//!
//! Both branches end with a short busy-wait ([`STORM_GUARD`]) so a bouncing
//! contact cannot monopolise the interrupt dispatcher.
//!
//! Platforms that cannot run reactions in interrupt context hand interrupt
//! numbers to a task through an [`EdgeQueue`].
//!
//! The demo level (`led3`) is an atomic flag. It is flipped with a single
//! read-modify-write, so two edges racing each other cannot lose an update.

use core::cell::RefCell;

use embassy_sync::{
    blocking_mutex::{Mutex, raw::CriticalSectionRawMutex},
    channel::Channel,
};
use embassy_time::Duration;
use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::counter::EventCounter;
use crate::error::InterruptResolutionError;
use crate::platform::{InterruptPort, Irq, LineId, LinePort, Status};
use crate::registry::Registry;

/// Busy-wait at the end of every edge reaction.
pub const STORM_GUARD: Duration = Duration::from_micros(500);

/// What an input does when it sees a rising edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Input 0: toggle the demo output, count the edge.
    Toggle,
    /// Input 1: force the demo output low.
    Clear,
}

impl Role {
    pub const fn input(self) -> u8 {
        match self {
            Role::Toggle => 0,
            Role::Clear => 1,
        }
    }

    const fn irq_label(self) -> &'static str {
        match self {
            Role::Toggle => "clargmod button 0",
            Role::Clear => "clargmod button 1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    RisingEdge,
}

/// An input line bound to an interrupt number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptBinding {
    pub source: LineId,
    pub irq: Irq,
    pub trigger: Trigger,
    pub role: Role,
}

/// Outcome of one interrupt, for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reaction {
    Toggled { level: bool, count: u32 },
    Cleared { was_high: bool },
    /// The interrupt number is not one of ours.
    Ignored,
}

/// Everything an edge reaction touches besides the handler's own state.
pub struct EdgeContext<'a, P> {
    pub platform: &'a P,
    pub registry: &'a Registry,
    pub counter: &'a EventCounter,
    pub demo: LineId,
    pub edge_selector: i32,
}

pub struct EdgeHandler {
    led3: AtomicBool,
    bindings: Mutex<CriticalSectionRawMutex, RefCell<Vec<InterruptBinding, 2>>>,
}

impl Default for EdgeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeHandler {
    pub const fn new() -> Self {
        Self {
            led3: AtomicBool::new(false),
            bindings: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Resolves `source` to an interrupt number and binds it.
    ///
    /// `source` must already be held as an input.
    pub fn bind<P: InterruptPort>(&self, port: &P, source: LineId, role: Role) -> Result<Irq, InterruptResolutionError> {
        let irq = port
            .to_irq(source)
            .map_err(|status| InterruptResolutionError::Resolve { line: source, status })?;
        debug!("button {} on line {} mapped to irq {}", role.input(), source.0, irq.0);

        port.bind(irq, role.irq_label())
            .map_err(|status| InterruptResolutionError::Bind { line: source, status })?;

        let binding = InterruptBinding { source, irq, trigger: Trigger::RisingEdge, role };
        let stored = self.bindings.lock(|b| b.borrow_mut().push(binding).is_ok());
        if !stored {
            port.unbind(irq);
            return Err(InterruptResolutionError::Bind { line: source, status: Status::ENOMEM });
        }
        Ok(irq)
    }

    /// Unbinds one interrupt. Unknown numbers are ignored.
    pub fn unbind<P: InterruptPort>(&self, port: &P, irq: Irq) {
        let removed = self.bindings.lock(|b| {
            let mut b = b.borrow_mut();
            match b.iter().position(|binding| binding.irq == irq) {
                Some(index) => {
                    b.remove(index);
                    true
                }
                None => false,
            }
        });
        if removed {
            port.unbind(irq);
        }
    }

    /// Unbinds every interrupt, most recent first.
    pub fn unbind_all<P: InterruptPort>(&self, port: &P) {
        while let Some(binding) = self.bindings.lock(|b| b.borrow_mut().pop()) {
            port.unbind(binding.irq);
            debug!("unbound irq {}", binding.irq.0);
        }
    }

    /// Interrupt callback body. Never fails outward.
    pub fn on_interrupt<P: LinePort + InterruptPort>(&self, cx: &EdgeContext<'_, P>, irq: Irq) -> Reaction {
        let binding = self
            .bindings
            .lock(|b| b.borrow().iter().find(|binding| binding.irq == irq).copied());
        let Some(binding) = binding else {
            trace!("irq {} is not bound here", irq.0);
            return Reaction::Ignored;
        };

        let reaction = match binding.role {
            Role::Toggle => {
                let level = !self.led3.fetch_not(Ordering::AcqRel);
                cx.registry.set_level(cx.platform, cx.demo, level);
                let count = cx.counter.increment();
                if cx.edge_selector == binding.source.0 {
                    info!("count is: {}", count);
                }
                Reaction::Toggled { level, count }
            }
            Role::Clear => {
                let was_high = cx.registry.level(cx.platform, cx.demo);
                if was_high {
                    cx.registry.set_level(cx.platform, cx.demo, false);
                }
                self.led3.store(false, Ordering::Release);
                Reaction::Cleared { was_high }
            }
        };

        cx.platform.busy_wait(STORM_GUARD);
        reaction
    }

    /// Last level written to the demo output by input 0.
    pub fn led3(&self) -> bool {
        self.led3.load(Ordering::Acquire)
    }

    /// Forgets the demo level so the next input-0 edge drives it high.
    pub fn reset(&self) {
        self.led3.store(false, Ordering::Release);
    }

    pub fn bindings(&self) -> Vec<InterruptBinding, 2> {
        self.bindings.lock(|b| b.borrow().clone())
    }
}

/// Interrupt numbers posted from interrupt context, drained by a task.
///
/// Posting never blocks. An edge that finds the queue full is dropped and
/// counted; [`take_dropped`](EdgeQueue::take_dropped) reports the loss.
pub struct EdgeQueue<const N: usize> {
    edges: Channel<CriticalSectionRawMutex, Irq, N>,
    dropped: AtomicU32,
}

impl<const N: usize> Default for EdgeQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> EdgeQueue<N> {
    pub const fn new() -> Self {
        Self {
            edges: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queues one edge. Safe to call from interrupt context.
    ///
    /// # Arguments
    ///
    /// * `irq` - Interrupt number that fired
    ///
    /// # Returns
    ///
    /// `false` if the queue was full and the edge was dropped.
    pub fn post(&self, irq: Irq) -> bool {
        match self.edges.try_send(irq) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Waits for the next queued edge.
    pub async fn receive(&self) -> Irq {
        self.edges.receive().await
    }

    pub fn try_receive(&self) -> Option<Irq> {
        self.edges.try_receive().ok()
    }

    /// Edges dropped since the previous call. Resets the count.
    pub fn take_dropped(&self) -> u32 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}
