//! Capabilities consumed from the host platform.
//!
//! The controller never touches hardware directly. It asks the platform to
//! hand out lines, map them to interrupt numbers, and schedule one-shot timer
//! callbacks. Callbacks flow back the other way: the platform invokes
//! [`Controller::on_timer`](crate::Controller::on_timer) and
//! [`Controller::on_interrupt`](crate::Controller::on_interrupt) from its own
//! execution contexts.
//!
//! Every method takes `&self`: the platform is shared between the lifecycle
//! caller, the timer context and the interrupt context, so implementations
//! provide their own interior mutability.

use core::fmt;

use embassy_time::{Duration, Instant};

#[cfg(test)]
pub mod fake;

/// Platform identifier of a digital line.
///
/// Negative values never name a real line; `-1` is the "not configured"
/// default for line parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineId(pub i32);

impl LineId {
    /// Placeholder used until the caller supplies a real identifier.
    pub const UNSET: LineId = LineId(-1);
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical level of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    #[default]
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

/// Requested direction when acquiring a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Input,
    /// Output, driven to the given level as part of the request.
    Output(Level),
}

/// Platform interrupt number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Irq(pub i32);

/// Errno-style status code reported by the platform on failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(pub i32);

impl Status {
    /// No such device or address.
    pub const ENXIO: Status = Status(-6);
    /// Out of table space.
    pub const ENOMEM: Status = Status(-12);
    /// Resource already claimed.
    pub const EBUSY: Status = Status(-16);
    /// Invalid identifier.
    pub const EINVAL: Status = Status(-22);
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Line acquisition and line IO.
pub trait LinePort {
    /// Claims a line in the given direction. Outputs are driven to their
    /// initial level before this returns.
    fn request(&self, line: LineId, direction: Direction, label: &'static str) -> Result<(), Status>;

    /// Returns a previously requested line to the platform.
    ///
    /// Freeing a line twice is undefined; callers keep their own books.
    fn free(&self, line: LineId);

    /// Drives an output line.
    ///
    /// # Arguments
    ///
    /// * `line` - A line previously requested as an output
    /// * `high` - `true` drives the line high, `false` low
    fn set_level(&self, line: LineId, high: bool);

    /// Samples a line.
    ///
    /// # Arguments
    ///
    /// * `line` - A line previously requested in either direction
    ///
    /// # Returns
    ///
    /// `true` if the line reads high. Outputs report the driven level.
    fn level(&self, line: LineId) -> bool;
}

/// Interrupt resolution and binding.
///
/// A bound interrupt fires on rising edges only. The platform delivers it by
/// calling [`Controller::on_interrupt`](crate::Controller::on_interrupt) with
/// the number returned from [`to_irq`](InterruptPort::to_irq).
pub trait InterruptPort {
    /// Maps an input line to the interrupt number that reports its edges.
    ///
    /// # Arguments
    ///
    /// * `line` - A line previously requested as an input
    ///
    /// # Errors
    ///
    /// The platform's status if the line has no interrupt or its interrupt
    /// is routed elsewhere.
    fn to_irq(&self, line: LineId) -> Result<Irq, Status>;

    /// Enables rising-edge delivery for `irq`.
    ///
    /// # Arguments
    ///
    /// * `irq` - Number returned from [`to_irq`](InterruptPort::to_irq)
    /// * `label` - Owner name shown by the platform's diagnostics
    ///
    /// # Errors
    ///
    /// The platform's status if the interrupt is already bound or cannot be
    /// enabled.
    fn bind(&self, irq: Irq, label: &'static str) -> Result<(), Status>;

    /// Disables delivery for a bound interrupt. Once this returns, no further
    /// callback for `irq` starts.
    ///
    /// # Arguments
    ///
    /// * `irq` - A number bound with [`bind`](InterruptPort::bind)
    fn unbind(&self, irq: Irq);

    /// Spins for `duration` without yielding. Safe to call from interrupt
    /// context.
    fn busy_wait(&self, duration: Duration);
}

/// One-shot timer callbacks.
///
/// The platform does not repeat a callback on its own; the driver re-arms
/// from inside [`Controller::on_timer`](crate::Controller::on_timer).
pub trait TimerPort {
    /// Current time on the clock `schedule_at` deadlines are measured in.
    fn now(&self) -> Instant;

    /// Schedules the next callback, replacing any pending one.
    fn schedule_at(&self, at: Instant);

    /// Cancels the pending callback and blocks until an in-flight callback,
    /// if any, has returned.
    fn cancel_and_wait(&self);
}

/// Everything the controller needs from a host platform.
pub trait Platform: LinePort + InterruptPort + TimerPort {}

impl<T: LinePort + InterruptPort + TimerPort> Platform for T {}
