//! Error taxonomy.
//!
//! Only start-up can fail. Once the controller runs, timer and edge callbacks
//! always succeed from its point of view, and teardown only logs.

use core::fmt;

use crate::config::Param;
use crate::platform::{LineId, Status};

/// A requested line could not be obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AcquireError {
    pub line: LineId,
    pub status: Status,
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unable to request line {}: {}", self.line, self.status)
    }
}

/// A line could not be mapped to an interrupt number, or the number could
/// not be bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptResolutionError {
    Resolve { line: LineId, status: Status },
    Bind { line: LineId, status: Status },
}

impl InterruptResolutionError {
    pub fn status(&self) -> Status {
        match *self {
            Self::Resolve { status, .. } | Self::Bind { status, .. } => status,
        }
    }
}

impl fmt::Display for InterruptResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve { line, status } => {
                write!(f, "unable to map line {line} to an interrupt: {status}")
            }
            Self::Bind { line, status } => {
                write!(f, "unable to bind interrupt for line {line}: {status}")
            }
        }
    }
}

/// Why [`Controller::start`](crate::Controller::start) failed.
///
/// Each variant names the stage that failed; everything acquired before that
/// stage has already been released when the error is returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    /// The controller is already running.
    AlreadyStarted,
    /// One of the two blink outputs.
    BlinkOutputs(AcquireError),
    /// The demo LED group.
    DemoLed(AcquireError),
    /// The button group.
    Buttons(AcquireError),
    /// Resolving or binding the interrupt of button `input`.
    Interrupt { input: u8, error: InterruptResolutionError },
}

impl StartError {
    /// Platform status code for callers that report plain integers.
    pub fn status(&self) -> Status {
        match self {
            Self::AlreadyStarted => Status::EBUSY,
            Self::BlinkOutputs(e) | Self::DemoLed(e) | Self::Buttons(e) => e.status,
            Self::Interrupt { error, .. } => error.status(),
        }
    }
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => f.write_str("controller already started"),
            Self::BlinkOutputs(e) => write!(f, "blink outputs: {e}"),
            Self::DemoLed(e) => write!(f, "demo LED: {e}"),
            Self::Buttons(e) => write!(f, "buttons: {e}"),
            Self::Interrupt { input, error } => write!(f, "button {input}: {error}"),
        }
    }
}

/// A load-time parameter string could not be parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A known parameter appeared without `=value`.
    MissingValue(Param),
    /// The value is not an integer in range.
    InvalidInteger(Param),
    /// An array parameter got more values than it holds.
    TooManyValues { param: Param, max: usize },
    /// `speed` must be at least one second.
    NonPositivePeriod(i32),
    /// `variant` is neither `blink` nor `buttons`.
    UnknownVariant,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingValue(p) => write!(f, "parameter '{}' needs a value", p.name()),
            Self::InvalidInteger(p) => write!(f, "parameter '{}' is not a valid integer", p.name()),
            Self::TooManyValues { param, max } => {
                write!(f, "parameter '{}' takes at most {max} values", param.name())
            }
            Self::NonPositivePeriod(v) => write!(f, "speed must be positive, got {v}"),
            Self::UnknownVariant => f.write_str("variant must be 'blink' or 'buttons'"),
        }
    }
}
