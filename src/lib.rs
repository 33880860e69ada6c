//! Periodic blink and edge-reaction controller for a small pool of digital lines.
//!
//! # Overview
//!
//! The controller drives two output lines that alternate on a fixed period and,
//! in the button variant, reacts to rising edges on two input lines:
//! - Input 0 toggles a demo output and bumps the event counter
//! - Input 1 forces the demo output low
//!
//! All hardware access goes through the capability traits in [`platform`], so
//! the same state machine runs on the STM32 firmware image and under the host
//! test fake.
//!
//! # Lifecycle
//!
//! [`Controller::start`] acquires every line and interrupt binding or none of
//! them. [`Controller::stop`] always runs to completion: it disarms the timer,
//! quiesces the outputs and hands every resource back to the platform.
//!
//! # Module Organization
//!
//! - [`config`] - Load-time parameters and their parser
//! - [`platform`] - Capabilities the host platform provides
//! - [`registry`] - Ownership and bookkeeping of acquired lines
//! - [`blinker`] - Self-re-arming periodic toggle driver
//! - [`edge`] - Rising-edge reaction handler and interrupt bindings
//! - [`lifecycle`] - Start/stop orchestration and callback entry points
//! - [`error`] - Error taxonomy

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod blinker;
pub mod config;
pub mod counter;
pub mod edge;
pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod registry;

pub use config::{Config, Variant};
pub use error::{AcquireError, ConfigError, InterruptResolutionError, StartError};
pub use lifecycle::Controller;
pub use platform::{Direction, InterruptPort, Irq, Level, LineId, LinePort, Platform, Status, TimerPort};
