//! Board support: the pool of lines the controller may acquire.
//!
//! # Line Numbering
//!
//! Line id = port index * 16 + pin number:
//! - **PA0..PA15**: 0..15
//! - **PB0..PB7**: 16..23
//!
//! # Line Pool
//!
//! - **PA0** (0), **PA1** (1), **PA4** (4), **PA5** (5), **PA6** (6), **PA7** (7)
//! - **PB0** (16), **PB1** (17), **PB3** (19), **PB4** (20), **PB5** (21), **PB6** (22)
//!
//! Buttons are expected to pull the line to VDD when pressed; inputs are
//! configured with the internal pull-down.
//!
//! ## Reserved
//! - **PA13**: SWDIO
//! - **PA14**: SWCLK
//! - **PC14/PC15**: 32.768 kHz crystal

use core::cell::RefCell;

use clargmod::{Direction, LineId, LinePort, Status};
use embassy_stm32::gpio::{Flex, Level as PinLevel, Pull, Speed};
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};

use crate::exti::ExtiRoutes;

const POOL_SIZE: usize = 12;

struct Slot {
    id: LineId,
    pin: Flex<'static>,
    /// Label of the current owner, `None` while free.
    owner: Option<&'static str>,
    output: bool,
}

impl Slot {
    fn new(id: i32, pin: Flex<'static>) -> Self {
        Self {
            id: LineId(id),
            pin,
            owner: None,
            output: false,
        }
    }
}

/// Host platform for the controller on this board.
///
/// Implements [`LinePort`] here, `InterruptPort` in [`crate::exti`] and
/// `TimerPort` in [`crate::ticker`].
pub struct Board {
    slots: Mutex<CriticalSectionRawMutex, RefCell<[Slot; POOL_SIZE]>>,
    pub(crate) exti: ExtiRoutes,
}

impl Board {
    /// Takes the pool pins out of the peripheral singleton. All pins stay in
    /// their reset (analog) state until requested.
    pub fn new(p: embassy_stm32::Peripherals) -> Self {
        Self {
            slots: Mutex::new(RefCell::new([
                Slot::new(0, Flex::new(p.PA0)),
                Slot::new(1, Flex::new(p.PA1)),
                Slot::new(4, Flex::new(p.PA4)),
                Slot::new(5, Flex::new(p.PA5)),
                Slot::new(6, Flex::new(p.PA6)),
                Slot::new(7, Flex::new(p.PA7)),
                Slot::new(16, Flex::new(p.PB0)),
                Slot::new(17, Flex::new(p.PB1)),
                Slot::new(19, Flex::new(p.PB3)),
                Slot::new(20, Flex::new(p.PB4)),
                Slot::new(21, Flex::new(p.PB5)),
                Slot::new(22, Flex::new(p.PB6)),
            ])),
            exti: ExtiRoutes::new(),
        }
    }

    fn with_slot<R>(&self, line: LineId, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();
            slots.iter_mut().find(|s| s.id == line).map(f)
        })
    }

    /// Whether `line` is held as an input.
    pub(crate) fn is_input(&self, line: LineId) -> bool {
        self.with_slot(line, |slot| slot.owner.is_some() && !slot.output)
            .unwrap_or(false)
    }
}

impl LinePort for Board {
    fn request(&self, line: LineId, direction: Direction, label: &'static str) -> Result<(), Status> {
        self.with_slot(line, |slot| {
            if slot.owner.is_some() {
                return Err(Status::EBUSY);
            }
            match direction {
                Direction::Output(level) => {
                    // latch the level before the driver is enabled
                    slot.pin.set_level(PinLevel::from(bool::from(level)));
                    slot.pin.set_as_output(Speed::Low);
                    slot.output = true;
                }
                Direction::Input => {
                    slot.pin.set_as_input(Pull::Down);
                    slot.output = false;
                }
            }
            slot.owner = Some(label);
            Ok(())
        })
        .unwrap_or(Err(Status::EINVAL))
    }

    fn free(&self, line: LineId) {
        self.with_slot(line, |slot| {
            slot.pin.set_as_analog();
            slot.owner = None;
            slot.output = false;
        });
    }

    fn set_level(&self, line: LineId, high: bool) {
        self.with_slot(line, |slot| {
            if slot.output {
                slot.pin.set_level(PinLevel::from(high));
            }
        });
    }

    fn level(&self, line: LineId) -> bool {
        self.with_slot(line, |slot| {
            if slot.output {
                slot.pin.is_set_high()
            } else {
                slot.pin.is_high()
            }
        })
        .unwrap_or(false)
    }
}
