//! EXTI interrupt bindings for button inputs.
//!
//! # Interrupt Numbers
//!
//! A line's interrupt number is its EXTI line, i.e. the pin number within the
//! port. EXTI line n is shared by every port, so only one port can be routed
//! to a given line at a time (selected through SYSCFG_EXTICRx).
//!
//! # Delivery
//!
//! The EXTI handlers clear the pending bit and post the line number to
//! [`EDGES`]. [`edge_task`] drains the queue into
//! [`Controller::on_interrupt`], so the controller never runs in the ISR
//! itself.
//!
//! Rising-edge triggers only; falling-edge triggers are always cleared.

use core::cell::RefCell;
use core::ops::Range;

use clargmod::edge::EdgeQueue;
use clargmod::{Controller, InterruptPort, Irq, LineId, Status};
use embassy_stm32::pac;
use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use embassy_time::{Duration, block_for};
use pac::interrupt;

use crate::hardware::Board;

/// IMR/RTSR/FTSR/PR register index for EXTI lines 0-31
const IMR1_REG_IDX: usize = 0;

/// Number of GPIO-capable EXTI lines
const GPIO_EXTI_LINES: usize = 16;

/// Rising edges waiting for the edge task.
static EDGES: EdgeQueue<8> = EdgeQueue::new();

#[derive(Clone, Copy, Default)]
struct Route {
    /// Port most recently resolved onto this line
    port: Option<u8>,
    bound: bool,
}

/// Per-line routing state for EXTI lines 0-15.
pub struct ExtiRoutes {
    routes: Mutex<CriticalSectionRawMutex, RefCell<[Route; GPIO_EXTI_LINES]>>,
}

impl ExtiRoutes {
    pub const fn new() -> Self {
        Self {
            routes: Mutex::new(RefCell::new(
                [Route { port: None, bound: false }; GPIO_EXTI_LINES],
            )),
        }
    }
}

fn line_index(irq: Irq) -> Option<usize> {
    usize::try_from(irq.0).ok().filter(|&n| n < GPIO_EXTI_LINES)
}

/// NVIC vector serving EXTI line `n`.
fn vector_for(n: usize) -> embassy_stm32::interrupt::Interrupt {
    match n {
        0..=1 => embassy_stm32::interrupt::EXTI0_1,
        2..=3 => embassy_stm32::interrupt::EXTI2_3,
        _ => embassy_stm32::interrupt::EXTI4_15,
    }
}

impl InterruptPort for Board {
    fn to_irq(&self, line: LineId) -> Result<Irq, Status> {
        if !self.is_input(line) {
            return Err(Status::EINVAL);
        }
        let port = (line.0 / 16) as u8;
        let n = (line.0 % 16) as usize;

        self.exti.routes.lock(|routes| {
            let mut routes = routes.borrow_mut();
            let route = &mut routes[n];
            if route.bound && route.port != Some(port) {
                return Err(Status::EBUSY);
            }
            route.port = Some(port);
            Ok(Irq(n as i32))
        })
    }

    fn bind(&self, irq: Irq, _label: &'static str) -> Result<(), Status> {
        let n = line_index(irq).ok_or(Status::EINVAL)?;
        let port = self.exti.routes.lock(|routes| {
            let mut routes = routes.borrow_mut();
            let route = &mut routes[n];
            match route.port {
                _ if route.bound => Err(Status::EBUSY),
                Some(port) => {
                    route.bound = true;
                    Ok(port)
                }
                None => Err(Status::EINVAL),
            }
        })?;

        let exti = pac::EXTI;

        // Route the port onto the EXTI line
        pac::RCC.apb2enr().modify(|w| w.set_syscfgen(true));
        pac::SYSCFG
            .exticr(n / 4)
            .modify(|w| w.set_exti(n % 4, port));

        // Rising edge only, drop anything latched before the binding
        exti.rtsr(IMR1_REG_IDX).modify(|w| w.set_line(n, true));
        exti.ftsr(IMR1_REG_IDX).modify(|w| w.set_line(n, false));
        exti.pr(IMR1_REG_IDX).write(|w| w.set_line(n, true));
        exti.imr(IMR1_REG_IDX).modify(|w| w.set_line(n, true));

        unsafe {
            cortex_m::peripheral::NVIC::unmask(vector_for(n));
        };
        Ok(())
    }

    fn unbind(&self, irq: Irq) {
        let Some(n) = line_index(irq) else {
            return;
        };

        let exti = pac::EXTI;
        exti.imr(IMR1_REG_IDX).modify(|w| w.set_line(n, false));
        exti.rtsr(IMR1_REG_IDX).modify(|w| w.set_line(n, false));
        exti.pr(IMR1_REG_IDX).write(|w| w.set_line(n, true));

        self.exti.routes.lock(|routes| {
            routes.borrow_mut()[n] = Route::default();
        });
        // The shared vector stays unmasked; with IMR cleared it cannot fire
        // for this line.
    }

    fn busy_wait(&self, duration: Duration) {
        block_for(duration);
    }
}

/// Clears and forwards every pending, unmasked line in `lines`.
fn dispatch(lines: Range<usize>) {
    let exti = pac::EXTI;
    let pending = exti.pr(IMR1_REG_IDX).read();
    let enabled = exti.imr(IMR1_REG_IDX).read();

    for n in lines {
        if pending.line(n) && enabled.line(n) {
            exti.pr(IMR1_REG_IDX).write(|w| w.set_line(n, true));
            // counted by the queue and reported from the edge task
            EDGES.post(Irq(n as i32));
        }
    }
}

#[interrupt]
fn EXTI0_1() {
    dispatch(0..2);
}

#[interrupt]
fn EXTI2_3() {
    dispatch(2..4);
}

#[interrupt]
fn EXTI4_15() {
    dispatch(4..GPIO_EXTI_LINES);
}

/// Async task delivering button edges to the controller.
///
/// # Arguments
///
/// * `ctrl` - Controller shared with the timer task and `main`
#[embassy_executor::task]
pub async fn edge_task(ctrl: &'static Controller<Board>) {
    loop {
        let irq = EDGES.receive().await;
        let dropped = EDGES.take_dropped();
        if dropped > 0 {
            defmt::warn!("edge queue overflowed, {} edges dropped", dropped);
        }
        let _reaction = ctrl.on_interrupt(irq);

        #[cfg(feature = "debug-mode")]
        defmt::info!("irq {}: {}", irq.0, _reaction);
    }
}
