//! In-memory platform for host tests.
//!
//! Models a pool of lines `0..LINE_POOL`, interrupt numbers offset from the
//! line id, and a one-shot timer whose clock only moves when a test calls
//! [`FakePlatform::run_for`]. Bookkeeping mistakes in the controller (double
//! free, double unbind, writes to unowned lines) panic here.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::vec::Vec;

use embassy_time::{Duration, Instant};

use super::{Direction, InterruptPort, Irq, LineId, LinePort, Status, TimerPort};

pub const LINE_POOL: i32 = 32;
const IRQ_BASE: i32 = 100;

struct Line {
    owner: Option<&'static str>,
    input: bool,
    level: bool,
}

struct State {
    lines: BTreeMap<i32, Line>,
    requests: usize,
    fail_request_at: Option<usize>,
    fail_resolve: Option<LineId>,
    fail_bind: Option<LineId>,
    bound: Vec<Irq>,
    now: Instant,
    pending: Option<Instant>,
    cancels: usize,
    busy_waits: usize,
}

pub struct FakePlatform {
    state: Mutex<State>,
    firing: Mutex<()>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let lines = (0..LINE_POOL)
            .map(|id| (id, Line { owner: None, input: false, level: false }))
            .collect();
        Self {
            state: Mutex::new(State {
                lines,
                requests: 0,
                fail_request_at: None,
                fail_resolve: None,
                fail_bind: None,
                bound: Vec::new(),
                now: Instant::from_ticks(0),
                pending: None,
                cancels: 0,
                busy_waits: 0,
            }),
            firing: Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Makes the `k`-th line request (1-based, counted from creation) fail.
    pub fn fail_request_at(&self, k: usize) {
        self.state().fail_request_at = Some(k);
    }

    pub fn fail_resolve(&self, line: i32) {
        self.state().fail_resolve = Some(LineId(line));
    }

    pub fn fail_bind(&self, line: i32) {
        self.state().fail_bind = Some(LineId(line));
    }

    /// Marks a line as claimed by someone else.
    pub fn claim(&self, line: i32) {
        self.state().lines.get_mut(&line).unwrap().owner = Some("other");
    }

    pub fn requests(&self) -> usize {
        self.state().requests
    }

    pub fn held_count(&self) -> usize {
        self.state().lines.values().filter(|l| l.owner.is_some()).count()
    }

    pub fn is_held(&self, line: i32) -> bool {
        self.state().lines.get(&line).is_some_and(|l| l.owner.is_some())
    }

    pub fn label(&self, line: i32) -> Option<&'static str> {
        self.state().lines.get(&line).and_then(|l| l.owner)
    }

    pub fn level_of(&self, line: i32) -> bool {
        self.state().lines[&line].level
    }

    /// Drives an input line from the outside.
    pub fn set_input(&self, line: i32, high: bool) {
        self.state().lines.get_mut(&line).unwrap().level = high;
    }

    pub fn bound_count(&self) -> usize {
        self.state().bound.len()
    }

    pub fn irq_of(&self, line: i32) -> Irq {
        Irq(line + IRQ_BASE)
    }

    pub fn pending(&self) -> Option<Instant> {
        self.state().pending
    }

    pub fn cancels(&self) -> usize {
        self.state().cancels
    }

    pub fn busy_waits(&self) -> usize {
        self.state().busy_waits
    }

    /// Advances the clock by `duration`, delivering every timer callback that
    /// becomes due on the way. Returns how many were delivered.
    pub fn run_for(&self, duration: Duration, mut on_timer: impl FnMut()) -> usize {
        let until = self.state().now + duration;
        let mut fired = 0;
        loop {
            let _firing = self.firing.lock().unwrap();
            {
                let mut state = self.state();
                match state.pending {
                    Some(at) if at <= until => {
                        state.pending = None;
                        state.now = at;
                    }
                    _ => {
                        state.now = until;
                        break;
                    }
                }
            }
            on_timer();
            fired += 1;
        }
        fired
    }
}

impl LinePort for FakePlatform {
    fn request(&self, line: LineId, direction: Direction, label: &'static str) -> Result<(), Status> {
        let mut state = self.state();
        state.requests += 1;
        if state.fail_request_at == Some(state.requests) {
            return Err(Status::ENXIO);
        }
        let slot = state.lines.get_mut(&line.0).ok_or(Status::EINVAL)?;
        if slot.owner.is_some() {
            return Err(Status::EBUSY);
        }
        slot.owner = Some(label);
        match direction {
            Direction::Input => slot.input = true,
            Direction::Output(level) => {
                slot.input = false;
                slot.level = level.into();
            }
        }
        Ok(())
    }

    fn free(&self, line: LineId) {
        let mut state = self.state();
        let slot = state.lines.get_mut(&line.0).unwrap();
        assert!(slot.owner.take().is_some(), "line {} freed twice", line.0);
        slot.input = false;
    }

    fn set_level(&self, line: LineId, high: bool) {
        let mut state = self.state();
        let slot = state.lines.get_mut(&line.0).unwrap();
        assert!(slot.owner.is_some() && !slot.input, "write to unowned line {}", line.0);
        slot.level = high;
    }

    fn level(&self, line: LineId) -> bool {
        self.state().lines[&line.0].level
    }
}

impl InterruptPort for FakePlatform {
    fn to_irq(&self, line: LineId) -> Result<Irq, Status> {
        let state = self.state();
        if state.fail_resolve == Some(line) {
            return Err(Status::ENXIO);
        }
        match state.lines.get(&line.0) {
            Some(slot) if slot.owner.is_some() && slot.input => Ok(Irq(line.0 + IRQ_BASE)),
            _ => Err(Status::EINVAL),
        }
    }

    fn bind(&self, irq: Irq, _label: &'static str) -> Result<(), Status> {
        let mut state = self.state();
        if state.fail_bind == Some(LineId(irq.0 - IRQ_BASE)) {
            return Err(Status::EBUSY);
        }
        if state.bound.contains(&irq) {
            return Err(Status::EBUSY);
        }
        state.bound.push(irq);
        Ok(())
    }

    fn unbind(&self, irq: Irq) {
        let mut state = self.state();
        let index = state.bound.iter().position(|b| *b == irq);
        assert!(index.is_some(), "irq {} unbound twice", irq.0);
        state.bound.retain(|b| *b != irq);
    }

    fn busy_wait(&self, _duration: Duration) {
        self.state().busy_waits += 1;
    }
}

impl TimerPort for FakePlatform {
    fn now(&self) -> Instant {
        self.state().now
    }

    fn schedule_at(&self, at: Instant) {
        self.state().pending = Some(at);
    }

    fn cancel_and_wait(&self) {
        let _firing = self.firing.lock().unwrap();
        let mut state = self.state();
        state.pending = None;
        state.cancels += 1;
    }
}
