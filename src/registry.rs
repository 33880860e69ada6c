//! Line Registry.
//!
//! Sole owner of every line the controller has acquired. The blink driver and
//! the edge handler only ever address lines by id through the registry, which
//! drops writes to lines it does not hold. That keeps a late callback from
//! touching a line that teardown already handed back.
//!
//! The table sits behind a critical-section mutex: it is mutated from the
//! lifecycle caller and read from timer and interrupt context. Every section
//! is bounded (one table scan plus at most one platform call).

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{Mutex, raw::CriticalSectionRawMutex};
use heapless::Vec;

use crate::error::AcquireError;
use crate::platform::{Direction, Level, LineId, LinePort, Status};

/// Upper bound on simultaneously held lines: two blink outputs, one demo LED,
/// two buttons, with headroom.
pub const MAX_LINES: usize = 8;

/// One acquired line.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineHandle {
    pub id: LineId,
    pub direction: Direction,
    /// Last level written. Only meaningful for outputs.
    pub level: bool,
    pub label: &'static str,
}

/// Request for one member of a line group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSpec {
    pub id: LineId,
    pub direction: Direction,
    pub label: &'static str,
}

impl LineSpec {
    pub const fn output(id: LineId, level: Level, label: &'static str) -> Self {
        Self { id, direction: Direction::Output(level), label }
    }

    pub const fn input(id: LineId, label: &'static str) -> Self {
        Self { id, direction: Direction::Input, label }
    }
}

/// Result of a failed pair acquisition.
///
/// `acquired` lists the members that did succeed; the caller owns undoing
/// them.
#[derive(Debug, PartialEq, Eq)]
pub struct PartialAcquire {
    pub error: AcquireError,
    pub acquired: Vec<LineId, 2>,
}

pub struct Registry {
    lines: Mutex<CriticalSectionRawMutex, RefCell<Vec<LineHandle, MAX_LINES>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            lines: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Acquires a single line.
    ///
    /// # Errors
    ///
    /// Fails with the platform's status, with [`Status::EBUSY`] if the
    /// registry already holds the line, or [`Status::ENOMEM`] if the table is
    /// full.
    pub fn acquire<P: LinePort>(&self, port: &P, spec: LineSpec) -> Result<LineId, AcquireError> {
        let fail = |status| AcquireError { line: spec.id, status };

        if self.holds(spec.id) {
            return Err(fail(Status::EBUSY));
        }
        if self.lines.lock(|lines| lines.borrow().is_full()) {
            return Err(fail(Status::ENOMEM));
        }

        port.request(spec.id, spec.direction, spec.label).map_err(fail)?;

        let handle = LineHandle {
            id: spec.id,
            direction: spec.direction,
            level: matches!(spec.direction, Direction::Output(Level::High)),
            label: spec.label,
        };
        self.lines.lock(|lines| {
            // capacity was checked above and only the lifecycle caller inserts
            let _ = lines.borrow_mut().push(handle);
        });

        debug!("acquired line {} ({})", spec.id.0, spec.label);
        Ok(spec.id)
    }

    /// Requests two output lines, both driven to `level`.
    ///
    /// Both requests are attempted even if the first fails. There is no
    /// rollback across the pair: on failure the ids that were acquired are
    /// returned alongside the first error, and remain held.
    pub fn acquire_outputs<P: LinePort>(
        &self,
        port: &P,
        ids: [LineId; 2],
        labels: [&'static str; 2],
        level: Level,
    ) -> Result<[LineId; 2], PartialAcquire> {
        let first = self.acquire(port, LineSpec::output(ids[0], level, labels[0]));
        let second = self.acquire(port, LineSpec::output(ids[1], level, labels[1]));

        match (first, second) {
            (Ok(a), Ok(b)) => Ok([a, b]),
            (first, second) => {
                let mut acquired = Vec::new();
                let mut error = None;
                for result in [first, second] {
                    match result {
                        Ok(id) => {
                            let _ = acquired.push(id);
                        }
                        Err(e) => {
                            error!("Unable to request GPIOs: {}", e.status.0);
                            error.get_or_insert(e);
                        }
                    }
                }
                // at least one of the two failed to reach this arm
                let error = error.unwrap_or(AcquireError { line: ids[0], status: Status::EINVAL });
                Err(PartialAcquire { error, acquired })
            }
        }
    }

    /// Acquires a group of lines as a unit.
    ///
    /// On failure, members acquired so far are released before returning, so
    /// none of the group is held.
    pub fn acquire_set<P: LinePort>(&self, port: &P, specs: &[LineSpec]) -> Result<(), AcquireError> {
        for (i, spec) in specs.iter().enumerate() {
            if let Err(e) = self.acquire(port, *spec) {
                for done in specs[..i].iter().rev() {
                    self.release(port, done.id);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Writes an output. Returns `false` (and writes nothing) if the line is
    /// not held as an output.
    pub fn set_level<P: LinePort>(&self, port: &P, id: LineId, high: bool) -> bool {
        self.lines.lock(|lines| {
            let mut lines = lines.borrow_mut();
            match lines
                .iter_mut()
                .find(|h| h.id == id && matches!(h.direction, Direction::Output(_)))
            {
                Some(handle) => {
                    port.set_level(id, high);
                    handle.level = high;
                    true
                }
                None => false,
            }
        })
    }

    /// Reads a held line from the platform. Lines not held read low.
    pub fn level<P: LinePort>(&self, port: &P, id: LineId) -> bool {
        self.lines.lock(|lines| {
            let held = lines.borrow().iter().any(|h| h.id == id);
            held && port.level(id)
        })
    }

    /// Returns one line to the platform. Releasing a line the registry does
    /// not hold is a no-op.
    pub fn release<P: LinePort>(&self, port: &P, id: LineId) -> bool {
        let removed = self.lines.lock(|lines| {
            let mut lines = lines.borrow_mut();
            match lines.iter().position(|h| h.id == id) {
                Some(index) => {
                    lines.remove(index);
                    port.free(id);
                    true
                }
                None => false,
            }
        });
        if !removed {
            warn!("line {} is not held, not releasing", id.0);
        }
        removed
    }

    pub fn release_set<P: LinePort>(&self, port: &P, ids: &[LineId]) {
        for id in ids.iter().rev() {
            self.release(port, *id);
        }
    }

    /// Releases every held line, most recently acquired first.
    pub fn release_all<P: LinePort>(&self, port: &P) {
        while let Some(handle) = self.lines.lock(|lines| lines.borrow_mut().pop()) {
            port.free(handle.id);
            debug!("released line {} ({})", handle.id.0, handle.label);
        }
    }

    /// Drives every held output low.
    pub fn drive_outputs_low<P: LinePort>(&self, port: &P) {
        self.lines.lock(|lines| {
            for handle in lines.borrow_mut().iter_mut() {
                if matches!(handle.direction, Direction::Output(_)) {
                    port.set_level(handle.id, false);
                    handle.level = false;
                }
            }
        });
    }

    /// Number of lines in the table.
    pub fn held(&self) -> usize {
        self.lines.lock(|lines| lines.borrow().len())
    }

    /// Whether `id` is in the table, in either direction.
    pub fn holds(&self, id: LineId) -> bool {
        self.lines.lock(|lines| lines.borrow().iter().any(|h| h.id == id))
    }

    /// Last level written to a held output.
    pub fn last_written(&self, id: LineId) -> Option<bool> {
        self.lines.lock(|lines| lines.borrow().iter().find(|h| h.id == id).map(|h| h.level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;

    fn out(id: i32, label: &'static str) -> LineSpec {
        LineSpec::output(LineId(id), Level::Low, label)
    }

    #[test]
    fn acquire_drives_outputs_to_initial_level() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        registry.acquire(&port, LineSpec::output(LineId(2), Level::High, "led")).unwrap();
        assert!(port.level_of(2));
        assert_eq!(registry.last_written(LineId(2)), Some(true));
        assert_eq!(port.label(2), Some("led"));
    }

    #[test]
    fn acquire_outputs_reports_partial_success() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        let err = registry
            .acquire_outputs(&port, [LineId(2), LineId(99)], ["led1", "led2"], Level::Low)
            .unwrap_err();
        assert_eq!(err.error, AcquireError { line: LineId(99), status: Status::EINVAL });
        assert_eq!(&err.acquired[..], &[LineId(2)]);
        // no implicit rollback
        assert!(port.is_held(2));
        assert_eq!(registry.held(), 1);
    }

    #[test]
    fn acquire_outputs_attempts_both_lines() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        let err = registry
            .acquire_outputs(&port, [LineId(-1), LineId(3)], ["led1", "led2"], Level::Low)
            .unwrap_err();
        assert_eq!(err.error.line, LineId(-1));
        assert_eq!(&err.acquired[..], &[LineId(3)]);
        assert_eq!(port.requests(), 2);
    }

    #[test]
    fn acquire_set_is_all_or_nothing() {
        let port = FakePlatform::new();
        port.claim(7);
        let registry = Registry::new();
        let err = registry
            .acquire_set(&port, &[out(5, "a"), out(6, "b"), out(7, "c")])
            .unwrap_err();
        assert_eq!(err, AcquireError { line: LineId(7), status: Status::EBUSY });
        assert_eq!(registry.held(), 0);
        assert!(!registry.holds(LineId(5)));
        assert!(!port.is_held(5));
        assert!(!port.is_held(6));
    }

    #[test]
    fn refuses_duplicate_and_overflow() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        registry.acquire(&port, out(1, "a")).unwrap();
        assert_eq!(
            registry.acquire(&port, LineSpec::input(LineId(1), "a")).unwrap_err().status,
            Status::EBUSY
        );
        // refused before the platform is asked
        assert_eq!(port.requests(), 1);
        for id in 2..=MAX_LINES as i32 {
            registry.acquire(&port, out(id, "x")).unwrap();
        }
        assert_eq!(
            registry.acquire(&port, out(20, "x")).unwrap_err().status,
            Status::ENOMEM
        );
        assert!(!port.is_held(20));
    }

    #[test]
    fn writes_only_reach_held_outputs() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        registry.acquire(&port, out(2, "led")).unwrap();
        registry.acquire(&port, LineSpec::input(LineId(3), "button")).unwrap();

        assert!(registry.set_level(&port, LineId(2), true));
        assert!(port.level_of(2));
        assert!(!registry.set_level(&port, LineId(3), true));
        assert!(!registry.set_level(&port, LineId(4), true));
    }

    #[test]
    fn level_reads_through_to_platform() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        registry.acquire(&port, LineSpec::input(LineId(3), "button")).unwrap();
        port.set_input(3, true);
        assert!(registry.level(&port, LineId(3)));
        port.set_input(9, true);
        assert!(!registry.level(&port, LineId(9)));
    }

    #[test]
    fn release_is_guarded_by_bookkeeping() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        registry.acquire(&port, out(2, "led")).unwrap();
        assert!(registry.holds(LineId(2)));
        assert!(registry.release(&port, LineId(2)));
        assert!(!registry.holds(LineId(2)));
        // a second release would panic in the fake if it reached the platform
        assert!(!registry.release(&port, LineId(2)));
        assert_eq!(port.held_count(), 0);
    }

    #[test]
    fn teardown_quiesces_and_releases_everything() {
        let port = FakePlatform::new();
        let registry = Registry::new();
        registry
            .acquire_set(&port, &[LineSpec::output(LineId(2), Level::High, "a"), out(3, "b")])
            .unwrap();
        registry.acquire(&port, LineSpec::input(LineId(4), "c")).unwrap();
        registry.set_level(&port, LineId(3), true);

        registry.drive_outputs_low(&port);
        assert!(!port.level_of(2));
        assert!(!port.level_of(3));

        registry.release_set(&port, &[LineId(4)]);
        registry.release_all(&port);
        assert_eq!(registry.held(), 0);
        assert_eq!(port.held_count(), 0);
    }
}
