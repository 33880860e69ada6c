//! Lifecycle Controller.
//!
//! Owns every piece of runtime state (registry, blink driver, edge handler,
//! event counter) and the platform handle. Nothing lives in globals: the
//! platform receives `&Controller` and calls [`Controller::on_timer`] and
//! [`Controller::on_interrupt`] from its own contexts.
//!
//! # Start Sequence
//!
//! 1. Log the configuration
//! 2. Acquire the two blink outputs, driven low
//! 3. Arm the blink timer
//! 4. Button variant only: acquire the demo LED, acquire both buttons,
//!    resolve and bind button 0, resolve and bind button 1
//!
//! Each completed step pushes its undo action onto a stack. If a later step
//! fails the stack unwinds in reverse, timer included, so a failed start
//! leaves no line held, no timer armed and no interrupt bound.
//!
//! # Stop Sequence
//!
//! Disarm the timer (blocking), drive held outputs low, unbind interrupts,
//! release lines. Stop never fails and is safe to call in any state.

use heapless::Vec;
use portable_atomic::{AtomicBool, Ordering};

use crate::blinker::{BlinkLevels, Blinker};
use crate::config::{Config, Variant};
use crate::counter::EventCounter;
use crate::edge::{EdgeContext, EdgeHandler, Reaction, Role};
use crate::error::StartError;
use crate::platform::{Irq, Level, LineId, Platform};
use crate::registry::{LineSpec, Registry};

/// Snapshot of the three driven flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ToggleState {
    pub led1: bool,
    pub led2: bool,
    pub led3: bool,
}

enum Undo {
    Line(LineId),
    Timer,
    Binding(Irq),
}

/// Two blink outputs, the timer, one demo LED, two buttons, two bindings.
const UNDO_DEPTH: usize = 8;

/// Undo stack for a start attempt. Dropping it undoes everything pushed,
/// newest first, unless [`commit`](Unwind::commit) emptied it.
struct Unwind<'a, P: Platform> {
    ctrl: &'a Controller<P>,
    steps: Vec<Undo, UNDO_DEPTH>,
}

impl<'a, P: Platform> Unwind<'a, P> {
    fn new(ctrl: &'a Controller<P>) -> Self {
        Self { ctrl, steps: Vec::new() }
    }

    fn push(&mut self, step: Undo) {
        let pushed = self.steps.push(step);
        debug_assert!(pushed.is_ok(), "undo stack overflow");
    }

    fn commit(mut self) {
        self.steps.clear();
    }
}

impl<P: Platform> Drop for Unwind<'_, P> {
    fn drop(&mut self) {
        let ctrl = self.ctrl;
        while let Some(step) = self.steps.pop() {
            match step {
                Undo::Binding(irq) => ctrl.edges.unbind(&ctrl.platform, irq),
                Undo::Timer => ctrl.blinker.disarm(&ctrl.platform),
                Undo::Line(id) => {
                    ctrl.registry.release(&ctrl.platform, id);
                }
            }
        }
    }
}

pub struct Controller<P: Platform> {
    platform: P,
    config: Config,
    registry: Registry,
    blinker: Blinker,
    edges: EdgeHandler,
    counter: EventCounter,
    running: AtomicBool,
}

impl<P: Platform> Controller<P> {
    pub fn new(platform: P, config: Config) -> Self {
        Self {
            blinker: Blinker::new(config.period()),
            platform,
            config,
            registry: Registry::new(),
            edges: EdgeHandler::new(),
            counter: EventCounter::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Acquires every resource and arms the timer, or acquires nothing.
    ///
    /// # Errors
    ///
    /// [`StartError::AlreadyStarted`] if running; otherwise the stage that
    /// failed, after everything acquired before it has been released.
    pub fn start(&self) -> Result<(), StartError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(StartError::AlreadyStarted);
        }

        self.config.log();
        info!("clargmod_init");

        let mut unwind = Unwind::new(self);
        match self.acquire_all(&mut unwind) {
            Ok(()) => {
                unwind.commit();
                info!("started, {} lines held", self.registry.held());
                Ok(())
            }
            Err(e) => {
                drop(unwind);
                self.running.store(false, Ordering::Release);
                error!("start failed: {}, code {}", e, e.status().0);
                Err(e)
            }
        }
    }

    fn acquire_all(&self, unwind: &mut Unwind<'_, P>) -> Result<(), StartError> {
        let outputs = self
            .registry
            .acquire_outputs(&self.platform, self.config.line_ids(), ["led1", "led2"], Level::Low)
            .map_err(|partial| {
                for id in partial.acquired {
                    unwind.push(Undo::Line(id));
                }
                StartError::BlinkOutputs(partial.error)
            })?;
        for id in outputs {
            unwind.push(Undo::Line(id));
        }

        self.blinker.arm(&self.platform);
        unwind.push(Undo::Timer);

        if self.config.variant() == Variant::Blink {
            return Ok(());
        }

        let demo = self.config.demo_led();
        self.registry
            .acquire_set(&self.platform, &[LineSpec::output(demo, Level::Low, "LED 1")])
            .map_err(StartError::DemoLed)?;
        unwind.push(Undo::Line(demo));

        let [button0, button1] = self.config.buttons();
        self.registry
            .acquire_set(
                &self.platform,
                &[LineSpec::input(button0, "BUTTON 1"), LineSpec::input(button1, "BUTTON 2")],
            )
            .map_err(StartError::Buttons)?;
        unwind.push(Undo::Line(button0));
        unwind.push(Undo::Line(button1));

        for (source, role) in [(button0, Role::Toggle), (button1, Role::Clear)] {
            let irq = self
                .edges
                .bind(&self.platform, source, role)
                .map_err(|error| StartError::Interrupt { input: role.input(), error })?;
            unwind.push(Undo::Binding(irq));
        }

        Ok(())
    }

    /// Tears everything down. Always completes; safe after a failed start
    /// and when called twice.
    pub fn stop(&self) {
        info!("clargmod_exit");

        self.blinker.disarm(&self.platform);
        self.registry.drive_outputs_low(&self.platform);
        self.edges.unbind_all(&self.platform);
        self.registry.release_all(&self.platform);
        self.edges.reset();

        self.running.store(false, Ordering::Release);
    }

    /// Timer callback. The platform calls this when a scheduled firing is due.
    pub fn on_timer(&self) {
        trace!("blink_timer_func");

        if !self.blinker.fire(&self.platform, &self.registry, self.config.line_ids()) {
            return;
        }
        if self.config.variant() == Variant::Blink {
            let count = self.counter.increment();
            info!("count is: {}", count);
        }
    }

    /// Interrupt callback. The platform calls this with the number of the
    /// interrupt that fired.
    pub fn on_interrupt(&self, irq: Irq) -> Reaction {
        let cx = EdgeContext {
            platform: &self.platform,
            registry: &self.registry,
            counter: &self.counter,
            demo: self.config.demo_led(),
            edge_selector: self.config.edge_selector(),
        };
        self.edges.on_interrupt(&cx, irq)
    }

    /// `true` between a successful [`start`](Controller::start) and the next
    /// [`stop`](Controller::stop).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Timer firings in [`Variant::Blink`](crate::Variant::Blink), input-0
    /// edges in [`Variant::Buttons`](crate::Variant::Buttons). Wraps at
    /// `u32::MAX`.
    pub fn counter(&self) -> u32 {
        self.counter.get()
    }

    /// Levels most recently written by the blinker and by input 0.
    pub fn toggle_state(&self) -> ToggleState {
        let BlinkLevels { led1, led2 } = self.blinker.levels();
        ToggleState { led1, led2, led3: self.edges.led3() }
    }

    /// Number of lines currently held from the platform.
    pub fn held_lines(&self) -> usize {
        self.registry.held()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool as StdAtomicBool, Ordering as StdOrdering};
    use std::thread;

    use embassy_time::Duration;

    use super::*;
    use crate::error::{AcquireError, InterruptResolutionError};
    use crate::platform::Status;
    use crate::platform::fake::FakePlatform;

    fn blink(period_secs: u32) -> Controller<FakePlatform> {
        let config = Config::default().with_lines([2, 3]).with_period_secs(period_secs);
        Controller::new(FakePlatform::new(), config)
    }

    fn buttons() -> Controller<FakePlatform> {
        let config = Config::default()
            .with_lines([2, 3])
            .with_period_secs(1)
            .with_edge_selector(17)
            .with_buttons(4, [17, 19]);
        Controller::new(FakePlatform::new(), config)
    }

    fn run(ctrl: &Controller<FakePlatform>, secs: u64) -> usize {
        ctrl.platform().run_for(Duration::from_secs(secs), || ctrl.on_timer())
    }

    fn assert_quiesced(ctrl: &Controller<FakePlatform>) {
        let platform = ctrl.platform();
        assert_eq!(platform.held_count(), 0);
        assert_eq!(platform.bound_count(), 0);
        assert_eq!(platform.pending(), None);
        assert_eq!(ctrl.held_lines(), 0);
        assert!(!ctrl.is_running());
    }

    #[test]
    fn three_periods_toggle_three_times() {
        let ctrl = blink(1);
        ctrl.start().unwrap();
        assert!(!ctrl.platform().level_of(2));
        assert!(!ctrl.platform().level_of(3));

        assert_eq!(run(&ctrl, 3), 3);
        assert_eq!(ctrl.counter(), 3);
        let state = ctrl.toggle_state();
        assert!(state.led1);
        assert!(state.led2);
        assert!(ctrl.platform().level_of(2));
        assert!(ctrl.platform().level_of(3));
    }

    #[test]
    fn parity_after_n_firings() {
        let ctrl = blink(2);
        ctrl.start().unwrap();
        for n in 1..=7u32 {
            run(&ctrl, 2);
            let expected = n % 2 == 1;
            assert_eq!(ctrl.counter(), n);
            assert_eq!(ctrl.toggle_state().led1, expected);
            assert_eq!(ctrl.toggle_state().led2, expected);
        }
    }

    #[test]
    fn nothing_fires_before_first_period() {
        let ctrl = blink(5);
        ctrl.start().unwrap();
        assert_eq!(run(&ctrl, 4), 0);
        assert_eq!(run(&ctrl, 1), 1);
    }

    #[test]
    fn start_then_stop_releases_everything() {
        for ctrl in [blink(1), buttons()] {
            ctrl.start().unwrap();
            assert!(ctrl.is_running());
            ctrl.stop();
            assert_quiesced(&ctrl);
        }
    }

    #[test]
    fn stop_drives_outputs_low() {
        let ctrl = buttons();
        ctrl.start().unwrap();
        run(&ctrl, 1);
        ctrl.on_interrupt(ctrl.platform().irq_of(17));
        assert!(ctrl.platform().level_of(2));
        assert!(ctrl.platform().level_of(4));

        ctrl.stop();
        for line in [2, 3, 4] {
            assert!(!ctrl.platform().level_of(line));
        }
    }

    #[test]
    fn no_firing_after_stop() {
        let ctrl = blink(1);
        ctrl.start().unwrap();
        run(&ctrl, 1);
        assert!(ctrl.platform().pending().is_some());
        ctrl.stop();

        assert_eq!(run(&ctrl, 10), 0);
        // a late delivery from the platform is inert too
        ctrl.on_timer();
        assert_eq!(ctrl.counter(), 1);
        assert!(!ctrl.platform().level_of(2));
    }

    #[test]
    fn stop_waits_for_in_flight_firing() {
        let ctrl = blink(1);
        ctrl.start().unwrap();
        let done = StdAtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                while !done.load(StdOrdering::Acquire) {
                    run(&ctrl, 1);
                }
            });
            while ctrl.counter() < 20 {
                thread::yield_now();
            }
            ctrl.stop();
            let after_stop = ctrl.counter();
            let levels = (ctrl.platform().level_of(2), ctrl.platform().level_of(3));
            for _ in 0..100 {
                thread::yield_now();
            }
            assert_eq!(ctrl.counter(), after_stop);
            assert_eq!(levels, (false, false));
            assert_eq!((ctrl.platform().level_of(2), ctrl.platform().level_of(3)), (false, false));
            done.store(true, StdOrdering::Release);
        });
        assert_quiesced(&ctrl);
    }

    #[test]
    fn failing_kth_acquisition_leaks_nothing() {
        // blink outputs, demo LED, two buttons
        for k in 1..=5 {
            let ctrl = buttons();
            ctrl.platform().fail_request_at(k);
            let err = ctrl.start().unwrap_err();
            assert_eq!(err.status(), Status::ENXIO, "k = {k}");
            assert_quiesced(&ctrl);
        }
    }

    #[test]
    fn failing_stage_is_named() {
        let ctrl = buttons();
        ctrl.platform().fail_request_at(3);
        assert_eq!(
            ctrl.start(),
            Err(StartError::DemoLed(AcquireError { line: LineId(4), status: Status::ENXIO }))
        );

        let ctrl = buttons();
        ctrl.platform().fail_request_at(5);
        assert_eq!(
            ctrl.start(),
            Err(StartError::Buttons(AcquireError { line: LineId(19), status: Status::ENXIO }))
        );
    }

    #[test]
    fn interrupt_failures_roll_back_everything() {
        let resolve = buttons();
        resolve.platform().fail_resolve(19);
        assert_eq!(
            resolve.start(),
            Err(StartError::Interrupt {
                input: 1,
                error: InterruptResolutionError::Resolve { line: LineId(19), status: Status::ENXIO },
            })
        );
        assert_quiesced(&resolve);

        let bind = buttons();
        bind.platform().fail_bind(17);
        assert!(matches!(
            bind.start(),
            Err(StartError::Interrupt { input: 0, error: InterruptResolutionError::Bind { .. } })
        ));
        assert_quiesced(&bind);
        assert!(bind.platform().cancels() > 0);
    }

    #[test]
    fn unset_lines_fail_without_leaking() {
        let ctrl = Controller::new(FakePlatform::new(), Config::default());
        let err = ctrl.start().unwrap_err();
        assert_eq!(
            err,
            StartError::BlinkOutputs(AcquireError { line: LineId(-1), status: Status::EINVAL })
        );
        assert_quiesced(&ctrl);
    }

    #[test]
    fn second_output_busy_releases_first() {
        let ctrl = blink(1);
        ctrl.platform().claim(3);
        assert!(matches!(ctrl.start(), Err(StartError::BlinkOutputs(_))));
        assert!(!ctrl.platform().is_held(2));
        assert!(ctrl.platform().is_held(3));
        assert_eq!(ctrl.held_lines(), 0);
    }

    #[test]
    fn double_start_is_rejected() {
        let ctrl = blink(1);
        ctrl.start().unwrap();
        assert_eq!(ctrl.start(), Err(StartError::AlreadyStarted));
        assert_eq!(ctrl.held_lines(), 2);
        ctrl.stop();
        ctrl.start().unwrap();
        ctrl.stop();
        ctrl.stop();
        assert_quiesced(&ctrl);
    }

    #[test]
    fn stop_after_failed_start_is_harmless() {
        let ctrl = buttons();
        ctrl.platform().fail_request_at(4);
        assert!(ctrl.start().is_err());
        ctrl.stop();
        assert_quiesced(&ctrl);
    }

    #[test]
    fn button_edges_drive_demo_led() {
        let ctrl = buttons();
        ctrl.start().unwrap();
        let toggle = ctrl.platform().irq_of(17);
        let clear = ctrl.platform().irq_of(19);

        assert_eq!(ctrl.on_interrupt(toggle), Reaction::Toggled { level: true, count: 1 });
        assert!(ctrl.platform().level_of(4));
        assert_eq!(ctrl.on_interrupt(clear), Reaction::Cleared { was_high: true });
        assert!(!ctrl.platform().level_of(4));
        assert_eq!(ctrl.on_interrupt(clear), Reaction::Cleared { was_high: false });
        assert_eq!(ctrl.on_interrupt(toggle), Reaction::Toggled { level: true, count: 2 });
        assert!(ctrl.toggle_state().led3);
    }

    #[test]
    fn button_variant_counts_edges_not_ticks() {
        let ctrl = buttons();
        ctrl.start().unwrap();
        assert_eq!(run(&ctrl, 3), 3);
        assert_eq!(ctrl.counter(), 0);
        assert!(ctrl.toggle_state().led1);

        ctrl.on_interrupt(ctrl.platform().irq_of(17));
        assert_eq!(ctrl.counter(), 1);
    }

    #[test]
    fn edges_after_stop_are_ignored() {
        let ctrl = buttons();
        ctrl.start().unwrap();
        let toggle = ctrl.platform().irq_of(17);
        ctrl.stop();
        assert_eq!(ctrl.on_interrupt(toggle), Reaction::Ignored);
        assert_eq!(ctrl.counter(), 0);
    }
}
