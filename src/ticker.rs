//! One-shot timer for the blink driver.
//!
//! [`timer_task`] sleeps until the scheduled deadline and then calls
//! [`Controller::on_timer`], which re-arms through
//! [`TimerPort::schedule_at`]. Scheduling and cancelling only post a command
//! to the task.
//!
//! Because the callback runs to completion inside the task and never awaits,
//! no firing can be in flight while another task on the same executor is
//! running. Cancelling therefore never has to block.

use clargmod::{Controller, TimerPort};
use embassy_futures::select::{Either, select};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::{Instant, Timer};

use crate::hardware::Board;

enum TimerCommand {
    At(Instant),
    Cancel,
}

impl TimerCommand {
    fn deadline(self) -> Option<Instant> {
        match self {
            TimerCommand::At(at) => Some(at),
            TimerCommand::Cancel => None,
        }
    }
}

/// Latest command for the timer task. A newer command replaces an unread one.
static TIMER_COMMAND: Signal<CriticalSectionRawMutex, TimerCommand> = Signal::new();

impl TimerPort for Board {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_at(&self, at: Instant) {
        TIMER_COMMAND.signal(TimerCommand::At(at));
    }

    fn cancel_and_wait(&self) {
        TIMER_COMMAND.signal(TimerCommand::Cancel);
    }
}

/// Async task driving the blink timer.
///
/// # Arguments
///
/// * `ctrl` - Controller shared with the edge task and `main`
#[embassy_executor::task]
pub async fn timer_task(ctrl: &'static Controller<Board>) {
    let mut deadline: Option<Instant> = None;

    loop {
        deadline = match deadline {
            None => TIMER_COMMAND.wait().await.deadline(),
            Some(at) => match select(Timer::at(at), TIMER_COMMAND.wait()).await {
                Either::First(()) => {
                    // on_timer re-arms through TIMER_COMMAND
                    ctrl.on_timer();
                    None
                }
                Either::Second(command) => command.deadline(),
            },
        };
    }
}
