//! Rate limiter for callbacks that fire in bursts.
//!
//! A [`Throttle`] runs its handler at most once per window. The first call
//! after a quiet period runs immediately; calls arriving inside the window are
//! coalesced and the handler runs once more at the end of the window with the
//! arguments of the latest call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

type Handler<A> = Arc<dyn Fn(A) + Send + Sync>;

struct ThrottleState<A> {
    last_run: Option<Instant>,
    pending: Option<A>,
    timer: Option<JoinHandle<()>>,
}

pub struct Throttle<A> {
    window: Duration,
    handler: Handler<A>,
    state: Arc<Mutex<ThrottleState<A>>>,
}

fn lock<A>(state: &Mutex<ThrottleState<A>>) -> MutexGuard<'_, ThrottleState<A>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<A: Send + 'static> Throttle<A> {
    pub fn new<F>(window: Duration, handler: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            window,
            handler: Arc::new(handler),
            state: Arc::new(Mutex::new(ThrottleState {
                last_run: None,
                pending: None,
                timer: None,
            })),
        }
    }

    /// Must be called from within a tokio runtime: a coalesced call schedules
    /// its trailing execution on a timer task.
    pub fn call(&self, args: A) {
        let now = Instant::now();
        let mut state = lock(&self.state);
        let due = state.last_run.map(|last| last + self.window);

        if state.timer.is_none() && due.is_none_or(|due| now >= due) {
            state.last_run = Some(now);
            drop(state);
            (self.handler)(args);
            return;
        }

        state.pending = Some(args);
        if state.timer.is_some() {
            return;
        }

        let due = due.unwrap_or(now);
        let shared = Arc::clone(&self.state);
        let handler = Arc::clone(&self.handler);
        state.timer = Some(tokio::spawn(async move {
            sleep_until(due).await;
            let args = {
                let mut state = lock(&shared);
                state.timer = None;
                let args = state.pending.take();
                if args.is_some() {
                    state.last_run = Some(Instant::now());
                }
                args
            };
            if let Some(args) = args {
                handler(args);
            }
        }));
    }

    /// Drops any coalesced call and forgets the last run, so the next call
    /// executes immediately.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending = None;
        state.last_run = None;
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }
}

impl<A> Drop for Throttle<A> {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.state).timer.take() {
            timer.abort();
        }
    }
}
