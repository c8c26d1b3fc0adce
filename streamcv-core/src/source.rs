//! Push-style sources and the sinks they write into.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::tuple::Tuple;
use crate::value::Map;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Downstream sink of a source.
pub trait Writer: Send {
    /// Returning [`Error::SinkClosed`] asks the source to finish cleanly.
    fn write(&mut self, ctx: &Context, tuple: Tuple) -> Result<()>;
}

impl<F> Writer for F
where
    F: FnMut(&Context, Tuple) -> Result<()> + Send,
{
    fn write(&mut self, ctx: &Context, tuple: Tuple) -> Result<()> {
        self(ctx, tuple)
    }
}

pub trait Source: Send + Sync {
    /// Streams tuples into `w` until the source is exhausted, fails or is
    /// stopped. Blocks the calling thread.
    fn generate_stream(&self, ctx: &Context, w: &mut dyn Writer) -> Result<()>;

    /// Requests the stream to stop. Safe to call from another thread and
    /// more than once.
    fn stop(&self, ctx: &Context) -> Result<()>;

    fn is_rewindable(&self) -> bool {
        false
    }

    /// Restarts the stream from its beginning.
    fn rewind(&self, _ctx: &Context) -> Result<()> {
        Err(Error::NotRewindable)
    }
}

pub trait SourceCreator: Send + Sync {
    fn create_source(&self, ctx: &Context, params: &Map) -> Result<Arc<dyn Source>>;
}

/// What a read loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Continue,
    Rewind,
    Stop,
}

#[derive(Debug, Default)]
struct ControlState {
    stopped: bool,
    rewind_requested: bool,
}

/// Cooperative stop and rewind requests for a blocking read loop.
///
/// Requests are only observed between iterations; a native read in progress
/// is never interrupted.
#[derive(Debug, Default)]
pub struct SourceControl {
    state: Mutex<ControlState>,
    changed: Condvar,
}

impl SourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        self.changed.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// A stopped source cannot be rewound.
    pub fn request_rewind(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(Error::SourceStopped);
        }
        state.rewind_requested = true;
        self.changed.notify_all();
        Ok(())
    }

    /// Non-blocking check, consumes a pending rewind request.
    pub fn poll(&self) -> Signal {
        let mut state = self.state.lock();
        Self::take_signal(&mut state).unwrap_or(Signal::Continue)
    }

    /// Blocks until a rewind or stop is requested.
    pub fn wait(&self) -> Signal {
        let mut state = self.state.lock();
        loop {
            if let Some(signal) = Self::take_signal(&mut state) {
                return signal;
            }
            self.changed.wait(&mut state);
        }
    }

    fn take_signal(state: &mut ControlState) -> Option<Signal> {
        if state.stopped {
            Some(Signal::Stop)
        } else if state.rewind_requested {
            state.rewind_requested = false;
            Some(Signal::Rewind)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_poll_defaults_to_continue() {
        let control = SourceControl::new();
        assert_eq!(control.poll(), Signal::Continue);
        assert!(!control.is_stopped());
    }

    #[test]
    fn test_rewind_is_consumed_once() {
        let control = SourceControl::new();
        control.request_rewind().unwrap();
        assert_eq!(control.poll(), Signal::Rewind);
        assert_eq!(control.poll(), Signal::Continue);
    }

    #[test]
    fn test_stop_wins_over_rewind() {
        let control = SourceControl::new();
        control.request_rewind().unwrap();
        control.stop();
        assert_eq!(control.poll(), Signal::Stop);
        assert_eq!(control.poll(), Signal::Stop);
        assert!(control.request_rewind().is_err());
    }

    #[test]
    fn test_wait_wakes_on_stop() {
        let control = Arc::new(SourceControl::new());
        let waiter = {
            let control = control.clone();
            thread::spawn(move || control.wait())
        };
        thread::sleep(Duration::from_millis(20));
        control.stop();
        assert_eq!(waiter.join().unwrap(), Signal::Stop);
    }

    #[test]
    fn test_wait_wakes_on_rewind() {
        let control = Arc::new(SourceControl::new());
        let waiter = {
            let control = control.clone();
            thread::spawn(move || control.wait())
        };
        thread::sleep(Duration::from_millis(20));
        control.request_rewind().unwrap();
        assert_eq!(waiter.join().unwrap(), Signal::Rewind);
    }

    #[test]
    fn test_closure_writer() {
        let ctx = Context::new();
        let mut seen = Vec::new();
        {
            let mut writer = |_: &Context, t: Tuple| -> Result<()> {
                seen.push(t);
                Ok(())
            };
            let w: &mut dyn Writer = &mut writer;
            let mut m = Map::new();
            m.insert("n".to_string(), Value::Int(1));
            w.write(&ctx, Tuple::new(m)).unwrap();
        }
        assert_eq!(seen.len(), 1);
    }
}
