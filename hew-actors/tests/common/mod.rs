//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hew_actors::{atom, Atom, Runtime, RuntimeConfig};
use tracing_subscriber::EnvFilter;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(10);

/// Install a test-friendly subscriber once; `RUST_LOG` selects levels.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(workers: usize) -> RuntimeConfig {
    RuntimeConfig::default()
        .with_worker_count(workers)
        .with_steal_seed(42)
}

pub fn runtime(workers: usize) -> Runtime {
    init_tracing();
    Runtime::new(config(workers)).unwrap()
}

/// Poll `cond` until it holds or [`WAIT`] expires.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Guard for `on_if` cases keyed by an atom tag.
pub fn is(name: &'static str) -> impl Fn(&(Atom,)) -> bool + Send + 'static {
    let tag = atom(name);
    move |(a,)| *a == tag
}

/// In-memory printer sink.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
