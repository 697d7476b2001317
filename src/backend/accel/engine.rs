//! Engine, stream and primitive execution.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Error;

/// Whether the engine was built into this crate (cargo feature `accel`).
pub fn is_available() -> bool {
    cfg!(feature = "accel")
}

/// Execution engine owning the worker pool primitives run on.
#[derive(Debug)]
pub struct Engine {
    pool: ThreadPool,
}

impl Engine {
    /// Engine with one worker per logical CPU.
    pub fn cpu() -> Result<Self, Error> {
        Self::with_threads(0)
    }

    /// `num_threads == 0` lets the pool pick.
    pub fn with_threads(num_threads: usize) -> Result<Self, Error> {
        if !is_available() {
            return Err(Error::BackendUnavailable(
                "accelerated engine not built (enable the `accel` feature)".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("accel-engine-{}", i))
            .build()
            .map_err(|e| Error::BackendUnavailable(format!("engine creation failed: {}", e)))?;
        crate::debug_println!("Created engine with {} threads", pool.current_num_threads());
        Ok(Engine { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

/// A planned computation over engine memories.
pub trait Primitive: Send + Debug {
    fn name(&self) -> &'static str;

    /// Runs to completion on the calling worker.
    fn execute(&self) -> Result<(), Error>;
}

fn run_primitive(primitive: &dyn Primitive) -> Result<(), Error> {
    crate::debug_println!("Executing primitive {}", primitive.name());
    panic::catch_unwind(AssertUnwindSafe(|| primitive.execute())).unwrap_or_else(|_| {
        Err(Error::InternalLogicError(format!(
            "primitive {} panicked",
            primitive.name()
        )))
    })
}

/// Ordered submission queue on an engine.
///
/// Dropping a stream waits for everything submitted to it.
#[derive(Debug)]
pub struct Stream<'e> {
    engine: &'e Engine,
    pending: usize,
    sender: Sender<Result<(), Error>>,
    receiver: Receiver<Result<(), Error>>,
}

impl<'e> Stream<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        let (sender, receiver) = mpsc::channel();
        Stream {
            engine,
            pending: 0,
            sender,
            receiver,
        }
    }

    /// Enqueues `primitives` to run in order on the engine's pool.
    pub fn submit(&mut self, primitives: Vec<Box<dyn Primitive>>) -> &mut Self {
        let sender = self.sender.clone();
        self.pending += 1;
        crate::debug_println!("Submitting {} primitive(s)", primitives.len());
        self.engine.pool.spawn(move || {
            let result = primitives
                .iter()
                .try_for_each(|p| run_primitive(p.as_ref()));
            // The stream outlives every submission, so the receiver is still alive.
            let _ = sender.send(result);
        });
        self
    }

    /// Submissions not yet collected by [`Stream::wait`].
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Blocks until every submission finished. Returns the first failure.
    pub fn wait(&mut self) -> Result<(), Error> {
        let mut first_error = None;
        while self.pending > 0 {
            let result = self.receiver.recv().map_err(|_| {
                Error::InternalLogicError("engine worker disconnected".to_string())
            })?;
            self.pending -= 1;
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Stream<'_> {
    fn drop(&mut self) {
        if self.pending > 0 {
            crate::debug_println!("Stream dropped with {} pending submission(s)", self.pending);
            let _ = self.wait();
        }
    }
}

#[cfg(all(test, feature = "accel"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Count(Arc<AtomicUsize>);

    impl Primitive for Count {
        fn name(&self) -> &'static str {
            "count"
        }

        fn execute(&self) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Fail;

    impl Primitive for Fail {
        fn name(&self) -> &'static str {
            "fail"
        }

        fn execute(&self) -> Result<(), Error> {
            Err(Error::InvalidOperation("fail".to_string()))
        }
    }

    #[derive(Debug)]
    struct Panic;

    impl Primitive for Panic {
        fn name(&self) -> &'static str {
            "panic"
        }

        fn execute(&self) -> Result<(), Error> {
            panic!("boom")
        }
    }

    #[test]
    fn wait_collects_all_submissions() {
        let engine = Engine::with_threads(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut stream = Stream::new(&engine);
        stream
            .submit(vec![Box::new(Count(counter.clone())), Box::new(Count(counter.clone()))])
            .submit(vec![Box::new(Count(counter.clone()))]);
        assert_eq!(stream.pending(), 2);
        stream.wait().unwrap();
        assert_eq!(stream.pending(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn drop_waits_for_pending_work() {
        let engine = Engine::with_threads(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let mut stream = Stream::new(&engine);
            stream.submit(vec![Box::new(Count(counter.clone()))]);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_stops_the_submission() {
        let engine = Engine::cpu().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut stream = Stream::new(&engine);
        stream.submit(vec![Box::new(Fail), Box::new(Count(counter.clone()))]);
        assert!(matches!(stream.wait(), Err(Error::InvalidOperation(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panics_become_errors() {
        let engine = Engine::cpu().unwrap();
        let mut stream = Stream::new(&engine);
        stream.submit(vec![Box::new(Panic)]);
        assert!(matches!(stream.wait(), Err(Error::InternalLogicError(_))));
    }
}
