//! Pipeline orchestrator.
//!
//! One run wires a reader thread, `N` worker threads and a writer thread
//! through two bounded queues:
//!
//! ```text
//! source ─▶ reader ─▶ [to_workers] ─▶ worker × N ─▶ [to_writer] ─▶ writer ─▶ dest
//! ```
//!
//! # Shutdown
//! Every stage loops on a predicate over the shared [`RunControl`]:
//!
//! | stage  | keeps pulling while                                   | keeps pushing while           |
//! |--------|-------------------------------------------------------|-------------------------------|
//! | reader | no error, workers alive                               | same                          |
//! | worker | no error, reader alive or `to_workers` non-empty      | no error, writer alive        |
//! | writer | no error, workers alive or `to_writer` non-empty      | n/a                           |
//!
//! A stage therefore drains its input before leaving on a normal end of
//! stream, and abandons it promptly once any stage has failed.  Queue waits
//! are bounded by the configured timeout; an exiting stage also closes the
//! queues around it so neighbours re-check their predicate immediately.
//!
//! Failures are trapped inside the stage that raised them (including
//! panics), recorded in the run's registry, and surfaced as
//! [`Error::Aggregate`] only after every thread has joined.

pub mod control;

use std::any::Any;
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::codec::Codec;
use crate::error::{Error, Result, StageKind};
use crate::io_stream::{BlockReader, BlockWriter, Direction};
use crate::options::ConvertOptions;
use crate::queue::BoundedQueue;

pub use control::{FailureRegistry, RunControl};

// ── State & report ───────────────────────────────────────────────────────────

/// Lifecycle of a [`Pipeline`].  Each instance runs exactly one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Totals for a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub direction:      Direction,
    pub workers:        usize,
    pub blocks_read:    u64,
    /// Source bytes consumed, including frame prefixes when decompressing.
    pub bytes_in:       u64,
    pub blocks_written: u64,
    /// Destination bytes produced, including frame prefixes when compressing.
    pub bytes_out:      u64,
    pub elapsed:        Duration,
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

pub struct Pipeline {
    options: ConvertOptions,
    codec:   Arc<dyn Codec>,
    state:   PipelineState,
}

impl Pipeline {
    /// Pipeline using the codec named in `options`.
    pub fn new(options: ConvertOptions) -> Result<Self> {
        options.validate()?;
        let codec = options.build_codec()?;
        Ok(Self { options, codec, state: PipelineState::Idle })
    }

    /// Pipeline using a caller-supplied codec; `options.codec` is ignored.
    pub fn with_codec(options: ConvertOptions, codec: Arc<dyn Codec>) -> Result<Self> {
        options.validate()?;
        Ok(Self { options, codec, state: PipelineState::Idle })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Compress `source` into a framed stream on `dest`.
    pub fn compress<R, W>(&mut self, source: R, dest: W) -> Result<RunReport>
    where
        R: Read + Send,
        W: Write + Send,
    {
        self.run(Direction::Compress, source, dest)
    }

    /// Restore the original bytes of a framed `source` onto `dest`.
    pub fn decompress<R, W>(&mut self, source: R, dest: W) -> Result<RunReport>
    where
        R: Read + Send,
        W: Write + Send,
    {
        self.run(Direction::Decompress, source, dest)
    }

    fn run<R, W>(&mut self, direction: Direction, source: R, dest: W) -> Result<RunReport>
    where
        R: Read + Send,
        W: Write + Send,
    {
        if self.state != PipelineState::Idle {
            return Err(Error::AlreadyStarted);
        }
        self.state = PipelineState::Running;

        let result = self.execute(direction, source, dest);
        self.state = if result.is_ok() {
            PipelineState::Succeeded
        } else {
            PipelineState::Failed
        };
        result
    }

    fn execute<R, W>(&self, direction: Direction, source: R, dest: W) -> Result<RunReport>
    where
        R: Read + Send,
        W: Write + Send,
    {
        let workers  = self.options.worker_count();
        let capacity = self.options.queue_capacity();
        let started  = Instant::now();

        let run = Run {
            direction,
            codec:      self.codec.as_ref(),
            control:    RunControl::new(workers),
            to_workers: BoundedQueue::new(capacity),
            to_writer:  BoundedQueue::new(capacity),
            timeout:    self.options.queue_timeout(),
        };
        debug!(
            direction = direction.name(),
            workers,
            capacity,
            block_size = self.options.block_size,
            "pipeline starting"
        );

        let reader = BlockReader::new(source, direction, self.options.block_size);
        let writer = BlockWriter::new(dest, direction);

        let shared = &run;
        let (read_totals, write_totals) = thread::scope(|s| {
            let reader_handle =
                shared.spawn(s, StageKind::Reader, 0, move || shared.read_stage(reader));
            for id in 0..workers {
                // Workers report nothing on success; failures go to the registry.
                drop(shared.spawn(s, StageKind::Worker, id, move || shared.work_stage()));
            }
            let writer_handle =
                shared.spawn(s, StageKind::Writer, 0, move || shared.write_stage(writer));
            (join(reader_handle), join(writer_handle))
        });

        let failures = run.control.into_failures();
        if !failures.is_empty() {
            return Err(Error::Aggregate(failures.into_aggregate()));
        }

        let (blocks_read, bytes_in) = read_totals.unwrap_or_default();
        let (blocks_written, bytes_out) = write_totals.unwrap_or_default();
        let report = RunReport {
            direction,
            workers,
            blocks_read,
            bytes_in,
            blocks_written,
            bytes_out,
            elapsed: started.elapsed(),
        };
        info!(
            direction = direction.name(),
            blocks = report.blocks_written,
            bytes_in = report.bytes_in,
            bytes_out = report.bytes_out,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
        Ok(report)
    }
}

/// Join a stage thread.  Stage bodies trap their own panics, so a join
/// error cannot carry anything the registry has not already seen.
fn join<T>(handle: Option<ScopedJoinHandle<'_, Option<T>>>) -> Option<T> {
    handle.and_then(|h| h.join().ok().flatten())
}

// ── Run ──────────────────────────────────────────────────────────────────────

/// Everything the stage threads of one run share.
struct Run<'a> {
    direction:  Direction,
    codec:      &'a dyn Codec,
    control:    RunControl,
    to_workers: BoundedQueue<Vec<u8>>,
    to_writer:  BoundedQueue<Vec<u8>>,
    timeout:    Duration,
}

/// Marks its stage as exited when dropped, whichever way the stage body
/// ends.
struct StageExit<'r, 'a> {
    run:   &'r Run<'a>,
    stage: StageKind,
}

impl Drop for StageExit<'_, '_> {
    fn drop(&mut self) {
        let remaining = self.run.control.exited(self.stage);
        debug!(stage = self.stage.name(), remaining, "stage exited");
        if remaining == 0 || !self.run.control.healthy() {
            self.run.wake_neighbours(self.stage);
        }
    }
}

impl<'a> Run<'a> {
    /// Spawn one stage thread running `body` under [`Run::guarded`].
    ///
    /// If the OS refuses the thread, the failure is recorded and the stage
    /// is marked exited so the rest of the run winds down normally.
    fn spawn<'scope, 'env, T, F>(
        &'env self,
        scope: &'scope Scope<'scope, 'env>,
        stage: StageKind,
        id:    usize,
        body:  F,
    ) -> Option<ScopedJoinHandle<'scope, Option<T>>>
    where
        T: Send + 'scope,
        F: FnOnce() -> Result<T> + Send + 'scope,
    {
        let spawned = thread::Builder::new()
            .name(format!("blockflow-{}-{id}", stage.name()))
            .spawn_scoped(scope, move || self.guarded(stage, body));
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.control.record(stage, Error::Io(e));
                drop(StageExit { run: self, stage });
                None
            }
        }
    }

    /// Run a stage body, trapping errors and panics into the registry.
    fn guarded<T>(&self, stage: StageKind, body: impl FnOnce() -> Result<T>) -> Option<T> {
        let _exit = StageExit { run: self, stage };
        debug!(stage = stage.name(), "stage started");
        match catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                self.control.record(stage, error);
                None
            }
            Err(payload) => {
                self.control.record(stage, Error::StagePanicked(panic_message(payload.as_ref())));
                None
            }
        }
    }

    /// Close the queues next to `stage` so blocked neighbours re-check
    /// their predicates now rather than at their next timeout.
    fn wake_neighbours(&self, stage: StageKind) {
        if !self.control.healthy() {
            self.to_workers.close();
            self.to_writer.close();
            return;
        }
        match stage {
            StageKind::Reader => self.to_workers.close(),
            StageKind::Worker => {
                self.to_workers.close();
                self.to_writer.close();
            }
            StageKind::Writer => self.to_writer.close(),
        }
    }

    /// Push `item`, retrying bounded waits while `keep_going` holds.
    /// Returns false if the item was abandoned.
    fn enqueue_while(
        &self,
        queue: &BoundedQueue<Vec<u8>>,
        mut item: Vec<u8>,
        keep_going: &dyn Fn() -> bool,
    ) -> bool {
        while keep_going() {
            match queue.try_enqueue(item, self.timeout) {
                Ok(()) => return true,
                Err(back) => item = back,
            }
        }
        false
    }

    // ── Stage bodies ─────────────────────────────────────────────────────────

    fn read_stage<R: Read>(&self, mut reader: BlockReader<R>) -> Result<(u64, u64)> {
        let keep_going =
            || self.control.healthy() && self.control.alive(StageKind::Worker) > 0;

        while keep_going() {
            let block = match reader.next_block()? {
                Some(b) => b,
                None    => break,
            };
            if !self.enqueue_while(&self.to_workers, block, &keep_going) {
                break;
            }
        }
        Ok((reader.blocks_read(), reader.bytes_read()))
    }

    fn work_stage(&self) -> Result<()> {
        let keep_pulling = || {
            self.control.healthy()
                && (self.control.alive(StageKind::Reader) > 0 || !self.to_workers.is_empty())
        };
        let keep_pushing =
            || self.control.healthy() && self.control.alive(StageKind::Writer) > 0;

        while keep_pulling() {
            let block = match self.to_workers.try_dequeue(self.timeout) {
                Some(b) => b,
                None    => continue,
            };
            let transformed = match self.direction {
                Direction::Compress   => self.codec.forward(&block)?,
                Direction::Decompress => self.codec.inverse(&block)?,
            };
            if !self.enqueue_while(&self.to_writer, transformed, &keep_pushing) {
                break;
            }
        }
        Ok(())
    }

    fn write_stage<W: Write>(&self, mut writer: BlockWriter<W>) -> Result<(u64, u64)> {
        let keep_pulling = || {
            self.control.healthy()
                && (self.control.alive(StageKind::Worker) > 0 || !self.to_writer.is_empty())
        };

        while keep_pulling() {
            let block = match self.to_writer.try_dequeue(self.timeout) {
                Some(b) => b,
                None    => continue,
            };
            writer.write_block(block)?;
        }

        let totals = (writer.blocks_written(), writer.bytes_written());
        if self.control.healthy() {
            writer.finish()?;
        }
        Ok(totals)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
