//! Round-robin tally sweep.
//!
//! Each source gets four consecutive ticks, one per tally slot, with only
//! that slot lit, before the cursor moves to the next source:
//!
//! ```text
//! tick:  1       2       3       4       5       ...  4N      4N+1
//!        (0,1)   (0,2)   (0,3)   (0,4)   (1,1)   ...  (N-1,4) (0,1)
//! ```
//!
//! [`Sweep`] holds the cursor and the sources and performs one tick at a
//! time. [`Scheduler`] drives a sweep from a dedicated thread at a fixed
//! rate.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Result;
use crate::protocol::{Message, TallySlot};
use crate::source::TallySource;
use crate::transport::Transport;

/// Smallest interval the scheduler will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// What one tick did.
#[derive(Debug)]
pub struct Tick {
    /// Index into the source list.
    pub index: usize,
    pub address: u16,
    pub slot: TallySlot,
    pub message: Message,
    /// Result of the transport send. Failures are already logged.
    pub outcome: Result<usize>,
}

impl Tick {
    pub fn delivered(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Round-robin cursor over a list of sources.
#[derive(Debug, Clone)]
pub struct Sweep {
    sources: Vec<TallySource>,
    index: usize,
    slot: TallySlot,
}

impl Sweep {
    pub fn new(sources: Vec<TallySource>) -> Self {
        Self {
            sources,
            index: 0,
            slot: TallySlot::Preview,
        }
    }

    pub fn sources(&self) -> &[TallySource] {
        &self.sources
    }

    /// Swap in a new source list and rewind to the first source, slot 1.
    pub fn replace_sources(&mut self, sources: Vec<TallySource>) {
        self.sources = sources;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.index = 0;
        self.slot = TallySlot::Preview;
    }

    /// Position the next tick will use.
    pub fn cursor(&self) -> (usize, TallySlot) {
        (self.index, self.slot)
    }

    /// Light the current slot on the current source, send it, and advance.
    ///
    /// Returns `None` without touching the transport when there are no
    /// sources. A failed send is logged and reported in [`Tick::outcome`];
    /// the cursor advances either way.
    pub fn tick(&mut self, transport: &mut dyn Transport) -> Option<Tick> {
        if self.sources.is_empty() {
            return None;
        }
        if self.index >= self.sources.len() {
            self.reset();
        }

        let index = self.index;
        let slot = self.slot;
        let source = &mut self.sources[index];
        source.light(slot);
        let message = source.encode();

        tracing::debug!(
            label = %source.label,
            address = source.address,
            %slot,
            "sending TSL data"
        );
        tracing::info!(target: "tally::preview", "{}: Preview: {}", source.label, source.tally1);
        tracing::info!(target: "tally::program", "{}: Program: {}", source.label, source.tally2);

        let outcome = transport.send(&message);
        if let Err(e) = &outcome {
            tracing::error!(
                label = %source.label,
                transport = %transport.kind(),
                error = %e,
                "unable to send TSL data"
            );
        }

        let address = source.address;
        self.advance();

        Some(Tick {
            index,
            address,
            slot,
            message,
            outcome,
        })
    }

    fn advance(&mut self) {
        let (next, wrapped) = self.slot.advance();
        self.slot = next;
        if wrapped {
            self.index += 1;
            if self.index >= self.sources.len() {
                self.index = 0;
            }
        }
    }
}

/// Drives a [`Sweep`] once per interval on a background thread.
///
/// Ticks never overlap and never queue up: if a tick runs late, the
/// ticks it overran are dropped and the schedule resumes on the next
/// interval boundary. Cancelling wakes the thread immediately and waits
/// for it to exit.
pub struct Scheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Start ticking. The first tick fires one interval from now.
    pub fn spawn(
        sweep: Arc<Mutex<Sweep>>,
        transport: Arc<Mutex<Box<dyn Transport>>>,
        interval: Duration,
    ) -> Result<Self> {
        let interval = interval.max(MIN_INTERVAL);
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("tsl-scheduler".into())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    {
                        let mut sweep = sweep.lock();
                        let mut transport = transport.lock();
                        sweep.tick(&mut **transport);
                    }

                    next += interval;
                    let now = Instant::now();
                    if next <= now {
                        let behind = now - next;
                        let skipped = (behind.as_nanos() / interval.as_nanos()) as u32 + 1;
                        next += interval * skipped;
                        tracing::debug!(skipped, "tick overran, dropping missed ticks");
                    }
                }
                tracing::debug!("scheduler exited");
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "scheduler started");

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop ticking and wait for the current tick, if any, to finish.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use crate::error::TallyError;
    use crate::transport::ConnectionState;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<Message>,
        refuse: bool,
    }

    impl Transport for Recorder {
        fn kind(&self) -> TransportKind {
            TransportKind::Udp
        }

        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn send(&mut self, message: &Message) -> Result<usize> {
            if self.refuse {
                return Err(TallyError::NotConnected);
            }
            self.sent.push(*message);
            Ok(message.as_bytes().len())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
    }

    fn cams(n: u16) -> Vec<TallySource> {
        (1..=n)
            .map(|i| TallySource::new(i, &format!("CAM{i}")))
            .collect()
    }

    #[test]
    fn empty_list_never_sends() {
        let mut sweep = Sweep::new(Vec::new());
        let mut rec = Recorder::default();
        for _ in 0..20 {
            assert!(sweep.tick(&mut rec).is_none());
        }
        assert!(rec.sent.is_empty());
        assert_eq!(sweep.cursor(), (0, TallySlot::Preview));
    }

    #[test]
    fn visits_every_pair_once_per_cycle() {
        let n = 3;
        let mut sweep = Sweep::new(cams(n));
        let mut rec = Recorder::default();

        let mut visited = Vec::new();
        for _ in 0..4 * n {
            let tick = sweep.tick(&mut rec).unwrap();
            visited.push((tick.index, tick.slot));
        }

        let expected: Vec<_> = (0..n as usize)
            .flat_map(|i| TallySlot::ALL.into_iter().map(move |s| (i, s)))
            .collect();
        assert_eq!(visited, expected);
        assert_eq!(sweep.cursor(), (0, TallySlot::Preview));
    }

    #[test]
    fn exactly_one_lamp_after_each_tick() {
        let mut sources = cams(2);
        sources[0].tally2 = true;
        sources[0].tally4 = true;
        let mut sweep = Sweep::new(sources);
        let mut rec = Recorder::default();

        for _ in 0..16 {
            let tick = sweep.tick(&mut rec).unwrap();
            let source = &sweep.sources()[tick.index];
            assert_eq!(source.tally().lit(), 1);
            assert!(source.tally().get(tick.slot));
        }
    }

    #[test]
    fn two_camera_scenario_bytes() {
        let mut sweep = Sweep::new(cams(2));
        let mut rec = Recorder::default();
        for _ in 0..5 {
            sweep.tick(&mut rec);
        }

        let first = rec.sent[0].as_bytes();
        assert_eq!(&first[..6], &[0x81, 0x31, b'C', b'A', b'M', b'1']);
        assert!(first[6..].iter().all(|b| *b == 0));

        assert_eq!(rec.sent[1].as_bytes()[1], 0x32);
        assert_eq!(rec.sent[2].as_bytes()[1], 0x34);
        assert_eq!(rec.sent[3].as_bytes()[1], 0x38);

        let fifth = rec.sent[4].as_bytes();
        assert_eq!(&fifth[..6], &[0x82, 0x31, b'C', b'A', b'M', b'2']);
        assert!(fifth[6..].iter().all(|b| *b == 0));
    }

    #[test]
    fn failed_send_still_advances() {
        let mut sweep = Sweep::new(cams(1));
        let mut rec = Recorder {
            refuse: true,
            ..Default::default()
        };

        let tick = sweep.tick(&mut rec).unwrap();
        assert!(!tick.delivered());
        assert!(matches!(tick.outcome, Err(TallyError::NotConnected)));
        assert_eq!(sweep.cursor(), (0, TallySlot::Program));

        rec.refuse = false;
        let tick = sweep.tick(&mut rec).unwrap();
        assert!(tick.delivered());
        assert_eq!(tick.slot, TallySlot::Program);
    }

    #[test]
    fn replace_sources_rewinds() {
        let mut sweep = Sweep::new(cams(3));
        let mut rec = Recorder::default();
        for _ in 0..6 {
            sweep.tick(&mut rec);
        }
        sweep.replace_sources(cams(1));
        assert_eq!(sweep.cursor(), (0, TallySlot::Preview));
        assert_eq!(sweep.tick(&mut rec).unwrap().address, 1);
    }

    #[test]
    fn scheduler_ticks_and_cancels() {
        let sweep = Arc::new(Mutex::new(Sweep::new(cams(2))));
        let transport: Arc<Mutex<Box<dyn Transport>>> =
            Arc::new(Mutex::new(Box::new(Recorder::default())));

        let mut scheduler =
            Scheduler::spawn(sweep.clone(), transport, Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(scheduler.is_running());
        scheduler.cancel();
        assert!(!scheduler.is_running());

        let cursor = sweep.lock().cursor();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(sweep.lock().cursor(), cursor);
        scheduler.cancel();
    }
}
