//! Capture engine fed by the board's line-oriented event stream.
//!
//! The board (or a bridge process in front of it) writes one event per line:
//!
//! ```text
//! START <epoch>    recording started, absolute epoch of this attempt
//! MARK <ticks>     marker, relative to the recording start
//! STOP             recording finished (button released)
//! CONTINUE         red button: record another attempt
//! QUIT             white button: end the session
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The stream is read on
//! a background thread so the session driver can always be interrupted.

use crate::capture::types::{
    Capture, CaptureEngine, CaptureError, CaptureOutcome, CaptureRequest, Decision,
};
use crate::core::stop::StopSignal;
use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// One parsed line of the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Start { epoch: i64 },
    Mark(u64),
    Stop,
    Continue,
    Quit,
    /// A line that is not part of the protocol
    Malformed(String),
    /// Reading from the link failed
    ReadFailed(String),
    /// End of stream
    Closed,
}

/// Parse a single line. Returns `None` for blank lines and comments.
pub fn parse_line(line: &str) -> Option<EngineEvent> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let keyword = parts.next()?;
    let argument = parts.next();
    let malformed = || EngineEvent::Malformed(line.to_string());

    if parts.next().is_some() {
        return Some(malformed());
    }

    let event = match (keyword.to_ascii_uppercase().as_str(), argument) {
        ("START", Some(epoch)) => epoch
            .parse()
            .map(|epoch| EngineEvent::Start { epoch })
            .unwrap_or_else(|_| malformed()),
        ("MARK", Some(ticks)) => ticks
            .parse()
            .map(EngineEvent::Mark)
            .unwrap_or_else(|_| malformed()),
        ("STOP", None) => EngineEvent::Stop,
        ("CONTINUE", None) => EngineEvent::Continue,
        ("QUIT", None) => EngineEvent::Quit,
        _ => malformed(),
    };
    Some(event)
}

type Opener = Box<dyn FnMut() -> io::Result<Box<dyn Read + Send>> + Send>;

/// An open hardware link and the thread draining it.
struct Link {
    events: Receiver<EngineEvent>,
    reader: JoinHandle<()>,
}

impl Link {
    /// The reader hit EOF or a read error and has dropped the stream.
    fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }
}

/// Capture engine reading [`EngineEvent`]s from a byte stream.
///
/// A link is read by exactly one thread for as long as it stays open. A read
/// blocked on a quiet link cannot be cancelled, so `stop` closes only links
/// whose reader has finished. A link that is still open is parked and handed
/// to the next `start`, and lines the board sends in between are kept for
/// the next session. Events outside a recording are skipped by
/// `capture_once`.
pub struct StreamEngine {
    source: String,
    opener: Opener,
    running: bool,
    link: Option<Link>,
}

impl StreamEngine {
    /// Engine reading from a device node or FIFO, opened on `start`.
    pub fn device(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let source = path.display().to_string();
        Self::from_opener(source, move || {
            let file = File::open(&path)?;
            Ok(Box::new(file) as Box<dyn Read + Send>)
        })
    }

    /// Engine reading from whatever `opener` returns whenever a link is needed.
    pub fn from_opener<F>(source: impl Into<String>, opener: F) -> Self
    where
        F: FnMut() -> io::Result<Box<dyn Read + Send>> + Send + 'static,
    {
        Self {
            source: source.into(),
            opener: Box::new(opener),
            running: false,
            link: None,
        }
    }

    fn events(&self) -> Result<Receiver<EngineEvent>, CaptureError> {
        match &self.link {
            Some(link) if self.running => Ok(link.events.clone()),
            _ => Err(CaptureError::NotRunning),
        }
    }

    fn open_link(&mut self) -> Result<Link, CaptureError> {
        let stream = (self.opener)().map_err(|e| CaptureError::HardwareUnavailable {
            device: self.source.clone(),
            reason: e.to_string(),
        })?;

        // Bounded so a runaway link cannot grow memory without limit
        let (sender, events) = bounded(1024);
        let reader = thread::spawn(move || read_events(stream, sender));
        Ok(Link { events, reader })
    }

    fn release_link(&mut self) {
        let Some(Link { events, reader }) = self.link.take() else {
            return;
        };
        // The reader's next send fails once the receiver is gone.
        drop(events);

        if reader.is_finished() {
            let _ = reader.join();
            info!(source = %self.source, "hardware link released");
        } else {
            debug!(source = %self.source, "detaching blocked reader");
        }
    }
}

impl CaptureEngine for StreamEngine {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.running {
            return Err(CaptureError::AlreadyRunning);
        }

        if self.link.as_ref().is_some_and(Link::is_closed) {
            self.release_link();
        }

        if self.link.is_some() {
            debug!(source = %self.source, "resuming parked hardware link");
        } else {
            let link = self.open_link()?;
            self.link = Some(link);
            info!(source = %self.source, "hardware link opened");
        }

        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        match self.link.as_ref().map(Link::is_closed) {
            Some(true) => self.release_link(),
            Some(false) => debug!(source = %self.source, "parking idle hardware link"),
            None => {}
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn capture_once(
        &mut self,
        request: &CaptureRequest,
        stop: &StopSignal,
    ) -> Result<CaptureOutcome, CaptureError> {
        let events = self.events()?;
        let deadline = request.timeout.map(after).unwrap_or_else(never);

        debug!(
            attempt = request.attempt,
            raw_path = %request.raw_path.display(),
            "waiting for recording"
        );

        let mut recording: Option<(i64, Instant)> = None;
        let mut raw = Vec::new();

        loop {
            let event = select! {
                recv(stop.receiver()) -> _ => return Ok(CaptureOutcome::Interrupted),
                recv(deadline) -> _ => {
                    return Err(CaptureError::TimedOut(request.timeout.unwrap_or_default()));
                }
                recv(events) -> event => event.map_err(|_| CaptureError::Disconnected)?,
            };

            match event {
                EngineEvent::Start { epoch } => {
                    if recording.is_some() {
                        warn!("recording restarted before STOP, dropping {} marker(s)", raw.len());
                    }
                    recording = Some((epoch, Instant::now()));
                    raw.clear();
                }
                EngineEvent::Mark(ticks) => {
                    if recording.is_some() {
                        raw.push(ticks);
                    } else {
                        debug!(ticks, "ignoring marker outside a recording");
                    }
                }
                EngineEvent::Stop => {
                    if let Some((epoch, started)) = recording {
                        return Ok(CaptureOutcome::Captured(Capture {
                            raw,
                            epoch,
                            duration: started.elapsed(),
                        }));
                    }
                    debug!("ignoring STOP outside a recording");
                }
                other @ (EngineEvent::Continue | EngineEvent::Quit) => {
                    debug!(event = ?other, "ignoring button while waiting for a recording");
                }
                EngineEvent::Malformed(line) => return Err(CaptureError::Protocol { line }),
                EngineEvent::ReadFailed(reason) => return Err(CaptureError::Link(reason)),
                EngineEvent::Closed => return Err(CaptureError::Disconnected),
            }
        }
    }

    fn await_continue_or_quit(&mut self, stop: &StopSignal) -> Result<Decision, CaptureError> {
        let events = self.events()?;

        loop {
            let event = select! {
                recv(stop.receiver()) -> _ => return Ok(Decision::Quit),
                recv(events) -> event => event.map_err(|_| CaptureError::Disconnected)?,
            };

            match event {
                EngineEvent::Continue => return Ok(Decision::Continue),
                EngineEvent::Quit => return Ok(Decision::Quit),
                EngineEvent::Malformed(line) => return Err(CaptureError::Protocol { line }),
                EngineEvent::ReadFailed(reason) => return Err(CaptureError::Link(reason)),
                EngineEvent::Closed => return Err(CaptureError::Disconnected),
                other => debug!(event = ?other, "ignoring event while waiting for a button"),
            }
        }
    }
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.running = false;
        self.release_link();
    }
}

/// Reader thread body: forward parsed lines until EOF, a read error or the
/// engine dropping the link.
fn read_events(stream: Box<dyn Read + Send>, sender: Sender<EngineEvent>) {
    for line in BufReader::new(stream).lines() {
        let event = match line {
            Ok(line) => match parse_line(&line) {
                Some(event) => event,
                None => continue,
            },
            Err(e) => {
                let _ = sender.send(EngineEvent::ReadFailed(e.to_string()));
                return;
            }
        };
        if sender.send(event).is_err() {
            return;
        }
    }

    let _ = sender.send(EngineEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stop::stop_pair;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn engine_over(script: &'static str) -> StreamEngine {
        StreamEngine::from_opener("test", move || {
            Ok(Box::new(Cursor::new(script.as_bytes().to_vec())) as Box<dyn Read + Send>)
        })
    }

    fn request() -> CaptureRequest {
        CaptureRequest {
            task: "pick".to_string(),
            attempt: 1,
            raw_path: PathBuf::from("pick_1.aedat"),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("START 1700000000"),
            Some(EngineEvent::Start { epoch: 1700000000 })
        );
        assert_eq!(parse_line("  mark 42 "), Some(EngineEvent::Mark(42)));
        assert_eq!(parse_line("STOP"), Some(EngineEvent::Stop));
        assert_eq!(parse_line("CONTINUE"), Some(EngineEvent::Continue));
        assert_eq!(parse_line("QUIT"), Some(EngineEvent::Quit));
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("# board ready"), None);
    }

    #[test]
    fn test_parse_line_malformed() {
        for line in ["MARK", "MARK -1", "MARK 1 2", "STOP now", "HELLO", "START x"] {
            assert!(
                matches!(parse_line(line), Some(EngineEvent::Malformed(_))),
                "{line:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_capture_then_decisions() {
        let mut engine = engine_over(
            "MARK 9\nSTOP\nSTART 1000\nMARK 1\nMARK 2\nSTOP\nQUIT\nCONTINUE\n\
             START 2000\nSTOP\nQUIT\n",
        );
        engine.start().unwrap();
        let stop = StopSignal::never();

        match engine.capture_once(&request(), &stop).unwrap() {
            CaptureOutcome::Captured(capture) => {
                assert_eq!(capture.raw, vec![1, 2]);
                assert_eq!(capture.epoch, 1000);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.await_continue_or_quit(&stop).unwrap(), Decision::Quit);
        assert_eq!(
            engine.await_continue_or_quit(&stop).unwrap(),
            Decision::Continue
        );

        match engine.capture_once(&request(), &stop).unwrap() {
            CaptureOutcome::Captured(capture) => {
                assert!(capture.raw.is_empty());
                assert_eq!(capture.epoch, 2000);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.await_continue_or_quit(&stop).unwrap(), Decision::Quit);

        // Stream exhausted
        assert_eq!(
            engine.capture_once(&request(), &stop),
            Err(CaptureError::Disconnected)
        );
        engine.stop();
    }

    #[test]
    fn test_protocol_violation_is_fatal() {
        let mut engine = engine_over("START 1\nMARK oops\nSTOP\n");
        engine.start().unwrap();
        let err = engine
            .capture_once(&request(), &StopSignal::never())
            .unwrap_err();
        assert_eq!(
            err,
            CaptureError::Protocol {
                line: "MARK oops".to_string()
            }
        );
    }

    #[test]
    fn test_hardware_unavailable() {
        let mut engine = StreamEngine::device("/nonexistent/davis-capture-board");
        let err = engine.start().unwrap_err();
        assert!(matches!(err, CaptureError::HardwareUnavailable { .. }));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_not_running() {
        let mut engine = engine_over("");
        assert_eq!(
            engine.capture_once(&request(), &StopSignal::never()),
            Err(CaptureError::NotRunning)
        );
    }

    #[test]
    fn test_stop_interrupts_capture() {
        // A link that never produces data
        let (_keep, link_rx) = crossbeam_channel::bounded::<()>(0);
        let mut engine = StreamEngine::from_opener("quiet", move || {
            Ok(Box::new(BlockingLink(link_rx.clone())) as Box<dyn Read + Send>)
        });
        engine.start().unwrap();

        let (mut trigger, signal) = stop_pair();
        trigger.fire();
        assert_eq!(
            engine.capture_once(&request(), &signal).unwrap(),
            CaptureOutcome::Interrupted
        );
        assert_eq!(
            engine.await_continue_or_quit(&signal).unwrap(),
            Decision::Quit
        );

        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_capture_timeout() {
        let (_keep, link_rx) = crossbeam_channel::bounded::<()>(0);
        let mut engine = StreamEngine::from_opener("quiet", move || {
            Ok(Box::new(BlockingLink(link_rx.clone())) as Box<dyn Read + Send>)
        });
        engine.start().unwrap();

        let mut req = request();
        req.timeout = Some(Duration::from_millis(30));
        assert_eq!(
            engine.capture_once(&req, &StopSignal::never()),
            Err(CaptureError::TimedOut(Duration::from_millis(30)))
        );
    }

    #[test]
    fn test_restart_after_stop() {
        let mut engine = engine_over("START 5\nMARK 1\nSTOP\n");
        engine.start().unwrap();
        assert_eq!(engine.start(), Err(CaptureError::AlreadyRunning));
        engine.stop();

        engine.start().unwrap();
        let outcome = engine
            .capture_once(&request(), &StopSignal::never())
            .unwrap();
        assert!(matches!(outcome, CaptureOutcome::Captured(_)));
    }

    #[test]
    fn test_restart_keeps_lines_sent_while_stopped() {
        let (board, feed) = crossbeam_channel::unbounded::<&'static str>();
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = opens.clone();
        let mut engine = StreamEngine::from_opener("tty", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(LineLink::new(feed.clone())) as Box<dyn Read + Send>)
        });

        engine.start().unwrap();
        board.send("START 1\n").unwrap();
        board.send("MARK 7\n").unwrap();

        let (mut trigger, signal) = stop_pair();
        trigger.fire();
        assert_eq!(
            engine.capture_once(&request(), &signal).unwrap(),
            CaptureOutcome::Interrupted
        );
        engine.stop();
        assert!(!engine.is_running());

        // Pressed between sessions, before the engine is started again
        board.send("START 5\n").unwrap();
        engine.start().unwrap();
        for line in ["MARK 1\n", "MARK 2\n", "STOP\n"] {
            board.send(line).unwrap();
        }

        match engine.capture_once(&request(), &StopSignal::never()).unwrap() {
            CaptureOutcome::Captured(capture) => {
                assert_eq!(capture.raw, vec![1, 2]);
                assert_eq!(capture.epoch, 5);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        engine.stop();
    }

    #[test]
    fn test_closed_link_is_reopened() {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = opens.clone();
        let mut engine = StreamEngine::from_opener("fifo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Cursor::new(b"START 3\nMARK 4\nSTOP\n".to_vec())) as Box<dyn Read + Send>)
        });

        engine.start().unwrap();
        let stop = StopSignal::never();
        assert!(matches!(
            engine.capture_once(&request(), &stop).unwrap(),
            CaptureOutcome::Captured(_)
        ));
        assert_eq!(
            engine.await_continue_or_quit(&stop),
            Err(CaptureError::Disconnected)
        );

        // Closed is the reader's last send, so it is about to finish.
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.link.as_ref().is_some_and(|link| !link.is_closed()) {
            assert!(Instant::now() < deadline, "reader did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
        engine.stop();
        assert!(engine.link.is_none());

        engine.start().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert!(matches!(
            engine.capture_once(&request(), &stop).unwrap(),
            CaptureOutcome::Captured(capture) if capture.epoch == 3
        ));
    }

    /// Reader handing out one line per `read`, like a tty in canonical mode.
    struct LineLink {
        feed: Receiver<&'static str>,
        pending: Vec<u8>,
    }

    impl LineLink {
        fn new(feed: Receiver<&'static str>) -> Self {
            Self {
                feed,
                pending: Vec::new(),
            }
        }
    }

    impl Read for LineLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                match self.feed.recv() {
                    Ok(line) => self.pending.extend_from_slice(line.as_bytes()),
                    Err(_) => return Ok(0),
                }
            }
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }
    }

    /// Reader that blocks until its channel disconnects, then reports EOF.
    struct BlockingLink(Receiver<()>);

    impl Read for BlockingLink {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }
}
