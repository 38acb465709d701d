//! Backpressure-propagating body stream
//!
//! Decouples a push-based message-body producer from a consumer that can
//! signal "slow down". Chunks are forwarded in strict FIFO order and
//! buffered only while the consumer is paused; pause and resume are
//! propagated to the producer so memory use stays bounded no matter how
//! the two sides' speeds diverge.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::error::{ConfigError, FlowError, ProtocolViolation};

/// Content transform applied to chunks before forwarding.
///
/// Only the pass-through binary transform is supported; requesting any
/// other is a misconfiguration and is rejected before any data is
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTransform {
    /// Pass chunks through untouched.
    Binary,
    /// Base64 re-encoding. Not supported.
    Base64,
    /// Quoted-printable re-encoding. Not supported.
    QuotedPrintable,
}

impl ContentTransform {
    const fn name(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
        }
    }
}

/// Flow verdict returned by a consumer for each delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFlow {
    /// The consumer can keep up; keep forwarding.
    Ready,
    /// The consumer is congested; pause until it signals drain-ready.
    Busy,
}

/// Consumer side of the stream: the outbound transport.
pub trait ChunkSink: Send {
    /// Deliver one chunk. The returned verdict is the consumer's
    /// congestion signal.
    fn deliver(&mut self, chunk: &[u8]) -> SinkFlow;

    /// Receive the terminal end signal. Called exactly once.
    fn end(&mut self);
}

/// Producer side of the stream: the message-body source.
///
/// Pause propagation is unconditional, even when the stream is already
/// paused, so implementations must tolerate redundant pause and resume
/// signals.
pub trait BodySource: Send {
    /// Stop producing until resumed.
    fn pause(&mut self);

    /// Start producing again.
    fn resume(&mut self);
}

/// Consumer lifecycle signal, reported by the transport that owns the
/// sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    /// The consumer drained its internal buffer and can accept more.
    DrainReady,
    /// The consumer finished its side of the exchange.
    Ended,
    /// The consumer disconnected. Ordinary lifecycle, not a failure.
    Closed,
}

/// Push-based chunk stream with pause/resume buffering and producer
/// backpressure propagation.
///
/// A fresh stream is paused until a consumer is attached; attaching is
/// the signal that the consumer is ready to flow. After the terminal end
/// has been emitted the stream is finished and further pushes are
/// protocol violations.
pub struct BackpressureStream {
    transform: ContentTransform,
    sink: Option<Box<dyn ChunkSink>>,
    source: Option<Box<dyn BodySource>>,
    buffer: VecDeque<Vec<u8>>,
    paused: bool,
    end_pending: bool,
    ended: bool,
}

impl std::fmt::Debug for BackpressureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureStream")
            .field("transform", &self.transform)
            .field("attached", &self.sink.is_some())
            .field("buffered", &self.buffer.len())
            .field("paused", &self.paused)
            .field("end_pending", &self.end_pending)
            .field("ended", &self.ended)
            .finish()
    }
}

impl BackpressureStream {
    /// Create a stream for one transmission attempt.
    ///
    /// # Errors
    /// Rejects any transform other than [`ContentTransform::Binary`]
    /// before any data is accepted.
    pub fn new(transform: ContentTransform) -> Result<Self, FlowError> {
        if transform != ContentTransform::Binary {
            return Err(ConfigError::UnsupportedTransform(transform.name().to_string()).into());
        }

        Ok(Self {
            transform,
            sink: None,
            source: None,
            buffer: VecDeque::new(),
            paused: true,
            end_pending: false,
            ended: false,
        })
    }

    /// Attach the consumer and begin forwarding.
    ///
    /// A fresh attachment is assumed ready to flow, so this clears the
    /// paused state and drains anything buffered while unattached.
    pub fn attach(&mut self, sink: Box<dyn ChunkSink>) {
        self.sink = Some(sink);
        self.resume();
    }

    /// Attach the producer back-reference that pause/resume propagate to.
    pub fn set_source(&mut self, source: Box<dyn BodySource>) {
        self.source = Some(source);
    }

    /// Push one body chunk into the stream.
    ///
    /// Buffered while paused, forwarded immediately otherwise.
    ///
    /// # Errors
    /// [`ProtocolViolation::PushAfterEnd`] once the terminal end has been
    /// emitted.
    pub fn push(&mut self, chunk: Vec<u8>) -> Result<(), FlowError> {
        if self.ended {
            return Err(ProtocolViolation::PushAfterEnd.into());
        }

        if self.paused {
            trace!(buffered = self.buffer.len() + 1, "buffering chunk while paused");
            self.buffer.push_back(chunk);
        } else {
            self.forward(&chunk);
        }

        Ok(())
    }

    /// Signal that the producer has no more chunks.
    ///
    /// While paused and not forced this only records the pending end; the
    /// terminal end is emitted automatically once a later resume drains
    /// the buffer. Forced, it drains the buffer fully and ends
    /// regardless of pause state. Idempotent after the end has been
    /// emitted.
    ///
    /// # Errors
    /// [`ProtocolViolation::EndWithoutConsumer`] when forced on a stream
    /// that has no consumer to receive the drained chunks.
    pub fn signal_end(&mut self, force: bool) -> Result<(), FlowError> {
        if self.ended {
            return Ok(());
        }

        if self.paused && !force {
            self.end_pending = true;
            return Ok(());
        }

        if self.sink.is_none() {
            return Err(ProtocolViolation::EndWithoutConsumer.into());
        }

        // Forced or flowing: every buffered chunk goes out in order, then
        // the terminal end, pause state notwithstanding.
        while let Some(chunk) = self.buffer.pop_front() {
            self.forward(&chunk);
        }
        self.emit_end();
        Ok(())
    }

    /// Pause forwarding and propagate the pause to the producer.
    ///
    /// Propagation is unconditional even when already paused: the
    /// producer's own state may have drifted, and a redundant pause is
    /// required to be tolerated on its side.
    pub fn pause(&mut self) {
        self.paused = true;
        if let Some(source) = self.source.as_mut() {
            source.pause();
        }
    }

    /// Resume forwarding: propagate resume to the producer, then drain
    /// the buffer in arrival order.
    ///
    /// A pause arriving mid-drain stops the drain immediately; the
    /// remaining chunks stay buffered for the next resume, with no
    /// re-forwarding and no duplication. Once the buffer empties without
    /// interruption, a pending end is emitted.
    pub fn resume(&mut self) {
        self.paused = false;
        if let Some(source) = self.source.as_mut() {
            source.resume();
        }
        self.drain();
    }

    /// Report a consumer lifecycle signal.
    ///
    /// Any signal resumes a paused stream; [`SinkEvent::Closed`]
    /// additionally tears the stream down: the producer is released
    /// rather than left waiting for a drain that will never arrive, and
    /// no failure is surfaced.
    pub fn sink_event(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::DrainReady | SinkEvent::Ended => {
                if self.paused {
                    self.resume();
                }
            }
            SinkEvent::Closed => self.teardown(),
        }
    }

    /// Whether the terminal end has been emitted.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Whether the stream is currently paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Number of chunks currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Forward one chunk through the configured transform. A `Busy`
    /// verdict from the sink pauses the stream.
    fn forward(&mut self, chunk: &[u8]) {
        let Some(sink) = self.sink.as_mut() else {
            // Unattached streams are always paused, so chunks can only
            // reach here between attach() installing the sink and the
            // drain that follows.
            return;
        };

        // Binary is the only constructible transform and is a
        // pass-through, so the chunk goes out untouched.
        debug_assert_eq!(self.transform, ContentTransform::Binary);

        if sink.deliver(chunk) == SinkFlow::Busy {
            debug!("consumer congested, pausing producer");
            self.pause();
        }
    }

    fn drain(&mut self) {
        while !self.paused {
            let Some(chunk) = self.buffer.pop_front() else {
                break;
            };
            self.forward(&chunk);
        }

        if !self.paused && self.buffer.is_empty() && self.end_pending {
            self.emit_end();
        }
    }

    fn emit_end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.end_pending = false;
        if let Some(sink) = self.sink.as_mut() {
            sink.end();
        }
    }

    /// Consumer disconnect: release a paused producer, drop whatever was
    /// buffered for the vanished consumer, and finish the stream.
    fn teardown(&mut self) {
        debug!(buffered = self.buffer.len(), "consumer disconnected, tearing stream down");
        self.paused = false;
        if let Some(source) = self.source.as_mut() {
            source.resume();
        }
        self.buffer.clear();
        self.sink = None;
        self.ended = true;
        self.end_pending = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Recording sink that can be scripted to report congestion on
    /// exactly one delivery.
    #[derive(Default)]
    struct RecordingSink {
        chunks: Arc<Mutex<Vec<Vec<u8>>>>,
        ends: Arc<Mutex<u32>>,
        busy_at: Option<usize>,
    }

    impl RecordingSink {
        fn new() -> (Self, Arc<Mutex<Vec<Vec<u8>>>>, Arc<Mutex<u32>>) {
            let chunks = Arc::new(Mutex::new(Vec::new()));
            let ends = Arc::new(Mutex::new(0));
            (
                Self {
                    chunks: Arc::clone(&chunks),
                    ends: Arc::clone(&ends),
                    busy_at: None,
                },
                chunks,
                ends,
            )
        }
    }

    impl ChunkSink for RecordingSink {
        fn deliver(&mut self, chunk: &[u8]) -> SinkFlow {
            let mut chunks = self.chunks.lock().unwrap();
            chunks.push(chunk.to_vec());
            match self.busy_at {
                Some(n) if chunks.len() == n => SinkFlow::Busy,
                _ => SinkFlow::Ready,
            }
        }

        fn end(&mut self) {
            *self.ends.lock().unwrap() += 1;
        }
    }

    /// Source that records how often it was paused/resumed.
    #[derive(Default)]
    struct RecordingSource {
        pauses: Arc<Mutex<u32>>,
        resumes: Arc<Mutex<u32>>,
    }

    impl BodySource for RecordingSource {
        fn pause(&mut self) {
            *self.pauses.lock().unwrap() += 1;
        }

        fn resume(&mut self) {
            *self.resumes.lock().unwrap() += 1;
        }
    }

    fn chunk(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    fn observed(chunks: &Arc<Mutex<Vec<Vec<u8>>>>) -> Vec<String> {
        chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }

    #[test]
    fn only_binary_transform_is_accepted() {
        assert!(BackpressureStream::new(ContentTransform::Binary).is_ok());

        let err = BackpressureStream::new(ContentTransform::Base64).unwrap_err();
        assert!(err.is_config());

        let err = BackpressureStream::new(ContentTransform::QuotedPrintable).unwrap_err();
        assert!(err.to_string().contains("quoted-printable"));
    }

    #[test]
    fn flowing_chunks_are_forwarded_immediately_in_order() {
        let (sink, chunks, _ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));

        stream.push(chunk("one")).unwrap();
        stream.push(chunk("two")).unwrap();
        stream.push(chunk("three")).unwrap();

        assert_eq!(observed(&chunks), ["one", "two", "three"]);
        assert_eq!(stream.buffered(), 0);
    }

    #[test]
    fn paused_chunks_are_buffered_then_drained_in_order() {
        let (sink, chunks, ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));

        stream.push(chunk("one")).unwrap();
        stream.push(chunk("two")).unwrap();
        stream.push(chunk("three")).unwrap();

        stream.pause();
        stream.push(chunk("four")).unwrap();
        stream.push(chunk("five")).unwrap();
        stream.signal_end(false).unwrap();

        // Nothing further observed while paused, and no end yet.
        assert_eq!(observed(&chunks), ["one", "two", "three"]);
        assert_eq!(*ends.lock().unwrap(), 0);

        stream.resume();

        assert_eq!(observed(&chunks), ["one", "two", "three", "four", "five"]);
        assert_eq!(*ends.lock().unwrap(), 1);
        assert!(stream.is_ended());
    }

    #[test]
    fn end_is_emitted_exactly_once() {
        let (sink, _chunks, ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));

        stream.push(chunk("data")).unwrap();
        stream.signal_end(false).unwrap();
        stream.signal_end(false).unwrap();
        stream.signal_end(true).unwrap();

        assert_eq!(*ends.lock().unwrap(), 1);
    }

    #[test]
    fn push_after_end_is_a_protocol_violation() {
        let (sink, _chunks, _ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));
        stream.signal_end(false).unwrap();

        let err = stream.push(chunk("late")).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn forced_end_drains_even_while_paused() {
        let (sink, chunks, ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));

        stream.pause();
        stream.push(chunk("one")).unwrap();
        stream.push(chunk("two")).unwrap();
        stream.signal_end(true).unwrap();

        assert_eq!(observed(&chunks), ["one", "two"]);
        assert_eq!(*ends.lock().unwrap(), 1);
    }

    #[test]
    fn busy_sink_pauses_stream_and_producer() {
        let (mut sink, chunks, _ends) = RecordingSink::new();
        sink.busy_at = Some(1);

        let source = RecordingSource::default();
        let pauses = Arc::clone(&source.pauses);

        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));
        stream.set_source(Box::new(source));

        stream.push(chunk("one")).unwrap();
        assert!(stream.is_paused());
        assert_eq!(*pauses.lock().unwrap(), 1);

        // Subsequent chunks buffer instead of reaching the sink.
        stream.push(chunk("two")).unwrap();
        assert_eq!(observed(&chunks), ["one"]);
        assert_eq!(stream.buffered(), 1);
    }

    #[test]
    fn pause_mid_drain_stops_without_duplication() {
        let (mut sink, chunks, ends) = RecordingSink::new();
        // Congested again after the second delivered chunk.
        sink.busy_at = Some(2);

        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));

        stream.pause();
        for name in ["one", "two", "three", "four"] {
            stream.push(chunk(name)).unwrap();
        }
        stream.signal_end(false).unwrap();

        stream.resume();

        // Drain stopped after "two"; "three" and "four" remain buffered,
        // and the pending end did not fire.
        assert_eq!(observed(&chunks), ["one", "two"]);
        assert_eq!(stream.buffered(), 2);
        assert_eq!(*ends.lock().unwrap(), 0);

        // Drain-ready from the consumer resumes from the next unsent
        // chunk.
        stream.sink_event(SinkEvent::DrainReady);
        assert_eq!(observed(&chunks), ["one", "two", "three", "four"]);
        assert_eq!(*ends.lock().unwrap(), 1);
    }

    #[test]
    fn redundant_pause_propagates_to_producer_each_time() {
        let source = RecordingSource::default();
        let pauses = Arc::clone(&source.pauses);

        let (sink, _chunks, _ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));
        stream.set_source(Box::new(source));

        stream.pause();
        stream.pause();
        stream.pause();

        // The producer's state may have drifted; every pause reaches it.
        assert_eq!(*pauses.lock().unwrap(), 3);
    }

    #[test]
    fn chunks_pushed_before_attach_flow_on_attach() {
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        assert!(stream.is_paused());

        stream.push(chunk("early")).unwrap();
        stream.signal_end(false).unwrap();

        let (sink, chunks, ends) = RecordingSink::new();
        stream.attach(Box::new(sink));

        assert_eq!(observed(&chunks), ["early"]);
        assert_eq!(*ends.lock().unwrap(), 1);
    }

    #[test]
    fn forced_end_without_consumer_is_a_protocol_violation() {
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.push(chunk("data")).unwrap();

        let err = stream.signal_end(true).unwrap_err();
        assert!(err.is_protocol());
        // Fail fast, no partial mutation: the chunk is still buffered.
        assert_eq!(stream.buffered(), 1);
        assert!(!stream.is_ended());
    }

    #[test]
    fn consumer_disconnect_releases_paused_producer() {
        let source = RecordingSource::default();
        let resumes = Arc::clone(&source.resumes);

        let (sink, _chunks, ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));
        stream.set_source(Box::new(source));

        stream.pause();
        stream.push(chunk("stranded")).unwrap();

        let resumes_before = *resumes.lock().unwrap();
        stream.sink_event(SinkEvent::Closed);

        // The producer is released rather than stalled indefinitely, the
        // stream finishes, and no end reaches the vanished consumer.
        assert_eq!(*resumes.lock().unwrap(), resumes_before + 1);
        assert!(stream.is_ended());
        assert_eq!(stream.buffered(), 0);
        assert_eq!(*ends.lock().unwrap(), 0);

        // Not an error for the producer beyond the usual end-of-stream
        // contract.
        assert!(stream.push(chunk("late")).is_err());
    }

    #[test]
    fn ended_event_resumes_a_paused_stream() {
        let (sink, chunks, _ends) = RecordingSink::new();
        let mut stream = BackpressureStream::new(ContentTransform::Binary).unwrap();
        stream.attach(Box::new(sink));

        stream.pause();
        stream.push(chunk("held")).unwrap();
        stream.sink_event(SinkEvent::Ended);

        assert_eq!(observed(&chunks), ["held"]);
        assert!(!stream.is_paused());
    }
}
