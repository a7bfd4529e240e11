//! Per-stream buffering/decision state machine.

use std::sync::Arc;

use http::StatusCode;
use serde::Deserialize;

use guardrail_inference::{InferenceRuntime, InferenceSession};

use crate::error::Result;
use crate::extract::extract_text;
use crate::stream::{DataStatus, HeadersStatus, MetadataStatus, StreamHandle, TrailersStatus};

/// Which side of the stream the filter inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Inspect the request body.
    Request,
    /// Inspect the response body.
    Response,
}

/// What a classifier match means for the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Matched content is allowed through; everything else is denied.
    Allow,
    /// Matched content is denied; everything else is allowed through.
    Deny,
}

/// Immutable filter configuration, shared by every stream of a filter chain.
pub struct FilterConfig {
    runtime: Arc<dyn InferenceRuntime>,
    source: Source,
    action: Action,
}

impl FilterConfig {
    /// Creates a configuration around an already-constructed runtime.
    pub fn new(runtime: Arc<dyn InferenceRuntime>, source: Source, action: Action) -> Self {
        Self {
            runtime,
            source,
            action,
        }
    }

    /// Creates a new inference session for one stream.
    pub fn create_session(&self) -> Box<dyn InferenceSession> {
        Arc::clone(&self.runtime).create_session()
    }

    /// The inspected side of the stream.
    pub fn source(&self) -> Source {
        self.source
    }

    /// The configured policy action.
    pub fn action(&self) -> Action {
        self.action
    }
}

/// The per-stream filter.
///
/// One instance per HTTP stream, owning one inference session. Only the
/// configured side of the stream is ever inspected; the other side passes
/// through untouched. The inspected side buffers chunks via the host until
/// end of stream, classifies the reassembled body exactly once, and either
/// releases the buffered body or terminates the stream with a local reply.
pub struct Filter {
    config: Arc<FilterConfig>,
    session: Box<dyn InferenceSession>,
}

impl Filter {
    /// Creates a filter for a new stream.
    pub fn new(config: Arc<FilterConfig>) -> Self {
        let session = config.create_session();
        Self { config, session }
    }

    /// Called when the host tears the stream down. A stream destroyed before
    /// its decision point never classifies; that is not an error.
    pub fn on_destroy(&mut self) {}

    /// Request headers callback.
    pub fn decode_headers(&mut self, end_stream: bool) -> HeadersStatus {
        if self.config.source() == Source::Response || end_stream {
            return HeadersStatus::Continue;
        }
        // Hold the headers so nothing reaches upstream before the body is
        // vetted.
        HeadersStatus::StopIteration
    }

    /// Request body callback.
    pub fn decode_data(
        &mut self,
        stream: &mut dyn StreamHandle,
        data: &[u8],
        end_stream: bool,
    ) -> Result<DataStatus> {
        self.inspect(stream, data, end_stream, Source::Request)
    }

    /// Request trailers callback.
    pub fn decode_trailers(&mut self) -> TrailersStatus {
        TrailersStatus::Continue
    }

    /// Informational (1xx) response headers callback.
    pub fn encode_1xx_headers(&mut self) -> HeadersStatus {
        HeadersStatus::Continue
    }

    /// Response headers callback.
    pub fn encode_headers(&mut self, end_stream: bool) -> HeadersStatus {
        if self.config.source() == Source::Request || end_stream {
            return HeadersStatus::Continue;
        }
        HeadersStatus::StopIteration
    }

    /// Response body callback.
    pub fn encode_data(
        &mut self,
        stream: &mut dyn StreamHandle,
        data: &[u8],
        end_stream: bool,
    ) -> Result<DataStatus> {
        self.inspect(stream, data, end_stream, Source::Response)
    }

    /// Response trailers callback.
    pub fn encode_trailers(&mut self) -> TrailersStatus {
        TrailersStatus::Continue
    }

    /// Response metadata callback.
    pub fn encode_metadata(&mut self) -> MetadataStatus {
        MetadataStatus::Continue
    }

    /// Shared decision logic for both directions.
    ///
    /// Runs at most once per stream with `end_stream` true, because the host
    /// delivers exactly one end-of-stream data callback per direction.
    fn inspect(
        &mut self,
        stream: &mut dyn StreamHandle,
        data: &[u8],
        end_stream: bool,
        direction: Source,
    ) -> Result<DataStatus> {
        if self.config.source() != direction {
            return Ok(DataStatus::Continue);
        }

        if !end_stream {
            return Ok(DataStatus::StopIterationAndBuffer);
        }

        stream.add_buffered_data(data);
        let text = extract_text(stream.buffered_data().unwrap_or_default());

        let matched = match self.session.classify(&text) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!("Classification failed: {}", e);
                return Err(e.into());
            }
        };

        if (self.config.action() == Action::Allow && matched)
            || (self.config.action() == Action::Deny && !matched)
        {
            return Ok(DataStatus::Continue);
        }

        // A response-side denial cannot be surfaced as a clean 4xx once the
        // upstream has committed to a response.
        let status = match direction {
            Source::Request => StatusCode::FORBIDDEN,
            Source::Response => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::info!(
            "Denied {} body, replying {}",
            match direction {
                Source::Request => "request",
                Source::Response => "response",
            },
            status
        );

        stream.send_local_reply(status, "Access denied");
        Ok(DataStatus::StopIterationNoBuffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use guardrail_inference::InferenceError;

    /// Stream handle stub with the host's buffering behavior.
    #[derive(Default)]
    struct MockStream {
        buffer: Vec<u8>,
        reply: Option<(StatusCode, String)>,
    }

    impl StreamHandle for MockStream {
        fn add_buffered_data(&mut self, data: &[u8]) {
            self.buffer.extend_from_slice(data);
        }

        fn buffered_data(&self) -> Option<&[u8]> {
            if self.buffer.is_empty() {
                None
            } else {
                Some(&self.buffer)
            }
        }

        fn send_local_reply(&mut self, status: StatusCode, body: &str) {
            self.reply = Some((status, body.to_string()));
        }
    }

    /// Scripted session: matched iff the verdict closure says so.
    struct StubSession {
        verdict: fn(&str) -> std::result::Result<bool, InferenceError>,
        calls: Arc<AtomicUsize>,
        inputs: Arc<Mutex<Vec<String>>>,
    }

    impl InferenceSession for StubSession {
        fn classify(&mut self, input: &str) -> std::result::Result<bool, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push(input.to_string());
            (self.verdict)(input)
        }
    }

    struct StubRuntime {
        verdict: fn(&str) -> std::result::Result<bool, InferenceError>,
        calls: Arc<AtomicUsize>,
        inputs: Arc<Mutex<Vec<String>>>,
    }

    impl InferenceRuntime for StubRuntime {
        fn create_session(self: Arc<Self>) -> Box<dyn InferenceSession> {
            Box::new(StubSession {
                verdict: self.verdict,
                calls: Arc::clone(&self.calls),
                inputs: Arc::clone(&self.inputs),
            })
        }
    }

    /// Scores benign text above the threshold, spam below it.
    fn benign_matches(input: &str) -> std::result::Result<bool, InferenceError> {
        Ok(!input.contains("Free money"))
    }

    fn engine_fault(_: &str) -> std::result::Result<bool, InferenceError> {
        Err(InferenceError::Execution("engine fault".to_string()))
    }

    struct Harness {
        filter: Filter,
        calls: Arc<AtomicUsize>,
        inputs: Arc<Mutex<Vec<String>>>,
    }

    fn setup(
        source: Source,
        action: Action,
        verdict: fn(&str) -> std::result::Result<bool, InferenceError>,
    ) -> Harness {
        let calls = Arc::new(AtomicUsize::new(0));
        let inputs = Arc::new(Mutex::new(Vec::new()));
        let runtime = Arc::new(StubRuntime {
            verdict,
            calls: Arc::clone(&calls),
            inputs: Arc::clone(&inputs),
        });
        let config = Arc::new(FilterConfig::new(runtime, source, action));
        Harness {
            filter: Filter::new(config),
            calls,
            inputs,
        }
    }

    /// Delivers a request chunk the way the host would: a chunk answered
    /// with `StopIterationAndBuffer` lands in the accumulation buffer.
    fn decode_chunk(
        filter: &mut Filter,
        stream: &mut MockStream,
        chunk: &[u8],
        end_stream: bool,
    ) -> DataStatus {
        let status = filter.decode_data(stream, chunk, end_stream).unwrap();
        if status == DataStatus::StopIterationAndBuffer {
            stream.add_buffered_data(chunk);
        }
        status
    }

    fn encode_chunk(
        filter: &mut Filter,
        stream: &mut MockStream,
        chunk: &[u8],
        end_stream: bool,
    ) -> DataStatus {
        let status = filter.encode_data(stream, chunk, end_stream).unwrap();
        if status == DataStatus::StopIterationAndBuffer {
            stream.add_buffered_data(chunk);
        }
        status
    }

    #[test]
    fn request_allow() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();
        let status = decode_chunk(
            &mut h.filter,
            &mut stream,
            br#"{"text": "What a beautiful world!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::Continue);
        assert!(stream.reply.is_none());

        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();
        let status = decode_chunk(
            &mut h.filter,
            &mut stream,
            br#"{"text": "Free money!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::StopIterationNoBuffer);
        let (code, body) = stream.reply.unwrap();
        assert_eq!(code, StatusCode::FORBIDDEN);
        assert_eq!(body, "Access denied");
    }

    #[test]
    fn request_deny() {
        let mut h = setup(Source::Request, Action::Deny, benign_matches);
        let mut stream = MockStream::default();
        let status = decode_chunk(
            &mut h.filter,
            &mut stream,
            br#"{"text": "What a beautiful world!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::StopIterationNoBuffer);
        assert_eq!(stream.reply.unwrap().0, StatusCode::FORBIDDEN);

        let mut h = setup(Source::Request, Action::Deny, benign_matches);
        let mut stream = MockStream::default();
        let status = decode_chunk(
            &mut h.filter,
            &mut stream,
            br#"{"text": "Free money!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::Continue);
    }

    #[test]
    fn response_allow() {
        let mut h = setup(Source::Response, Action::Allow, benign_matches);
        let mut stream = MockStream::default();
        let status = encode_chunk(
            &mut h.filter,
            &mut stream,
            br#"{"text": "What a beautiful world!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::Continue);

        let mut h = setup(Source::Response, Action::Allow, benign_matches);
        let mut stream = MockStream::default();
        let status = encode_chunk(
            &mut h.filter,
            &mut stream,
            br#"{"text": "Free money!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::StopIterationNoBuffer);
        let (code, body) = stream.reply.unwrap();
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Access denied");
    }

    #[test]
    fn response_deny() {
        let mut h = setup(Source::Response, Action::Deny, benign_matches);
        let mut stream = MockStream::default();
        let status = encode_chunk(
            &mut h.filter,
            &mut stream,
            br#"{"text": "What a beautiful world!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::StopIterationNoBuffer);
        assert_eq!(stream.reply.unwrap().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn chunked_body_decides_after_last_chunk() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();

        let status = decode_chunk(&mut h.filter, &mut stream, br#"{"text": "What a"#, false);
        assert_eq!(status, DataStatus::StopIterationAndBuffer);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        let status = decode_chunk(
            &mut h.filter,
            &mut stream,
            br#" beautiful world!"}"#,
            true,
        );
        assert_eq!(status, DataStatus::Continue);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.inputs.lock().unwrap().as_slice(),
            ["What a beautiful world!"]
        );
    }

    #[test]
    fn non_inspected_direction_is_passthrough() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();

        assert_eq!(h.filter.encode_headers(false), HeadersStatus::Continue);
        let status = h
            .filter
            .encode_data(&mut stream, br#"{"text": "Free money!"}"#, true)
            .unwrap();
        assert_eq!(status, DataStatus::Continue);
        assert!(stream.buffer.is_empty());
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        let mut h = setup(Source::Response, Action::Allow, benign_matches);
        assert_eq!(h.filter.decode_headers(false), HeadersStatus::Continue);
        let status = h
            .filter
            .decode_data(&mut stream, br#"{"text": "Free money!"}"#, true)
            .unwrap();
        assert_eq!(status, DataStatus::Continue);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inspected_headers_held_until_decision() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        assert_eq!(h.filter.decode_headers(false), HeadersStatus::StopIteration);

        // A header frame that already ends the stream has no body to vet.
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        assert_eq!(h.filter.decode_headers(true), HeadersStatus::Continue);

        let mut h = setup(Source::Response, Action::Allow, benign_matches);
        assert_eq!(h.filter.encode_headers(false), HeadersStatus::StopIteration);
        assert_eq!(h.filter.encode_1xx_headers(), HeadersStatus::Continue);
    }

    #[test]
    fn trailers_and_metadata_continue() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        assert_eq!(h.filter.decode_trailers(), TrailersStatus::Continue);
        assert_eq!(h.filter.encode_trailers(), TrailersStatus::Continue);
        assert_eq!(h.filter.encode_metadata(), MetadataStatus::Continue);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn body_without_text_field_classifies_empty_string() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();
        let status = decode_chunk(&mut h.filter, &mut stream, b"{}", true);
        assert_eq!(status, DataStatus::Continue);
        assert_eq!(h.inputs.lock().unwrap().as_slice(), [""]);
    }

    #[test]
    fn unparseable_body_classifies_empty_string() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();
        decode_chunk(&mut h.filter, &mut stream, b"<html>nope</html>", true);
        assert_eq!(h.inputs.lock().unwrap().as_slice(), [""]);
    }

    #[test]
    fn classify_fault_propagates_without_local_reply() {
        let mut h = setup(Source::Request, Action::Allow, engine_fault);
        let mut stream = MockStream::default();
        let err = h
            .filter
            .decode_data(&mut stream, br#"{"text": "hello"}"#, true)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::FilterError::Inference(InferenceError::Execution(_))
        ));
        assert!(stream.reply.is_none());
    }

    #[test]
    fn classifies_exactly_once_per_stream() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();

        h.filter.decode_headers(false);
        decode_chunk(&mut h.filter, &mut stream, br#"{"text": "a"#, false);
        decode_chunk(&mut h.filter, &mut stream, br#"b"}"#, true);
        h.filter.decode_trailers();
        h.filter.on_destroy();

        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroyed_stream_never_classifies() {
        let mut h = setup(Source::Request, Action::Allow, benign_matches);
        let mut stream = MockStream::default();

        h.filter.decode_headers(false);
        decode_chunk(&mut h.filter, &mut stream, br#"{"text": "never fin"#, false);
        h.filter.on_destroy();

        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
        assert!(stream.reply.is_none());
    }
}
