//! Host-facing stream-filter interface.
//!
//! The filter runs inside a host proxy's filter chain and never owns the
//! stream itself. The host delivers header/data/trailer callbacks in body
//! order and interprets the returned statuses; the types here pin down that
//! contract without pulling in a host implementation.

use http::StatusCode;

/// Verdict for a headers callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersStatus {
    /// Forward the headers to the next filter.
    Continue,
    /// Hold the headers until a later callback continues the stream.
    StopIteration,
}

/// Verdict for a body-data callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStatus {
    /// Forward this chunk (and anything the host buffered) downstream.
    Continue,
    /// Hold iteration and append this chunk to the host's accumulation
    /// buffer.
    StopIterationAndBuffer,
    /// Hold iteration and drop the chunk; nothing buffered is forwarded.
    StopIterationNoBuffer,
}

/// Verdict for a trailers callback. Trailers never affect the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailersStatus {
    /// Forward the trailers.
    Continue,
}

/// Verdict for a metadata callback. Metadata never affects the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStatus {
    /// Forward the metadata.
    Continue,
}

/// Per-stream, per-direction handle into the host.
///
/// The host owns the accumulation buffer; the filter only asks it to merge
/// chunks and reads the accumulated view back. Contract:
///
/// - when a data callback returns [`DataStatus::StopIterationAndBuffer`],
///   the host appends that chunk to the accumulation buffer;
/// - [`StreamHandle::add_buffered_data`] merges a chunk into the buffer
///   immediately (used for the final chunk before the decision);
/// - [`StreamHandle::send_local_reply`] terminates the stream with a locally
///   generated response and discards any buffered body bytes.
pub trait StreamHandle {
    /// Merges a chunk into the accumulation buffer.
    fn add_buffered_data(&mut self, data: &[u8]);

    /// Returns the accumulated buffer, or `None` if nothing was buffered.
    fn buffered_data(&self) -> Option<&[u8]>;

    /// Terminates the stream with a locally generated error response.
    fn send_local_reply(&mut self, status: StatusCode, body: &str);
}
