//! Guardrail Filter - content-inspection gate for an HTTP filter chain.
//!
//! The filter intercepts either the request or the response body of a
//! stream, buffers it to completion, classifies the extracted text with the
//! runtime from [`guardrail_inference`], and allows or denies the stream
//! per the configured policy.
//!
//! ## Architecture
//!
//! ```text
//! body chunk ──▶ inspected side? ──no──▶ Continue (passthrough)
//!                     │ yes
//!                     ▼
//!               end of stream? ──no──▶ StopIterationAndBuffer
//!                     │ yes
//!                     ▼
//!             merge + extract "text" ──▶ classify (once)
//!                     │
//!        ┌────────────┴────────────┐
//!        │ policy satisfied        │ policy violated
//!        ▼                         ▼
//!    Continue               local reply 403/500
//!  (release buffered body)  (no body leaks downstream)
//! ```
//!
//! The host proxy owns the stream, the accumulation buffer, and the callback
//! schedule; its side of the contract is pinned down by [`StreamHandle`] and
//! the status enums in [`stream`].

mod config;
mod error;
mod extract;
mod filter;
mod stream;

pub use config::{FilterFactory, GuardrailSettings, FILTER_NAME};
pub use error::{FilterError, Result};
pub use extract::extract_text;
pub use filter::{Action, Filter, FilterConfig, Source};
pub use stream::{DataStatus, HeadersStatus, MetadataStatus, StreamHandle, TrailersStatus};
