//! Pipeline stages for layout extraction.
//!
//! Each submodule implements exactly one step of the per-page sequence and
//! is testable on its own; [`crate::extract`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ edges ──▶ score ──▶ select ──▶ split ──▶ recognize ──▶ validate
//! (paths)  (invert)  (borders) (threshold) (crops)   (vision)      (schema)
//! ```
//!
//! 1. [`input`]:   resolve the file or directory to ordered page paths and
//!    derive every sibling output path
//! 2. [`edges`]:   greyscale + invert the page into an edge map; decoding
//!    runs in `spawn_blocking`
//! 3. [`score`]:   border edge density of each template slot
//! 4. [`select`]:  lowest score wins, above [`crate::templates::ACCEPTANCE_THRESHOLD`]
//!    nothing does
//! 5. [`split`]:   crop photo and caption regions per slot
//! 6. [`recognize`]: read each caption through a [`recognize::RecognitionBackend`]
//!    under the [`limiter`] and call-level retry; the only stage with network I/O
//! 7. [`validate`]: structural check gating both skip-on-existing and persist

pub mod edges;
pub mod encode;
pub mod input;
pub mod limiter;
pub mod recognize;
pub mod score;
pub mod select;
pub mod split;
pub mod validate;
