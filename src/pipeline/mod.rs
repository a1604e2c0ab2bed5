//! Pipeline stages for batch image conversion.
//!
//! Each submodule implements exactly one step so it can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ naming ──▶ codec (decode → fit → encode loop) ──▶ archive
//! (bytes)   (ext swap)  (blocking pool, one item at a time)    (zip)
//! ```
//!
//! 1. [`input`]: `InputItem` and loading files from disk
//! 2. [`naming`]: output name = input name with the format's extension
//! 3. [`codec`]: the `Codec` seam and the default `ImageCodec`
//! 4. [`encode`]: per-format encoders and quality mapping
//! 5. [`archive`]: zip packaging with a collision policy

pub mod archive;
pub mod codec;
pub mod encode;
pub mod input;
pub mod naming;
