//! Pipeline stages for a single conversion.
//!
//! Each submodule implements exactly one step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! Input ──▶ classify ──▶ materialize ──▶ workspace ──▶ descriptor ──▶ engine
//! (any)     (pure)       (async I/O)     (write in)    (params.xml)    (run)
//!                                            ▲                           │
//!                                            └──── read out, media ◀─────┘
//! ```
//!
//! 1. [`input`]: the closed set of representations a document arrives in
//! 2. [`classify`]: decide which one a value is; strings are refined into
//!    URL kinds or text
//! 3. [`materialize`]: resolve the value to canonical bytes, one strategy
//!    per representation
//! 4. [`workspace`]: name sanitisation, per-request directories, media
//!    harvest, purge
//! 5. [`descriptor`]: render the engine's XML job descriptor

pub mod classify;
pub mod descriptor;
pub mod input;
pub mod materialize;
pub mod workspace;
