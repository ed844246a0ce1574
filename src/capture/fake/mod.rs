// Fake capture backend for testing
//
// This module provides a scriptable implementation of CaptureBackend for use
// in tests without requiring actual portal/PipeWire/GStreamer integration.

mod backend;

pub use backend::{FakeCaptureBackend, FakeOutcome};

#[cfg(test)]
mod tests;
