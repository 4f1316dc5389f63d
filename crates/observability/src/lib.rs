//! Process-wide tracing setup shared by the binaries and tests.

pub mod subscriber;

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    subscriber::init(subscriber::DEFAULT_FILTER);
}
