//! Bridge from the synchronous resolver API to async transfer clients.
//!
//! Localization is blocking from the caller's point of view; the HTTP client
//! is async. This module drives a future to completion, reusing the current
//! Tokio runtime when one exists.

use std::future::Future;
use std::io;

use tokio::{runtime::Handle, task};

/// Run `future` to completion from synchronous code.
///
/// # Arguments
/// - `future`: The future to drive; usually one HTTP transfer.
///
/// # Returns
/// The future's output, or an I/O error if a Tokio runtime cannot be built.
///
/// # Notes
/// - Inside a multi-threaded runtime the current worker is parked with `block_in_place`.
/// - Elsewhere a throwaway current-thread runtime is built.
pub fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: Future,
{
    if let Ok(handle) = Handle::try_current() {
        Ok(task::block_in_place(|| handle.block_on(future)))
    } else {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        Ok(runtime.block_on(future))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_future_without_ambient_runtime() {
        let value = block_on(async { 40 + 2 }).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reuses_multi_thread_runtime() {
        let value = block_on(async { "inside" }).unwrap();
        assert_eq!(value, "inside");
    }
}
