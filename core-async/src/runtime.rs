//! Runtime construction for hosts that do not already own a Tokio runtime.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Builds a current-thread runtime and blocks the calling thread on `future`.
///
/// Returns an error if the runtime cannot be built. Must not be called from
/// a thread that is already driving a Tokio runtime.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
