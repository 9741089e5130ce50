use thiserror::Error;

/// Errors surfaced by the channel layer.
///
/// Handle operations are fire-and-forget into the driver task, so the
/// only failure a caller can see is the driver no longer being there.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The driver task has shut down; the handle is dead.
    #[error("channel driver has shut down")]
    Closed,
}
