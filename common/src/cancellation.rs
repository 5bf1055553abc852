//! Cooperative cancellation.
//!
//! A run is interrupted only at explicit checkpoints; code between two
//! checkpoints always completes.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The run was cancelled at a checkpoint. Distinct from any failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Checkpoint: `Err(Cancelled)` once `token` has fired.
pub fn ensure_active(token: &CancellationToken) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_follows_token() {
        let token = CancellationToken::new();
        assert!(ensure_active(&token).is_ok());
        let child = token.child_token();
        token.cancel();
        assert_eq!(ensure_active(&token), Err(Cancelled));
        assert_eq!(ensure_active(&child), Err(Cancelled));
    }
}
