use crate::domain::repository::ClaimCandidate;

/// Orders claim candidates before the executor tries them.
///
/// The store already limits the batch, so a policy only reorders within it.
pub trait ClaimPolicy: Send + Sync {
    /// Put `candidates` in the order they should be tried
    fn order(&self, candidates: &mut Vec<ClaimCandidate>);
}

/// Oldest pending step first, ties broken by process id
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoByCreation;

impl ClaimPolicy for FifoByCreation {
    fn order(&self, candidates: &mut Vec<ClaimCandidate>) {
        candidates.sort_by(|a, b| {
            a.oldest_pending
                .cmp(&b.oldest_pending)
                .then_with(|| a.process.id.cmp(&b.process.id))
        });
    }
}
