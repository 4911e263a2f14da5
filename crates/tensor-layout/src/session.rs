//! Bookkeeping for a tensor layout that changes over a sequence of redistributions.

use crate::error::{LayoutError, Result};
use crate::redistribute::{
    Collective, ElementTransfer, RedistributionRequest, compute_new_distribution,
};
use crate::tensor::DistributedTensor;

/// A computed redistribution waiting to be consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// The collective that produced the transition.
    pub collective: Collective,
    /// Layout before the redistribution.
    pub old: DistributedTensor,
    /// Layout after the redistribution.
    pub new: DistributedTensor,
    /// Where every element of `old` ends up in `new`.
    pub transfers: Vec<ElementTransfer>,
}

/// Tracks the current layout of a tensor across a sequence of redistributions.
///
/// At most one transition is pending at a time. [`LayoutSession::redistribute`] computes a
/// transition and marks it in flight; the consumer (typically an animation or a data mover)
/// calls [`LayoutSession::complete`] once it has processed it, which makes the new layout
/// current. Requests issued while a transition is pending fail with
/// [`LayoutError::TransitionInProgress`].
#[derive(Clone, Debug)]
pub struct LayoutSession {
    current: DistributedTensor,
    pending: Option<DistributedTensor>,
}

impl LayoutSession {
    /// Starts a session at `tensor`.
    pub fn new(tensor: DistributedTensor) -> Self {
        Self {
            current: tensor,
            pending: None,
        }
    }

    /// The committed layout.
    pub fn current(&self) -> &DistributedTensor {
        &self.current
    }

    /// The layout a pending transition leads to.
    pub fn pending(&self) -> Option<&DistributedTensor> {
        self.pending.as_ref()
    }

    /// Returns `true` while a transition has not been completed.
    pub fn in_transition(&self) -> bool {
        self.pending.is_some()
    }

    /// Computes the transition for `collective` and marks it in flight.
    ///
    /// On error the session is left unchanged.
    pub fn redistribute(&mut self, collective: &Collective) -> Result<Transition> {
        if self.in_transition() {
            log::debug!("{} rejected: transition in progress", collective.operation());
            return Err(LayoutError::TransitionInProgress);
        }

        let redistribution = compute_new_distribution(&self.current, collective)?;
        let new = redistribution.apply(&self.current)?;
        let transfers = redistribution.correspondence(&self.current, &new)?;

        self.pending = Some(new.clone());
        Ok(Transition {
            collective: collective.clone(),
            old: self.current.clone(),
            new,
            transfers,
        })
    }

    /// Decodes `request` against the current layout and calls [`Self::redistribute`].
    pub fn submit(&mut self, request: &RedistributionRequest) -> Result<Transition> {
        if self.in_transition() {
            log::debug!("{} rejected: transition in progress", request.operation);
            return Err(LayoutError::TransitionInProgress);
        }
        let collective = Collective::from_request(request, self.current.order())?;
        self.redistribute(&collective)
    }

    /// Commits the pending transition, if any, and returns the now current layout.
    pub fn complete(&mut self) -> &DistributedTensor {
        if let Some(new) = self.pending.take() {
            log::debug!(
                "transition complete: {} -> {}",
                self.current.distribution(),
                new.distribution()
            );
            self.current = new;
        }
        &self.current
    }

    /// Drops the pending transition and keeps the current layout.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::debug!("transition cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redistribute::Operation;

    fn session() -> LayoutSession {
        LayoutSession::new(DistributedTensor::parse("4, 8", "2, 4", "[(0), (1)]").unwrap())
    }

    #[test]
    fn test_session_commits_on_complete() {
        let mut session = session();
        let transition = session
            .redistribute(&Collective::AllGather { mode: 0 })
            .unwrap();

        assert!(session.in_transition());
        assert_eq!(transition.old.distribution().to_string(), "[(0), (1)]");
        assert_eq!(transition.new.distribution().to_string(), "[(), (1)]");
        assert_eq!(transition.transfers.len(), 32);
        assert_eq!(session.current().distribution().to_string(), "[(0), (1)]");

        let current = session.complete();
        assert_eq!(current.distribution().to_string(), "[(), (1)]");
        assert!(!session.in_transition());
    }

    #[test]
    fn test_session_rejects_overlapping_transitions() {
        let mut session = session();
        session
            .redistribute(&Collective::AllGather { mode: 0 })
            .unwrap();

        let err = session
            .redistribute(&Collective::AllGather { mode: 1 })
            .unwrap_err();
        assert_eq!(err, LayoutError::TransitionInProgress);

        session.complete();
        assert!(session
            .redistribute(&Collective::AllGather { mode: 1 })
            .is_ok());
    }

    #[test]
    fn test_session_unchanged_on_error() {
        let mut session = session();
        let request = RedistributionRequest::new(Operation::ReduceScatter, "1", "1");

        assert_eq!(
            session.submit(&request).unwrap_err(),
            LayoutError::DistinctModesRequired { mode: 1 }
        );
        assert!(!session.in_transition());
        assert_eq!(session.current().distribution().to_string(), "[(0), (1)]");
    }

    #[test]
    fn test_session_chains_reduce_scatter() {
        let mut session = session();
        let request = RedistributionRequest::new(Operation::ReduceScatter, "0", "1");
        session.submit(&request).unwrap();
        let current = session.complete();

        assert_eq!(current.shape().dims(), &[8]);
        assert_eq!(current.distribution().to_string(), "[(1,0)]");

        let request = RedistributionRequest::new(Operation::AllGather, "0", "");
        session.submit(&request).unwrap();
        assert_eq!(session.complete().distribution().to_string(), "[()]");
    }

    #[test]
    fn test_session_cancel_keeps_current() {
        let mut session = session();
        session
            .redistribute(&Collective::AllGather { mode: 1 })
            .unwrap();
        session.cancel();

        assert!(!session.in_transition());
        assert_eq!(session.complete().distribution().to_string(), "[(0), (1)]");
    }
}
