use crate::acquire::payload::ImagePayload;
use crate::api::match_api::MatchRequestFlow;
use crate::api::match_structs::RequestOutcome;
use tracing::debug;

#[derive(Debug)]
pub enum SessionState {
    /// Waiting for the user; holds the most recently acquired image, if any.
    Idle { image: Option<ImagePayload> },
    /// A match request is in flight.
    Loading,
    Resolved(RequestOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("A match request is already in progress")]
    Busy,
    #[error("A result is already showing, reset or pick a new photo first")]
    AlreadyResolved,
    #[error("No match request is in progress")]
    NotLoading,
}

/// One user's pass through pick photo → find match → see result.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle { image: None },
        }
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, SessionState::Loading)
    }

    #[must_use]
    pub const fn image(&self) -> Option<&ImagePayload> {
        match &self.state {
            SessionState::Idle { image } => image.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub const fn outcome(&self) -> Option<&RequestOutcome> {
        match &self.state {
            SessionState::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// A new photo replaces the previous one and clears any shown result.
    pub fn acquire(&mut self, image: ImagePayload) -> Result<(), TransitionError> {
        if self.is_loading() {
            return Err(TransitionError::Busy);
        }
        debug!("Acquired {:?}", image);
        self.state = SessionState::Idle { image: Some(image) };
        Ok(())
    }

    /// Move to `Loading` and hand out the image to submit.
    ///
    /// The image may be `None`; the flow reports that as missing input.
    pub fn begin_submit(&mut self) -> Result<Option<ImagePayload>, TransitionError> {
        match std::mem::replace(&mut self.state, SessionState::Loading) {
            SessionState::Idle { image } => Ok(image),
            SessionState::Loading => Err(TransitionError::Busy),
            resolved @ SessionState::Resolved(_) => {
                self.state = resolved;
                Err(TransitionError::AlreadyResolved)
            }
        }
    }

    pub fn complete(&mut self, outcome: RequestOutcome) -> Result<&RequestOutcome, TransitionError> {
        if !self.is_loading() {
            return Err(TransitionError::NotLoading);
        }
        self.state = SessionState::Resolved(outcome);
        match &self.state {
            SessionState::Resolved(outcome) => Ok(outcome),
            _ => Err(TransitionError::NotLoading),
        }
    }

    /// Back to an empty `Idle`. Not allowed while a request is in flight.
    pub fn reset(&mut self) -> Result<(), TransitionError> {
        if self.is_loading() {
            return Err(TransitionError::Busy);
        }
        self.state = SessionState::Idle { image: None };
        Ok(())
    }

    /// Run one submission through `flow`: `Idle` → `Loading` → `Resolved`.
    pub async fn run_submission(
        &mut self,
        flow: &MatchRequestFlow,
    ) -> Result<&RequestOutcome, TransitionError> {
        let image = self.begin_submit()?;
        let outcome = flow.submit(image).await;
        self.complete(outcome)
    }
}
