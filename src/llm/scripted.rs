//! Scripted driver that replays queued replies.
//!
//! Used in place of a real model service when exercising the chat flow.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::{FragmentStream, LlmDriver, LlmError, LlmRequest};

/// One queued reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Deliver these fragments in order, then end the stream.
    Fragments(Vec<String>),
    /// Deliver these fragments, then fail the stream with the error.
    FailAfter(Vec<String>, LlmError),
    /// Reject the request before any fragment.
    Fail(LlmError),
}

/// Driver returning queued [`ScriptedReply`] values in FIFO order.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply split into fragments.
    pub fn push_fragments<I, S>(&self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(ScriptedReply::Fragments(
            fragments.into_iter().map(Into::into).collect(),
        ));
    }

    /// Queue a reply that fails before producing anything.
    pub fn push_error(&self, error: LlmError) {
        self.push(ScriptedReply::Fail(error));
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Requests received so far.
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait::async_trait]
impl LlmDriver for ScriptedDriver {
    async fn stream(&self, req: LlmRequest) -> Result<FragmentStream, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req);

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| LlmError::network("No scripted reply queued"))?;

        let (fragments, failure) = match reply {
            ScriptedReply::Fragments(fragments) => (fragments, None),
            ScriptedReply::FailAfter(fragments, error) => (fragments, Some(error)),
            ScriptedReply::Fail(error) => return Err(error),
        };

        let items = fragments
            .into_iter()
            .map(Ok)
            .chain(failure.map(Err))
            .collect::<Vec<Result<String, LlmError>>>();

        Ok(Box::pin(futures::stream::iter(items)))
    }
}
