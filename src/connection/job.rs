use std::collections::VecDeque;
use std::time::Duration;

use super::Authorize;
use super::DiscoverReplicaSet;
use crate::wire::Message;
use crate::wire::Reply;
use crate::Error;
use crate::HostAddr;
use crate::ProtocolError;
use crate::ReplicaSetConnectionError;
use crate::Result;

/// What the connection feeds into [`Job::step`]
#[derive(Debug)]
pub(crate) enum JobInput {
    Start,
    /// The socket requested by [`NextAction::Connect`] is open
    Connected,
    /// A message that expects no reply was handed to the socket
    Written,
    Reply(Reply),
    /// The last connect or exchange failed
    Failed(Error),
}

/// What a job asks the connection to do next
#[derive(Debug)]
pub(crate) enum NextAction {
    /// Replace the current socket with one to this host
    Connect(HostAddr),
    /// Write the message and, if it expects one, read its reply
    Send(Message),
    /// The job is finished; user messages carry their reply
    Done(Option<Reply>),
}

#[derive(Debug)]
pub(crate) enum Job {
    Authorize(Authorize),
    DiscoverReplicaSet(DiscoverReplicaSet),
    UserMessage(UserMessage),
}

impl Job {
    pub(crate) fn step(
        &mut self,
        input: JobInput,
    ) -> Result<NextAction> {
        match self {
            Job::Authorize(job) => job.step(input),
            Job::DiscoverReplicaSet(job) => job.step(input),
            Job::UserMessage(job) => job.step(input),
        }
    }

    pub(crate) fn is_handshake(&self) -> bool {
        !matches!(self, Job::UserMessage(_))
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Job::Authorize(_) => "authorize",
            Job::DiscoverReplicaSet(_) => "discover_replica_set",
            Job::UserMessage(_) => "user_message",
        }
    }

    /// Error reported when the handshake phase outlives its deadline
    pub(crate) fn timeout_error(
        &self,
        after: Duration,
    ) -> Error {
        match self {
            Job::Authorize(_) => Error::Authentication(format!("handshake timed out after {after:?}")),
            _ => ReplicaSetConnectionError::Timeout(after).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UserMessageState {
    Pending,
    Sent,
}

/// A caller-issued message; its reply is handed back untouched
#[derive(Debug)]
pub(crate) struct UserMessage {
    message: Message,
    state: UserMessageState,
}

impl UserMessage {
    pub(crate) fn new(message: Message) -> Self {
        Self {
            message,
            state: UserMessageState::Pending,
        }
    }

    fn step(
        &mut self,
        input: JobInput,
    ) -> Result<NextAction> {
        match (self.state, input) {
            (UserMessageState::Pending, JobInput::Start) => {
                self.state = UserMessageState::Sent;
                Ok(NextAction::Send(self.message.clone()))
            }
            (UserMessageState::Sent, JobInput::Written) => Ok(NextAction::Done(None)),
            (UserMessageState::Sent, JobInput::Reply(reply)) => Ok(NextAction::Done(Some(reply))),
            (_, JobInput::Failed(e)) => Err(e),
            _ => Err(ProtocolError::UnexpectedState("user_message").into()),
        }
    }
}

/// Pending jobs of one connection.
///
/// Handshake jobs live in their own queue and are always drained before
/// the first user message, so a fresh socket never carries caller bytes
/// ahead of discovery or authentication.
#[derive(Debug, Default)]
pub(crate) struct Pipeline {
    handshake: VecDeque<Job>,
    user: VecDeque<Job>,
}

impl Pipeline {
    pub(crate) fn push(
        &mut self,
        job: Job,
    ) {
        if job.is_handshake() {
            self.handshake.push_back(job);
        } else {
            self.user.push_back(job);
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Job> {
        self.handshake.pop_front().or_else(|| self.user.pop_front())
    }

    pub(crate) fn len(&self) -> usize {
        self.handshake.len() + self.user.len()
    }

    /// Drops every pending job and returns how many there were
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.len();
        self.handshake.clear();
        self.user.clear();
        n
    }
}
