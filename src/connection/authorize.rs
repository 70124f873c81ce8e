use bson::doc;
use tracing::debug;

use super::JobInput;
use super::NextAction;
use crate::utils::digest::auth_key;
use crate::wire;
use crate::wire::is_ok;
use crate::wire::string;
use crate::Error;
use crate::ProtocolError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthorizeState {
    /// Nothing sent yet
    Start,
    /// `getnonce` sent, waiting for the nonce
    Nonce,
    /// `authenticate` sent, waiting for the verdict
    Finish,
    Done,
}

impl AuthorizeState {
    fn as_str(&self) -> &'static str {
        match self {
            AuthorizeState::Start => "authorize:start",
            AuthorizeState::Nonce => "authorize:nonce",
            AuthorizeState::Finish => "authorize:finish",
            AuthorizeState::Done => "authorize:done",
        }
    }
}

/// Nonce/key authentication handshake against `dbname`
#[derive(Debug)]
pub(crate) struct Authorize {
    username: String,
    password: String,
    dbname: String,
    state: AuthorizeState,
}

impl Authorize {
    pub(crate) fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            dbname: dbname.into(),
            state: AuthorizeState::Start,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> AuthorizeState {
        self.state
    }

    pub(crate) fn step(
        &mut self,
        input: JobInput,
    ) -> Result<NextAction> {
        match (self.state, input) {
            (_, JobInput::Failed(e)) => Err(Error::Authentication(format!(
                "{} interrupted: {e}",
                self.state.as_str()
            ))),

            (AuthorizeState::Start, JobInput::Start) => {
                let message = wire::command(&self.dbname, &doc! { "getnonce": 1 }, 0)?;
                self.state = AuthorizeState::Nonce;
                Ok(NextAction::Send(message))
            }

            (AuthorizeState::Nonce, JobInput::Reply(reply)) => {
                let nonce = reply
                    .first()
                    .and_then(|doc| string(doc, "nonce"))
                    .ok_or_else(|| Error::Authentication("getnonce reply carried no nonce".to_string()))?;
                debug!(user = %self.username, db = %self.dbname, "received nonce");

                let key = auth_key(&nonce, &self.username, &self.password);
                let command = doc! {
                    "authenticate": 1,
                    "user": self.username.as_str(),
                    "nonce": nonce,
                    "key": key,
                };
                let message = wire::command(&self.dbname, &command, 0)?;
                self.state = AuthorizeState::Finish;
                Ok(NextAction::Send(message))
            }

            (AuthorizeState::Finish, JobInput::Reply(reply)) => match reply.documents.as_slice() {
                [doc] if is_ok(doc) => {
                    debug!(user = %self.username, db = %self.dbname, "authenticated");
                    self.state = AuthorizeState::Done;
                    Ok(NextAction::Done(None))
                }
                [doc] => Err(Error::Authentication(
                    string(doc, "errmsg").unwrap_or_else(|| "authentication rejected".to_string()),
                )),
                docs => Err(Error::Authentication(format!(
                    "expected one authenticate result, received {}",
                    docs.len()
                ))),
            },

            (state, _) => Err(ProtocolError::UnexpectedState(state.as_str()).into()),
        }
    }
}
