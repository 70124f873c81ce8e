use bson::Document;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::Client;
use super::FindOptions;
use super::UpdateOptions;
use super::WriteConcern;
use crate::constants::CMD_COLLECTION;
use crate::wire;
use crate::wire::error_code;
use crate::wire::string;
use crate::wire::Message;
use crate::wire::Reply;
use crate::Error;
use crate::PooledConnection;
use crate::ProtocolError;
use crate::Result;

/// Operations on one collection.
///
/// Every call checks a connection out of the client's pool for exactly one
/// request/response cycle.
#[derive(Debug, Clone)]
pub struct Cursor {
    client: Client,
    full_collection_name: String,
}

/// Rejects names the server would not accept as a collection
pub(crate) fn validate_collection_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.contains("..") {
        "must not contain '..'"
    } else if name.replace(CMD_COLLECTION, "").contains('$') {
        "must not contain '$'"
    } else if name.starts_with('.') || name.ends_with('.') {
        "must not start or end with '.'"
    } else {
        return Ok(());
    };
    Err(Error::Data(format!("collection name {name:?} {reason}")))
}

impl Cursor {
    pub(crate) fn new(
        client: Client,
        collection: &str,
    ) -> Result<Self> {
        validate_collection_name(collection)?;
        Ok(Self {
            full_collection_name: format!("{}.{collection}", client.dbname()),
            client,
        })
    }

    /// `<dbname>.<collection>`
    pub fn full_collection_name(&self) -> &str {
        &self.full_collection_name
    }

    /// Runs a query and returns its first batch.
    ///
    /// A server cursor left open by the reply is killed before returning.
    ///
    /// # Errors
    /// - pool checkout errors such as [`Error::TooManyConnections`]
    /// - [`crate::QueryError`] if the server rejected the query
    /// - transport errors from the connection
    pub async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let n_return = options.number_to_return();
        self.query(filter, &options, n_return).await
    }

    /// First document matching `filter`, if any
    pub async fn find_one(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> Result<Option<Document>> {
        let documents = self.query(filter, &options, -1).await?;
        Ok(documents.into_iter().next())
    }

    async fn query(
        &self,
        filter: Document,
        options: &FindOptions,
        n_return: i32,
    ) -> Result<Vec<Document>> {
        let message = wire::query(
            options.flags(self.client.reads_from_secondary()),
            &self.full_collection_name,
            options.skip,
            n_return,
            &options.query_document(filter),
            options.fields.as_ref(),
        )?;

        let mut conn = self.client.pool().acquire()?;
        let reply = conn
            .send(message)
            .await?
            .ok_or(ProtocolError::MissingField("query reply"))?;
        if reply.cursor_id != 0 {
            kill_cursor(&mut conn, reply.cursor_id).await;
        }
        Ok(reply.documents)
    }

    /// Inserts `documents` in one message.
    ///
    /// Returns the `getlasterror` document for acknowledged writes and
    /// `None` otherwise.
    ///
    /// # Errors
    /// - [`Error::Programming`] for an empty batch or a contradictory
    ///   [`WriteConcern`]
    /// - [`Error::Integrity`] if the server reported a write error
    pub async fn insert(
        &self,
        documents: Vec<Document>,
        concern: WriteConcern,
    ) -> Result<Option<Document>> {
        if documents.is_empty() {
            return Err(Error::Programming("cannot insert an empty batch".to_string()));
        }
        let message = wire::insert(&self.full_collection_name, &documents, false, concern.safe()?)?;
        self.write(message).await
    }

    pub async fn insert_one(
        &self,
        document: Document,
        concern: WriteConcern,
    ) -> Result<Option<Document>> {
        self.insert(vec![document], concern).await
    }

    /// Updates documents matching `filter`; `document` is either a
    /// replacement or a set of `$` operators.
    pub async fn update(
        &self,
        filter: Document,
        document: Document,
        options: UpdateOptions,
        concern: WriteConcern,
    ) -> Result<Option<Document>> {
        let message = wire::update(
            &self.full_collection_name,
            options.upsert,
            options.multi,
            &filter,
            &document,
            concern.safe()?,
        )?;
        self.write(message).await
    }

    /// Deletes every document matching `filter`
    pub async fn remove(
        &self,
        filter: Document,
        concern: WriteConcern,
    ) -> Result<Option<Document>> {
        let message = wire::delete(&self.full_collection_name, &filter, false, concern.safe()?)?;
        self.write(message).await
    }

    async fn write(
        &self,
        message: Message,
    ) -> Result<Option<Document>> {
        let mut conn = self.client.pool().acquire()?;
        if !message.expects_reply {
            let request_id = message.request_id;
            if let Err(e) = conn.send_unacknowledged(message).await {
                error!(request_id, error = %e, "unacknowledged write failed");
            }
            return Ok(None);
        }

        let reply = conn
            .send(message)
            .await?
            .ok_or(ProtocolError::MissingField("getlasterror reply"))?;
        last_error(reply).map(Some)
    }
}

/// Kills a cursor left open by a one-shot read; failures are only logged
async fn kill_cursor(
    conn: &mut PooledConnection,
    cursor_id: i64,
) {
    debug!(cursor_id, "killing open cursor");
    if let Err(e) = conn.send_unacknowledged(wire::kill_cursors(&[cursor_id])).await {
        warn!(cursor_id, error = %e, "kill cursors failed");
    }
}

/// Turns a `getlasterror` reply into the write result.
///
/// Only an `err` paired with a `code` fails the write; anything else, such
/// as a write-concern timeout, is handed back as the document.
fn last_error(reply: Reply) -> Result<Document> {
    let document = reply
        .into_first()
        .ok_or(ProtocolError::MissingField("getlasterror document"))?;
    match (string(&document, "err"), error_code(&document)) {
        (Some(message), Some(code)) => Err(Error::Integrity {
            code: Some(code),
            message,
        }),
        _ => Ok(document),
    }
}
