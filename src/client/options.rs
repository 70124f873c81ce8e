use bson::doc;
use bson::Document;

use crate::wire::query_flags;
use crate::Error;
use crate::Result;

/// Query shape of a `find`: projection, paging, ordering and cursor flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Projection; `None` returns whole documents
    pub fields: Option<Document>,
    pub skip: i32,
    /// Maximum documents returned, `0` for no limit
    pub limit: i32,
    pub sort: Option<Document>,
    /// Documents per reply batch, `0` for the server default
    pub batch_size: i32,
    pub tailable: bool,
    /// Allow this query on a secondary even if the pool does not
    pub slave_okay: bool,
    pub snapshot: bool,
    pub hint: Option<Document>,
    pub comment: Option<String>,
}

impl FindOptions {
    pub fn limit(
        mut self,
        limit: i32,
    ) -> Self {
        self.limit = limit;
        self
    }

    pub fn skip(
        mut self,
        skip: i32,
    ) -> Self {
        self.skip = skip;
        self
    }

    pub fn batch_size(
        mut self,
        batch_size: i32,
    ) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn sort(
        mut self,
        sort: Document,
    ) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn fields(
        mut self,
        fields: Document,
    ) -> Self {
        self.fields = Some(fields);
        self
    }

    /// `numberToReturn` reconciling `limit` and `batch_size`
    pub(crate) fn number_to_return(&self) -> i32 {
        match (self.limit, self.batch_size) {
            (0, batch_size) => batch_size,
            (limit, 0) => limit,
            (limit, batch_size) => limit.min(batch_size),
        }
    }

    /// Wraps `filter` in `$query` when any query modifier is set
    pub(crate) fn query_document(
        &self,
        filter: Document,
    ) -> Document {
        if self.sort.is_none() && self.hint.is_none() && !self.snapshot && self.comment.is_none() {
            return filter;
        }
        let mut query = doc! { "$query": filter };
        if let Some(sort) = &self.sort {
            query.insert("$orderby", sort.clone());
        }
        if let Some(hint) = &self.hint {
            query.insert("$hint", hint.clone());
        }
        if self.snapshot {
            query.insert("$snapshot", true);
        }
        if let Some(comment) = &self.comment {
            query.insert("$comment", comment.clone());
        }
        query
    }

    pub(crate) fn flags(
        &self,
        pool_slave_okay: bool,
    ) -> i32 {
        let mut flags = 0;
        if self.tailable {
            flags |= query_flags::TAILABLE;
        }
        if self.slave_okay || pool_slave_okay {
            flags |= query_flags::SLAVE_OK;
        }
        flags
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert when nothing matches
    pub upsert: bool,
    /// Update every match instead of the first
    pub multi: bool,
}

/// Whether a write waits for `getlasterror`, and with which options
/// (`w`, `wtimeout`, `j`, `fsync`)
#[derive(Debug, Clone, PartialEq)]
pub struct WriteConcern {
    pub acknowledged: bool,
    pub options: Document,
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self::acknowledged()
    }
}

impl WriteConcern {
    pub fn acknowledged() -> Self {
        Self {
            acknowledged: true,
            options: Document::new(),
        }
    }

    /// Acknowledged with extra `getlasterror` options
    pub fn with_options(options: Document) -> Self {
        Self {
            acknowledged: true,
            options,
        }
    }

    pub fn unacknowledged() -> Self {
        Self {
            acknowledged: false,
            options: Document::new(),
        }
    }

    /// `getlasterror` options to append, or `None` for fire-and-forget.
    ///
    /// # Errors
    /// - [`Error::Programming`] for an unacknowledged concern carrying
    ///   acknowledgment options
    pub(crate) fn safe(&self) -> Result<Option<&Document>> {
        match (self.acknowledged, self.options.is_empty()) {
            (true, _) => Ok(Some(&self.options)),
            (false, true) => Ok(None),
            (false, false) => Err(Error::Programming(format!(
                "unacknowledged write cannot carry getlasterror options {}",
                self.options
            ))),
        }
    }
}

/// How [`Client::command`](crate::Client::command) treats `ok != 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOptions {
    /// Fail with [`Error::Command`] when the reply is not ok
    pub check: bool,
    /// `errmsg` values accepted despite `ok != 1`
    pub allowable_errors: Vec<String>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            check: true,
            allowable_errors: Vec::new(),
        }
    }
}

impl CommandOptions {
    pub fn unchecked() -> Self {
        Self {
            check: false,
            ..Default::default()
        }
    }

    pub fn allow(
        mut self,
        errmsg: impl Into<String>,
    ) -> Self {
        self.allowable_errors.push(errmsg.into());
        self
    }
}
