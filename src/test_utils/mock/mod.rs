//! In-memory stand-in for database servers.
//!
//! [`MockServer`] implements [`Connector`](crate::Connector): every socket it
//! hands out decodes the wire messages written to it, records them per host
//! and answers through a handler closure. Hosts can be marked unreachable to
//! exercise connect failures without binding ports.
mod mock_server;

pub(crate) use mock_server::*;
