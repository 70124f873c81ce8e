use std::collections::BTreeSet;

use bson::doc;
use bson::Bson;
use bson::Document;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::JobInput;
use super::NextAction;
use crate::constants::ADMIN_DB;
use crate::wire;
use crate::wire::flag;
use crate::wire::query_flags;
use crate::wire::string;
use crate::wire::Reply;
use crate::HostAddr;
use crate::ProtocolError;
use crate::ReplicaSetConnectionError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiscoverState {
    /// Choosing a host and opening a socket to it
    Seed,
    /// `ismaster` sent to the connected host
    IsMaster,
    Done,
}

impl DiscoverState {
    fn as_str(&self) -> &'static str {
        match self {
            DiscoverState::Seed => "discover:seed",
            DiscoverState::IsMaster => "discover:ismaster",
            DiscoverState::Done => "discover:done",
        }
    }
}

/// Finds a replica-set member in the requested role and leaves the
/// connection's socket pointed at it.
///
/// Every host tried is blacklisted for the rest of the round, so the job
/// ends once `known_hosts` is exhausted; the connection bounds the round
/// with a deadline as well since `hosts` replies may keep growing the set.
#[derive(Debug)]
pub(crate) struct DiscoverReplicaSet {
    set_name: String,
    secondary_only: bool,
    known_hosts: BTreeSet<HostAddr>,
    blacklisted: BTreeSet<HostAddr>,
    primary: Option<HostAddr>,
    current: Option<HostAddr>,
    state: DiscoverState,
    rng: StdRng,
}

impl DiscoverReplicaSet {
    pub(crate) fn new(
        set_name: impl Into<String>,
        seeds: &[HostAddr],
        secondary_only: bool,
        known_primary: Option<HostAddr>,
    ) -> Self {
        let mut known_hosts: BTreeSet<HostAddr> = seeds.iter().cloned().collect();
        known_hosts.extend(known_primary.iter().cloned());
        Self {
            set_name: set_name.into(),
            secondary_only,
            known_hosts,
            blacklisted: BTreeSet::new(),
            primary: known_primary,
            current: None,
            state: DiscoverState::Seed,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> DiscoverState {
        self.state
    }

    /// Primary reported by the set, if any host named one
    pub(crate) fn primary(&self) -> Option<&HostAddr> {
        self.primary.as_ref()
    }

    /// Host the job settled on (or is currently trying)
    #[cfg(test)]
    pub(crate) fn current(&self) -> Option<&HostAddr> {
        self.current.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn known_hosts(&self) -> &BTreeSet<HostAddr> {
        &self.known_hosts
    }

    pub(crate) fn step(
        &mut self,
        input: JobInput,
    ) -> Result<NextAction> {
        match (self.state, input) {
            (DiscoverState::Seed, JobInput::Start) => self.seed(),

            (DiscoverState::Seed, JobInput::Connected) => {
                let message = wire::command(ADMIN_DB, &doc! { "ismaster": 1 }, query_flags::SLAVE_OK)?;
                self.state = DiscoverState::IsMaster;
                Ok(NextAction::Send(message))
            }

            (DiscoverState::Seed | DiscoverState::IsMaster, JobInput::Failed(e)) => {
                warn!(host = ?self.current, error = %e, "replica set member unusable, trying next");
                self.seed()
            }

            (DiscoverState::IsMaster, JobInput::Reply(reply)) => self.on_ismaster(reply),

            (state, _) => Err(ProtocolError::UnexpectedState(state.as_str()).into()),
        }
    }

    /// Picks the next host: the known primary unless excluded, otherwise a
    /// random member not yet tried this round.
    fn seed(&mut self) -> Result<NextAction> {
        self.state = DiscoverState::Seed;
        if self.secondary_only {
            if let Some(primary) = &self.primary {
                self.blacklisted.insert(primary.clone());
            }
        }

        let node = match &self.primary {
            Some(primary) if !self.blacklisted.contains(primary) => primary.clone(),
            _ => {
                let candidates: Vec<&HostAddr> = self
                    .known_hosts
                    .iter()
                    .filter(|h| !self.blacklisted.contains(*h))
                    .collect();
                match candidates.choose(&mut self.rng) {
                    Some(node) => (*node).clone(),
                    None => {
                        return Err(ReplicaSetConnectionError::NoReachableHost {
                            tried: self.known_hosts.iter().map(HostAddr::to_string).collect(),
                        }
                        .into())
                    }
                }
            }
        };

        debug!(host = %node, set = %self.set_name, "trying replica set member");
        self.blacklisted.insert(node.clone());
        self.current = Some(node.clone());
        Ok(NextAction::Connect(node))
    }

    fn on_ismaster(
        &mut self,
        reply: Reply,
    ) -> Result<NextAction> {
        let Some(doc) = reply.first() else {
            return Err(ProtocolError::MissingField("ismaster").into());
        };

        let set_name = string(doc, "setName");
        if set_name.as_deref() != Some(self.set_name.as_str()) {
            return Err(ReplicaSetConnectionError::NameMismatch {
                expected: self.set_name.clone(),
                received: set_name,
            }
            .into());
        }

        self.merge_hosts(doc);
        if let Some(primary) = string(doc, "primary").and_then(|p| p.parse::<HostAddr>().ok()) {
            self.known_hosts.insert(primary.clone());
            self.primary = Some(primary);
        }

        let is_primary = flag(doc, "ismaster");
        let is_secondary = flag(doc, "secondary");
        let hidden = flag(doc, "hidden");
        if is_primary {
            self.primary = self.current.clone();
        }

        let settled = if self.secondary_only {
            is_secondary && !hidden
        } else {
            is_primary && !hidden
        };
        if settled {
            info!(
                host = ?self.current,
                set = %self.set_name,
                primary = is_primary,
                "replica set member selected"
            );
            self.state = DiscoverState::Done;
            return Ok(NextAction::Done(None));
        }
        self.seed()
    }

    fn merge_hosts(
        &mut self,
        doc: &Document,
    ) {
        let Ok(hosts) = doc.get_array("hosts") else {
            return;
        };
        for host in hosts {
            let Bson::String(host) = host else {
                continue;
            };
            match host.parse::<HostAddr>() {
                Ok(addr) => {
                    self.known_hosts.insert(addr);
                }
                Err(e) => warn!(host = %host, error = %e, "ignoring malformed member address"),
            }
        }
    }
}
