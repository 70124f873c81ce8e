use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_PORT;
use crate::Error;

/// A `host:port` pair; the port defaults to 27017 when omitted. IPv6
/// literals are written in brackets, `[::1]:27017`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

impl HostAddr {
    pub fn new(
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddr {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Splits `host[:port]` or `[ipv6][:port]` into its parts
fn split_host_port(s: &str) -> Result<(&str, Option<&str>), Error> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| Error::config(format!("unclosed '[' in address {s:?}")))?;
        return match tail {
            "" => Ok((host, None)),
            _ => tail
                .strip_prefix(':')
                .map(|port| (host, Some(port)))
                .ok_or_else(|| Error::config(format!("unexpected {tail:?} after ']' in address {s:?}"))),
        };
    }
    if s.matches(':').count() > 1 {
        return Err(Error::config(format!(
            "IPv6 address {s:?} must be bracketed as [addr]:port"
        )));
    }
    Ok(match s.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (s, None),
    })
}

impl FromStr for HostAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = split_host_port(s)?;
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|e| Error::config(format!("invalid port in address {s:?}: {e}")))?,
            None => DEFAULT_PORT,
        };
        if host.is_empty() {
            return Err(Error::config(format!("missing host in address {s:?}")));
        }
        Ok(HostAddr::new(host, port))
    }
}

impl TryFrom<String> for HostAddr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HostAddr> for String {
    fn from(addr: HostAddr) -> Self {
        addr.to_string()
    }
}
