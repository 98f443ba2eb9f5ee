//! Access rules: which remote endpoints may open a session.
//!
//! A rule is a predicate on the remote endpoint of a freshly accepted
//! connection. A rejected connection is closed before the banner is sent.
//! A node without a rule accepts every connection.
//!
//! IPv4 clients of a dual-stack listener appear as IPv4-mapped IPv6
//! addresses (`::ffff:a.b.c.d`); the built-in rules compare canonical
//! addresses so both forms match the same entry.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Decides whether a connection from `remote` may be served.
pub trait AccessRule: Send + Sync + fmt::Debug {
    /// Returns `true` to serve the connection.
    fn is_accepted(&self, remote: &SocketAddr) -> bool;
}

/// Evaluates an optional rule. No rule means accept all.
pub fn is_accepted(rule: Option<&dyn AccessRule>, remote: &SocketAddr) -> bool {
    rule.is_none_or(|rule| rule.is_accepted(remote))
}

/// Accepts loopback clients only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackOnly;

impl AccessRule for LoopbackOnly {
    fn is_accepted(&self, remote: &SocketAddr) -> bool {
        remote.ip().to_canonical().is_loopback()
    }
}

/// Accepts clients whose address is in a fixed set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    addresses: HashSet<IpAddr>,
}

impl AllowList {
    /// Creates an allow-list from addresses.
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: addresses.into_iter().map(|ip| ip.to_canonical()).collect(),
        }
    }

    /// Returns `true` when `ip` is allowed.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.addresses.contains(&ip.to_canonical())
    }

    /// Number of allowed addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns `true` when the list allows nobody.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl FromIterator<IpAddr> for AllowList {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl AccessRule for AllowList {
    fn is_accepted(&self, remote: &SocketAddr) -> bool {
        self.contains(remote.ip())
    }
}

/// Accepts a client when any inner rule does.
#[derive(Debug, Clone, Default)]
pub struct AnyOf {
    rules: Vec<Arc<dyn AccessRule>>,
}

impl AnyOf {
    /// Combines rules.
    pub fn new(rules: Vec<Arc<dyn AccessRule>>) -> Self {
        Self { rules }
    }

    /// Adds a rule.
    #[must_use]
    pub fn or(mut self, rule: Arc<dyn AccessRule>) -> Self {
        self.rules.push(rule);
        self
    }
}

impl AccessRule for AnyOf {
    fn is_accepted(&self, remote: &SocketAddr) -> bool {
        self.rules.iter().any(|rule| rule.is_accepted(remote))
    }
}

/// Wraps a closure as an access rule.
pub struct FnRule<F>(pub F);

impl<F> fmt::Debug for FnRule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRule")
    }
}

impl<F> AccessRule for FnRule<F>
where
    F: Fn(&SocketAddr) -> bool + Send + Sync,
{
    fn is_accepted(&self, remote: &SocketAddr) -> bool {
        (self.0)(remote)
    }
}
