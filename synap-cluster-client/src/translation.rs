//! Classification of raw command failures
//!
//! Callbacks fail with an `anyhow::Error`. A translation strategy turns that
//! into a typed [`ClusterError`], most importantly
//! [`ClusterError::Redirect`] when a node reports that a slot has moved.

use crate::error::ClusterError;
use std::fmt;

/// Turns a raw failure into a typed error; `None` means "propagate as is"
pub trait ExceptionTranslationStrategy: Send + Sync {
    fn translate(&self, error: &anyhow::Error) -> Option<ClusterError>;
}

/// Kind of redirect reported by a node.
///
/// Both kinds are handled the same way by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    Moved,
    Ask,
}

/// Typed redirect a node client can return from a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectError {
    pub kind: RedirectKind,
    pub slot: u16,
    pub host: String,
    pub port: u16,
}

impl RedirectError {
    pub fn moved(slot: u16, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: RedirectKind::Moved,
            slot,
            host: host.into(),
            port,
        }
    }

    pub fn ask(slot: u16, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: RedirectKind::Ask,
            ..Self::moved(slot, host, port)
        }
    }

    /// Parse a `MOVED <slot> <host>:<port>` or `ASK <slot> <host>:<port>` reply
    pub fn parse(message: &str) -> Option<Self> {
        let mut parts = message.trim().trim_start_matches('-').split_whitespace();
        let kind = match parts.next()? {
            "MOVED" => RedirectKind::Moved,
            "ASK" => RedirectKind::Ask,
            _ => return None,
        };
        let slot = parts.next()?.parse().ok()?;
        let (host, port) = parts.next()?.rsplit_once(':')?;
        let port = port.parse().ok()?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return None;
        }

        Some(Self {
            kind,
            slot,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for RedirectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RedirectKind::Moved => "MOVED",
            RedirectKind::Ask => "ASK",
        };
        write!(f, "{} {} {}:{}", kind, self.slot, self.host, self.port)
    }
}

impl std::error::Error for RedirectError {}

impl From<RedirectError> for ClusterError {
    fn from(redirect: RedirectError) -> Self {
        ClusterError::Redirect {
            slot: redirect.slot,
            host: redirect.host,
            port: redirect.port,
        }
    }
}

/// Default strategy: recognizes redirects and `CLUSTERDOWN` replies anywhere
/// in the error chain, either as a [`RedirectError`] or as reply text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectTranslator;

impl ExceptionTranslationStrategy for RedirectTranslator {
    fn translate(&self, error: &anyhow::Error) -> Option<ClusterError> {
        for cause in error.chain() {
            if let Some(redirect) = cause.downcast_ref::<RedirectError>() {
                return Some(redirect.clone().into());
            }

            let message = cause.to_string();
            if let Some(redirect) = RedirectError::parse(&message) {
                return Some(redirect.into());
            }
            if message.trim_start_matches('-').starts_with("CLUSTERDOWN") {
                return Some(ClusterError::ClusterDown(message));
            }
        }
        None
    }
}

/// Never translates; every failure surfaces as [`ClusterError::Command`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughTranslator;

impl ExceptionTranslationStrategy for PassThroughTranslator {
    fn translate(&self, _error: &anyhow::Error) -> Option<ClusterError> {
        None
    }
}
