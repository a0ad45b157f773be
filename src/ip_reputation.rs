//! IP allow/deny lists, CIDR matching, and temporary blocks (C3).

use crate::errors::{IpError, KvError};
use crate::kv_store::KvStore;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListVerdict {
    Allowed,
    Denied,
    Unlisted,
}

/// A block record, stored at `block:ip:<ip>` with a TTL equal to `expires_at
/// - blocked_at` (spec section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub reason: String,
    pub blocked_at: i64,
    pub expires_at: i64,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Parses a (possibly comma-separated) `X-Forwarded-For`-style header: takes
/// the first token, trims it, and validates it as an IPv4 or IPv6 address
/// (spec section 4.3).
pub fn normalize_forwarded_for(header: &str) -> Result<IpAddr, IpError> {
    let first = header
        .split(',')
        .next()
        .map(|s| s.trim())
        .unwrap_or("");
    first
        .parse::<IpAddr>()
        .map_err(|_| IpError::InvalidIp(first.to_string()))
}

struct ListEntry {
    raw: String,
    net: IpNetwork,
}

fn parse_list(entries: &[String]) -> Result<Vec<ListEntry>, IpError> {
    entries
        .iter()
        .map(|raw| {
            let net = if raw.contains('/') {
                raw.parse::<IpNetwork>()
                    .map_err(|_| IpError::InvalidCidr(raw.clone()))?
            } else {
                let ip: IpAddr = raw
                    .parse()
                    .map_err(|_| IpError::InvalidCidr(raw.clone()))?;
                IpNetwork::from(ip)
            };
            Ok(ListEntry {
                raw: raw.clone(),
                net,
            })
        })
        .collect()
}

/// Allow/deny list matcher plus the temporary-block lifecycle backed by the
/// KV store. Membership tests are linear scans over the configured entries,
/// which spec section 4.3 explicitly expects to be small.
pub struct IpReputation {
    store: Arc<dyn KvStore>,
    allowlist: Vec<ListEntry>,
    denylist: Vec<ListEntry>,
}

impl IpReputation {
    pub fn new(
        store: Arc<dyn KvStore>,
        allowlist: &[String],
        denylist: &[String],
    ) -> Result<Self, IpError> {
        Ok(Self {
            store,
            allowlist: parse_list(allowlist)?,
            denylist: parse_list(denylist)?,
        })
    }

    /// Allowlisted IPs short-circuit all further checks as `Allowed`;
    /// denylisted IPs short-circuit as `Denied`; anything else is
    /// `Unlisted` and falls through to the temp-block / rate-limit chain.
    pub fn check_lists(&self, ip: IpAddr) -> ListVerdict {
        if self.denylist.iter().any(|e| e.net.contains(ip)) {
            return ListVerdict::Denied;
        }
        if self.allowlist.iter().any(|e| e.net.contains(ip)) {
            return ListVerdict::Allowed;
        }
        ListVerdict::Unlisted
    }

    fn block_key(ip: IpAddr) -> String {
        format!("block:ip:{ip}")
    }

    pub async fn block(&self, ip: IpAddr, reason: &str, ttl: Duration) -> Result<(), KvError> {
        let now = now_unix();
        let record = BlockRecord {
            reason: reason.to_string(),
            blocked_at: now,
            expires_at: now + ttl.as_secs() as i64,
        };
        let bytes = bincode::serialize(&record)
            .map_err(|e| KvError::Permanent(format!("failed to serialize block record: {e}")))?;
        self.store.set(&Self::block_key(ip), &bytes, ttl).await?;
        debug!(%ip, reason, "blocked ip");
        Ok(())
    }

    /// Presence of a (non-expired) block record implies `block` for every
    /// request from `ip` until expiry (spec section 3 invariant).
    pub async fn is_blocked(&self, ip: IpAddr) -> Result<Option<BlockRecord>, KvError> {
        let bytes = self.store.get_bytes(&Self::block_key(ip)).await?;
        match bytes {
            Some(bytes) => {
                let record: BlockRecord = bincode::deserialize(&bytes).map_err(|e| {
                    KvError::Permanent(format!("failed to deserialize block record: {e}"))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub async fn unblock(&self, ip: IpAddr) -> Result<(), KvError> {
        self.store.del(&[Self::block_key(ip)]).await
    }

    /// Lists every currently-blocked IP via a key scan, per spec section 4.3.
    /// `scan` may return spurious duplicates; callers tolerate that.
    pub async fn list_blocked(&self) -> Result<Vec<(IpAddr, BlockRecord)>, KvError> {
        let keys = self.store.scan("block:ip:*").await?;
        let mut out = Vec::new();
        for key in keys {
            let Some(ip_str) = key.strip_prefix("block:ip:") else {
                continue;
            };
            let Ok(ip) = ip_str.parse::<IpAddr>() else {
                continue;
            };
            if let Some(record) = self.is_blocked(ip).await? {
                out.push((ip, record));
            }
        }
        Ok(out)
    }
}
