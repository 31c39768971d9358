//! `sled`-backed `KeyValueStore`, durable across restarts.
//!
//! Grounded on the teacher's `PersistentQueue` (sled + bincode, `flush_async` after every
//! mutation) generalized from a single request queue to the full Redis-like surface.

use crate::KeyValueStore;
use async_trait::async_trait;
use autopilot_common::{ComponentHealth, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize)]
enum StoredValue {
    Bytes(Vec<u8>),
    List(Vec<Vec<u8>>),
    Hash(HashMap<String, Vec<u8>>),
    ZSet(Vec<(String, f64)>),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    value: StoredValue,
    expires_at: Option<DateTime<Utc>>,
}

pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::TransientStorage(format!("failed to create store directory: {e}")))?;
        }
        let db = sled::open(&path).map_err(|e| Error::TransientStorage(format!("failed to open store: {e}")))?;
        Ok(Self { db })
    }

    fn load(&self, key: &str) -> Result<Option<Envelope>> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => {
                let envelope: Envelope = bincode::deserialize(&bytes)
                    .map_err(|e| Error::TransientStorage(format!("corrupt entry for {key}: {e}")))?;
                if envelope.expires_at.map(|exp| Utc::now() >= exp).unwrap_or(false) {
                    let _ = self.db.remove(key.as_bytes());
                    Ok(None)
                } else {
                    Ok(Some(envelope))
                }
            }
            Ok(None) => Ok(None),
            Err(e) => Err(Error::TransientStorage(format!("store read failed: {e}"))),
        }
    }

    fn store(&self, key: &str, envelope: &Envelope) -> Result<()> {
        let bytes = bincode::serialize(envelope)
            .map_err(|e| Error::TransientStorage(format!("failed to encode entry for {key}: {e}")))?;
        self.db
            .insert(key.as_bytes(), bytes)
            .map_err(|e| Error::TransientStorage(format!("store write failed: {e}")))?;
        Ok(())
    }

    fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
        if len == 0 {
            return None;
        }
        let len_i = len as i64;
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len_i + i).max(0)
            } else {
                i
            }
        };
        let start = norm(start).min(len_i - 1).max(0);
        let stop = norm(stop).min(len_i - 1);
        if stop < start {
            None
        } else {
            Some((start as usize, stop as usize))
        }
    }
}

#[async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(match self.load(key)? {
            Some(Envelope { value: StoredValue::Bytes(b), .. }) => Some(b),
            _ => None,
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        self.store(
            key,
            &Envelope {
                value: StoredValue::Bytes(value),
                expires_at,
            },
        )?;
        let _ = self.db.flush_async().await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| Error::TransientStorage(format!("store delete failed: {e}")))?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(mut envelope) = self.load(key)? {
            envelope.expires_at = chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d);
            self.store(key, &envelope)?;
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut envelope = self.load(key)?.unwrap_or(Envelope {
            value: StoredValue::List(Vec::new()),
            expires_at: None,
        });
        match &mut envelope.value {
            StoredValue::List(list) => list.insert(0, value),
            _ => return Err(Error::InvalidState(format!("key {key} is not a list"))),
        }
        self.store(key, &envelope)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        match self.load(key)? {
            Some(Envelope { value: StoredValue::List(list), .. }) => {
                match Self::normalize_range(list.len(), start, stop) {
                    Some((s, e)) => Ok(list[s..=e].to_vec()),
                    None => Ok(Vec::new()),
                }
            }
            Some(_) => Err(Error::InvalidState(format!("key {key} is not a list"))),
            None => Ok(Vec::new()),
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        if let Some(mut envelope) = self.load(key)? {
            if let StoredValue::List(list) = &mut envelope.value {
                match Self::normalize_range(list.len(), start, stop) {
                    Some((s, e)) => *list = list[s..=e].to_vec(),
                    None => list.clear(),
                }
                self.store(key, &envelope)?;
            }
        }
        Ok(())
    }

    async fn lrem(&self, key: &str, value: &[u8]) -> Result<u32> {
        if let Some(mut envelope) = self.load(key)? {
            if let StoredValue::List(list) = &mut envelope.value {
                let before = list.len();
                list.retain(|v| v.as_slice() != value);
                let removed = (before - list.len()) as u32;
                self.store(key, &envelope)?;
                return Ok(removed);
            }
        }
        Ok(0)
    }

    async fn llen(&self, key: &str) -> Result<u32> {
        match self.load(key)? {
            Some(Envelope { value: StoredValue::List(list), .. }) => Ok(list.len() as u32),
            _ => Ok(0),
        }
    }

    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(mut envelope) = self.load(key)? {
            if let StoredValue::List(list) = &mut envelope.value {
                let popped = list.pop();
                self.store(key, &envelope)?;
                return Ok(popped);
            }
        }
        Ok(None)
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<()> {
        let mut envelope = self.load(key)?.unwrap_or(Envelope {
            value: StoredValue::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut envelope.value {
            StoredValue::Hash(h) => {
                h.insert(field.to_string(), value);
            }
            _ => return Err(Error::InvalidState(format!("key {key} is not a hash"))),
        }
        self.store(key, &envelope)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        match self.load(key)? {
            Some(Envelope { value: StoredValue::Hash(h), .. }) => Ok(h.get(field).cloned()),
            _ => Ok(None),
        }
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut envelope = self.load(key)?.unwrap_or(Envelope {
            value: StoredValue::Hash(HashMap::new()),
            expires_at: None,
        });
        let updated = match &mut envelope.value {
            StoredValue::Hash(h) => {
                let current = h
                    .get(field)
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(0);
                let updated = current + delta;
                h.insert(field.to_string(), updated.to_string().into_bytes());
                updated
            }
            _ => return Err(Error::InvalidState(format!("key {key} is not a hash"))),
        };
        self.store(key, &envelope)?;
        Ok(updated)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut envelope = self.load(key)?.unwrap_or(Envelope {
            value: StoredValue::ZSet(Vec::new()),
            expires_at: None,
        });
        match &mut envelope.value {
            StoredValue::ZSet(set) => {
                if let Some(existing) = set.iter_mut().find(|(m, _)| m == member) {
                    existing.1 = score;
                } else {
                    set.push((member.to_string(), score));
                }
            }
            _ => return Err(Error::InvalidState(format!("key {key} is not a sorted set"))),
        }
        self.store(key, &envelope)
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<(String, f64)>> {
        match self.load(key)? {
            Some(Envelope { value: StoredValue::ZSet(set), .. }) => {
                let mut matches: Vec<(String, f64)> =
                    set.into_iter().filter(|(_, s)| *s >= min && *s <= max).collect();
                matches.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
                Ok(matches)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for item in self.db.iter() {
            let (key, _) = item.map_err(|e| Error::TransientStorage(format!("store scan failed: {e}")))?;
            if let Ok(key_str) = std::str::from_utf8(&key) {
                if key_str.starts_with(prefix) {
                    out.push(key_str.to_string());
                }
            }
        }
        Ok(out)
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        let len = self.db.len();
        let mut health = ComponentHealth::healthy(format!("sled store, {len} keys"));
        health.metrics.insert("keys".to_string(), len as f64);
        if let Ok(size) = self.db.size_on_disk() {
            health.metrics.insert("size_on_disk_bytes".to_string(), size as f64);
        }
        Ok(health)
    }
}
