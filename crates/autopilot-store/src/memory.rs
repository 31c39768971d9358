//! In-memory `KeyValueStore`, used for tests and single-process runs with no durability need.

use crate::KeyValueStore;
use async_trait::async_trait;
use autopilot_common::{ComponentHealth, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Clone)]
enum Value {
    Bytes(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Hash(HashMap<String, Vec<u8>>),
    ZSet(Vec<(String, f64)>),
}

struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// Tokio-`RwLock`-backed store; every key lives in one flat map keyed by its own type.
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    fn is_expired(entry: &Entry) -> bool {
        entry.expires_at.map(|exp| Utc::now() >= exp).unwrap_or(false)
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
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get(key) {
            if Self::is_expired(entry) {
                data.remove(key);
                return Ok(None);
            }
            return Ok(match &entry.value {
                Value::Bytes(b) => Some(b.clone()),
                _ => None,
            });
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| Utc::now() + d);
        self.data.write().await.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        if let Some(entry) = self.data.write().await.get_mut(key) {
            entry.expires_at = chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(list) => {
                list.push_front(value);
                Ok(())
            }
            _ => Err(Error::InvalidState(format!("key {key} is not a list"))),
        }
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let data = self.data.read().await;
        match data.get(key).map(|e| &e.value) {
            Some(Value::List(list)) => match Self::normalize_range(list.len(), start, stop) {
                Some((s, e)) => Ok(list.iter().skip(s).take(e - s + 1).cloned().collect()),
                None => Ok(Vec::new()),
            },
            Some(_) => Err(Error::InvalidState(format!("key {key} is not a list"))),
            None => Ok(Vec::new()),
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get_mut(key) {
            if let Value::List(list) = &mut entry.value {
                match Self::normalize_range(list.len(), start, stop) {
                    Some((s, e)) => {
                        let trimmed: VecDeque<Vec<u8>> = list.iter().skip(s).take(e - s + 1).cloned().collect();
                        *list = trimmed;
                    }
                    None => list.clear(),
                }
            }
        }
        Ok(())
    }

    async fn lrem(&self, key: &str, value: &[u8]) -> Result<u32> {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get_mut(key) {
            if let Value::List(list) = &mut entry.value {
                let before = list.len();
                list.retain(|v| v.as_slice() != value);
                return Ok((before - list.len()) as u32);
            }
        }
        Ok(0)
    }

    async fn llen(&self, key: &str) -> Result<u32> {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get(key) {
            if Self::is_expired(entry) {
                data.remove(key);
                return Ok(0);
            }
            if let Value::List(list) = &entry.value {
                return Ok(list.len() as u32);
            }
        }
        Ok(0)
    }

    async fn rpop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut data = self.data.write().await;
        if let Some(entry) = data.get_mut(key) {
            if let Value::List(list) = &mut entry.value {
                return Ok(list.pop_back());
            }
        }
        Ok(None)
    }

    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(h) => {
                h.insert(field.to_string(), value);
                Ok(())
            }
            _ => Err(Error::InvalidState(format!("key {key} is not a hash"))),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().await;
        match data.get(key).map(|e| &e.value) {
            Some(Value::Hash(h)) => Ok(h.get(field).cloned()),
            _ => Ok(None),
        }
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut data = self.data.write().await;
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(h) => {
                let current = h
                    .get(field)
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .and_then(|s| s.parse::<i64>().ok())
                    .unwrap_or(0);
                let updated = current + delta;
                h.insert(field.to_string(), updated.to_string().into_bytes());
                Ok(updated)
            }
            _ => Err(Error::InvalidState(format!("key {key} is not a hash"))),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut data = self.data.write().await;
        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::ZSet(Vec::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::ZSet(set) => {
                if let Some(existing) = set.iter_mut().find(|(m, _)| m == member) {
                    existing.1 = score;
                } else {
                    set.push((member.to_string(), score));
                }
                Ok(())
            }
            _ => Err(Error::InvalidState(format!("key {key} is not a sorted set"))),
        }
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<(String, f64)>> {
        let data = self.data.read().await;
        match data.get(key).map(|e| &e.value) {
            Some(Value::ZSet(set)) => {
                let mut matches: Vec<(String, f64)> =
                    set.iter().filter(|(_, s)| *s >= min && *s <= max).cloned().collect();
                matches.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
                Ok(matches)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut data = self.data.write().await;
        let expired: Vec<String> = data
            .iter()
            .filter(|(_, e)| Self::is_expired(e))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            data.remove(&k);
        }
        Ok(data.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }

    async fn health_check(&self) -> Result<ComponentHealth> {
        let data = self.data.read().await;
        let mut health = ComponentHealth::healthy(format!("in-memory store, {} keys", data.len()));
        health.metrics.insert("keys".to_string(), data.len() as f64);
        Ok(health)
    }
}
