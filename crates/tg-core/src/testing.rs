//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;

use crate::aggregate::HourlyUsageBucket;
use crate::category::{Category, CategoryRegistry};
use crate::observation::FocusObservation;
use crate::store::{EventSource, ReplaceOutcome, StatsStore, WritePhase};
use crate::types::{CategoryId, ProductivityType, SubjectId, Timestamp};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct MemoryError(&'static str);

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    categories: Mutex<Vec<Category>>,
    pub lookups: AtomicUsize,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl MemoryRegistry {
    pub fn id_of(&self, name: &str) -> CategoryId {
        self.categories
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.id)
            .unwrap()
    }

    fn check_reads(&self) -> Result<(), MemoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(MemoryError("registry read failed"));
        }
        Ok(())
    }
}

impl CategoryRegistry for MemoryRegistry {
    type Error = MemoryError;

    fn find_by_name(&self, name: &str) -> Result<Option<Category>, Self::Error> {
        self.check_reads()?;
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn list_all(&self) -> Result<Vec<Category>, Self::Error> {
        self.check_reads()?;
        Ok(self.categories.lock().unwrap().clone())
    }

    fn create(
        &self,
        name: &str,
        productivity_type: ProductivityType,
        description: Option<&str>,
    ) -> Result<Category, Self::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MemoryError("registry write failed"));
        }
        let mut categories = self.categories.lock().unwrap();
        if let Some(existing) = categories.iter().find(|c| c.name.eq_ignore_ascii_case(name)) {
            return Ok(existing.clone());
        }
        let category = Category {
            id: CategoryId::try_from(categories.len()).unwrap() + 1,
            name: name.to_string(),
            productivity_type,
            description: description.map(str::to_string),
        };
        categories.push(category.clone());
        Ok(category)
    }
}

#[derive(Debug, Default)]
pub struct MemorySource {
    observations: Mutex<Vec<FocusObservation>>,
    failing: Mutex<Option<SubjectId>>,
    fail_list: AtomicBool,
}

impl MemorySource {
    pub fn new(observations: Vec<FocusObservation>) -> Self {
        Self {
            observations: Mutex::new(observations),
            ..Self::default()
        }
    }

    pub fn fail_fetch_for(&self, subject: SubjectId) {
        *self.failing.lock().unwrap() = Some(subject);
    }

    pub fn fail_listing(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn clear_subject(&self, subject: &SubjectId) {
        self.observations
            .lock()
            .unwrap()
            .retain(|o| &o.subject_id != subject);
    }
}

impl EventSource for MemorySource {
    type Error = MemoryError;

    fn list_subjects(&self, start: Timestamp, end: Timestamp) -> Result<Vec<SubjectId>, Self::Error> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(MemoryError("listing failed"));
        }
        let subjects: BTreeSet<SubjectId> = self
            .observations
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.timestamp >= start && o.timestamp < end)
            .map(|o| o.subject_id.clone())
            .collect();
        Ok(subjects.into_iter().collect())
    }

    fn fetch_observations(
        &self,
        subject: &SubjectId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<FocusObservation>, Self::Error> {
        if self.failing.lock().unwrap().as_ref() == Some(subject) {
            return Err(MemoryError("fetch failed"));
        }
        let mut found: Vec<FocusObservation> = self
            .observations
            .lock()
            .unwrap()
            .iter()
            .filter(|o| &o.subject_id == subject && o.timestamp >= start && o.timestamp < end)
            .cloned()
            .collect();
        found.sort_by_key(|o| o.timestamp);
        Ok(found)
    }
}

type BucketKey = (SubjectId, String, Timestamp);

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<BucketKey, HourlyUsageBucket>>,
    pub fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn snapshot(&self) -> Vec<HourlyUsageBucket> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn rows_for(&self, subject: &SubjectId) -> Vec<HourlyUsageBucket> {
        self.snapshot()
            .into_iter()
            .filter(|b| &b.subject_id == subject)
            .collect()
    }

    fn check_writes(&self) -> Result<(), MemoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MemoryError("store write failed"));
        }
        Ok(())
    }
}

fn key(bucket: &HourlyUsageBucket) -> BucketKey {
    (
        bucket.subject_id.clone(),
        bucket.app_name.clone(),
        bucket.hour_start,
    )
}

fn clear_rows(
    rows: &mut BTreeMap<BucketKey, HourlyUsageBucket>,
    subject: &SubjectId,
    start: Timestamp,
    end: Timestamp,
) -> usize {
    let before = rows.len();
    rows.retain(|(s, _, hour), _| !(s == subject && *hour >= start && *hour < end));
    before - rows.len()
}

impl StatsStore for MemoryStore {
    type Error = MemoryError;

    fn clear(&self, subject: &SubjectId, start: Timestamp, end: Timestamp) -> Result<usize, Self::Error> {
        Ok(clear_rows(&mut self.rows.lock().unwrap(), subject, start, end))
    }

    fn upsert_or_accumulate(&self, bucket: &HourlyUsageBucket) -> Result<(), Self::Error> {
        self.check_writes()?;
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&key(bucket)) {
            Some(existing) => {
                existing.total_time_seconds += bucket.total_time_seconds;
                existing.active_time_seconds += bucket.active_time_seconds;
                existing.session_count += bucket.session_count;
                if !bucket.dominant_window_name.is_empty() {
                    existing
                        .dominant_window_name
                        .clone_from(&bucket.dominant_window_name);
                }
                existing.updated_at = bucket.updated_at;
            }
            None => {
                rows.insert(key(bucket), bucket.clone());
            }
        }
        Ok(())
    }

    fn batch_write(&self, buckets: &[HourlyUsageBucket]) -> Result<usize, Self::Error> {
        self.check_writes()?;
        let mut rows = self.rows.lock().unwrap();
        for bucket in buckets {
            rows.insert(key(bucket), bucket.clone());
        }
        Ok(buckets.len())
    }

    fn replace_window(
        &self,
        subject: &SubjectId,
        start: Timestamp,
        end: Timestamp,
        buckets: &[HourlyUsageBucket],
        on_phase: &mut dyn FnMut(WritePhase),
    ) -> Result<ReplaceOutcome, Self::Error> {
        let mut rows = self.rows.lock().unwrap();
        let mut staged = rows.clone();

        on_phase(WritePhase::Clearing);
        let cleared = clear_rows(&mut staged, subject, start, end);

        on_phase(WritePhase::Writing);
        self.check_writes()?;
        for bucket in buckets {
            let mut bucket = bucket.clone();
            if let Some(previous) = rows.get(&key(&bucket)) {
                let restamped = HourlyUsageBucket {
                    updated_at: previous.updated_at,
                    ..bucket.clone()
                };
                if restamped == *previous {
                    bucket = restamped;
                }
            }
            staged.insert(key(&bucket), bucket);
        }

        *rows = staged;
        Ok(ReplaceOutcome {
            cleared,
            written: buckets.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_an_empty_window_is_a_no_op() {
        let store = MemoryStore::default();
        let subject = SubjectId::new("pc-1").unwrap();
        let now = chrono::DateTime::parse_from_rfc3339("2025-03-03T09:00:00+00:00").unwrap();
        assert_eq!(store.clear(&subject, now, now).unwrap(), 0);
    }
}
