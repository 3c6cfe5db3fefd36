use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use chrono::{DateTime, Utc};

use crate::error::{KizamiError, Result};

use super::{
    entities::{Kizami, StopState, Tag},
    repository::{KizamiRepository, Storage, TagRepository},
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    kizamis: BTreeMap<i64, Kizami>,
    tags: BTreeMap<i64, Tag>,
    /// Ordered `(kizami_id, tag_id)` pairs, mirroring the uniqueness of the SQLite relation.
    relation: Vec<(i64, i64)>,
    last_kizami_id: i64,
    last_tag_id: i64,
}

/// [Storage] kept entirely in memory. Behaves like [super::sqlite::SqliteStorage], including id
/// assignment that never reuses ids, which makes it suitable as a test double.
pub struct MemoryStorage {
    state: Rc<RefCell<MemoryState>>,
    kizamis: MemoryKizamiRepository,
    tags: MemoryTagRepository,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let state = Rc::new(RefCell::new(MemoryState::default()));
        Self {
            kizamis: MemoryKizamiRepository {
                state: state.clone(),
            },
            tags: MemoryTagRepository {
                state: state.clone(),
            },
            state,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    type Kizamis = MemoryKizamiRepository;
    type Tags = MemoryTagRepository;

    fn kizamis(&self) -> &Self::Kizamis {
        &self.kizamis
    }

    fn tags(&self) -> &Self::Tags {
        &self.tags
    }

    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let snapshot = self.state.borrow().clone();
        let result = f(self);
        if result.is_err() {
            *self.state.borrow_mut() = snapshot;
        }
        result
    }
}

pub struct MemoryKizamiRepository {
    state: Rc<RefCell<MemoryState>>,
}

impl KizamiRepository for MemoryKizamiRepository {
    fn insert(&self, desc: &str, started_at: DateTime<Utc>) -> Result<Kizami> {
        if desc.is_empty() {
            return Err(KizamiError::validation("description must not be empty"));
        }
        let mut state = self.state.borrow_mut();
        state.last_kizami_id += 1;
        let kizami = Kizami {
            id: state.last_kizami_id,
            desc: desc.to_owned(),
            started_at,
            stop: StopState::Running,
        };
        state.kizamis.insert(kizami.id, kizami.clone());
        Ok(kizami)
    }

    fn find_by_id(&self, id: i64) -> Result<Kizami> {
        self.state
            .borrow()
            .kizamis
            .get(&id)
            .cloned()
            .ok_or_else(|| KizamiError::kizami_not_found(id))
    }

    fn find_all(&self) -> Result<Vec<Kizami>> {
        Ok(self.state.borrow().kizamis.values().cloned().collect())
    }

    fn find_by_stopped_at(&self, stop: StopState) -> Result<Vec<Kizami>> {
        Ok(self
            .state
            .borrow()
            .kizamis
            .values()
            .filter(|k| k.stop == stop)
            .cloned()
            .collect())
    }

    fn find_started_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Kizami>> {
        Ok(self
            .state
            .borrow()
            .kizamis
            .values()
            .filter(|k| k.started_at >= from && k.started_at < to)
            .cloned()
            .collect())
    }

    fn update(&self, kizami: &Kizami) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match state.kizamis.get_mut(&kizami.id) {
            Some(stored) => {
                *stored = kizami.clone();
                Ok(())
            }
            None => Err(KizamiError::kizami_not_found(kizami.id)),
        }
    }

    fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.kizamis.remove(&id).is_none() {
            return Err(KizamiError::kizami_not_found(id));
        }
        state.relation.retain(|(kizami_id, _)| *kizami_id != id);
        Ok(())
    }

    fn tag(&self, kizami_id: i64, tag_ids: &[i64]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        for tag_id in tag_ids {
            let pair = (kizami_id, *tag_id);
            if !state.relation.contains(&pair) {
                state.relation.push(pair);
            }
        }
        Ok(())
    }

    fn untag(&self, kizami_id: i64) -> Result<()> {
        self.state
            .borrow_mut()
            .relation
            .retain(|(id, _)| *id != kizami_id);
        Ok(())
    }
}

pub struct MemoryTagRepository {
    state: Rc<RefCell<MemoryState>>,
}

impl TagRepository for MemoryTagRepository {
    fn insert_many(&self, labels: &[String]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        for label in labels {
            if state.tags.values().any(|t| &t.label == label) {
                continue;
            }
            state.last_tag_id += 1;
            let id = state.last_tag_id;
            state.tags.insert(
                id,
                Tag {
                    id,
                    label: label.clone(),
                },
            );
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.tags.remove(&id).is_none() {
            return Err(KizamiError::tag_not_found(id));
        }
        state.relation.retain(|(_, tag_id)| *tag_id != id);
        Ok(())
    }

    fn find_all(&self) -> Result<Vec<Tag>> {
        Ok(self.state.borrow().tags.values().cloned().collect())
    }

    fn find_by_kizami_id(&self, kizami_id: i64) -> Result<Vec<Tag>> {
        let state = self.state.borrow();
        Ok(state
            .tags
            .values()
            .filter(|t| state.relation.contains(&(kizami_id, t.id)))
            .cloned()
            .collect())
    }

    fn find_by_labels(&self, labels: &[String]) -> Result<Vec<Tag>> {
        Ok(self
            .state
            .borrow()
            .tags
            .values()
            .filter(|t| labels.contains(&t.label))
            .cloned()
            .collect())
    }
}
