//! JSON-file alarm store.
//!
//! Persistence is best effort: a missing file starts empty, a corrupt
//! file is logged and starts empty, and a failed save is logged and the
//! in-memory state keeps serving.  The store is shared between the
//! control-plane handlers and the schedule evaluator behind one
//! `RwLock`, so mutations are serialized.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};

use wakemat_proto::{validate_fields, Alarm, ValidateError};

pub type SharedStore = Arc<RwLock<AlarmStore>>;

pub struct AlarmStore {
    path: PathBuf,
    alarms: Vec<Alarm>,
    next_id: u32,
}

impl AlarmStore {
    /// Load the store from `path`, starting empty if the file is
    /// missing or unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let alarms: Vec<Alarm> = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(alarms) => {
                    info!(path = %path.display(), "loaded alarms");
                    alarms
                }
                Err(e) => {
                    error!(path = %path.display(), "failed to parse alarm file: {e}. starting empty");
                    Vec::new()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no alarm file yet, starting empty");
                Vec::new()
            }
        };

        let next_id = alarms.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        Self {
            path,
            alarms,
            next_id,
        }
    }

    /// Persist the current records.  Best effort.
    fn save(&self) {
        match serde_json::to_vec_pretty(&self.alarms) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&self.path, bytes) {
                    error!(path = %self.path.display(), "failed to save alarms: {e}");
                }
            }
            Err(e) => error!("failed to serialize alarms: {e}"),
        }
    }

    pub fn list(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn get(&self, id: u32) -> Option<&Alarm> {
        self.alarms.iter().find(|a| a.id == id)
    }

    /// Validate and add a new alarm; returns the stored record.
    pub fn add(&mut self, time: String, weekdays: Vec<u8>) -> Result<Alarm, ValidateError> {
        validate_fields(&time, &weekdays)?;
        let alarm = Alarm {
            id: self.next_id,
            time,
            weekdays,
            active: true,
        };
        self.next_id += 1;
        self.alarms.push(alarm.clone());
        self.save();
        Ok(alarm)
    }

    /// Update time and/or weekdays of an existing alarm.  `Ok(None)`
    /// when the id is unknown.
    pub fn update(
        &mut self,
        id: u32,
        time: Option<String>,
        weekdays: Option<Vec<u8>>,
    ) -> Result<Option<Alarm>, ValidateError> {
        let Some(index) = self.alarms.iter().position(|a| a.id == id) else {
            return Ok(None);
        };

        let candidate_time = time.as_deref().unwrap_or(&self.alarms[index].time);
        let candidate_days = weekdays.as_deref().unwrap_or(&self.alarms[index].weekdays);
        validate_fields(candidate_time, candidate_days)?;

        let alarm = &mut self.alarms[index];
        if let Some(t) = time {
            alarm.time = t;
        }
        if let Some(w) = weekdays {
            alarm.weekdays = w;
        }
        let updated = alarm.clone();
        self.save();
        Ok(Some(updated))
    }

    /// Flip `active`; returns the updated record, or None for an
    /// unknown id.
    pub fn toggle(&mut self, id: u32) -> Option<Alarm> {
        let alarm = self.alarms.iter_mut().find(|a| a.id == id)?;
        alarm.active = !alarm.active;
        let updated = alarm.clone();
        self.save();
        Some(updated)
    }

    /// Remove an alarm; true when something was deleted.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.alarms.len();
        self.alarms.retain(|a| a.id != id);
        let removed = self.alarms.len() != before;
        if removed {
            self.save();
        }
        removed
    }
}

// ===========================================================================
// Tests
// ===========================================================================
