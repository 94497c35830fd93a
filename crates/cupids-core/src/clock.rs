//! Clocks
//!
//! Production code takes an `Arc<dyn Clock>`; [`ManualClock`] lets tests pin
//! and advance time.

use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use std::sync::{Arc, Mutex};

pub use mockable::DefaultClock;

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Wall clock
pub fn system() -> SharedClock {
    Arc::new(DefaultClock)
}

/// Clock that only moves when told to
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(now)))
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
