//! Which saved medicines are due at a given hour.
//!
//! A single threshold splits the day: hours before `EVENING_START_HOUR` are
//! Morning, the rest Evening. There is no afternoon bucket.

use chrono::Timelike;

use crate::config::EVENING_START_HOUR;
use crate::models::{Medicine, PrescriptionRecord, TimeOfDay, WhenToTake};

/// Time bucket for a wall-clock hour (0-23).
pub fn time_of_day(hour: u32) -> TimeOfDay {
    if hour < EVENING_START_HOUR {
        TimeOfDay::Morning
    } else {
        TimeOfDay::Evening
    }
}

pub fn is_due(medicine: &Medicine, time_of_day: TimeOfDay) -> bool {
    match medicine.when_to_take {
        WhenToTake::Both => true,
        WhenToTake::Morning => time_of_day == TimeOfDay::Morning,
        WhenToTake::Evening => time_of_day == TimeOfDay::Evening,
    }
}

/// Medicines due at `hour`, in record order then per-record order.
/// The same medicine appearing in several records is kept once per record.
pub fn due_medicines(records: &[PrescriptionRecord], hour: u32) -> Vec<Medicine> {
    let tod = time_of_day(hour);
    let due: Vec<Medicine> = records
        .iter()
        .flat_map(|r| r.medicines.iter())
        .filter(|m| is_due(m, tod))
        .cloned()
        .collect();

    tracing::debug!(
        hour,
        time_of_day = %tod,
        records = records.len(),
        due = due.len(),
        "Schedule filter applied"
    );
    due
}

/// Current local hour.
pub fn current_hour() -> u32 {
    chrono::Local::now().hour()
}
