// libs/appointment-cell/src/services/slots.rs

/// The bookable times of a clinical day: 08:00 through 17:30 in 30-minute
/// steps, as "HH:MM" labels. Fixed and ordered ascending; slots are
/// derived from this catalog at read time, never persisted.
pub const ALL_SLOTS: [&str; 20] = [
    "08:00", "08:30", "09:00", "09:30", "10:00", "10:30",
    "11:00", "11:30", "12:00", "12:30", "13:00", "13:30",
    "14:00", "14:30", "15:00", "15:30", "16:00", "16:30",
    "17:00", "17:30",
];

pub fn is_catalog_slot(time: &str) -> bool {
    ALL_SLOTS.contains(&time)
}
