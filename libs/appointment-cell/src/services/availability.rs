// libs/appointment-cell/src/services/availability.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;
use crate::services::slots::ALL_SLOTS;

/// Computes slot occupancy for a doctor on a calendar day. Cancelled
/// appointments never occupy a slot; an optional exclude id omits the
/// appointment currently being edited so its own slot stays bookable.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
}

impl AvailabilityService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Catalog minus the time values of the doctor's non-cancelled
    /// appointments on `date`, ascending order preserved.
    ///
    /// If `exclude_appointment_id` names an appointment on a different
    /// doctor or day, nothing is re-added here; the caller decides
    /// whether to merge the original slot back in.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<&'static str>, AppointmentError> {
        debug!("Computing available slots for doctor {} on {}", doctor_id, date);

        let occupied = self
            .occupied_times(doctor_id, date, exclude_appointment_id, auth_token)
            .await?;

        Ok(ALL_SLOTS
            .iter()
            .copied()
            .filter(|slot| !occupied.contains(*slot))
            .collect())
    }

    /// Single-slot membership check. Must be re-run immediately before a
    /// create/update commit: the slot list shown to the user may be stale.
    pub async fn is_slot_available(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &str,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        debug!("Checking slot {} for doctor {} on {}", time, doctor_id, date);

        let mut query_parts = vec![
            format!("doctor_id=eq.{}", doctor_id),
            format!("date=eq.{}", date),
            format!("time=eq.{}", time),
            "status=neq.cancelled".to_string(),
        ];
        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&select=id",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        let available = result.is_empty();
        if !available {
            warn!(
                "Slot {} on {} for doctor {} already taken",
                time, date, doctor_id
            );
        }

        Ok(available)
    }

    async fn occupied_times(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<HashSet<String>, AppointmentError> {
        let mut query_parts = vec![
            format!("doctor_id=eq.{}", doctor_id),
            format!("date=eq.{}", date),
            "status=neq.cancelled".to_string(),
        ];
        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&select=time",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        Ok(result
            .into_iter()
            .filter_map(|row| row["time"].as_str().map(|t| t.to_string()))
            .collect())
    }
}
