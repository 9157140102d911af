// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::is_catalog_slot;

/// Appointment lifecycle manager: create, update, status transitions,
/// delete and listings. Every mutating operation writes through to the
/// store; reads always re-fetch, there is no local cache. Reschedules go
/// through the availability re-check as late as possible to narrow the
/// window between slot-list render and submit.
pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    availability: AvailabilityService,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            availability: AvailabilityService::new(Arc::clone(&supabase)),
            lifecycle: AppointmentLifecycleService::new(),
            supabase,
        }
    }

    pub fn availability(&self) -> &AvailabilityService {
        &self.availability
    }

    /// Book a new appointment. Re-validates slot availability at call
    /// time; a concurrent booking of the same (doctor, date, time) makes
    /// the second create fail with `SlotConflict` and nothing is written.
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {} on {} at {}",
            request.patient_id, request.doctor_id, request.date, request.time
        );

        self.validate_create_request(&request)?;

        let available = self
            .availability
            .is_slot_available(request.doctor_id, request.date, &request.time, None, auth_token)
            .await?;
        if !available {
            warn!(
                "Booking conflict for doctor {} on {} at {}",
                request.doctor_id, request.date, request.time
            );
            return Err(AppointmentError::SlotConflict);
        }

        let now = Utc::now();
        let appointment_data = json!({
            "patient_id": request.patient_id,
            "patient_name": request.patient_name,
            "doctor_id": request.doctor_id,
            "doctor_name": request.doctor_name,
            "date": request.date.to_string(),
            "time": request.time,
            "status": AppointmentStatus::Pending.to_string(),
            "reason": request.reason,
            "notes": request.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(return_representation()),
            )
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        let appointment = parse_single(result)?;
        info!("Appointment {} booked successfully", appointment.id);
        Ok(appointment)
    }

    /// Update an existing appointment. Changing doctor/date/time
    /// re-validates the target slot with the record itself excluded, so
    /// resubmitting an unchanged booking never conflicts with itself.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if request.edits_fields() && !self.lifecycle.can_be_edited(current.status) {
            return Err(AppointmentError::Validation(format!(
                "Appointment in status {} can no longer be modified",
                current.status
            )));
        }

        if let Some(new_status) = request.status {
            if new_status != current.status {
                self.lifecycle
                    .validate_status_transition(current.status, new_status)?;
            }
        }

        if request.reschedules(&current) {
            let target_doctor = request.doctor_id.unwrap_or(current.doctor_id);
            let target_date = request.date.unwrap_or(current.date);
            let target_time = request.time.as_deref().unwrap_or(&current.time);

            self.validate_booking_target(target_date, target_time)?;

            let available = self
                .availability
                .is_slot_available(
                    target_doctor,
                    target_date,
                    target_time,
                    Some(appointment_id),
                    auth_token,
                )
                .await?;
            if !available {
                warn!(
                    "Reschedule conflict for appointment {} -> doctor {} on {} at {}",
                    appointment_id, target_doctor, target_date, target_time
                );
                return Err(AppointmentError::SlotConflict);
            }
        }

        let mut update_data = serde_json::Map::new();
        if let Some(doctor_id) = request.doctor_id {
            update_data.insert("doctor_id".to_string(), json!(doctor_id));
        }
        if let Some(doctor_name) = request.doctor_name {
            update_data.insert("doctor_name".to_string(), json!(doctor_name));
        }
        if let Some(date) = request.date {
            update_data.insert("date".to_string(), json!(date.to_string()));
        }
        if let Some(time) = request.time {
            update_data.insert("time".to_string(), json!(time));
        }
        if let Some(reason) = request.reason {
            update_data.insert("reason".to_string(), json!(reason));
        }
        if let Some(notes) = request.notes {
            update_data.insert("notes".to_string(), json!(notes));
        }
        if let Some(status) = request.status {
            update_data.insert("status".to_string(), json!(status.to_string()));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(return_representation()),
            )
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        // Zero matched rows means the record vanished between the fetch
        // and the write
        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        let updated = parse_single(result)?;
        info!("Appointment {} updated successfully", appointment_id);
        Ok(updated)
    }

    /// Status-only convenience wrapper. No slot re-validation is needed
    /// since doctor/date/time are unchanged; cancelling releases the slot
    /// implicitly because cancelled records are excluded from occupancy.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating status of appointment {} to {}", appointment_id, new_status);

        let current = self.get_appointment(appointment_id, auth_token).await?;
        if new_status == current.status {
            return Ok(current);
        }

        self.lifecycle
            .validate_status_transition(current.status, new_status)?;

        let update_data = json!({
            "status": new_status.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(return_representation()),
            )
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        let updated = parse_single(result)?;
        info!("Appointment {} is now {}", appointment_id, updated.status);
        Ok(updated)
    }

    /// Permanently remove a record. Distinct from cancellation: cancel
    /// keeps the row (status = cancelled), delete does not.
    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!("Deleting appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(return_representation()),
            )
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        parse_row(result[0].clone())
    }

    pub async fn get_doctor_appointments(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&order=date.asc,time.asc",
            doctor_id
        );
        self.fetch_list(&path, auth_token).await
    }

    pub async fn get_patient_appointments(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&order=date.asc,time.asc",
            patient_id
        );
        self.fetch_list(&path, auth_token).await
    }

    /// Today's appointments for a doctor, ordered by slot time.
    pub async fn get_today_appointments(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let today = Utc::now().date_naive();
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&order=time.asc",
            doctor_id, today
        );
        self.fetch_list(&path, auth_token).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn fetch_list(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Store(e.to_string()))?;

        result.into_iter().map(parse_row).collect()
    }

    fn validate_create_request(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<(), AppointmentError> {
        if request.patient_name.trim().is_empty() {
            return Err(AppointmentError::Validation(
                "Patient name is required".to_string(),
            ));
        }
        if request.doctor_name.trim().is_empty() {
            return Err(AppointmentError::Validation(
                "Doctor name is required".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(AppointmentError::Validation(
                "Reason is required".to_string(),
            ));
        }
        self.validate_booking_target(request.date, &request.time)
    }

    /// Shared create/reschedule target rules: the time must be a catalog
    /// label and the day must not be in the past. No intra-day floor is
    /// applied beyond slot granularity when the date is today.
    fn validate_booking_target(
        &self,
        date: NaiveDate,
        time: &str,
    ) -> Result<(), AppointmentError> {
        if !is_catalog_slot(time) {
            return Err(AppointmentError::Validation(format!(
                "Time {} is not a bookable slot",
                time
            )));
        }
        if date < Utc::now().date_naive() {
            return Err(AppointmentError::Validation(
                "Appointment date cannot be in the past".to_string(),
            ));
        }
        Ok(())
    }
}

fn return_representation() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}

fn parse_single(result: Vec<Value>) -> Result<Appointment, AppointmentError> {
    let row = result
        .into_iter()
        .next()
        .ok_or_else(|| AppointmentError::Store("Store returned no rows".to_string()))?;
    parse_row(row)
}

fn parse_row(row: Value) -> Result<Appointment, AppointmentError> {
    serde_json::from_value(row)
        .map_err(|e| AppointmentError::Store(format!("Failed to parse appointment: {}", e)))
}
