//! SurrealDB-backed `ClinicalStore` and `AuditLog` implementations
//!
//! Uses the row types in [`crate::schema`] for persistence, converting to
//! and from [`crate::records`] at the boundary. Every SurrealDB error is
//! mapped to a [`StorageError`] here.

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;
use crate::handle::SurrealHandle;
use crate::records::*;
use crate::schema::*;
use crate::storage_traits::{AuditLog, ClinicalStore, StorageResult};

/// Client-side API failures (connection, transport) mean the backend could
/// not be reached; everything else is an answer we did not like.
fn backend_err(err: surrealdb::Error) -> StorageError {
    match err {
        surrealdb::Error::Api(api) => StorageError::Unavailable(api.to_string()),
        other => StorageError::Backend(other.to_string()),
    }
}

fn insert_err(entity: &str, id: String, err: surrealdb::Error) -> StorageError {
    let msg = err.to_string();
    if msg.contains("already contains") {
        StorageError::Duplicate {
            entity: entity.to_string(),
            id,
        }
    } else {
        backend_err(err)
    }
}

// ---------------------------------------------------------------------------
// SurrealClinicalStore
// ---------------------------------------------------------------------------

/// SurrealDB-backed implementation of [`ClinicalStore`].
#[derive(Clone)]
pub struct SurrealClinicalStore {
    handle: SurrealHandle,
}

impl SurrealClinicalStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    /// Fetch a single row of `table` whose `column` equals `value`.
    async fn fetch_one<T>(&self, table: &str, column: &str, value: String) -> StorageResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let sql = format!("SELECT * FROM {table} WHERE {column} = $value LIMIT 1");
        let mut res = self
            .handle
            .db()
            .query(sql)
            .bind(("value", value))
            .await
            .map_err(backend_err)?;
        let rows: Vec<T> = res.take(0).map_err(backend_err)?;
        Ok(rows.into_iter().next())
    }

    async fn create<T>(&self, table: &'static str, entity: &str, id: String, row: T) -> StorageResult<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        let _created: Option<T> = self
            .handle
            .db()
            .create(table)
            .content(row)
            .await
            .map_err(|e| insert_err(entity, id, e))?;
        Ok(())
    }
}

#[async_trait]
impl ClinicalStore for SurrealClinicalStore {
    async fn insert_patient(&self, patient: Patient) -> StorageResult<Patient> {
        debug!(patient_id = %patient.patient_id, "inserting patient");
        self.create(
            PATIENTS,
            "patient",
            patient.patient_id.to_string(),
            PatientRow::from(&patient),
        )
        .await?;
        Ok(patient)
    }

    async fn get_patient(&self, id: &PatientId) -> StorageResult<Patient> {
        self.fetch_one::<PatientRow>(PATIENTS, "patient_id", id.to_string())
            .await?
            .ok_or_else(|| StorageError::not_found("patient", id))?
            .into_record()
    }

    async fn insert_appointment(&self, appointment: Appointment) -> StorageResult<Appointment> {
        debug!(appointment_id = %appointment.appointment_id, "inserting appointment");
        self.create(
            APPOINTMENTS,
            "appointment",
            appointment.appointment_id.to_string(),
            AppointmentRow::from(&appointment),
        )
        .await?;
        Ok(appointment)
    }

    async fn get_appointment(&self, id: &AppointmentId) -> StorageResult<Appointment> {
        self.fetch_one::<AppointmentRow>(APPOINTMENTS, "appointment_id", id.to_string())
            .await?
            .ok_or_else(|| StorageError::not_found("appointment", id))?
            .into_record()
    }

    async fn compare_and_set_appointment_status(
        &self,
        id: &AppointmentId,
        expected_version: u64,
        new_status: AppointmentStatus,
        note: Option<String>,
    ) -> StorageResult<Appointment> {
        // A single conditional UPDATE: SurrealDB applies it atomically per
        // record, so two writers holding the same version cannot both win.
        let mut res = self
            .handle
            .db()
            .query(
                "UPDATE appointments SET status = $status, status_note = $note, \
                 version = version + 1, updated_at = time::now() \
                 WHERE appointment_id = $aid AND version = $expected",
            )
            .bind(("status", new_status.as_str().to_string()))
            .bind(("note", note))
            .bind(("aid", id.to_string()))
            .bind(("expected", expected_version))
            .await
            .map_err(backend_err)?;
        let rows: Vec<AppointmentRow> = res.take(0).map_err(backend_err)?;

        if let Some(row) = rows.into_iter().next() {
            debug!(appointment_id = %id, status = %new_status, "appointment status updated");
            return row.into_record();
        }

        let current = self.get_appointment(id).await?;
        Err(StorageError::VersionConflict {
            id: id.to_string(),
            expected: expected_version,
            actual: current.version,
        })
    }

    async fn insert_prescription(&self, prescription: Prescription) -> StorageResult<Prescription> {
        debug!(prescription_id = %prescription.prescription_id, "inserting prescription");
        self.create(
            PRESCRIPTIONS,
            "prescription",
            prescription.prescription_id.to_string(),
            PrescriptionRow::from(&prescription),
        )
        .await?;
        Ok(prescription)
    }

    async fn get_prescription(&self, id: &PrescriptionId) -> StorageResult<Prescription> {
        self.fetch_one::<PrescriptionRow>(PRESCRIPTIONS, "prescription_id", id.to_string())
            .await?
            .ok_or_else(|| StorageError::not_found("prescription", id))?
            .into_record()
    }

    async fn insert_interaction(&self, interaction: MedicationInteraction) -> StorageResult<()> {
        let id = format!("{}+{}", interaction.medication_a, interaction.medication_b);
        self.create(
            INTERACTIONS,
            "medication_interaction",
            id,
            InteractionRow::from(&interaction),
        )
        .await
    }

    async fn find_interactions(
        &self,
        medications: &[String],
    ) -> StorageResult<Vec<MedicationInteraction>> {
        let keys: Vec<String> = medications.iter().map(|m| m.to_lowercase()).collect();
        let mut res = self
            .handle
            .db()
            .query(
                "SELECT * FROM medication_interactions \
                 WHERE key_a INSIDE $keys AND key_b INSIDE $keys",
            )
            .bind(("keys", keys))
            .await
            .map_err(backend_err)?;
        let rows: Vec<InteractionRow> = res.take(0).map_err(backend_err)?;
        Ok(rows.into_iter().map(MedicationInteraction::from).collect())
    }

    async fn insert_lab_result(&self, result: LabResult) -> StorageResult<LabResult> {
        debug!(result_id = %result.result_id, "inserting lab result");
        self.create(
            LAB_RESULTS,
            "lab_result",
            result.result_id.to_string(),
            LabResultRow::from(&result),
        )
        .await?;
        Ok(result)
    }

    async fn get_lab_result(&self, id: &LabResultId) -> StorageResult<LabResult> {
        self.fetch_one::<LabResultRow>(LAB_RESULTS, "result_id", id.to_string())
            .await?
            .ok_or_else(|| StorageError::not_found("lab_result", id))?
            .into_record()
    }
}

// ---------------------------------------------------------------------------
// SurrealAuditLog
// ---------------------------------------------------------------------------

/// SurrealDB-backed implementation of [`AuditLog`].
#[derive(Clone)]
pub struct SurrealAuditLog {
    handle: SurrealHandle,
}

impl SurrealAuditLog {
    pub fn new(handle: SurrealHandle) -> Self {
        Self { handle }
    }

    async fn select(&self, sql: &'static str, binds: Vec<(&'static str, String)>) -> StorageResult<Vec<AuditRecord>> {
        let mut query = self.handle.db().query(sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let mut res = query.await.map_err(backend_err)?;
        let rows: Vec<AuditRow> = res.take(0).map_err(backend_err)?;
        rows.into_iter().map(AuditRow::into_record).collect()
    }
}

#[async_trait]
impl AuditLog for SurrealAuditLog {
    async fn append(&self, entry: AuditEntry) -> StorageResult<AuditRecord> {
        let record = AuditRecord::seal(entry);
        let _created: Option<AuditRow> = self
            .handle
            .db()
            .create(AUDIT_EVENTS)
            .content(AuditRow::from(&record))
            .await
            .map_err(backend_err)?;
        debug!(audit_id = %record.audit_id, action = %record.action, "audit record appended");
        Ok(record)
    }

    async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<AuditRecord>> {
        self.select(
            "SELECT * FROM audit_events WHERE resource_type = $rtype AND resource_id = $rid \
             ORDER BY recorded_at ASC",
            vec![
                ("rtype", resource_type.to_string()),
                ("rid", resource_id.to_string()),
            ],
        )
        .await
    }

    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> StorageResult<Vec<AuditRecord>> {
        self.select(
            "SELECT * FROM audit_events WHERE correlation_id = $cid ORDER BY recorded_at ASC",
            vec![("cid", correlation_id.to_string())],
        )
        .await
    }
}
