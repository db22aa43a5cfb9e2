//! In-memory fakes for storage traits (testing and demos)
//!
//! Provides `MemoryClinicalStore` and `MemoryAuditLog`, which satisfy the
//! trait contracts without any external dependencies, plus wrappers that
//! inject faults or observe calls:
//! - `FaultyAuditLog`: audit store outage, total or for chosen actions
//! - `UnavailableNotificationBus`: transport that rejects every publish
//! - `CountingClinicalStore`: counts read and write calls
//! - `SlowClinicalStore`: delays every call
//! - `SlowAuditLog`: delays appends for chosen actions

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::records::*;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryClinicalStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClinicalTables {
    patients: HashMap<PatientId, Patient>,
    appointments: HashMap<AppointmentId, Appointment>,
    prescriptions: HashMap<PrescriptionId, Prescription>,
    interactions: Vec<MedicationInteraction>,
    lab_results: HashMap<LabResultId, LabResult>,
}

/// In-memory clinical store. A single mutex guards all tables, which makes
/// every operation (including the compare-and-set) atomic.
#[derive(Debug, Default)]
pub struct MemoryClinicalStore {
    tables: Mutex<ClinicalTables>,
}

impl MemoryClinicalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClinicalStore for MemoryClinicalStore {
    async fn insert_patient(&self, patient: Patient) -> StorageResult<Patient> {
        let mut tables = self.tables.lock().unwrap();
        if tables.patients.contains_key(&patient.patient_id) {
            return Err(StorageError::Duplicate {
                entity: "patient".to_string(),
                id: patient.patient_id.to_string(),
            });
        }
        tables.patients.insert(patient.patient_id, patient.clone());
        Ok(patient)
    }

    async fn get_patient(&self, id: &PatientId) -> StorageResult<Patient> {
        let tables = self.tables.lock().unwrap();
        tables
            .patients
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("patient", id))
    }

    async fn insert_appointment(&self, appointment: Appointment) -> StorageResult<Appointment> {
        let mut tables = self.tables.lock().unwrap();
        if tables.appointments.contains_key(&appointment.appointment_id) {
            return Err(StorageError::Duplicate {
                entity: "appointment".to_string(),
                id: appointment.appointment_id.to_string(),
            });
        }
        tables
            .appointments
            .insert(appointment.appointment_id, appointment.clone());
        Ok(appointment)
    }

    async fn get_appointment(&self, id: &AppointmentId) -> StorageResult<Appointment> {
        let tables = self.tables.lock().unwrap();
        tables
            .appointments
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("appointment", id))
    }

    async fn compare_and_set_appointment_status(
        &self,
        id: &AppointmentId,
        expected_version: u64,
        new_status: AppointmentStatus,
        note: Option<String>,
    ) -> StorageResult<Appointment> {
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .appointments
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found("appointment", id))?;
        if row.version != expected_version {
            return Err(StorageError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: row.version,
            });
        }
        row.status = new_status;
        row.status_note = note;
        row.version += 1;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn insert_prescription(&self, prescription: Prescription) -> StorageResult<Prescription> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .prescriptions
            .contains_key(&prescription.prescription_id)
        {
            return Err(StorageError::Duplicate {
                entity: "prescription".to_string(),
                id: prescription.prescription_id.to_string(),
            });
        }
        tables
            .prescriptions
            .insert(prescription.prescription_id, prescription.clone());
        Ok(prescription)
    }

    async fn get_prescription(&self, id: &PrescriptionId) -> StorageResult<Prescription> {
        let tables = self.tables.lock().unwrap();
        tables
            .prescriptions
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("prescription", id))
    }

    async fn insert_interaction(&self, interaction: MedicationInteraction) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.interactions.push(interaction);
        Ok(())
    }

    async fn find_interactions(
        &self,
        medications: &[String],
    ) -> StorageResult<Vec<MedicationInteraction>> {
        let tables = self.tables.lock().unwrap();
        let mut found = Vec::new();
        for (i, a) in medications.iter().enumerate() {
            for b in &medications[i + 1..] {
                found.extend(
                    tables
                        .interactions
                        .iter()
                        .filter(|ix| ix.involves_pair(a, b))
                        .cloned(),
                );
            }
        }
        Ok(found)
    }

    async fn insert_lab_result(&self, result: LabResult) -> StorageResult<LabResult> {
        let mut tables = self.tables.lock().unwrap();
        if tables.lab_results.contains_key(&result.result_id) {
            return Err(StorageError::Duplicate {
                entity: "lab_result".to_string(),
                id: result.result_id.to_string(),
            });
        }
        tables.lab_results.insert(result.result_id, result.clone());
        Ok(result)
    }

    async fn get_lab_result(&self, id: &LabResultId) -> StorageResult<LabResult> {
        let tables = self.tables.lock().unwrap();
        tables
            .lab_results
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("lab_result", id))
    }
}

// ---------------------------------------------------------------------------
// MemoryAuditLog
// ---------------------------------------------------------------------------

/// In-memory append-only audit log backed by a `Vec` in append order.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, in append order.
    pub fn all(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> StorageResult<AuditRecord> {
        let record = AuditRecord::seal(entry);
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<AuditRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.resource_type == resource_type && r.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> StorageResult<Vec<AuditRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| &r.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// FaultyAuditLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum AuditFault {
    Always,
    OnActions(Vec<String>),
}

/// Audit log that reports `Unavailable` for every append, or only for the
/// listed actions. Appends that are not faulted go to an inner
/// `MemoryAuditLog`.
#[derive(Debug)]
pub struct FaultyAuditLog {
    inner: MemoryAuditLog,
    fault: AuditFault,
}

impl FaultyAuditLog {
    pub fn always() -> Self {
        Self {
            inner: MemoryAuditLog::new(),
            fault: AuditFault::Always,
        }
    }

    pub fn on_actions(actions: &[&str]) -> Self {
        Self {
            inner: MemoryAuditLog::new(),
            fault: AuditFault::OnActions(actions.iter().map(|a| a.to_string()).collect()),
        }
    }

    /// Records that were persisted despite the fault.
    pub fn persisted(&self) -> Vec<AuditRecord> {
        self.inner.all()
    }

    fn faults(&self, action: &str) -> bool {
        match &self.fault {
            AuditFault::Always => true,
            AuditFault::OnActions(actions) => actions.iter().any(|a| a == action),
        }
    }
}

#[async_trait]
impl AuditLog for FaultyAuditLog {
    async fn append(&self, entry: AuditEntry) -> StorageResult<AuditRecord> {
        if self.faults(&entry.action) {
            return Err(StorageError::Unavailable(
                "audit store connection refused".to_string(),
            ));
        }
        self.inner.append(entry).await
    }

    async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<AuditRecord>> {
        self.inner.list_for_resource(resource_type, resource_id).await
    }

    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> StorageResult<Vec<AuditRecord>> {
        self.inner.list_by_correlation(correlation_id).await
    }
}

// ---------------------------------------------------------------------------
// UnavailableNotificationBus
// ---------------------------------------------------------------------------

/// Transport that rejects every publish and subscribe.
#[derive(Debug, Default)]
pub struct UnavailableNotificationBus {
    attempts: AtomicUsize,
}

impl UnavailableNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publish attempts seen.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationBus for UnavailableNotificationBus {
    async fn publish(&self, _message: NotificationMessage) -> StorageResult<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Unavailable("pub/sub broker unreachable".to_string()))
    }

    async fn subscribe(
        &self,
        _channel: &str,
    ) -> StorageResult<broadcast::Receiver<NotificationMessage>> {
        Err(StorageError::Unavailable("pub/sub broker unreachable".to_string()))
    }
}

// ---------------------------------------------------------------------------
// CountingClinicalStore
// ---------------------------------------------------------------------------

/// Delegating store that counts read-path and write-path calls.
pub struct CountingClinicalStore {
    inner: Arc<dyn ClinicalStore>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingClinicalStore {
    pub fn new(inner: Arc<dyn ClinicalStore>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClinicalStore for CountingClinicalStore {
    async fn insert_patient(&self, patient: Patient) -> StorageResult<Patient> {
        self.write();
        self.inner.insert_patient(patient).await
    }

    async fn get_patient(&self, id: &PatientId) -> StorageResult<Patient> {
        self.read();
        self.inner.get_patient(id).await
    }

    async fn insert_appointment(&self, appointment: Appointment) -> StorageResult<Appointment> {
        self.write();
        self.inner.insert_appointment(appointment).await
    }

    async fn get_appointment(&self, id: &AppointmentId) -> StorageResult<Appointment> {
        self.read();
        self.inner.get_appointment(id).await
    }

    async fn compare_and_set_appointment_status(
        &self,
        id: &AppointmentId,
        expected_version: u64,
        new_status: AppointmentStatus,
        note: Option<String>,
    ) -> StorageResult<Appointment> {
        self.write();
        self.inner
            .compare_and_set_appointment_status(id, expected_version, new_status, note)
            .await
    }

    async fn insert_prescription(&self, prescription: Prescription) -> StorageResult<Prescription> {
        self.write();
        self.inner.insert_prescription(prescription).await
    }

    async fn get_prescription(&self, id: &PrescriptionId) -> StorageResult<Prescription> {
        self.read();
        self.inner.get_prescription(id).await
    }

    async fn insert_interaction(&self, interaction: MedicationInteraction) -> StorageResult<()> {
        self.write();
        self.inner.insert_interaction(interaction).await
    }

    async fn find_interactions(
        &self,
        medications: &[String],
    ) -> StorageResult<Vec<MedicationInteraction>> {
        self.read();
        self.inner.find_interactions(medications).await
    }

    async fn insert_lab_result(&self, result: LabResult) -> StorageResult<LabResult> {
        self.write();
        self.inner.insert_lab_result(result).await
    }

    async fn get_lab_result(&self, id: &LabResultId) -> StorageResult<LabResult> {
        self.read();
        self.inner.get_lab_result(id).await
    }
}

// ---------------------------------------------------------------------------
// SlowClinicalStore
// ---------------------------------------------------------------------------

/// Delegating store that sleeps before every call.
pub struct SlowClinicalStore {
    inner: Arc<dyn ClinicalStore>,
    delay: Duration,
}

impl SlowClinicalStore {
    pub fn new(inner: Arc<dyn ClinicalStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl ClinicalStore for SlowClinicalStore {
    async fn insert_patient(&self, patient: Patient) -> StorageResult<Patient> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_patient(patient).await
    }

    async fn get_patient(&self, id: &PatientId) -> StorageResult<Patient> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_patient(id).await
    }

    async fn insert_appointment(&self, appointment: Appointment) -> StorageResult<Appointment> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_appointment(appointment).await
    }

    async fn get_appointment(&self, id: &AppointmentId) -> StorageResult<Appointment> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_appointment(id).await
    }

    async fn compare_and_set_appointment_status(
        &self,
        id: &AppointmentId,
        expected_version: u64,
        new_status: AppointmentStatus,
        note: Option<String>,
    ) -> StorageResult<Appointment> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .compare_and_set_appointment_status(id, expected_version, new_status, note)
            .await
    }

    async fn insert_prescription(&self, prescription: Prescription) -> StorageResult<Prescription> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_prescription(prescription).await
    }

    async fn get_prescription(&self, id: &PrescriptionId) -> StorageResult<Prescription> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_prescription(id).await
    }

    async fn insert_interaction(&self, interaction: MedicationInteraction) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_interaction(interaction).await
    }

    async fn find_interactions(
        &self,
        medications: &[String],
    ) -> StorageResult<Vec<MedicationInteraction>> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_interactions(medications).await
    }

    async fn insert_lab_result(&self, result: LabResult) -> StorageResult<LabResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_lab_result(result).await
    }

    async fn get_lab_result(&self, id: &LabResultId) -> StorageResult<LabResult> {
        tokio::time::sleep(self.delay).await;
        self.inner.get_lab_result(id).await
    }
}

// ---------------------------------------------------------------------------
// SlowAuditLog
// ---------------------------------------------------------------------------

/// Audit log that sleeps before appending the listed actions. Appends land
/// in an inner `MemoryAuditLog` once the delay has passed.
#[derive(Debug)]
pub struct SlowAuditLog {
    inner: MemoryAuditLog,
    delay: Duration,
    actions: Vec<String>,
}

impl SlowAuditLog {
    pub fn on_actions(actions: &[&str], delay: Duration) -> Self {
        Self {
            inner: MemoryAuditLog::new(),
            delay,
            actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Records appended so far.
    pub fn persisted(&self) -> Vec<AuditRecord> {
        self.inner.all()
    }
}

#[async_trait]
impl AuditLog for SlowAuditLog {
    async fn append(&self, entry: AuditEntry) -> StorageResult<AuditRecord> {
        if self.actions.iter().any(|a| a == &entry.action) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.append(entry).await
    }

    async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<AuditRecord>> {
        self.inner.list_for_resource(resource_type, resource_id).await
    }

    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> StorageResult<Vec<AuditRecord>> {
        self.inner.list_by_correlation(correlation_id).await
    }
}
