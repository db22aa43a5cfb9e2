//! SurrealDB schema migrations and initialization
//!
//! Sets up every HealthHub table with its indexes and permissions.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all HealthHub tables in SurrealDB
///
/// Called once per connection. Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing HealthHub SurrealDB schema");

    init_clinical_tables(db).await?;
    init_audit_table(db).await?;

    info!("HealthHub schema initialization complete");
    Ok(())
}

/// Clinical tables. Each row is keyed by its domain identifier through a
/// unique index so a duplicate insert fails instead of shadowing.
async fn init_clinical_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing clinical tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS patients SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_patient_id ON TABLE patients COLUMNS patient_id UNIQUE;

        DEFINE TABLE IF NOT EXISTS appointments SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_appointment_id ON TABLE appointments COLUMNS appointment_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_appointment_patient ON TABLE appointments COLUMNS patient_id;
        DEFINE INDEX IF NOT EXISTS idx_appointment_doctor ON TABLE appointments COLUMNS doctor_id;

        DEFINE TABLE IF NOT EXISTS prescriptions SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_prescription_id ON TABLE prescriptions COLUMNS prescription_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_prescription_patient ON TABLE prescriptions COLUMNS patient_id;

        DEFINE TABLE IF NOT EXISTS medication_interactions SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_interaction_pair ON TABLE medication_interactions COLUMNS key_a, key_b;

        DEFINE TABLE IF NOT EXISTS lab_results SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_lab_result_id ON TABLE lab_results COLUMNS result_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_lab_result_patient ON TABLE lab_results COLUMNS patient_id;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(format!("clinical tables: {e}")))?
        .check()
        .map_err(|e| StateError::SchemaSetup(format!("clinical tables: {e}")))?;

    Ok(())
}

/// `audit_events` is append-only: record-level users may create and read
/// but never update or delete.
async fn init_audit_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing audit_events table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS audit_events SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_audit_id ON TABLE audit_events COLUMNS audit_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_audit_resource ON TABLE audit_events COLUMNS resource_type, resource_id;
        DEFINE INDEX IF NOT EXISTS idx_audit_correlation ON TABLE audit_events COLUMNS correlation_id;
        DEFINE INDEX IF NOT EXISTS idx_audit_recorded_at ON TABLE audit_events COLUMNS recorded_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(format!("audit_events: {e}")))?
        .check()
        .map_err(|e| StateError::SchemaSetup(format!("audit_events: {e}")))?;

    Ok(())
}
