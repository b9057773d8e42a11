//! Role-gated record endpoints.
//!
//! Persistence lives elsewhere; these handlers return placeholder payloads
//! scoped to the authenticated principal. Sensitive free-text fields are sealed
//! with the field cipher before they leave the handler, which is the form the
//! storage layer receives. AI work goes through the `AiService` port under
//! the collaborator timeout.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::ai::PrescriptionJob;
use crate::api::auth::body;
use crate::api::SharedState;
use crate::error::AuthError;
use crate::security::credentials::bounded;
use crate::security::gate::AuthContext;

#[derive(Debug, Deserialize)]
pub struct AdherenceRequest {
    pub prescription_id: String,
    pub dose_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChatbotQuery {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct DosageInstruction {
    pub drug_name: String,
    #[serde(default)]
    pub strength: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub duration_days: u32,
    #[serde(default)]
    pub patient_note: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPrescription {
    pub patient_id: String,
    pub diagnosis: String,
    #[serde(default)]
    pub vitals: HashMap<String, String>,
    #[serde(default)]
    pub instructions: Vec<DosageInstruction>,
    #[serde(default)]
    pub original_doctor_text: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportUpload {
    pub patient_id: String,
    pub scan_type: String,
    pub findings: String,
    #[serde(default)]
    pub referring_doctor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

fn seal(state: &SharedState, value: &str) -> Result<String, AuthError> {
    state.cipher.encrypt(value).map_err(|e| {
        error!("field encryption failed: {}", e);
        AuthError::Unavailable("field encryption failed".to_string())
    })
}

/// Bounded call into the AI service. Failures are logged here and surface
/// as `Unavailable`.
async fn call_ai<T, F>(state: &SharedState, what: &'static str, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    bounded(state.collaborator_timeout, what, async {
        fut.await.map_err(|e| {
            warn!(collaborator = what, error = %e, "AI service call failed");
            AuthError::Unavailable(format!("{what} failed"))
        })
    })
    .await
}

// Placeholder catalogue: (id, name, type, strength).
const DRUG_CATALOGUE: &[(&str, &str, &str, &str)] = &[
    ("drug-amoxicillin", "Amoxicillin", "allopathy", "500 mg"),
    ("drug-atorvastatin", "Atorvastatin", "allopathy", "10 mg"),
    ("drug-metformin", "Metformin", "allopathy", "500 mg"),
    ("drug-paracetamol", "Paracetamol", "allopathy", "650 mg"),
    ("drug-vitamin-d3", "Vitamin D3", "supplement", "60000 IU"),
];

const DRUG_SEARCH_MIN_LEN: usize = 2;
const DRUG_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct Drug {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub strength: &'static str,
}

fn catalogue() -> impl Iterator<Item = Drug> {
    DRUG_CATALOGUE
        .iter()
        .map(|&(id, name, kind, strength)| Drug {
            id,
            name,
            kind,
            strength,
        })
}

// GET /v1/patient/prescriptions
pub async fn patient_prescriptions(ctx: AuthContext) -> Json<Value> {
    Json(json!({
        "message": "Prescriptions retrieved successfully.",
        "user_id": ctx.subject,
        "data_scope": "Records filtered by authenticated user ID",
    }))
}

// GET /v1/patient/reports
pub async fn patient_reports(ctx: AuthContext) -> Json<Value> {
    Json(json!({
        "message": "Simplified reports loaded successfully.",
        "user_id": ctx.subject,
    }))
}

// POST /v1/patient/adherence
pub async fn log_adherence(
    ctx: AuthContext,
    payload: Result<Json<AdherenceRequest>, JsonRejection>,
) -> Result<Json<Value>, AuthError> {
    let req = body(payload)?;
    if req.prescription_id.trim().is_empty() {
        return Err(AuthError::InvalidInput("prescription_id is required".to_string()));
    }
    debug!(user = %ctx.subject, prescription = %req.prescription_id, dose_time = req.dose_time, "adherence logged");
    Ok(Json(json!({
        "message": "Adherence logged successfully.",
        "user_id": ctx.subject,
        "prescription_id": req.prescription_id,
    })))
}

// POST /v1/chatbot/query
pub async fn chatbot_query(
    State(state): State<SharedState>,
    ctx: AuthContext,
    payload: Result<Json<ChatbotQuery>, JsonRejection>,
) -> Result<Json<Value>, AuthError> {
    let req = body(payload)?;
    if req.query.trim().is_empty() {
        return Err(AuthError::InvalidInput("query is required".to_string()));
    }
    let response = call_ai(
        &state,
        "chatbot",
        state.ai.query_chatbot(&req.query, &ctx.subject),
    )
    .await?;
    Ok(Json(json!({
        "query": req.query,
        "user_id": ctx.subject,
        "response": response,
    })))
}

// POST /v1/clinic/prescriptions/new
pub async fn create_prescription(
    State(state): State<SharedState>,
    ctx: AuthContext,
    payload: Result<Json<NewPrescription>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AuthError> {
    let req = body(payload)?;
    if req.patient_id.trim().is_empty() || req.diagnosis.trim().is_empty() {
        return Err(AuthError::InvalidInput(
            "patient_id and diagnosis are required".to_string(),
        ));
    }

    let mut sealed = vec![("diagnosis", seal(&state, &req.diagnosis)?)];
    if !req.original_doctor_text.is_empty() {
        sealed.push(("original_doctor_text", seal(&state, &req.original_doctor_text)?));
    }
    let sealed_notes = req
        .instructions
        .iter()
        .filter(|i| !i.patient_note.is_empty())
        .map(|i| seal(&state, &i.patient_note))
        .collect::<Result<Vec<_>, _>>()?;

    let prescription_id = format!("RX-{}", Uuid::new_v4());
    debug!(
        clinic = %ctx.subject,
        prescription = %prescription_id,
        drugs = req.instructions.len(),
        vitals = req.vitals.len(),
        "prescription accepted"
    );

    // A failed trigger keeps the record; 202 marks translation as outstanding.
    let job = PrescriptionJob {
        prescription_id: prescription_id.clone(),
        clinic_id: ctx.subject.clone(),
        patient_id: req.patient_id.clone(),
        drug_count: req.instructions.len(),
    };
    let (status, message, ai_processing) =
        match call_ai(&state, "translation", state.ai.translate_prescription(&job)).await {
            Ok(()) => (StatusCode::CREATED, "Prescription created.", "triggered"),
            Err(_) => (
                StatusCode::ACCEPTED,
                "Prescription saved, but AI translation failed.",
                "failed",
            ),
        };

    Ok((
        status,
        Json(json!({
            "message": message,
            "ai_processing": ai_processing,
            "prescription_id": prescription_id,
            "clinic_id": ctx.subject,
            "patient_id": req.patient_id,
            "encrypted_fields": sealed.len() + sealed_notes.len(),
            "sealed": sealed.into_iter().collect::<HashMap<_, _>>(),
            "sealed_notes": sealed_notes,
        })),
    ))
}

// GET /v1/clinic/patients/search
pub async fn search_patients(Query(params): Query<SearchParams>) -> Json<Value> {
    Json(json!({
        "message": "Patient search executed.",
        "query": params.q,
        "results": ["PAT001 - A. Patient", "PAT002 - B. Patient"],
    }))
}

// GET /v1/clinic/patients/{id}/full
pub async fn patient_full_record(Path(patient_id): Path<String>) -> Json<Value> {
    Json(json!({
        "message": "Full professional record retrieved.",
        "patient_id": patient_id,
        "access_level": "Professional/Clinic",
    }))
}

// GET /v1/clinic/drugs
pub async fn list_drugs() -> Json<Vec<Drug>> {
    Json(catalogue().collect())
}

// GET /v1/clinic/drugs/search
pub async fn search_drugs(Query(params): Query<SearchParams>) -> Json<Vec<Drug>> {
    let needle = params.q.trim().to_lowercase();
    if needle.chars().count() < DRUG_SEARCH_MIN_LEN {
        return Json(Vec::new());
    }
    Json(
        catalogue()
            .filter(|d| d.name.to_lowercase().contains(&needle))
            .take(DRUG_SEARCH_LIMIT)
            .collect(),
    )
}

// POST /v1/scanning/reports/upload
pub async fn upload_report(
    State(state): State<SharedState>,
    ctx: AuthContext,
    payload: Result<Json<ReportUpload>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AuthError> {
    let req = body(payload)?;
    if req.patient_id.trim().is_empty() || req.findings.trim().is_empty() {
        return Err(AuthError::InvalidInput(
            "patient_id and findings are required".to_string(),
        ));
    }
    let sealed_findings = seal(&state, &req.findings)?;
    let report_id = format!("RPT-{}", Uuid::new_v4());
    debug!(
        scanning_center = %ctx.subject,
        report = %report_id,
        scan_type = %req.scan_type,
        referred = req.referring_doctor.is_some(),
        "technical report accepted"
    );

    let (status, message, ai_processing) = match call_ai(
        &state,
        "report processing",
        state.ai.process_report(&report_id, &req.patient_id),
    )
    .await
    {
        Ok(()) => (StatusCode::OK, "Technical report uploaded.", "triggered"),
        Err(_) => (
            StatusCode::ACCEPTED,
            "Report saved, but AI processing failed.",
            "failed",
        ),
    };
    Ok((
        status,
        Json(json!({
            "message": message,
            "ai_processing": ai_processing,
            "report_id": report_id,
            "scanning_center": ctx.subject,
            "patient_id": req.patient_id,
            "sealed_findings": sealed_findings,
        })),
    ))
}

// POST /v1/scanning/reports/{id}/finalize
pub async fn finalize_report(ctx: AuthContext, Path(report_id): Path<String>) -> Json<Value> {
    Json(json!({
        "message": "Report finalized and shared.",
        "report_id": report_id,
        "finalized_by": ctx.subject,
    }))
}

// POST /v1/admin/drugs/upload
pub async fn upload_drugs(ctx: AuthContext) -> (StatusCode, Json<Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Drug catalogue upload accepted.",
            "uploaded_by": ctx.subject,
            "role": ctx.role,
        })),
    )
}
