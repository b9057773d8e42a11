//! Port to the remote AI-processing service.
//!
//! Translation, report simplification and the patient chatbot run outside this
//! process. Calls are best effort: the caller decides what a failure means for
//! its own response.

use async_trait::async_trait;
use std::fmt;
use tracing::info;

/// Work handed to the service once a prescription is stored.
#[derive(Debug, Clone)]
pub struct PrescriptionJob {
    pub prescription_id: String,
    pub clinic_id: String,
    pub patient_id: String,
    pub drug_count: usize,
}

#[async_trait]
pub trait AiService: Send + Sync {
    /// Queue translation and audio generation for a new prescription.
    async fn translate_prescription(&self, job: &PrescriptionJob) -> anyhow::Result<()>;

    /// Queue simplification of an uploaded technical report.
    async fn process_report(&self, report_id: &str, patient_id: &str) -> anyhow::Result<()>;

    async fn query_chatbot(&self, query: &str, patient_id: &str) -> anyhow::Result<String>;
}

impl fmt::Debug for dyn AiService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AiService")
    }
}

pub const UNAVAILABLE_REPLY: &str = "AI service is currently unavailable. Please try again later.";

/// Stand-in used when no AI service is connected. Triggers are logged and
/// skipped; the chatbot answers with a fixed unavailability notice.
#[derive(Debug, Clone, Default)]
pub struct LogAiService;

#[async_trait]
impl AiService for LogAiService {
    async fn translate_prescription(&self, job: &PrescriptionJob) -> anyhow::Result<()> {
        info!(
            prescription = %job.prescription_id,
            drugs = job.drug_count,
            "AI service not connected, skipping translation"
        );
        Ok(())
    }

    async fn process_report(&self, report_id: &str, _patient_id: &str) -> anyhow::Result<()> {
        info!(report = %report_id, "AI service not connected, skipping report processing");
        Ok(())
    }

    async fn query_chatbot(&self, _query: &str, _patient_id: &str) -> anyhow::Result<String> {
        Ok(UNAVAILABLE_REPLY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_service_skips_triggers() {
        let ai = LogAiService;
        let job = PrescriptionJob {
            prescription_id: "RX-1".to_string(),
            clinic_id: "CLN-1".to_string(),
            patient_id: "PAT-1".to_string(),
            drug_count: 2,
        };
        assert!(ai.translate_prescription(&job).await.is_ok());
        assert!(ai.process_report("RPT-1", "PAT-1").await.is_ok());
        assert_eq!(
            ai.query_chatbot("what is paracetamol?", "PAT-1").await.unwrap(),
            UNAVAILABLE_REPLY
        );
    }
}
