//! Report delivery.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{Report, ReportError};

/// Delivers a finished report to its recipients.
#[async_trait]
pub trait ReportSender: Send + Sync {
    async fn send(&self, report: &Report) -> Result<(), ReportError>;
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    to: &'a [String],
    cc: &'a [String],
    subject: &'a str,
    body: &'a str,
    attachment: AttachmentMeta<'a>,
}

#[derive(Debug, Serialize)]
struct AttachmentMeta<'a> {
    filename: &'a str,
    content_type: &'a str,
    sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

fn envelope(report: &Report, inline: bool) -> Envelope<'_> {
    let content = inline
        .then(|| base64::engine::general_purpose::STANDARD.encode(&report.attachment));
    Envelope {
        to: &report.recipients,
        cc: &report.cc,
        subject: &report.subject,
        body: &report.body,
        attachment: AttachmentMeta {
            filename: &report.filename,
            content_type: report.content_type,
            sha256: hex::encode(Sha256::digest(&report.attachment)),
            content,
        },
    }
}

/// Posts the report as JSON (attachment base64 encoded) to a mail relay.
pub struct HttpRelaySender {
    client: reqwest::Client,
    url: String,
}

impl HttpRelaySender {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ReportSender for HttpRelaySender {
    async fn send(&self, report: &Report) -> Result<(), ReportError> {
        let response = self
            .client
            .post(&self.url)
            .json(&envelope(report, true))
            .send()
            .await
            .map_err(|e| ReportError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ReportError::Delivery(format!(
                "relay returned {}: {}",
                status, text
            )));
        }

        info!("Report '{}' handed to relay {}", report.subject, self.url);
        Ok(())
    }
}

/// Writes the attachment and a JSON envelope into a directory for pickup.
pub struct OutboxSender {
    dir: PathBuf,
}

impl OutboxSender {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ReportSender for OutboxSender {
    async fn send(&self, report: &Report) -> Result<(), ReportError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let attachment_path = self.dir.join(format!("{}_{}", stamp, report.filename));
        let envelope_path = self.dir.join(format!("{}_envelope.json", stamp));

        tokio::fs::write(&attachment_path, &report.attachment).await?;
        let json = serde_json::to_vec_pretty(&envelope(report, false))
            .map_err(|e| ReportError::Delivery(e.to_string()))?;
        tokio::fs::write(&envelope_path, json).await?;

        info!("Report written to {}", attachment_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn report() -> Report {
        Report {
            filename: "out.xlsx".to_string(),
            subject: "subject".to_string(),
            body: "body".to_string(),
            recipients: vec!["a@example.com".to_string()],
            cc: Vec::new(),
            attachment: b"PK\x03\x04data".to_vec(),
            content_type: super::super::XLSX_MIME,
            succeeded: 1,
            failed: 0,
            elapsed: "0h 0m 1s".to_string(),
        }
    }

    #[test]
    fn test_envelope_inline_attachment() {
        let report = report();
        let json = serde_json::to_value(envelope(&report, true)).unwrap();
        assert_eq!(json["to"][0], "a@example.com");
        assert_eq!(json["attachment"]["filename"], "out.xlsx");
        assert_eq!(json["attachment"]["sha256"].as_str().unwrap().len(), 64);

        let encoded = json["attachment"]["content"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, report.attachment);
    }

    #[test]
    fn test_envelope_without_content() {
        let report = report();
        let json = serde_json::to_value(envelope(&report, false)).unwrap();
        assert!(json["attachment"].get("content").is_none());
    }

    #[tokio::test]
    async fn test_outbox_writes_files() {
        let dir = tempdir().unwrap();
        let sender = OutboxSender::new(dir.path().join("outbox"));
        sender.send(&report()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("outbox"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with("_out.xlsx")));
        assert!(names.iter().any(|n| n.ends_with("_envelope.json")));
    }
}
