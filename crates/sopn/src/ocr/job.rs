//! OCR job lifecycle: `submitted -> succeeded | failed`, never backwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};

use super::blocks::AnalysisOutput;
use super::error::OcrError;
use super::service::{AnalysisState, DocumentAnalysisService};
use crate::db::document_repo::DocumentRow;
use crate::db::ocr_repo::{self, OcrJobRow, PageImageRow};
use crate::db::{now, Database, DatabaseError};
use crate::error::Result;
use crate::pages::PageAssignment;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrJobStatus {
    Submitted,
    Succeeded,
    Failed,
}

impl OcrJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrJobStatus::Submitted => "submitted",
            OcrJobStatus::Succeeded => "succeeded",
            OcrJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OcrJobStatus::Submitted)
    }
}

impl fmt::Display for OcrJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrJobStatus {
    type Err = OcrError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(OcrJobStatus::Submitted),
            "succeeded" => Ok(OcrJobStatus::Succeeded),
            "failed" => Ok(OcrJobStatus::Failed),
            other => Err(OcrError::UnknownStatus(other.to_string())),
        }
    }
}

/// Result of asking for a document to be analysed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A new job was started.
    Started { job_id: String },
    /// A job already exists and was left alone.
    Existing(OcrJobStatus),
}

/// What the image backend has for a document.
#[derive(Debug, Clone, PartialEq)]
pub enum OcrTable {
    NoJob,
    Pending,
    Failed(Option<String>),
    /// The job succeeded; the output may still hold no table.
    Ready(Option<Table>),
}

/// Submits documents to the analysis service and advances their jobs.
pub struct OcrJobs {
    db: Database,
    service: Arc<dyn DocumentAnalysisService>,
    storage_dir: PathBuf,
}

impl OcrJobs {
    pub fn new(
        db: Database,
        service: Arc<dyn DocumentAnalysisService>,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            service,
            storage_dir: storage_dir.into(),
        }
    }

    /// Sends a document to the service unless it already has a job.
    ///
    /// An existing job is left alone whatever its state: a running job is
    /// never submitted twice and a finished one keeps its stored output.
    pub async fn submit(&self, document: &DocumentRow, pages: &PageAssignment) -> Result<Submission> {
        let span = info_span!("ocr.submit", document_id = %document.id);
        self.start(document, pages).instrument(span).await
    }

    async fn start(&self, document: &DocumentRow, pages: &PageAssignment) -> Result<Submission> {
        if let Some(existing) = ocr_repo::find(&self.db, &document.id)? {
            let status: OcrJobStatus = existing.status.parse()?;
            debug!(status = %status, "Job already exists");
            return Ok(Submission::Existing(status));
        }
        self.send(document, pages).await
    }

    /// Starts a new attempt for a document whose latest job failed.
    ///
    /// The failed attempt stays on record. A document with a running or
    /// succeeded job is returned unchanged.
    pub async fn retry(&self, document: &DocumentRow, pages: &PageAssignment) -> Result<Submission> {
        let span = info_span!("ocr.retry", document_id = %document.id);
        self.start_again(document, pages).instrument(span).await
    }

    async fn start_again(
        &self,
        document: &DocumentRow,
        pages: &PageAssignment,
    ) -> Result<Submission> {
        match ocr_repo::find(&self.db, &document.id)? {
            Some(existing) => {
                let status: OcrJobStatus = existing.status.parse()?;
                if status != OcrJobStatus::Failed {
                    info!(status = %status, "Only failed jobs are retried");
                    return Ok(Submission::Existing(status));
                }
                info!(previous_job_id = %existing.job_id, "Retrying failed job");
            }
            None => debug!("No earlier job, submitting"),
        }
        self.send(document, pages).await
    }

    async fn send(&self, document: &DocumentRow, pages: &PageAssignment) -> Result<Submission> {
        let path = Path::new(&document.file_path);
        let pdf = tokio::fs::read(path)
            .await
            .map_err(|e| OcrError::ReadDocument {
                path: path.to_path_buf(),
                source: e,
            })?;

        let page_list = match pages {
            PageAssignment::All => None,
            PageAssignment::Pages(pages) => Some(pages.as_slice()),
        };
        let job_id = self.service.start_analysis(pdf, page_list).await?;

        let timestamp = now();
        ocr_repo::insert_submitted(
            &self.db,
            &OcrJobRow {
                document_id: document.id.clone(),
                job_id: job_id.clone(),
                status: OcrJobStatus::Submitted.as_str().to_string(),
                pages: page_list.map(|_| pages.to_string()),
                raw_output: None,
                error: None,
                submitted_at: timestamp.clone(),
                updated_at: timestamp,
            },
        )?;
        info!(job_id = %job_id, "Submitted document for analysis");
        Ok(Submission::Started { job_id })
    }

    /// Polls the service once for `job` and records any terminal state.
    ///
    /// Terminal jobs are returned unchanged. A status request that fails in
    /// transport leaves the job `submitted` for the next sweep.
    pub async fn update_job_status(&self, job: &OcrJobRow) -> Result<OcrJobStatus> {
        let span = info_span!("ocr.update",
            document_id = %job.document_id,
            job_id = %job.job_id,
        );
        self.poll(job).instrument(span).await
    }

    async fn poll(&self, job: &OcrJobRow) -> Result<OcrJobStatus> {
        let current: OcrJobStatus = job.status.parse()?;
        if current.is_terminal() {
            return Ok(current);
        }

        let status = match self.service.analysis_status(&job.job_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to poll job status: {}", e);
                return Ok(OcrJobStatus::Submitted);
            }
        };

        match status.status {
            AnalysisState::InProgress => {
                debug!("Job still running");
                Ok(OcrJobStatus::Submitted)
            }
            AnalysisState::Failed => {
                let message = status
                    .status_message
                    .unwrap_or_else(|| "analysis failed".to_string());
                error!("Analysis job failed: {}", message);
                self.finish_failed(job, &message)
            }
            AnalysisState::Succeeded | AnalysisState::PartialSuccess => {
                let output = match self.service.analysis_result(&job.job_id).await {
                    Ok(output) => output,
                    Err(e) => {
                        error!("Failed to fetch analysis result: {}", e);
                        return self.finish_failed(job, &e.to_string());
                    }
                };
                self.finish_succeeded(job, &output).await
            }
        }
    }

    /// Advances every job that is still `submitted`, one at a time. Jobs of
    /// locked ballots and past elections are left alone.
    pub async fn sweep(&self) -> Result<Vec<(String, OcrJobStatus)>> {
        let jobs = ocr_repo::list_for_open_ballots(&self.db, OcrJobStatus::Submitted.as_str())?;
        info!(jobs = jobs.len(), "Polling submitted OCR jobs");

        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            match self.update_job_status(&job).await {
                Ok(status) => results.push((job.document_id, status)),
                Err(e) => error!(document_id = %job.document_id, "Failed to update OCR job: {}", e),
            }
        }
        Ok(results)
    }

    fn finish_failed(&self, job: &OcrJobRow, message: &str) -> Result<OcrJobStatus> {
        if !ocr_repo::mark_failed(&self.db, &job.job_id, message, &now())? {
            warn!("Job left submitted state concurrently");
        }
        Ok(OcrJobStatus::Failed)
    }

    async fn finish_succeeded(
        &self,
        job: &OcrJobRow,
        output: &AnalysisOutput,
    ) -> Result<OcrJobStatus> {
        let raw_output = serde_json::to_string(output).map_err(OcrError::Json)?;

        // Images are optional; losing them must not hold the job back.
        match self.service.page_images(&job.job_id).await {
            Ok(Some(images)) => match self.store_images(job, &images).await {
                Ok(stored) => debug!(images = stored, "Stored page images"),
                Err(e) => warn!("Failed to store page images: {}", e),
            },
            Ok(None) => debug!("Service provides no page images"),
            Err(e) => warn!("Failed to fetch page images: {}", e),
        }

        if !ocr_repo::mark_succeeded(&self.db, &job.job_id, &raw_output, &now())? {
            warn!("Job left submitted state concurrently");
        }
        info!(blocks = output.blocks.len(), "Analysis job succeeded");
        Ok(OcrJobStatus::Succeeded)
    }

    async fn store_images(&self, job: &OcrJobRow, images: &[Vec<u8>]) -> Result<usize> {
        let rows = self.write_images(&job.document_id, images).await?;
        ocr_repo::replace_images(&self.db, &job.job_id, &rows)?;
        Ok(rows.len())
    }

    /// Writes `page_{n}.png` files under `ocr/{document_id}`, replacing any
    /// earlier set.
    async fn write_images(
        &self,
        document_id: &str,
        images: &[Vec<u8>],
    ) -> Result<Vec<PageImageRow>> {
        let dir = self.storage_dir.join("ocr").join(document_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(OcrError::WriteImage {
                    path: dir,
                    source: e,
                }
                .into())
            }
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| OcrError::WriteImage {
                path: dir.clone(),
                source: e,
            })?;

        let mut rows = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let page_number = i as u32 + 1;
            let path = dir.join(format!("page_{}.png", page_number));
            tokio::fs::write(&path, image)
                .await
                .map_err(|e| OcrError::WriteImage {
                    path: path.clone(),
                    source: e,
                })?;
            rows.push(PageImageRow {
                page_number,
                image_path: path.display().to_string(),
            });
        }
        Ok(rows)
    }
}

/// The table recovered by the image backend for a document.
pub fn job_table(db: &Database, document_id: &str, stop_phrases: &[String]) -> Result<OcrTable> {
    let Some(job) = ocr_repo::find(db, document_id)? else {
        return Ok(OcrTable::NoJob);
    };
    let status: OcrJobStatus = job.status.parse()?;
    match status {
        OcrJobStatus::Submitted => Ok(OcrTable::Pending),
        OcrJobStatus::Failed => Ok(OcrTable::Failed(job.error)),
        OcrJobStatus::Succeeded => {
            let raw = job.raw_output.unwrap_or_default();
            let output: AnalysisOutput =
                serde_json::from_str(&raw).map_err(|e| DatabaseError::Json {
                    column: "raw_output",
                    source: e,
                })?;
            Ok(OcrTable::Ready(output.stitched_table(stop_phrases)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ballot_repo::{self, BallotRow};
    use crate::db::document_repo;
    use crate::testing::{analysis_output, pdf_with_pages, FakeAnalysisService};

    struct Fixture {
        db: Database,
        service: Arc<FakeAnalysisService>,
        document: DocumentRow,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let dir = tempfile::tempdir().unwrap();
            ballot_repo::upsert(
                &db,
                &BallotRow {
                    ballot_paper_id: "b1".to_string(),
                    election_slug: "e1".to_string(),
                    post_label: "Yaxley".to_string(),
                    party_register: "GB".to_string(),
                    is_welsh_run: false,
                    election_current: true,
                    candidates_locked: false,
                    created_at: String::new(),
                },
            )
            .unwrap();
            let path = dir.path().join("scan.pdf");
            std::fs::write(&path, pdf_with_pages(&["", ""])).unwrap();
            let document = DocumentRow {
                id: "d1".to_string(),
                ballot_paper_id: "b1".to_string(),
                source_url: "https://example.gov.uk/scan.pdf".to_string(),
                file_path: path.display().to_string(),
                file_kind: "pdf".to_string(),
                relevant_pages: Some("all".to_string()),
                created_at: now(),
            };
            document_repo::attach(&db, &document).unwrap();
            Self {
                db,
                service: Arc::new(FakeAnalysisService::default()),
                document,
                dir,
            }
        }

        fn jobs(&self) -> OcrJobs {
            OcrJobs::new(
                self.db.clone(),
                self.service.clone(),
                self.dir.path().join("storage"),
            )
        }

        fn job(&self) -> OcrJobRow {
            ocr_repo::find(&self.db, "d1").unwrap().unwrap()
        }
    }

    fn stops() -> Vec<String> {
        vec!["polling station".to_string()]
    }

    #[test]
    fn test_status_round_trip_and_terminal() {
        for status in [
            OcrJobStatus::Submitted,
            OcrJobStatus::Succeeded,
            OcrJobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OcrJobStatus>().unwrap(), status);
        }
        assert!(!OcrJobStatus::Submitted.is_terminal());
        assert!(OcrJobStatus::Failed.is_terminal());
        assert!("SUCCEEDED".parse::<OcrJobStatus>().is_err());
    }

    #[tokio::test]
    async fn test_submit_once() {
        let fx = Fixture::new();
        let jobs = fx.jobs();

        let first = jobs
            .submit(&fx.document, &PageAssignment::Pages(vec![2]))
            .await
            .unwrap();
        assert_eq!(
            first,
            Submission::Started {
                job_id: "job-1".to_string()
            }
        );
        assert_eq!(fx.job().pages.as_deref(), Some("2"));

        // In flight: never submitted again.
        let second = jobs
            .submit(&fx.document, &PageAssignment::All)
            .await
            .unwrap();
        assert_eq!(second, Submission::Existing(OcrJobStatus::Submitted));
        assert_eq!(fx.service.submissions(), vec![Some(vec![2])]);
    }

    #[tokio::test]
    async fn test_in_progress_and_transport_errors_stay_submitted() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All)
            .await
            .unwrap();

        // No state set: the fake fails like a dropped connection.
        assert_eq!(
            jobs.update_job_status(&fx.job()).await.unwrap(),
            OcrJobStatus::Submitted
        );

        fx.service.set_state(AnalysisState::InProgress);
        assert_eq!(
            jobs.update_job_status(&fx.job()).await.unwrap(),
            OcrJobStatus::Submitted
        );
        let job = fx.job();
        assert_eq!(job.status, "submitted");
        assert!(job.raw_output.is_none());
    }

    #[tokio::test]
    async fn test_success_stores_output_and_images() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All)
            .await
            .unwrap();

        fx.service.set_state(AnalysisState::PartialSuccess);
        fx.service.set_output(analysis_output(&[&[
            &["Name of Candidate", "Description (if any)"],
            &["GULSON Kev", "The Conservative Party Candidate"],
        ]]));
        fx.service.set_images(vec![b"png-1".to_vec(), b"png-2".to_vec()]);

        let status = jobs.update_job_status(&fx.job()).await.unwrap();
        assert_eq!(status, OcrJobStatus::Succeeded);

        let images = ocr_repo::list_images(&fx.db, "job-1").unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[1].image_path.ends_with("page_2.png"));
        assert_eq!(std::fs::read(&images[0].image_path).unwrap(), b"png-1");

        match job_table(&fx.db, "d1", &stops()).unwrap() {
            OcrTable::Ready(Some(table)) => {
                assert_eq!(table.rows[1], vec!["GULSON Kev", "The Conservative Party Candidate"])
            }
            other => panic!("Expected a table, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unfetchable_result_fails_job() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All)
            .await
            .unwrap();

        fx.service.set_state(AnalysisState::Succeeded);
        let status = jobs.update_job_status(&fx.job()).await.unwrap();
        assert_eq!(status, OcrJobStatus::Failed);

        let job = fx.job();
        assert_eq!(job.status, "failed");
        assert!(job.error.unwrap().contains("result unavailable"));
    }

    #[tokio::test]
    async fn test_terminal_job_is_not_polled_again() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All)
            .await
            .unwrap();

        fx.service.set_state(AnalysisState::Failed);
        assert_eq!(
            jobs.update_job_status(&fx.job()).await.unwrap(),
            OcrJobStatus::Failed
        );

        fx.service.set_state(AnalysisState::Succeeded);
        fx.service.set_output(analysis_output(&[&[&["a", "b"]]]));
        assert_eq!(
            jobs.update_job_status(&fx.job()).await.unwrap(),
            OcrJobStatus::Failed
        );
        assert!(jobs.sweep().await.unwrap().is_empty());
        assert_eq!(
            job_table(&fx.db, "d1", &stops()).unwrap(),
            OcrTable::Failed(Some("analysis failed".to_string()))
        );
    }

    #[tokio::test]
    async fn test_succeeded_job_is_kept_and_not_submitted_again() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All).await.unwrap();
        fx.service.set_state(AnalysisState::Succeeded);
        fx.service.set_output(analysis_output(&[&[&["Name of candidate", "Description"]]]));
        jobs.sweep().await.unwrap();

        let again = jobs.submit(&fx.document, &PageAssignment::All).await.unwrap();
        assert_eq!(again, Submission::Existing(OcrJobStatus::Succeeded));
        let retried = jobs.retry(&fx.document, &PageAssignment::All).await.unwrap();
        assert_eq!(retried, Submission::Existing(OcrJobStatus::Succeeded));

        let job = fx.job();
        assert_eq!(job.job_id, "job-1");
        assert_eq!(job.status, "succeeded");
        assert!(job.raw_output.is_some());
        assert_eq!(fx.service.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_adds_attempt_after_failure() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All).await.unwrap();
        fx.service.set_state(AnalysisState::Failed);
        jobs.sweep().await.unwrap();

        // A plain submit leaves the failed job in place.
        assert_eq!(
            jobs.submit(&fx.document, &PageAssignment::All).await.unwrap(),
            Submission::Existing(OcrJobStatus::Failed)
        );

        let again = jobs.retry(&fx.document, &PageAssignment::All).await.unwrap();
        assert_eq!(
            again,
            Submission::Started {
                job_id: "job-2".to_string()
            }
        );
        assert_eq!(fx.job().status, "submitted");
        assert_eq!(job_table(&fx.db, "d1", &stops()).unwrap(), OcrTable::Pending);

        let attempts = ocr_repo::list(&fx.db, None).unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].job_id, "job-1");
        assert_eq!(attempts[0].status, "failed");
        assert_eq!(attempts[0].error.as_deref(), Some("analysis failed"));
    }

    #[tokio::test]
    async fn test_image_storage_failure_still_succeeds_job() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All).await.unwrap();
        // A file where the storage directory should be.
        std::fs::write(fx.dir.path().join("storage"), b"").unwrap();

        fx.service.set_state(AnalysisState::Succeeded);
        fx.service.set_output(analysis_output(&[&[&["Name of candidate", "Description"]]]));
        fx.service.set_images(vec![b"png-1".to_vec()]);

        assert_eq!(
            jobs.update_job_status(&fx.job()).await.unwrap(),
            OcrJobStatus::Succeeded
        );
        assert_eq!(fx.job().status, "succeeded");
        assert!(ocr_repo::list_images(&fx.db, "job-1").unwrap().is_empty());
        assert!(jobs.sweep().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_skips_locked_ballots() {
        let fx = Fixture::new();
        let jobs = fx.jobs();
        jobs.submit(&fx.document, &PageAssignment::All).await.unwrap();
        let mut ballot = ballot_repo::find_by_id(&fx.db, "b1").unwrap().unwrap();
        ballot.candidates_locked = true;
        ballot_repo::upsert(&fx.db, &ballot).unwrap();

        fx.service.set_state(AnalysisState::Failed);
        assert!(jobs.sweep().await.unwrap().is_empty());
        assert_eq!(fx.job().status, "submitted");
    }

    #[test]
    fn test_job_table_without_job() {
        let fx = Fixture::new();
        assert_eq!(job_table(&fx.db, "d1", &stops()).unwrap(), OcrTable::NoJob);
    }
}
