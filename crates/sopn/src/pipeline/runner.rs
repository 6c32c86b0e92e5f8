use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, TableFlavor};
use crate::db::ballot_repo::{self, BallotQuery};
use crate::db::document_repo::{self, DocumentRow};
use crate::db::draft_repo::{self, PARSED_PDF};
use crate::db::{now, ocr_repo, table_repo, Database};
use crate::error::{ConfigError, Result, SopnError};
use crate::ocr::{
    DocumentAnalysisService, HttpAnalysisService, OcrJobStatus, OcrJobs, Submission,
};
use crate::pages::{PageAssignment, PageMapper};
use crate::parse::{DraftParser, ParsedDraft};
use crate::party::{DbOverrideStore, ManualResolver, OverrideStore, PartyIndex, PartyMatcher};
use crate::processor::{CommandConverter, DocumentFormat, PdfConverter};
use crate::sanitize;
use crate::table::{TableExtractor, TableOutcome};

use super::error::PipelineError;
use super::report::{BallotOutcome, SweepReport};

/// Which ballots a sweep visits. Locked ballots are always left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BallotFilter {
    /// Ballots of current elections.
    Current,
    Election(String),
    Ballot(String),
    All,
}

impl BallotFilter {
    fn query(&self) -> BallotQuery {
        let mut query = BallotQuery {
            exclude_locked: true,
            ..Default::default()
        };
        match self {
            BallotFilter::Current => query.current_only = true,
            BallotFilter::Election(slug) => query.election_slug = Some(slug.clone()),
            BallotFilter::Ballot(id) => query.ballot_paper_id = Some(id.clone()),
            BallotFilter::All => {}
        }
        query
    }
}

impl fmt::Display for BallotFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BallotFilter::Current => write!(f, "current"),
            BallotFilter::Election(slug) => write!(f, "election:{}", slug),
            BallotFilter::Ballot(id) => write!(f, "ballot:{}", id),
            BallotFilter::All => write!(f, "all"),
        }
    }
}

pub struct Pipeline {
    db: Database,
    storage_dir: PathBuf,
    mapper: PageMapper,
    extractor: TableExtractor,
    ocr: Option<OcrJobs>,
    parser: DraftParser,
}

impl Pipeline {
    /// Production constructor: builds every collaborator from config.
    ///
    /// OCR is only wired in when enabled; overrides persist in the database.
    pub fn from_config(
        config: &Config,
        db: Database,
        resolver: Option<Arc<dyn ManualResolver>>,
    ) -> Result<Self> {
        let converter: Arc<dyn PdfConverter> = Arc::new(CommandConverter::new(
            config.conversion.command.clone(),
            config.conversion.args.clone(),
        ));
        let analysis: Option<Arc<dyn DocumentAnalysisService>> = if config.ocr.enabled {
            Some(Arc::new(HttpAnalysisService::from_config(&config.ocr)?))
        } else {
            None
        };
        let overrides: Arc<dyn OverrideStore> = Arc::new(DbOverrideStore::new(db.clone()));

        Self::new(config, db, converter, analysis, overrides, resolver)
    }

    /// Constructor with injected collaborators.
    pub fn new(
        config: &Config,
        db: Database,
        converter: Arc<dyn PdfConverter>,
        analysis: Option<Arc<dyn DocumentAnalysisService>>,
        overrides: Arc<dyn OverrideStore>,
        resolver: Option<Arc<dyn ManualResolver>>,
    ) -> Result<Self> {
        let storage_dir = config
            .storage_path()
            .ok_or_else(|| ConfigError::Validation {
                message: "storage_directory is not set and there is no home directory"
                    .to_string(),
            })?;

        let index = PartyIndex::load(&db)?;
        if index.is_empty() {
            warn!("Party register is empty, every party will be unmatched");
        }
        let matcher = PartyMatcher::new(
            index,
            overrides,
            resolver,
            config.matching.fuzzy_max_distance,
        );

        Ok(Self {
            mapper: PageMapper::new(db.clone(), converter),
            extractor: TableExtractor::new(db.clone(), config.tables.clone()),
            ocr: analysis.map(|service| OcrJobs::new(db.clone(), service, storage_dir.clone())),
            parser: DraftParser::new(db.clone(), matcher, &config.matching, &config.tables),
            storage_dir,
            db,
        })
    }

    /// Attaches `file` to a ballot and maps its pages.
    ///
    /// The file is copied into storage. When another ballot's document from
    /// the same URL was assigned every page, the whole document is scanned
    /// again so both ballots get their own pages.
    pub fn upload(
        &self,
        ballot_paper_id: &str,
        file: &Path,
        source_url: &str,
    ) -> Result<PageAssignment> {
        let _span = info_span!("upload",
            ballot_paper_id = %ballot_paper_id,
            filename = %sanitize::redact_path(file),
        )
        .entered();

        ballot_repo::find_by_id(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::BallotNotFound(ballot_paper_id.to_string()))?;
        let format = DocumentFormat::detect(file)?;

        let id = Uuid::new_v4().to_string();
        let dir = self.storage_dir.join("documents");
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::Storage {
            path: dir.clone(),
            source: e,
        })?;
        let stored = dir.join(format!("{}.{}", id, format.extension()));
        std::fs::copy(file, &stored).map_err(|e| PipelineError::Storage {
            path: stored.clone(),
            source: e,
        })?;

        let force_full_scan = document_repo::find_by_source_url(&self.db, source_url)?
            .iter()
            .any(|d| d.ballot_paper_id != ballot_paper_id && d.relevant_pages.as_deref() == Some("all"));

        document_repo::attach(
            &self.db,
            &DocumentRow {
                id,
                ballot_paper_id: ballot_paper_id.to_string(),
                source_url: source_url.to_string(),
                file_path: stored.display().to_string(),
                file_kind: format.as_str().to_string(),
                relevant_pages: None,
                created_at: now(),
            },
        )?;
        info!(
            source_url = %sanitize::redact_url(source_url),
            format = format.as_str(),
            force_full_scan,
            "Attached source document"
        );

        self.mapper.map_pages(ballot_paper_id, force_full_scan)
    }

    /// Runs every missing stage for the ballots matching `filter`.
    ///
    /// With `reparse` every stage runs again. A ballot that fails is
    /// recorded in the report and the sweep moves on.
    pub async fn sweep(
        &self,
        filter: &BallotFilter,
        reparse: bool,
        flavor: Option<TableFlavor>,
    ) -> Result<SweepReport> {
        let span = info_span!("sweep", filter = %filter, reparse);
        self.run_sweep(filter, reparse, flavor).instrument(span).await
    }

    async fn run_sweep(
        &self,
        filter: &BallotFilter,
        reparse: bool,
        flavor: Option<TableFlavor>,
    ) -> Result<SweepReport> {
        let ballots = ballot_repo::query(&self.db, &filter.query())?;
        info!(ballots = ballots.len(), "Sweeping ballots");

        let mut report = SweepReport::default();
        for ballot in ballots {
            let id = ballot.ballot_paper_id;
            let span = info_span!("ballot", ballot_paper_id = %id);
            let outcome = match self.process_ballot(&id, reparse, flavor).instrument(span).await {
                Ok(outcome) => outcome,
                Err(e) => failure(&id, e),
            };
            report.record(id, outcome);
        }

        report.log_summary();
        Ok(report)
    }

    async fn process_ballot(
        &self,
        ballot_paper_id: &str,
        reparse: bool,
        flavor: Option<TableFlavor>,
    ) -> Result<BallotOutcome> {
        let Some(document) = document_repo::find_for_ballot(&self.db, ballot_paper_id)? else {
            return Ok(BallotOutcome::skipped("no source document"));
        };

        let (document, assignment) = self.pages(document, reparse)?;

        if let Some(draft) = draft_repo::find(&self.db, ballot_paper_id)? {
            if draft.source_type != PARSED_PDF {
                return Ok(BallotOutcome::skipped("draft entered from another source"));
            }
            if !reparse && draft.document_id.as_deref() == Some(document.id.as_str()) {
                return Ok(BallotOutcome::skipped("already parsed"));
            }
        }

        // Table
        let has_table = table_repo::find(&self.db, &document.id)?.is_some();
        let has_job = ocr_repo::find(&self.db, &document.id)?.is_some();
        if reparse || (!has_table && !has_job) {
            let outcome = self.extractor.extract_table(ballot_paper_id, flavor)?;
            info!(outcome = outcome.label(), "Extracted table");
            let fallback = match outcome {
                TableOutcome::Extracted(_) => None,
                TableOutcome::NoTables => {
                    self.fall_back_to_ocr(&document, &assignment, "no table in text layer")
                        .await?
                }
                TableOutcome::NeedsOcr(reason) => {
                    self.fall_back_to_ocr(&document, &assignment, &reason.to_string())
                        .await?
                }
                TableOutcome::Failed(e) => return Err(e.into()),
            };
            if let Some(outcome) = fallback {
                return Ok(outcome);
            }
        }

        // Records
        let parsed = self.parser.parse(ballot_paper_id)?;
        Ok(parsed_outcome(&parsed))
    }

    /// The page stage: the stored assignment, or a fresh mapping when there
    /// is none or `reparse` is set. Returns the document as it stands after
    /// mapping, which may have converted the file.
    fn pages(&self, document: DocumentRow, reparse: bool) -> Result<(DocumentRow, PageAssignment)> {
        if let (Some(value), false) = (&document.relevant_pages, reparse) {
            let assignment = value
                .parse::<PageAssignment>()
                .map_err(|reason| PipelineError::InvalidPageAssignment {
                    value: value.clone(),
                    reason,
                })?;
            return Ok((document, assignment));
        }

        let ballot_paper_id = document.ballot_paper_id;
        let assignment = self.mapper.map_pages(&ballot_paper_id, false)?;
        let document = document_repo::find_for_ballot(&self.db, &ballot_paper_id)?
            .ok_or(PipelineError::NoDocument(ballot_paper_id))?;
        Ok((document, assignment))
    }

    /// Hands the document to the image backend. Returns an outcome when the
    /// ballot can't be parsed yet. A finished job is reused, never resent.
    async fn fall_back_to_ocr(
        &self,
        document: &DocumentRow,
        assignment: &PageAssignment,
        reason: &str,
    ) -> Result<Option<BallotOutcome>> {
        let Some(ocr) = &self.ocr else {
            warn!("No usable table ({}) and OCR is not configured", reason);
            return Ok(Some(BallotOutcome::skipped(format!(
                "{}; OCR is not configured",
                reason
            ))));
        };

        info!("Falling back to OCR: {}", reason);
        match ocr.submit(document, assignment).await? {
            Submission::Started { job_id } => Ok(Some(BallotOutcome::waiting(format!(
                "OCR job {} submitted",
                job_id
            )))),
            Submission::Existing(OcrJobStatus::Submitted) => {
                Ok(Some(BallotOutcome::waiting("OCR job still running")))
            }
            Submission::Existing(_) => Ok(None),
        }
    }

    /// Sends a ballot's document to OCR again after its last job failed. The
    /// failed job stays on record; the next OCR sweep picks up the new one.
    pub async fn retry_ocr(&self, ballot_paper_id: &str) -> Result<Submission> {
        let span = info_span!("ocr_retry", ballot_paper_id = %ballot_paper_id);
        self.run_ocr_retry(ballot_paper_id).instrument(span).await
    }

    async fn run_ocr_retry(&self, ballot_paper_id: &str) -> Result<Submission> {
        let ocr = self.ocr.as_ref().ok_or(PipelineError::OcrNotConfigured)?;
        let document = document_repo::find_for_ballot(&self.db, ballot_paper_id)?
            .ok_or_else(|| PipelineError::NoDocument(ballot_paper_id.to_string()))?;
        let (document, assignment) = self.pages(document, false)?;
        ocr.retry(&document, &assignment).await
    }

    /// Advances every OCR job still running, then parses the ballots whose
    /// job has succeeded and that have no draft for the document yet. Only
    /// unlocked ballots of current elections are visited.
    pub async fn sweep_ocr_jobs(&self) -> Result<SweepReport> {
        let span = info_span!("ocr_sweep");
        self.run_ocr_sweep().instrument(span).await
    }

    async fn run_ocr_sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let Some(ocr) = &self.ocr else {
            info!("OCR is not configured, nothing to sweep");
            return Ok(report);
        };

        for (document_id, status) in ocr.sweep().await? {
            let Some(document) = document_repo::find_by_id(&self.db, &document_id)? else {
                continue;
            };
            match status {
                OcrJobStatus::Submitted => report.record(
                    document.ballot_paper_id,
                    BallotOutcome::waiting("OCR job still running"),
                ),
                OcrJobStatus::Failed => {
                    let error = ocr_repo::find(&self.db, &document_id)?
                        .and_then(|job| job.error)
                        .unwrap_or_else(|| "OCR job failed".to_string());
                    report.record(document.ballot_paper_id, BallotOutcome::Failed { error });
                }
                OcrJobStatus::Succeeded => {}
            }
        }

        for job in ocr_repo::list_for_open_ballots(&self.db, OcrJobStatus::Succeeded.as_str())? {
            let Some(document) = document_repo::find_by_id(&self.db, &job.document_id)? else {
                continue;
            };
            let ballot_paper_id = document.ballot_paper_id;
            if let Some(draft) = draft_repo::find(&self.db, &ballot_paper_id)? {
                if draft.source_type != PARSED_PDF
                    || draft.document_id.as_deref() == Some(document.id.as_str())
                {
                    continue;
                }
            }
            let span = info_span!("ballot", ballot_paper_id = %ballot_paper_id);
            let outcome = match span.in_scope(|| self.parser.parse(&ballot_paper_id)) {
                Ok(parsed) => parsed_outcome(&parsed),
                Err(e) => failure(&ballot_paper_id, e),
            };
            report.record(ballot_paper_id, outcome);
        }

        report.log_summary();
        Ok(report)
    }
}

fn parsed_outcome(parsed: &ParsedDraft) -> BallotOutcome {
    if parsed.stored {
        BallotOutcome::Completed {
            records: parsed.records.len(),
        }
    } else {
        BallotOutcome::skipped("draft entered from another source")
    }
}

/// Logs a ballot's error and turns it into an outcome.
fn failure(ballot_paper_id: &str, e: SopnError) -> BallotOutcome {
    match e {
        SopnError::Parse(ref parse) if parse.is_waiting() => BallotOutcome::waiting(parse.to_string()),
        e => {
            error!(ballot_paper_id = %ballot_paper_id, "Ballot failed: {}", e);
            BallotOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}
