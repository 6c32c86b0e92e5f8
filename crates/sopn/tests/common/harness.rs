//! Test harness for isolated pipeline runs.
//!
//! `TestHarness` owns a temporary directory holding the storage directory and
//! the input files, an in-memory database seeded with the party register, and
//! builds pipelines with fake collaborators.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use sopn::config::Config;
use sopn::db::ballot_repo::{self, BallotRow};
use sopn::db::{party_repo, Database};
use sopn::error::ConvertError;
use sopn::ocr::{AnalysisOutput, AnalysisState, AnalysisStatus, DocumentAnalysisService, OcrError};
use sopn::parse::{stored_records, CandidateDraftRecord};
use sopn::party::{MemoryOverrideStore, OverrideStore};
use sopn::processor::{DocumentFormat, PdfConverter};
use sopn::Pipeline;

use super::builders::register;

/// Converter that writes a fixed PDF instead of running a tool.
pub struct StaticConverter {
    pdf: Vec<u8>,
    calls: Mutex<Vec<DocumentFormat>>,
}

impl StaticConverter {
    pub fn new(pdf: Vec<u8>) -> Self {
        Self {
            pdf,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<DocumentFormat> {
        self.calls.lock().unwrap().clone()
    }
}

impl PdfConverter for StaticConverter {
    fn convert(
        &self,
        _input: &Path,
        format: DocumentFormat,
        output: &Path,
    ) -> Result<(), ConvertError> {
        self.calls.lock().unwrap().push(format);
        std::fs::write(output, &self.pdf).map_err(|e| ConvertError::WriteOutput {
            path: output.to_path_buf(),
            source: e,
        })
    }
}

/// Analysis service whose jobs finish when the test says so.
#[derive(Default)]
pub struct ScriptedAnalysisService {
    state: Mutex<Option<AnalysisState>>,
    output: Mutex<Option<AnalysisOutput>>,
    submitted: Mutex<usize>,
}

impl ScriptedAnalysisService {
    /// Finishes every job with `output`.
    pub fn finish(&self, output: AnalysisOutput) {
        *self.output.lock().unwrap() = Some(output);
        *self.state.lock().unwrap() = Some(AnalysisState::Succeeded);
    }

    /// Fails every job.
    pub fn fail(&self) {
        *self.state.lock().unwrap() = Some(AnalysisState::Failed);
    }

    pub fn submitted(&self) -> usize {
        *self.submitted.lock().unwrap()
    }
}

#[async_trait]
impl DocumentAnalysisService for ScriptedAnalysisService {
    async fn start_analysis(
        &self,
        _pdf: Vec<u8>,
        _pages: Option<&[u32]>,
    ) -> sopn::ocr::Result<String> {
        let mut submitted = self.submitted.lock().unwrap();
        *submitted += 1;
        Ok(format!("job-{}", submitted))
    }

    async fn analysis_status(&self, _job_id: &str) -> sopn::ocr::Result<AnalysisStatus> {
        let status = (*self.state.lock().unwrap()).unwrap_or(AnalysisState::InProgress);
        Ok(AnalysisStatus {
            status,
            status_message: Some("scripted".to_string()),
        })
    }

    async fn analysis_result(&self, _job_id: &str) -> sopn::ocr::Result<AnalysisOutput> {
        self.output
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| OcrError::InvalidResponse("no output".to_string()))
    }

    async fn page_images(&self, _job_id: &str) -> sopn::ocr::Result<Option<Vec<Vec<u8>>>> {
        Ok(None)
    }
}

/// Test harness providing an isolated environment for pipeline tests.
pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub config: Config,
    pub input_dir: PathBuf,
    pub overrides: Arc<MemoryOverrideStore>,
}

impl TestHarness {
    /// Creates a harness with the party register loaded.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        let db = Database::open_in_memory().expect("Failed to open database");
        for party in register() {
            party_repo::upsert_party(&db, &party).expect("Failed to seed party");
        }
        party_repo::insert_description(&db, "PP53", "Labour and Co-operative Party")
            .expect("Failed to seed description");

        let config = Config {
            storage_directory: Some(temp_dir.path().join("storage").display().to_string()),
            ..Default::default()
        };

        Self {
            temp_dir,
            db,
            config,
            input_dir,
            overrides: Arc::new(MemoryOverrideStore::new()),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.temp_dir.path().join("storage")
    }

    pub fn add_ballot(&self, ballot: BallotRow) {
        ballot_repo::upsert(&self.db, &ballot).expect("Failed to add ballot");
    }

    /// Writes an input file and returns its path.
    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    /// A pipeline without OCR whose converter must not be called.
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(Arc::new(StaticConverter::new(Vec::new())), None)
    }

    pub fn pipeline_with(
        &self,
        converter: Arc<dyn PdfConverter>,
        analysis: Option<Arc<dyn DocumentAnalysisService>>,
    ) -> Pipeline {
        let overrides: Arc<dyn OverrideStore> = self.overrides.clone();
        Pipeline::new(&self.config, self.db.clone(), converter, analysis, overrides, None)
            .expect("Failed to build pipeline")
    }

    /// The stored draft records of a ballot.
    pub fn records(&self, ballot_paper_id: &str) -> Vec<CandidateDraftRecord> {
        stored_records(&self.db, ballot_paper_id)
            .expect("Failed to read draft")
            .map(|(_, records)| records)
            .unwrap_or_default()
    }

    pub fn names(&self, ballot_paper_id: &str) -> Vec<String> {
        self.records(ballot_paper_id)
            .into_iter()
            .map(|r| r.name)
            .collect()
    }
}
