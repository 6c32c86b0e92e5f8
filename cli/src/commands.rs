//! Subcommand bodies. Each opens what it needs from the config and prints to
//! stdout; logs go to stderr.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use sopn::db::ballot_repo::{self, BallotRow};
use sopn::db::party_repo::{self, PartyRow};
use sopn::db::{ocr_repo, review_repo};
use sopn::ocr::Submission;
use sopn::party::{
    DbOverrideStore, ManualResolver, PartyIndex, PartyMatcher, ReviewQueueResolver,
    TerminalResolver,
};
use sopn::{parse, BallotFilter, Config, Database, Pipeline, SweepReport, TableFlavor};

/// A party as listed in an import file, with its ballot descriptions.
#[derive(Debug, Deserialize)]
struct ImportedParty {
    #[serde(flatten)]
    party: PartyRow,
    #[serde(default)]
    descriptions: Vec<String>,
}

/// Unattended runs queue unmatched labels for review.
fn pipeline(config: &Config, db: Database) -> Result<Pipeline> {
    let resolver: Arc<dyn ManualResolver> = Arc::new(ReviewQueueResolver::new(db.clone()));
    Pipeline::from_config(config, db, Some(resolver)).context("Failed to set up the pipeline")
}

fn print_report(report: &SweepReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

pub fn upload(
    config: &Config,
    db: Database,
    ballot_paper_id: &str,
    file: &Path,
    source_url: &str,
) -> Result<()> {
    let pipeline = pipeline(config, db)?;
    let assignment = pipeline
        .upload(ballot_paper_id, file, source_url)
        .with_context(|| format!("Upload for '{}' failed", ballot_paper_id))?;
    println!("{}: pages {}", ballot_paper_id, assignment);
    Ok(())
}

pub async fn sweep(
    config: &Config,
    db: Database,
    filter: &BallotFilter,
    reparse: bool,
    flavor: Option<TableFlavor>,
    json: bool,
) -> Result<()> {
    let report = pipeline(config, db)?.sweep(filter, reparse, flavor).await?;
    print_report(&report, json)
}

pub async fn ocr_sweep(config: &Config, db: Database, json: bool) -> Result<()> {
    let report = pipeline(config, db)?.sweep_ocr_jobs().await?;
    print_report(&report, json)
}

pub async fn ocr_retry(config: &Config, db: Database, ballot_paper_id: &str) -> Result<()> {
    let submission = pipeline(config, db)?
        .retry_ocr(ballot_paper_id)
        .await
        .with_context(|| format!("OCR retry for '{}' failed", ballot_paper_id))?;
    match submission {
        Submission::Started { job_id } => {
            info!(job_id = %job_id, "Submitted new OCR job");
            println!("{}: submitted job {}", ballot_paper_id, job_id);
        }
        Submission::Existing(status) => {
            println!("{}: job already {}, nothing to retry", ballot_paper_id, status);
        }
    }
    Ok(())
}

pub fn ocr_jobs(db: &Database, status: Option<&str>) -> Result<()> {
    let jobs = ocr_repo::list(db, status)?;
    if jobs.is_empty() {
        println!("No OCR jobs");
    }
    for job in jobs {
        print!(
            "{}  {:<9}  job {}  submitted {}",
            job.document_id, job.status, job.job_id, job.submitted_at
        );
        match job.error {
            Some(error) => println!("  error: {}", error),
            None => println!(),
        }
    }
    Ok(())
}

pub fn match_party(
    config: &Config,
    db: Database,
    text: &str,
    register: Option<&str>,
    interactive: bool,
) -> Result<()> {
    let index = PartyIndex::load(&db)?;
    if index.is_empty() {
        bail!("The party register is empty; run import-parties first");
    }
    let resolver: Option<Arc<dyn ManualResolver>> = if interactive {
        Some(Arc::new(TerminalResolver::stdio()))
    } else {
        None
    };
    let matcher = PartyMatcher::new(
        index,
        Arc::new(DbOverrideStore::new(db)),
        resolver,
        config.matching.fuzzy_max_distance,
    );

    let found = matcher.match_party(text, register)?;
    let name = matcher
        .index()
        .party(&found.party_id)
        .map(|p| p.name.as_str())
        .unwrap_or("?");
    match found.description_id {
        Some(id) => println!("{} ({}), description {}", found.party_id, name, id),
        None => println!("{} ({})", found.party_id, name),
    }
    Ok(())
}

pub fn import_ballots(db: &Database, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read '{}'", file.display()))?;
    let ballots: Vec<BallotRow> =
        serde_json::from_str(&content).context("Expected a JSON array of ballots")?;
    for ballot in &ballots {
        ballot_repo::upsert(db, ballot)?;
    }
    info!(ballots = ballots.len(), "Imported ballots");
    println!("Imported {} ballots", ballots.len());
    Ok(())
}

pub fn import_parties(db: &Database, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read '{}'", file.display()))?;
    let parties: Vec<ImportedParty> =
        serde_json::from_str(&content).context("Expected a JSON array of parties")?;

    let mut descriptions = 0;
    for imported in &parties {
        party_repo::upsert_party(db, &imported.party)?;
        for description in &imported.descriptions {
            party_repo::insert_description(db, &imported.party.party_id, description)?;
            descriptions += 1;
        }
    }
    info!(parties = parties.len(), descriptions, "Imported parties");
    println!(
        "Imported {} parties with {} descriptions",
        parties.len(),
        descriptions
    );
    Ok(())
}

pub fn drafts(db: &Database, ballot_paper_id: &str) -> Result<()> {
    let Some((draft, records)) = parse::stored_records(db, ballot_paper_id)? else {
        bail!("Ballot '{}' has no draft records", ballot_paper_id);
    };
    let output = serde_json::json!({
        "ballot_paper_id": draft.ballot_paper_id,
        "source_type": draft.source_type,
        "source": draft.source,
        "backend": draft.backend,
        "updated_at": draft.updated_at,
        "records": records,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn reviews(db: &Database) -> Result<()> {
    let requests = review_repo::list(db)?;
    if requests.is_empty() {
        println!("Nothing waiting for review");
    }
    for request in requests {
        println!("{}  (queued {})", request.raw_text, request.created_at);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_parties_with_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("parties.json");
        std::fs::write(
            &file,
            r#"[
                {"party_id": "PP53", "name": "Labour Party",
                 "descriptions": ["Labour and Co-operative Party"]},
                {"party_id": "PP680", "name": "Green Party", "register": "NI"}
            ]"#,
        )
        .unwrap();

        let db = Database::open_in_memory().unwrap();
        import_parties(&db, &file).unwrap();

        let parties = party_repo::list_parties(&db).unwrap();
        assert_eq!(parties.len(), 2);
        assert_eq!(parties[1].register, "NI");
        let descriptions = party_repo::list_descriptions(&db).unwrap();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].party_id, "PP53");
    }
}
