//! Human-in-the-loop fallback for party strings nothing else matched.

use std::io::{BufRead, BufReader, Stderr, Stdin, Write};
use std::sync::Mutex;

use tracing::info;

use super::error::{MatchError, Result};
use super::registry::{PartyOption, PartyReference};
use crate::db::{review_repo, Database};
use crate::text::canonicalize;

/// Asks someone to pick a party for `raw_text`.
///
/// Returns `None` when no answer is available now.
pub trait ManualResolver: Send + Sync {
    fn resolve(&self, raw_text: &str, options: &[PartyOption]) -> Result<Option<PartyReference>>;
}

/// Prompts on a terminal. The answer is an option number, a party id, or an
/// empty line to skip.
pub struct TerminalResolver<R, W> {
    io: Mutex<(R, W)>,
}

impl TerminalResolver<BufReader<Stdin>, Stderr> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R, W> TerminalResolver<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }
}

fn io_error(e: std::io::Error) -> MatchError {
    MatchError::Resolver(e.to_string())
}

impl<R, W> ManualResolver for TerminalResolver<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn resolve(&self, raw_text: &str, options: &[PartyOption]) -> Result<Option<PartyReference>> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| MatchError::Resolver("terminal lock poisoned".to_string()))?;
        let (reader, writer) = &mut *guard;

        writeln!(writer, "No party found for '{}'. Closest matches:", raw_text).map_err(io_error)?;
        for (i, option) in options.iter().enumerate() {
            writeln!(writer, "  {}) {} [{}]", i + 1, option.name, option.party_id)
                .map_err(io_error)?;
        }
        write!(writer, "Number or party id (empty to skip): ").map_err(io_error)?;
        writer.flush().map_err(io_error)?;

        let mut line = String::new();
        reader.read_line(&mut line).map_err(io_error)?;
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(None);
        }

        if let Ok(n) = answer.parse::<usize>() {
            return match options.get(n.wrapping_sub(1)) {
                Some(option) => Ok(Some(PartyReference::party(option.party_id.clone()))),
                None => Err(MatchError::Resolver(format!("no option {}", n))),
            };
        }
        Ok(Some(PartyReference::party(answer)))
    }
}

/// Records a review request and resolves nothing. For unattended runs.
pub struct ReviewQueueResolver {
    db: Database,
}

impl ReviewQueueResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ManualResolver for ReviewQueueResolver {
    fn resolve(&self, raw_text: &str, options: &[PartyOption]) -> Result<Option<PartyReference>> {
        let options_json = serde_json::to_string(options)
            .map_err(|e| MatchError::Resolver(format!("failed to encode options: {}", e)))?;
        let key = canonicalize(raw_text);
        if review_repo::enqueue(&self.db, raw_text, &key, &options_json)? {
            info!(raw_text = %raw_text, "Queued party for review");
        }
        Ok(None)
    }
}
