use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub storage_directory: Option<String>,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            storage_directory: None,
            conversion: ConversionConfig::default(),
            tables: TablesConfig::default(),
            ocr: OcrConfig::default(),
            matching: MatchingConfig::default(),
        }
    }
}

impl Config {
    /// The configured database file, or `~/.sopn/data/sopn.db`.
    pub fn database_file(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(expand_home(path)),
            None => crate::db::default_database_path(),
        }
    }

    /// The configured storage directory, or `~/.sopn/storage`.
    pub fn storage_path(&self) -> Option<PathBuf> {
        match &self.storage_directory {
            Some(path) => Some(expand_home(path)),
            None => dirs::home_dir().map(|h| h.join(".sopn").join("storage")),
        }
    }
}

/// Expands a leading `~/` to the home directory.
pub(crate) fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "default_conversion_command")]
    pub command: String,
    /// Argument template; `{input}`, `{output}` and `{format}` are substituted.
    #[serde(default = "default_conversion_args")]
    pub args: Vec<String>,
}

fn default_conversion_command() -> String {
    "pandoc".to_string()
}

fn default_conversion_args() -> Vec<String> {
    ["{input}", "--from", "{format}", "-o", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            command: default_conversion_command(),
            args: default_conversion_args(),
        }
    }
}

/// How tables are recovered from a page's text layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFlavor {
    /// Cells bounded by ruling lines.
    #[default]
    Lattice,
    /// Cells inferred from text alignment.
    Stream,
}

impl TableFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableFlavor::Lattice => "lattice",
            TableFlavor::Stream => "stream",
        }
    }
}

impl std::fmt::Display for TableFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TableFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lattice" => Ok(TableFlavor::Lattice),
            "stream" => Ok(TableFlavor::Stream),
            other => Err(format!("unknown table flavor '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default)]
    pub flavor: TableFlavor,
    /// A table whose first row contains one of these phrases ends stitching.
    #[serde(default = "default_stop_phrases")]
    pub stop_phrases: Vec<String>,
}

fn default_stop_phrases() -> Vec<String> {
    vec!["polling station".to_string()]
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            flavor: TableFlavor::default(),
            stop_phrases: default_stop_phrases(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "SOPN_OCR_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key_env: default_api_key_env(),
            api_key_file: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Party id recorded for independent candidates.
    #[serde(default = "default_independent_party_id")]
    pub independent_party_id: String,
    #[serde(default = "default_fuzzy_max_distance")]
    pub fuzzy_max_distance: usize,
}

fn default_independent_party_id() -> String {
    "ynmp-party:2".to_string()
}

fn default_fuzzy_max_distance() -> usize {
    3
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            independent_party_id: default_independent_party_id(),
            fuzzy_max_distance: default_fuzzy_max_distance(),
        }
    }
}
