use crate::bad_chars::BadCharSet;
use crate::executor::TransformerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TransformerSettings {
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    #[serde(default = "default_output_flag")]
    pub output_flag: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub working_dir: Option<PathBuf>,
}

fn default_command() -> Vec<String> {
    vec!["./bin/byvalver".to_string()]
}

fn default_output_flag() -> String {
    "-o".to_string()
}

pub fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for TransformerSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            output_flag: default_output_flag(),
            timeout_ms: default_timeout_ms(),
            working_dir: None,
        }
    }
}

impl TransformerSettings {
    pub fn to_executor_config(&self) -> TransformerConfig {
        TransformerConfig {
            command: self.command.clone(),
            output_flag: self.output_flag.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            working_dir: self.working_dir.clone(),
        }
    }
}

/// One operating mode of the transformer: a label plus the flags that select it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ModeConfig {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

pub fn default_modes() -> Vec<ModeConfig> {
    vec![
        ModeConfig::new("biphasic", &["--biphasic"]),
        ModeConfig::new("non-biphasic", &[]),
    ]
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CorpusSettings {
    #[serde(default = "default_corpus_dir")]
    pub directory: PathBuf,
    #[serde(default = "crate::batch::default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub recursive: bool,
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./corpus")
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            directory: default_corpus_dir(),
            pattern: crate::batch::default_pattern(),
            recursive: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ReportSettings {
    #[serde(default = "default_report_dir")]
    pub directory: PathBuf,
}

pub fn default_report_dir() -> PathBuf {
    PathBuf::from("./test_results")
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            directory: default_report_dir(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub transformer: TransformerSettings,
    #[serde(default = "default_modes")]
    pub modes: Vec<ModeConfig>,
    #[serde(default)]
    pub corpus: CorpusSettings,
    #[serde(default)]
    pub report: ReportSettings,
    #[serde(default = "default_bad_chars")]
    pub bad_chars: String,
}

fn default_bad_chars() -> String {
    "00".to_string()
}

impl HarnessConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: HarnessConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        if config.modes.is_empty() {
            return Err(anyhow::anyhow!(
                "Config file {:?} defines no [[modes]]; at least one is required",
                path
            ));
        }
        Ok(config)
    }

    pub fn bad_char_set(&self) -> BadCharSet {
        BadCharSet::parse(&self.bad_chars)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            transformer: TransformerSettings::default(),
            modes: default_modes(),
            corpus: CorpusSettings::default(),
            report: ReportSettings::default(),
            bad_chars: default_bad_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_yields_builtin_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badchar.toml");
        std::fs::write(&path, "").unwrap();

        let config = HarnessConfig::load_from_file(&path).unwrap();
        assert_eq!(config.transformer.command, vec!["./bin/byvalver"]);
        assert_eq!(config.transformer.timeout_ms, 120_000);
        assert_eq!(config.modes, default_modes());
        assert_eq!(config.corpus.pattern, "*.bin");
        assert_eq!(config.report.directory, default_report_dir());
        assert_eq!(config.bad_char_set(), BadCharSet::default());
    }

    #[test]
    fn full_file_overrides_every_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badchar.toml");
        std::fs::write(
            &path,
            r#"
bad-chars = "00,0a"

[transformer]
command = ["/opt/byvalver/bin/byvalver", "--quiet"]
output-flag = "--output"
timeout-ms = 500

[[modes]]
name = "ml"
args = ["--ml"]

[corpus]
directory = "/data/shellcode"
pattern = "*.raw"
recursive = true

[report]
directory = "/tmp/reports"
"#,
        )
        .unwrap();

        let config = HarnessConfig::load_from_file(&path).unwrap();
        let exec = config.transformer.to_executor_config();
        assert_eq!(exec.command, vec!["/opt/byvalver/bin/byvalver", "--quiet"]);
        assert_eq!(exec.output_flag, "--output");
        assert_eq!(exec.timeout, Duration::from_millis(500));
        assert_eq!(config.modes, vec![ModeConfig::new("ml", &["--ml"])]);
        assert!(config.corpus.recursive);
        assert_eq!(config.corpus.pattern, "*.raw");
        assert_eq!(config.bad_char_set(), BadCharSet::from_bytes(&[0x00, 0x0a]));
    }

    #[test]
    fn unknown_keys_and_empty_modes_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("badchar.toml");

        std::fs::write(&path, "[transformer]\nbinary = \"x\"\n").unwrap();
        assert!(HarnessConfig::load_from_file(&path).is_err());

        std::fs::write(&path, "modes = []\n").unwrap();
        let err = HarnessConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("no [[modes]]"));
    }
}
