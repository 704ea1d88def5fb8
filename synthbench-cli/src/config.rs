//! Configuration loading from synth.toml
//!
//! Synthbench configuration can be specified in a `synth.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "synth.toml";

/// Synthbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SynthConfig {
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Compiler configuration
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Example generation and sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Timeout for a single foreign call (e.g., "2s", "500ms")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Examples to generate per reference
    #[serde(default = "default_examples")]
    pub examples: usize,
    /// Fixed random seed; fresh entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
    /// Length cap for strings without a declared size
    #[serde(default = "default_max_string_length")]
    pub max_string_length: usize,
    /// Number of parallel compiler jobs
    #[serde(default)]
    pub jobs: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            examples: default_examples(),
            seed: None,
            max_string_length: default_max_string_length(),
            jobs: None,
        }
    }
}

fn default_timeout() -> String {
    "2s".to_string()
}
fn default_examples() -> usize {
    50
}
fn default_max_string_length() -> usize {
    synthbench_core::DEFAULT_MAX_STRING_LENGTH
}

/// C compiler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Compiler driver
    #[serde(default = "default_cc")]
    pub cc: String,
    /// Extra flags passed before the output flag
    #[serde(default = "default_cflags")]
    pub cflags: Vec<String>,
    /// Where compiled libraries are placed
    #[serde(default = "default_build_dir")]
    pub build_dir: String,
    /// Tool reporting section sizes
    #[serde(default = "default_size_tool")]
    pub size: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cc: default_cc(),
            cflags: default_cflags(),
            build_dir: default_build_dir(),
            size: default_size_tool(),
        }
    }
}

fn default_cc() -> String {
    "cc".to_string()
}
fn default_cflags() -> Vec<String> {
    vec!["-O0".to_string()]
}
fn default_build_dir() -> String {
    "target/synthbench".to_string()
}
fn default_size_tool() -> String {
    "size".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "csv"
    #[serde(default = "default_format")]
    pub format: String,
    /// Directory for generated example files; next to each reference when unset
    #[serde(default)]
    pub directory: Option<String>,
    /// List mismatching examples in human output
    #[serde(default)]
    pub show_failures: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            directory: None,
            show_failures: false,
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl SynthConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let dir = std::env::current_dir().ok()?;
        Self::discover_from(&dir)
    }

    /// Walk up from `start` looking for a configuration file
    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Per-invocation timeout, falling back to 2s on a malformed value
    pub fn timeout(&self) -> Duration {
        Self::parse_duration(&self.runner.timeout).unwrap_or(Duration::from_secs(2))
    }

    /// Build directory as a path
    pub fn build_dir(&self) -> PathBuf {
        PathBuf::from(&self.toolchain.build_dir)
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Synthbench Configuration

[runner]
# Timeout for a single call into compiled code
timeout = "2s"
# Examples generated per reference
examples = 50
# Fixed random seed (uncomment for reproducible examples)
# seed = 42
# Length cap for strings without a declared size
max_string_length = 100
# Parallel compiler jobs (uncomment to enable)
# jobs = 4

[toolchain]
# C compiler driver, also used to assemble .s files
cc = "cc"
cflags = ["-O0"]
# Where compiled libraries are placed
build_dir = "target/synthbench"
# Section size tool
size = "size"

[output]
# Default output format: human, json, csv
format = "human"
# Directory for generated example files (uncomment to override)
# directory = "target/synthbench/examples"
# List mismatching examples in human output
show_failures = false
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if value < 0.0 || !value.is_finite() {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let multiplier: u64 = match unit_part.to_lowercase().as_str() {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" | "" => 1_000_000_000,
            "m" | "min" => 60_000_000_000,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(Duration::from_nanos((value * multiplier as f64) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SynthConfig::default();
        assert_eq!(config.runner.examples, 50);
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.toolchain.cc, "cc");
        assert_eq!(config.runner.max_string_length, 100);
    }

    #[test]
    fn test_parse_duration() {
        let ms = Duration::from_millis;
        assert_eq!(SynthConfig::parse_duration("3s").unwrap(), ms(3000));
        assert_eq!(SynthConfig::parse_duration("500ms").unwrap(), ms(500));
        assert_eq!(
            SynthConfig::parse_duration("100us").unwrap(),
            Duration::from_micros(100)
        );
        assert_eq!(
            SynthConfig::parse_duration("1000ns").unwrap(),
            Duration::from_nanos(1000)
        );
        assert_eq!(SynthConfig::parse_duration("2m").unwrap(), ms(120_000));
        assert_eq!(SynthConfig::parse_duration("1.5s").unwrap(), ms(1500));
        assert!(SynthConfig::parse_duration("3 fortnights").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [runner]
            timeout = "250ms"
            seed = 7

            [toolchain]
            cflags = ["-O2", "-g"]
        "#;

        let config: SynthConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(config.runner.seed, Some(7));
        assert_eq!(config.toolchain.cflags, ["-O2", "-g"]);
        // Defaults should still apply
        assert_eq!(config.output.format, "human");
        assert_eq!(config.toolchain.build_dir, "target/synthbench");
    }

    #[test]
    fn test_default_toml_parses() {
        let config: SynthConfig = toml::from_str(&SynthConfig::default_toml()).unwrap();
        assert_eq!(config.runner.timeout, "2s");
        assert_eq!(config.runner.examples, 50);
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[runner]\nexamples = 5\n",
        )
        .unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let config = SynthConfig::discover_from(&nested).unwrap();
        assert_eq!(config.runner.examples, 5);
    }
}
