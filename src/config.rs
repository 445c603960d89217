//! Compiler configuration
//!
//! Defaults, an optional TOML config file (`splc.toml`), and the merge
//! order: defaults, then config file, then command-line flags.

use clap::ValueEnum;
use serde::Deserialize;
use std::path::PathBuf;

/// Compilation target backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// x86-64 assembly, assembled and linked to an executable
    #[default]
    X64,
    /// Simple Stack Machine textual listing
    Ssm,
}

/// Logging verbosity, mapped onto the tracing filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl Verbosity {
    pub fn filter(&self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warning => "warn",
            Verbosity::Error => "error",
        }
    }
}

/// Resolved configuration the pipeline runs with
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub target: Target,
    /// Output path; the backend appends `.ssm`/`.asm` for intermediates
    pub output: PathBuf,
    pub verbosity: Verbosity,
    /// Keep the intermediate `.asm` and `.o` files after linking
    pub keep_asm: bool,
    pub assembler: String,
    pub linker: String,
    /// C library the linker pulls in for printf, putchar and malloc
    pub libc: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            target: Target::default(),
            output: PathBuf::from("./out"),
            verbosity: Verbosity::default(),
            keep_asm: false,
            assembler: "nasm".to_string(),
            linker: "ld".to_string(),
            libc: "/usr/lib/libSystem.dylib".to_string(),
        }
    }
}

impl CompilerConfig {
    /// Overlay the values present in a config file
    pub fn merge_file(mut self, file: ConfigFile) -> Self {
        if let Some(target) = file.target {
            self.target = target;
        }
        if let Some(output) = file.output {
            self.output = output;
        }
        if let Some(verbosity) = file.verbosity {
            self.verbosity = verbosity;
        }
        if let Some(keep_asm) = file.keep_asm {
            self.keep_asm = keep_asm;
        }
        if let Some(assembler) = file.assembler {
            self.assembler = assembler;
        }
        if let Some(linker) = file.linker {
            self.linker = linker;
        }
        if let Some(libc) = file.libc {
            self.libc = libc;
        }
        self
    }
}

/// What `splc.toml` may contain; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub target: Option<Target>,
    pub output: Option<PathBuf>,
    pub verbosity: Option<Verbosity>,
    pub keep_asm: Option<bool>,
    pub assembler: Option<String>,
    pub linker: Option<String>,
    pub libc: Option<String>,
}

impl ConfigFile {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Invalid config file: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.target, Target::X64);
        assert_eq!(config.output, PathBuf::from("./out"));
        assert_eq!(config.verbosity, Verbosity::Info);
        assert_eq!(config.assembler, "nasm");
    }

    #[test]
    fn test_from_toml() {
        let file = ConfigFile::from_toml(
            "target = \"ssm\"\noutput = \"build/prog\"\nverbosity = \"warning\"\n",
        )
        .unwrap();
        assert_eq!(file.target, Some(Target::Ssm));
        assert_eq!(file.output, Some(PathBuf::from("build/prog")));
        assert_eq!(file.verbosity, Some(Verbosity::Warning));
        assert_eq!(file.keep_asm, None);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(ConfigFile::from_toml("objective = \"world domination\"\n").is_err());
    }

    #[test]
    fn test_merge_overrides_only_present_fields() {
        let file = ConfigFile::from_toml("target = \"ssm\"\n").unwrap();
        let config = CompilerConfig::default().merge_file(file);
        assert_eq!(config.target, Target::Ssm);
        assert_eq!(config.output, PathBuf::from("./out"));
    }

    #[test]
    fn test_verbosity_filters() {
        assert_eq!(Verbosity::Debug.filter(), "debug");
        assert_eq!(Verbosity::Warning.filter(), "warn");
    }
}
