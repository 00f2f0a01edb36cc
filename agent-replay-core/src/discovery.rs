//! Transcript discovery
//!
//! Finding transcript files is a collaborator concern: the live layer only
//! needs a [`TranscriptSource`] that lists what currently exists. The default
//! [`GlobSource`] walks glob patterns under the Claude Code data directory.
//!
//! Subagent transcripts (`<session>/subagents/agent-*.jsonl`) are not
//! sessions of their own; [`subagent_transcripts`] finds them for the session
//! they belong to.

use crate::config::{home_dir, SourcesConfig};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Environment variable overriding the directory to scan
pub const DATA_DIR_ENV: &str = "AGENT_REPLAY_DATA_DIR";

/// Directory name holding per-subagent transcripts, never tracked on its own
const SUBAGENTS_DIR: &str = "subagents";

/// File name prefix of a subagent transcript
const SUBAGENT_PREFIX: &str = "agent-";

/// A transcript file found by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Lists the transcript files that currently exist.
pub trait TranscriptSource: Send + Sync {
    fn discover(&self) -> Result<Vec<DiscoveredFile>>;
}

/// Glob-based discovery under a root directory.
#[derive(Debug, Clone)]
pub struct GlobSource {
    root: PathBuf,
    patterns: Vec<String>,
}

impl GlobSource {
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            patterns,
        }
    }

    /// Build from configuration.
    ///
    /// `AGENT_REPLAY_DATA_DIR` wins over the config and is scanned
    /// recursively; otherwise the configured (or default `~/.claude`) root is
    /// scanned with the configured patterns.
    pub fn from_config(config: &SourcesConfig) -> Self {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            return Self::new(PathBuf::from(dir), vec!["**/*.jsonl".to_string()]);
        }

        let root = config
            .claude_code_path
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"));
        Self::new(root, config.patterns.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TranscriptSource for GlobSource {
    fn discover(&self) -> Result<Vec<DiscoveredFile>> {
        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "Discovery root missing");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();

        for pattern in &self.patterns {
            let full_pattern = self.root.join(pattern);
            let pattern_str = full_pattern.to_string_lossy();

            let entries = glob::glob(&pattern_str)
                .map_err(|e| Error::Config(format!("invalid glob pattern {:?}: {}", pattern, e)))?;

            for entry in entries.flatten() {
                if is_subagent_path(&entry) || files.iter().any(|f: &DiscoveredFile| f.path == entry) {
                    continue;
                }
                // the file may vanish between glob and stat
                let Ok(metadata) = std::fs::metadata(&entry) else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }
                let modified = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                files.push(DiscoveredFile {
                    path: entry,
                    size: metadata.len(),
                    modified,
                });
            }
        }

        tracing::debug!(root = %self.root.display(), count = files.len(), "Discovered transcripts");
        Ok(files)
    }
}

fn is_subagent_path(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == SUBAGENTS_DIR)
}

/// Subagent transcripts belonging to the session file at `session_path`.
///
/// Looks in `<stem>/subagents/` next to the file, then in
/// `<session_id>/subagents/`; the first directory that exists wins. Paths
/// are sorted.
pub fn subagent_transcripts(session_path: &Path, session_id: Option<&str>) -> Result<Vec<PathBuf>> {
    let Some(parent) = session_path.parent() else {
        return Ok(Vec::new());
    };
    let stem = session_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned());

    for name in stem.into_iter().chain(session_id.map(str::to_string)) {
        let dir = parent.join(&name).join(SUBAGENTS_DIR);
        if !dir.is_dir() {
            continue;
        }

        let pattern = format!(
            "{}/{}*.jsonl",
            glob::Pattern::escape(&dir.to_string_lossy()),
            SUBAGENT_PREFIX
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| Error::Config(format!("invalid glob pattern {:?}: {}", pattern, e)))?;
        let mut files: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
        files.sort();
        return Ok(files);
    }

    Ok(Vec::new())
}

/// Agent id encoded in a subagent transcript name (`agent-<id>.jsonl`)
pub fn subagent_id(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let id = stem.strip_prefix(SUBAGENT_PREFIX).unwrap_or(&*stem);
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "{}\n").unwrap();
    }

    #[test]
    fn test_glob_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("projects/-home-dev-app/s1.jsonl"));
        touch(&root.join("projects/-home-dev-app/s2.jsonl"));
        touch(&root.join("projects/-home-dev-app/notes.txt"));
        touch(&root.join("projects/-home-dev-app/s1/subagents/agent-a1.jsonl"));

        let source = GlobSource::new(root, vec!["projects/*/*.jsonl".to_string()]);
        let mut paths: Vec<_> = source
            .discover()
            .unwrap()
            .into_iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["s1.jsonl", "s2.jsonl"]);
    }

    #[test]
    fn test_recursive_pattern_skips_subagents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a/b/main.jsonl"));
        touch(&root.join("a/subagents/agent-x.jsonl"));

        let source = GlobSource::new(root, vec!["**/*.jsonl".to_string()]);
        let files = source.discover().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("a/b/main.jsonl"));
        assert_eq!(files[0].size, 3);
    }

    #[test]
    fn test_subagent_transcripts_by_stem_or_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("-home-dev-app");
        let session = project.join("s1.jsonl");
        touch(&session);
        touch(&project.join("s1/subagents/agent-b2.jsonl"));
        touch(&project.join("s1/subagents/agent-a1.jsonl"));
        touch(&project.join("s1/subagents/notes.jsonl"));

        let found = subagent_transcripts(&session, None).unwrap();
        let ids: Vec<_> = found.iter().filter_map(|p| subagent_id(p)).collect();
        assert_eq!(ids, vec!["a1", "b2"]);

        let renamed = project.join("renamed.jsonl");
        touch(&renamed);
        assert!(subagent_transcripts(&renamed, None).unwrap().is_empty());
        assert_eq!(subagent_transcripts(&renamed, Some("s1")).unwrap().len(), 2);
    }

    #[test]
    fn test_subagent_id() {
        assert_eq!(
            subagent_id(Path::new("/x/subagents/agent-a4767a09.jsonl")).as_deref(),
            Some("a4767a09")
        );
        assert_eq!(subagent_id(Path::new("/x/agent-.jsonl")), None);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = GlobSource::new(dir.path().join("absent"), vec!["*.jsonl".to_string()]);
        assert!(source.discover().unwrap().is_empty());
    }

    #[test]
    fn test_from_config_uses_override_path() {
        let config = SourcesConfig {
            claude_code_path: Some(PathBuf::from("/data/claude")),
            ..SourcesConfig::default()
        };
        // only meaningful when the env override is absent
        if std::env::var_os(DATA_DIR_ENV).is_none() {
            let source = GlobSource::from_config(&config);
            assert_eq!(source.root(), Path::new("/data/claude"));
        }
    }
}
