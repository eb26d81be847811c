/// On-disk layout of persisted candidates
///
/// `<output_dir>/<sanitized model>/<challenge slug>/handler_attempt<N>.py`,
/// plus one `handler.py` per (model, challenge) holding the best attempt.
use crate::challenge::Challenge;
use crate::config::types::{Result, ScoreboxError};
use std::fs;
use std::path::{Path, PathBuf};

pub const FINAL_HANDLER: &str = "handler.py";

#[derive(Debug, Clone)]
pub struct CandidateWorkspace {
    root: PathBuf,
}

impl CandidateWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn challenge_dir(&self, model: &str, challenge: Challenge) -> PathBuf {
        self.root.join(sanitize_model(model)).join(challenge.slug())
    }

    pub fn attempt_path(&self, model: &str, challenge: Challenge, attempt: u32) -> PathBuf {
        self.challenge_dir(model, challenge)
            .join(format!("handler_attempt{attempt}.py"))
    }

    pub fn final_path(&self, model: &str, challenge: Challenge) -> PathBuf {
        self.challenge_dir(model, challenge).join(FINAL_HANDLER)
    }

    /// Write an attempt's source, replacing any earlier file for the same attempt
    pub fn persist(
        &self,
        model: &str,
        challenge: Challenge,
        attempt: u32,
        source: &str,
    ) -> Result<PathBuf> {
        let path = self.attempt_path(model, challenge, attempt);
        write_creating_parent(&path, source.as_bytes())?;
        Ok(path)
    }

    /// Copy the best attempt over the final handler
    pub fn finalize(&self, model: &str, challenge: Challenge, best: &Path) -> Result<PathBuf> {
        let path = self.final_path(model, challenge);
        let source = fs::read(best).map_err(|e| {
            ScoreboxError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read best attempt {}: {}", best.display(), e),
            ))
        })?;
        write_creating_parent(&path, &source)?;
        Ok(path)
    }
}

/// Replace anything outside `[A-Za-z0-9._-]` so model ids like `qwen2.5-coder:1.5b` are path-safe
pub fn sanitize_model(model: &str) -> String {
    let sanitized: String = model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match sanitized.as_str() {
        "" | "." | ".." => format!("_{sanitized}"),
        _ => sanitized,
    }
}

fn write_creating_parent(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ScoreboxError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create directory {}: {}", parent.display(), e),
            ))
        })?;
    }
    fs::write(path, bytes).map_err(|e| {
        ScoreboxError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write {}: {}", path.display(), e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ids_are_made_path_safe() {
        assert_eq!(sanitize_model("qwen2.5-coder:1.5b"), "qwen2.5-coder_1.5b");
        assert_eq!(sanitize_model("org/model name"), "org_model_name");
        assert_eq!(sanitize_model(".."), "_..");
        assert_eq!(sanitize_model(""), "_");
    }

    #[test]
    fn paths_follow_model_and_challenge() {
        let workspace = CandidateWorkspace::new("generated");
        let challenge = Challenge::from_level(2).unwrap();
        assert_eq!(
            workspace.attempt_path("gemma3:1b", challenge, 3),
            PathBuf::from("generated/gemma3_1b/level2_counter/handler_attempt3.py")
        );
        assert_eq!(
            workspace.final_path("gemma3:1b", challenge),
            PathBuf::from("generated/gemma3_1b/level2_counter/handler.py")
        );
    }

    #[test]
    fn persist_overwrites_and_finalize_copies() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = CandidateWorkspace::new(dir.path());
        let challenge = Challenge::from_level(1).unwrap();

        workspace.persist("m", challenge, 1, "old").unwrap();
        let first = workspace.persist("m", challenge, 1, "first").unwrap();
        let second = workspace.persist("m", challenge, 2, "second").unwrap();
        assert_eq!(fs::read_to_string(&first).unwrap(), "first");

        let final_path = workspace.finalize("m", challenge, &second).unwrap();
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "second");

        workspace.finalize("m", challenge, &first).unwrap();
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "first");
    }
}
