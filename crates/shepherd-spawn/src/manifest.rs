//! Entry-script resolution.
//!
//! A worker directory may carry a `package.json` manifest whose `main`
//! field names the entry script. When the spec gives no explicit script we
//! try that; any read or parse failure silently yields "no script" — the
//! caller turns that into a validation error.

use crate::spec::ProcessSpec;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve the script a spec should run: the explicit value when given,
/// else the manifest's declared entry point.
pub async fn resolve_script(spec: &ProcessSpec) -> Option<PathBuf> {
    if let Some(script) = &spec.script {
        return Some(script.clone());
    }
    let dir = spec.working_dir.as_deref()?;
    manifest_entry(dir).await
}

async fn manifest_entry(dir: &Path) -> Option<PathBuf> {
    let path = dir.join("package.json");
    let raw = match tokio::fs::read(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no readable manifest");
            return None;
        }
    };
    let manifest: Value = serde_json::from_slice(&raw).ok()?;
    let main = manifest.get("main")?.as_str()?;
    Some(PathBuf::from(main))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_script_wins() {
        let spec = ProcessSpec::from_script("run.py").with_working_dir("/tmp");
        assert_eq!(resolve_script(&spec).await, Some(PathBuf::from("run.py")));
    }

    #[tokio::test]
    async fn test_manifest_main_is_used() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "worker", "main": "index.js"}"#,
        )
        .await
        .unwrap();

        let spec = ProcessSpec::from_dir(dir.path());
        assert_eq!(resolve_script(&spec).await, Some(PathBuf::from("index.js")));
    }

    #[tokio::test]
    async fn test_missing_manifest_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::from_dir(dir.path());
        assert_eq!(resolve_script(&spec).await, None);
    }

    #[tokio::test]
    async fn test_malformed_manifest_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("package.json"), "not json at all")
            .await
            .unwrap();

        let spec = ProcessSpec::from_dir(dir.path());
        assert_eq!(resolve_script(&spec).await, None);
    }

    #[tokio::test]
    async fn test_manifest_without_main_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("package.json"), r#"{"name": "worker"}"#)
            .await
            .unwrap();

        let spec = ProcessSpec::from_dir(dir.path());
        assert_eq!(resolve_script(&spec).await, None);
    }
}
