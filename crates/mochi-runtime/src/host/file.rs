use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::RuntimeError;
use crate::host::context::HostContext;

/// Resolves `relative` against the app's file root, rejecting any path
/// that would escape it (`..`, absolute paths, symlink-like traversal via
/// normalized component inspection) — spec §4.4's "path-rooted file API
/// that refuses traversal outside the root".
fn resolve(root: &Path, relative: &str) -> Result<PathBuf, RuntimeError> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        use std::path::Component;
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(RuntimeError::Argument(format!(
                    "path '{relative}' escapes the app file root"
                )))
            }
        }
    }
    Ok(resolved)
}

pub async fn read(ctx: &HostContext, path: &str) -> Result<Vec<u8>, RuntimeError> {
    let full = resolve(&ctx.file_root, path)?;
    tokio::fs::read(&full).await.map_err(|e| RuntimeError::Io(e.to_string()))
}

pub async fn write(ctx: &HostContext, path: &str, content: &[u8]) -> Result<(), RuntimeError> {
    let full = resolve(&ctx.file_root, path)?;
    let current_usage = directory_size(&ctx.file_root).await?;
    if current_usage + content.len() as u64 > ctx.config.file_max_storage_bytes {
        return Err(RuntimeError::Argument("per-user storage cap exceeded".into()));
    }
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| RuntimeError::Io(e.to_string()))?;
    }
    let mut file = tokio::fs::File::create(&full).await.map_err(|e| RuntimeError::Io(e.to_string()))?;
    file.write_all(content).await.map_err(|e| RuntimeError::Io(e.to_string()))?;
    Ok(())
}

pub async fn exists(ctx: &HostContext, path: &str) -> Result<bool, RuntimeError> {
    let full = resolve(&ctx.file_root, path)?;
    Ok(tokio::fs::metadata(&full).await.is_ok())
}

pub async fn list(ctx: &HostContext, path: &str) -> Result<Vec<String>, RuntimeError> {
    let full = resolve(&ctx.file_root, path)?;
    let mut entries = tokio::fs::read_dir(&full).await.map_err(|e| RuntimeError::Io(e.to_string()))?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| RuntimeError::Io(e.to_string()))? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

pub async fn delete(ctx: &HostContext, path: &str) -> Result<(), RuntimeError> {
    let full = resolve(&ctx.file_root, path)?;
    tokio::fs::remove_file(&full).await.map_err(|e| RuntimeError::Io(e.to_string()))
}

async fn directory_size(root: &Path) -> Result<u64, RuntimeError> {
    let mut total = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| RuntimeError::Io(e.to_string()))? {
            let metadata = entry.metadata().await.map_err(|e| RuntimeError::Io(e.to_string()))?;
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_outside_root_is_rejected() {
        let root = PathBuf::from("/data/users/1/notes/files");
        assert!(resolve(&root, "../../etc/passwd").is_err());
        assert!(resolve(&root, "notes/today.md").is_ok());
    }
}
