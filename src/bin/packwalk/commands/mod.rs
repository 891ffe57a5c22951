//! Command implementations

pub mod restore;
pub mod tree;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};

use packwalk::util::GlobalContext;

/// Run an async operation to completion on a fresh runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// `path` relative to the working directory, or the nearest project.
pub fn project_root(ctx: &GlobalContext, path: Option<PathBuf>) -> PathBuf {
    match path {
        Some(path) => ctx.cwd().join(path),
        None => ctx
            .find_project_dir()
            .unwrap_or_else(|| ctx.cwd().to_path_buf()),
    }
}
