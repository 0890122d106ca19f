// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use std::path::PathBuf;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Directory that holds the running executable. Assets ship next to it.
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("current_exe")?;
    let dir = exe
        .parent()
        .map(PathBuf::from)
        .with_context(|| format!("executable path has no parent: {}", exe.display()))?;
    tracing::debug!("executable dir = {}", dir.display());
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_dir_contains_test_binary() {
        let dir = executable_dir().unwrap();
        let exe = std::env::current_exe().unwrap();
        assert!(exe.starts_with(&dir));
        assert!(dir.is_dir());
    }
}
