//! `packwalk restore` command

use std::path::Path;

use anyhow::{bail, Result};

use crate::cli::RestoreArgs;
use crate::commands::{block_on, project_root};
use packwalk::core::project::PROJECT_FILE_NAME;
use packwalk::ops::{find_projects, restore, RestoreOptions};
use packwalk::util::diagnostic::{emit, emit_error, suggestions, Diagnostic};
use packwalk::util::GlobalContext;

pub fn execute(args: RestoreArgs, ctx: &GlobalContext) -> Result<()> {
    let root = project_root(ctx, args.path.clone());
    let projects = find_projects(&root)?;
    if projects.is_empty() {
        bail!(
            "could not find {} in {}\n{}",
            PROJECT_FILE_NAME,
            root.display(),
            suggestions::NO_PROJECT
        );
    }

    let mut failed = 0;
    for project_dir in &projects {
        let opts = options(&args, ctx, project_dir);
        let result = block_on(restore(project_dir, &opts))??;

        if result.reused {
            eprintln!("      Locked {} (lock file unchanged)", result.lock_path.display());
            continue;
        }

        let project_file = project_dir.join(PROJECT_FILE_NAME);
        for failure in &result.failures {
            eprintln!("      Failed {}", failure.target);
            for error in &failure.errors {
                emit(&error.to_diagnostic().with_location(&project_file), ctx.color());
            }
        }

        if result.written {
            eprintln!(
                "    Restored {} ({} packages)",
                result.lock_path.display(),
                result.packages
            );
        }
        if result.is_success() {
            continue;
        }

        let failed_targets: Vec<&str> = result.failures.iter().map(|f| f.target.as_str()).collect();
        if result.written {
            emit(
                &Diagnostic::warning("lock file written with unresolved targets")
                    .with_context(failed_targets.join(", "))
                    .with_location(&result.lock_path),
                ctx.color(),
            );
            continue;
        }

        let partial = result.lock_file.targets.len() > result.failures.len();
        let hints: &[&str] = if partial { &[suggestions::PARTIAL_RESTORE] } else { &[] };
        emit_error(
            &format!("lock file for {} left unchanged", project_dir.display()),
            &failed_targets,
            hints,
            ctx.color(),
        );
        failed += 1;
    }

    if failed > 0 {
        bail!("restore failed for {} of {} project(s)", failed, projects.len());
    }

    Ok(())
}

/// Configuration for one project, with command-line flags on top.
fn options(args: &RestoreArgs, ctx: &GlobalContext, project_dir: &Path) -> RestoreOptions {
    let config = ctx.load_config(project_dir);

    let packages_dir = match &args.packages {
        Some(dir) => ctx.cwd().join(dir),
        None => {
            let configured = config.restore.packages_dir.as_ref().map(|p| project_dir.join(p));
            ctx.packages_dir(configured.as_deref())
        }
    };

    let mut opts = RestoreOptions::from_config(&config, packages_dir);

    if !args.feeds.is_empty() {
        opts.feeds = args
            .feeds
            .iter()
            .map(|feed| {
                if feed.contains("://") {
                    feed.clone()
                } else {
                    ctx.cwd().join(feed).display().to_string()
                }
            })
            .collect();
    }
    if !args.runtimes.is_empty() {
        opts.runtimes = args.runtimes.clone();
    }
    opts.allow_partial |= args.allow_partial;
    opts.offline |= args.offline;
    opts.lock = args.lock;
    opts.ignore_locked = args.unlock;

    opts
}
