//! `packwalk tree` command

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::cli::TreeArgs;
use crate::commands::{block_on, project_root};
use packwalk::core::framework::FrameworkName;
use packwalk::core::library::{LibraryRange, LibraryType, LibraryTypes};
use packwalk::core::project::{FileSystemProjectResolver, Project};
use packwalk::ops::{load_lockfile, lock_path};
use packwalk::providers::{
    DependencyProvider, FrameworkReferenceProvider, HostOs, PackageDependencyProvider,
    ProjectDependencyProvider, ReferenceConfig, UnresolvedDependencyProvider,
};
use packwalk::resolver::{FrameworkWalk, GraphWalker, ResolvedGraph};
use packwalk::util::diagnostic::{emit, suggestions};
use packwalk::util::GlobalContext;

pub fn execute(args: TreeArgs, ctx: &GlobalContext) -> Result<()> {
    let project_dir = project_root(ctx, args.path.clone());
    let project = Project::load(&project_dir)?;

    let lock_file = load_lockfile(&lock_path(&project_dir))?.ok_or_else(|| {
        anyhow!("no lock file found for {}\n{}", project.name(), suggestions::STALE_LOCK)
    })?;

    let mut frameworks: Vec<FrameworkName> = project
        .get_target_frameworks()
        .iter()
        .filter_map(|info| info.framework_name.clone())
        .collect();
    if let Some(filter) = &args.framework {
        let wanted = FrameworkName::parse(filter).with_context(|| format!("invalid framework `{}`", filter))?;
        frameworks.retain(|f| *f == wanted);
        if frameworks.is_empty() {
            return Err(anyhow!("{} does not target {}", project.name(), wanted));
        }
    }

    let config = ctx.load_config(&project_dir);
    let configured = config.restore.packages_dir.as_ref().map(|p| project_dir.join(p));
    let packages_dir = ctx.packages_dir(configured.as_deref());

    let mut packages = PackageDependencyProvider::new(packages_dir, &lock_file);
    if let Some(rid) = &args.runtime {
        packages = packages.with_runtime(rid.clone());
    }

    let mut references = ReferenceConfig::new(HostOs::current());
    if let Some(dir) = &config.references.windows_dir {
        references = references.with_windows_dir(dir);
    }
    for root in &config.references.roots {
        references = references.with_reference_root(root);
    }

    let projects: Arc<dyn DependencyProvider> = Arc::new(ProjectDependencyProvider::new(Arc::new(
        FileSystemProjectResolver::for_project(&project_dir, &[]),
    )));
    let references: Arc<dyn DependencyProvider> = Arc::new(FrameworkReferenceProvider::new(references));
    let packages: Arc<dyn DependencyProvider> = Arc::new(packages);

    let walker = GraphWalker::new()
        .with_provider(Arc::clone(&projects))
        .with_provider(Arc::clone(&references))
        .with_provider(Arc::clone(&packages))
        .with_fallback_provider(Arc::new(UnresolvedDependencyProvider::new(vec![
            projects, references, packages,
        ])));

    let root = LibraryRange::new(project.name())?.with_allowed_types(LibraryTypes::PROJECT);
    let result = block_on(walker.walk(&root, &frameworks))?;

    let max_depth = args.depth.unwrap_or(usize::MAX);
    for walk in &result.walks {
        print_walk(walk, max_depth, args.duplicates);
        for error in &walk.errors {
            emit(&error.to_diagnostic(), ctx.color());
        }
    }

    Ok(())
}

fn print_walk(walk: &FrameworkWalk, max_depth: usize, show_duplicates: bool) {
    println!("{}", walk.framework);
    if let Some(root) = walk.graph.root() {
        let mut seen = HashSet::new();
        print_tree(&walk.graph, root.name(), 0, max_depth, &mut seen, show_duplicates);
    }
    println!();
}

fn print_tree(
    graph: &ResolvedGraph,
    name: &str,
    depth: usize,
    max_depth: usize,
    seen: &mut HashSet<String>,
    show_duplicates: bool,
) {
    if depth > max_depth {
        return;
    }
    let Some(node) = graph.get(name) else {
        return;
    };

    let is_duplicate = !seen.insert(name.to_ascii_lowercase());

    // Print library
    let prefix = if depth == 0 {
        String::new()
    } else {
        format!("{}├── ", "│   ".repeat(depth - 1))
    };

    let kind = match node.description.library_type() {
        LibraryType::Package => "",
        LibraryType::Project => " (project)",
        LibraryType::Reference => " (reference)",
        LibraryType::Unresolved => " (unresolved)",
    };

    let dup_marker = if is_duplicate && !show_duplicates {
        " (*)"
    } else {
        ""
    };

    println!(
        "{}{} v{}{}{}",
        prefix,
        node.name(),
        node.description.version(),
        kind,
        dup_marker
    );

    // Don't recurse into duplicates unless explicitly requested
    if is_duplicate && !show_duplicates {
        return;
    }

    for dep in graph.dependencies(name) {
        print_tree(graph, dep.name(), depth + 1, max_depth, seen, show_duplicates);
    }
}
