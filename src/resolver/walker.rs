//! GraphWalker - walks a project's dependency graph for each framework.
//!
//! Every provider request goes through a cache keyed by (range, framework),
//! so a distinct request reaches the providers once per walker even when
//! several libraries ask for it or frameworks are walked concurrently.
//! The children of a node are looked up concurrently; the walk itself
//! descends in declaration order, which keeps cycle detection and output
//! deterministic.
//!
//! Version conflicts are settled by walking again: after each pass the
//! highest version seen that satisfies every request for a package is
//! pinned, and the walk repeats until the pins stop changing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use semver::Version;

use crate::compat::runtime::RuntimeFile;
use crate::core::framework::FrameworkName;
use crate::core::library::{
    LibraryDependency, LibraryDescription, LibraryRange, LibraryType, LibraryTypes,
};
use crate::core::version::{cmp_precedence, VersionRange};
use crate::providers::DependencyProvider;
use crate::resolver::errors::ResolveError;
use crate::resolver::graph::{GraphNode, RemoteMatch, ResolvedGraph, WalkState};
use crate::walk::WalkProvider;

/// Upper bound on conflict-resolution passes per framework.
const MAX_ROUNDS: usize = 10;

/// Requester label used for the root range.
const ROOT_REQUESTER: &str = "(root)";

/// A provider answer, shared by everyone who asked the same question.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub description: Arc<LibraryDescription>,
    /// Set when a walk provider supplied the library.
    pub remote: Option<RemoteMatch>,
}

type SharedLookup = Shared<BoxFuture<'static, Option<Arc<Lookup>>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    range: LibraryRange,
    framework: FrameworkName,
}

/// The ordered provider chain behind the cache.
#[derive(Clone, Default)]
struct ProviderChain {
    local: Vec<Arc<dyn DependencyProvider>>,
    remote: Vec<Arc<dyn WalkProvider>>,
    fallback: Vec<Arc<dyn DependencyProvider>>,
}

impl ProviderChain {
    async fn resolve(&self, range: &LibraryRange, framework: &FrameworkName) -> Option<Lookup> {
        if let Some(lookup) = first_description(&self.local, range, framework) {
            return Some(lookup);
        }

        if range.allows_type(LibraryType::Package) && !range.is_framework_reference() {
            for include_unlisted in [false, true] {
                for provider in &self.remote {
                    if let Some(lookup) =
                        find_remote(provider, range, framework, include_unlisted).await
                    {
                        return Some(lookup);
                    }
                }
            }
        }

        first_description(&self.fallback, range, framework)
    }
}

fn first_description(
    providers: &[Arc<dyn DependencyProvider>],
    range: &LibraryRange,
    framework: &FrameworkName,
) -> Option<Lookup> {
    providers.iter().find_map(|provider| {
        let description = provider.get_description(range, framework)?;
        tracing::debug!("{} -> {} ({})", range, description.identity, provider.name());
        Some(Lookup {
            description: Arc::new(description),
            remote: None,
        })
    })
}

async fn find_remote(
    provider: &Arc<dyn WalkProvider>,
    range: &LibraryRange,
    framework: &FrameworkName,
    include_unlisted: bool,
) -> Option<Lookup> {
    let matched = match provider.find_library(range, framework, include_unlisted).await {
        Ok(Some(matched)) => matched,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("{}: failed to look up {}: {:#}", provider.name(), range, e);
            return None;
        }
    };

    let dependencies = match provider.get_dependencies(&matched, framework).await {
        Ok(dependencies) => dependencies,
        Err(e) => {
            tracing::warn!("{}: failed to read {}: {:#}", provider.name(), matched.library, e);
            return None;
        }
    };

    if include_unlisted {
        tracing::debug!("{} matched unlisted {}", range, matched.library);
    }

    let description = LibraryDescription::new(range.clone(), matched.library.clone())
        .with_path(matched.location.clone())
        .with_dependencies(dependencies);

    Some(Lookup {
        description: Arc::new(description),
        remote: Some(RemoteMatch {
            provider: Arc::clone(provider),
            matched,
        }),
    })
}

/// The outcome of walking one (framework, runtime) pair.
#[derive(Debug, Clone)]
pub struct FrameworkWalk {
    pub framework: FrameworkName,
    pub runtime_identifier: Option<String>,
    pub state: WalkState,
    pub graph: ResolvedGraph,
    pub errors: Vec<ResolveError>,
}

impl FrameworkWalk {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// The root description, normally the project.
    pub fn root(&self) -> Option<&LibraryDescription> {
        self.graph.root().map(|node| node.description.as_ref())
    }
}

/// Walks for every requested framework.
#[derive(Debug, Clone, Default)]
pub struct WalkResult {
    pub walks: Vec<FrameworkWalk>,
}

impl WalkResult {
    /// Check if every framework walked cleanly.
    pub fn is_success(&self) -> bool {
        self.walks.iter().all(FrameworkWalk::is_success)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &FrameworkWalk> {
        self.walks.iter().filter(|w| w.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FrameworkWalk> {
        self.walks.iter().filter(|w| !w.is_success())
    }

    pub fn get(&self, framework: &FrameworkName) -> Option<&FrameworkWalk> {
        self.walks
            .iter()
            .find(|w| &w.framework == framework && w.runtime_identifier.is_none())
    }
}

/// Resolves dependency graphs against an ordered set of providers.
///
/// Providers are consulted in this order: local providers, then walk
/// providers (non-HTTP first, listed versions before unlisted ones), then
/// fallback providers.
pub struct GraphWalker {
    chain: Arc<ProviderChain>,
    cache: DashMap<LookupKey, SharedLookup>,
}

impl Default for GraphWalker {
    fn default() -> Self {
        GraphWalker::new()
    }
}

impl GraphWalker {
    pub fn new() -> Self {
        GraphWalker {
            chain: Arc::new(ProviderChain::default()),
            cache: DashMap::new(),
        }
    }

    /// Add a local provider, consulted before any feed.
    pub fn with_provider(mut self, provider: Arc<dyn DependencyProvider>) -> Self {
        Arc::make_mut(&mut self.chain).local.push(provider);
        self
    }

    /// Add a package feed.
    pub fn with_walk_provider(mut self, provider: Arc<dyn WalkProvider>) -> Self {
        let remote = &mut Arc::make_mut(&mut self.chain).remote;
        remote.push(provider);
        remote.sort_by_key(|p| p.is_http());
        self
    }

    /// Add a provider consulted once everything else has failed.
    pub fn with_fallback_provider(mut self, provider: Arc<dyn DependencyProvider>) -> Self {
        Arc::make_mut(&mut self.chain).fallback.push(provider);
        self
    }

    /// Feeds in consultation order.
    pub fn walk_providers(&self) -> &[Arc<dyn WalkProvider>] {
        &self.chain.remote
    }

    /// Number of distinct lookups made so far.
    pub fn cached_lookups(&self) -> usize {
        self.cache.len()
    }

    /// Resolve one range, sharing the answer with every other caller.
    pub async fn lookup(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
    ) -> Option<Arc<Lookup>> {
        let key = LookupKey {
            range: range.clone(),
            framework: framework.clone(),
        };

        let pending = self
            .cache
            .entry(key)
            .or_insert_with(|| {
                let chain = Arc::clone(&self.chain);
                let range = range.clone();
                let framework = framework.clone();
                async move { chain.resolve(&range, &framework).await.map(Arc::new) }
                    .boxed()
                    .shared()
            })
            .value()
            .clone();

        pending.await
    }

    /// Walk `root` for every framework concurrently.
    pub async fn walk(&self, root: &LibraryRange, frameworks: &[FrameworkName]) -> WalkResult {
        let walks = join_all(
            frameworks
                .iter()
                .map(|framework| self.walk_framework(root, framework)),
        )
        .await;
        WalkResult { walks }
    }

    /// Walk `root` for one framework.
    pub async fn walk_framework(&self, root: &LibraryRange, framework: &FrameworkName) -> FrameworkWalk {
        self.walk_target(root, framework, None).await
    }

    /// Walk `root` for one framework on a runtime, adding the runtime
    /// dependencies `runtimes` declares for each package.
    pub async fn walk_runtime(
        &self,
        root: &LibraryRange,
        framework: &FrameworkName,
        runtime_identifier: &str,
        runtimes: &RuntimeFile,
    ) -> FrameworkWalk {
        self.walk_target(root, framework, Some((runtime_identifier, runtimes)))
            .await
    }

    /// Merge the runtime graphs shipped by every feed package in `walk`.
    pub async fn collect_runtimes(&self, walk: &FrameworkWalk) -> RuntimeFile {
        let mut merged = RuntimeFile::default();
        for node in walk.graph.libraries() {
            let Some(remote) = &node.remote else {
                continue;
            };
            match remote.provider.get_runtimes(&remote.matched, &walk.framework).await {
                Ok(Some(runtimes)) => merged.merge(&runtimes),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    "{}: failed to read runtimes of {}: {:#}",
                    remote.provider.name(),
                    remote.matched.library,
                    e
                ),
            }
        }
        merged
    }

    async fn walk_target(
        &self,
        root: &LibraryRange,
        framework: &FrameworkName,
        runtime: Option<(&str, &RuntimeFile)>,
    ) -> FrameworkWalk {
        let cancelled = AtomicBool::new(false);
        let mut pins: HashMap<String, Version> = HashMap::new();
        let mut seen: HashMap<String, Vec<Version>> = HashMap::new();
        let runtime_identifier = runtime.map(|(rid, _)| rid.to_string());

        let mut attempt = 1;
        loop {
            let ctx = WalkContext {
                framework,
                runtime,
                pins: &pins,
                cancelled: &cancelled,
            };
            let mut round = Round::new(std::mem::take(&mut seen));
            self.walk_round(root, &ctx, &mut round).await;

            if cancelled.load(Ordering::SeqCst) {
                return round.finish(framework, runtime_identifier);
            }

            let unsettled = self.settle(framework, &mut round, &mut pins).await;
            if unsettled.is_empty() {
                return round.finish(framework, runtime_identifier);
            }
            if attempt == MAX_ROUNDS {
                tracing::warn!(
                    "version selection for {} did not settle after {} passes",
                    framework,
                    MAX_ROUNDS
                );
                for key in &unsettled {
                    let conflict = round.conflict(key);
                    round.errors.push(conflict);
                }
                return round.finish(framework, runtime_identifier);
            }

            tracing::debug!("re-walking {} with {} pinned versions", framework, pins.len());
            seen = std::mem::take(&mut round.seen);
            attempt += 1;
        }
    }

    async fn walk_round(&self, root: &LibraryRange, ctx: &WalkContext<'_>, round: &mut Round) {
        let Some(lookup) = self.lookup(root, ctx.framework).await else {
            round.errors.push(ResolveError::NotFound {
                name: root.name().to_string(),
                range: root.to_string(),
                requester: ROOT_REQUESTER.to_string(),
                framework: ctx.framework.to_string(),
                closest: None,
                attempted_paths: Vec::new(),
            });
            return;
        };

        let description = Arc::clone(&lookup.description);
        round
            .graph
            .add_node(GraphNode::new(Arc::clone(&description), lookup.remote.clone()));

        if description.is_unresolved() {
            let error = self
                .describe_failure(&description, ROOT_REQUESTER, ctx.framework, round)
                .await;
            round.errors.push(error);
            round.graph.set_state(description.name(), WalkState::Unresolved);
            return;
        }

        round.graph.set_state(description.name(), WalkState::Walking);
        round.path.push(description.name().to_string());
        self.visit(ctx, round, Arc::clone(&description)).await;
        round.path.pop();

        if !ctx.cancelled.load(Ordering::SeqCst) {
            round.graph.set_state(description.name(), WalkState::Resolved);
        }
    }

    fn visit<'a>(
        &'a self,
        ctx: &'a WalkContext<'a>,
        round: &'a mut Round,
        parent: Arc<LibraryDescription>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if ctx.cancelled.load(Ordering::SeqCst) {
                return;
            }

            let requester = parent.identity.to_string();
            let dependencies = effective_dependencies(&parent, ctx);
            let ranges: Vec<LibraryRange> = dependencies
                .iter()
                .map(|dependency| pin_range(&dependency.range, ctx.pins))
                .collect();

            let lookups = join_all(ranges.iter().map(|range| self.lookup(range, ctx.framework))).await;

            for (dependency, lookup) in dependencies.iter().zip(lookups) {
                if ctx.cancelled.load(Ordering::SeqCst) {
                    return;
                }

                let name = dependency.name();
                round.request(name, &requester, &dependency.range);

                if let Some(start) = round.path.iter().position(|p| p.eq_ignore_ascii_case(name)) {
                    let mut chain = round.path[start..].to_vec();
                    chain.push(round.path[start].clone());
                    tracing::debug!("cycle: {}", chain.join(" -> "));
                    round.graph.set_state(name, WalkState::Cyclic);
                    round.errors.push(ResolveError::Cycle { chain });
                    ctx.cancelled.store(true, Ordering::SeqCst);
                    return;
                }

                let Some(lookup) = lookup else {
                    round.errors.push(ResolveError::NotFound {
                        name: name.to_string(),
                        range: dependency.range.to_string(),
                        requester: requester.clone(),
                        framework: ctx.framework.to_string(),
                        closest: None,
                        attempted_paths: Vec::new(),
                    });
                    continue;
                };

                let description = Arc::clone(&lookup.description);
                if description.library_type() == LibraryType::Package {
                    round.saw(description.name(), description.version());
                }

                let known = round.graph.contains(description.name());
                if !known {
                    round
                        .graph
                        .add_node(GraphNode::new(Arc::clone(&description), lookup.remote.clone()));
                }
                round.graph.add_edge(parent.name(), description.name());
                if known {
                    continue;
                }

                if description.is_unresolved() {
                    let error = self
                        .describe_failure(&description, &requester, ctx.framework, round)
                        .await;
                    round.errors.push(error);
                    round.graph.set_state(description.name(), WalkState::Unresolved);
                    continue;
                }

                if !description.compatible {
                    round.errors.push(ResolveError::Incompatible {
                        name: description.name().to_string(),
                        version: description.version().clone(),
                        requester: requester.clone(),
                        framework: ctx.framework.to_string(),
                    });
                }

                round.graph.set_state(description.name(), WalkState::Walking);
                round.path.push(description.name().to_string());
                self.visit(ctx, round, Arc::clone(&description)).await;
                round.path.pop();

                if !ctx.cancelled.load(Ordering::SeqCst) {
                    round.graph.set_state(description.name(), WalkState::Resolved);
                }
            }
        }
        .boxed()
    }

    /// Turn an unresolved description into the error reported for it.
    async fn describe_failure(
        &self,
        description: &LibraryDescription,
        requester: &str,
        framework: &FrameworkName,
        round: &Round,
    ) -> ResolveError {
        if description.library_type() != LibraryType::Unresolved {
            return ResolveError::Incompatible {
                name: description.name().to_string(),
                version: description.version().clone(),
                requester: requester.to_string(),
                framework: framework.to_string(),
            };
        }

        let range = &description.range;
        let mut candidates = round
            .seen
            .get(&range.name().to_ascii_lowercase())
            .cloned()
            .unwrap_or_default();

        if range.version_range().is_some() {
            let unbounded = range.clone().with_version_range(None);
            if let Some(found) = self.lookup(&unbounded, framework).await {
                if found.description.library_type() != LibraryType::Unresolved {
                    candidates.push(found.description.version().clone());
                }
            }
        }

        let closest = match range.version_range() {
            Some(versions) => versions.closest(candidates.iter()).cloned(),
            None => candidates.into_iter().max_by(cmp_precedence),
        };

        ResolveError::NotFound {
            name: description.name().to_string(),
            range: range.to_string(),
            requester: requester.to_string(),
            framework: framework.to_string(),
            closest,
            attempted_paths: description.attempted_paths.clone(),
        }
    }

    /// Pick one version per package that satisfies every request seen in
    /// `round`. Returns true when the pins changed and another pass is due.
    async fn settle(
        &self,
        framework: &FrameworkName,
        round: &mut Round,
        pins: &mut HashMap<String, Version>,
    ) -> Vec<String> {
        let mut changed = Vec::new();
        let requests = std::mem::take(&mut round.requests);

        for (key, requests) in &requests {
            let (name, current) = match round.graph.get(key) {
                Some(node) if node.is_package() => {
                    (node.name().to_string(), node.description.version().clone())
                }
                _ => continue,
            };

            let ranges: Vec<&VersionRange> = requests
                .iter()
                .filter_map(|r| r.range.version_range())
                .collect();
            let candidates = round.seen.get(key).cloned().unwrap_or_default();

            let best = candidates
                .iter()
                .filter(|v| ranges.iter().all(|r| r.satisfies(v)))
                .max_by(|a, b| cmp_precedence(a, b))
                .cloned();

            let chosen = match best {
                Some(version) => version,
                None => match intersect_all(&ranges) {
                    None => {
                        round.errors.push(version_conflict(name, requests));
                        continue;
                    }
                    Some(intersection) => {
                        let range = requests[0]
                            .range
                            .clone()
                            .with_version_range(Some(intersection.clone()))
                            .with_allowed_types(LibraryTypes::PACKAGE);
                        match self.lookup(&range, framework).await {
                            Some(found) if found.description.library_type() == LibraryType::Package => {
                                let version = found.description.version().clone();
                                round.saw(&name, &version);
                                version
                            }
                            _ => {
                                round.errors.push(ResolveError::NotFound {
                                    name,
                                    range: range.to_string(),
                                    requester: requests
                                        .iter()
                                        .map(|r| r.requester.as_str())
                                        .collect::<Vec<_>>()
                                        .join(", "),
                                    framework: framework.to_string(),
                                    closest: intersection.closest(candidates.iter()).cloned(),
                                    attempted_paths: Vec::new(),
                                });
                                continue;
                            }
                        }
                    }
                },
            };

            if chosen != current {
                tracing::debug!("{}: selecting {} over {}", name, chosen, current);
                pins.insert(key.clone(), chosen);
                changed.push(key.clone());
            }
        }

        round.requests = requests;
        changed
    }
}

/// Per-pass inputs shared by every node visit.
struct WalkContext<'a> {
    framework: &'a FrameworkName,
    runtime: Option<(&'a str, &'a RuntimeFile)>,
    pins: &'a HashMap<String, Version>,
    cancelled: &'a AtomicBool,
}

struct Request {
    requester: String,
    range: LibraryRange,
}

/// Mutable state of one pass.
struct Round {
    graph: ResolvedGraph,
    /// Libraries currently being walked, outermost first.
    path: Vec<String>,
    /// Requests per lowercased name, sorted for stable error order.
    requests: BTreeMap<String, Vec<Request>>,
    /// Package versions seen per lowercased name, kept across passes.
    seen: HashMap<String, Vec<Version>>,
    errors: Vec<ResolveError>,
}

impl Round {
    fn new(seen: HashMap<String, Vec<Version>>) -> Self {
        Round {
            graph: ResolvedGraph::new(),
            path: Vec::new(),
            requests: BTreeMap::new(),
            seen,
            errors: Vec::new(),
        }
    }

    fn request(&mut self, name: &str, requester: &str, range: &LibraryRange) {
        self.requests
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(Request {
                requester: requester.to_string(),
                range: range.clone(),
            });
    }

    fn saw(&mut self, name: &str, version: &Version) {
        let versions = self.seen.entry(name.to_ascii_lowercase()).or_default();
        if !versions.contains(version) {
            versions.push(version.clone());
        }
    }

    /// A conflict naming every requester of `key` in this pass.
    fn conflict(&self, key: &str) -> ResolveError {
        let name = self
            .graph
            .get(key)
            .map_or_else(|| key.to_string(), |node| node.name().to_string());
        version_conflict(name, self.requests.get(key).map(Vec::as_slice).unwrap_or_default())
    }

    fn finish(mut self, framework: &FrameworkName, runtime_identifier: Option<String>) -> FrameworkWalk {
        let state = if self.errors.iter().any(|e| matches!(e, ResolveError::Cycle { .. })) {
            WalkState::Cyclic
        } else if self.errors.is_empty() {
            WalkState::Resolved
        } else {
            WalkState::Unresolved
        };

        if let Some(root) = self.graph.root().map(|n| n.name().to_string()) {
            if state != WalkState::Resolved {
                self.graph.set_state(&root, state);
            }
        }

        FrameworkWalk {
            framework: framework.clone(),
            runtime_identifier,
            state,
            graph: self.graph,
            errors: self.errors,
        }
    }
}

/// Declared dependencies plus any the runtime graph adds for packages.
fn effective_dependencies(parent: &LibraryDescription, ctx: &WalkContext<'_>) -> Vec<LibraryDependency> {
    let mut dependencies = parent.dependencies.clone();

    let Some((rid, runtimes)) = ctx.runtime else {
        return dependencies;
    };
    if parent.library_type() != LibraryType::Package {
        return dependencies;
    }

    for (name, range) in runtimes.runtime_dependencies(rid, parent.name()) {
        match runtime_dependency(&name, &range) {
            Ok(dependency) => dependencies.push(dependency),
            Err(e) => tracing::warn!(
                "ignoring runtime dependency {} {} of {}: {:#}",
                name,
                range,
                parent.name(),
                e
            ),
        }
    }
    dependencies
}

fn runtime_dependency(name: &str, range: &str) -> anyhow::Result<LibraryDependency> {
    let versions = VersionRange::parse(range)?;
    Ok(LibraryRange::new(name)?
        .with_version_range(Some(versions))
        .with_allowed_types(LibraryTypes::PACKAGE)
        .into())
}

/// Replace a package range with its pinned version, if any.
fn pin_range(range: &LibraryRange, pins: &HashMap<String, Version>) -> LibraryRange {
    match pins.get(&range.name().to_ascii_lowercase()) {
        Some(version) if range.allows_type(LibraryType::Package) && !range.is_framework_reference() => range
            .clone()
            .with_version_range(Some(VersionRange::exact(version.clone()))),
        _ => range.clone(),
    }
}

fn intersect_all(ranges: &[&VersionRange]) -> Option<VersionRange> {
    ranges
        .iter()
        .try_fold(VersionRange::any(), |acc, range| acc.intersect(range))
}

fn version_conflict(name: String, requests: &[Request]) -> ResolveError {
    ResolveError::VersionConflict {
        name,
        requirements: requests
            .iter()
            .map(|r| (r.requester.clone(), range_label(&r.range)))
            .collect(),
    }
}

fn range_label(range: &LibraryRange) -> String {
    range
        .version_range()
        .map_or_else(|| "*".to_string(), ToString::to_string)
}
