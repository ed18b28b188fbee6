//! Dependency resolution.
//!
//! Turns a set of requested module names into one consistent set of module
//! versions. The search is an explicit backtracking walk over a stack of
//! decision frames:
//!
//! ```text
//! queue: [a, b]          pop a → frame(a) tries a@2.0.0, a@1.0.0, ...
//!   assign a@2.0.0       enqueue a's dependencies (sorted by name)
//!   pop c → frame(c)     every candidate clashes with a@2.0.0 →
//!                        jump to frame(a), undo a@2.0.0, retry a@1.0.0
//! ```
//!
//! Each frame keeps a snapshot of the work queue so undoing a decision also
//! undoes everything it enqueued.
//!
//! A frame also records which assignments turned its candidates down. When
//! it runs out of candidates the search jumps straight back to the most
//! recent of those assignments, skipping unrelated decisions in between, and
//! remembers the combination as a nogood for that candidate so later
//! branches reject it without searching again.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use modgate_core::{
    DependencyEdge, Error, ModuleMetadata, Name, OptionalResolutionStrategy, Result,
    UnresolvedDependency, Version,
};

use crate::registry::ModuleRegistry;

/// A consistent module set: exactly one version per resolved name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSet {
    modules: BTreeMap<Name, Arc<ModuleMetadata>>,
}

impl ResolvedSet {
    pub fn get(&self, name: &Name) -> Option<&Arc<ModuleMetadata>> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Resolved modules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModuleMetadata>> {
        self.modules.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.modules.keys()
    }
}

impl FromIterator<Arc<ModuleMetadata>> for ResolvedSet {
    fn from_iter<I: IntoIterator<Item = Arc<ModuleMetadata>>>(iter: I) -> Self {
        Self {
            modules: iter
                .into_iter()
                .map(|module| (module.name.clone(), module))
                .collect(),
        }
    }
}

/// Outcome of one resolution attempt.
///
/// Failing to find a module set is an expected outcome, so it is a value
/// rather than an `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    Success(ResolvedSet),
    Failure(UnresolvedDependency),
}

impl ResolutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn resolved(&self) -> Option<&ResolvedSet> {
        match self {
            Self::Success(set) => Some(set),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&UnresolvedDependency> {
        match self {
            Self::Success(_) => None,
            Self::Failure(reason) => Some(reason),
        }
    }

    /// Convert into a `Result` for callers that prefer `?`.
    pub fn into_result(self) -> Result<ResolvedSet> {
        match self {
            Self::Success(set) => Ok(set),
            Self::Failure(reason) => Err(Error::UnresolvedDependency(reason)),
        }
    }
}

/// Backtracking resolver over a finished [`ModuleRegistry`].
///
/// `resolve` takes `&self` and keeps all search state on its own stack, so a
/// single resolver can serve concurrent callers.
pub struct DependencyResolver {
    registry: Arc<ModuleRegistry>,
    default_strategy: OptionalResolutionStrategy,
}

impl DependencyResolver {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            default_strategy: OptionalResolutionStrategy::default(),
        }
    }

    /// Set the strategy used by [`resolve_default`](Self::resolve_default).
    pub fn with_default_strategy(mut self, strategy: OptionalResolutionStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn default_strategy(&self) -> OptionalResolutionStrategy {
        self.default_strategy
    }

    pub fn resolve_default(&self, roots: impl IntoIterator<Item = Name>) -> ResolutionResult {
        self.resolve(roots, self.default_strategy)
    }

    /// Resolve `roots` and everything they transitively require.
    pub fn resolve(
        &self,
        roots: impl IntoIterator<Item = Name>,
        strategy: OptionalResolutionStrategy,
    ) -> ResolutionResult {
        let roots: BTreeSet<Name> = roots.into_iter().collect();
        tracing::debug!(
            roots = ?roots.iter().map(Name::as_str).collect::<Vec<_>>(),
            ?strategy,
            "Resolving modules"
        );

        let result = Search::new(&self.registry, strategy).run(roots);
        match &result {
            ResolutionResult::Success(set) => {
                tracing::debug!(modules = set.len(), "Resolution succeeded")
            }
            ResolutionResult::Failure(reason) => {
                tracing::debug!(module = %reason.module, reason = %reason.constraint, "Resolution failed")
            }
        }
        result
    }
}

/// A name waiting to be assigned. `soft` names may be left out.
#[derive(Debug, Clone)]
struct Pending {
    name: Name,
    soft: bool,
}

/// One decision point of the search.
struct Frame {
    name: Name,
    soft: bool,
    candidates: Arc<[Arc<ModuleMetadata>]>,
    /// Index of the next candidate to try.
    next: usize,
    chosen: Option<Arc<ModuleMetadata>>,
    omitted: bool,
    /// A candidate that was turned down only because of an
    /// include-if-required optional edge.
    soft_blocked: Option<UnresolvedDependency>,
    /// Assigned names that rejected at least one candidate of this frame.
    conflicts: BTreeSet<Name>,
    /// Work queue as it was right after this frame's name was popped.
    queue: VecDeque<Pending>,
}

enum Step {
    Assigned(Arc<ModuleMetadata>),
    Omitted,
    Exhausted,
}

/// State owned by a single `resolve` call.
struct Search<'a> {
    registry: &'a ModuleRegistry,
    strategy: OptionalResolutionStrategy,
    candidates: HashMap<Name, Arc<[Arc<ModuleMetadata>]>>,
    /// `(name, candidate index)` pairs already judged; `Some` means the
    /// candidate can never be part of a solution.
    viability: HashMap<(Name, usize), Option<UnresolvedDependency>>,
    /// Assignment combinations under which a candidate is known to fail.
    nogoods: HashMap<(Name, usize), Vec<Vec<(Name, Version)>>>,
    roots: BTreeSet<Name>,
    assignment: BTreeMap<Name, Arc<ModuleMetadata>>,
    last_conflict: Option<UnresolvedDependency>,
}

impl<'a> Search<'a> {
    fn new(registry: &'a ModuleRegistry, strategy: OptionalResolutionStrategy) -> Self {
        Self {
            registry,
            strategy,
            candidates: HashMap::new(),
            viability: HashMap::new(),
            nogoods: HashMap::new(),
            roots: BTreeSet::new(),
            assignment: BTreeMap::new(),
            last_conflict: None,
        }
    }

    fn run(mut self, roots: BTreeSet<Name>) -> ResolutionResult {
        let mut queue: VecDeque<Pending> = roots
            .iter()
            .map(|name| Pending {
                name: name.clone(),
                soft: false,
            })
            .collect();
        self.roots = roots;
        let mut stack: Vec<Frame> = Vec::new();

        'search: loop {
            let pending = loop {
                match queue.pop_front() {
                    None => {
                        let modules = std::mem::take(&mut self.assignment);
                        return ResolutionResult::Success(ResolvedSet { modules });
                    }
                    Some(pending) if self.assignment.contains_key(&pending.name) => continue,
                    Some(pending) => break pending,
                }
            };

            let mut frame = Frame {
                candidates: self.candidates_of(&pending.name),
                name: pending.name,
                soft: pending.soft,
                next: 0,
                chosen: None,
                omitted: false,
                soft_blocked: None,
                conflicts: BTreeSet::new(),
                queue: queue.clone(),
            };

            loop {
                match self.advance(&mut frame) {
                    Step::Assigned(module) => {
                        self.enqueue_dependencies(&module, &mut queue);
                        self.assignment.insert(module.name.clone(), module.clone());
                        frame.chosen = Some(module);
                        stack.push(frame);
                        continue 'search;
                    }
                    Step::Omitted => {
                        tracing::debug!(module = %frame.name, "Omitting unavailable optional module");
                        stack.push(frame);
                        continue 'search;
                    }
                    Step::Exhausted => {
                        if let Some(reason) = frame.soft_blocked.take() {
                            return ResolutionResult::Failure(reason);
                        }
                        if frame.candidates.is_empty() && !frame.soft {
                            self.last_conflict = Some(UnresolvedDependency::new(
                                frame.name.clone(),
                                "no versions are registered",
                            ));
                        }

                        let mut conflicts = std::mem::take(&mut frame.conflicts);
                        if let Some(requirer) = self.requirer_of(&frame.name, &stack) {
                            conflicts.insert(requirer);
                        }

                        let Some(target) = stack.iter().rposition(|f| {
                            f.chosen
                                .as_ref()
                                .map_or(false, |module| conflicts.contains(&module.name))
                        }) else {
                            return ResolutionResult::Failure(self.failure_reason(&frame.name));
                        };

                        let skipped = stack.len() - 1 - target;
                        for undone in stack.drain(target + 1..) {
                            if let Some(module) = undone.chosen {
                                self.assignment.remove(&module.name);
                            }
                        }
                        let Some(mut parent) = stack.pop() else {
                            return ResolutionResult::Failure(self.failure_reason(&frame.name));
                        };
                        tracing::debug!(
                            module = %parent.name,
                            tried = parent.next,
                            skipped,
                            "Backjumping"
                        );

                        conflicts.remove(&parent.name);
                        self.record_nogood(&parent.name, parent.next - 1, &conflicts);
                        if let Some(previous) = parent.chosen.take() {
                            self.assignment.remove(&previous.name);
                        }
                        parent.conflicts.extend(conflicts);
                        queue = parent.queue.clone();
                        frame = parent;
                    }
                }
            }
        }
    }

    /// Move `frame` to its next acceptable alternative.
    fn advance(&mut self, frame: &mut Frame) -> Step {
        while frame.next < frame.candidates.len() {
            let index = frame.next;
            frame.next += 1;
            let candidate = frame.candidates[index].clone();

            if let Some(reason) = self.viability_of(&frame.name, index) {
                self.last_conflict = Some(reason);
                continue;
            }
            if let Some(culprits) = self.nogood_hit(&frame.name, index) {
                frame.conflicts.extend(culprits);
                continue;
            }
            if let Some((culprit, reason)) = self.hard_conflict(&candidate) {
                frame.conflicts.insert(culprit);
                self.last_conflict = Some(reason);
                continue;
            }
            if let Some((_, reason)) = self.soft_conflict(&candidate) {
                frame.soft_blocked.get_or_insert(reason);
                continue;
            }
            return Step::Assigned(candidate);
        }

        if frame.soft && !frame.omitted && frame.chosen.is_none() {
            frame.omitted = true;
            frame.soft_blocked = None;
            return Step::Omitted;
        }
        Step::Exhausted
    }

    fn enqueue_dependencies(&self, module: &ModuleMetadata, queue: &mut VecDeque<Pending>) {
        let mut edges: Vec<&DependencyEdge> = module.dependencies.iter().collect();
        edges.sort_by(|a, b| a.target.cmp(&b.target));

        for edge in edges {
            if self.assignment.contains_key(&edge.target) {
                continue;
            }
            let soft = match (edge.optional, self.strategy) {
                (false, _) | (true, OptionalResolutionStrategy::ForceInclude) => false,
                (true, OptionalResolutionStrategy::IncludeIfAvailable) => true,
                (true, OptionalResolutionStrategy::IncludeIfRequired) => continue,
            };
            queue.push_back(Pending {
                name: edge.target.clone(),
                soft,
            });
        }
    }

    /// Whether an edge restricts its target during the search.
    fn is_hard(&self, edge: &DependencyEdge) -> bool {
        !edge.optional || self.strategy != OptionalResolutionStrategy::IncludeIfRequired
    }

    /// Checks `candidate` against every edge between it and the current
    /// assignment, limited to edges selected by `hard`. Returns the assigned
    /// module responsible along with the reason.
    fn conflict_with_assignment(
        &self,
        candidate: &ModuleMetadata,
        hard: bool,
    ) -> Option<(Name, UnresolvedDependency)> {
        for source in self.assignment.values() {
            if let Some(edge) = source.dependency_on(&candidate.name) {
                if self.is_hard(edge) == hard && !edge.is_satisfied_by(&candidate.version) {
                    return Some((
                        source.name.clone(),
                        UnresolvedDependency::new(
                            candidate.name.clone(),
                            format!("{} requires {}; {} does not match", source, edge, candidate.version),
                        ),
                    ));
                }
            }
        }

        for edge in &candidate.dependencies {
            if self.is_hard(edge) != hard {
                continue;
            }
            if let Some(target) = self.assignment.get(&edge.target) {
                if !edge.is_satisfied_by(&target.version) {
                    return Some((
                        target.name.clone(),
                        UnresolvedDependency::new(
                            edge.target.clone(),
                            format!("{} requires {}; {} is already selected", candidate, edge, target),
                        ),
                    ));
                }
            }
        }

        None
    }

    fn hard_conflict(&self, candidate: &ModuleMetadata) -> Option<(Name, UnresolvedDependency)> {
        self.conflict_with_assignment(candidate, true)
    }

    /// Include-if-required optional edges only constrain modules already in
    /// the set for another reason.
    fn soft_conflict(&self, candidate: &ModuleMetadata) -> Option<(Name, UnresolvedDependency)> {
        if self.strategy != OptionalResolutionStrategy::IncludeIfRequired {
            return None;
        }
        self.conflict_with_assignment(candidate, false)
    }

    /// The earliest assignment that makes `name` mandatory; roots need none.
    fn requirer_of(&self, name: &Name, stack: &[Frame]) -> Option<Name> {
        if self.roots.contains(name) {
            return None;
        }
        stack
            .iter()
            .filter_map(|frame| frame.chosen.as_ref())
            .find(|module| {
                module
                    .dependency_on(name)
                    .map_or(false, |edge| self.is_required(edge))
            })
            .map(|module| module.name.clone())
    }

    /// Remember that candidate `index` of `name` fails while every module in
    /// `conflicts` keeps its current version.
    fn record_nogood(&mut self, name: &Name, index: usize, conflicts: &BTreeSet<Name>) {
        let nogood: Vec<(Name, Version)> = conflicts
            .iter()
            .filter_map(|culprit| {
                self.assignment
                    .get(culprit)
                    .map(|module| (culprit.clone(), module.version.clone()))
            })
            .collect();
        self.nogoods
            .entry((name.clone(), index))
            .or_default()
            .push(nogood);
    }

    /// Names behind the first recorded nogood of this candidate that the
    /// current assignment matches.
    fn nogood_hit(&self, name: &Name, index: usize) -> Option<Vec<Name>> {
        self.nogoods
            .get(&(name.clone(), index))?
            .iter()
            .find(|nogood| {
                nogood.iter().all(|(culprit, version)| {
                    self.assignment
                        .get(culprit)
                        .map_or(false, |module| &module.version == version)
                })
            })
            .map(|nogood| nogood.iter().map(|(culprit, _)| culprit.clone()).collect())
    }

    fn candidates_of(&mut self, name: &Name) -> Arc<[Arc<ModuleMetadata>]> {
        if let Some(list) = self.candidates.get(name) {
            return list.clone();
        }
        let list: Arc<[Arc<ModuleMetadata>]> = self.registry.modules_of(name).into();
        self.candidates.insert(name.clone(), list.clone());
        list
    }

    /// Edges that must be satisfiable regardless of the rest of the search.
    fn is_required(&self, edge: &DependencyEdge) -> bool {
        !edge.optional || self.strategy == OptionalResolutionStrategy::ForceInclude
    }

    /// Context-free check of one candidate: every required edge must reach
    /// at least one viable version of its target. Verdicts are memoized for
    /// the rest of the call.
    fn viability_of(&mut self, name: &Name, index: usize) -> Option<UnresolvedDependency> {
        let mut visiting = HashSet::new();
        self.viability_inner(name, index, &mut visiting)
    }

    fn viability_inner(
        &mut self,
        name: &Name,
        index: usize,
        visiting: &mut HashSet<(Name, usize)>,
    ) -> Option<UnresolvedDependency> {
        let key = (name.clone(), index);
        if let Some(verdict) = self.viability.get(&key) {
            return verdict.clone();
        }
        // Cycles are assumed viable; the search itself still checks them.
        if !visiting.insert(key.clone()) {
            return None;
        }

        let module = self.candidates_of(name)[index].clone();
        let mut verdict = None;

        let required: Vec<DependencyEdge> = module
            .dependencies
            .iter()
            .filter(|edge| self.is_required(edge))
            .cloned()
            .collect();

        for edge in &required {
            let targets = self.candidates_of(&edge.target);
            let in_range: Vec<usize> = (0..targets.len())
                .filter(|&i| edge.is_satisfied_by(&targets[i].version))
                .collect();

            let reachable = in_range
                .iter()
                .any(|&i| self.viability_inner(&edge.target, i, visiting).is_none());

            if !reachable {
                let available = if targets.is_empty() {
                    "none registered".to_string()
                } else {
                    targets
                        .iter()
                        .map(|t| t.version.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                verdict = Some(UnresolvedDependency::new(
                    edge.target.clone(),
                    format!("{} requires {}; available: {}", module, edge, available),
                ));
                break;
            }
        }

        visiting.remove(&key);
        self.viability.insert(key, verdict.clone());
        verdict
    }

    fn failure_reason(&mut self, last: &Name) -> UnresolvedDependency {
        self.last_conflict.take().unwrap_or_else(|| {
            UnresolvedDependency::new(last.clone(), "no consistent module set exists")
        })
    }
}
