//! Dependency analysis and batch scheduling of a module's declarations.
//!
//! Declarations reference each other by name. References from parameter
//! types, result types and data sorts are signature edges; everything else
//! is a body edge. Strongly connected components become batches; a batch
//! may be recursive only through body edges. Batches are grouped into
//! levels so that every batch of a level only depends on earlier levels,
//! and the batches of one level are elaborated in parallel against a
//! snapshot of the environment.

use crate::declarations::{BatchMember, MemberOutcome};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::elaborator::Elaborator;
use crate::error::ElabError;
use crate::meta::MetaStore;
use crate::surface::{Clause, Decl, DeclKind, FnBody, Module, Param, Pattern, PatternKind, SurfaceTerm, SurfaceTermKind};
use kernel::config::ReductionConfig;
use kernel::{DefId, DefRef, Env, GlobalDecl};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Signature,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclStatus {
    Elaborated,
    Failed,
    DependencyFailed { root: String },
    Cancelled,
}

/// Free global names of a declaration, split by where they occur.
#[derive(Debug, Default)]
struct References {
    signature: Vec<String>,
    body: Vec<String>,
}

struct Collector<'a> {
    /// Names that are constructors somewhere in the module or environment.
    ctors: &'a HashSet<String>,
    bound: Vec<String>,
    out: Vec<String>,
}

impl<'a> Collector<'a> {
    fn new(ctors: &'a HashSet<String>) -> Self {
        Collector {
            ctors,
            bound: Vec::new(),
            out: Vec::new(),
        }
    }

    fn name(&mut self, name: &str) {
        if !self.bound.iter().any(|b| b == name) {
            self.out.push(name.to_string());
        }
    }

    fn under(&mut self, name: &str, f: impl FnOnce(&mut Self)) {
        self.bound.push(name.to_string());
        f(self);
        self.bound.pop();
    }

    fn term(&mut self, term: &SurfaceTerm) {
        match &term.kind {
            SurfaceTermKind::Var(name) => self.name(name),
            SurfaceTermKind::NatLit(_) => self.name("Nat"),
            SurfaceTermKind::Sort(_) | SurfaceTermKind::Hole => {}
            SurfaceTermKind::Pi(name, _, dom, cod) | SurfaceTermKind::Sigma(name, dom, cod) => {
                self.term(dom);
                self.under(name, |c| c.term(cod));
            }
            SurfaceTermKind::Lam(name, _, ann, body) => {
                if let Some(ann) = ann {
                    self.term(ann);
                }
                self.under(name, |c| c.term(body));
            }
            SurfaceTermKind::App(fun, arg, _) => {
                self.term(fun);
                self.term(arg);
            }
            SurfaceTermKind::Pair(a, b) | SurfaceTermKind::Ann(a, b) => {
                self.term(a);
                self.term(b);
            }
            SurfaceTermKind::Proj(inner, _) => self.term(inner),
            SurfaceTermKind::Let(name, ty, value, body) => {
                if let Some(ty) = ty {
                    self.term(ty);
                }
                self.term(value);
                self.under(name, |c| c.term(body));
            }
        }
    }

    /// Walk a telescope, leaving its names bound.
    fn telescope(&mut self, params: &[Param]) {
        for param in params {
            self.term(&param.ty);
            self.bound.push(param.name.clone());
        }
    }

    fn pattern(&mut self, pattern: &Pattern, vars: &mut Vec<String>) {
        match &pattern.kind {
            PatternKind::Bind(name) if self.ctors.contains(name) => self.out.push(name.clone()),
            PatternKind::Bind(name) => vars.push(name.clone()),
            PatternKind::Ctor(name, args, alias) => {
                self.out.push(name.clone());
                for arg in args {
                    self.pattern(arg, vars);
                }
                if let Some(alias) = alias {
                    vars.push(alias.clone());
                }
            }
            PatternKind::Wildcard | PatternKind::Absurd => {}
        }
    }

    /// Clause right-hand sides only see their own pattern variables.
    fn clause(&mut self, clause: &Clause) {
        let saved = std::mem::take(&mut self.bound);
        let mut vars = Vec::new();
        for pattern in &clause.patterns {
            self.pattern(pattern, &mut vars);
        }
        self.bound = vars;
        if let Some(rhs) = &clause.rhs {
            self.term(rhs);
        }
        self.bound = saved;
    }

    fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.out)
    }
}

fn references(decl: &Decl, ctors: &HashSet<String>) -> References {
    let mut c = Collector::new(ctors);
    let mut refs = References::default();
    match &decl.kind {
        DeclKind::Fn { params, result, body, .. } => {
            c.telescope(params);
            c.term(result);
            refs.signature = c.take();
            match body {
                FnBody::Expr(expr) => c.term(expr),
                FnBody::Clauses(clauses) => clauses.iter().for_each(|clause| c.clause(clause)),
            }
        }
        DeclKind::Data { params, sort, ctors } => {
            c.telescope(params);
            c.term(sort);
            refs.signature = c.take();
            for ctor in ctors {
                let depth = c.bound.len();
                c.telescope(&ctor.fields);
                c.bound.truncate(depth);
            }
        }
        DeclKind::Struct { params, sort, fields } => {
            c.telescope(params);
            c.term(sort);
            refs.signature = c.take();
            for field in fields {
                c.term(&field.ty);
                c.bound.push(field.name.clone());
            }
        }
    }
    refs.body = c.take();
    refs
}

/// Tarjan's algorithm. Components come out dependencies first.
struct Tarjan<'g> {
    edges: &'g [Vec<(usize, Edge)>],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl<'g> Tarjan<'g> {
    fn run(edges: &'g [Vec<(usize, Edge)>]) -> Vec<Vec<usize>> {
        let n = edges.len();
        let mut tarjan = Tarjan {
            edges,
            index: vec![None; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            components: Vec::new(),
        };
        for node in 0..n {
            if tarjan.index[node].is_none() {
                tarjan.visit(node);
            }
        }
        tarjan.components
    }

    fn visit(&mut self, node: usize) {
        self.index[node] = Some(self.next);
        self.low[node] = self.next;
        self.next += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
        let edges = self.edges;
        for &(target, _) in &edges[node] {
            match self.index[target] {
                None => {
                    self.visit(target);
                    self.low[node] = self.low[node].min(self.low[target]);
                }
                Some(index) if self.on_stack[target] => {
                    self.low[node] = self.low[node].min(index);
                }
                Some(_) => {}
            }
        }
        if Some(self.low[node]) == self.index[node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack[member] = false;
                component.push(member);
                if member == node {
                    break;
                }
            }
            component.sort_unstable();
            self.components.push(component);
        }
    }
}

struct Batch {
    members: Vec<usize>,
    recursive: bool,
    /// A signature edge inside the component.
    illegal: bool,
    /// Components this one depends on.
    deps: Vec<usize>,
    level: usize,
}

/// Result of one batch, merged on the coordinating thread.
struct BatchResult {
    outcomes: Vec<MemberOutcome>,
    warnings: Vec<Diagnostic>,
}

pub struct ScheduleOutput {
    pub env: Env,
    pub diagnostics: Vec<Diagnostic>,
    pub statuses: Vec<(String, DeclStatus)>,
}

pub struct Scheduler<'m> {
    decls: Vec<&'m Decl>,
    defs: Vec<DefRef>,
    projections: Vec<Vec<DefRef>>,
    config: ReductionConfig,
    jobs: usize,
}

fn next_def_id(env: &Env) -> u32 {
    env.decls().iter().map(|decl| decl.def().id.0 + 1).max().unwrap_or(0)
}

impl<'m> Scheduler<'m> {
    pub fn new(config: ReductionConfig, jobs: usize) -> Self {
        Scheduler {
            decls: Vec::new(),
            defs: Vec::new(),
            projections: Vec::new(),
            config,
            jobs,
        }
    }

    /// Elaborate `module` on top of `env`.
    pub fn run(mut self, module: &'m Module, mut env: Env, store: &MetaStore, cancel: &AtomicBool) -> ScheduleOutput {
        let mut diagnostics = Vec::new();
        let mut duplicates: HashMap<usize, DeclStatus> = HashMap::new();

        let mut next_id = next_def_id(&env);
        let mut taken: HashSet<String> = HashSet::new();
        for (index, decl) in module.decls.iter().enumerate() {
            if !taken.insert(decl.name.clone()) || env.resolve(&decl.name).is_some() {
                diagnostics.push(
                    ElabError::DuplicateDefinition {
                        name: decl.name.clone(),
                        span: decl.span,
                    }
                    .to_diagnostic()
                    .in_decl(&decl.name),
                );
                duplicates.insert(index, DeclStatus::Failed);
                continue;
            }
            self.defs.push(DefRef::new(DefId(next_id), decl.name.as_str()));
            next_id += 1;
            let projections = match &decl.kind {
                DeclKind::Struct { fields, .. } => fields
                    .iter()
                    .map(|field| {
                        let def = DefRef::new(DefId(next_id), format!("{}.{}", decl.name, field.name));
                        next_id += 1;
                        def
                    })
                    .collect(),
                _ => vec![],
            };
            self.projections.push(projections);
            self.decls.push(decl);
        }

        let owners = self.name_table(&env, &mut diagnostics);
        for name in owners.ambiguous.iter() {
            env.hide(name.as_str());
        }

        let edges = self.edges(&owners);
        let batches = self.batches(&edges);
        let levels = batches.iter().map(|b| b.level).max().map_or(0, |l| l + 1);
        info!(decls = self.decls.len(), batches = batches.len(), levels, "scheduling module");

        let mut state: Vec<Option<DeclStatus>> = vec![None; self.decls.len()];
        let mut root_of: Vec<Option<String>> = vec![None; self.decls.len()];
        let pool = self.pool();
        for level in 0..levels {
            let mut runnable = Vec::new();
            for (id, batch) in batches.iter().enumerate().filter(|(_, b)| b.level == level) {
                if cancel.load(Ordering::Relaxed) {
                    for &m in &batch.members {
                        state[m] = Some(DeclStatus::Cancelled);
                    }
                    continue;
                }
                let failed_dep = batch
                    .deps
                    .iter()
                    .flat_map(|d| batches[*d].members.iter())
                    .find_map(|m| root_of[*m].clone());
                if let Some(root) = failed_dep {
                    for &m in &batch.members {
                        state[m] = Some(DeclStatus::DependencyFailed { root: root.clone() });
                        root_of[m] = Some(root.clone());
                        diagnostics.push(
                            ElabError::DependencyFailed {
                                name: self.decls[m].name.clone(),
                                root: root.clone(),
                                span: self.decls[m].span,
                            }
                            .to_diagnostic()
                            .in_decl(&self.decls[m].name),
                        );
                    }
                    continue;
                }
                if batch.illegal {
                    let cycle: Vec<String> = batch.members.iter().map(|m| self.decls[*m].name.clone()).collect();
                    for &m in &batch.members {
                        let decl = self.decls[m];
                        diagnostics.push(
                            ElabError::IllegalCycle {
                                name: decl.name.clone(),
                                cycle: cycle.clone(),
                                span: decl.span,
                            }
                            .to_diagnostic()
                            .in_decl(&decl.name),
                        );
                        state[m] = Some(DeclStatus::Failed);
                        root_of[m] = Some(decl.name.clone());
                    }
                    continue;
                }
                runnable.push(id);
            }

            let snapshot = env.clone();
            let work = |id: &usize| self.run_batch(&batches[*id], &snapshot, store, cancel);
            let results: Vec<BatchResult> = match &pool {
                Some(pool) => pool.install(|| runnable.par_iter().map(work).collect()),
                None => runnable.iter().map(work).collect(),
            };

            for (id, result) in runnable.iter().zip(results) {
                diagnostics.extend(result.warnings);
                for (&m, outcome) in batches[*id].members.iter().zip(result.outcomes) {
                    let name = self.decls[m].name.clone();
                    match outcome {
                        MemberOutcome::Elaborated(decls) => {
                            for decl in decls {
                                env.add(decl);
                            }
                            state[m] = Some(DeclStatus::Elaborated);
                        }
                        MemberOutcome::Failed(ElabError::Cancelled { .. }) => {
                            state[m] = Some(DeclStatus::Cancelled);
                        }
                        MemberOutcome::Failed(err) => {
                            diagnostics.push(err.to_diagnostic().in_decl(&name));
                            root_of[m] = Some(name);
                            state[m] = Some(DeclStatus::Failed);
                        }
                        MemberOutcome::DependencyFailed { root } => {
                            diagnostics.push(
                                ElabError::DependencyFailed {
                                    name: name.clone(),
                                    root: root.clone(),
                                    span: self.decls[m].span,
                                }
                                .to_diagnostic()
                                .in_decl(&name),
                            );
                            root_of[m] = Some(root.clone());
                            state[m] = Some(DeclStatus::DependencyFailed { root });
                        }
                    }
                }
            }
            debug!(level, batches = runnable.len(), "level elaborated");
        }

        let mut cancelled = false;
        let mut state = state.into_iter();
        let mut statuses = Vec::with_capacity(module.decls.len());
        for (index, decl) in module.decls.iter().enumerate() {
            let status = match duplicates.remove(&index) {
                Some(status) => status,
                None => state.next().flatten().unwrap_or(DeclStatus::Cancelled),
            };
            if status == DeclStatus::Cancelled && !cancelled {
                diagnostics.push(ElabError::Cancelled { span: decl.span }.to_diagnostic());
                cancelled = true;
            }
            statuses.push((decl.name.clone(), status));
        }
        ScheduleOutput {
            env,
            diagnostics,
            statuses,
        }
    }

    fn pool(&self) -> Option<rayon::ThreadPool> {
        if self.jobs == 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
            Ok(pool) => Some(pool),
            Err(err) => {
                warn!(%err, "could not start worker pool, elaborating sequentially");
                None
            }
        }
    }

    fn run_batch(&self, batch: &Batch, env: &Env, store: &MetaStore, cancel: &AtomicBool) -> BatchResult {
        if cancel.load(Ordering::Relaxed) {
            return BatchResult {
                outcomes: batch
                    .members
                    .iter()
                    .map(|m| MemberOutcome::Failed(ElabError::Cancelled { span: self.decls[*m].span }))
                    .collect(),
                warnings: vec![],
            };
        }
        let members: Vec<BatchMember<'_>> = batch
            .members
            .iter()
            .map(|&m| BatchMember {
                decl: self.decls[m],
                def: self.defs[m].clone(),
                projections: self.projections[m].clone(),
            })
            .collect();
        let mut elab = Elaborator::new(env.clone(), store, self.config);
        let outcomes = elab.elaborate_batch(&members, batch.recursive);
        BatchResult {
            outcomes,
            warnings: elab.take_warnings(),
        }
    }

    fn name_table(&self, env: &Env, diagnostics: &mut Vec<Diagnostic>) -> NameTable {
        let mut table = NameTable::default();
        for (node, decl) in self.decls.iter().enumerate() {
            table.owner.insert(decl.name.clone(), node);
            for name in decl.defined_names() {
                if name.contains('.') {
                    table.owner.insert(name, node);
                }
            }
            if let DeclKind::Data { ctors, .. } = &decl.kind {
                for ctor in ctors {
                    table.ctors.insert(ctor.name.clone());
                    table.ctors.insert(format!("{}.{}", decl.name, ctor.name));
                }
            }
        }
        for decl in env.decls() {
            if let GlobalDecl::Data(data) = decl {
                for ctor in &data.ctors {
                    table.ctors.insert(ctor.name.to_string());
                }
            }
        }

        let mut bare: HashMap<String, Vec<usize>> = HashMap::new();
        for (node, decl) in self.decls.iter().enumerate() {
            if let DeclKind::Data { ctors, .. } = &decl.kind {
                for ctor in ctors {
                    bare.entry(ctor.name.clone()).or_default().push(node);
                }
            }
        }
        let mut clashes: Vec<(String, Vec<usize>)> = bare.into_iter().collect();
        clashes.sort();
        for (name, owners) in clashes {
            let clash = owners.len() > 1 || table.owner.contains_key(&name) || env.resolve(&name).is_some();
            if clash {
                for node in &owners {
                    let decl = self.decls[*node];
                    diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::AmbiguousName,
                            format!(
                                "constructor `{}` of `{}` is only available as `{}.{}`",
                                name, decl.name, decl.name, name
                            ),
                        )
                        .with_span(decl.span)
                        .in_decl(&decl.name),
                    );
                }
                table.ambiguous.push(name);
            } else if let Some(node) = owners.first() {
                table.owner.insert(name, *node);
            }
        }
        table
    }

    fn edges(&self, names: &NameTable) -> Vec<Vec<(usize, Edge)>> {
        self.decls
            .iter()
            .map(|decl| {
                let refs = references(decl, &names.ctors);
                let mut edges: Vec<(usize, Edge)> = Vec::new();
                for (list, kind) in [(&refs.signature, Edge::Signature), (&refs.body, Edge::Body)] {
                    for name in list {
                        if let Some(&target) = names.owner.get(name) {
                            if !edges.contains(&(target, kind)) {
                                edges.push((target, kind));
                            }
                        }
                    }
                }
                edges
            })
            .collect()
    }

    fn batches(&self, edges: &[Vec<(usize, Edge)>]) -> Vec<Batch> {
        let components = Tarjan::run(edges);
        let mut component_of = vec![0; edges.len()];
        for (c, members) in components.iter().enumerate() {
            for &m in members {
                component_of[m] = c;
            }
        }
        let mut batches: Vec<Batch> = Vec::with_capacity(components.len());
        for (c, members) in components.into_iter().enumerate() {
            let mut deps = Vec::new();
            let mut recursive = members.len() > 1;
            let mut illegal = false;
            for &m in &members {
                for &(target, kind) in &edges[m] {
                    let other = component_of[target];
                    if other == c {
                        recursive |= target == m;
                        illegal |= kind == Edge::Signature;
                    } else if !deps.contains(&other) {
                        deps.push(other);
                    }
                }
            }
            // Components are produced dependencies first.
            let level = deps.iter().map(|d| batches[*d].level + 1).max().unwrap_or(0);
            batches.push(Batch {
                members,
                recursive,
                illegal,
                deps,
                level,
            });
        }
        batches
    }
}

#[derive(Debug, Default)]
struct NameTable {
    /// Global names defined by the module, with the declaration defining them.
    owner: HashMap<String, usize>,
    ctors: HashSet<String>,
    /// Bare constructor names that stay qualified-only.
    ambiguous: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{CtorDecl, Param as SurfaceParam};

    fn nat_decl() -> Decl {
        Decl::data(
            "Nat",
            vec![],
            SurfaceTerm::sort(0),
            vec![
                CtorDecl::new("zero", vec![]),
                CtorDecl::new("succ", vec![SurfaceParam::explicit("n", SurfaceTerm::var("Nat"))]),
            ],
        )
    }

    fn run(module: &Module) -> ScheduleOutput {
        let store = MetaStore::new();
        Scheduler::new(ReductionConfig::resolve(Some(10_000)), 1).run(module, Env::new(), &store, &AtomicBool::new(false))
    }

    #[test]
    fn self_reference_in_constructors_is_a_body_edge() {
        let decl = nat_decl();
        let ctors = HashSet::new();
        let refs = references(&decl, &ctors);
        assert!(refs.signature.is_empty());
        assert_eq!(refs.body, vec!["Nat".to_string()]);
    }

    #[test]
    fn clause_variables_do_not_leak_into_references() {
        let decl = Decl::clauses(
            "pred",
            vec![SurfaceParam::explicit("m", SurfaceTerm::var("Nat"))],
            SurfaceTerm::var("Nat"),
            vec![Clause::new(
                vec![Pattern::ctor("succ", vec![Pattern::bind("k")])],
                SurfaceTerm::app(SurfaceTerm::var("pred"), SurfaceTerm::var("k")),
            )],
        );
        let ctors: HashSet<String> = ["succ".to_string()].into_iter().collect();
        let refs = references(&decl, &ctors);
        assert_eq!(refs.signature, vec!["Nat".to_string(), "Nat".to_string()]);
        assert_eq!(refs.body, vec!["succ".to_string(), "pred".to_string()]);
    }

    #[test]
    fn components_come_out_dependencies_first() {
        let edges = vec![
            vec![(1, Edge::Body)],
            vec![(0, Edge::Body), (2, Edge::Signature)],
            vec![],
        ];
        let components = Tarjan::run(&edges);
        assert_eq!(components, vec![vec![2], vec![0, 1]]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let module = Module::new(vec![nat_decl(), nat_decl()]);
        let output = run(&module);
        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::DuplicateDefinition));
        assert_eq!(output.statuses.len(), 2);
        assert!(output.statuses.iter().any(|(_, s)| *s == DeclStatus::Elaborated));
    }

    #[test]
    fn clashing_constructor_names_stay_qualified() {
        let bool_decl = Decl::data(
            "Bool",
            vec![],
            SurfaceTerm::sort(0),
            vec![CtorDecl::new("zero", vec![]), CtorDecl::new("one", vec![])],
        );
        let module = Module::new(vec![nat_decl(), bool_decl]);
        let output = run(&module);
        let ambiguous: Vec<_> = output
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::AmbiguousName)
            .collect();
        assert_eq!(ambiguous.len(), 2);
        assert!(output.env.resolve("zero").is_none());
        assert!(output.env.resolve("Bool.zero").is_some());
        assert!(output.env.resolve("one").is_some());
    }

    #[test]
    fn pre_cancelled_session_elaborates_nothing() {
        let module = Module::new(vec![nat_decl()]);
        let store = MetaStore::new();
        let output = Scheduler::new(ReductionConfig::resolve(Some(10_000)), 1).run(
            &module,
            Env::new(),
            &store,
            &AtomicBool::new(true),
        );
        assert_eq!(output.statuses, vec![("Nat".to_string(), DeclStatus::Cancelled)]);
        assert!(output.env.is_empty());
        assert!(output.diagnostics.iter().any(|d| d.kind == DiagnosticKind::Cancelled));
    }
}
