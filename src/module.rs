//! The Module Analyzer: runs [`crate::function::FunctionAnalyzer`] on every
//! function in a [`crate::ir::CallGraph`], marks whole strongly connected
//! components of mutual recursion `Unknown`, and then runs a call-graph-wide
//! fixed point so that a function calling something `Unbounded`/`Unknown`
//! itself becomes `Unknown` (or, via the same asymmetric rule as
//! [`crate::lattice::update`], `Unbounded` if it was otherwise `Bounded`).
//!
//! Grounded on `original_source/src/SCCLoopPass.cpp`'s "iterate SCCs, treat
//! cyclic ones specially" shape, generalized from basic-block loops to
//! call-graph recursion per the analysis this crate implements.

use std::collections::{HashMap, VecDeque};

use crate::function::FunctionAnalyzer;
use crate::ir::{CallGraph, Callee, Demangler, FunctionHandle, FunctionView, LoopInfo, ScalarEvolution};
use crate::lattice::{update, Outcome};

/// Per-function iteration budget for the call-graph fixed point: the
/// lattice has height 4 (`Unevaluated < Bounded < Unbounded < Unknown`), so
/// no single function's result can change more than 4 times.
const ROUNDS_PER_FUNCTION: usize = 4;

/// Flat headroom added on top of [`ROUNDS_PER_FUNCTION`] `* function_count`,
/// defending against a non-monotone host implementation (e.g. a
/// [`CallGraph`] whose `callees` answer changes between calls) without
/// looping forever on a malformed or adversarial call graph.
const ROUNDS_HEADROOM: usize = 16;

/// Runs the whole-program analysis over a call graph of functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleAnalyzer;

impl ModuleAnalyzer {
    /// Analyzes every function reachable through `graph`, returning a map
    /// from function handle to its final [`Outcome`].
    ///
    /// `lookup` resolves a function handle to the [`FunctionView`] (plus
    /// [`LoopInfo`]/[`ScalarEvolution`]) the per-function analyzer needs;
    /// it is a callback rather than a trait bound on `G::Function` so that
    /// hosts can keep function bodies out of the call graph type itself.
    /// `demangler` is used only to build readable explanation strings.
    pub fn analyze<G, T, L>(&self, graph: &G, lookup: L, demangler: &impl Demangler) -> HashMap<G::Function, Outcome>
    where
        G: CallGraph,
        T: FunctionView + LoopInfo<Block = <T as FunctionView>::Block> + ScalarEvolution<Loop = <T as LoopInfo>::Loop>,
        L: Fn(G::Function) -> T,
    {
        let function_analyzer = FunctionAnalyzer;
        let mut results: HashMap<G::Function, Outcome> = graph
            .functions()
            .into_iter()
            .map(|f| (f, function_analyzer.analyze(&lookup(f))))
            .collect();

        self.mark_recursive_sccs(graph, &mut results, &lookup, demangler);
        self.propagate_call_graph(graph, &mut results, &lookup, demangler);

        results
    }

    /// Spec step 2: any strongly connected component with more than one
    /// member, or a single member with a self-edge, is mutual (or direct)
    /// recursion the analysis does not attempt to bound. Every member is
    /// folded via [`update`] against a shared "part of a loop" explanation
    /// naming the component's functions — not overwritten outright — so a
    /// member whose function-local result was already `Unknown` for a more
    /// specific reason keeps that reason per `join`'s `(Unknown, Unknown)`
    /// tie-break.
    ///
    /// `lookup` resolves a handle to its [`FunctionView`] purely to read
    /// `.name()` for the explanation text; `demangler` then demangles it.
    fn mark_recursive_sccs<G, T, L>(
        &self,
        graph: &G,
        results: &mut HashMap<G::Function, Outcome>,
        lookup: &L,
        demangler: &impl Demangler,
    ) where
        G: CallGraph,
        T: FunctionView,
        L: Fn(G::Function) -> T,
    {
        for scc in graph.sccs() {
            if !scc.has_cycle {
                continue;
            }
            let mut names: Vec<String> = scc
                .members
                .iter()
                .map(|&f| demangler.demangle(lookup(f).name()))
                .collect();
            names.sort();
            let explanation = format!(
                "part of a call graph that contains a loop: {}",
                names.join(", ")
            );
            for member in scc.members {
                let current = results.get(&member).cloned().unwrap_or_else(Outcome::unevaluated);
                let updated = update(current, [Outcome::unknown(explanation.clone())]);
                results.insert(member, updated);
            }
        }
    }

    /// Spec step 3: a backward fixed point over the call graph, mirroring
    /// [`crate::function::FunctionAnalyzer`]'s per-block worklist one level
    /// up — callers are re-evaluated whenever one of their callees'
    /// results change, using [`update`] so a function that only calls
    /// `Unbounded` functions becomes `Unbounded` itself even if its own
    /// local body was `Bounded`.
    ///
    /// `lookup` resolves a handle to its [`FunctionView`] purely to read
    /// `.name()` for "via call to X: ..." explanation text.
    fn propagate_call_graph<G, T, L>(
        &self,
        graph: &G,
        results: &mut HashMap<G::Function, Outcome>,
        lookup: &L,
        demangler: &impl Demangler,
    ) where
        G: CallGraph,
        T: FunctionView,
        L: Fn(G::Function) -> T,
    {
        let functions = graph.functions();
        let callers = Self::invert(graph, &functions);
        // Snapshot each function's own (pre-propagation) explanation so
        // "via call to X: ..." always quotes X's local reason, not an
        // ever-growing chain of earlier "via call to" wrappers — callee
        // explanations are stable inputs to this fixed point, not outputs
        // of it.
        let local_explanations: HashMap<G::Function, String> = functions
            .iter()
            .map(|&f| {
                (
                    f,
                    results
                        .get(&f)
                        .map(|o| o.explanation.clone())
                        .unwrap_or_default(),
                )
            })
            .collect();

        let mut queue: VecDeque<G::Function> = functions.iter().copied().collect();
        let mut queued: std::collections::HashSet<G::Function> = functions.iter().copied().collect();
        let max_rounds = ROUNDS_PER_FUNCTION * functions.len() + ROUNDS_HEADROOM;
        let mut rounds = 0usize;

        while let Some(f) = queue.pop_front() {
            queued.remove(&f);
            rounds += 1;
            if rounds > max_rounds {
                log::warn!(
                    "call graph fixed point exceeded {max_rounds} iterations; marking {} remaining function(s) Unknown",
                    queue.len() + 1
                );
                for stale in std::iter::once(f).chain(queue) {
                    results.insert(
                        stale,
                        Outcome::unknown("call graph fixed point did not converge within the iteration cap"),
                    );
                }
                return;
            }

            let current = results.get(&f).cloned().unwrap_or_else(Outcome::unevaluated);
            let incoming = graph.callees(f).into_iter().map(|callee| match callee {
                Callee::Known(callee_fn) => {
                    let callee_verdict = results
                        .get(&callee_fn)
                        .map(|o| o.verdict)
                        .unwrap_or(crate::lattice::Verdict::Unevaluated);
                    let callee_explanation = local_explanations.get(&callee_fn).cloned().unwrap_or_default();
                    Outcome::new(
                        callee_verdict,
                        format!(
                            "via call to {}: {}",
                            demangler.demangle(lookup(callee_fn).name()),
                            callee_explanation
                        ),
                    )
                }
                Callee::Unknown => Outcome::unknown("via call to unknown function"),
            });

            let updated = update(current.clone(), incoming);
            if updated != current {
                results.insert(f, updated);
                for &caller in callers.get(&f).into_iter().flatten() {
                    if queued.insert(caller) {
                        queue.push_back(caller);
                    }
                }
            }
        }
    }

    fn invert<G: CallGraph>(graph: &G, functions: &[G::Function]) -> HashMap<G::Function, Vec<G::Function>> {
        let mut callers: HashMap<G::Function, Vec<G::Function>> = HashMap::new();
        for &caller in functions {
            for callee in graph.callees(caller) {
                if let Callee::Known(callee) = callee {
                    callers.entry(callee).or_default().push(caller);
                }
            }
        }
        callers
    }
}

/// A host-held cache over [`ModuleAnalyzer`], implementing the invalidation
/// contract spec.md §5 describes: a per-function result survives until the
/// host tells the cache that function's IR changed, and the module-level
/// result is recomputed from scratch only once something it was built from
/// has been invalidated.
///
/// Unlike `original_source/src/BoundedTerminationPass.cpp`'s LLVM pass,
/// which always reports `false` from its own invalidation hook (so the pass
/// manager reruns it unconditionally), this cache actually tracks staleness.
#[derive(Debug)]
pub struct AnalysisCache<F: FunctionHandle> {
    function_results: HashMap<F, Outcome>,
    module_results: Option<HashMap<F, Outcome>>,
}

impl<F: FunctionHandle> Default for AnalysisCache<F> {
    fn default() -> Self {
        Self { function_results: HashMap::new(), module_results: None }
    }
}

impl<F: FunctionHandle> AnalysisCache<F> {
    /// Creates an empty cache; everything is stale until the first
    /// [`get_or_analyze`](Self::get_or_analyze) call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the cached per-function result for `function` and marks the
    /// module-level result stale, since it may have depended on that
    /// function's `Outcome` through a call edge.
    pub fn invalidate(&mut self, function: F) {
        self.function_results.remove(&function);
        self.module_results = None;
    }

    /// Marks the module-level result stale without discarding any cached
    /// per-function result, for when only the call graph's edges changed
    /// (a call added or removed) rather than any function body.
    pub fn invalidate_call_graph(&mut self) {
        self.module_results = None;
    }

    /// Whether [`get_or_analyze`](Self::get_or_analyze) would need to redo
    /// the call-graph fixed point if called right now.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.module_results.is_none()
    }

    /// Returns the module-level results, recomputing only what `invalidate`
    /// or `invalidate_call_graph` marked stale since the last call.
    ///
    /// Per-function results missing from the cache (never analyzed, or
    /// invalidated) are recomputed via [`FunctionAnalyzer`]; the
    /// SCC-marking and call-graph propagation passes always rerun once any
    /// function result changed, since either pass can change any function's
    /// verdict.
    pub fn get_or_analyze<G, T, L>(&mut self, graph: &G, lookup: L, demangler: &impl Demangler) -> &HashMap<F, Outcome>
    where
        G: CallGraph<Function = F>,
        T: FunctionView + LoopInfo<Block = <T as FunctionView>::Block> + ScalarEvolution<Loop = <T as LoopInfo>::Loop>,
        L: Fn(F) -> T,
    {
        let function_analyzer = FunctionAnalyzer;
        for f in graph.functions() {
            self.function_results.entry(f).or_insert_with(|| function_analyzer.analyze(&lookup(f)));
        }

        if self.module_results.is_none() {
            let mut results = self.function_results.clone();
            let module_analyzer = ModuleAnalyzer;
            module_analyzer.mark_recursive_sccs(graph, &mut results, &lookup, demangler);
            module_analyzer.propagate_call_graph(graph, &mut results, &lookup, demangler);
            self.module_results = Some(results);
        }

        self.module_results.as_ref().expect("just populated above if it was empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::{Function, Module};
    use crate::ir::IdentityDemangler;
    use crate::lattice::Verdict;

    fn analyze(m: &Module) -> HashMap<crate::ir::graph::FunctionId, Outcome> {
        ModuleAnalyzer.analyze(m, |f| m.function(f).clone(), &IdentityDemangler)
    }

    #[test]
    fn s5_mutual_recursion_is_unknown() {
        // collatz-style: even(n) calls odd(n), odd(n) calls even(n).
        let mut m = Module::new();
        let even = m.add_function(Function::builder("even").build_stub());
        let odd = m.add_function(Function::builder("odd").build_stub());
        m.add_call(even, odd);
        m.add_call(odd, even);

        let results = analyze(&m);
        assert_eq!(results[&even].verdict, Verdict::Unknown);
        assert_eq!(results[&odd].verdict, Verdict::Unknown);
        // Explanation names the actual functions, not their opaque handles.
        assert!(results[&even].explanation.contains("even"));
        assert!(results[&even].explanation.contains("odd"));
        assert!(!results[&even].explanation.contains("FunctionId"));
    }

    #[test]
    fn s6_self_recursion_is_unknown() {
        // factorial(n) calling itself with no loop in its own body.
        let mut m = Module::new();
        let f = m.add_function(Function::builder("factorial").build_stub());
        m.add_call(f, f);

        let results = analyze(&m);
        assert_eq!(results[&f].verdict, Verdict::Unknown);
    }

    #[test]
    fn call_to_bounded_function_is_bounded() {
        let mut m = Module::new();
        let callee = m.add_function(Function::builder("helper").build_stub());
        let caller = m.add_function(Function::builder("main").build_stub());
        m.add_call(caller, callee);

        let results = analyze(&m);
        assert_eq!(results[&caller].verdict, Verdict::Bounded);
    }

    #[test]
    fn call_to_unbounded_function_propagates() {
        let mut m = Module::new();
        let mut b = Function::builder("spin_forever");
        let entry = b.add_block();
        b.add_edge(entry, entry);
        b.add_loop(false, [entry]);
        let callee = m.add_function(b.build());
        let caller = m.add_function(Function::builder("main").build_stub());
        m.add_call(caller, callee);

        let results = analyze(&m);
        assert_eq!(results[&callee].verdict, Verdict::Unbounded);
        assert_eq!(results[&caller].verdict, Verdict::Unbounded);
        // "via call to <name>", not "via call to FunctionId(n)".
        assert!(results[&caller].explanation.contains("via call to spin_forever"));
    }

    #[test]
    fn indirect_call_forces_unknown() {
        let mut m = Module::new();
        let caller = m.add_function(Function::builder("dispatcher").build_stub());
        m.add_indirect_call(caller);

        let results = analyze(&m);
        assert_eq!(results[&caller].verdict, Verdict::Unknown);
    }

    #[test]
    fn cache_starts_stale_and_settles_after_first_analyze() {
        let mut m = Module::new();
        let callee = m.add_function(Function::builder("helper").build_stub());
        let caller = m.add_function(Function::builder("main").build_stub());
        m.add_call(caller, callee);

        let mut cache = AnalysisCache::new();
        assert!(cache.is_stale());

        let results = cache.get_or_analyze(&m, |f| m.function(f).clone(), &IdentityDemangler);
        assert_eq!(results[&caller].verdict, Verdict::Bounded);
        assert!(!cache.is_stale());
    }

    #[test]
    fn invalidating_a_function_forces_caller_to_recompute() {
        let mut m = Module::new();
        let callee = m.add_function(Function::builder("helper").build_stub());
        let caller = m.add_function(Function::builder("main").build_stub());
        m.add_call(caller, callee);

        let mut cache = AnalysisCache::new();
        let first = cache.get_or_analyze(&m, |f| m.function(f).clone(), &IdentityDemangler);
        assert_eq!(first[&caller].verdict, Verdict::Bounded);

        // `helper` now has an unbounded loop; the host invalidates it.
        let mut b = Function::builder("helper");
        let entry = b.add_block();
        b.add_edge(entry, entry);
        b.add_loop(false, [entry]);
        m.replace_function(callee, b.build());
        cache.invalidate(callee);
        assert!(cache.is_stale());

        let second = cache.get_or_analyze(&m, |f| m.function(f).clone(), &IdentityDemangler);
        assert_eq!(second[&callee].verdict, Verdict::Unbounded);
        assert_eq!(second[&caller].verdict, Verdict::Unbounded);
    }

    #[test]
    fn invalidating_one_function_does_not_discard_others() {
        let mut m = Module::new();
        let a = m.add_function(Function::builder("a").build_stub());
        let b = m.add_function(Function::builder("b").build_stub());

        let mut cache = AnalysisCache::new();
        cache.get_or_analyze(&m, |f| m.function(f).clone(), &IdentityDemangler);
        cache.invalidate(a);

        assert!(cache.function_results.contains_key(&b));
        assert!(!cache.function_results.contains_key(&a));
    }
}
