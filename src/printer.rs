//! Text and (optionally) Graphviz rendering of analysis results.
//!
//! Mirrors the teacher's `demos/disassembler` formatters: plain functions
//! over a `fmt::Write`/`String` rather than a stateful printer object,
//! since every output shape here is a single deterministic pass over
//! already-computed results.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ir::{Demangler, FunctionHandle};
use crate::lattice::Outcome;

/// Renders one function's [`Outcome`] as a paragraph:
///
/// ```text
/// Function name: <demangled>
/// Result: <Unevaluated|Bounded|Unbounded|Unknown>
/// Explanation: <string>
///
/// ```
///
/// matching spec.md §6 exactly, including the trailing blank line.
#[must_use]
pub fn format_function_result(name: &str, outcome: &Outcome) -> String {
    format!(
        "Function name: {name}\nResult: {}\nExplanation: {}\n\n",
        outcome.verdict, outcome.explanation
    )
}

/// Renders a whole module's results, one paragraph per function, ordered
/// by demangled name for determinism (spec.md says nothing about order;
/// a stable order is required for the output to be diffable across runs).
///
/// `name_of` resolves each function handle to its mangled name, which is
/// then passed through `demangler`.
#[must_use]
pub fn format_module_results<F: FunctionHandle>(
    results: &HashMap<F, Outcome>,
    name_of: impl Fn(F) -> String,
    demangler: &impl Demangler,
) -> String {
    let mut rows: Vec<(String, &Outcome)> = results
        .iter()
        .map(|(&f, outcome)| (demangler.demangle(&name_of(f)), outcome))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    for (name, outcome) in rows {
        out.push_str(&format_function_result(&name, outcome));
    }
    out
}

/// Renders the call graph as Graphviz `dot`, with each node labeled by its
/// demangled name and verdict. Behind the `graph` feature since it leans
/// on `petgraph`'s `dot` module, the same way the teacher gates its own
/// `petgraph`-backed views behind `graph`.
#[cfg(feature = "graph")]
#[must_use]
pub fn format_call_graph_dot<G>(
    graph: &G,
    results: &HashMap<G::Function, Outcome>,
    name_of: impl Fn(G::Function) -> String,
    demangler: &impl Demangler,
) -> String
where
    G: crate::ir::CallGraph,
{
    use petgraph::graph::DiGraph;

    let mut dot_graph: DiGraph<String, ()> = DiGraph::new();
    let mut nodes = HashMap::new();
    for f in graph.functions() {
        let name = demangler.demangle(&name_of(f));
        let verdict = results
            .get(&f)
            .map(|o| o.verdict.to_string())
            .unwrap_or_else(|| crate::lattice::Outcome::unevaluated().verdict.to_string());
        let label = format!("{name} [{verdict}]");
        nodes.insert(f, dot_graph.add_node(label));
    }
    for f in graph.functions() {
        for callee in graph.callees(f) {
            if let crate::ir::Callee::Known(callee) = callee {
                if let (Some(&from), Some(&to)) = (nodes.get(&f), nodes.get(&callee)) {
                    dot_graph.add_edge(from, to, ());
                }
            }
        }
    }

    let mut out = String::new();
    write!(out, "{}", petgraph::dot::Dot::new(&dot_graph)).expect("writing to a String cannot fail");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::Verdict;

    #[test]
    fn formats_one_paragraph() {
        let outcome = Outcome::bounded("no loops");
        let text = format_function_result("main", &outcome);
        assert_eq!(text, "Function name: main\nResult: Bounded\nExplanation: no loops\n\n");
    }

    #[test]
    fn module_results_are_name_sorted() {
        let mut results = HashMap::new();
        results.insert(1u32, Outcome::bounded(""));
        results.insert(0u32, Outcome::unknown(""));
        let text = format_module_results(&results, |id| if id == 0 { "b".into() } else { "a".into() }, &crate::ir::IdentityDemangler);
        let a_pos = text.find("Function name: a").unwrap();
        let b_pos = text.find("Function name: b").unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn module_results_include_every_verdict() {
        let mut results = HashMap::new();
        results.insert(0u32, Outcome::unbounded("spins"));
        let text = format_module_results(&results, |_| "f".into(), &crate::ir::IdentityDemangler);
        assert!(text.contains("Result: Unbounded"));
        assert_eq!(Verdict::Unbounded.to_string(), "Unbounded");
    }
}
