//! spec.md §8 properties 8-9: both fixed points are stable once they
//! report convergence -- re-running them must not change anything.

use termlattice::function::FunctionAnalyzer;
use termlattice::ir::graph::{Function, Module};
use termlattice::ir::IdentityDemangler;
use termlattice::lattice::{update, Outcome};
use termlattice::module::ModuleAnalyzer;

/// Property 8: the function worklist has no hidden state that would make
/// a second run on the same CFG diverge from the first.
#[test]
fn function_worklist_is_a_true_fixed_point() {
    let mut b = Function::builder("maybe_stall");
    let entry = b.add_block();
    let loop_block = b.add_block();
    let ret = b.add_block();
    b.add_edge(entry, loop_block);
    b.add_edge(entry, ret);
    b.add_edge(loop_block, loop_block);
    b.add_loop(false, [loop_block]);
    let f = b.build();

    let first = FunctionAnalyzer.analyze(&f);
    let second = FunctionAnalyzer.analyze(&f);
    assert_eq!(first, second);
}

/// Property 8 at the algebra level: `update` applied again to an already
/// converged `(self, incoming)` pair returns the same outcome.
#[test]
fn update_is_idempotent_at_convergence() {
    let converged = update(Outcome::bounded(""), vec![Outcome::bounded("")]);
    let again = update(converged.clone(), vec![Outcome::bounded(""), converged.clone()]);
    assert_eq!(converged, again);
}

/// Property 9: after the module-level worklist empties, re-running
/// `ModuleAnalyzer::analyze` on the same call graph produces the same
/// map -- there is no leftover "stale" state causing a second sweep to
/// see something different.
#[test]
fn module_fixed_point_is_stable_across_reruns() {
    let mut m = Module::new();
    let even = m.add_function(Function::builder("even").build_stub());
    let odd = m.add_function(Function::builder("odd").build_stub());
    m.add_call(even, odd);
    m.add_call(odd, even);

    let first = ModuleAnalyzer.analyze(&m, |f| m.function(f).clone(), &IdentityDemangler);
    let second = ModuleAnalyzer.analyze(&m, |f| m.function(f).clone(), &IdentityDemangler);

    assert_eq!(first[&even], second[&even]);
    assert_eq!(first[&odd], second[&odd]);
}
