//! The Function Analyzer: for a single function, builds a per-basic-block
//! verdict map seeded from loop information, then runs a worklist
//! fixed-point that propagates divergence *backwards* (from successors
//! toward the entry block). The function's verdict is the verdict at its
//! entry block.
//!
//! # Why backward
//!
//! Consider `void f(bool stall){ if(stall) while(1){} else return; }`. The
//! entry block has two successors: one bounded, one unbounded. Propagating
//! forward from entry would give the diverging block an `Unbounded`
//! verdict but leave the entry block itself `Bounded`, which is wrong for
//! callers observing `f`. Propagating backward, combined with
//! [`crate::lattice::update`]'s asymmetric rule, yields entry = `Unknown`
//! (one successor bounded, one unbounded — sibling divergence). For
//! `void g(){ if(x) while(1){} else while(1){} }`, every entry successor
//! diverges, so the asymmetric rule fires and entry becomes `Unbounded`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ir::{FunctionView, LoopInfo, ScalarEvolution};
use crate::lattice::{update, Outcome};

/// Analyzes a single function's control-flow graph for bounded
/// termination.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionAnalyzer;

impl FunctionAnalyzer {
    /// Runs the analysis and returns the function's [`Outcome`]: the
    /// outcome at its entry block once the backward worklist has
    /// converged.
    ///
    /// `function` must implement [`FunctionView`] for CFG access,
    /// [`LoopInfo`] to find each block's innermost loop, and
    /// [`ScalarEvolution`] to ask whether that loop has a computable trip
    /// count.
    pub fn analyze<F>(&self, function: &F) -> Outcome
    where
        F: FunctionView + LoopInfo<Block = <F as FunctionView>::Block> + ScalarEvolution<Loop = <F as LoopInfo>::Loop>,
    {
        if function.is_declaration_only() {
            log::debug!(name = function.name(); "function has no basic blocks in this module");
            return Outcome::unknown("has no basic blocks in this module");
        }

        let mut verdicts = self.seed_blocks(function);
        self.run_worklist(function, &mut verdicts);

        let entry = function.entry_block();
        verdicts
            .remove(&entry)
            .expect("every reachable block, including entry, was seeded before the worklist ran")
    }

    /// Seeds the per-block verdict map before the worklist begins (spec
    /// step 2, with the structural no-exit extension decided in
    /// `SPEC_FULL.md` §10.1): blocks outside any loop start `Bounded`;
    /// blocks inside a loop with a computable bound also start `Bounded`;
    /// blocks inside a loop with no computable bound start `Unknown`,
    /// *unless* the loop has no exiting block at all (no member block has
    /// a successor outside the loop), in which case it starts `Unbounded`
    /// directly — nothing downstream in `join`/`update` can manufacture a
    /// first `Unbounded` value from `Bounded`/`Unknown` inputs, so a loop
    /// that provably never escapes has to be recognized here.
    fn seed_blocks<F>(&self, function: &F) -> HashMap<F::Block, Outcome>
    where
        F: FunctionView + LoopInfo<Block = <F as FunctionView>::Block> + ScalarEvolution<Loop = <F as LoopInfo>::Loop>,
    {
        let blocks = function.blocks();
        let no_exit_loops = self.loops_with_no_exit(function, &blocks);

        blocks
            .into_iter()
            .map(|block| {
                let outcome = match function.innermost_loop(block) {
                    None => Outcome::bounded(""),
                    Some(loop_) => {
                        if function.has_computable_bound(loop_) {
                            Outcome::bounded("includes a loop, but it has a fixed bound")
                        } else if no_exit_loops.contains(&loop_) {
                            log::trace!(function = function.name(); "block is in a loop with no exiting block");
                            Outcome::unbounded("includes a loop with no exiting block")
                        } else {
                            log::trace!(function = function.name(); "block has a loop with indeterminate bounds");
                            Outcome::unknown("includes loop with indeterminate bounds")
                        }
                    }
                };
                (block, outcome)
            })
            .collect()
    }

    /// Returns the set of loops that have no exiting block: every
    /// successor of every block in the loop stays inside the same loop.
    fn loops_with_no_exit<F>(&self, function: &F, blocks: &[F::Block]) -> HashSet<F::Loop>
    where
        F: FunctionView + LoopInfo<Block = <F as FunctionView>::Block>,
    {
        let mut members: HashMap<F::Loop, Vec<F::Block>> = HashMap::new();
        for &block in blocks {
            if let Some(loop_) = function.innermost_loop(block) {
                members.entry(loop_).or_default().push(block);
            }
        }

        members
            .into_iter()
            .filter_map(|(loop_, loop_blocks)| {
                let has_exit = loop_blocks.iter().any(|&block| {
                    function
                        .successors(block)
                        .iter()
                        .any(|s| function.innermost_loop(*s) != Some(loop_))
                });
                (!has_exit).then_some(loop_)
            })
            .collect()
    }

    /// Backward worklist over the CFG (spec step 3): initializes the
    /// worklist with *every* block, not just exits — a function with no
    /// return would otherwise never be visited. Pops a block, recomputes
    /// its outcome via [`update`] over its successors' current outcomes,
    /// and if it changed, pushes its predecessors. A `HashSet` tracks
    /// worklist membership so pushing an already-queued block is a no-op,
    /// keeping pop order deterministic (oldest-queued-first) without
    /// processing duplicates.
    fn run_worklist<F>(&self, function: &F, verdicts: &mut HashMap<F::Block, Outcome>)
    where
        F: FunctionView,
    {
        let blocks = function.blocks();
        let mut queue: VecDeque<F::Block> = blocks.iter().copied().collect();
        let mut queued: HashSet<F::Block> = blocks.into_iter().collect();

        while let Some(block) = queue.pop_front() {
            queued.remove(&block);

            let successors = function.successors(block);
            let incoming = successors
                .iter()
                .map(|s| verdicts.get(s).cloned().unwrap_or_else(Outcome::unevaluated));
            let current = verdicts
                .get(&block)
                .cloned()
                .unwrap_or_else(Outcome::unevaluated);
            let updated = update(current.clone(), incoming);

            if updated != current {
                verdicts.insert(block, updated);
                for pred in function.predecessors(block) {
                    if queued.insert(pred) {
                        queue.push_back(pred);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::Function;
    use crate::lattice::Verdict;

    fn analyze(f: &Function) -> Outcome {
        FunctionAnalyzer.analyze(f)
    }

    #[test]
    fn s1_bounded_loop() {
        let mut b = Function::builder("main");
        let entry = b.add_block();
        let header = b.add_block();
        let exit = b.add_block();
        b.add_edge(entry, header);
        b.add_edge(header, header);
        b.add_edge(header, exit);
        b.add_loop(true, [header]);
        let f = b.build();

        assert_eq!(analyze(&f).verdict, Verdict::Bounded);
    }

    #[test]
    fn s2_unbounded_loop_with_no_exit() {
        let mut b = Function::builder("unbounded_loop");
        let entry = b.add_block();
        b.add_edge(entry, entry);
        b.add_loop(false, [entry]);
        let f = b.build();

        assert_eq!(analyze(&f).verdict, Verdict::Unbounded);
    }

    #[test]
    fn unbounded_loop_with_an_exit_stays_unknown() {
        // for(;;) { if(cond) break; } -- loop header has an edge out.
        let mut b = Function::builder("loop_with_break");
        let header = b.add_block();
        let exit = b.add_block();
        b.add_edge(header, header);
        b.add_edge(header, exit);
        b.add_loop(false, [header]);
        let f = b.build();

        assert_eq!(analyze(&f).verdict, Verdict::Unknown);
    }

    #[test]
    fn s3_mixed_branch_divergence() {
        // if(v) while(1){} else return;
        let mut b = Function::builder("maybe_stall");
        let entry = b.add_block();
        let loop_block = b.add_block();
        let ret = b.add_block();
        b.add_edge(entry, loop_block);
        b.add_edge(entry, ret);
        b.add_edge(loop_block, loop_block);
        b.add_loop(false, [loop_block]);
        let f = b.build();

        assert_eq!(analyze(&f).verdict, Verdict::Unknown);
    }

    #[test]
    fn s4_all_branch_divergence() {
        // if(v) while(1){} else while(1){}
        let mut b = Function::builder("always_stall");
        let entry = b.add_block();
        let loop_a = b.add_block();
        let loop_b = b.add_block();
        b.add_edge(entry, loop_a);
        b.add_edge(entry, loop_b);
        b.add_edge(loop_a, loop_a);
        b.add_edge(loop_b, loop_b);
        b.add_loop(false, [loop_a]);
        b.add_loop(false, [loop_b]);
        let f = b.build();

        assert_eq!(analyze(&f).verdict, Verdict::Unbounded);
    }

    #[test]
    fn declaration_only_is_unknown() {
        let f = Function::builder("extern_fn").declaration();
        assert_eq!(analyze(&f).verdict, Verdict::Unknown);
    }

    #[test]
    fn block_with_no_successors_keeps_seeded_verdict() {
        let mut b = Function::builder("f");
        let entry = b.add_block();
        let _ = entry;
        let f = b.build();
        assert_eq!(analyze(&f).verdict, Verdict::Bounded);
    }
}
