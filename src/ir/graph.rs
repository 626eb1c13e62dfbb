//! A small in-memory reference IR implementing the traits in
//! [`crate::ir`]. This is not a compiler front end; it is the toy IR a host
//! would plug the real analysis into, used by the test suite and by the
//! `termlattice` CLI's textual format. Modeled on the teacher's
//! handle-indexed `ControlFlowGraph<N, E>`
//! (`src/ir/control_flow/mod.rs`): blocks and functions are dense indices
//! assigned at construction time, not pointers.

use std::collections::BTreeMap;

use super::{CallGraph, Callee, FunctionView, LoopInfo, Scc, ScalarEvolution};

/// A dense index identifying a basic block within one [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub usize);

/// A dense index identifying a loop within one [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoopId(pub usize);

/// A dense index identifying a function within one [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(pub usize);

/// A loop nest: the set of blocks it directly contains (not counting
/// nested sub-loops) and whether scalar evolution can compute a trip-count
/// bound for it.
#[derive(Debug, Clone)]
pub struct Loop {
    has_bound: bool,
}

/// One function's control-flow graph plus its loop nest.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    /// Empty iff this is a declaration with no body.
    blocks: Vec<BlockId>,
    entry: BlockId,
    successors: BTreeMap<BlockId, Vec<BlockId>>,
    predecessors: BTreeMap<BlockId, Vec<BlockId>>,
    /// Innermost loop containing each block, if any.
    block_loop: BTreeMap<BlockId, LoopId>,
    loops: Vec<Loop>,
}

impl Function {
    /// Starts building a function named `name` with no blocks.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FunctionBuilder {
        FunctionBuilder::new(name)
    }

    /// The function's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`Function`]. Blocks are added in declaration order and
/// referenced by the [`BlockId`] returned from [`add_block`](Self::add_block).
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    name: String,
    blocks: Vec<BlockId>,
    successors: BTreeMap<BlockId, Vec<BlockId>>,
    predecessors: BTreeMap<BlockId, Vec<BlockId>>,
    block_loop: BTreeMap<BlockId, LoopId>,
    loops: Vec<Loop>,
}

impl FunctionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declares a new basic block and returns its handle. The first block
    /// added becomes the entry block.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(id);
        self.successors.entry(id).or_default();
        self.predecessors.entry(id).or_default();
        id
    }

    /// Adds a control-flow edge `from -> to`.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> &mut Self {
        self.successors.entry(from).or_default().push(to);
        self.predecessors.entry(to).or_default().push(from);
        self
    }

    /// Declares a new loop with the given bound computability, and assigns
    /// it as the innermost loop of every block in `members`.
    pub fn add_loop(&mut self, has_bound: bool, members: impl IntoIterator<Item = BlockId>) -> &mut Self {
        let id = LoopId(self.loops.len());
        self.loops.push(Loop { has_bound });
        for block in members {
            self.block_loop.insert(block, id);
        }
        self
    }

    /// Finishes building the function. Panics if no blocks were added (use
    /// [`Function::builder`] and add at least one block, or model a
    /// declaration-only function with [`FunctionBuilder::declaration`]).
    #[must_use]
    pub fn build(self) -> Function {
        assert!(!self.blocks.is_empty(), "a function body needs at least one block");
        Function {
            name: self.name,
            entry: self.blocks[0],
            blocks: self.blocks,
            successors: self.successors,
            predecessors: self.predecessors,
            block_loop: self.block_loop,
            loops: self.loops,
        }
    }

    /// Convenience for tests: builds a single-block function with no
    /// internal control flow, i.e. a trivially `Bounded` stub.
    #[must_use]
    pub fn build_stub(mut self) -> Function {
        self.add_block();
        self.build()
    }

    /// Finishes building as a declaration-only function (no body).
    #[must_use]
    pub fn declaration(self) -> Function {
        Function {
            name: self.name,
            entry: BlockId(0),
            blocks: Vec::new(),
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
            block_loop: BTreeMap::new(),
            loops: Vec::new(),
        }
    }
}

impl FunctionView for Function {
    type Block = BlockId;

    fn entry_block(&self) -> Self::Block {
        self.entry
    }

    fn blocks(&self) -> Vec<Self::Block> {
        self.blocks.clone()
    }

    fn successors(&self, block: Self::Block) -> Vec<Self::Block> {
        self.successors.get(&block).cloned().unwrap_or_default()
    }

    fn predecessors(&self, block: Self::Block) -> Vec<Self::Block> {
        self.predecessors.get(&block).cloned().unwrap_or_default()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl LoopInfo for Function {
    type Block = BlockId;
    type Loop = LoopId;

    fn innermost_loop(&self, block: Self::Block) -> Option<Self::Loop> {
        self.block_loop.get(&block).copied()
    }
}

impl ScalarEvolution for Function {
    type Loop = LoopId;

    fn has_computable_bound(&self, loop_: Self::Loop) -> bool {
        self.loops[loop_.0].has_bound
    }
}

/// A whole program: a set of functions plus the call edges between them.
#[derive(Debug, Clone, Default)]
pub struct Module {
    functions: Vec<Function>,
    /// Direct callees of each function, by index into `functions`, or
    /// `None` for an indirect/external call site.
    calls: BTreeMap<FunctionId, Vec<Option<FunctionId>>>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function and returns its handle.
    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len());
        self.functions.push(function);
        self.calls.entry(id).or_default();
        id
    }

    /// Records a direct call from `caller` to `callee`.
    pub fn add_call(&mut self, caller: FunctionId, callee: FunctionId) -> &mut Self {
        self.calls.entry(caller).or_default().push(Some(callee));
        self
    }

    /// Records a call from `caller` to an indirect/external target.
    pub fn add_indirect_call(&mut self, caller: FunctionId) -> &mut Self {
        self.calls.entry(caller).or_default().push(None);
        self
    }

    /// The function at `id`.
    #[must_use]
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0]
    }

    /// Replaces the body of the function at `id`, keeping its handle and
    /// call edges intact. Used by hosts (and tests) to model an edit to a
    /// function's IR ahead of invalidating its cached analysis result.
    pub fn replace_function(&mut self, id: FunctionId, function: Function) {
        self.functions[id.0] = function;
    }
}

impl CallGraph for Module {
    type Function = FunctionId;

    fn functions(&self) -> Vec<Self::Function> {
        (0..self.functions.len()).map(FunctionId).collect()
    }

    fn callees(&self, function: Self::Function) -> Vec<Callee<Self::Function>> {
        self.calls
            .get(&function)
            .into_iter()
            .flatten()
            .map(|c| match c {
                Some(f) => Callee::Known(*f),
                None => Callee::Unknown,
            })
            .collect()
    }

    #[cfg(feature = "graph")]
    fn sccs(&self) -> Vec<Scc<Self::Function>> {
        use std::collections::HashMap;

        let index_of: HashMap<FunctionId, usize> = self
            .functions()
            .into_iter()
            .enumerate()
            .map(|(i, f)| (f, i))
            .collect();
        let mut graph: petgraph::graph::DiGraph<FunctionId, ()> = petgraph::graph::DiGraph::new();
        let mut nodes = Vec::with_capacity(self.functions.len());
        for f in self.functions() {
            nodes.push(graph.add_node(f));
        }
        for f in self.functions() {
            for callee in self.callees(f) {
                if let Callee::Known(callee) = callee {
                    graph.add_edge(nodes[index_of[&f]], nodes[index_of[&callee]], ());
                }
            }
        }

        petgraph::algo::tarjan_scc(&graph)
            .into_iter()
            .map(|component| {
                let members: Vec<FunctionId> = component.iter().map(|&n| graph[n]).collect();
                let has_cycle = members.len() > 1
                    || (members.len() == 1
                        && self
                            .callees(members[0])
                            .iter()
                            .any(|c| *c == Callee::Known(members[0])));
                Scc { members, has_cycle }
            })
            .collect()
    }

    #[cfg(not(feature = "graph"))]
    fn sccs(&self) -> Vec<Scc<Self::Function>> {
        tarjan_sccs(self)
    }
}

/// Computes strongly connected components of `graph`'s call edges, marking
/// each with whether it contains a cycle (more than one member, or a
/// single member with a self-edge). Used when the `graph` feature
/// (petgraph) is disabled.
#[cfg(not(feature = "graph"))]
fn tarjan_sccs(graph: &Module) -> Vec<Scc<FunctionId>> {
    struct State {
        index_counter: usize,
        indices: BTreeMap<FunctionId, usize>,
        low_links: BTreeMap<FunctionId, usize>,
        on_stack: BTreeMap<FunctionId, bool>,
        stack: Vec<FunctionId>,
        result: Vec<Vec<FunctionId>>,
    }

    fn strongconnect(graph: &Module, v: FunctionId, state: &mut State) {
        state.indices.insert(v, state.index_counter);
        state.low_links.insert(v, state.index_counter);
        state.index_counter += 1;
        state.stack.push(v);
        state.on_stack.insert(v, true);

        for callee in graph.callees(v) {
            let Callee::Known(w) = callee else { continue };
            if !state.indices.contains_key(&w) {
                strongconnect(graph, w, state);
                let low_w = state.low_links[&w];
                let low_v = state.low_links[&v];
                state.low_links.insert(v, low_v.min(low_w));
            } else if *state.on_stack.get(&w).unwrap_or(&false) {
                let idx_w = state.indices[&w];
                let low_v = state.low_links[&v];
                state.low_links.insert(v, low_v.min(idx_w));
            }
        }

        if state.low_links[&v] == state.indices[&v] {
            let mut component = Vec::new();
            loop {
                let w = state.stack.pop().expect("component root must be on stack");
                state.on_stack.insert(w, false);
                component.push(w);
                if w == v {
                    break;
                }
            }
            state.result.push(component);
        }
    }

    let mut state = State {
        index_counter: 0,
        indices: BTreeMap::new(),
        low_links: BTreeMap::new(),
        on_stack: BTreeMap::new(),
        stack: Vec::new(),
        result: Vec::new(),
    };

    for f in graph.functions() {
        if !state.indices.contains_key(&f) {
            strongconnect(graph, f, &mut state);
        }
    }

    state
        .result
        .into_iter()
        .map(|members| {
            let has_cycle = members.len() > 1
                || (members.len() == 1
                    && graph
                        .callees(members[0])
                        .iter()
                        .any(|c| *c == Callee::Known(members[0])));
            Scc { members, has_cycle }
        })
        .collect()
}
