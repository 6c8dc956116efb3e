//! Dependency ordering of region logic: schedules the statements of one
//! region into a single function, guarding trigger-sensitized logic by its
//! trigger flags.

use crate::ir::{EdgeKind, Expr, FuncId, Netlist, SenTreeId, Stmt, VarId};
use crate::sched::{LogicByScope, SchedError, make_sub_function};
use crate::{HashMap, HashSet};
use bit_set::BitSet;

struct TarjanContext {
    index: usize,
    stack: Vec<usize>,
    on_stack: BitSet,
    indices: Vec<Option<usize>>,
    lowlink: Vec<Option<usize>>,
    sccs: Vec<Vec<usize>>,
}

fn strong_connect(u: usize, adj: &[Vec<usize>], ctx: &mut TarjanContext) {
    ctx.indices[u] = Some(ctx.index);
    ctx.lowlink[u] = Some(ctx.index);
    ctx.index += 1;
    ctx.stack.push(u);
    ctx.on_stack.insert(u);

    for &v in &adj[u] {
        if ctx.indices[v].is_none() {
            strong_connect(v, adj, ctx);
            ctx.lowlink[u] = Some(ctx.lowlink[u].unwrap().min(ctx.lowlink[v].unwrap()));
        } else if ctx.on_stack.contains(v) {
            ctx.lowlink[u] = Some(ctx.lowlink[u].unwrap().min(ctx.indices[v].unwrap()));
        }
    }

    if ctx.lowlink[u] == ctx.indices[u] {
        let mut scc = Vec::new();
        while let Some(w) = ctx.stack.pop() {
            ctx.on_stack.remove(w);
            scc.push(w);
            if w == u {
                break;
            }
        }
        ctx.sccs.push(scc);
    }
}

/// Strongly connected components of `adj`, in topological order of the
/// condensation.
pub(crate) fn strongly_connected_components(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adj.len();
    let mut ctx = TarjanContext {
        index: 0,
        stack: Vec::new(),
        on_stack: BitSet::with_capacity(n),
        indices: vec![None; n],
        lowlink: vec![None; n],
        sccs: Vec::new(),
    };
    for i in 0..n {
        if ctx.indices[i].is_none() {
            strong_connect(i, adj, &mut ctx);
        }
    }
    ctx.sccs.reverse();
    ctx.sccs
}

fn or_in(cond: &mut Option<Expr>, term: Expr) {
    *cond = Some(match cond.take() {
        Some(prev) => Expr::Or(Box::new(prev), Box::new(term)),
        None => term,
    });
}

/// Topologically schedules the given logic into one `_eval_<name>` function.
///
/// Logic whose sensitivity has been remapped onto trigger flags runs under a
/// guard testing those flags; combinational logic runs unconditionally. The
/// `extra_trig` callback may append further synthetic sensitivities for any
/// variable the logic reads (first-iteration and DPI triggers).
pub fn order(
    netlist: &mut Netlist,
    lbss: Vec<LogicByScope>,
    trig_to_sen: &HashMap<SenTreeId, SenTreeId>,
    name: &str,
    parallel: bool,
    settle: bool,
    mut extra_trig: impl FnMut(&Netlist, VarId, &mut Vec<SenTreeId>),
) -> Result<FuncId, SchedError> {
    let entries: Vec<_> = lbss.into_iter().flat_map(|lbs| lbs.0).collect();
    let n = entries.len();

    // Dataflow graph over the blocks: producer -> consumer
    let mut reads: Vec<HashSet<VarId>> = vec![HashSet::default(); n];
    let mut writers: HashMap<VarId, Vec<usize>> = HashMap::default();
    for (i, (_, active)) in entries.iter().enumerate() {
        let mut writes = HashSet::default();
        for stmt in &active.stmts {
            stmt.collect_reads(&mut reads[i]);
            stmt.collect_writes(&mut writes);
        }
        for var in writes {
            writers.entry(var).or_default().push(i);
        }
    }
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, vars) in reads.iter().enumerate() {
        for var in vars {
            if let Some(producers) = writers.get(var) {
                for &p in producers {
                    if p != i {
                        adj[p].push(i);
                    }
                }
            }
        }
    }

    let func = make_sub_function(netlist, &format!("_eval_{}", name), settle);
    netlist.func_mut(func).parallel = parallel;

    // Blocks within one component keep their source order
    let mut schedule = Vec::with_capacity(n);
    for mut scc in strongly_connected_components(&adj) {
        scc.sort_unstable();
        schedule.extend(scc);
    }

    let mut entries: Vec<_> = entries.into_iter().map(Some).collect();
    for idx in schedule {
        let (_, active) = entries[idx].take().expect("block scheduled twice");
        let tree = netlist.sen_tree(active.sense).clone();

        let mut cond: Option<Expr> = None;
        if !tree.has_combo() {
            // Non-combinational sensitivities must have been remapped onto a
            // trigger vector by now
            if !trig_to_sen.contains_key(&active.sense) {
                return Err(SchedError::UnknownTrigger(
                    netlist.sen_tree_text(active.sense),
                ));
            }
            for item in &tree.items {
                if item.edge == EdgeKind::True {
                    if let Some(expr) = &item.expr {
                        or_in(&mut cond, expr.clone());
                    }
                }
            }
        }

        // Extra triggers contributed by the variables this block reads
        let mut read_vars: Vec<VarId> = reads[idx].iter().copied().collect();
        read_vars.sort_unstable();
        let mut extra = Vec::new();
        for var in read_vars {
            extra_trig(netlist, var, &mut extra);
        }
        let mut seen = HashSet::default();
        for sen in extra {
            if !seen.insert(sen) {
                continue;
            }
            for item in netlist.sen_tree(sen).items.clone() {
                if item.edge == EdgeKind::True {
                    if let Some(expr) = item.expr {
                        or_in(&mut cond, expr);
                    }
                }
            }
        }

        match cond {
            Some(cond) => netlist.func_mut(func).stmts.push(Stmt::If {
                cond,
                then_stmts: active.stmts,
                else_stmts: Vec::new(),
            }),
            None => netlist.func_mut(func).stmts.extend(active.stmts),
        }
    }

    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ActiveBlock, DType, SenItem, SenTree, var_ref};

    fn combo_assign(
        netlist: &mut Netlist,
        lhs: VarId,
        rhs: VarId,
    ) -> ActiveBlock {
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Combo)));
        ActiveBlock::new(
            sen,
            vec![Stmt::Assign {
                lhs: var_ref(lhs),
                rhs: var_ref(rhs),
            }],
        )
    }

    #[test]
    fn test_dataflow_order_wins_over_source_order() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let a = netlist.create_temp("a", DType::Bit);
        let b = netlist.create_temp("b", DType::Bit);
        let c = netlist.create_temp("c", DType::Bit);

        // Source order: c = b; b = a. Dependency order must flip them.
        let mut lbs = LogicByScope::default();
        let block1 = combo_assign(&mut netlist, c, b);
        let block2 = combo_assign(&mut netlist, b, a);
        lbs.push(top, block1);
        lbs.push(top, block2);

        let func = order(
            &mut netlist,
            vec![lbs],
            &HashMap::default(),
            "stl",
            false,
            true,
            |_, _, _| {},
        )
        .unwrap();

        let stmts = &netlist.func(func).stmts;
        assert_eq!(stmts.len(), 2);
        assert_eq!(
            stmts[0],
            Stmt::Assign {
                lhs: var_ref(b),
                rhs: var_ref(a)
            }
        );
        assert_eq!(
            stmts[1],
            Stmt::Assign {
                lhs: var_ref(c),
                rhs: var_ref(b)
            }
        );
        assert!(netlist.func(func).slow);
    }

    #[test]
    fn test_triggered_logic_is_guarded() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let vec_var = netlist.create_temp("__VactTriggered", DType::TriggerVec { width: 1 });
        let q = netlist.create_temp("q", DType::Bit);
        let d = netlist.create_temp("d", DType::Bit);

        let flag = crate::ir::vec_at(vec_var, 0);
        let synthetic = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::True,
            flag.clone(),
        )));
        let original = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::PosEdge,
            var_ref(d),
        )));

        let mut trig_to_sen = HashMap::default();
        trig_to_sen.insert(synthetic, original);

        let mut lbs = LogicByScope::default();
        lbs.push(
            top,
            ActiveBlock::new(
                synthetic,
                vec![Stmt::AssignDly {
                    lhs: var_ref(q),
                    rhs: var_ref(d),
                }],
            ),
        );

        let func = order(
            &mut netlist,
            vec![lbs],
            &trig_to_sen,
            "nba",
            false,
            false,
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(netlist.func(func).name, "_eval_nba");
        match &netlist.func(func).stmts[0] {
            Stmt::If {
                cond, then_stmts, ..
            } => {
                assert_eq!(cond, &flag);
                assert_eq!(then_stmts.len(), 1);
            }
            other => panic!("expected guarded block, got {}", other),
        }
    }

    #[test]
    fn test_unremapped_clocked_logic_is_an_error() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let clk = netlist.create_temp("clk", DType::Bit);
        let q = netlist.create_temp("q", DType::Bit);
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::PosEdge,
            var_ref(clk),
        )));
        let mut lbs = LogicByScope::default();
        lbs.push(
            top,
            ActiveBlock::new(
                sen,
                vec![Stmt::AssignDly {
                    lhs: var_ref(q),
                    rhs: var_ref(clk),
                }],
            ),
        );

        assert!(matches!(
            order(
                &mut netlist,
                vec![lbs],
                &HashMap::default(),
                "act",
                false,
                false,
                |_, _, _| {},
            ),
            Err(SchedError::UnknownTrigger(_))
        ));
    }

    #[test]
    fn test_extra_trigger_callback_guards_input_readers() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let vec_var = netlist.create_temp("__VicoTriggered", DType::TriggerVec { width: 1 });
        let a = netlist.create_temp("a", DType::Bit);
        netlist.var_mut(a).is_input = true;
        let y = netlist.create_temp("y", DType::Bit);

        let first_iter = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::True,
            crate::ir::vec_at(vec_var, 0),
        )));

        let mut lbs = LogicByScope::default();
        let block = combo_assign(&mut netlist, y, a);
        lbs.push(top, block);

        let func = order(
            &mut netlist,
            vec![lbs],
            &HashMap::default(),
            "ico",
            false,
            false,
            |netlist, var, out| {
                if netlist.var(var).is_input {
                    out.push(first_iter);
                }
            },
        )
        .unwrap();

        match &netlist.func(func).stmts[0] {
            Stmt::If { cond, .. } => {
                assert_eq!(cond, &crate::ir::vec_at(vec_var, 0));
            }
            other => panic!("expected guarded block, got {}", other),
        }
    }

    #[test]
    fn test_parallel_flag_propagates() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let func = order(
            &mut netlist,
            vec![],
            &HashMap::default(),
            "nba",
            true,
            false,
            |_, _, _| {},
        )
        .unwrap();
        assert!(netlist.func(func).parallel);
        assert!(!netlist.func(func).slow);
    }
}
