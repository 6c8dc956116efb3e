use crate::HashSet;
use crate::ir::{ActiveBlock, Netlist, Stmt, VarId};
use crate::sched::{LogicByScope, LogicRegions};

/// Variables referenced by any clocked or hybrid sensitivity tree. Logic
/// computing these by blocking assignment must settle in the act region,
/// before the triggers derived from them are sampled.
fn clock_vars(netlist: &Netlist) -> HashSet<VarId> {
    let mut result = HashSet::default();
    for tree in &netlist.sen_trees {
        if !tree.has_clocked() && !tree.has_hybrid() {
            continue;
        }
        for item in &tree.items {
            if let Some(expr) = &item.expr {
                expr.for_each_var(&mut |var| {
                    result.insert(var);
                });
            }
        }
    }
    result
}

/// Partitions the clocked and combinational (including hybrid) logic into the
/// pre/act/nba regions. Pre assignments migrate into the pre region; clocked
/// logic that computes a clock via a blocking assignment runs in act; the
/// remaining clocked logic runs in nba. Combinational and hybrid logic joins
/// the act region and is replicated from there.
pub fn partition(
    netlist: &Netlist,
    clocked: LogicByScope,
    comb: LogicByScope,
    hybrid: LogicByScope,
) -> LogicRegions {
    let clocks = clock_vars(netlist);
    let mut regions = LogicRegions::default();

    for (scope, active) in clocked {
        let (pre_stmts, rest): (Vec<Stmt>, Vec<Stmt>) = active
            .stmts
            .into_iter()
            .partition(|s| matches!(s, Stmt::AssignPre { .. }));
        if !pre_stmts.is_empty() {
            regions
                .pre
                .push(scope, ActiveBlock::new(active.sense, pre_stmts));
        }
        if rest.is_empty() {
            continue;
        }
        let rest_active = ActiveBlock::new(active.sense, rest);
        let writes_clock = rest_active
            .stmts
            .iter()
            .any(|s| s.writes_blocking_to(&clocks));
        if writes_clock {
            regions.act.push(scope, rest_active);
        } else {
            regions.nba.push(scope, rest_active);
        }
    }

    for (scope, active) in comb {
        regions.act.push(scope, active);
    }
    for (scope, active) in hybrid {
        regions.act.push(scope, active);
    }

    regions
}
