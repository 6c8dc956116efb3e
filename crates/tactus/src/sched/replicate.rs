use crate::HashSet;
use crate::ir::{Netlist, VarId};
use crate::sched::{LogicByScope, LogicRegions, LogicReplicas};

fn writes_of(lbs: &LogicByScope) -> HashSet<VarId> {
    let mut result = HashSet::default();
    for (_, active) in &lbs.0 {
        for stmt in &active.stmts {
            stmt.collect_writes(&mut result);
        }
    }
    result
}

/// Replicates combinational logic into the regions that can invalidate its
/// result, so each region is self-contained: logic reading top-level inputs
/// or DPI-written state goes to ico, logic fed by act-region (or pre) writes
/// goes to the act replicas, logic fed by nba writes to the nba replicas.
/// Combinational logic nothing invalidates is computed by the settle region
/// alone and is not replicated.
pub fn replicate_logic(netlist: &Netlist, regions: &mut LogicRegions) -> LogicReplicas {
    // Pull the combinational logic out of the act region; everything else
    // stays where the partitioner put it
    let mut comb = Vec::new();
    let act_entries = std::mem::take(&mut regions.act.0);
    for (scope, active) in act_entries {
        if netlist.sen_tree(active.sense).has_combo() {
            comb.push((scope, active));
        } else {
            regions.act.0.push((scope, active));
        }
    }

    let mut act_writes = writes_of(&regions.act);
    act_writes.extend(writes_of(&regions.pre));
    let nba_writes = writes_of(&regions.nba);

    let mut replicas = LogicReplicas::default();
    for (scope, active) in comb {
        let mut reads = HashSet::default();
        for stmt in &active.stmts {
            stmt.collect_reads(&mut reads);
        }
        let feeds_from_input = reads
            .iter()
            .any(|v| netlist.var(*v).is_input || netlist.var(*v).written_by_dpi);
        let feeds_from_act = reads.iter().any(|v| act_writes.contains(v));
        let feeds_from_nba = reads.iter().any(|v| nba_writes.contains(v));

        if feeds_from_input {
            replicas.ico.push(scope, active.clone());
        }
        if feeds_from_act {
            replicas.act.push(scope, active.clone());
        }
        if feeds_from_nba {
            replicas.nba.push(scope, active);
        }
    }
    replicas
}
