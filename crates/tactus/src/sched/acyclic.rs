use crate::ir::{EdgeKind, Netlist, SenItem, SenTree, VarId, var_ref};
use crate::order::strongly_connected_components;
use crate::sched::{LogicByScope, SchedError};
use crate::{HashMap, HashSet};
use bit_set::BitSet;

/// Breaks combinational cycles: logic on a strongly connected component of
/// the dataflow graph is removed from `comb` and returned reclassified as
/// hybrid, sensitized to value changes of everything it reads. The hybrid
/// logic then participates in the settle fixed-point instead of being pure
/// dataflow.
pub fn break_cycles(
    netlist: &mut Netlist,
    comb: &mut LogicByScope,
) -> Result<LogicByScope, SchedError> {
    let entries = std::mem::take(&mut comb.0);
    let n = entries.len();
    if n == 0 {
        return Ok(LogicByScope::default());
    }

    // Per-block read and write sets
    let mut reads: Vec<HashSet<VarId>> = vec![HashSet::default(); n];
    let mut writes: Vec<HashSet<VarId>> = vec![HashSet::default(); n];
    for (i, (_, active)) in entries.iter().enumerate() {
        for stmt in &active.stmts {
            stmt.collect_reads(&mut reads[i]);
            stmt.collect_writes(&mut writes[i]);
        }
    }

    // Dataflow edges: producer -> consumer
    let mut writers: HashMap<VarId, Vec<usize>> = HashMap::default();
    for (i, vars) in writes.iter().enumerate() {
        for &var in vars {
            writers.entry(var).or_default().push(i);
        }
    }
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, vars) in reads.iter().enumerate() {
        for var in vars {
            if let Some(producers) = writers.get(var) {
                for &p in producers {
                    adj[p].push(i);
                }
            }
        }
    }

    let mut cyclic = BitSet::with_capacity(n);
    for scc in strongly_connected_components(&adj) {
        let is_loop = scc.len() > 1 || adj[scc[0]].contains(&scc[0]);
        if is_loop {
            for i in scc {
                cyclic.insert(i);
            }
        }
    }

    let mut hybrid = LogicByScope::default();
    for (i, (scope, mut active)) in entries.into_iter().enumerate() {
        if !cyclic.contains(i) {
            comb.push(scope, active);
            continue;
        }
        // Reclassify: the block becomes sensitive to changes of its inputs
        let mut read_vars: Vec<VarId> = reads[i].iter().copied().collect();
        read_vars.sort_unstable();
        if read_vars.is_empty() {
            return Err(SchedError::Malformed(
                "cyclic combinational logic reads nothing".to_string(),
            ));
        }
        let items = read_vars
            .into_iter()
            .map(|var| SenItem::new(EdgeKind::Hybrid, var_ref(var)))
            .collect();
        active.sense = netlist.add_sen_tree(SenTree::new(items));
        hybrid.push(scope, active);
    }
    Ok(hybrid)
}
