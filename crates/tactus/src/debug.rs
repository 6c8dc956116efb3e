use crate::ir::Netlist;
use crate::sched::LogicClasses;

/// Selects which intermediate scheduling state is dumped to stdout.
/// Mirrors the compilation trace flags of the simulator frontend.
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    pub classes: bool,
    pub final_tree: bool,
    pub output_to_stdout: bool,
}

pub(crate) fn dump_classes(netlist: &Netlist, classes: &LogicClasses) {
    println!("=== Logic classes ===");
    for (name, lbs) in [
        ("static", &classes.statics),
        ("initial", &classes.initials),
        ("final", &classes.finals),
        ("comb", &classes.comb),
        ("clocked", &classes.clocked),
        ("hybrid", &classes.hybrid),
    ] {
        for (scope, active) in &lbs.0 {
            println!(
                "{}: {} {} ({} stmts)",
                name,
                netlist.scope(*scope).name,
                netlist.sen_tree_text(active.sense),
                active.stmts.len()
            );
        }
    }
}

pub(crate) fn dump_funcs(netlist: &Netlist) {
    println!("=== Scheduled functions ===");
    for func in &netlist.funcs {
        println!("{}", func);
    }
}
