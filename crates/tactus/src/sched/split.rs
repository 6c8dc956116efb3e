use crate::ir::{Func, FuncId, Netlist, Stmt};
use crate::sched::SchedOptions;

/// Splits a generated function that exceeds the configured node threshold into
/// sub-functions called in order from the original, which afterwards contains
/// only the calls. Children inherit the `slow` flag.
pub fn split_check(netlist: &mut Netlist, func: FuncId, options: &SchedOptions) {
    let limit = options.output_split_funcs;
    if limit == 0 || netlist.func(func).stmts.is_empty() {
        return;
    }
    if netlist.func(func).node_count() < limit {
        return;
    }

    let stmts = std::mem::take(&mut netlist.func_mut(func).stmts);
    let base_name = netlist.func(func).name.clone();
    let scope = netlist.func(func).scope;
    let slow = netlist.func(func).slow;

    let mut func_num = 0;
    let mut func_nodes = 0;
    let mut current: Option<FuncId> = None;
    for stmt in stmts {
        let nodes = stmt.node_count();
        let target = match current {
            Some(target) if func_nodes + nodes <= limit => target,
            _ => {
                let target = netlist.add_func(Func {
                    name: format!("{}__{}", base_name, func_num),
                    scope,
                    stmts: Vec::new(),
                    slow,
                    entry_point: false,
                    parallel: false,
                    ifdef: None,
                });
                func_num += 1;
                netlist.func_mut(func).stmts.push(Stmt::Call(target));
                func_nodes = 0;
                current = Some(target);
                target
            }
        };
        netlist.func_mut(target).stmts.push(stmt);
        func_nodes += nodes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DType, Expr};
    use crate::sched::make_top_function;

    fn setup(stmts: usize) -> (Netlist, FuncId) {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let a = netlist.create_temp("a", DType::Bit);
        let func = make_top_function(&mut netlist, "_eval_static", true);
        for i in 0..stmts {
            // Each assignment counts 3 nodes
            netlist.func_mut(func).stmts.push(Stmt::Assign {
                lhs: Expr::VarRef(a),
                rhs: Expr::Const {
                    value: i as u64,
                    width: 1,
                },
            });
        }
        (netlist, func)
    }

    #[test]
    fn test_disabled_split_is_noop() {
        let (mut netlist, func) = setup(12);
        let before = netlist.func(func).stmts.clone();
        split_check(&mut netlist, func, &SchedOptions::default());
        assert_eq!(netlist.func(func).stmts, before);
    }

    #[test]
    fn test_split_produces_called_children() {
        // 12 assignments of 3 nodes each with a limit of 10: four children,
        // three statements apiece
        let (mut netlist, func) = setup(12);
        let options = SchedOptions {
            output_split_funcs: 10,
            ..Default::default()
        };
        split_check(&mut netlist, func, &options);

        let calls: Vec<FuncId> = netlist
            .func(func)
            .stmts
            .iter()
            .map(|s| match s {
                Stmt::Call(id) => *id,
                other => panic!("parent should only call children, got {}", other),
            })
            .collect();
        assert_eq!(calls.len(), 4);
        for (i, call) in calls.iter().enumerate() {
            let child = netlist.func(*call);
            assert_eq!(child.name, format!("_eval_static__{}", i));
            assert!(child.slow);
            assert!(child.node_count() <= 10);
            assert_eq!(child.stmts.len(), 3);
        }
    }

    #[test]
    fn test_split_twice_is_idempotent() {
        let (mut netlist, func) = setup(12);
        let options = SchedOptions {
            output_split_funcs: 10,
            ..Default::default()
        };
        split_check(&mut netlist, func, &options);
        let after_once = netlist.func(func).stmts.clone();
        let funcs_once = netlist.funcs.len();
        split_check(&mut netlist, func, &options);
        assert_eq!(netlist.func(func).stmts, after_once);
        assert_eq!(netlist.funcs.len(), funcs_once);
    }
}
