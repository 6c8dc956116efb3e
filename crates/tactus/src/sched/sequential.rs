use crate::HashMap;
use crate::ir::{Func, FuncId, Netlist, ScopeId, Stmt};
use crate::sched::{LogicByScope, SchedOptions, make_top_function, split_check};

/// Emit the given logic in source order: one sub-function per scope, each
/// called from `top_fn` when its scope is first seen, bodies moved in as
/// they appear. The per-scope grouping lets a later combine pass deduplicate
/// identical functions.
pub fn order_sequentially(netlist: &mut Netlist, top_fn: FuncId, lbs: LogicByScope) {
    // Scope -> sub-function side table
    let mut scope_funcs: HashMap<ScopeId, FuncId> = HashMap::default();
    for (scope, active) in lbs {
        let sub_fn = match scope_funcs.get(&scope) {
            Some(func) => *func,
            None => {
                let name = format!(
                    "{}__{}",
                    netlist.func(top_fn).name,
                    netlist.scope_dotless_name(scope)
                );
                let slow = netlist.func(top_fn).slow;
                let sub_fn = netlist.add_func(Func {
                    name,
                    scope,
                    stmts: Vec::new(),
                    slow,
                    entry_point: false,
                    parallel: false,
                    ifdef: None,
                });
                netlist.func_mut(top_fn).stmts.push(Stmt::Call(sub_fn));
                scope_funcs.insert(scope, sub_fn);
                sub_fn
            }
        };
        for stmt in active.stmts {
            // Procedure wrappers are dissolved when the body moves
            if let Stmt::Block(body) = stmt {
                netlist.func_mut(sub_fn).stmts.extend(body);
            } else {
                netlist.func_mut(sub_fn).stmts.push(stmt);
            }
        }
    }
}

pub fn create_static(netlist: &mut Netlist, lbs: LogicByScope, options: &SchedOptions) {
    let func = make_top_function(netlist, "_eval_static", true);
    order_sequentially(netlist, func, lbs);
    split_check(netlist, func, options);
}

pub fn create_initial(netlist: &mut Netlist, lbs: LogicByScope) -> FuncId {
    let func = make_top_function(netlist, "_eval_initial", true);
    order_sequentially(netlist, func, lbs);
    func // Not split yet; shadow initializers are still to be appended
}

pub fn create_final(netlist: &mut Netlist, lbs: LogicByScope, options: &SchedOptions) {
    let func = make_top_function(netlist, "_eval_final", true);
    order_sequentially(netlist, func, lbs);
    split_check(netlist, func, options);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ActiveBlock, DType, EdgeKind, Expr, SenItem, SenTree};

    #[test]
    fn test_one_sub_function_per_scope_in_source_order() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let sub = netlist.add_scope("top.u0", top);
        let a = netlist.create_temp("a", DType::Bit);
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Static)));

        let block = |value| {
            ActiveBlock::new(
                sen,
                vec![Stmt::Assign {
                    lhs: Expr::VarRef(a),
                    rhs: Expr::Const { value, width: 1 },
                }],
            )
        };

        let mut lbs = LogicByScope::default();
        lbs.push(top, block(0));
        lbs.push(sub, block(1));
        lbs.push(top, block(2));

        let func = make_top_function(&mut netlist, "_eval_static", true);
        order_sequentially(&mut netlist, func, lbs);

        // Two scopes seen -> two calls, in first-sight order
        let calls: Vec<FuncId> = netlist
            .func(func)
            .stmts
            .iter()
            .map(|s| match s {
                Stmt::Call(id) => *id,
                other => panic!("expected call, got {}", other),
            })
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(netlist.func(calls[0]).name, "_eval_static__top");
        assert_eq!(netlist.func(calls[1]).name, "_eval_static__top__u0");
        // Both top-scope bodies landed in the first sub-function
        assert_eq!(netlist.func(calls[0]).stmts.len(), 2);
        assert_eq!(netlist.func(calls[1]).stmts.len(), 1);
        assert!(netlist.func(calls[0]).slow);
    }

    #[test]
    fn test_procedure_wrapper_is_unwrapped() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let a = netlist.create_temp("a", DType::Bit);
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Initial)));
        let inner = Stmt::Assign {
            lhs: Expr::VarRef(a),
            rhs: Expr::Const { value: 1, width: 1 },
        };
        let mut lbs = LogicByScope::default();
        lbs.push(
            top,
            ActiveBlock::new(sen, vec![Stmt::Block(vec![inner.clone()])]),
        );

        let func = create_initial(&mut netlist, lbs);
        let sub = match netlist.func(func).stmts[0] {
            Stmt::Call(id) => id,
            _ => unreachable!(),
        };
        assert_eq!(netlist.func(sub).stmts, vec![inner]);
    }
}
