use crate::ir::{DType, Expr, FuncId, Netlist, Stmt, VarId, set_var, uint_const, var_ref, vec_any};
use crate::sched::{SchedError, SchedOptions};

/// Builds a fixed-point loop driven by a continuation flag:
/// ```text
/// continue = 1;
/// while (continue) { continue = 0; <body> }
/// ```
/// The body may set the flag to re-enter the loop.
pub fn build_loop(
    netlist: &mut Netlist,
    name: &str,
    build: impl FnOnce(&mut Netlist, VarId) -> Vec<Stmt>,
) -> Vec<Stmt> {
    let continue_var = netlist.create_temp(&format!("__V{}Continue", name), DType::Bit);
    let mut body = vec![set_var(netlist, continue_var, 0)];
    body.extend(build(netlist, continue_var));
    vec![
        set_var(netlist, continue_var, 1),
        Stmt::While {
            cond: var_ref(continue_var),
            body,
        },
    ]
}

/// Wraps `build_loop` into a region evaluation loop: per iteration the
/// triggers are recomputed and dumped, and if any fires the iteration count
/// is checked against the convergence limit, bumped, and the body runs.
/// Returns the iteration counter so first-iteration triggers can be tied to
/// `counter == 0`.
pub fn make_eval_loop(
    netlist: &mut Netlist,
    tag: &str,
    human_name: &str,
    options: &SchedOptions,
    trig_var: VarId,
    dump_fn: FuncId,
    compute_triggers: Vec<Stmt>,
    body: Vec<Stmt>,
) -> Result<(VarId, Vec<Stmt>), SchedError> {
    if !netlist.var(trig_var).dtype.is_trigger_vec() {
        return Err(SchedError::Malformed(format!(
            "'{}' is not a trigger vector",
            netlist.var(trig_var).name
        )));
    }

    let counter = netlist.create_temp(&format!("__V{}IterCount", tag), DType::UInt32);
    let limit = options.converge_limit;
    let top_file = netlist.top_file.clone();
    let top_line = netlist.top_line;

    let mut stmts = vec![set_var(netlist, counter, 0)];
    stmts.extend(build_loop(netlist, tag, |netlist, continue_var| {
        let mut loop_body = compute_triggers;

        let mut then_stmts = vec![set_var(netlist, continue_var, 1)];

        // If we exceeded the iteration limit, die
        then_stmts.push(Stmt::If {
            cond: Expr::Gt(Box::new(var_ref(counter)), Box::new(uint_const(limit as u64))),
            then_stmts: vec![
                Stmt::Text("#ifdef VL_DEBUG".to_string()),
                Stmt::Call(dump_fn),
                Stmt::Text("#endif".to_string()),
                Stmt::Text(format!(
                    "VL_FATAL_MT(\"{}\", {}, \"\", \"{} region did not converge.\");",
                    top_file, top_line, human_name
                )),
            ],
            else_stmts: Vec::new(),
        });

        // Increment the iteration count
        then_stmts.push(Stmt::Assign {
            lhs: var_ref(counter),
            rhs: Expr::Add(Box::new(var_ref(counter)), Box::new(uint_const(1))),
        });

        then_stmts.extend(body);

        // Invoke the body only when a trigger fired
        loop_body.push(Stmt::If {
            cond: vec_any(trig_var),
            then_stmts,
            else_stmts: Vec::new(),
        });
        loop_body
    }));

    Ok((counter, stmts))
}
