use crate::ir::{
    DType, EdgeKind, Expr, FuncId, Netlist, SenItem, SenTree, SenTreeId, Stmt, VarId, bit_const,
    set_var, uint_const, var_ref, vec_any, vec_at,
};
use crate::sched::{SchedError, SchedOptions, SenExprBuilder, make_sub_function};
use indexmap::IndexMap;

/// Everything related to one trigger vector: the variable holding the flags,
/// the function recomputing them, the debug dump function, and the map from
/// each input sensitivity tree to the synthetic tree that fires on its flag.
pub struct TriggerKit {
    pub vec_var: VarId,
    pub compute_fn: FuncId,
    pub dump_fn: FuncId,
    pub map: IndexMap<SenTreeId, SenTreeId>,
}

impl TriggerKit {
    /// Creates a sensitivity tree firing when the given trigger flag is set.
    pub fn create_trigger_sen_tree(&self, netlist: &mut Netlist, index: u32) -> SenTreeId {
        netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::True,
            vec_at(self.vec_var, index),
        )))
    }

    /// Makes the given trigger fire on the first iteration of the loop
    /// counted by `counter`.
    pub fn add_first_iteration_trigger_assignment(
        &self,
        netlist: &mut Netlist,
        counter: VarId,
        index: u32,
    ) {
        let stmt = Stmt::Assign {
            lhs: vec_at(self.vec_var, index),
            rhs: Expr::Eq(Box::new(var_ref(counter)), Box::new(uint_const(0))),
        };
        netlist.func_mut(self.compute_fn).stmts.insert(0, stmt);
    }

    /// Latches the DPI export trigger flag into the vector and clears it.
    pub fn add_dpi_export_trigger_assignment(
        &self,
        netlist: &mut Netlist,
        dpi_var: VarId,
        index: u32,
    ) {
        let latch = Stmt::Assign {
            lhs: vec_at(self.vec_var, index),
            rhs: var_ref(dpi_var),
        };
        let clear = Stmt::Assign {
            lhs: var_ref(dpi_var),
            rhs: bit_const(0),
        };
        let stmts = &mut netlist.func_mut(self.compute_fn).stmts;
        stmts.insert(0, clear);
        stmts.insert(0, latch);
    }
}

fn add_debug(netlist: &mut Netlist, dump_fn: FuncId, vec_var: VarId, name: &str, index: u32, text: &str) {
    let mut message = format!(
        "VL_DBG_MSGF(\"         '{}' region trigger index {} is active",
        name, index
    );
    if !text.is_empty() {
        message.push_str(": ");
        message.push_str(text);
    }
    message.push_str("\\n\");");
    netlist.func_mut(dump_fn).stmts.push(Stmt::If {
        cond: vec_at(vec_var, index),
        then_stmts: vec![Stmt::Text(message)],
        else_stmts: Vec::new(),
    });
}

/// Creates the trigger vector and the related TriggerKit for the given
/// sensitivity trees. Extra triggers occupy indices `0..extra`; the tree at
/// input position `i` gets bit `extra + i`.
pub fn create_triggers(
    netlist: &mut Netlist,
    builder: &mut SenExprBuilder,
    options: &SchedOptions,
    sen_trees: &[SenTreeId],
    name: &str,
    extra: u32,
    slow: bool,
) -> Result<TriggerKit, SchedError> {
    let n_triggers = extra + sen_trees.len() as u32;

    // The trigger vector variable
    let vec_var = netlist.create_temp(
        &format!("__V{}Triggered", name),
        DType::TriggerVec { width: n_triggers },
    );

    // The trigger computation function
    let compute_fn = make_sub_function(netlist, &format!("_eval_triggers__{}", name), slow);

    // The trigger dump function (debug builds only)
    let dump_fn = make_sub_function(netlist, &format!("_dump_triggers__{}", name), slow);
    netlist.func_mut(dump_fn).ifdef = Some("VL_DEBUG".to_string());
    netlist.func_mut(dump_fn).stmts.push(Stmt::If {
        cond: vec_any(vec_var),
        then_stmts: Vec::new(),
        else_stmts: vec![Stmt::Text(
            "VL_DBG_MSGF(\"         No triggers active\\n\");".to_string(),
        )],
    });

    for index in 0..extra {
        add_debug(netlist, dump_fn, vec_var, name, index, "");
    }

    let mut map = IndexMap::new();
    let mut initial_trigs: Vec<Stmt> = Vec::new();
    let mut trigger_number = extra;
    for &sen in sen_trees {
        let tree = netlist.sen_tree(sen);
        if !tree.has_clocked() && !tree.has_hybrid() {
            return Err(SchedError::Malformed(format!(
                "cannot create trigger expression for non-clocked sensitivity {}",
                netlist.sen_tree_text(sen)
            )));
        }

        // The synthetic tree downstream logic is re-sensitized to
        let synthetic = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::True,
            vec_at(vec_var, trigger_number),
        )));
        map.insert(sen, synthetic);

        // The trigger computation
        let (expr, fired_at_initialization) = builder.build(netlist, sen)?;
        netlist.func_mut(compute_fn).stmts.push(Stmt::Assign {
            lhs: vec_at(vec_var, trigger_number),
            rhs: expr.unwrap_or_else(|| bit_const(0)),
        });

        // Initialization time trigger
        if fired_at_initialization || options.x_initial_edge {
            initial_trigs.push(Stmt::Assign {
                lhs: vec_at(vec_var, trigger_number),
                rhs: bit_const(1),
            });
        }

        let text = netlist.sen_tree_text(sen);
        add_debug(netlist, dump_fn, vec_var, name, trigger_number, &text);

        trigger_number += 1;
    }

    // The shadow update statements of this round
    let updates = builder.take_updates();
    netlist.func_mut(compute_fn).stmts.extend(updates);

    // One-shot guard latching the initialization time triggers
    if !initial_trigs.is_empty() {
        let did_init = netlist.create_temp(&format!("__V{}DidInit", name), DType::Bit);
        let mut then_stmts = vec![set_var(netlist, did_init, 1)];
        then_stmts.extend(initial_trigs);
        netlist.func_mut(compute_fn).stmts.push(Stmt::If {
            cond: Expr::Not(Box::new(var_ref(did_init))),
            then_stmts,
            else_stmts: Vec::new(),
        });
    }

    // Call the dump function when runtime debugging is enabled
    let stmts = &mut netlist.func_mut(compute_fn).stmts;
    stmts.push(Stmt::Text(
        "#ifdef VL_DEBUG\nif (VL_UNLIKELY(vlSymsp->_vm_contextp__->debug())) {".to_string(),
    ));
    stmts.push(Stmt::Call(dump_fn));
    stmts.push(Stmt::Text("}\n#endif".to_string()));

    Ok(TriggerKit {
        vec_var,
        compute_fn,
        dump_fn,
        map,
    })
}
