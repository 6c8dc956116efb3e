use crate::ir::{FuncId, Netlist, SenTreeId, Stmt, VarId, var_ref};
use crate::order::order;
use crate::sched::{
    LogicByScope, LogicClasses, SchedError, SchedOptions, SenExprBuilder, TriggerKit,
    create_triggers, eval_loop::make_eval_loop, make_top_function, split_check,
};
use crate::{HashMap, HashSet};
use indexmap::IndexMap;

/// Distinct clocked/hybrid sensitivity trees of the given logic, in first-use
/// order. Combinational sensitivities never produce trigger bits.
pub(crate) fn get_sen_trees_used_by(
    netlist: &Netlist,
    lbss: &[&LogicByScope],
) -> Vec<SenTreeId> {
    let mut seen = HashSet::default();
    let mut result = Vec::new();
    for lbs in lbss {
        for (_, active) in &lbs.0 {
            if !seen.insert(active.sense) {
                continue;
            }
            let tree = netlist.sen_tree(active.sense);
            if tree.has_clocked() || tree.has_hybrid() {
                result.push(active.sense);
            }
        }
    }
    result
}

/// Redirects the sensitivity of every non-combinational block onto the
/// synthetic trigger tree the map assigns to it.
pub(crate) fn remap_sensitivities(
    netlist: &Netlist,
    lbs: &mut LogicByScope,
    map: &IndexMap<SenTreeId, SenTreeId>,
) -> Result<(), SchedError> {
    for (_, active) in &mut lbs.0 {
        if netlist.sen_tree(active.sense).has_combo() {
            continue;
        }
        active.sense = *map
            .get(&active.sense)
            .ok_or_else(|| SchedError::UnknownTrigger(netlist.sen_tree_text(active.sense)))?;
    }
    Ok(())
}

/// Merges the inverse of a trigger map (synthetic tree -> original tree) into
/// `result`, for the ordering pass.
pub(crate) fn invert_and_merge_sen_tree_map(
    netlist: &Netlist,
    result: &mut HashMap<SenTreeId, SenTreeId>,
    map: &IndexMap<SenTreeId, SenTreeId>,
) -> Result<(), SchedError> {
    for (&original, &synthetic) in map {
        if netlist.sen_tree(synthetic).items.len() != 1 {
            return Err(SchedError::Malformed(
                "synthetic trigger sensitivity should be a single term".to_string(),
            ));
        }
        result.insert(synthetic, original);
    }
    Ok(())
}

/// Clones a trigger map, retargeting every trigger-vector reference in the
/// synthetic trees from `from_vec` to `to_vec`. The clones get fresh trees so
/// the pre/act/nba vectors share one bit layout.
pub(crate) fn clone_map_with_new_trigger_references(
    netlist: &mut Netlist,
    map: &IndexMap<SenTreeId, SenTreeId>,
    from_vec: VarId,
    to_vec: VarId,
) -> Result<IndexMap<SenTreeId, SenTreeId>, SchedError> {
    let mut result = IndexMap::new();
    for (&original, &synthetic) in map {
        let mut tree = netlist.sen_tree(synthetic).clone();
        let mut unexpected = None;
        for item in &mut tree.items {
            if let Some(expr) = &mut item.expr {
                expr.map_var_refs(&mut |var| {
                    if var == from_vec {
                        to_vec
                    } else {
                        unexpected = Some(var);
                        var
                    }
                });
            }
        }
        if let Some(var) = unexpected {
            return Err(SchedError::UnexpectedReference(
                netlist.var(var).name.clone(),
            ));
        }
        let clone = netlist.add_sen_tree(tree);
        result.insert(original, clone);
    }
    Ok(result)
}

/// Replaces whole-word occurrences of `from` with `to`.
fn replace_word(text: &str, from: &str, to: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        let boundary_before = i == 0 || !is_word(bytes[i - 1]);
        if boundary_before && rest.starts_with(from) {
            let end = i + from.len();
            let boundary_after = end == text.len() || !is_word(bytes[end]);
            if boundary_after {
                result.push_str(to);
                i = end;
                continue;
            }
        }
        let ch = rest.chars().next().unwrap();
        result.push(ch);
        i += ch.len_utf8();
    }
    result
}

fn rewrite_texts(stmts: &mut Vec<Stmt>, f: &impl Fn(&str) -> String) {
    for stmt in stmts {
        match stmt {
            Stmt::Text(text) => *text = f(text),
            Stmt::If {
                then_stmts,
                else_stmts,
                ..
            } => {
                rewrite_texts(then_stmts, f);
                rewrite_texts(else_stmts, f);
            }
            Stmt::While { body, .. } | Stmt::Block(body) => rewrite_texts(body, f),
            _ => {}
        }
    }
}

/// Orders the combinational and hybrid logic into the settle fixed-point that
/// restores the combinational invariant. Omitted entirely when the design has
/// neither.
pub(crate) fn create_settle(
    netlist: &mut Netlist,
    builder: &mut SenExprBuilder,
    options: &SchedOptions,
    classes: &LogicClasses,
) -> Result<(), SchedError> {
    // Ordering is destructive, so operate on copies; the originals are still
    // needed for the act/nba regions
    let comb = classes.comb.clone();
    let mut hybrid = classes.hybrid.clone();

    // Nothing to do if there is no logic. While this is rare in real designs,
    // it reduces noise in small tests.
    if comb.is_empty() && hybrid.is_empty() {
        return Ok(());
    }

    let func = make_top_function(netlist, "_eval_settle", true);

    // One extra trigger denoting the first iteration of the settle loop
    const FIRST_ITERATION_TRIGGER: u32 = 0;
    const EXTRA_TRIGGERS: u32 = FIRST_ITERATION_TRIGGER + 1;

    let sen_trees = get_sen_trees_used_by(netlist, &[&comb, &hybrid]);
    let trig = create_triggers(
        netlist,
        builder,
        options,
        &sen_trees,
        "stl",
        EXTRA_TRIGGERS,
        true,
    )?;

    // Comb has no mapped sensitivities, so only the hybrid is remapped
    remap_sensitivities(netlist, &mut hybrid, &trig.map)?;

    let mut trig_to_sen = HashMap::default();
    invert_and_merge_sen_tree_map(netlist, &mut trig_to_sen, &trig.map)?;

    // The first trigger stands in for "all inputs changed"
    let input_changed = trig.create_trigger_sen_tree(netlist, FIRST_ITERATION_TRIGGER);

    let stl_fn = order(
        netlist,
        vec![comb, hybrid],
        &trig_to_sen,
        "stl",
        false,
        true,
        |_, _, out| out.push(input_changed),
    )?;
    split_check(netlist, stl_fn, options);

    let (counter, loop_stmts) = make_eval_loop(
        netlist,
        "stl",
        "Settle",
        options,
        trig.vec_var,
        trig.dump_fn,
        vec![Stmt::Call(trig.compute_fn)],
        vec![Stmt::Call(stl_fn)],
    )?;

    trig.add_first_iteration_trigger_assignment(netlist, counter, FIRST_ITERATION_TRIGGER);

    netlist.func_mut(func).stmts.extend(loop_stmts);
    Ok(())
}

/// Builds the input combinational ('ico') loop over the replicated logic
/// sensitive to top-level inputs. Returns the loop statements to embed at the
/// head of `_eval`, or None when there is no such logic.
pub(crate) fn create_input_comb_loop(
    netlist: &mut Netlist,
    builder: &mut SenExprBuilder,
    options: &SchedOptions,
    mut logic: LogicByScope,
) -> Result<Option<Vec<Stmt>>, SchedError> {
    if logic.is_empty() {
        return Ok(None);
    }

    // SystemC only: top level inputs feeding combinational logic must be
    // marked so they can be made sc_sensitive
    if options.system_c {
        let mut reads = HashSet::default();
        for (_, active) in &logic.0 {
            for stmt in &active.stmts {
                stmt.collect_reads(&mut reads);
            }
        }
        for var in reads {
            if netlist.var(var).scope == netlist.top_scope && netlist.var(var).is_input {
                netlist.var_mut(var).sc_sensitive = true;
            }
        }
    }

    let dpi_export_trigger = netlist.dpi_export_trigger;

    let mut extra_triggers = 0u32;
    let first_iteration_trigger = extra_triggers;
    extra_triggers += 1;
    let dpi_export_trigger_index = dpi_export_trigger.map(|_| {
        let index = extra_triggers;
        extra_triggers += 1;
        index
    });

    let sen_trees = get_sen_trees_used_by(netlist, &[&logic]);
    let trig = create_triggers(
        netlist,
        builder,
        options,
        &sen_trees,
        "ico",
        extra_triggers,
        false,
    )?;

    if let (Some(dpi_var), Some(index)) = (dpi_export_trigger, dpi_export_trigger_index) {
        trig.add_dpi_export_trigger_assignment(netlist, dpi_var, index);
    }

    remap_sensitivities(netlist, &mut logic, &trig.map)?;

    let mut trig_to_sen = HashMap::default();
    invert_and_merge_sen_tree_map(netlist, &mut trig_to_sen, &trig.map)?;

    let input_changed = trig.create_trigger_sen_tree(netlist, first_iteration_trigger);
    let dpi_export_triggered =
        dpi_export_trigger_index.map(|index| trig.create_trigger_sen_tree(netlist, index));

    let top_scope = netlist.top_scope;
    let ico_fn = order(
        netlist,
        vec![logic],
        &trig_to_sen,
        "ico",
        false,
        false,
        |netlist, var, out| {
            if netlist.var(var).scope == top_scope && netlist.var(var).is_input {
                out.push(input_changed);
            }
            if netlist.var(var).written_by_dpi {
                if let Some(tree) = dpi_export_triggered {
                    out.push(tree);
                }
            }
        },
    )?;
    split_check(netlist, ico_fn, options);

    let (counter, loop_stmts) = make_eval_loop(
        netlist,
        "ico",
        "Input combinational",
        options,
        trig.vec_var,
        trig.dump_fn,
        vec![Stmt::Call(trig.compute_fn)],
        vec![Stmt::Call(ico_fn)],
    )?;

    trig.add_first_iteration_trigger_assignment(netlist, counter, first_iteration_trigger);

    Ok(Some(loop_stmts))
}

/// Bolts the regions together into the top level `_eval` function: the ico
/// loop first, then the nba eval loop whose trigger computation runs the
/// nested active eval loop to its fixed point.
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_eval(
    netlist: &mut Netlist,
    options: &SchedOptions,
    ico_loop: Option<Vec<Stmt>>,
    act_trig: &TriggerKit,
    pre_vec: VarId,
    nba_vec: VarId,
    act_fn: FuncId,
    nba_fn: FuncId,
) -> Result<(), SchedError> {
    let func = make_top_function(netlist, "_eval", false);
    netlist.eval_fn = Some(func);

    // The nba trigger dump function is the act one with the references
    // retargeted to the nba trigger vector
    let act_vec = act_trig.vec_var;
    let mut nba_dump = netlist.func(act_trig.dump_fn).clone();
    nba_dump.name = "_dump_triggers__nba".to_string();
    let mut unexpected = None;
    for stmt in &mut nba_dump.stmts {
        stmt.map_var_refs(&mut |var| {
            if var == act_vec {
                nba_vec
            } else {
                unexpected = Some(var);
                var
            }
        });
    }
    if let Some(var) = unexpected {
        return Err(SchedError::UnexpectedReference(
            netlist.var(var).name.clone(),
        ));
    }
    rewrite_texts(&mut nba_dump.stmts, &|text| replace_word(text, "act", "nba"));
    let nba_dump_fn = netlist.add_func(nba_dump);

    // The active eval loop. The pre triggers are computed, then the active
    // flags are latched under the nba flags, then the body runs; this order
    // is load-bearing.
    let act_body = vec![
        Stmt::MethodCall {
            recv: var_ref(pre_vec),
            name: "andNot".to_string(),
            args: vec![var_ref(act_vec), var_ref(nba_vec)],
        },
        Stmt::MethodCall {
            recv: var_ref(nba_vec),
            name: "set".to_string(),
            args: vec![var_ref(act_vec)],
        },
        Stmt::Call(act_fn),
    ];
    let (_, active_eval_loop) = make_eval_loop(
        netlist,
        "act",
        "Active",
        options,
        act_vec,
        act_trig.dump_fn,
        vec![Stmt::Call(act_trig.compute_fn)],
        act_body,
    )?;

    // The nba eval loop runs the active loop to its fixed point as its
    // trigger computation, collecting the latched nba flags
    let mut nba_compute = vec![Stmt::MethodCall {
        recv: var_ref(nba_vec),
        name: "clear".to_string(),
        args: Vec::new(),
    }];
    nba_compute.extend(active_eval_loop);
    let (_, nba_eval_loop) = make_eval_loop(
        netlist,
        "nba",
        "NBA",
        options,
        nba_vec,
        nba_dump_fn,
        nba_compute,
        vec![Stmt::Call(nba_fn)],
    )?;

    if let Some(ico_loop) = ico_loop {
        netlist.func_mut(func).stmts.extend(ico_loop);
    }
    netlist.func_mut(func).stmts.extend(nba_eval_loop);
    Ok(())
}
