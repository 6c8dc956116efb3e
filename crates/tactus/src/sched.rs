//! Scheduling: turns the classified logic of a flattened netlist into the
//! statically scheduled evaluation functions the emitter turns into code.
//!
//! At a high level, the process is:
//!  - Gather and classify all logic in the design based on what triggers it
//!  - Schedule static, initial and final logic classes in source order
//!  - Break combinational cycles by introducing hybrid logic
//!  - Create the 'settle' region that restores the combinational invariant
//!  - Partition the clocked and combinational (including hybrid) logic into
//!    pre/act/nba regions
//!  - Replicate combinational logic into the regions that invalidate it
//!  - Create the input combinational ('ico') loop
//!  - Create the pre/act/nba triggers
//!  - Create the 'act' and 'nba' region evaluation functions
//!  - Bolt it all together to create the '_eval' function

use crate::ir::{ActiveBlock, Func, FuncId, Netlist, ScopeId};
use crate::{HashMap, debug, order};
use thiserror::Error;

mod acyclic;
mod classify;
mod eval_loop;
mod partition;
mod regions;
mod replicate;
mod sen_expr;
mod sequential;
mod split;
mod trigger;

pub use acyclic::break_cycles;
pub use partition::partition;
pub use replicate::replicate_logic;
pub(crate) use sen_expr::SenExprBuilder;
pub use split::split_check;
pub use trigger::{TriggerKit, create_triggers};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedError {
    #[error("malformed sensitivity: {0}")]
    Malformed(String),
    #[error("unexpected variable reference '{0}' while cloning trigger sensitivities")]
    UnexpectedReference(String),
    #[error("no trigger sensitivity registered for {0}")]
    UnknownTrigger(String),
    #[error("scheduled netlist failed validation: {0}")]
    BrokenTree(String),
}

/// Scheduling configuration, taken from the global option bundle.
#[derive(Debug, Clone)]
pub struct SchedOptions {
    /// Node-count threshold for splitting generated functions; 0 disables.
    pub output_split_funcs: usize,
    /// Iteration bound enforced in every generated eval loop.
    pub converge_limit: u32,
    /// Allow the nba body function to run on the worker pool.
    pub mtasks: bool,
    /// Force every trigger high on the first evaluation.
    pub x_initial_edge: bool,
    /// Mark combinational top-level inputs for the SystemC emitter.
    pub system_c: bool,
    /// Collect per-stage statistics.
    pub stats: bool,
    /// Designs may contain named event sensitivities.
    pub has_events: bool,
    pub trace: debug::TraceOptions,
}

impl Default for SchedOptions {
    fn default() -> Self {
        Self {
            output_split_funcs: 0,
            converge_limit: 100,
            mtasks: false,
            x_initial_edge: false,
            system_c: false,
            stats: false,
            has_events: false,
            trace: Default::default(),
        }
    }
}

/// Per-stage statistics collected during scheduling.
#[derive(Debug, Clone, Default)]
pub struct SchedStats {
    pub entries: Vec<(String, u64)>,
    pub stages: Vec<String>,
}

impl SchedStats {
    fn stage(&mut self, name: &str) {
        self.stages.push(name.to_string());
    }

    fn add_stat(&mut self, name: &str, size: u64) {
        self.entries.push((format!("Scheduling, {}", name), size));
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Ordered multimap from scope to active block. Iteration order is insertion
/// order, which is observable in the emitted call sequences.
#[derive(Debug, Clone, Default)]
pub struct LogicByScope(pub Vec<(ScopeId, ActiveBlock)>);

impl LogicByScope {
    pub fn push(&mut self, scope: ScopeId, active: ActiveBlock) {
        self.0.push((scope, active));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn node_count(&self) -> u64 {
        self.0
            .iter()
            .flat_map(|(_, active)| &active.stmts)
            .map(|s| s.node_count() as u64)
            .sum()
    }
}

impl IntoIterator for LogicByScope {
    type Item = (ScopeId, ActiveBlock);
    type IntoIter = std::vec::IntoIter<(ScopeId, ActiveBlock)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Result of classifying all logic by what triggers its execution.
#[derive(Debug, Clone, Default)]
pub struct LogicClasses {
    pub statics: LogicByScope,
    pub initials: LogicByScope,
    pub finals: LogicByScope,
    pub comb: LogicByScope,
    pub clocked: LogicByScope,
    /// Filled by `break_cycles`: combinational logic that was part of a
    /// feedback cycle.
    pub hybrid: LogicByScope,
}

/// Clocked and combinational logic partitioned into evaluation regions.
#[derive(Debug, Clone, Default)]
pub struct LogicRegions {
    pub pre: LogicByScope,
    pub act: LogicByScope,
    pub nba: LogicByScope,
}

/// Combinational logic replicated into the regions that invalidate it.
#[derive(Debug, Clone, Default)]
pub struct LogicReplicas {
    pub ico: LogicByScope,
    pub act: LogicByScope,
    pub nba: LogicByScope,
}

pub(crate) fn make_sub_function(netlist: &mut Netlist, name: &str, slow: bool) -> FuncId {
    let scope = netlist.top_scope;
    netlist.add_func(Func {
        name: name.to_string(),
        scope,
        stmts: Vec::new(),
        slow,
        entry_point: false,
        parallel: false,
        ifdef: None,
    })
}

pub(crate) fn make_top_function(netlist: &mut Netlist, name: &str, slow: bool) -> FuncId {
    let func = make_sub_function(netlist, name, slow);
    netlist.func_mut(func).entry_point = true;
    func
}

/// Top level entry-point to scheduling.
pub fn schedule(netlist: &mut Netlist, options: &SchedOptions) -> Result<SchedStats, SchedError> {
    let mut stats = SchedStats::default();

    // Step 1. Gather and classify all logic in the design
    let mut classes = classify::gather_logic_classes(netlist)?;
    if options.stats {
        stats.stage("sched-gather");
        stats.add_stat("size of class: static", classes.statics.node_count());
        stats.add_stat("size of class: initial", classes.initials.node_count());
        stats.add_stat("size of class: final", classes.finals.node_count());
    }
    if options.trace.output_to_stdout && options.trace.classes {
        debug::dump_classes(netlist, &classes);
    }

    // Step 2. Schedule static, initial and final logic classes in source order
    sequential::create_static(netlist, std::mem::take(&mut classes.statics), options);
    if options.stats {
        stats.stage("sched-static");
    }

    let init_fn = sequential::create_initial(netlist, std::mem::take(&mut classes.initials));
    if options.stats {
        stats.stage("sched-initial");
    }

    sequential::create_final(netlist, std::mem::take(&mut classes.finals), options);
    if options.stats {
        stats.stage("sched-final");
    }

    // Step 3. Break combinational cycles by introducing hybrid logic.
    // break_cycles also removes the corresponding logic from the comb class.
    let broken = break_cycles(netlist, &mut classes.comb)?;
    classes.hybrid.0.extend(broken.0);
    if options.stats {
        stats.add_stat("size of class: clocked", classes.clocked.node_count());
        stats.add_stat("size of class: combinational", classes.comb.node_count());
        stats.add_stat("size of class: hybrid", classes.hybrid.node_count());
        stats.stage("sched-break-cycles");
    }

    // A single SenExprBuilder is shared across all regions, so only one set
    // of 'previous value' signals is created for edge/change detection.
    let mut sen_builder = SenExprBuilder::new(init_fn, options.has_events);

    // Step 4. Create the 'settle' region that restores the combinational
    // invariant
    regions::create_settle(netlist, &mut sen_builder, options, &classes)?;
    if options.stats {
        stats.stage("sched-settle");
    }

    // Step 5. Partition the clocked and combinational (including hybrid)
    // logic into pre/act/nba. All clocks (signals referenced in a sensitivity
    // tree) generated via a blocking assignment are computed within the act
    // region.
    let mut logic_regions = partition(netlist, classes.clocked, classes.comb, classes.hybrid);
    if options.stats {
        stats.add_stat("size of region: Active Pre", logic_regions.pre.node_count());
        stats.add_stat("size of region: Active", logic_regions.act.node_count());
        stats.add_stat("size of region: NBA", logic_regions.nba.node_count());
        stats.stage("sched-partition");
    }

    // Step 6. Replicate combinational logic
    let mut replicas = replicate_logic(netlist, &mut logic_regions);
    if options.stats {
        stats.add_stat("size of replicated logic: Input", replicas.ico.node_count());
        stats.add_stat("size of replicated logic: Active", replicas.act.node_count());
        stats.add_stat("size of replicated logic: NBA", replicas.nba.node_count());
        stats.stage("sched-replicate");
    }

    // Step 7. Create the input combinational logic loop
    let ico_loop = regions::create_input_comb_loop(
        netlist,
        &mut sen_builder,
        options,
        std::mem::take(&mut replicas.ico),
    )?;
    if options.stats {
        stats.stage("sched-create-ico");
    }

    // Step 8. Create the pre/act/nba triggers
    let dpi_export_trigger = netlist.dpi_export_trigger;

    // A design with no logic left needs no triggers and no loops, just the
    // entry point
    let no_logic = logic_regions.pre.is_empty()
        && logic_regions.act.is_empty()
        && logic_regions.nba.is_empty()
        && replicas.act.is_empty()
        && replicas.nba.is_empty()
        && ico_loop.is_none()
        && dpi_export_trigger.is_none();
    if no_logic {
        let eval_fn = make_top_function(netlist, "_eval", false);
        netlist.eval_fn = Some(eval_fn);
        split_check(netlist, init_fn, options);
        if options.trace.output_to_stdout && options.trace.final_tree {
            debug::dump_funcs(netlist);
        }
        netlist.validate().map_err(SchedError::BrokenTree)?;
        return Ok(stats);
    }

    let mut extra_triggers = 0u32;
    // One extra trigger for variables updated in DPI exports
    let dpi_export_trigger_index = dpi_export_trigger.map(|_| {
        let index = extra_triggers;
        extra_triggers += 1;
        index
    });

    let sen_trees = regions::get_sen_trees_used_by(
        netlist,
        &[&logic_regions.pre, &logic_regions.act, &logic_regions.nba],
    );
    let act_trig = create_triggers(
        netlist,
        &mut sen_builder,
        options,
        &sen_trees,
        "act",
        extra_triggers,
        false,
    )?;

    if let (Some(dpi_var), Some(index)) = (dpi_export_trigger, dpi_export_trigger_index) {
        act_trig.add_dpi_export_trigger_assignment(netlist, dpi_var, index);
    }

    let act_vec = act_trig.vec_var;
    let trig_dtype = netlist.var(act_vec).dtype;
    let pre_vec = netlist.create_temp("__VpreTriggered", trig_dtype);
    let nba_vec = netlist.create_temp("__VnbaTriggered", trig_dtype);

    let pre_map =
        regions::clone_map_with_new_trigger_references(netlist, &act_trig.map, act_vec, pre_vec)?;
    let nba_map =
        regions::clone_map_with_new_trigger_references(netlist, &act_trig.map, act_vec, nba_vec)?;
    if options.stats {
        stats.stage("sched-create-triggers");
    }

    // Running the act (or ico) region on multiple threads has so far always
    // been a net loss, so only the nba body is ever parallel.

    // Step 9. Create the 'act' region evaluation function
    regions::remap_sensitivities(netlist, &mut logic_regions.pre, &pre_map)?;
    regions::remap_sensitivities(netlist, &mut logic_regions.act, &act_trig.map)?;
    regions::remap_sensitivities(netlist, &mut replicas.act, &act_trig.map)?;

    let mut trig_to_sen_act = HashMap::default();
    regions::invert_and_merge_sen_tree_map(netlist, &mut trig_to_sen_act, &pre_map)?;
    regions::invert_and_merge_sen_tree_map(netlist, &mut trig_to_sen_act, &act_trig.map)?;

    let dpi_export_triggered =
        dpi_export_trigger_index.map(|index| act_trig.create_trigger_sen_tree(netlist, index));

    let act_fn = order::order(
        netlist,
        vec![
            std::mem::take(&mut logic_regions.pre),
            std::mem::take(&mut logic_regions.act),
            std::mem::take(&mut replicas.act),
        ],
        &trig_to_sen_act,
        "act",
        false,
        false,
        |netlist, var, out| {
            if netlist.var(var).written_by_dpi {
                if let Some(tree) = dpi_export_triggered {
                    out.push(tree);
                }
            }
        },
    )?;
    split_check(netlist, act_fn, options);
    if options.stats {
        stats.stage("sched-create-act");
    }

    // Step 10. Create the 'nba' region evaluation function
    regions::remap_sensitivities(netlist, &mut logic_regions.nba, &nba_map)?;
    regions::remap_sensitivities(netlist, &mut replicas.nba, &nba_map)?;

    let mut trig_to_sen_nba = HashMap::default();
    regions::invert_and_merge_sen_tree_map(netlist, &mut trig_to_sen_nba, &nba_map)?;

    let nba_fn = order::order(
        netlist,
        vec![
            std::mem::take(&mut logic_regions.nba),
            std::mem::take(&mut replicas.nba),
        ],
        &trig_to_sen_nba,
        "nba",
        options.mtasks,
        false,
        |netlist, var, out| {
            if netlist.var(var).written_by_dpi {
                if let Some(tree) = dpi_export_triggered {
                    out.push(tree);
                }
            }
        },
    )?;
    split_check(netlist, nba_fn, options);
    netlist.eval_nba_fn = Some(nba_fn); // Remembered for the liveness pass
    if options.stats {
        stats.stage("sched-create-nba");
    }

    // Step 11. Bolt it all together to create the '_eval' function
    regions::create_eval(
        netlist, options, ico_loop, &act_trig, pre_vec, nba_vec, act_fn, nba_fn,
    )?;

    split_check(netlist, init_fn, options);

    netlist.dpi_export_trigger = None;

    if options.trace.output_to_stdout && options.trace.final_tree {
        debug::dump_funcs(netlist);
    }
    netlist.validate().map_err(SchedError::BrokenTree)?;
    Ok(stats)
}
