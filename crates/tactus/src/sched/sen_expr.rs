use crate::ir::{DType, EdgeKind, Expr, FuncId, Netlist, SenItem, SenTreeId, Stmt, VarId, var_ref};
use crate::sched::SchedError;
use crate::{HashMap, HashSet};

/// Constructs the expressions used to compute whether a sensitivity tree has
/// triggered, maintaining one shadow 'previous value' variable per distinct
/// sensed expression. A single instance is shared by every trigger kit so the
/// shadows are shared across regions.
pub struct SenExprBuilder {
    /// The initialization function shadow initializers are appended to.
    init_fn: FuncId,
    has_events: bool,
    /// Update assignments accumulated for the current round.
    updates: Vec<Stmt>,
    /// The 'previous value' shadow per sensed expression.
    prev: HashMap<Expr, VarId>,
    /// Sensed expressions that already have an update in this round.
    has_update: HashSet<Expr>,
    unique_names: usize,
}

impl SenExprBuilder {
    pub fn new(init_fn: FuncId, has_events: bool) -> Self {
        Self {
            init_fn,
            has_events,
            updates: Vec::new(),
            prev: HashMap::default(),
            has_update: HashSet::default(),
            unique_names: 0,
        }
    }

    fn get_prev(&mut self, netlist: &mut Netlist, curr: &Expr) -> VarId {
        let prev = match self.prev.get(curr) {
            Some(var) => *var,
            None => {
                // For readability, use the scoped signal name when the
                // trigger is a plain variable reference
                let name = if let Expr::VarRef(var) = curr {
                    format!(
                        "__Vtrigrprev__{}__{}",
                        netlist.scope_dotless_name(netlist.var(*var).scope),
                        netlist.var(*var).name
                    )
                } else {
                    let n = self.unique_names;
                    self.unique_names += 1;
                    format!("__Vtrigprev__expression_{}", n)
                };
                let width = netlist.expr_width(curr);
                let dtype = if width == 1 {
                    DType::Bit
                } else {
                    DType::Logic { width }
                };
                let prev = netlist.create_temp(&name, dtype);
                self.prev.insert(curr.clone(), prev);

                netlist.func_mut(self.init_fn).stmts.push(Stmt::Assign {
                    lhs: var_ref(prev),
                    rhs: curr.clone(),
                });
                prev
            }
        };

        // Add the update if it does not exist yet in this round
        if self.has_update.insert(curr.clone()) {
            self.updates.push(Stmt::Assign {
                lhs: var_ref(prev),
                rhs: curr.clone(),
            });
        }

        prev
    }

    fn create_term(
        &mut self,
        netlist: &mut Netlist,
        item: &SenItem,
    ) -> Result<(Option<Expr>, bool), SchedError> {
        if item.edge == EdgeKind::Illegal {
            // Already diagnosed by an earlier pass
            return Ok((None, false));
        }
        let Some(curr) = item.expr.clone() else {
            return Err(SchedError::Malformed(format!(
                "{} sensitivity without a sensed expression",
                item.edge
            )));
        };
        let lsb = |e: Expr| Expr::Lsb(Box::new(e));

        match item.edge {
            EdgeKind::Changed | EdgeKind::Hybrid => {
                let prev = self.get_prev(netlist, &curr);
                let term = Expr::Neq(Box::new(curr), Box::new(var_ref(prev)));
                Ok((Some(term), true))
            }
            EdgeKind::BothEdge => {
                let prev = self.get_prev(netlist, &curr);
                let term = lsb(Expr::Xor(Box::new(curr), Box::new(var_ref(prev))));
                Ok((Some(term), false))
            }
            EdgeKind::PosEdge => {
                let prev = self.get_prev(netlist, &curr);
                let term = lsb(Expr::And(
                    Box::new(curr),
                    Box::new(Expr::Not(Box::new(var_ref(prev)))),
                ));
                Ok((Some(term), false))
            }
            EdgeKind::NegEdge => {
                let prev = self.get_prev(netlist, &curr);
                let term = lsb(Expr::And(
                    Box::new(Expr::Not(Box::new(curr))),
                    Box::new(var_ref(prev)),
                ));
                Ok((Some(term), false))
            }
            EdgeKind::Event => {
                if !self.has_events {
                    return Err(SchedError::Malformed(
                        "event sensitivity in a design without events".to_string(),
                    ));
                }
                let fired = Expr::MethodCall {
                    recv: Box::new(curr.clone()),
                    name: "isFired".to_string(),
                    args: Vec::new(),
                };
                // Latch the firing for this iteration and arrange clearing of
                // the triggered state before the next evaluation
                self.updates.push(Stmt::If {
                    cond: fired.clone(),
                    then_stmts: vec![
                        Stmt::MethodCall {
                            recv: curr.clone(),
                            name: "clearFired".to_string(),
                            args: Vec::new(),
                        },
                        Stmt::Text(format!(
                            "vlSymsp->enqueueTriggeredEventForClearing({});",
                            netlist.expr_text(&curr)
                        )),
                    ],
                    else_stmts: Vec::new(),
                });
                Ok((Some(fired), false))
            }
            edge => Err(SchedError::Malformed(format!(
                "cannot create trigger expression for {} sensitivity",
                edge
            ))),
        }
    }

    /// Returns the expression computing the trigger, and whether the trigger
    /// must fire on the very first evaluation.
    pub fn build(
        &mut self,
        netlist: &mut Netlist,
        sen: SenTreeId,
    ) -> Result<(Option<Expr>, bool), SchedError> {
        let items = netlist.sen_tree(sen).items.clone();
        let mut result: Option<Expr> = None;
        let mut fired_at_initialization = false;
        for item in &items {
            let (term, first) = self.create_term(netlist, item)?;
            if let Some(term) = term {
                result = Some(match result {
                    Some(prev) => Expr::Or(Box::new(prev), Box::new(term)),
                    None => term,
                });
                fired_at_initialization |= first;
            }
        }
        Ok((result, fired_at_initialization))
    }

    /// Ends the current round: returns the accumulated update assignments and
    /// clears the per-round dedup set.
    pub fn take_updates(&mut self) -> Vec<Stmt> {
        self.has_update.clear();
        std::mem::take(&mut self.updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SenTree;
    use crate::sched::make_top_function;

    fn setup() -> (Netlist, SenExprBuilder, VarId) {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let clk = netlist.create_temp("clk", DType::Bit);
        let init_fn = make_top_function(&mut netlist, "_eval_initial", true);
        (netlist, SenExprBuilder::new(init_fn, false), clk)
    }

    #[test]
    fn test_posedge_expression_shape() {
        let (mut netlist, mut builder, clk) = setup();
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::PosEdge,
            var_ref(clk),
        )));
        let (expr, first) = builder.build(&mut netlist, sen).unwrap();
        assert!(!first);
        let expr = expr.unwrap();
        // (clk & ~prev)[0]
        let text = netlist.expr_text(&expr);
        assert_eq!(text, "(clk & (~__Vtrigrprev__top__clk))[0]");
    }

    #[test]
    fn test_changed_fires_on_first_eval() {
        let (mut netlist, mut builder, clk) = setup();
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::Changed,
            var_ref(clk),
        )));
        let (_, first) = builder.build(&mut netlist, sen).unwrap();
        assert!(first);
    }

    #[test]
    fn test_shadow_is_shared_and_updates_dedup_per_round() {
        let (mut netlist, mut builder, clk) = setup();
        let pos = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::PosEdge,
            var_ref(clk),
        )));
        let neg = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::NegEdge,
            var_ref(clk),
        )));

        let vars_before = netlist.vars.len();
        builder.build(&mut netlist, pos).unwrap();
        builder.build(&mut netlist, neg).unwrap();
        // One shadow variable, one update, despite two clients
        assert_eq!(netlist.vars.len(), vars_before + 1);
        assert_eq!(builder.take_updates().len(), 1);

        // A new round sees the shadow again but creates no new variable
        builder.build(&mut netlist, pos).unwrap();
        assert_eq!(netlist.vars.len(), vars_before + 1);
        assert_eq!(builder.take_updates().len(), 1);
    }

    #[test]
    fn test_initializer_is_appended_once() {
        let (mut netlist, mut builder, clk) = setup();
        let init_fn = netlist.find_func("_eval_initial").unwrap();
        let pos = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::PosEdge,
            var_ref(clk),
        )));
        builder.build(&mut netlist, pos).unwrap();
        builder.take_updates();
        builder.build(&mut netlist, pos).unwrap();
        assert_eq!(netlist.func(init_fn).stmts.len(), 1);
    }

    #[test]
    fn test_event_without_events_is_rejected() {
        let (mut netlist, mut builder, clk) = setup();
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::new(EdgeKind::Event, var_ref(clk))));
        assert!(matches!(
            builder.build(&mut netlist, sen),
            Err(SchedError::Malformed(_))
        ));
    }

    #[test]
    fn test_composite_expression_gets_unique_name() {
        let (mut netlist, mut builder, clk) = setup();
        let d = netlist.create_temp("d", DType::Bit);
        let composite = Expr::And(Box::new(var_ref(clk)), Box::new(var_ref(d)));
        let sen = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::PosEdge,
            composite,
        )));
        builder.build(&mut netlist, sen).unwrap();
        let last = netlist.vars.last().unwrap();
        assert_eq!(last.name, "__Vtrigprev__expression_0");
    }
}
