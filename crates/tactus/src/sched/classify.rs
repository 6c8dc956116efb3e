use crate::ir::{Netlist, ScopeId};
use crate::sched::{LogicClasses, SchedError};

/// Collect and classify all logic in the design by what triggers its
/// execution. Active blocks are drained from their scopes; empty blocks
/// (left over from earlier optimizations) are dropped.
pub fn gather_logic_classes(netlist: &mut Netlist) -> Result<LogicClasses, SchedError> {
    let mut result = LogicClasses::default();

    for idx in 0..netlist.scopes.len() {
        let scope = ScopeId(idx);
        let actives = std::mem::take(&mut netlist.scope_mut(scope).actives);
        for active in actives {
            if active.is_empty() {
                continue;
            }
            let tree = netlist.sen_tree(active.sense);
            let single = tree.items.len() == 1;
            if tree.has_static() {
                if !single {
                    return Err(SchedError::Malformed(
                        "static initializer with additional sensitivities".to_string(),
                    ));
                }
                result.statics.push(scope, active);
            } else if tree.has_initial() {
                if !single {
                    return Err(SchedError::Malformed(
                        "'initial' logic with additional sensitivities".to_string(),
                    ));
                }
                result.initials.push(scope, active);
            } else if tree.has_final() {
                if !single {
                    return Err(SchedError::Malformed(
                        "'final' logic with additional sensitivities".to_string(),
                    ));
                }
                result.finals.push(scope, active);
            } else if tree.has_combo() {
                if !single {
                    return Err(SchedError::Malformed(
                        "combinational logic with additional sensitivities".to_string(),
                    ));
                }
                result.comb.push(scope, active);
            } else if tree.has_hybrid() {
                result.hybrid.push(scope, active);
            } else if tree.has_clocked() {
                result.clocked.push(scope, active);
            } else {
                return Err(SchedError::Malformed(format!(
                    "unclassifiable sensitivity {}",
                    netlist.sen_tree_text(active.sense)
                )));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ActiveBlock, DType, EdgeKind, Expr, SenItem, SenTree, Stmt};

    fn assign(lhs: crate::ir::VarId, rhs: crate::ir::VarId) -> Stmt {
        Stmt::Assign {
            lhs: Expr::VarRef(lhs),
            rhs: Expr::VarRef(rhs),
        }
    }

    #[test]
    fn test_classification_is_total_and_exclusive() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let clk = netlist.create_temp("clk", DType::Bit);
        let a = netlist.create_temp("a", DType::Bit);
        let b = netlist.create_temp("b", DType::Bit);

        let statick = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Static)));
        let initial = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Initial)));
        let finalk = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Final)));
        let combo = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Combo)));
        let clocked = netlist.add_sen_tree(SenTree::single(SenItem::new(
            EdgeKind::PosEdge,
            Expr::VarRef(clk),
        )));

        for sen in [statick, initial, finalk, combo, clocked] {
            netlist
                .scope_mut(top)
                .actives
                .push(ActiveBlock::new(sen, vec![assign(a, b)]));
        }
        // An empty block must be removed, not classified
        netlist
            .scope_mut(top)
            .actives
            .push(ActiveBlock::new(combo, vec![]));

        let classes = gather_logic_classes(&mut netlist).unwrap();
        assert_eq!(classes.statics.len(), 1);
        assert_eq!(classes.initials.len(), 1);
        assert_eq!(classes.finals.len(), 1);
        assert_eq!(classes.comb.len(), 1);
        assert_eq!(classes.clocked.len(), 1);
        assert!(classes.hybrid.is_empty());
        assert!(netlist.scope(top).actives.is_empty());
    }

    #[test]
    fn test_reclassification_is_empty() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let a = netlist.create_temp("a", DType::Bit);
        let b = netlist.create_temp("b", DType::Bit);
        let combo = netlist.add_sen_tree(SenTree::single(SenItem::bare(EdgeKind::Combo)));
        netlist
            .scope_mut(top)
            .actives
            .push(ActiveBlock::new(combo, vec![assign(a, b)]));

        gather_logic_classes(&mut netlist).unwrap();
        let again = gather_logic_classes(&mut netlist).unwrap();
        assert!(again.statics.is_empty());
        assert!(again.comb.is_empty());
        assert!(again.clocked.is_empty());
    }

    #[test]
    fn test_preexisting_hybrid_goes_to_hybrid_bucket() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let a = netlist.create_temp("a", DType::Bit);
        let b = netlist.create_temp("b", DType::Bit);
        let sen = netlist.add_sen_tree(SenTree::new(vec![
            SenItem::new(EdgeKind::Hybrid, Expr::VarRef(a)),
            SenItem::new(EdgeKind::Hybrid, Expr::VarRef(b)),
        ]));
        netlist
            .scope_mut(top)
            .actives
            .push(ActiveBlock::new(sen, vec![assign(a, b)]));

        let classes = gather_logic_classes(&mut netlist).unwrap();
        assert_eq!(classes.hybrid.len(), 1);
        assert!(classes.comb.is_empty());
        assert!(classes.clocked.is_empty());
        assert_eq!(classes.hybrid.0[0].1.sense, sen);
    }

    #[test]
    fn test_multi_item_combo_is_rejected() {
        let mut netlist = Netlist::new("top", "top.v", 1);
        let top = netlist.top_scope;
        let a = netlist.create_temp("a", DType::Bit);
        let b = netlist.create_temp("b", DType::Bit);
        let sen = netlist.add_sen_tree(SenTree::new(vec![
            SenItem::bare(EdgeKind::Combo),
            SenItem::new(EdgeKind::Changed, Expr::VarRef(a)),
        ]));
        netlist
            .scope_mut(top)
            .actives
            .push(ActiveBlock::new(sen, vec![assign(a, b)]));

        assert!(matches!(
            gather_logic_classes(&mut netlist),
            Err(SchedError::Malformed(_))
        ));
    }
}
