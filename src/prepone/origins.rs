use crate::plan::{NodeId, NodeKind, Plan};
use traversal::DftPre;

/// Finds the nodes where rows first enter the plan: index scans, and the first of any chain of
/// table lookups that is not fed by an index scan.
pub(super) fn find_origins(plan: &Plan) -> Vec<NodeId> {
    let roots = plan.roots();
    roots
        .iter()
        .flat_map(|root| DftPre::new(root, move |&id| plan.inputs(id).iter()))
        .map(|(_, &id)| id)
        .filter(|&id| is_origin(plan, id))
        .collect()
}

fn is_origin(plan: &Plan, id: NodeId) -> bool {
    match plan.kind(id) {
        NodeKind::IndexScan { .. } => true,
        NodeKind::TableLookup { .. } => !plan.input(id).map_or(false, |input| {
            matches!(
                plan.kind(input),
                NodeKind::TableLookup { .. } | NodeKind::IndexScan { .. }
            )
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::JoinType;
    use crate::test_utils::TestSchema;

    #[test]
    fn test_find_origins() {
        let schema = TestSchema::new();
        let customer = schema.source("customer");
        let orders = schema.source("orders");
        let item = schema.source("item");

        let mut plan = Plan::new();
        let outer = plan.table_lookup(None, vec![customer.clone()]).unwrap();
        let index = plan.index_scan("orders_cid", vec![Some(orders.col("cid"))]);
        let orders_lookup = plan.table_lookup(Some(index), vec![orders.clone()]).unwrap();
        let item_lookup = plan
            .table_lookup(Some(orders_lookup), vec![item.clone()])
            .unwrap();
        let join = plan.map_join(outer, item_lookup, JoinType::Inner).unwrap();
        let sorted = plan.other("Sort", vec![join]).unwrap();
        // A lookup fed by something other than a scan starts a new chain.
        let reread = plan.table_lookup(Some(sorted), vec![customer]).unwrap();
        plan.other("Project", vec![reread]).unwrap();

        assert_eq!(find_origins(&plan), vec![reread, outer, index]);
    }

    #[test]
    fn test_no_origins() {
        let mut plan = Plan::new();
        let values = plan.other("Values", vec![]).unwrap();
        plan.other("Project", vec![values]).unwrap();
        assert!(find_origins(&plan).is_empty());
    }
}
