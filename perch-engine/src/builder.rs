//! Translation of cluster state and configuration into a constraint model.
//!
//! The encoding keeps the search space small: one integer variable per replica slot whose
//! domain is the set of live node ids, rather than one boolean per (shard, node) pair.
//! Replica spread becomes all-different, tag affinity becomes width-1 forbidden tuples,
//! per-node load becomes a cumulative constraint over unit intervals on the node-id axis,
//! and churn becomes soft implication literals against the prior assignment.

use tracing::debug;

use perch_cluster::{ClusterState, Shard};
use perch_common::config::Configuration;
use perch_common::error::{PlacementError, PlacementResult};
use perch_common::ids::{NodeId, Resource, ShardId};
use perch_solver::{CpModel, Domain, IntVar, LinearExpr};

/// Assembled model plus the slot variables needed to decode a solution.
pub(crate) struct BuiltModel {
    pub model: CpModel,
    /// Per shard (ascending id), the slot variables in replica order.
    pub slots: Vec<(ShardId, Vec<IntVar>)>,
}

/// The shard's own replication factor, or the configuration fallback.
pub(crate) fn effective_rf(shard: &Shard, config: &Configuration) -> usize {
    shard
        .replication_factor()
        .unwrap_or_else(|| config.replication_factor())
}

/// Builds the model in a fixed order: decision variables, replica spread,
/// capacity/load-balancing, tag affinity, churn. Structural infeasibilities are refused
/// here, before any search runs.
pub(crate) fn build_model(
    state: &ClusterState,
    config: &Configuration,
) -> PlacementResult<BuiltModel> {
    let node_ids: Vec<NodeId> = state.nodes().keys().copied().collect();
    let node_domain = Domain::from_values(&node_ids);
    let mut model = CpModel::new("replica-placement");
    let mut objective = LinearExpr::new();

    let mut slots: Vec<(ShardId, Vec<IntVar>)> = Vec::with_capacity(state.shards().len());
    for (&shard_id, shard) in state.shards() {
        let rf = effective_rf(shard, config);
        let vars: Vec<IntVar> = (0..rf)
            .map(|slot| {
                model.new_int_var_from_domain(
                    node_domain.clone(),
                    format!("shard{shard_id}-replica{slot}"),
                )
            })
            .collect();
        slots.push((shard_id, vars));
    }

    for (_, vars) in &slots {
        if vars.len() > 1 {
            model.add_all_different(vars);
        }
    }

    if config.capacity_enabled() || config.load_balancing_enabled() {
        add_capacity_constraints(state, config, &mut model, &slots, &node_domain, &mut objective)?;
    }

    if config.tag_affinity_enabled() {
        add_tag_constraints(state, &mut model, &slots)?;
    }

    if config.churn_minimized() || config.max_churn().is_some() {
        add_churn_constraints(state, config, &mut model, &slots, &mut objective);
    }

    if config.load_balancing_enabled() || config.churn_minimized() {
        model.minimize(objective);
    }
    Ok(BuiltModel { model, slots })
}

/// Per resource: one ceiling variable bounds, through a cumulative constraint, the summed
/// demand of the unit intervals that replica slots project onto the node-id axis. Nodes
/// whose capacity sits below the ceiling bound carry a fixed filler interval making up the
/// difference, so a single ceiling expresses heterogeneous capacities.
fn add_capacity_constraints(
    state: &ClusterState,
    config: &Configuration,
    model: &mut CpModel,
    slots: &[(ShardId, Vec<IntVar>)],
    node_domain: &Domain,
    objective: &mut LinearExpr,
) -> PlacementResult<()> {
    for resource in Resource::ALL {
        let mut total_demand: i64 = 0;
        for ((_, vars), shard) in slots.iter().zip(state.shards().values()) {
            total_demand += shard.demand(resource) * vars.len() as i64;
        }
        if total_demand == 0 {
            continue;
        }

        // A node with no declared capacity is "unbounded enough" for this resource.
        let unconstrained = total_demand + 1;
        let mut raw_cap: i64 = 0;
        let mut aggregate: i64 = 0;
        for node in state.nodes().values() {
            let cap = node.capacity(resource).unwrap_or(unconstrained);
            raw_cap = raw_cap.max(cap);
            aggregate = aggregate.saturating_add(cap);
        }
        if aggregate < total_demand {
            return Err(PlacementError::InsufficientCapacity(resource));
        }

        let ceiling = model.new_int_var(0, raw_cap, format!("{resource}-ceiling"));
        let width = model.new_constant(1, format!("{resource}-unit-width"));
        let mut intervals = Vec::new();
        let mut demands = Vec::new();
        for ((shard_id, vars), shard) in slots.iter().zip(state.shards().values()) {
            let demand = shard.demand(resource);
            if demand == 0 {
                continue;
            }
            for (slot, var) in vars.iter().enumerate() {
                let end = model.new_int_var_from_domain(
                    node_domain.shifted(1),
                    format!("shard{shard_id}-replica{slot}-{resource}-end"),
                );
                intervals.push(model.new_interval(
                    *var,
                    end,
                    width,
                    format!("shard{shard_id}-replica{slot}-{resource}"),
                ));
                demands.push(demand);
            }
        }
        for node in state.nodes().values() {
            let cap = node.capacity(resource).unwrap_or(unconstrained);
            if cap >= raw_cap {
                continue;
            }
            let node_id = node.id();
            let start =
                model.new_constant(node_id, format!("node{node_id}-{resource}-filler-start"));
            let end =
                model.new_constant(node_id + 1, format!("node{node_id}-{resource}-filler-end"));
            intervals.push(model.new_interval(
                start,
                end,
                width,
                format!("node{node_id}-{resource}-filler"),
            ));
            demands.push(raw_cap - cap);
        }
        model.add_cumulative(ceiling, &intervals, &demands);
        if config.load_balancing_enabled() {
            objective.add_term(ceiling, 1);
        }
        debug!(
            %resource,
            total_demand,
            raw_cap,
            intervals = intervals.len(),
            "capacity constraints added"
        );
    }
    Ok(())
}

/// Per shard: nodes missing any of the shard's tags become width-1 forbidden tuples for
/// every slot. A shard no node can host is refused here instead of handing the solver an
/// infeasible model.
fn add_tag_constraints(
    state: &ClusterState,
    model: &mut CpModel,
    slots: &[(ShardId, Vec<IntVar>)],
) -> PlacementResult<()> {
    for ((shard_id, vars), shard) in slots.iter().zip(state.shards().values()) {
        if vars.is_empty() {
            continue;
        }
        let forbidden: Vec<Vec<i64>> = state
            .nodes()
            .values()
            .filter(|node| !shard.tags().is_subset(node.tags()))
            .map(|node| vec![node.id()])
            .collect();
        if forbidden.len() == state.nodes().len() {
            return Err(PlacementError::TagsUnsatisfiable(*shard_id));
        }
        if forbidden.is_empty() {
            continue;
        }
        for var in vars {
            model.add_forbidden_assignments(&[*var], forbidden.clone());
        }
    }
    Ok(())
}

/// Per prior entry that still names a live node: a keep literal implying the slot stays
/// put. Implications rather than hard equalities let the solver break prior assignments
/// only when other constraints force it; the objective counts the broken ones.
fn add_churn_constraints(
    state: &ClusterState,
    config: &Configuration,
    model: &mut CpModel,
    slots: &[(ShardId, Vec<IntVar>)],
    objective: &mut LinearExpr,
) {
    let mut broken = Vec::new();
    for (shard_id, vars) in slots {
        let Some(prior) = state.current_assignment().get(shard_id) else {
            continue;
        };
        if prior.len() != vars.len() {
            continue;
        }
        for (slot, (var, prior_node)) in vars.iter().zip(prior).enumerate() {
            if !state.nodes().contains_key(prior_node) {
                continue;
            }
            let keep = model.new_literal(format!("shard{shard_id}-replica{slot}-keep"));
            let mut stays = LinearExpr::new();
            stays.add_term(*var, 1);
            model
                .add_linear(stays, *prior_node, *prior_node)
                .only_enforce_if(keep);
            broken.push(keep.negate());
        }
    }
    if config.churn_minimized() {
        for &literal in &broken {
            objective.add_literal(literal);
        }
    }
    if let Some(max_churn) = config.max_churn() {
        model.add_at_most_k(&broken, max_churn);
    }
    debug!(tracked = broken.len(), "churn constraints added");
}
