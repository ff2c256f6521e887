//! Solve orchestration: validate inputs, build the model, run the solver, decode.

use tracing::debug;

use perch_cluster::{Allocation, ClusterState};
use perch_common::config::Configuration;
use perch_common::error::{PlacementError, PlacementResult};
use perch_solver::{SolveParams, SolveStatus};

use crate::builder::{build_model, effective_rf};

/// Computes an allocation for the cluster snapshot under the given configuration.
///
/// The call is pure: it never mutates `state`. Recording the result back is the caller's
/// [`ClusterState::update_current_assignment`]. Two calls with identical inputs return
/// identical allocations.
///
/// # Errors
///
/// - [`PlacementError::RfExceedsCluster`] when a shard demands more replicas than there
///   are nodes, before any model work.
/// - [`PlacementError::InsufficientCapacity`] and [`PlacementError::TagsUnsatisfiable`]
///   for structurally hopeless instances, detected while building the model.
/// - [`PlacementError::InvalidModel`] when the solver rejects the assembled model.
/// - [`PlacementError::NotSolved`] when the search proves infeasibility or the timeout
///   expires without a solution.
pub fn solve(state: &ClusterState, config: &Configuration) -> PlacementResult<Allocation> {
    for (shard_id, shard) in state.shards() {
        if effective_rf(shard, config) > state.nodes().len() {
            return Err(PlacementError::RfExceedsCluster(*shard_id));
        }
    }

    let built = build_model(state, config)?;
    built
        .model
        .validate()
        .map_err(|error| PlacementError::InvalidModel(error.to_string()))?;

    let params = SolveParams {
        time_limit: config.search_timeout(),
        log_search_progress: config.verbose_logging(),
    };
    debug!(
        shards = state.shards().len(),
        nodes = state.nodes().len(),
        "solving placement model"
    );
    let response = built.model.solve(&params);
    match response.status {
        SolveStatus::Optimal | SolveStatus::Feasible => {
            let Some(solution) = response.solution else {
                return Err(PlacementError::NotSolved(
                    "solver reported success without a solution".to_owned(),
                ));
            };
            let mut allocation = Allocation::new();
            for (shard_id, vars) in &built.slots {
                let replicas: Vec<i64> = vars.iter().map(|var| solution.value(*var)).collect();
                let _ = allocation.insert(*shard_id, replicas);
            }
            Ok(allocation)
        }
        SolveStatus::ModelInvalid => Err(PlacementError::InvalidModel(
            "solver rejected the assembled model".to_owned(),
        )),
        SolveStatus::Infeasible => Err(PlacementError::NotSolved(
            "constraints admit no feasible assignment".to_owned(),
        )),
        SolveStatus::Unknown => Err(PlacementError::NotSolved(
            "search ended without a verdict within the timeout".to_owned(),
        )),
    }
}
