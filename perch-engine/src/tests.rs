use std::collections::BTreeMap;
use std::time::Duration;

use googletest::prelude::*;
use rstest::rstest;

use crate::{
    Allocation, ClusterState, Configuration, PlacementError, Resource, remove_all_tags_of_node,
    solve, with_capacity, with_churn_minimized, with_demand_of_shard, with_load_balancing,
    with_max_churn, with_replication_factor, with_resource_of_node, with_search_timeout,
    with_tag_affinity, with_tags_of_node, with_tags_of_shard, with_verbose_logging,
};

fn default_config() -> Configuration {
    Configuration::new(vec![]).expect("empty option list is valid")
}

fn config_with(opts: Vec<crate::ConfigOption>) -> Configuration {
    Configuration::new(opts).expect("test options are valid")
}

/// Every replica list must hold distinct, currently-known node ids.
fn assert_spread(allocation: &Allocation, state: &ClusterState) {
    for replicas in allocation.values() {
        let mut seen = std::collections::HashSet::new();
        for node in replicas {
            assert_that!(state.nodes().contains_key(node), eq(true));
            assert_that!(seen.insert(*node), eq(true));
        }
    }
}

/// Per-node consumption of one resource under an allocation.
fn node_loads(state: &ClusterState, allocation: &Allocation, resource: Resource) -> BTreeMap<i64, i64> {
    let mut loads: BTreeMap<i64, i64> = state.nodes().keys().map(|&id| (id, 0)).collect();
    for (shard_id, replicas) in allocation {
        let demand = state.shards()[shard_id].demand(resource);
        for node in replicas {
            *loads.entry(*node).or_insert(0) += demand;
        }
    }
    loads
}

#[rstest]
fn replica_spread_over_a_large_cluster() {
    let mut state = ClusterState::new();
    for node in 0..64 {
        state.add_node(node, vec![]).expect("node is valid");
    }
    for shard in 0..20 {
        state.add_shard(shard, 3, vec![]).expect("shard is valid");
    }

    let allocation = solve(&state, &default_config()).expect("placement is feasible");
    assert_that!(allocation.len(), eq(20));
    for replicas in allocation.values() {
        assert_that!(replicas.len(), eq(3));
        for node in replicas {
            assert_that!((0..64).contains(node), eq(true));
        }
    }
    assert_spread(&allocation, &state);
}

#[rstest]
fn replication_factor_beyond_cluster_size_is_refused() {
    let mut state = ClusterState::new();
    state.add_node(0, vec![]).expect("node is valid");
    for shard in 0..20 {
        state.add_shard(shard, 3, vec![]).expect("shard is valid");
    }

    let result = solve(&state, &default_config());
    assert_that!(result, eq(&Err(PlacementError::RfExceedsCluster(0))));
}

#[rstest]
fn tag_affinity_pins_each_shard_to_its_only_match() {
    let mut state = ClusterState::new();
    state
        .add_node(0, vec![with_tags_of_node(["a=ant", "b=bus", "b=bin", "d=dog"])])
        .expect("node is valid");
    state
        .add_node(1, vec![with_tags_of_node(["a=all", "b=bus", "e=eat", "f=fun"])])
        .expect("node is valid");
    state
        .add_node(2, vec![with_tags_of_node(["a=art", "b=bin", "e=ear", "f=fur"])])
        .expect("node is valid");
    state
        .add_shard(0, 1, vec![with_tags_of_shard(["a=art"])])
        .expect("shard is valid");
    state
        .add_shard(1, 1, vec![with_tags_of_shard(["e=eat"])])
        .expect("shard is valid");
    state
        .add_shard(2, 1, vec![with_tags_of_shard(["a=ant", "b=bus"])])
        .expect("shard is valid");

    let allocation = solve(&state, &config_with(vec![with_tag_affinity(true)]))
        .expect("every shard has a matching node");
    let expected = Allocation::from([(0, vec![2]), (1, vec![1]), (2, vec![0])]);
    assert_that!(allocation, eq(&expected));
}

fn capacity_cluster() -> ClusterState {
    let mut state = ClusterState::new();
    for (node, capacity) in [(0, 70), (1, 80), (2, 90)] {
        state
            .add_node(node, vec![with_resource_of_node(Resource::Disk, capacity)])
            .expect("node is valid");
    }
    state
}

#[rstest]
fn capacity_with_a_single_viable_packing() {
    let mut state = capacity_cluster();
    let demands = [85, 75, 12, 11, 10, 9, 8, 7, 6, 6];
    for (shard, demand) in demands.into_iter().enumerate() {
        state
            .add_shard(
                shard as i64,
                1,
                vec![with_demand_of_shard(Resource::Disk, demand)],
            )
            .expect("shard is valid");
    }

    let allocation =
        solve(&state, &config_with(vec![with_capacity(true)])).expect("packing exists");
    let mut expected = Allocation::from([(0, vec![2]), (1, vec![1])]);
    for shard in 2..10 {
        let _ = expected.insert(shard, vec![0]);
    }
    assert_that!(allocation, eq(&expected));

    let loads = node_loads(&state, &allocation, Resource::Disk);
    for (node, load) in loads {
        let capacity = state.nodes()[&node]
            .capacity(Resource::Disk)
            .expect("every node declares disk capacity");
        assert_that!(load <= capacity, eq(true));
    }
}

#[rstest]
fn oversized_replication_factor_fails_even_with_capacity() {
    let mut state = capacity_cluster();
    for (shard, demand) in [25, 10, 12, 11, 10].into_iter().enumerate() {
        state
            .add_shard(
                shard as i64,
                5,
                vec![with_demand_of_shard(Resource::Disk, demand)],
            )
            .expect("shard is valid");
    }

    let result = solve(&state, &config_with(vec![with_capacity(true)]));
    assert_that!(result, eq(&Err(PlacementError::RfExceedsCluster(0))));
}

#[rstest]
fn load_balancing_keeps_every_node_near_the_ideal_share() {
    let mut state = ClusterState::new();
    for node in 0..6 {
        state
            .add_node(
                node,
                vec![
                    with_resource_of_node(Resource::Disk, 10_000),
                    with_resource_of_node(Resource::Qps, 10_000),
                ],
            )
            .expect("node is valid");
    }
    for shard in 0..12 {
        state
            .add_shard(
                shard,
                1,
                vec![
                    with_demand_of_shard(Resource::Disk, shard),
                    with_demand_of_shard(Resource::Qps, shard),
                ],
            )
            .expect("shard is valid");
    }

    let allocation = solve(
        &state,
        &config_with(vec![with_capacity(true), with_load_balancing(true)]),
    )
    .expect("balanced placement exists");
    assert_spread(&allocation, &state);

    // Total demand is 66 over 6 nodes, so the ideal share is 11 per node and resource.
    for resource in Resource::ALL {
        for (_, load) in node_loads(&state, &allocation, resource) {
            assert_that!(load * 10 >= 88, eq(true));
            assert_that!(load * 10 <= 132, eq(true));
        }
    }
}

fn tagged_cluster(nodes: i64, shards: i64) -> ClusterState {
    let mut state = ClusterState::new();
    for node in 0..nodes {
        state
            .add_node(node, vec![with_tags_of_node(["tag=a"])])
            .expect("node is valid");
    }
    for shard in 0..shards {
        state
            .add_shard(shard, 3, vec![with_tags_of_shard(["tag=a"])])
            .expect("shard is valid");
    }
    state
}

#[rstest]
fn capped_churn_with_shrunken_tag_coverage_is_refused() {
    let mut state = tagged_cluster(6, 3);
    let config = config_with(vec![with_tag_affinity(true)]);
    let first = solve(&state, &config).expect("initial placement is feasible");
    state.update_current_assignment(first);

    for node in 1..6 {
        let hit = state
            .update_node(node, vec![remove_all_tags_of_node()])
            .expect("option is valid");
        assert_that!(hit, eq(true));
    }

    let config = config_with(vec![
        with_tag_affinity(true),
        with_churn_minimized(true),
        with_max_churn(1),
    ]);
    let result = solve(&state, &config);
    assert_that!(
        matches!(result, Err(PlacementError::NotSolved(_))),
        eq(true)
    );
}

#[rstest]
fn minimized_churn_preserves_a_still_feasible_prior() {
    let mut state = tagged_cluster(6, 3);
    let config = config_with(vec![with_tag_affinity(true)]);
    let first = solve(&state, &config).expect("initial placement is feasible");
    state.update_current_assignment(first.clone());

    let config = config_with(vec![with_tag_affinity(true), with_churn_minimized(true)]);
    let second = solve(&state, &config).expect("prior stays feasible");
    assert_that!(second, eq(&first));
}

#[rstest]
fn churn_cap_blocks_a_forced_move_and_permits_it_when_raised() {
    let mut state = ClusterState::new();
    state.add_node(0, vec![]).expect("node is valid");
    state
        .add_node(1, vec![with_tags_of_node(["disk=ssd"])])
        .expect("node is valid");
    state.add_shard(0, 1, vec![]).expect("shard is valid");

    let first = solve(&state, &default_config()).expect("placement is feasible");
    assert_that!(first, eq(&Allocation::from([(0, vec![0])])));
    state.update_current_assignment(first);

    let hit = state
        .update_shard(0, vec![with_tags_of_shard(["disk=ssd"])])
        .expect("option is valid");
    assert_that!(hit, eq(true));

    let capped = config_with(vec![with_tag_affinity(true), with_max_churn(0)]);
    let result = solve(&state, &capped);
    assert_that!(
        matches!(result, Err(PlacementError::NotSolved(_))),
        eq(true)
    );

    let relaxed = config_with(vec![with_tag_affinity(true), with_max_churn(1)]);
    let moved = solve(&state, &relaxed).expect("one move suffices");
    assert_that!(moved, eq(&Allocation::from([(0, vec![1])])));
}

#[rstest]
fn aggregate_demand_beyond_aggregate_capacity_is_refused_eagerly() {
    let mut state = ClusterState::new();
    for node in 0..3 {
        state
            .add_node(node, vec![with_resource_of_node(Resource::Disk, 10)])
            .expect("node is valid");
    }
    for shard in 0..2 {
        state
            .add_shard(shard, 1, vec![with_demand_of_shard(Resource::Disk, 100)])
            .expect("shard is valid");
    }

    let result = solve(&state, &config_with(vec![with_capacity(true)]));
    assert_that!(
        result,
        eq(&Err(PlacementError::InsufficientCapacity(Resource::Disk)))
    );
}

#[rstest]
fn shard_with_tags_no_node_covers_is_refused_eagerly() {
    let mut state = ClusterState::new();
    for node in 0..3 {
        state
            .add_node(node, vec![with_tags_of_node(["zone=east"])])
            .expect("node is valid");
    }
    state
        .add_shard(7, 1, vec![with_tags_of_shard(["zone=west"])])
        .expect("shard is valid");

    let result = solve(&state, &config_with(vec![with_tag_affinity(true)]));
    assert_that!(result, eq(&Err(PlacementError::TagsUnsatisfiable(7))));
}

#[rstest]
fn identical_inputs_produce_identical_allocations() {
    let mut state = ClusterState::new();
    for node in 0..8 {
        state.add_node(node, vec![]).expect("node is valid");
    }
    for shard in 0..5 {
        state.add_shard(shard, 3, vec![]).expect("shard is valid");
    }
    let config = default_config();

    let first = solve(&state, &config).expect("placement is feasible");
    let second = solve(&state, &config).expect("placement is feasible");
    assert_that!(first, eq(&second));
}

#[rstest]
fn dropping_the_capacity_option_never_breaks_a_feasible_instance() {
    let mut state = capacity_cluster();
    for (shard, demand) in [85, 75, 12].into_iter().enumerate() {
        state
            .add_shard(
                shard as i64,
                1,
                vec![with_demand_of_shard(Resource::Disk, demand)],
            )
            .expect("shard is valid");
    }

    let constrained = solve(&state, &config_with(vec![with_capacity(true)]));
    assert_that!(constrained.is_ok(), eq(true));
    let unconstrained = solve(&state, &default_config());
    assert_that!(unconstrained.is_ok(), eq(true));
}

#[rstest]
fn configuration_fallback_supplies_the_replication_factor() {
    let mut state = ClusterState::new();
    for node in 0..4 {
        state.add_node(node, vec![]).expect("node is valid");
    }
    state.add_shard(0, None, vec![]).expect("shard is valid");

    let default_rf = solve(&state, &default_config()).expect("placement is feasible");
    assert_that!(default_rf[&0].len(), eq(3));

    let two_replicas = solve(&state, &config_with(vec![with_replication_factor(2)]))
        .expect("placement is feasible");
    assert_that!(two_replicas[&0].len(), eq(2));
}

#[rstest]
fn zero_replication_factor_yields_an_empty_replica_list() {
    let mut state = ClusterState::new();
    state.add_node(0, vec![]).expect("node is valid");
    state.add_shard(0, 0, vec![]).expect("shard is valid");

    let allocation = solve(&state, &default_config()).expect("placement is feasible");
    assert_that!(allocation[&0].is_empty(), eq(true));
}

#[rstest]
fn empty_cluster_solves_to_an_empty_allocation() {
    let state = ClusterState::new();
    let allocation = solve(&state, &default_config()).expect("nothing to place");
    assert_that!(allocation.is_empty(), eq(true));
}

#[rstest]
fn zero_timeout_surfaces_as_not_solved() {
    let mut state = ClusterState::new();
    for node in 0..4 {
        state.add_node(node, vec![]).expect("node is valid");
    }
    state.add_shard(0, 3, vec![]).expect("shard is valid");

    let config = config_with(vec![with_search_timeout(Duration::ZERO)]);
    let result = solve(&state, &config);
    assert_that!(
        matches!(result, Err(PlacementError::NotSolved(_))),
        eq(true)
    );
}

#[rstest]
fn verbose_logging_does_not_change_the_outcome() {
    let mut state = ClusterState::new();
    for node in 0..3 {
        state.add_node(node, vec![]).expect("node is valid");
    }
    state.add_shard(0, 2, vec![]).expect("shard is valid");

    let quiet = solve(&state, &default_config()).expect("placement is feasible");
    let verbose = solve(&state, &config_with(vec![with_verbose_logging(true)]))
        .expect("placement is feasible");
    assert_that!(quiet, eq(&verbose));
}

#[rstest]
fn capacity_invariant_holds_across_replicated_shards() {
    let mut state = ClusterState::new();
    for node in 0..4 {
        state
            .add_node(node, vec![with_resource_of_node(Resource::Disk, 100)])
            .expect("node is valid");
    }
    for shard in 0..8 {
        state
            .add_shard(shard, 2, vec![with_demand_of_shard(Resource::Disk, 20)])
            .expect("shard is valid");
    }

    let allocation =
        solve(&state, &config_with(vec![with_capacity(true)])).expect("packing exists");
    assert_spread(&allocation, &state);
    for (_, load) in node_loads(&state, &allocation, Resource::Disk) {
        assert_that!(load <= 100, eq(true));
    }
}
