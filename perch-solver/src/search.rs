//! Deterministic propagate-and-branch search over a [`CpModel`].

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::domain::Domain;
use crate::model::{ConstraintData, CpModel, IntVar, LinearExpr, Literal};

/// Parameters for one solve call.
#[derive(Debug, Clone)]
pub struct SolveParams {
    /// Wall-clock ceiling for the whole search.
    pub time_limit: Duration,
    /// Emit search progress through `tracing`.
    pub log_search_progress: bool,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(10),
            log_search_progress: false,
        }
    }
}

/// Terminal classification of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// A solution was found and proven best for the objective.
    Optimal,
    /// A solution was found; optimality was not proven (satisfaction models, or the
    /// deadline interrupted the improvement loop).
    Feasible,
    /// The constraints admit no solution.
    Infeasible,
    /// The model failed structural validation.
    ModelInvalid,
    /// The search ended without a verdict, typically on the deadline.
    Unknown,
}

/// Search counters reported with each response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Branching decisions taken.
    pub branches: u64,
    /// Dead ends reached.
    pub conflicts: u64,
    /// Total wall-clock time spent.
    pub wall_time: Duration,
}

/// Fixed assignment satisfying the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: Vec<i64>,
    objective: Option<i64>,
}

impl Solution {
    /// Value of an integer variable.
    #[must_use]
    pub fn value(&self, var: IntVar) -> i64 {
        self.values[var.index()]
    }

    /// Truth value of a literal.
    #[must_use]
    pub fn boolean_value(&self, literal: Literal) -> bool {
        (self.values[literal.var] != 0) != literal.negated
    }

    /// Objective value, when the model carried one.
    #[must_use]
    pub fn objective_value(&self) -> Option<i64> {
        self.objective
    }
}

/// Outcome of one solve call.
#[derive(Debug, Clone)]
pub struct SolveResponse {
    pub status: SolveStatus,
    pub solution: Option<Solution>,
    pub stats: SolveStats,
}

impl CpModel {
    /// Runs the search under the provided parameters.
    ///
    /// The search is deterministic: identical models and parameters produce identical
    /// responses, including the concrete solution.
    #[must_use]
    pub fn solve(&self, params: &SolveParams) -> SolveResponse {
        let started = Instant::now();
        if let Err(error) = self.validate() {
            if params.log_search_progress {
                info!(model = %self.name, %error, "model rejected by validation");
            }
            return SolveResponse {
                status: SolveStatus::ModelInvalid,
                solution: None,
                stats: SolveStats {
                    wall_time: started.elapsed(),
                    ..SolveStats::default()
                },
            };
        }

        if params.log_search_progress {
            info!(
                model = %self.name,
                vars = self.vars.len(),
                constraints = self.constraints.len(),
                optimize = self.objective.is_some(),
                "search started"
            );
        }

        let mut searcher = Searcher::new(self, params);
        let (status, solution) = match &self.objective {
            None => searcher.solve_satisfaction(),
            Some(objective) => searcher.solve_minimize(objective),
        };

        let mut stats = searcher.stats;
        stats.wall_time = started.elapsed();
        if params.log_search_progress {
            info!(
                model = %self.name,
                ?status,
                branches = stats.branches,
                conflicts = stats.conflicts,
                "search finished"
            );
        }
        SolveResponse {
            status,
            solution,
            stats,
        }
    }
}

struct Conflict;

enum Walk {
    Found,
    Exhausted,
    Deadline,
}

struct Searcher<'model> {
    model: &'model CpModel,
    domains: Vec<Domain>,
    trail: Vec<(usize, Domain)>,
    cut: Option<(LinearExpr, i64)>,
    deadline: Option<Instant>,
    stats: SolveStats,
    log: bool,
}

impl<'model> Searcher<'model> {
    fn new(model: &'model CpModel, params: &SolveParams) -> Self {
        Self {
            model,
            domains: model.vars.iter().map(|var| var.domain.clone()).collect(),
            trail: Vec::new(),
            cut: None,
            deadline: Instant::now().checked_add(params.time_limit),
            stats: SolveStats::default(),
            log: params.log_search_progress,
        }
    }

    fn reset(&mut self) {
        self.domains = self
            .model
            .vars
            .iter()
            .map(|var| var.domain.clone())
            .collect();
        self.trail.clear();
    }

    fn deadline_hit(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn solve_satisfaction(&mut self) -> (SolveStatus, Option<Solution>) {
        match self.dfs() {
            Walk::Found => match self.extract_solution() {
                Some(solution) => (SolveStatus::Feasible, Some(solution)),
                None => (SolveStatus::Unknown, None),
            },
            Walk::Exhausted => (SolveStatus::Infeasible, None),
            Walk::Deadline => (SolveStatus::Unknown, None),
        }
    }

    fn solve_minimize(&mut self, objective: &LinearExpr) -> (SolveStatus, Option<Solution>) {
        let mut best: Option<Solution> = None;
        loop {
            self.reset();
            if let Some(incumbent) = best.as_ref().and_then(Solution::objective_value) {
                self.cut = Some((objective.clone(), incumbent.saturating_sub(1)));
            }
            match self.dfs() {
                Walk::Found => {
                    let Some(solution) = self.extract_solution() else {
                        return (SolveStatus::Unknown, best);
                    };
                    if self.log {
                        info!(
                            objective = ?solution.objective,
                            branches = self.stats.branches,
                            "incumbent solution found"
                        );
                    }
                    if solution.objective.is_none() {
                        // Objective over no variables: the first solution is the best one.
                        return (SolveStatus::Optimal, Some(solution));
                    }
                    best = Some(solution);
                }
                Walk::Exhausted => {
                    return match best {
                        Some(solution) => (SolveStatus::Optimal, Some(solution)),
                        None => (SolveStatus::Infeasible, None),
                    };
                }
                Walk::Deadline => {
                    return match best {
                        Some(solution) => (SolveStatus::Feasible, Some(solution)),
                        None => (SolveStatus::Unknown, None),
                    };
                }
            }
        }
    }

    fn dfs(&mut self) -> Walk {
        if self.deadline_hit() {
            return Walk::Deadline;
        }
        if self.propagate().is_err() {
            self.stats.conflicts += 1;
            return Walk::Exhausted;
        }
        let Some(var) = self.pick_branch_var() else {
            return Walk::Found;
        };

        let snapshot = self.domains[var].clone();
        if self.model.vars[var].is_bool {
            // Prefer true first: enforcement literals reward keeping their constraint.
            for value in [1i64, 0] {
                if !snapshot.contains(value) {
                    continue;
                }
                if let Some(walk) = self.try_value(var, value) {
                    return walk;
                }
            }
        } else {
            for value in snapshot.values() {
                if let Some(walk) = self.try_value(var, value) {
                    return walk;
                }
            }
        }
        Walk::Exhausted
    }

    /// Branches on `var = value`. `Some` bubbles a terminal walk up; `None` keeps trying
    /// sibling values.
    fn try_value(&mut self, var: usize, value: i64) -> Option<Walk> {
        if self.deadline_hit() {
            return Some(Walk::Deadline);
        }
        self.stats.branches += 1;
        let mark = self.trail.len();
        if self.update(var, |domain| domain.fix(value)).is_err() {
            self.stats.conflicts += 1;
            self.rollback(mark);
            return None;
        }
        match self.dfs() {
            Walk::Found => Some(Walk::Found),
            Walk::Deadline => Some(Walk::Deadline),
            Walk::Exhausted => {
                self.rollback(mark);
                None
            }
        }
    }

    fn pick_branch_var(&self) -> Option<usize> {
        let mut best: Option<(u64, usize)> = None;
        for (index, domain) in self.domains.iter().enumerate() {
            let size = domain.size();
            if size < 2 {
                continue;
            }
            if best.is_none_or(|(best_size, _)| size < best_size) {
                best = Some((size, index));
            }
        }
        best.map(|(_, index)| index)
    }

    fn extract_solution(&self) -> Option<Solution> {
        let mut values = Vec::with_capacity(self.domains.len());
        for domain in &self.domains {
            values.push(domain.fixed_value()?);
        }
        let objective = self
            .model
            .objective
            .as_ref()
            .filter(|expr| !expr.is_empty() || expr.offset != 0)
            .map(|expr| evaluate(expr, &values));
        Some(Solution { values, objective })
    }

    // ── Propagation ────────────────────────────────────────────────

    fn update(
        &mut self,
        var: usize,
        shrink: impl FnOnce(&mut Domain) -> bool,
    ) -> Result<bool, Conflict> {
        let saved = self.domains[var].clone();
        let changed = shrink(&mut self.domains[var]);
        if !changed {
            return Ok(false);
        }
        self.trail.push((var, saved));
        if self.domains[var].is_empty() {
            Err(Conflict)
        } else {
            Ok(true)
        }
    }

    fn rollback(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let Some((var, saved)) = self.trail.pop() else {
                break;
            };
            self.domains[var] = saved;
        }
    }

    fn propagate(&mut self) -> Result<(), Conflict> {
        let model = self.model;
        loop {
            let mut changed = false;
            for constraint in &model.constraints {
                changed |= match constraint {
                    ConstraintData::AllDifferent(vars) => self.propagate_all_different(vars)?,
                    ConstraintData::ForbiddenAssignments { vars, tuples } => {
                        self.propagate_forbidden(vars, tuples)?
                    }
                    ConstraintData::Cumulative {
                        capacity,
                        intervals,
                        demands,
                    } => self.propagate_cumulative(*capacity, intervals, demands)?,
                    ConstraintData::Linear {
                        expr,
                        lower_bound,
                        upper_bound,
                        enforce,
                    } => self.propagate_linear(expr, *lower_bound, *upper_bound, *enforce)?,
                };
            }
            if let Some((expr, bound)) = self.cut.clone() {
                changed |= self.propagate_linear(&expr, i64::MIN, bound, None)?;
            }
            if !changed {
                return Ok(());
            }
        }
    }

    fn propagate_all_different(&mut self, vars: &[usize]) -> Result<bool, Conflict> {
        let mut changed = false;
        for (i, &var) in vars.iter().enumerate() {
            let Some(value) = self.domains[var].fixed_value() else {
                continue;
            };
            for (j, &other) in vars.iter().enumerate() {
                if i == j {
                    continue;
                }
                changed |= self.update(other, |domain| domain.remove(value))?;
            }
        }
        Ok(changed)
    }

    fn propagate_forbidden(
        &mut self,
        vars: &[usize],
        tuples: &[Vec<i64>],
    ) -> Result<bool, Conflict> {
        let mut changed = false;
        for tuple in tuples {
            if let [var] = vars {
                changed |= self.update(*var, |domain| domain.remove(tuple[0]))?;
                continue;
            }
            let mut dead = false;
            let mut open: Vec<(usize, i64)> = Vec::new();
            for (&var, &value) in vars.iter().zip(tuple) {
                match self.domains[var].fixed_value() {
                    Some(fixed) if fixed != value => {
                        dead = true;
                        break;
                    }
                    Some(_) => {}
                    None => {
                        if !self.domains[var].contains(value) {
                            dead = true;
                            break;
                        }
                        open.push((var, value));
                    }
                }
            }
            if dead {
                continue;
            }
            match open.as_slice() {
                [] => return Err(Conflict),
                [(var, value)] => {
                    let (var, value) = (*var, *value);
                    changed |= self.update(var, |domain| domain.remove(value))?;
                }
                _ => {}
            }
        }
        Ok(changed)
    }

    fn propagate_cumulative(
        &mut self,
        capacity: usize,
        intervals: &[usize],
        demands: &[i64],
    ) -> Result<bool, Conflict> {
        let model = self.model;
        let mut changed = false;

        // (start var, width, demand) with widths fixed by validation.
        let mut items: Vec<(usize, i64, i64)> = Vec::with_capacity(intervals.len());
        for (&interval, &demand) in intervals.iter().zip(demands) {
            let data = &model.intervals[interval];
            let Some(width) = self.domains[data.size.index()].fixed_value() else {
                continue;
            };
            if width <= 0 {
                continue;
            }
            items.push((data.start.index(), width, demand));
        }

        let mut fixed_load: BTreeMap<i64, i64> = BTreeMap::new();
        let mut points: BTreeSet<i64> = BTreeSet::new();
        let mut total_demand: i128 = 0;
        for &(start, width, demand) in &items {
            total_demand += i128::from(demand);
            let domain = &self.domains[start];
            for &(lo, hi) in domain.intervals() {
                for point in lo..=hi.saturating_add(width - 1) {
                    let _ = points.insert(point);
                }
            }
            if let Some(value) = domain.fixed_value() {
                for point in value..value + width {
                    *fixed_load.entry(point).or_insert(0) += demand;
                }
            }
        }

        // The ceiling is at least the heaviest committed point, and at least the average
        // load over every point the intervals can reach.
        let max_fixed = fixed_load.values().copied().max().unwrap_or(0);
        let mut lower = i128::from(max_fixed);
        if points.is_empty() {
            if total_demand > 0 {
                return Err(Conflict);
            }
        } else {
            lower = lower.max(div_ceil(total_demand, points.len() as i128));
        }
        changed |= self.update(capacity, |domain| {
            domain.retain_above(clamp_to_i64(lower))
        })?;

        let Some(capacity_ub) = self.domains[capacity].max() else {
            return Err(Conflict);
        };
        for &(start, width, demand) in &items {
            if demand == 0 || self.domains[start].is_fixed() {
                continue;
            }
            let mut removable = Vec::new();
            for point in self.domains[start].values() {
                let overloads = (point..point + width).any(|covered| {
                    fixed_load.get(&covered).copied().unwrap_or(0) + demand > capacity_ub
                });
                if overloads {
                    removable.push(point);
                }
            }
            for point in removable {
                changed |= self.update(start, |domain| domain.remove(point))?;
            }
        }
        Ok(changed)
    }

    fn propagate_linear(
        &mut self,
        expr: &LinearExpr,
        lower_bound: i64,
        upper_bound: i64,
        enforce: Option<Literal>,
    ) -> Result<bool, Conflict> {
        let mut sum_min = i128::from(expr.offset);
        let mut sum_max = i128::from(expr.offset);
        for &(coefficient, var) in &expr.terms {
            let domain = &self.domains[var];
            let (Some(domain_min), Some(domain_max)) = (domain.min(), domain.max()) else {
                return Err(Conflict);
            };
            let coefficient = i128::from(coefficient);
            if coefficient >= 0 {
                sum_min += coefficient * i128::from(domain_min);
                sum_max += coefficient * i128::from(domain_max);
            } else {
                sum_min += coefficient * i128::from(domain_max);
                sum_max += coefficient * i128::from(domain_min);
            }
        }
        let lower = i128::from(lower_bound);
        let upper = i128::from(upper_bound);

        if let Some(literal) = enforce {
            match self.literal_truth(literal) {
                Some(false) => return Ok(false),
                Some(true) => {}
                None => {
                    if sum_min > upper || sum_max < lower {
                        return self.assert_literal(literal, false);
                    }
                    return Ok(false);
                }
            }
        }

        if sum_min > upper || sum_max < lower {
            return Err(Conflict);
        }

        let mut changed = false;
        for &(coefficient, var) in &expr.terms {
            if coefficient == 0 {
                continue;
            }
            let domain = &self.domains[var];
            let (Some(domain_min), Some(domain_max)) = (domain.min(), domain.max()) else {
                return Err(Conflict);
            };
            let coefficient_i = i128::from(coefficient);
            let (term_min, term_max) = if coefficient >= 0 {
                (
                    coefficient_i * i128::from(domain_min),
                    coefficient_i * i128::from(domain_max),
                )
            } else {
                (
                    coefficient_i * i128::from(domain_max),
                    coefficient_i * i128::from(domain_min),
                )
            };
            let others_min = sum_min - term_min;
            let others_max = sum_max - term_max;
            let term_upper = upper - others_min;
            let term_lower = lower - others_max;
            let (var_lower, var_upper) = if coefficient > 0 {
                (
                    div_ceil(term_lower, coefficient_i),
                    div_floor(term_upper, coefficient_i),
                )
            } else {
                (
                    div_ceil(term_upper, coefficient_i),
                    div_floor(term_lower, coefficient_i),
                )
            };
            let var_lower = clamp_to_i64(var_lower);
            let var_upper = clamp_to_i64(var_upper);
            changed |= self.update(var, |domain| domain.retain_above(var_lower))?;
            changed |= self.update(var, |domain| domain.retain_below(var_upper))?;
        }
        if changed && self.log {
            debug!("linear propagation tightened bounds");
        }
        Ok(changed)
    }

    fn literal_truth(&self, literal: Literal) -> Option<bool> {
        let value = self.domains[literal.var].fixed_value()?;
        Some((value != 0) != literal.negated)
    }

    fn assert_literal(&mut self, literal: Literal, truth: bool) -> Result<bool, Conflict> {
        let target = i64::from(truth != literal.negated);
        self.update(literal.var, |domain| domain.fix(target))
    }
}

fn evaluate(expr: &LinearExpr, values: &[i64]) -> i64 {
    let mut total = i128::from(expr.offset);
    for &(coefficient, var) in &expr.terms {
        total += i128::from(coefficient) * i128::from(values[var]);
    }
    clamp_to_i64(total)
}

fn clamp_to_i64(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

fn div_floor(a: i128, b: i128) -> i128 {
    debug_assert!(b != 0);
    let (a, b) = if b < 0 { (-a, -b) } else { (a, b) };
    a.div_euclid(b)
}

fn div_ceil(a: i128, b: i128) -> i128 {
    -div_floor(-a, b)
}
