//! CP-SAT-shaped model construction surface.

use thiserror::Error;

use crate::domain::Domain;

/// Structural defect found while validating a model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ModelError(String);

impl ModelError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Handle to an integer variable of a [`CpModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntVar(pub(crate) usize);

impl IntVar {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Handle to a 0/1 variable, possibly negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Literal {
    pub(crate) var: usize,
    pub(crate) negated: bool,
}

impl Literal {
    /// The logical complement of this literal.
    #[must_use]
    pub fn negate(self) -> Literal {
        Literal {
            var: self.var,
            negated: !self.negated,
        }
    }
}

/// Handle to an interval of a [`CpModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval(pub(crate) usize);

/// Linear expression `Σ coefficient · variable + offset`.
///
/// Literal terms contribute their 0/1 value; a negated literal contributes `1 − var`.
#[derive(Debug, Clone, Default)]
pub struct LinearExpr {
    pub(crate) terms: Vec<(i64, usize)>,
    pub(crate) offset: i64,
}

impl LinearExpr {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `coefficient · var`.
    pub fn add_term(&mut self, var: IntVar, coefficient: i64) {
        self.terms.push((coefficient, var.index()));
    }

    /// Appends the 0/1 value of a literal.
    pub fn add_literal(&mut self, literal: Literal) {
        if literal.negated {
            self.offset += 1;
            self.terms.push((-1, literal.var));
        } else {
            self.terms.push((1, literal.var));
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VarData {
    pub domain: Domain,
    pub name: String,
    pub is_bool: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct IntervalData {
    pub start: IntVar,
    pub end: IntVar,
    pub size: IntVar,
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) enum ConstraintData {
    AllDifferent(Vec<usize>),
    ForbiddenAssignments {
        vars: Vec<usize>,
        tuples: Vec<Vec<i64>>,
    },
    Cumulative {
        capacity: usize,
        intervals: Vec<usize>,
        demands: Vec<i64>,
    },
    Linear {
        expr: LinearExpr,
        lower_bound: i64,
        upper_bound: i64,
        enforce: Option<Literal>,
    },
}

/// Growable constraint model consumed by [`CpModel::solve`](crate::search).
#[derive(Debug, Clone)]
pub struct CpModel {
    pub(crate) name: String,
    pub(crate) vars: Vec<VarData>,
    pub(crate) intervals: Vec<IntervalData>,
    pub(crate) constraints: Vec<ConstraintData>,
    pub(crate) objective: Option<LinearExpr>,
}

impl CpModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vec::new(),
            intervals: Vec::new(),
            constraints: Vec::new(),
            objective: None,
        }
    }

    fn push_var(&mut self, domain: Domain, name: String, is_bool: bool) -> IntVar {
        let index = self.vars.len();
        self.vars.push(VarData {
            domain,
            name,
            is_bool,
        });
        IntVar(index)
    }

    /// New integer variable over the closed range `[lower_bound, upper_bound]`.
    pub fn new_int_var(
        &mut self,
        lower_bound: i64,
        upper_bound: i64,
        name: impl Into<String>,
    ) -> IntVar {
        self.push_var(Domain::from_bounds(lower_bound, upper_bound), name.into(), false)
    }

    /// New integer variable over an explicit domain.
    pub fn new_int_var_from_domain(&mut self, domain: Domain, name: impl Into<String>) -> IntVar {
        self.push_var(domain, name.into(), false)
    }

    /// New variable fixed to `value`.
    pub fn new_constant(&mut self, value: i64, name: impl Into<String>) -> IntVar {
        self.push_var(Domain::constant(value), name.into(), false)
    }

    /// New 0/1 variable wrapped as a positive literal.
    pub fn new_literal(&mut self, name: impl Into<String>) -> Literal {
        let var = self.push_var(Domain::from_bounds(0, 1), name.into(), true);
        Literal {
            var: var.index(),
            negated: false,
        }
    }

    /// New interval `[start, end)` of width `size`; posts `end = start + size`.
    pub fn new_interval(
        &mut self,
        start: IntVar,
        end: IntVar,
        size: IntVar,
        name: impl Into<String>,
    ) -> Interval {
        let index = self.intervals.len();
        self.intervals.push(IntervalData {
            start,
            end,
            size,
            name: name.into(),
        });
        let mut link = LinearExpr::new();
        link.add_term(start, 1);
        link.add_term(size, 1);
        link.add_term(end, -1);
        let _ = self.add_linear(link, 0, 0);
        Interval(index)
    }

    /// Requires all variables to take pairwise distinct values.
    pub fn add_all_different(&mut self, vars: &[IntVar]) {
        self.constraints.push(ConstraintData::AllDifferent(
            vars.iter().map(|var| var.index()).collect(),
        ));
    }

    /// Bans every listed tuple of values for the given variable tuple.
    pub fn add_forbidden_assignments(&mut self, vars: &[IntVar], tuples: Vec<Vec<i64>>) {
        self.constraints.push(ConstraintData::ForbiddenAssignments {
            vars: vars.iter().map(|var| var.index()).collect(),
            tuples,
        });
    }

    /// Bounds, at every point, the summed demand of the intervals covering it by `capacity`.
    pub fn add_cumulative(&mut self, capacity: IntVar, intervals: &[Interval], demands: &[i64]) {
        self.constraints.push(ConstraintData::Cumulative {
            capacity: capacity.index(),
            intervals: intervals.iter().map(|interval| interval.0).collect(),
            demands: demands.to_vec(),
        });
    }

    /// Constrains `expr` into `[lower_bound, upper_bound]`; the returned handle can make the
    /// constraint conditional on a literal.
    pub fn add_linear(
        &mut self,
        expr: LinearExpr,
        lower_bound: i64,
        upper_bound: i64,
    ) -> LinearConstraintHandle<'_> {
        let index = self.constraints.len();
        self.constraints.push(ConstraintData::Linear {
            expr,
            lower_bound,
            upper_bound,
            enforce: None,
        });
        LinearConstraintHandle { model: self, index }
    }

    /// Requires at most `k` of the literals to be true.
    pub fn add_at_most_k(&mut self, literals: &[Literal], k: i64) {
        let mut expr = LinearExpr::new();
        for &literal in literals {
            expr.add_literal(literal);
        }
        let _ = self.add_linear(expr, i64::MIN, k);
    }

    /// Installs the minimization objective; a later call replaces an earlier one.
    pub fn minimize(&mut self, expr: LinearExpr) {
        self.objective = Some(expr);
    }

    /// Checks the assembled model for structural defects.
    ///
    /// # Errors
    ///
    /// Returns a [`ModelError`] naming the first defect found: an empty variable domain, a
    /// tuple width mismatch, a demand count mismatch, a negative demand, an interval without
    /// a fixed non-negative size, or a handle from another model.
    pub fn validate(&self) -> Result<(), ModelError> {
        for var in &self.vars {
            if var.domain.is_empty() {
                return Err(ModelError::new(format!(
                    "variable `{}` has an empty domain",
                    var.name
                )));
            }
        }
        for constraint in &self.constraints {
            match constraint {
                ConstraintData::AllDifferent(vars) => self.check_vars(vars)?,
                ConstraintData::ForbiddenAssignments { vars, tuples } => {
                    self.check_vars(vars)?;
                    for tuple in tuples {
                        if tuple.len() != vars.len() {
                            return Err(ModelError::new(format!(
                                "forbidden tuple width {} does not match {} variables",
                                tuple.len(),
                                vars.len()
                            )));
                        }
                    }
                }
                ConstraintData::Cumulative {
                    capacity,
                    intervals,
                    demands,
                } => {
                    self.check_vars(&[*capacity])?;
                    if intervals.len() != demands.len() {
                        return Err(ModelError::new(format!(
                            "cumulative lists {} intervals but {} demands",
                            intervals.len(),
                            demands.len()
                        )));
                    }
                    if demands.iter().any(|&demand| demand < 0) {
                        return Err(ModelError::new("cumulative demands cannot be negative"));
                    }
                    for &interval in intervals {
                        let Some(data) = self.intervals.get(interval) else {
                            return Err(ModelError::new("interval handle from another model"));
                        };
                        let size = self.vars[data.size.index()].domain.fixed_value();
                        if !size.is_some_and(|size| size >= 0) {
                            return Err(ModelError::new(format!(
                                "interval `{}` needs a fixed non-negative size",
                                data.name
                            )));
                        }
                    }
                }
                ConstraintData::Linear { expr, enforce, .. } => {
                    self.check_expr(expr)?;
                    if let Some(literal) = enforce {
                        self.check_vars(&[literal.var])?;
                        if !self.vars[literal.var].is_bool {
                            return Err(ModelError::new(
                                "enforcement literal must reference a boolean variable",
                            ));
                        }
                    }
                }
            }
        }
        if let Some(objective) = &self.objective {
            self.check_expr(objective)?;
        }
        Ok(())
    }

    fn check_vars(&self, vars: &[usize]) -> Result<(), ModelError> {
        for &var in vars {
            if var >= self.vars.len() {
                return Err(ModelError::new("variable handle from another model"));
            }
        }
        Ok(())
    }

    fn check_expr(&self, expr: &LinearExpr) -> Result<(), ModelError> {
        for &(_, var) in &expr.terms {
            if var >= self.vars.len() {
                return Err(ModelError::new("variable handle from another model"));
            }
        }
        Ok(())
    }
}

/// Handle allowing half-reification of a just-added linear constraint.
pub struct LinearConstraintHandle<'model> {
    model: &'model mut CpModel,
    index: usize,
}

impl LinearConstraintHandle<'_> {
    /// Makes the constraint apply only when `literal` is true. When the constraint cannot
    /// hold, the solver may instead fix the literal to false.
    pub fn only_enforce_if(self, literal: Literal) {
        if let ConstraintData::Linear { enforce, .. } = &mut self.model.constraints[self.index] {
            *enforce = Some(literal);
        }
    }
}
