//! Solve-time configuration and its modifier options.
//!
//! A [`Configuration`] is built from a sequence of option closures and mutated the same way.
//! Options are applied in the order provided; later options overwrite earlier ones for the
//! same field.

use std::fmt;
use std::time::Duration;

use crate::error::{PlacementError, PlacementResult};

/// Sentinel meaning "no hard churn cap is active".
pub const NO_MAX_CHURN: i64 = -1;

/// Default wall-clock budget for one solver call.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default replication factor applied to shards added without an explicit one.
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

/// Option bundle steering one solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    with_capacity: bool,
    with_load_balancing: bool,
    with_tag_affinity: bool,
    with_churn_minimized: bool,
    max_churn: i64,
    search_timeout: Duration,
    verbose_logging: bool,
    replication_factor: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            with_capacity: false,
            with_load_balancing: false,
            with_tag_affinity: false,
            with_churn_minimized: false,
            max_churn: NO_MAX_CHURN,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            verbose_logging: false,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
        }
    }
}

impl Configuration {
    /// Builds a configuration from defaults plus the provided options.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::InvalidArgument`] when an option carries an out-of-range
    /// value. Application stops at the first failing option.
    pub fn new(opts: Vec<ConfigOption>) -> PlacementResult<Self> {
        let mut configuration = Self::default();
        configuration.update(opts)?;
        Ok(configuration)
    }

    /// Applies further options on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError::InvalidArgument`] when an option carries an out-of-range
    /// value. Options before the failing one stay applied.
    pub fn update(&mut self, opts: Vec<ConfigOption>) -> PlacementResult<()> {
        for opt in opts {
            opt.apply(self)?;
        }
        Ok(())
    }

    /// Whether per-resource capacity enforcement is requested.
    #[must_use]
    pub fn capacity_enabled(&self) -> bool {
        self.with_capacity
    }

    /// Whether load balancing (capacity plus ceiling minimization) is requested.
    #[must_use]
    pub fn load_balancing_enabled(&self) -> bool {
        self.with_load_balancing
    }

    /// Whether tag-subset enforcement is requested.
    #[must_use]
    pub fn tag_affinity_enabled(&self) -> bool {
        self.with_tag_affinity
    }

    /// Whether broken prior assignments should be minimized.
    #[must_use]
    pub fn churn_minimized(&self) -> bool {
        self.with_churn_minimized
    }

    /// Active hard cap on broken prior assignments, `None` when the sentinel is set.
    #[must_use]
    pub fn max_churn(&self) -> Option<i64> {
        if self.max_churn == NO_MAX_CHURN {
            None
        } else {
            Some(self.max_churn)
        }
    }

    /// Wall-clock ceiling for the solver call.
    #[must_use]
    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    /// Whether solver search logs are forwarded to the caller.
    #[must_use]
    pub fn verbose_logging(&self) -> bool {
        self.verbose_logging
    }

    /// Fallback replication factor for shards added without an explicit one.
    #[must_use]
    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }
}

/// Modifier closure mutating a [`Configuration`] in accordance with caller preferences.
pub struct ConfigOption(Box<dyn Fn(&mut Configuration) -> PlacementResult<()>>);

impl ConfigOption {
    fn new(apply: impl Fn(&mut Configuration) -> PlacementResult<()> + 'static) -> Self {
        Self(Box::new(apply))
    }

    fn apply(&self, configuration: &mut Configuration) -> PlacementResult<()> {
        (self.0)(configuration)
    }
}

impl fmt::Debug for ConfigOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConfigOption")
    }
}

/// Enables or disables per-resource capacity enforcement.
pub fn with_capacity(enable: bool) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        configuration.with_capacity = enable;
        Ok(())
    })
}

/// Enables or disables load balancing across node resources.
///
/// Load balancing implies capacity enforcement and additionally minimizes the per-resource
/// load ceiling, evening out the worst node.
pub fn with_load_balancing(enable: bool) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        configuration.with_load_balancing = enable;
        Ok(())
    })
}

/// Enables or disables affine allocations: every shard only lands on nodes carrying a
/// superset of its tags.
pub fn with_tag_affinity(enable: bool) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        configuration.with_tag_affinity = enable;
        Ok(())
    })
}

/// Enables or disables minimizing variance from the prior allocation.
pub fn with_churn_minimized(enable: bool) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        configuration.with_churn_minimized = enable;
        Ok(())
    })
}

/// Sets a hard limit on the number of moves deviating from the prior allocation.
pub fn with_max_churn(max_churn: i64) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        if max_churn < 0 {
            return Err(PlacementError::InvalidArgument(
                "max churn cannot be negative",
            ));
        }
        configuration.max_churn = max_churn;
        Ok(())
    })
}

/// Resets the churn cap to its inactive sentinel.
pub fn disable_max_churn() -> ConfigOption {
    ConfigOption::new(|configuration| {
        configuration.max_churn = NO_MAX_CHURN;
        Ok(())
    })
}

/// Forces the solver to conclude its search within the provided duration.
pub fn with_search_timeout(search_timeout: Duration) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        configuration.search_timeout = search_timeout;
        Ok(())
    })
}

/// Routes the solver's search logs to the caller through `tracing`.
pub fn with_verbose_logging(enable: bool) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        configuration.verbose_logging = enable;
        Ok(())
    })
}

/// Overrides the fallback replication factor applied to shards added without one.
pub fn with_replication_factor(replication_factor: i64) -> ConfigOption {
    ConfigOption::new(move |configuration| {
        let Ok(replication_factor) = usize::try_from(replication_factor) else {
            return Err(PlacementError::InvalidArgument(
                "replication factor cannot be negative",
            ));
        };
        configuration.replication_factor = replication_factor;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_match_documented_values() {
        let configuration = Configuration::default();
        assert_that!(configuration.capacity_enabled(), eq(false));
        assert_that!(configuration.load_balancing_enabled(), eq(false));
        assert_that!(configuration.tag_affinity_enabled(), eq(false));
        assert_that!(configuration.churn_minimized(), eq(false));
        assert_that!(configuration.max_churn(), eq(None));
        assert_that!(configuration.search_timeout(), eq(DEFAULT_SEARCH_TIMEOUT));
        assert_that!(configuration.verbose_logging(), eq(false));
        assert_that!(
            configuration.replication_factor(),
            eq(DEFAULT_REPLICATION_FACTOR)
        );
    }

    #[rstest]
    fn options_apply_in_order_with_last_writer_wins() {
        let configuration = Configuration::new(vec![
            with_max_churn(5),
            with_max_churn(2),
            with_capacity(true),
            with_capacity(false),
        ])
        .expect("all options are valid");

        assert_that!(configuration.max_churn(), eq(Some(2)));
        assert_that!(configuration.capacity_enabled(), eq(false));
    }

    #[rstest]
    fn update_layers_on_top_of_existing_values() {
        let mut configuration =
            Configuration::new(vec![with_tag_affinity(true)]).expect("option is valid");
        configuration
            .update(vec![with_replication_factor(5)])
            .expect("option is valid");

        assert_that!(configuration.tag_affinity_enabled(), eq(true));
        assert_that!(configuration.replication_factor(), eq(5));
    }

    #[rstest]
    #[case(-1)]
    #[case(i64::MIN)]
    fn negative_max_churn_is_rejected(#[case] max_churn: i64) {
        let result = Configuration::new(vec![with_max_churn(max_churn)]);
        assert_that!(
            result,
            eq(&Err(PlacementError::InvalidArgument(
                "max churn cannot be negative"
            )))
        );
    }

    #[rstest]
    fn negative_replication_factor_is_rejected() {
        let result = Configuration::new(vec![with_replication_factor(-3)]);
        assert_that!(
            result,
            eq(&Err(PlacementError::InvalidArgument(
                "replication factor cannot be negative"
            )))
        );
    }

    #[rstest]
    fn disable_max_churn_restores_sentinel() {
        let configuration = Configuration::new(vec![with_max_churn(4), disable_max_churn()])
            .expect("options are valid");
        assert_that!(configuration.max_churn(), eq(None));
    }
}
