//! Recursive phase group execution.
//!
//! For each group:
//! - setup entries run in order; a terminal entry or an abort ends the whole
//!   group at once, without main or teardown
//! - main entries run with the same early exit
//! - teardown entries all run under the teardown lock once main was entered,
//!   skipped only after a forced abort
//!
//! The group is terminal if main or teardown had a terminal entry. Nested
//! groups count as one entry of their parent stage.
//!
//! Do not construct phase groups that contain themselves.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, error};

use crate::domain::{
    PhaseDescriptor, PhaseExecutionOutcome, PhaseGroup, PhaseNode, PhaseOutcome, PhaseResult,
    Stage,
};
use crate::runner::test_run::TestRun;
use crate::station::PhaseRun;

impl TestRun {
    /// Execute one group; returns true if it ended terminally
    pub(super) fn execute_phase_group<'a>(&'a mut self, group: &'a PhaseGroup) -> BoxFuture<'a, bool> {
        async move {
            let group_name = group.name.as_deref();
            if let Some(name) = group_name {
                debug!("[{}] Entering PhaseGroup {}", self.run_id(), name);
            }

            if self
                .execute_abortable_phases(Stage::Setup, &group.setup, group_name)
                .await
            {
                return true;
            }
            let main_ret = self
                .execute_abortable_phases(Stage::Main, &group.main, group_name)
                .await;
            let teardown_ret = self.execute_teardown_phases(&group.teardown, group_name).await;
            main_ret || teardown_ret
        }
        .boxed()
    }

    fn handle_phase<'a>(&'a mut self, node: &'a PhaseNode) -> BoxFuture<'a, bool> {
        match node {
            PhaseNode::Group(group) => self.execute_phase_group(group),
            PhaseNode::Phase(phase) => self.execute_leaf_phase(phase).boxed(),
        }
    }

    /// Returns true on the first terminal entry or once an abort is seen
    async fn execute_abortable_phases(
        &mut self,
        stage: Stage,
        phases: &[PhaseNode],
        group_name: Option<&str>,
    ) -> bool {
        if let Some(name) = group_name {
            if !phases.is_empty() {
                debug!("[{}] Executing {} phases for {}", self.run_id(), stage.as_str(), name);
            }
        }

        for node in phases {
            if self.shared.abort.is_set() || self.handle_phase(node).await {
                return true;
            }
        }
        false
    }

    /// Run every teardown entry regardless of failures.
    ///
    /// Returns true if at least one entry was terminal, or a forced abort
    /// cut the teardown short.
    async fn execute_teardown_phases(&mut self, phases: &[PhaseNode], group_name: Option<&str>) -> bool {
        if phases.is_empty() {
            return false;
        }
        if let Some(name) = group_name {
            debug!("[{}] Executing teardown phases for {}", self.run_id(), name);
        }

        let _teardown = if self.teardown_depth == 0 {
            Some(Arc::clone(&self.shared.teardown_lock).lock_owned().await)
        } else {
            None
        };
        self.teardown_depth += 1;

        let mut ret = false;
        for node in phases {
            if self.shared.abort.is_forced() {
                debug!("[{}] Forced abort; skipping remaining teardown phases", self.run_id());
                ret = true;
                break;
            }
            if self.handle_phase(node).await {
                ret = true;
            }
        }

        self.teardown_depth -= 1;
        ret
    }

    async fn execute_leaf_phase(&mut self, phase: &PhaseDescriptor) -> bool {
        debug!("[{}] Handling phase {}", self.run_id(), phase.name);
        let PhaseRun { mut outcome, profile } = self
            .phase_exec
            .execute_phase(phase, self.state.record_mut(), self.run_with_profiling)
            .await;
        if let Some(profile) = profile {
            self.phase_profile_stats.push(profile);
        }

        if self.stop_on_first_failure() && self.last_phase_failed() {
            outcome = PhaseExecutionOutcome::from_result(PhaseResult::Stop);
            error!(
                "[{}] Stopping test because stop_on_first_failure is set (phase {} failed)",
                self.run_id(),
                phase.name
            );
        }

        if outcome.is_terminal() && self.last_outcome.is_none() {
            self.last_outcome = Some(outcome.clone());
        }
        outcome.is_terminal()
    }

    fn stop_on_first_failure(&self) -> bool {
        self.state.options().stop_on_first_failure || self.config.stop_on_first_failure
    }

    fn last_phase_failed(&self) -> bool {
        self.state
            .record()
            .last_phase()
            .is_some_and(|p| p.outcome == PhaseOutcome::Fail)
    }
}
