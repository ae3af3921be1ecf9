//! Scenario execution engine.

use std::io::Write;

use arenalloc_core::EngineKind;

use crate::error::HarnessError;
use crate::scenarios::{ScenarioContext, scenarios_for};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Outcome of one scenario on one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioResult {
    pub scenario: &'static str,
    pub engine: EngineKind,
    pub outcome: Outcome,
    /// Failure message when the scenario did not pass.
    pub error: Option<String>,
}

impl ScenarioResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Runs every scenario that applies to one engine.
pub struct ScenarioRunner {
    pub engine: EngineKind,
    /// Size of the heap region each scenario builds its arena over.
    pub region_size: usize,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(engine: EngineKind, region_size: usize) -> Self {
        Self {
            engine,
            region_size,
        }
    }

    /// Run all applicable scenarios, logging every recorded event.
    ///
    /// A failing scenario does not stop the run; only a log write failure does.
    pub fn run<W: Write>(
        &self,
        emitter: &mut LogEmitter<W>,
    ) -> Result<Vec<ScenarioResult>, HarnessError> {
        let mut results = Vec::new();
        for scenario in scenarios_for(self.engine) {
            emitter.emit_entry(
                LogEntry::new("", LogLevel::Info, "scenario_start")
                    .with_engine(self.engine.name())
                    .with_scenario(scenario.name),
            )?;

            let mut ctx = ScenarioContext::new(self.engine, self.region_size, scenario.name);
            let result = scenario.run(&mut ctx);
            for event in ctx.into_events() {
                emitter.emit_entry(event)?;
            }

            let (outcome, error) = match result {
                Ok(()) => (Outcome::Pass, None),
                Err(err) => (Outcome::Fail, Some(err.to_string())),
            };
            let mut end = LogEntry::new(
                "",
                if error.is_some() { LogLevel::Error } else { LogLevel::Info },
                "scenario_end",
            )
            .with_engine(self.engine.name())
            .with_scenario(scenario.name)
            .with_outcome(outcome);
            if let Some(message) = &error {
                end = end.with_details(serde_json::json!({ "error": message }));
            }
            emitter.emit_entry(end)?;

            results.push(ScenarioResult {
                scenario: scenario.name,
                engine: self.engine,
                outcome,
                error,
            });
        }
        emitter.flush()?;
        Ok(results)
    }
}

/// `Err` naming how many scenarios failed, if any did.
pub fn summarize(results: &[ScenarioResult]) -> Result<(), HarnessError> {
    let failed = results.iter().filter(|r| !r.passed()).count();
    if failed == 0 {
        Ok(())
    } else {
        Err(HarnessError::ScenariosFailed {
            failed,
            total: results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::DEFAULT_REGION_SIZE;
    use crate::structured_log::validate_log_line;

    #[test]
    fn free_list_run_passes_and_logs_valid_jsonl() {
        let mut emitter = LogEmitter::to_buffer("runner");
        let results = ScenarioRunner::new(EngineKind::FreeList, DEFAULT_REGION_SIZE)
            .run(&mut emitter)
            .unwrap();
        assert!(results.iter().all(ScenarioResult::passed), "{results:?}");
        summarize(&results).unwrap();

        let text = emitter.contents();
        let entries: Vec<_> = text
            .lines()
            .enumerate()
            .map(|(i, line)| validate_log_line(line, i + 1).unwrap())
            .collect();
        let starts = entries.iter().filter(|e| e.event == "scenario_start").count();
        let ends = entries.iter().filter(|e| e.event == "scenario_end").count();
        assert_eq!(starts, results.len());
        assert_eq!(ends, results.len());
        assert!(entries.iter().all(|e| e.engine.as_deref() == Some("free-list")));
    }

    #[test]
    fn slab_run_passes() {
        let mut emitter = LogEmitter::to_buffer("runner");
        let results = ScenarioRunner::new(EngineKind::Slab, DEFAULT_REGION_SIZE)
            .run(&mut emitter)
            .unwrap();
        assert!(results.iter().all(ScenarioResult::passed), "{results:?}");
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        // Too small for even one slab page: every slab scenario that builds
        // its own arena from the configured size fails.
        let mut emitter = LogEmitter::to_buffer("runner");
        let results = ScenarioRunner::new(EngineKind::Slab, 512)
            .run(&mut emitter)
            .unwrap();
        let failed: Vec<_> = results.iter().filter(|r| !r.passed()).collect();
        assert!(!failed.is_empty());
        assert!(failed.iter().all(|r| r.error.is_some()));
        // The two-page scenario sizes its own region.
        assert!(
            results
                .iter()
                .any(|r| r.scenario == "empty_pages_not_returned" && r.passed())
        );
        match summarize(&results) {
            Err(HarnessError::ScenariosFailed { failed: n, total }) => {
                assert_eq!(n, failed.len());
                assert_eq!(total, results.len());
            }
            other => panic!("unexpected summary: {other:?}"),
        }
        assert!(emitter.contents().contains("\"outcome\":\"fail\""));
    }
}
