use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::models::Requirement;

use super::analyzer::{AnalysisContext, AnalysisStrategy};
use super::client::{call_with_deadline, GenerationSettings, OracleError, TextGenerator};
use super::prompts::{build_analysis_prompt, ANALYSIS_SYSTEM_PROMPT};
use super::report::{AnalysisSource, QualityReport};
use super::responses::parse_analysis_reply;

/// Oracle-assisted analysis strategy
///
/// Every call is bounded by the configured timeout and an optional
/// cancellation flag shared with the caller.
#[derive(Clone)]
pub struct OracleAnalyzer {
    generator: Arc<dyn TextGenerator>,
    settings: GenerationSettings,
    cancel: Option<Arc<AtomicBool>>,
}

impl OracleAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: GenerationSettings) -> Self {
        Self {
            generator,
            settings,
            cancel: None,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl AnalysisStrategy for OracleAnalyzer {
    fn name(&self) -> String {
        format!("oracle: {}", self.generator.describe())
    }

    fn try_analyze(
        &self,
        requirement: &Requirement,
        context: Option<&AnalysisContext>,
    ) -> Result<QualityReport, OracleError> {
        let reply = call_with_deadline(
            Arc::clone(&self.generator),
            build_analysis_prompt(requirement, context),
            Some(ANALYSIS_SYSTEM_PROMPT.to_string()),
            self.settings.clone(),
            self.cancel.clone(),
        )?;
        let parsed = parse_analysis_reply(&reply)?;

        Ok(QualityReport::assemble(
            requirement.id(),
            requirement.title.clone(),
            parsed.scores,
            parsed.suggestions,
            AnalysisSource::Oracle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::report::Criterion;
    use crate::ai::rules::RuleBasedAnalyzer;
    use crate::ai::{FallbackAnalyzer, QualityAnalyzer};
    use crate::models::{NewRequirement, Project};
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Scripted {
        reply: Result<String, OracleError>,
        delay: Duration,
    }

    impl TextGenerator for Scripted {
        fn describe(&self) -> String {
            "scripted".into()
        }

        fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _settings: &GenerationSettings,
        ) -> Result<String, OracleError> {
            std::thread::sleep(self.delay);
            self.reply.clone()
        }
    }

    fn oracle(reply: Result<&str, OracleError>, delay_ms: u64, timeout_ms: u64) -> OracleAnalyzer {
        let generator = Scripted {
            reply: reply.map(str::to_string),
            delay: Duration::from_millis(delay_ms),
        };
        OracleAnalyzer::new(
            Arc::new(generator),
            GenerationSettings {
                timeout: Duration::from_millis(timeout_ms),
                ..Default::default()
            },
        )
    }

    fn requirement() -> Requirement {
        let mut project = Project::new("P".into(), String::new(), BTreeMap::new());
        let id = project.add_requirement(NewRequirement::new("Pay", "Users can pay."));
        project.requirement(&id).cloned().unwrap()
    }

    #[test]
    fn test_oracle_report_from_reply() {
        let analyzer = oracle(Ok("Clarity: 5/5\nCompleteness: 5/5\nTestability: 4/5\n- Add limits"), 0, 1000);
        let report = analyzer.try_analyze(&requirement(), None).unwrap();
        assert_eq!(report.source, AnalysisSource::Oracle);
        assert_eq!(report.score(Criterion::Clarity), 1.0);
        assert_eq!(report.score(Criterion::Feasibility), 0.5);
        assert_eq!(report.suggestions, vec!["Add limits"]);
    }

    #[test]
    fn test_timeout_falls_back_to_rules() {
        let req = requirement();
        let analyzer = FallbackAnalyzer::rules_only()
            .with_strategy(Arc::new(oracle(Ok("Clarity: 5/5"), 2000, 50)));
        let report = analyzer.analyze(&req, None);
        assert_eq!(report, RuleBasedAnalyzer.report(&req));
    }

    #[test]
    fn test_garbage_reply_falls_back_to_rules() {
        let req = requirement();
        let analyzer = FallbackAnalyzer::rules_only()
            .with_strategy(Arc::new(oracle(Ok("I cannot help with that."), 0, 1000)));
        let report = analyzer.analyze(&req, None);
        assert_eq!(report.source, AnalysisSource::Rules);
        assert_eq!(report.criteria.len(), 5);
    }

    #[test]
    fn test_cancelled_call_is_error() {
        let cancel = Arc::new(AtomicBool::new(true));
        let analyzer = oracle(Ok("Clarity: 5/5"), 500, 5000).with_cancel_flag(cancel);
        assert_eq!(
            analyzer.try_analyze(&requirement(), None),
            Err(OracleError::Cancelled)
        );
    }
}
