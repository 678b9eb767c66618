use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqforge_core::ai::GenerationSettings;
use reqforge_core::{
    AnalysisContext, AnalysisSource, Criterion, EditChoice, FallbackAnalyzer, JsonDirBackend,
    NewRequirement, NewTrace, OracleAnalyzer, OracleError, QualityAnalyzer, QualityReport,
    ReadinessGate, ReadinessStatus, RefinementIo, RefinementSession, RefinementStatus,
    Requirement, RequirementPatch, RequirementPriority, RequirementsStore, RuleBasedAnalyzer,
    TextGenerator, TraceType,
};
use tempfile::TempDir;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn checkout_flow_scores_and_readiness() {
    let store = RequirementsStore::in_memory();
    let pid = store
        .create_project("Checkout Flow", "", BTreeMap::new())
        .unwrap();
    let rid = store
        .add_requirement(&pid, NewRequirement::new("Pay", "Users can pay."))
        .unwrap()
        .unwrap();

    let analyzer = FallbackAnalyzer::rules_only();
    let req = store.get_requirement(&pid, &rid).unwrap();
    let report = analyzer.analyze(&req, None);
    assert!(approx(report.score(Criterion::Clarity), 0.3));
    assert!(approx(report.score(Criterion::Completeness), 0.3));
    assert!(approx(report.overall_score, 0.435));
    let weighted: f64 = report
        .criteria
        .iter()
        .map(|c| c.score * c.criterion.weight())
        .sum();
    assert!(approx(report.overall_score, weighted));
    for c in &report.criteria {
        assert_eq!(c.score < 0.7, report.improvement_areas.contains(&c.criterion));
    }

    let readiness = ReadinessGate::new(Arc::new(analyzer)).assess_project(&store, &pid);
    assert_eq!(readiness.status, ReadinessStatus::NeedsRefinement);
    assert_eq!(readiness.total, 1);
    assert!(approx(readiness.readiness_percentage, 0.0));
}

#[test]
fn readiness_of_empty_and_fully_ready_projects() {
    let store = RequirementsStore::in_memory();
    let gate = ReadinessGate::new(Arc::new(RuleBasedAnalyzer));

    let empty = store.create_project("Empty", "", BTreeMap::new()).unwrap();
    assert_eq!(gate.assess_project(&store, &empty).status, ReadinessStatus::Error);

    let pid = store.create_project("Reports", "", BTreeMap::new()).unwrap();
    for title in ["Export nightly finance report", "Export weekly sales report"] {
        store
            .add_requirement(
                &pid,
                NewRequirement::new(
                    title,
                    "The system shall export what finance needs because audits require it; \
                     how: a scheduled job. QA will verify and test the totals.",
                )
                .with_tags(["reporting"]),
            )
            .unwrap();
    }
    let report = gate.assess_project(&store, &pid);
    assert_eq!(report.status, ReadinessStatus::Ready);
    assert!(approx(report.readiness_percentage, 100.0));
}

#[test]
fn json_directory_round_trip_keeps_everything() {
    let dir = TempDir::new().unwrap();
    let (pid, original) = {
        let store = RequirementsStore::open(Box::new(JsonDirBackend::new(dir.path()).unwrap())).unwrap();
        let pid = store
            .create_project("Checkout Flow", "Cart and payment", BTreeMap::new())
            .unwrap();
        let parent = store
            .add_requirement(&pid, NewRequirement::new("Payments", "Users shall pay for orders"))
            .unwrap()
            .unwrap();
        let child = store
            .add_requirement(
                &pid,
                NewRequirement::new("Pay by card", "Users shall pay by card")
                    .with_parent(parent)
                    .with_tags(["payments"]),
            )
            .unwrap()
            .unwrap();
        store
            .update_requirement(
                &pid,
                &child,
                RequirementPatch {
                    priority: Some(RequirementPriority::Critical),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .add_trace(
                &pid,
                NewTrace::new(child, parent, TraceType::Refines).with_description("narrows payments"),
            )
            .unwrap()
            .unwrap();
        (pid, store.get_project(&pid).unwrap())
    };

    let reopened = RequirementsStore::open(Box::new(JsonDirBackend::new(dir.path()).unwrap())).unwrap();
    let loaded = reopened.get_project(&pid).unwrap();
    assert_eq!(loaded, original);
    assert!(loaded.requirements().any(|r| r.history().len() == 2));
    assert_eq!(loaded.traces().len(), 1);
    assert_eq!(reopened.hierarchy(&pid).unwrap().roots().len(), 1);
}

#[test]
fn deleting_a_trace_target_leaves_the_trace_dangling() {
    let store = RequirementsStore::in_memory();
    let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
    let source = store
        .add_requirement(&pid, NewRequirement::new("Card tests", "Verify card payments"))
        .unwrap()
        .unwrap();
    let target = store
        .add_requirement(&pid, NewRequirement::new("Pay by card", "Users shall pay by card"))
        .unwrap()
        .unwrap();
    let tid = store
        .add_trace(&pid, NewTrace::new(source, target, TraceType::Tests))
        .unwrap()
        .unwrap();

    assert!(store.delete_requirement(&pid, &target).unwrap());
    let trace = store.get_trace(&pid, &tid).unwrap();
    assert_eq!(trace.target_id, target);
    assert_eq!(store.validate_references(&pid).unwrap().len(), 1);
    assert_eq!(store.traces_for(&pid, &source).unwrap().len(), 1);
}

struct Slow;

impl TextGenerator for Slow {
    fn describe(&self) -> String {
        "slow".into()
    }

    fn generate(
        &self,
        _prompt: &str,
        _system_prompt: Option<&str>,
        _settings: &GenerationSettings,
    ) -> Result<String, OracleError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok("Clarity: 5/5".into())
    }
}

struct Babbler;

impl TextGenerator for Babbler {
    fn describe(&self) -> String {
        "babbler".into()
    }

    fn generate(
        &self,
        _prompt: &str,
        _system_prompt: Option<&str>,
        _settings: &GenerationSettings,
    ) -> Result<String, OracleError> {
        Ok("Sure! Requirements are great.".into())
    }
}

#[test]
fn oracle_failures_fall_back_to_rules() {
    let store = RequirementsStore::in_memory();
    let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
    let rid = store
        .add_requirement(&pid, NewRequirement::new("Pay", "Users can pay."))
        .unwrap()
        .unwrap();
    let req = store.get_requirement(&pid, &rid).unwrap();
    let context = store
        .with_project(&pid, |p| AnalysisContext::from_project(p, &rid))
        .unwrap();
    let expected = RuleBasedAnalyzer.analyze(&req, Some(&context));

    let settings = GenerationSettings {
        timeout: Duration::from_millis(100),
        ..Default::default()
    };
    for generator in [Arc::new(Slow) as Arc<dyn TextGenerator>, Arc::new(Babbler)] {
        let analyzer = FallbackAnalyzer::rules_only()
            .with_strategy(Arc::new(OracleAnalyzer::new(generator, settings.clone())));
        let report = analyzer.analyze(&req, Some(&context));
        assert_eq!(report.source, AnalysisSource::Rules);
        assert_eq!(report, expected);
    }
}

/// Caller that must never be asked anything
struct Silent {
    presented: bool,
}

impl RefinementIo for Silent {
    fn read_text(&mut self, label: &str) -> anyhow::Result<String> {
        anyhow::bail!("unexpected prompt: {}", label)
    }

    fn present(&mut self, _requirement: &Requirement, _report: &QualityReport) {
        self.presented = true;
    }

    fn choose(&mut self, _options: &[EditChoice]) -> anyhow::Result<EditChoice> {
        anyhow::bail!("unexpected choice")
    }

    fn show_detail(&mut self, _report: &QualityReport) -> anyhow::Result<()> {
        Ok(())
    }

    fn notify(&mut self, _message: &str) {}
}

struct Fixed(f64);

impl QualityAnalyzer for Fixed {
    fn analyze(&self, requirement: &Requirement, _context: Option<&AnalysisContext>) -> QualityReport {
        let mut report = RuleBasedAnalyzer.report(requirement);
        report.overall_score = self.0;
        report
    }
}

#[test]
fn refinement_auto_accepts_only_above_threshold() {
    let store = RequirementsStore::in_memory();
    let pid = store.create_project("P", "", BTreeMap::new()).unwrap();
    let rid = store
        .add_requirement(&pid, NewRequirement::new("Pay", "Users can pay."))
        .unwrap()
        .unwrap();

    let accepting = Fixed(0.86);
    let mut io = Silent { presented: false };
    let outcome = RefinementSession::open(&store, &accepting, pid, rid)
        .unwrap()
        .run(&mut io)
        .unwrap();
    assert_eq!(outcome.status, RefinementStatus::AutoAccepted);
    assert!(!io.presented);

    // Exactly at the threshold the report is presented and a choice is needed
    let borderline = Fixed(0.85);
    let mut io = Silent { presented: false };
    let result = RefinementSession::open(&store, &borderline, pid, rid)
        .unwrap()
        .run(&mut io);
    assert!(result.is_err());
    assert!(io.presented);
}
