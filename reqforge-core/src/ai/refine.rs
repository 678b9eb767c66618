use std::sync::Arc;
use tracing::warn;

use crate::models::Requirement;

use super::client::{call_with_deadline, GenerationSettings, OracleError, TextGenerator};
use super::prompts::{build_refinement_prompt, REFINEMENT_SYSTEM_PROMPT};
use super::responses::{parse_refinement_reply, RefinedFields};

/// Revises requirement fields according to free-text feedback
///
/// Without an oracle, or when the oracle fails, the original fields are
/// returned unchanged.
#[derive(Clone, Default)]
pub struct FeedbackRefiner {
    generator: Option<Arc<dyn TextGenerator>>,
    settings: GenerationSettings,
}

impl FeedbackRefiner {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, settings: GenerationSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_some()
    }

    pub fn try_refine(&self, requirement: &Requirement, feedback: &str) -> Result<RefinedFields, OracleError> {
        let generator = self.generator.as_ref().ok_or(OracleError::NotAvailable)?;
        let reply = call_with_deadline(
            Arc::clone(generator),
            build_refinement_prompt(requirement, feedback),
            Some(REFINEMENT_SYSTEM_PROMPT.to_string()),
            self.settings.clone(),
            None,
        )?;
        Ok(parse_refinement_reply(&reply, requirement))
    }

    /// Revised fields, or the original ones when the oracle cannot help
    pub fn refine(&self, requirement: &Requirement, feedback: &str) -> RefinedFields {
        self.try_refine(requirement, feedback).unwrap_or_else(|e| {
            warn!(
                requirement_id = %requirement.id(),
                "Refinement by feedback unavailable, keeping requirement as is: {}", e
            );
            RefinedFields::passthrough(requirement)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRequirement, Project};
    use std::collections::BTreeMap;

    struct Fixed(&'static str);

    impl TextGenerator for Fixed {
        fn describe(&self) -> String {
            "fixed".into()
        }

        fn generate(
            &self,
            prompt: &str,
            _system_prompt: Option<&str>,
            _settings: &GenerationSettings,
        ) -> Result<String, OracleError> {
            assert!(prompt.contains("## Feedback"));
            Ok(self.0.to_string())
        }
    }

    fn requirement() -> Requirement {
        let mut project = Project::new("P".into(), String::new(), BTreeMap::new());
        let id = project.add_requirement(NewRequirement::new("Pay", "Users can pay."));
        project.requirement(&id).cloned().unwrap()
    }

    #[test]
    fn test_refine_without_oracle_passes_through() {
        let req = requirement();
        let fields = FeedbackRefiner::default().refine(&req, "be specific");
        assert_eq!(fields, RefinedFields::passthrough(&req));
    }

    #[test]
    fn test_refine_parses_reply() {
        let refiner = FeedbackRefiner::new(
            Some(Arc::new(Fixed("Title: Pay by card\nAcceptance Criteria:\n- Visa accepted"))),
            GenerationSettings::default(),
        );
        let fields = refiner.refine(&requirement(), "name the card types");
        assert_eq!(fields.title, "Pay by card");
        assert_eq!(fields.description, "Users can pay.");
        assert_eq!(fields.acceptance_criteria, vec!["Visa accepted"]);
    }
}
