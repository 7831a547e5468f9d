//! The default result rule: success feedback after a resolved problem.

use async_trait::async_trait;

use trellis_types::{MessageData, ValidatorOutcome};

use crate::validator::ResultRule;

fn noteworthy(outcome: &ValidatorOutcome) -> bool {
    outcome.validator_type == "error" || outcome.validator_type == "warning"
}

/// Active when the previous cycle ended with an error or warning and the
/// current cycle has neither — the "you fixed it" state. Reports under the
/// "success" type, so hosts must declare that type to use it.
pub struct DefaultSuccess;

#[async_trait]
impl ResultRule for DefaultSuccess {
    fn name(&self) -> &str {
        "DefaultSuccess"
    }

    fn default_type(&self) -> &str {
        "success"
    }

    fn execute_on_results(
        &self,
        regular_validation_result: &[ValidatorOutcome],
        prev_validation_result: &[ValidatorOutcome],
    ) -> bool {
        let has_problem = regular_validation_result.iter().any(noteworthy);
        let prev_had_problem = prev_validation_result.iter().any(noteworthy);
        !has_problem && prev_had_problem
    }

    async fn message(&self, _data: &MessageData) -> Option<String> {
        Some("Ok, correct.".to_string())
    }
}
