// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"service_token_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn every_outcome_records_without_a_recorder() {
		for outcome in [
			FlowOutcome::Attempt,
			FlowOutcome::Success,
			FlowOutcome::Failure,
			FlowOutcome::CacheHit,
			FlowOutcome::Cancelled,
		] {
			record_flow_outcome(FlowKind::Retrieve, outcome);
		}
	}
}
