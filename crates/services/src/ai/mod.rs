mod advisor;
mod enrichment;

pub use advisor::{
    AdviceRequest, AdvisorConfig, AssessmentAdvisor, HttpAdvisor, parse_feedback,
};
pub use enrichment::Enricher;
