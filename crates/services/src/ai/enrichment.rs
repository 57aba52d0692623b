use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use storage::repository::SessionRepository;

use super::advisor::{AdviceRequest, AssessmentAdvisor};

/// Attaches advisor feedback to stored results in the background.
///
/// Failures and timeouts are logged and dropped; a result without feedback
/// is complete.
#[derive(Clone)]
pub struct Enricher {
    advisor: Arc<dyn AssessmentAdvisor>,
    sessions: Arc<dyn SessionRepository>,
    timeout: Duration,
}

impl Enricher {
    #[must_use]
    pub fn new(
        advisor: Arc<dyn AssessmentAdvisor>,
        sessions: Arc<dyn SessionRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            advisor,
            sessions,
            timeout,
        }
    }

    /// Run [`Enricher::enrich`] on a detached task.
    pub fn spawn(&self, request: AdviceRequest) -> JoinHandle<()> {
        let enricher = self.clone();
        tokio::spawn(async move {
            enricher.enrich(request).await;
        })
    }

    /// Ask the advisor and store its feedback. Returns whether feedback was attached.
    pub async fn enrich(&self, request: AdviceRequest) -> bool {
        let session_id = request.session_id;
        let feedback =
            match tokio::time::timeout(self.timeout, self.advisor.advise(&request)).await {
                Ok(Ok(feedback)) => feedback,
                Ok(Err(err)) => {
                    tracing::warn!(%session_id, error = %err, "assessment feedback failed");
                    return false;
                }
                Err(_) => {
                    tracing::warn!(
                        %session_id,
                        timeout_secs = self.timeout.as_secs(),
                        "assessment feedback timed out"
                    );
                    return false;
                }
            };

        match self.sessions.attach_feedback(session_id, &feedback).await {
            Ok(()) => {
                tracing::debug!(%session_id, "assessment feedback attached");
                true
            }
            Err(err) => {
                tracing::warn!(%session_id, error = %err, "could not store assessment feedback");
                false
            }
        }
    }
}
