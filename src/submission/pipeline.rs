use crate::error::AppError;
use crate::models::{DowntimeSubmission, OutboxRecord};
use crate::outbox::writer;
use crate::state::SharedState;

pub enum PipelineResult {
    Sent,
    Queued(OutboxRecord),
}

/// Send directly when online with a session token; queue on any failure,
/// or straight away when offline or signed out.
pub async fn run(
    state: &SharedState,
    submission: DowntimeSubmission,
) -> Result<PipelineResult, AppError> {
    let token = state.session.token();

    match (state.connectivity.is_online(), token) {
        (true, Some(token)) => {
            let downtime = submission.to_downtime().map_err(AppError::BadRequest)?;

            match state.api.deliver(&downtime, Some(&token)).await {
                Ok(()) => {
                    tracing::info!("Downtime for machine {} submitted online", submission.machine_id);
                    return Ok(PipelineResult::Sent);
                }
                Err(e) => {
                    if e.is_unauthorized() {
                        tracing::warn!("Session token rejected by the server, clearing it");
                        state.session.clear();
                    }
                    tracing::warn!("Online submit failed, queueing offline: {e}");
                }
            }
        }
        (true, None) => {
            tracing::debug!("No session token, queueing downtime for machine {}", submission.machine_id);
        }
        (false, _) => {
            tracing::debug!("Offline, queueing downtime for machine {}", submission.machine_id);
        }
    }

    let record = writer::enqueue(&state.pool, submission, Some(&state.sync)).await?;
    Ok(PipelineResult::Queued(record))
}
