//! Interactive answers to unit requests.

use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use futures::future::BoxFuture;
use lockstep::executor::{
    downcast_request, respond, AnyPayload, HostError, RequestContext, RequestHandler,
};
use lockstep::jobs::ConfirmOverwrite;
use tracing::debug;

/// Answers requests with `dialoguer` prompts.
///
/// Prompts run on the blocking pool so the orchestrator keeps driving
/// other units while the user decides.
#[derive(Debug, Default)]
pub struct PromptHandler;

impl PromptHandler {
    pub fn new() -> Self {
        Self
    }
}

impl RequestHandler for PromptHandler {
    fn handle(
        &self,
        context: RequestContext,
        payload: AnyPayload,
    ) -> BoxFuture<'_, Result<AnyPayload, HostError>> {
        Box::pin(async move {
            debug!(request = context.request, unit = %context.unit_name, "Prompting user");
            let request = downcast_request::<ConfirmOverwrite>(payload)
                .map_err(|_| HostError::not_supported(context.request))?;

            let prompt = format!("{} already exists. Overwrite?", request.path.display());
            let answer = tokio::task::spawn_blocking(move || {
                eprintln!();
                Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
            })
            .await
            .map_err(|e| HostError::Rejected(e.to_string()))?
            .map_err(|e| HostError::Rejected(format!("Confirm error: {}", e)))?;

            Ok(respond::<ConfirmOverwrite>(answer))
        })
    }
}
